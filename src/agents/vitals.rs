//! Contactless vital-sign estimation over the face-region color trace.

use tracing::debug;

use crate::domain::{AgentKind, Event, EventPayload, Observation};
use crate::rppg::{RppgAlgorithm, RppgProcessor};
use crate::temporal::{TemporalBuffer, TrackStore};
use crate::{MonitorError, Result};

use super::MonitorAgent;

/// Vital-signs agent settings.
#[derive(Debug, Clone)]
pub struct VitalsConfig {
    /// Nominal stream frame rate.
    pub fps: f64,
    /// Analysis window length in seconds.
    pub window_secs: f64,
    /// Minimum seconds between estimates per track.
    pub update_interval_secs: f64,
    /// Minimum fraction of window frames with a visible face.
    pub face_coverage_min: f64,
    /// Minimum pulse signal quality to emit.
    pub quality_min: f64,
    /// Plausible heart-rate range in bpm.
    pub heart_rate_range: (f64, f64),
    /// Plausible respiratory-rate range in breaths per minute.
    pub respiratory_rate_range: (f64, f64),
    /// Pulse-extraction projection.
    pub algorithm: RppgAlgorithm,
    /// Seconds without observations before a track's state is dropped.
    pub track_retire_secs: f64,
}

impl Default for VitalsConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            window_secs: 10.0,
            update_interval_secs: 1.0,
            face_coverage_min: 0.6,
            quality_min: 0.6,
            heart_rate_range: (40.0, 180.0),
            respiratory_rate_range: (8.0, 30.0),
            algorithm: RppgAlgorithm::Chrom,
            track_retire_secs: 5.0,
        }
    }
}

impl VitalsConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fps <= 0.0 {
            return Err(MonitorError::Config("vitals fps must be positive".into()));
        }
        if self.window_secs <= 0.0 || self.update_interval_secs <= 0.0 {
            return Err(MonitorError::Config(
                "vitals window and update interval must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.face_coverage_min)
            || !(0.0..=1.0).contains(&self.quality_min)
        {
            return Err(MonitorError::Config(
                "vitals coverage and quality thresholds must be within 0-1".into(),
            ));
        }
        if self.heart_rate_range.0 >= self.heart_rate_range.1
            || self.respiratory_rate_range.0 >= self.respiratory_rate_range.1
        {
            return Err(MonitorError::Config(
                "vitals physiological ranges must be non-empty".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct VitalsTrack {
    /// Whether a usable face was visible, one sample per frame.
    presence: TemporalBuffer<bool>,
    /// Mean face-crop RGB, one sample per frame with a face.
    rgb: TemporalBuffer<[f64; 3]>,
    last_estimate: Option<f64>,
}

/// Estimates heart and respiratory rate per track via rPPG.
///
/// Nothing is emitted until a full window of frames with sufficient face
/// coverage has accumulated; warm-up, occluded faces, and low signal
/// quality are silent. Estimates are throttled to the update interval.
pub struct VitalSignsAgent {
    config: VitalsConfig,
    processor: RppgProcessor,
    tracks: TrackStore<VitalsTrack>,
}

impl VitalSignsAgent {
    pub fn new(config: VitalsConfig) -> Result<Self> {
        config.validate()?;
        // Enough samples for a coverage-gated window.
        let min_samples =
            (config.fps * config.window_secs * config.face_coverage_min).round() as usize;
        let processor = RppgProcessor::new(config.algorithm, config.fps, min_samples.max(2));
        let retire = config.track_retire_secs;
        Ok(Self {
            config,
            processor,
            tracks: TrackStore::new(retire),
        })
    }
}

impl MonitorAgent for VitalSignsAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::VitalSigns
    }

    fn process(&mut self, obs: &Observation) -> Vec<Event> {
        let window = self.config.window_secs;
        let track = self
            .tracks
            .entry_or_insert_with(obs.track_id, obs.timestamp, || VitalsTrack {
                presence: TemporalBuffer::new(window),
                rgb: TemporalBuffer::new(window),
                last_estimate: None,
            });

        let face = obs.valid_face();
        track.presence.push(obs.timestamp, face.is_some());
        if let Some(face) = face {
            track.rgb.push(obs.timestamp, face.mean_rgb);
        }

        if !track.presence.is_full() {
            return Vec::new();
        }
        let coverage = track.rgb.len() as f64 / track.presence.len().max(1) as f64;
        if coverage < self.config.face_coverage_min {
            return Vec::new();
        }
        if let Some(last) = track.last_estimate {
            if obs.timestamp - last < self.config.update_interval_secs {
                return Vec::new();
            }
        }
        track.last_estimate = Some(obs.timestamp);

        let samples: Vec<[f64; 3]> = track.rgb.iter().map(|(_, rgb)| *rgb).collect();
        let Some(estimate) = self.processor.process(&samples) else {
            return Vec::new();
        };

        let (hr_lo, hr_hi) = self.config.heart_rate_range;
        let (rr_lo, rr_hi) = self.config.respiratory_rate_range;
        if estimate.signal_quality < self.config.quality_min
            || !(hr_lo..=hr_hi).contains(&estimate.heart_rate)
            || !(rr_lo..=rr_hi).contains(&estimate.respiratory_rate)
        {
            debug!(
                track_id = %obs.track_id,
                heart_rate = estimate.heart_rate,
                signal_quality = estimate.signal_quality,
                "vital estimate discarded"
            );
            return Vec::new();
        }

        vec![Event::new(
            EventPayload::VitalSigns {
                heart_rate: estimate.heart_rate,
                respiratory_rate: estimate.respiratory_rate,
                signal_quality: estimate.signal_quality,
                hr_confidence: estimate.hr_confidence,
                rr_confidence: estimate.rr_confidence,
            },
            obs.timestamp,
            estimate.signal_quality,
            AgentKind::VitalSigns,
            obs.frame_id,
            obs.track_id,
        )]
    }

    fn retire_stale(&mut self, now: f64) {
        self.tracks.retire_stale(now);
    }

    fn reset(&mut self) {
        self.tracks.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoundingBox, FaceRegion, TrackId};

    fn faced_observation(frame_id: u64, timestamp: f64, hr_hz: f64) -> Observation {
        let cardiac = (2.0 * std::f64::consts::PI * hr_hz * timestamp).sin();
        let resp = (2.0 * std::f64::consts::PI * 0.25 * timestamp).sin();
        Observation::new(
            frame_id,
            timestamp,
            TrackId(1),
            BoundingBox::new(0.3, 0.1, 0.7, 0.9, 0.9),
            0.9,
        )
        .with_face(FaceRegion {
            bbox: BoundingBox::new(0.42, 0.12, 0.58, 0.3, 0.9),
            mean_rgb: [
                150.0 + 2.0 * cardiac + resp,
                100.0 + 3.0 * cardiac + 1.5 * resp,
                80.0 + cardiac + 0.5 * resp,
            ],
            confidence: 0.9,
        })
    }

    #[test]
    fn test_full_window_yields_plausible_rates() {
        let mut agent = VitalSignsAgent::new(VitalsConfig::default()).unwrap();
        let mut events = Vec::new();
        // 12 s at 30 fps, cardiac tone at 1.2 Hz (72 bpm)
        for i in 0..360u64 {
            let obs = faced_observation(i, i as f64 / 30.0, 1.2);
            events.extend(agent.process(&obs));
        }

        assert!(!events.is_empty());
        match events[0].payload {
            EventPayload::VitalSigns {
                heart_rate,
                respiratory_rate,
                signal_quality,
                ..
            } => {
                assert!((heart_rate - 72.0).abs() < 6.0, "hr = {heart_rate}");
                assert!((8.0..=30.0).contains(&respiratory_rate));
                assert!(signal_quality >= 0.6);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn test_half_window_is_silent() {
        let mut agent = VitalSignsAgent::new(VitalsConfig::default()).unwrap();
        let mut events = Vec::new();
        // Only 5 s of the 10 s window
        for i in 0..150u64 {
            let obs = faced_observation(i, i as f64 / 30.0, 1.2);
            events.extend(agent.process(&obs));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_poor_face_coverage_is_silent() {
        let mut agent = VitalSignsAgent::new(VitalsConfig::default()).unwrap();
        let mut events = Vec::new();
        for i in 0..360u64 {
            let mut obs = faced_observation(i, i as f64 / 30.0, 1.2);
            // Face visible on only half the frames
            if i % 2 == 0 {
                obs.face = None;
            }
            events.extend(agent.process(&obs));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_estimates_are_throttled() {
        let mut agent = VitalSignsAgent::new(VitalsConfig::default()).unwrap();
        let mut events = Vec::new();
        // 13 s of clean signal: at most one estimate per second after the
        // first full window at 10 s.
        for i in 0..390u64 {
            let obs = faced_observation(i, i as f64 / 30.0, 1.2);
            events.extend(agent.process(&obs));
        }
        assert!(events.len() <= 4, "got {} events", events.len());
    }
}
