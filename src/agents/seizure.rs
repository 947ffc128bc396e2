//! Seizure detection from repetitive limb oscillation.
//!
//! Each limb is reduced to the mean position of its joint chain per frame.
//! Per-axis velocity series over a short window are spectrally analyzed; a
//! limb counts as affected when its dominant peak in the clonic band
//! carries enough normalized magnitude. An event fires once the pattern
//! holds on enough limbs for the sustained duration.

use tracing::warn;

use crate::domain::keypoints;
use crate::domain::{AgentKind, Event, EventPayload, Limb, Observation};
use crate::signal::Spectrum;
use crate::temporal::{TemporalBuffer, TrackStore};
use crate::{MonitorError, Result};

use super::MonitorAgent;

/// Joint chains per analyzed limb, in [`Limb`] order.
const LIMB_CHAINS: [(Limb, [usize; 3]); 4] = [
    (
        Limb::LeftArm,
        [keypoints::LEFT_SHOULDER, keypoints::LEFT_ELBOW, keypoints::LEFT_WRIST],
    ),
    (
        Limb::RightArm,
        [keypoints::RIGHT_SHOULDER, keypoints::RIGHT_ELBOW, keypoints::RIGHT_WRIST],
    ),
    (
        Limb::LeftLeg,
        [keypoints::LEFT_HIP, keypoints::LEFT_KNEE, keypoints::LEFT_ANKLE],
    ),
    (
        Limb::RightLeg,
        [keypoints::RIGHT_HIP, keypoints::RIGHT_KNEE, keypoints::RIGHT_ANKLE],
    ),
];

/// Seizure agent settings.
#[derive(Debug, Clone)]
pub struct SeizureConfig {
    /// Nominal stream frame rate.
    pub fps: f64,
    /// Clonic frequency band in Hz.
    pub frequency_band: (f64, f64),
    /// Minimum normalized velocity-spectrum magnitude, units per second.
    pub magnitude_threshold: f64,
    /// Seconds the pattern must hold before emitting.
    pub sustain_secs: f64,
    /// Minimum simultaneously affected limbs.
    pub min_affected_limbs: usize,
    /// Analysis window in seconds.
    pub window_secs: f64,
    /// Per-track quiet period after an emission, seconds.
    pub cooldown_secs: f64,
    /// Seconds without observations before a track's state is dropped.
    pub track_retire_secs: f64,
}

impl Default for SeizureConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            frequency_band: (3.0, 10.0),
            magnitude_threshold: 0.3,
            sustain_secs: 5.0,
            min_affected_limbs: 2,
            window_secs: 5.0,
            cooldown_secs: 10.0,
            track_retire_secs: 5.0,
        }
    }
}

impl SeizureConfig {
    pub fn validate(&self) -> Result<()> {
        if self.fps <= 0.0 {
            return Err(MonitorError::Config("seizure fps must be positive".into()));
        }
        if self.frequency_band.0 <= 0.0 || self.frequency_band.1 <= self.frequency_band.0 {
            return Err(MonitorError::Config(
                "seizure frequency band must be a non-empty positive range".into(),
            ));
        }
        if self.frequency_band.1 > self.fps / 2.0 {
            return Err(MonitorError::Config(
                "seizure band exceeds the Nyquist limit for the frame rate".into(),
            ));
        }
        if self.magnitude_threshold <= 0.0 || self.sustain_secs <= 0.0 {
            return Err(MonitorError::Config(
                "seizure magnitude and duration thresholds must be positive".into(),
            ));
        }
        if !(1..=4).contains(&self.min_affected_limbs) {
            return Err(MonitorError::Config(
                "seizure minimum affected limbs must be within 1-4".into(),
            ));
        }
        Ok(())
    }
}

/// Per-frame limb positions, `None` when the chain was not visible.
type LimbSample = [Option<(f64, f64)>; 4];

#[derive(Debug, Clone)]
struct SeizureTrack {
    samples: TemporalBuffer<LimbSample>,
    /// When the multi-limb pattern was first seen in the current run.
    pattern_since: Option<f64>,
    last_emit: Option<f64>,
}

struct LimbFinding {
    limb: Limb,
    frequency_hz: f64,
    magnitude: f64,
}

/// Detects sustained multi-limb clonic oscillation per track.
pub struct SeizureAgent {
    config: SeizureConfig,
    tracks: TrackStore<SeizureTrack>,
}

impl SeizureAgent {
    pub fn new(config: SeizureConfig) -> Result<Self> {
        config.validate()?;
        let retire = config.track_retire_secs;
        Ok(Self {
            config,
            tracks: TrackStore::new(retire),
        })
    }

    /// Strongest in-band oscillation of one limb trajectory, as normalized
    /// velocity amplitude in units per second.
    fn limb_oscillation(
        config: &SeizureConfig,
        trajectory: &[(f64, (f64, f64))],
    ) -> Option<(f64, f64)> {
        if trajectory.len() < 16 {
            return None;
        }

        let mut vx = Vec::with_capacity(trajectory.len() - 1);
        let mut vy = Vec::with_capacity(trajectory.len() - 1);
        for pair in trajectory.windows(2) {
            let (t0, (x0, y0)) = pair[0];
            let (t1, (x1, y1)) = pair[1];
            let dt = t1 - t0;
            if dt <= 0.0 {
                return None;
            }
            vx.push((x1 - x0) / dt);
            vy.push((y1 - y0) / dt);
        }

        let (lo, hi) = config.frequency_band;
        let n = vx.len() as f64;
        let mut best: Option<(f64, f64)> = None;
        for series in [&vx, &vy] {
            let Some(spectrum) = Spectrum::analyze(series, config.fps) else {
                continue;
            };
            if let Some((freq, mag)) = spectrum.peak_in_band(lo, hi) {
                // Hann coherent gain is 0.5, so amplitude is 4 * peak / n.
                let amplitude = 4.0 * mag / n;
                if best.map_or(true, |(_, b)| amplitude > b) {
                    best = Some((freq, amplitude));
                }
            }
        }
        best
    }

    /// Limbs currently showing the clonic pattern.
    fn affected_limbs(config: &SeizureConfig, track: &SeizureTrack) -> Vec<LimbFinding> {
        let total = track.samples.len();
        let mut findings = Vec::new();

        for (slot, (limb, _)) in LIMB_CHAINS.iter().enumerate() {
            let trajectory: Vec<(f64, (f64, f64))> = track
                .samples
                .iter()
                .filter_map(|(ts, limbs)| limbs[slot].map(|pos| (*ts, pos)))
                .collect();

            // The chain must be visible for essentially the whole window.
            if trajectory.len() < total {
                continue;
            }

            if let Some((frequency_hz, magnitude)) = Self::limb_oscillation(config, &trajectory) {
                if magnitude > config.magnitude_threshold {
                    findings.push(LimbFinding {
                        limb: *limb,
                        frequency_hz,
                        magnitude,
                    });
                }
            }
        }

        findings
    }
}

impl MonitorAgent for SeizureAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::SeizureDetection
    }

    fn process(&mut self, obs: &Observation) -> Vec<Event> {
        let Some(pose) = obs.pose.as_ref() else {
            return Vec::new();
        };

        let mut sample: LimbSample = [None; 4];
        for (slot, (_, chain)) in LIMB_CHAINS.iter().enumerate() {
            sample[slot] = pose.mean_position(chain);
        }

        let window = self.config.window_secs;
        let track = self
            .tracks
            .entry_or_insert_with(obs.track_id, obs.timestamp, || SeizureTrack {
                samples: TemporalBuffer::new(window),
                pattern_since: None,
                last_emit: None,
            });
        track.samples.push(obs.timestamp, sample);

        if !track.samples.is_full() {
            return Vec::new();
        }
        if let Some(last) = track.last_emit {
            if obs.timestamp - last < self.config.cooldown_secs {
                return Vec::new();
            }
        }

        let span = track.samples.span_secs();
        let findings = Self::affected_limbs(&self.config, track);

        if findings.len() < self.config.min_affected_limbs {
            track.pattern_since = None;
            return Vec::new();
        }

        // The oscillation already spans the analysis window when first
        // detected, so the run is backdated to the window start.
        let since = *track
            .pattern_since
            .get_or_insert(obs.timestamp - span);
        let duration = obs.timestamp - since;
        if duration < self.config.sustain_secs {
            return Vec::new();
        }

        track.last_emit = Some(obs.timestamp);
        track.pattern_since = None;

        let strongest = findings
            .iter()
            .map(|f| (f.frequency_hz, f.magnitude))
            .fold((0.0f64, 0.0f64), |acc, (f, m)| {
                if m > acc.1 { (f, m) } else { acc }
            });
        let confidence = ((findings.len() as f64 / 4.0)
            * (strongest.1 / self.config.magnitude_threshold))
            .min(1.0);

        warn!(
            track_id = %obs.track_id,
            limbs = findings.len(),
            frequency_hz = strongest.0,
            "sustained multi-limb oscillation"
        );

        vec![Event::new(
            EventPayload::Seizure {
                dominant_frequency_hz: strongest.0,
                affected_limbs: findings.iter().map(|f| f.limb).collect(),
                duration_secs: duration,
                magnitude: strongest.1,
            },
            obs.timestamp,
            confidence,
            AgentKind::SeizureDetection,
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
