//! Fall detection from torso geometry and hip descent rate.

use tracing::debug;

use crate::domain::{AgentKind, Event, EventPayload, FallType, Observation};
use crate::temporal::{TemporalBuffer, TrackStore};
use crate::{MonitorError, Result};

use super::MonitorAgent;

/// Fall agent thresholds.
#[derive(Debug, Clone)]
pub struct FallConfig {
    /// Seconds of torso geometry kept per track.
    pub window_secs: f64,
    /// Torso angle above which the body reads as horizontal, degrees.
    pub angle_threshold_deg: f64,
    /// Normalized hip height below which the body reads as on the ground.
    pub hip_height_threshold: f64,
    /// Hip descent rate that reads as a fall, normalized units per second.
    pub velocity_threshold: f64,
    /// Minimum confidence to emit.
    pub confidence_floor: f64,
    /// Per-track quiet period after an emission, seconds.
    pub cooldown_secs: f64,
    /// Seconds without observations before a track's state is dropped.
    pub track_retire_secs: f64,
}

impl Default for FallConfig {
    fn default() -> Self {
        Self {
            window_secs: 1.0,
            angle_threshold_deg: 60.0,
            hip_height_threshold: 0.3,
            velocity_threshold: 0.5,
            confidence_floor: 0.7,
            cooldown_secs: 3.0,
            track_retire_secs: 5.0,
        }
    }
}

impl FallConfig {
    pub fn validate(&self) -> Result<()> {
        if self.window_secs <= 0.0 {
            return Err(MonitorError::Config(
                "fall window must be positive".into(),
            ));
        }
        if !(0.0..=90.0).contains(&self.angle_threshold_deg) {
            return Err(MonitorError::Config(
                "fall angle threshold must be within 0-90 degrees".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.hip_height_threshold) {
            return Err(MonitorError::Config(
                "hip height threshold must be within 0-1".into(),
            ));
        }
        if self.velocity_threshold <= 0.0 {
            return Err(MonitorError::Config(
                "fall velocity threshold must be positive".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.confidence_floor) {
            return Err(MonitorError::Config(
                "fall confidence floor must be within 0-1".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct FallTrack {
    /// (torso angle deg, hip height) samples.
    geometry: TemporalBuffer<(f64, f64)>,
    last_emit: Option<f64>,
    /// Set after an emission, cleared once the geometry recovers. Suppresses
    /// re-emission while the person is still down.
    fallen: bool,
}

/// Detects falls, near-falls, and static lying postures per track.
///
/// Keeps a short window of (torso angle, hip height) and classifies on each
/// frame once the window spans its horizon. A detected event arms a
/// per-track hysteresis: nothing re-emits until the cool-down passes and the
/// geometry has recovered to upright.
pub struct FallAgent {
    config: FallConfig,
    tracks: TrackStore<FallTrack>,
}

impl FallAgent {
    pub fn new(config: FallConfig) -> Result<Self> {
        config.validate()?;
        let retire = config.track_retire_secs;
        Ok(Self {
            config,
            tracks: TrackStore::new(retire),
        })
    }

    /// Hip descent rate over the retained window, normalized units per
    /// second. Zero until two samples exist.
    fn descent_rate(track: &FallTrack) -> f64 {
        let (Some((t0, (_, h0))), Some((t1, (_, h1)))) =
            (track.geometry.oldest(), track.geometry.latest())
        else {
            return 0.0;
        };
        let dt = t1 - t0;
        if dt <= 0.0 {
            return 0.0;
        }
        (h0 - h1).max(0.0) / dt
    }

    fn classify(&self, angle: f64, hip: f64, velocity: f64) -> Option<(FallType, f64)> {
        let cfg = &self.config;
        let angle_ratio = angle / cfg.angle_threshold_deg;
        let vel_ratio = velocity / cfg.velocity_threshold;
        let drop_ratio = (1.0 - hip) / (1.0 - cfg.hip_height_threshold).max(1e-6);

        // An active descent takes precedence over the static lying posture
        // so that the moment of impact classifies as a fall, not its
        // aftermath.
        if velocity > cfg.velocity_threshold && angle > cfg.angle_threshold_deg / 2.0 {
            let confidence =
                (0.5 * angle_ratio + 0.3 * vel_ratio + 0.2 * drop_ratio).min(1.0);
            return Some((FallType::Fall, confidence));
        }

        if hip < cfg.hip_height_threshold && angle > cfg.angle_threshold_deg {
            let confidence = (0.6 * angle_ratio + 0.4 * drop_ratio).min(1.0);
            return Some((FallType::Lying, confidence));
        }

        if velocity > cfg.velocity_threshold * 0.7 && angle > cfg.angle_threshold_deg * 0.7 {
            let confidence = (0.8 * vel_ratio).min(1.0);
            return Some((FallType::NearFall, confidence));
        }

        None
    }
}

impl MonitorAgent for FallAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::FallDetection
    }

    fn process(&mut self, obs: &Observation) -> Vec<Event> {
        let Some(pose) = obs.pose.as_ref() else {
            return Vec::new();
        };
        let (Some(angle), Some(hip)) = (pose.torso_angle_deg(), pose.hip_height()) else {
            return Vec::new();
        };

        let window = self.config.window_secs;
        let track = self
            .tracks
            .entry_or_insert_with(obs.track_id, obs.timestamp, || FallTrack {
                geometry: TemporalBuffer::new(window),
                last_emit: None,
                fallen: false,
            });
        track.geometry.push(obs.timestamp, (angle, hip));

        if !track.geometry.is_full() {
            return Vec::new();
        }

        let velocity = Self::descent_rate(track);
        let classified = self.classify(angle, hip, velocity);

        let track = match self.tracks.get_mut(obs.track_id) {
            Some(track) => track,
            None => return Vec::new(),
        };

        let Some((fall_type, confidence)) = classified else {
            // Geometry recovered, re-arm.
            track.fallen = false;
            return Vec::new();
        };

        if track.fallen {
            return Vec::new();
        }
        if let Some(last) = track.last_emit {
            if obs.timestamp - last < self.config.cooldown_secs {
                return Vec::new();
            }
        }
        if confidence < self.config.confidence_floor {
            return Vec::new();
        }

        track.last_emit = Some(obs.timestamp);
        track.fallen = true;

        debug!(
            track_id = %obs.track_id,
            fall_type = %fall_type,
            torso_angle = angle,
            hip_height = hip,
            "fall condition detected"
        );

        vec![Event::new(
            EventPayload::FallDetected {
                fall_type,
                torso_angle: angle,
                hip_height: hip,
                vertical_velocity: velocity,
            },
            obs.timestamp,
            confidence,
            AgentKind::FallDetection,
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
    use crate::domain::{BoundingBox, Keypoint, PoseData, TrackId};
    use crate::domain::keypoints;

    /// Pose with the given torso angle (degrees from vertical) and hip
    /// height, torso length 0.3 normalized units.
    fn posed_observation(frame_id: u64, timestamp: f64, angle_deg: f64, hip_height: f64) -> Observation {
        let hip_y = 1.0 - hip_height;
        let rad = angle_deg.to_radians();
        let shoulder_x = 0.5 + 0.3 * rad.sin();
        let shoulder_y = hip_y - 0.3 * rad.cos();

        let mut kps = vec![Keypoint::at(0.5, 0.5); keypoints::LANDMARK_COUNT];
        kps[keypoints::LEFT_SHOULDER] = Keypoint::at(shoulder_x, shoulder_y);
        kps[keypoints::RIGHT_SHOULDER] = Keypoint::at(shoulder_x, shoulder_y);
        kps[keypoints::LEFT_HIP] = Keypoint::at(0.5, hip_y);
        kps[keypoints::RIGHT_HIP] = Keypoint::at(0.5, hip_y);

        Observation::new(
            frame_id,
            timestamp,
            TrackId(1),
            BoundingBox::new(0.3, 0.2, 0.7, 1.0, 0.9),
            0.9,
        )
        .with_pose(PoseData::new(kps))
    }

    fn feed_ramp(agent: &mut FallAgent) -> Vec<Event> {
        let mut events = Vec::new();
        // Torso angle 10 to 80 degrees, hip height 0.8 to 0.2 over 1 s at
        // 30 fps.
        for i in 0..30u64 {
            let f = i as f64 / 29.0;
            let obs = posed_observation(i, i as f64 / 30.0, 10.0 + 70.0 * f, 0.8 - 0.6 * f);
            events.extend(agent.process(&obs));
        }
        events
    }

    #[test]
    fn test_fall_ramp_emits_confident_fall() {
        let mut agent = FallAgent::new(FallConfig::default()).unwrap();
        let events = feed_ramp(&mut agent);

        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert!(event.confidence.value() >= 0.7, "{:?}", event.confidence);
        match event.payload {
            EventPayload::FallDetected { fall_type, .. } => {
                assert_eq!(fall_type, FallType::Fall)
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn test_no_reemission_while_down() {
        let mut agent = FallAgent::new(FallConfig::default()).unwrap();
        let events = feed_ramp(&mut agent);
        assert_eq!(events.len(), 1);

        // Stays down for another two seconds, no further events.
        let mut later = Vec::new();
        for i in 30..90u64 {
            let obs = posed_observation(i, i as f64 / 30.0, 80.0, 0.2);
            later.extend(agent.process(&obs));
        }
        assert!(later.is_empty());
    }

    #[test]
    fn test_upright_walk_is_silent() {
        let mut agent = FallAgent::new(FallConfig::default()).unwrap();
        let mut events = Vec::new();
        for i in 0..90u64 {
            let obs = posed_observation(i, i as f64 / 30.0, 5.0, 0.55);
            events.extend(agent.process(&obs));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_missing_pose_is_no_update() {
        let mut agent = FallAgent::new(FallConfig::default()).unwrap();
        let obs = Observation::new(
            0,
            0.0,
            TrackId(1),
            BoundingBox::new(0.3, 0.2, 0.7, 1.0, 0.9),
            0.9,
        );
        assert!(agent.process(&obs).is_empty());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = FallConfig {
            confidence_floor: 1.5,
            ..FallConfig::default()
        };
        assert!(FallAgent::new(config).is_err());
    }
}
