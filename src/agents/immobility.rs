//! Prolonged-immobility detection for pressure-injury risk.

use tracing::debug;

use crate::domain::keypoints;
use crate::domain::{
    AgentKind, Event, EventPayload, ImmobilityRisk, Observation, PoseData, Posture,
};
use crate::temporal::TrackStore;
use crate::{MonitorError, Result};

use super::MonitorAgent;

/// Landmarks whose displacement defines movement.
const MOVEMENT_LANDMARKS: [usize; 5] = [
    keypoints::NOSE,
    keypoints::LEFT_SHOULDER,
    keypoints::RIGHT_SHOULDER,
    keypoints::LEFT_HIP,
    keypoints::RIGHT_HIP,
];

/// Immobility agent settings.
#[derive(Debug, Clone)]
pub struct ImmobilityConfig {
    /// Mean landmark displacement per frame that counts as movement,
    /// normalized units.
    pub movement_threshold: f64,
    /// Seconds of stillness before the medium-risk warning, default 1.5 h.
    pub warning_secs: f64,
    /// Seconds of stillness before the high-risk alert, default 2 h.
    pub alert_secs: f64,
    /// Seconds between risk evaluations.
    pub check_interval_secs: f64,
    /// Seconds movement must persist before it resets the stillness timer.
    pub confirm_secs: f64,
    /// Seconds without observations before a track's state is dropped.
    pub track_retire_secs: f64,
}

impl Default for ImmobilityConfig {
    fn default() -> Self {
        Self {
            movement_threshold: 0.05,
            warning_secs: 5400.0,
            alert_secs: 7200.0,
            check_interval_secs: 60.0,
            confirm_secs: 30.0,
            track_retire_secs: 5.0,
        }
    }
}

impl ImmobilityConfig {
    pub fn validate(&self) -> Result<()> {
        if self.movement_threshold <= 0.0 {
            return Err(MonitorError::Config(
                "movement threshold must be positive".into(),
            ));
        }
        if self.warning_secs <= 0.0 || self.alert_secs <= self.warning_secs {
            return Err(MonitorError::Config(
                "immobility durations must be positive and strictly escalating".into(),
            ));
        }
        if self.check_interval_secs <= 0.0 {
            return Err(MonitorError::Config(
                "immobility check interval must be positive".into(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct ImmobilityTrack {
    last_pose: Option<PoseData>,
    /// When the current stillness period began.
    immobile_since: f64,
    /// Start of the current uninterrupted movement streak.
    moving_since: Option<f64>,
    last_check: f64,
    posture: Option<Posture>,
    posture_change_count: u32,
}

/// Flags tracks that have not moved for clinically risky durations.
///
/// Movement must persist for the confirmation period before it resets the
/// stillness timer, so a brief twitch does not silence an elevated risk.
/// Risk is evaluated on a coarse interval and re-announced at that cadence
/// while it stays elevated.
pub struct ImmobilityAgent {
    config: ImmobilityConfig,
    tracks: TrackStore<ImmobilityTrack>,
}

impl ImmobilityAgent {
    pub fn new(config: ImmobilityConfig) -> Result<Self> {
        config.validate()?;
        let retire = config.track_retire_secs;
        Ok(Self {
            config,
            tracks: TrackStore::new(retire),
        })
    }

    fn classify_posture(pose: &PoseData) -> Option<Posture> {
        let angle = pose.torso_angle_deg()?;
        if angle > 60.0 {
            return Some(Posture::LyingSide);
        }
        let (_, sy) = pose.midpoint(keypoints::LEFT_SHOULDER, keypoints::RIGHT_SHOULDER)?;
        let (_, hy) = pose.midpoint(keypoints::LEFT_HIP, keypoints::RIGHT_HIP)?;
        // Inverted shoulder/hip order reads as face-down.
        Some(if sy > hy { Posture::Prone } else { Posture::Supine })
    }
}

impl MonitorAgent for ImmobilityAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Immobility
    }

    fn process(&mut self, obs: &Observation) -> Vec<Event> {
        let Some(pose) = obs.pose.as_ref() else {
            return Vec::new();
        };

        let config = &self.config;
        let track = self
            .tracks
            .entry_or_insert_with(obs.track_id, obs.timestamp, || ImmobilityTrack {
                last_pose: None,
                immobile_since: obs.timestamp,
                moving_since: None,
                last_check: obs.timestamp,
                posture: None,
                posture_change_count: 0,
            });

        if let Some(last_pose) = track.last_pose.as_ref() {
            let displacement = pose
                .displacement(last_pose, &MOVEMENT_LANDMARKS)
                .unwrap_or(0.0);

            if displacement > config.movement_threshold {
                let since = *track.moving_since.get_or_insert(obs.timestamp);
                if obs.timestamp - since >= config.confirm_secs {
                    track.immobile_since = obs.timestamp;
                }
            } else {
                track.moving_since = None;
            }
        }

        if let Some(posture) = Self::classify_posture(pose) {
            if track.posture != Some(posture) {
                if track.posture.is_some() {
                    track.posture_change_count += 1;
                }
                track.posture = Some(posture);
            }
        }
        track.last_pose = Some(pose.clone());

        if obs.timestamp - track.last_check < config.check_interval_secs {
            return Vec::new();
        }
        track.last_check = obs.timestamp;

        let duration = obs.timestamp - track.immobile_since;
        let risk = if duration > config.alert_secs {
            ImmobilityRisk::High
        } else if duration > config.warning_secs {
            ImmobilityRisk::Medium
        } else {
            return Vec::new();
        };

        debug!(
            track_id = %obs.track_id,
            duration_secs = duration,
            risk = ?risk,
            "prolonged immobility"
        );

        vec![Event::new(
            EventPayload::Immobility {
                duration_secs: duration,
                risk,
                posture: track.posture,
                posture_change_count: track.posture_change_count,
            },
            obs.timestamp,
            (duration / config.alert_secs).min(1.0),
            AgentKind::Immobility,
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
    use crate::domain::{BoundingBox, Keypoint, TrackId};

    fn pose_at(x: f64) -> PoseData {
        let mut kps = vec![Keypoint::at(x, 0.5); keypoints::LANDMARK_COUNT];
        kps[keypoints::LEFT_SHOULDER] = Keypoint::at(x - 0.15, 0.72);
        kps[keypoints::RIGHT_SHOULDER] = Keypoint::at(x - 0.15, 0.72);
        kps[keypoints::LEFT_HIP] = Keypoint::at(x + 0.15, 0.75);
        kps[keypoints::RIGHT_HIP] = Keypoint::at(x + 0.15, 0.75);
        PoseData::new(kps)
    }

    fn still_observation(frame_id: u64, timestamp: f64) -> Observation {
        Observation::new(
            frame_id,
            timestamp,
            TrackId(1),
            BoundingBox::new(0.3, 0.6, 0.7, 0.9, 0.9),
            0.9,
        )
        .with_pose(pose_at(0.5))
    }

    fn shrunk_config() -> ImmobilityConfig {
        ImmobilityConfig {
            warning_secs: 60.0,
            alert_secs: 120.0,
            check_interval_secs: 10.0,
            confirm_secs: 5.0,
            ..ImmobilityConfig::default()
        }
    }

    #[test]
    fn test_stillness_escalates_medium_then_high() {
        let mut agent = ImmobilityAgent::new(shrunk_config()).unwrap();
        let mut risks = Vec::new();
        // 150 s of one frame per second, no movement.
        for i in 0..150u64 {
            for event in agent.process(&still_observation(i, i as f64)) {
                if let EventPayload::Immobility { risk, .. } = event.payload {
                    risks.push(risk);
                }
            }
        }

        assert!(risks.contains(&ImmobilityRisk::Medium));
        assert!(risks.contains(&ImmobilityRisk::High));
        let first_high = risks.iter().position(|r| *r == ImmobilityRisk::High).unwrap();
        assert!(risks[..first_high]
            .iter()
            .all(|r| *r == ImmobilityRisk::Medium));
    }

    #[test]
    fn test_brief_twitch_does_not_reset_timer() {
        let mut agent = ImmobilityAgent::new(shrunk_config()).unwrap();
        let mut events = Vec::new();
        for i in 0..100u64 {
            // A two-second twitch at t = 50, shorter than the confirmation
            // period.
            let x = if (50..52).contains(&i) { 0.6 } else { 0.5 };
            let obs = Observation::new(
                i,
                i as f64,
                TrackId(1),
                BoundingBox::new(0.3, 0.6, 0.7, 0.9, 0.9),
                0.9,
            )
            .with_pose(pose_at(x));
            events.extend(agent.process(&obs));
        }
        assert!(!events.is_empty());
    }

    #[test]
    fn test_sustained_movement_resets_timer() {
        let mut agent = ImmobilityAgent::new(shrunk_config()).unwrap();
        let mut events = Vec::new();
        for i in 0..100u64 {
            // Continuous walking: position changes every frame.
            let x = 0.2 + 0.1 * (i % 7) as f64;
            let obs = Observation::new(
                i,
                i as f64,
                TrackId(1),
                BoundingBox::new(0.3, 0.6, 0.7, 0.9, 0.9),
                0.9,
            )
            .with_pose(pose_at(x));
            events.extend(agent.process(&obs));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_event_carries_posture() {
        let mut agent = ImmobilityAgent::new(shrunk_config()).unwrap();
        let mut postures = Vec::new();
        for i in 0..80u64 {
            for event in agent.process(&still_observation(i, i as f64)) {
                if let EventPayload::Immobility { posture, .. } = event.payload {
                    postures.push(posture);
                }
            }
        }
        assert!(!postures.is_empty());
        assert!(postures.iter().all(|p| p.is_some()));
    }
}
