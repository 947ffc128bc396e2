//! Distress-emotion filtering and debouncing.
//!
//! The classifier itself runs outside the core; this agent consumes the
//! label and probability already on the observation, keeps only the
//! actionable distress subset, and debounces repeats per track and label.

use std::collections::HashMap;

use crate::domain::{AgentKind, EmotionLabel, Event, EventPayload, Observation};
use crate::temporal::TrackStore;
use crate::{MonitorError, Result};

use super::MonitorAgent;

/// Emotion agent settings.
#[derive(Debug, Clone)]
pub struct EmotionConfig {
    /// Labels worth surfacing.
    pub actionable: Vec<EmotionLabel>,
    /// Minimum classifier probability to emit.
    pub probability_floor: f64,
    /// Per-track, per-label quiet period in seconds.
    pub cooldown_secs: f64,
    /// Seconds without observations before a track's state is dropped.
    pub track_retire_secs: f64,
}

impl Default for EmotionConfig {
    fn default() -> Self {
        Self {
            actionable: vec![EmotionLabel::Sad, EmotionLabel::Fear, EmotionLabel::Angry],
            probability_floor: 0.4,
            cooldown_secs: 30.0,
            track_retire_secs: 5.0,
        }
    }
}

impl EmotionConfig {
    pub fn validate(&self) -> Result<()> {
        if self.actionable.is_empty() {
            return Err(MonitorError::Config(
                "emotion actionable set must not be empty".into(),
            ));
        }
        if !(0.0..=1.0).contains(&self.probability_floor) {
            return Err(MonitorError::Config(
                "emotion probability floor must be within 0-1".into(),
            ));
        }
        Ok(())
    }
}

/// Surfaces sustained distress emotions, one event per label per cool-down.
pub struct EmotionAgent {
    config: EmotionConfig,
    /// Last emission time per label, per track.
    tracks: TrackStore<HashMap<EmotionLabel, f64>>,
}

impl EmotionAgent {
    pub fn new(config: EmotionConfig) -> Result<Self> {
        config.validate()?;
        let retire = config.track_retire_secs;
        Ok(Self {
            config,
            tracks: TrackStore::new(retire),
        })
    }
}

impl MonitorAgent for EmotionAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::EmotionDetection
    }

    fn process(&mut self, obs: &Observation) -> Vec<Event> {
        let Some(emotion) = obs.emotion else {
            return Vec::new();
        };
        if !self.config.actionable.contains(&emotion.label) {
            return Vec::new();
        }
        if emotion.probability < self.config.probability_floor {
            return Vec::new();
        }

        let cooldown = self.config.cooldown_secs;
        let last_emits = self
            .tracks
            .entry_or_insert_with(obs.track_id, obs.timestamp, HashMap::new);

        if let Some(&last) = last_emits.get(&emotion.label) {
            if obs.timestamp - last < cooldown {
                return Vec::new();
            }
        }
        last_emits.insert(emotion.label, obs.timestamp);

        let (valence, arousal) = emotion.label.valence_arousal();
        vec![Event::new(
            EventPayload::Distress {
                emotion: emotion.label,
                probability: emotion.probability,
                valence,
                arousal,
            },
            obs.timestamp,
            emotion.probability,
            AgentKind::EmotionDetection,
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
    use crate::domain::{BoundingBox, EmotionObservation, TrackId};

    fn emotional_observation(
        frame_id: u64,
        timestamp: f64,
        label: EmotionLabel,
        probability: f64,
    ) -> Observation {
        Observation::new(
            frame_id,
            timestamp,
            TrackId(1),
            BoundingBox::new(0.3, 0.1, 0.7, 0.9, 0.9),
            0.9,
        )
        .with_emotion(EmotionObservation { label, probability })
    }

    #[test]
    fn test_distress_label_emits_once() {
        let mut agent = EmotionAgent::new(EmotionConfig::default()).unwrap();
        let mut events = Vec::new();
        // Ten seconds of sustained fear, one emission expected.
        for i in 0..300u64 {
            let obs = emotional_observation(i, i as f64 / 30.0, EmotionLabel::Fear, 0.8);
            events.extend(agent.process(&obs));
        }
        assert_eq!(events.len(), 1);
        match events[0].payload {
            EventPayload::Distress { emotion, valence, .. } => {
                assert_eq!(emotion, EmotionLabel::Fear);
                assert!(valence < 0.0);
            }
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn test_reemits_after_cooldown() {
        let config = EmotionConfig {
            cooldown_secs: 5.0,
            ..EmotionConfig::default()
        };
        let mut agent = EmotionAgent::new(config).unwrap();

        let first = agent.process(&emotional_observation(0, 0.0, EmotionLabel::Sad, 0.7));
        let during = agent.process(&emotional_observation(60, 2.0, EmotionLabel::Sad, 0.7));
        let after = agent.process(&emotional_observation(180, 6.0, EmotionLabel::Sad, 0.7));

        assert_eq!(first.len(), 1);
        assert!(during.is_empty());
        assert_eq!(after.len(), 1);
    }

    #[test]
    fn test_different_labels_debounce_independently() {
        let mut agent = EmotionAgent::new(EmotionConfig::default()).unwrap();
        let sad = agent.process(&emotional_observation(0, 0.0, EmotionLabel::Sad, 0.7));
        let fear = agent.process(&emotional_observation(1, 0.1, EmotionLabel::Fear, 0.7));
        assert_eq!(sad.len() + fear.len(), 2);
    }

    #[test]
    fn test_benign_and_weak_labels_filtered() {
        let mut agent = EmotionAgent::new(EmotionConfig::default()).unwrap();
        let happy = agent.process(&emotional_observation(0, 0.0, EmotionLabel::Happy, 0.95));
        let weak = agent.process(&emotional_observation(1, 0.1, EmotionLabel::Fear, 0.2));
        assert!(happy.is_empty());
        assert!(weak.is_empty());
    }
}
