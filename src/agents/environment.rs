//! Ambient lighting monitoring.
//!
//! Low light is a fall-risk factor, not a per-person condition, so this
//! agent keeps one global band rather than per-track state. Brightness is
//! sampled on a coarse interval and an event fires only when the band
//! changes.

use tracing::debug;

use crate::domain::{AgentKind, Event, EventPayload, LightBand, Observation};
use crate::{MonitorError, Result};

use super::MonitorAgent;

/// Environment agent settings.
#[derive(Debug, Clone)]
pub struct EnvironmentConfig {
    /// Whether the agent is constructed at all.
    pub enabled: bool,
    /// Seconds between brightness samples.
    pub sample_interval_secs: f64,
    /// Mean luma below which the room is very dark.
    pub very_dark_below: f64,
    /// Mean luma below which the room is dim.
    pub dim_below: f64,
    /// Mean luma below which the room is slightly dark.
    pub slightly_dark_below: f64,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_interval_secs: 5.0,
            very_dark_below: 40.0,
            dim_below: 70.0,
            slightly_dark_below: 100.0,
        }
    }
}

impl EnvironmentConfig {
    pub fn validate(&self) -> Result<()> {
        if self.sample_interval_secs <= 0.0 {
            return Err(MonitorError::Config(
                "brightness sample interval must be positive".into(),
            ));
        }
        if !(self.very_dark_below < self.dim_below && self.dim_below < self.slightly_dark_below) {
            return Err(MonitorError::Config(
                "brightness bands must be strictly increasing".into(),
            ));
        }
        Ok(())
    }
}

/// Watches frame brightness and reports low-light band transitions.
pub struct EnvironmentAgent {
    config: EnvironmentConfig,
    last_sample: Option<f64>,
    /// `None` before the first sample; `Some(None)` means adequate light.
    band: Option<Option<LightBand>>,
}

impl EnvironmentAgent {
    pub fn new(config: EnvironmentConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            last_sample: None,
            band: None,
        })
    }

    fn classify(&self, brightness: f64) -> Option<LightBand> {
        if brightness < self.config.very_dark_below {
            Some(LightBand::VeryDark)
        } else if brightness < self.config.dim_below {
            Some(LightBand::Dim)
        } else if brightness < self.config.slightly_dark_below {
            Some(LightBand::SlightlyDark)
        } else {
            None
        }
    }
}

impl MonitorAgent for EnvironmentAgent {
    fn kind(&self) -> AgentKind {
        AgentKind::Environment
    }

    fn process(&mut self, obs: &Observation) -> Vec<Event> {
        let Some(brightness) = obs.frame_brightness else {
            return Vec::new();
        };
        if let Some(last) = self.last_sample {
            if obs.timestamp - last < self.config.sample_interval_secs {
                return Vec::new();
            }
        }
        self.last_sample = Some(obs.timestamp);

        let band = self.classify(brightness);
        let changed = self.band != Some(band);
        self.band = Some(band);

        let (Some(band), true) = (band, changed) else {
            return Vec::new();
        };

        debug!(brightness, band = ?band, "lighting band change");
        vec![Event::new(
            EventPayload::LowLight { band, brightness },
            obs.timestamp,
            0.9,
            AgentKind::Environment,
            obs.frame_id,
            obs.track_id,
        )]
    }

    fn retire_stale(&mut self, _now: f64) {}

    fn reset(&mut self) {
        self.last_sample = None;
        self.band = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{BoundingBox, TrackId};

    fn bright_observation(frame_id: u64, timestamp: f64, brightness: f64) -> Observation {
        Observation::new(
            frame_id,
            timestamp,
            TrackId(1),
            BoundingBox::new(0.3, 0.2, 0.7, 0.9, 0.9),
            0.9,
        )
        .with_brightness(brightness)
    }

    #[test]
    fn test_band_transition_emits_once() {
        let mut agent = EnvironmentAgent::new(EnvironmentConfig::default()).unwrap();
        let mut events = Vec::new();
        // Lights go from adequate to dim and stay there.
        for step in 0..10u64 {
            let brightness = if step < 2 { 150.0 } else { 55.0 };
            events.extend(agent.process(&bright_observation(step, step as f64 * 6.0, brightness)));
        }

        assert_eq!(events.len(), 1);
        match events[0].payload {
            EventPayload::LowLight { band, .. } => assert_eq!(band, LightBand::Dim),
            _ => panic!("wrong payload"),
        }
    }

    #[test]
    fn test_samples_are_throttled() {
        let mut agent = EnvironmentAgent::new(EnvironmentConfig::default()).unwrap();
        let mut events = Vec::new();
        // 30 fps of very dark frames for 4 s: only the first is sampled.
        for i in 0..120u64 {
            events.extend(agent.process(&bright_observation(i, i as f64 / 30.0, 20.0)));
        }
        assert_eq!(events.len(), 1);
    }

    #[test]
    fn test_adequate_light_is_silent() {
        let mut agent = EnvironmentAgent::new(EnvironmentConfig::default()).unwrap();
        let mut events = Vec::new();
        for step in 0..5u64 {
            events.extend(agent.process(&bright_observation(step, step as f64 * 6.0, 180.0)));
        }
        assert!(events.is_empty());
    }

    #[test]
    fn test_misordered_bands_rejected() {
        let config = EnvironmentConfig {
            dim_below: 30.0,
            ..EnvironmentConfig::default()
        };
        assert!(EnvironmentAgent::new(config).is_err());
    }
}
