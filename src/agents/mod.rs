//! Monitoring agents.
//!
//! Each agent consumes the per-frame [`Observation`] stream and emits typed
//! [`Event`]s when its condition is met. Agents are pure in-memory state
//! machines: no I/O, no blocking, and a missing modality on a frame is a
//! silent no-update for that agent. Per-track state lives in a
//! [`TrackStore`](crate::temporal::TrackStore) arena inside each agent and
//! is discarded by the timer-driven retirement pass.

pub mod bed_exit;
pub mod emotion;
pub mod environment;
pub mod fall;
pub mod immobility;
pub mod seizure;
pub mod vitals;

pub use bed_exit::{BedExitAgent, BedExitConfig};
pub use emotion::{EmotionAgent, EmotionConfig};
pub use environment::{EnvironmentAgent, EnvironmentConfig};
pub use fall::{FallAgent, FallConfig};
pub use immobility::{ImmobilityAgent, ImmobilityConfig};
pub use seizure::{SeizureAgent, SeizureConfig};
pub use vitals::{VitalSignsAgent, VitalsConfig};

use crate::domain::{AgentKind, Event, Observation};
use crate::{MonitorConfig, Result};

/// Contract every monitoring agent fulfills.
pub trait MonitorAgent: Send {
    /// Which agent this is.
    fn kind(&self) -> AgentKind;

    /// Consume one observation, returning any events it triggered.
    /// Usually returns an empty vector.
    fn process(&mut self, obs: &Observation) -> Vec<Event>;

    /// Timer-driven check at stream time `now`, independent of frame
    /// arrival. Lets agents raise conditions defined by the absence of
    /// observations.
    fn tick(&mut self, _now: f64) -> Vec<Event> {
        Vec::new()
    }

    /// Discard state for tracks unseen long enough to be retired.
    fn retire_stale(&mut self, now: f64);

    /// Drop all per-track state.
    fn reset(&mut self);
}

/// Construct the standard agent set from a validated configuration.
///
/// Order matters: it is the fixed fan-out order of the pipeline and the
/// deterministic within-frame event order.
pub fn standard_agents(config: &MonitorConfig) -> Result<Vec<Box<dyn MonitorAgent>>> {
    let mut agents: Vec<Box<dyn MonitorAgent>> = vec![
        Box::new(FallAgent::new(config.fall.clone())?),
        Box::new(SeizureAgent::new(config.seizure.clone())?),
        Box::new(VitalSignsAgent::new(config.vitals.clone())?),
        Box::new(BedExitAgent::new(config.bed_exit.clone())?),
        Box::new(ImmobilityAgent::new(config.immobility.clone())?),
        Box::new(EmotionAgent::new(config.emotion.clone())?),
    ];

    if config.environment.enabled {
        agents.push(Box::new(EnvironmentAgent::new(config.environment.clone())?));
    }

    Ok(agents)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_set_has_seven_agents() {
        let config = MonitorConfig::default();
        let agents = standard_agents(&config).unwrap();
        assert_eq!(agents.len(), 7);
        assert_eq!(agents[0].kind(), AgentKind::FallDetection);
        assert_eq!(agents.last().unwrap().kind(), AgentKind::Environment);
    }

    #[test]
    fn test_environment_agent_is_togglable() {
        let mut config = MonitorConfig::default();
        config.environment.enabled = false;
        let agents = standard_agents(&config).unwrap();
        assert_eq!(agents.len(), 6);
        assert!(agents.iter().all(|a| a.kind() != AgentKind::Environment));
    }
}
