//! # Patient Sentinel
//!
//! Event-generation and fusion core for camera-based patient monitoring.
//!
//! The crate consumes a stream of per-frame perception observations (person
//! bounding boxes, pose keypoints, face regions, externally-classified
//! emotions) and turns it into typed monitoring events and prioritized
//! alerts. Perception itself (capture, detection, pose estimation) and
//! alert delivery transports beyond local sinks live outside this crate.
//!
//! ## Capabilities
//!
//! - **Fall detection**: torso geometry and hip descent rate, with hysteresis
//! - **Vital signs**: contactless heart/respiratory rate via rPPG (CHROM)
//! - **Seizure detection**: spectral analysis of per-limb oscillation
//! - **Bed-exit monitoring**: occupancy state machine with empty-bed escalation
//! - **Immobility and distress**: pressure-injury risk and sustained emotion
//! - **Fusion**: declarative rules, deduplication, priority-ranked alerts
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                     patient-sentinel                     │
//! ├──────────────────────────────────────────────────────────┤
//! │  Observation stream                                      │
//! │        │                                                 │
//! │  ┌─────▼──────────────────────────────┐                  │
//! │  │ Monitoring agents (fan-out/join)   │                  │
//! │  │ fall · seizure · vitals · bed-exit │                  │
//! │  │ immobility · emotion · environment │                  │
//! │  └─────┬──────────────────────────────┘                  │
//! │        │ Event batch                                     │
//! │  ┌─────▼────────────┐   ┌───────────────┐                │
//! │  │   Orchestrator   ├──►│  Alert sinks  │                │
//! │  │ rules/dedup/rank │   │ console, file │                │
//! │  └──────────────────┘   └───────────────┘                │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use patient_sentinel::{MonitorConfig, PatientMonitor};
//!
//! #[tokio::main]
//! async fn main() -> patient_sentinel::Result<()> {
//!     let config = MonitorConfig::builder()
//!         .environment_enabled(false)
//!         .retirement_tick_secs(1.0)
//!         .build();
//!
//!     let mut monitor = PatientMonitor::new(config)?;
//!
//!     // One synthetic frame.
//!     let obs = patient_sentinel::Observation::new(
//!         0,
//!         0.0,
//!         patient_sentinel::TrackId(1),
//!         patient_sentinel::BoundingBox::new(0.3, 0.2, 0.7, 0.9, 0.9),
//!         0.9,
//!     );
//!     let output = monitor.process_frame(&obs).await?;
//!     for alert in &output.alerts {
//!         println!("{}: {}", alert.level, alert.message);
//!     }
//!     Ok(())
//! }
//! ```

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod agents;
pub mod delivery;
pub mod domain;
pub mod orchestrator;
pub mod pipeline;
pub mod rppg;
pub mod signal;
pub mod temporal;

// Re-export main types
pub use domain::{
    alert::{Alert, AlertId, AlertLevel},
    events::{
        AgentKind, BedAbsenceKind, BedState, Confidence, Event, EventClass, EventPayload,
        FallType, ImmobilityRisk, Limb, LightBand, Posture,
    },
    observation::{
        BoundingBox, EmotionLabel, EmotionObservation, FaceRegion, Keypoint, Observation,
        PoseData, TrackId,
    },
};

pub use agents::{
    standard_agents, BedExitAgent, BedExitConfig, EmotionAgent, EmotionConfig,
    EnvironmentAgent, EnvironmentConfig, FallAgent, FallConfig, ImmobilityAgent,
    ImmobilityConfig, MonitorAgent, SeizureAgent, SeizureConfig, VitalSignsAgent,
    VitalsConfig,
};

pub use orchestrator::{
    default_rules, FusionRule, Orchestrator, OrchestratorConfig, RuleCondition,
};

pub use pipeline::{FrameOutput, PatientMonitor};

pub use delivery::{AlertSink, ConsoleSink, JsonLinesSink};

pub use rppg::{RppgAlgorithm, RppgProcessor, VitalEstimate};

pub use temporal::{TemporalBuffer, TrackStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Common result type for monitoring operations
pub type Result<T> = std::result::Result<T, MonitorError>;

/// Unified error type for monitoring operations
#[derive(Debug, thiserror::Error)]
pub enum MonitorError {
    /// Configuration error, fatal at construction
    #[error("Configuration error: {0}")]
    Config(String),

    /// Pipeline execution error
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Alert delivery error
    #[error("Delivery error: {0}")]
    Delivery(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Configuration for the full monitoring pipeline
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Fall agent settings
    pub fall: FallConfig,
    /// Seizure agent settings
    pub seizure: SeizureConfig,
    /// Vital-signs agent settings
    pub vitals: VitalsConfig,
    /// Bed-exit agent settings
    pub bed_exit: BedExitConfig,
    /// Immobility agent settings
    pub immobility: ImmobilityConfig,
    /// Emotion agent settings
    pub emotion: EmotionConfig,
    /// Environment agent settings
    pub environment: EnvironmentConfig,
    /// Orchestrator settings
    pub orchestrator: OrchestratorConfig,
    /// Retirement tick cadence in seconds
    pub retirement_tick_secs: f64,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            fall: FallConfig::default(),
            seizure: SeizureConfig::default(),
            vitals: VitalsConfig::default(),
            bed_exit: BedExitConfig::default(),
            immobility: ImmobilityConfig::default(),
            emotion: EmotionConfig::default(),
            environment: EnvironmentConfig::default(),
            orchestrator: OrchestratorConfig::default(),
            retirement_tick_secs: 1.0,
        }
    }
}

impl MonitorConfig {
    /// Create a new configuration builder
    pub fn builder() -> MonitorConfigBuilder {
        MonitorConfigBuilder::default()
    }

    /// Validate every section. Fatal at construction time.
    pub fn validate(&self) -> Result<()> {
        self.fall.validate()?;
        self.seizure.validate()?;
        self.vitals.validate()?;
        self.bed_exit.validate()?;
        self.immobility.validate()?;
        self.emotion.validate()?;
        self.environment.validate()?;
        self.orchestrator.validate()?;
        if self.retirement_tick_secs <= 0.0 {
            return Err(MonitorError::Config(
                "retirement tick must be positive".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`MonitorConfig`]
#[derive(Debug)]
pub struct MonitorConfigBuilder {
    config: MonitorConfig,
}

impl Default for MonitorConfigBuilder {
    fn default() -> Self {
        Self {
            config: MonitorConfig::default(),
        }
    }
}

impl MonitorConfigBuilder {
    /// Set fall agent settings
    pub fn fall(mut self, fall: FallConfig) -> Self {
        self.config.fall = fall;
        self
    }

    /// Set seizure agent settings
    pub fn seizure(mut self, seizure: SeizureConfig) -> Self {
        self.config.seizure = seizure;
        self
    }

    /// Set vital-signs agent settings
    pub fn vitals(mut self, vitals: VitalsConfig) -> Self {
        self.config.vitals = vitals;
        self
    }

    /// Set bed-exit agent settings
    pub fn bed_exit(mut self, bed_exit: BedExitConfig) -> Self {
        self.config.bed_exit = bed_exit;
        self
    }

    /// Set immobility agent settings
    pub fn immobility(mut self, immobility: ImmobilityConfig) -> Self {
        self.config.immobility = immobility;
        self
    }

    /// Set emotion agent settings
    pub fn emotion(mut self, emotion: EmotionConfig) -> Self {
        self.config.emotion = emotion;
        self
    }

    /// Set environment agent settings
    pub fn environment(mut self, environment: EnvironmentConfig) -> Self {
        self.config.environment = environment;
        self
    }

    /// Enable or disable the environment agent
    pub fn environment_enabled(mut self, enabled: bool) -> Self {
        self.config.environment.enabled = enabled;
        self
    }

    /// Set orchestrator settings
    pub fn orchestrator(mut self, orchestrator: OrchestratorConfig) -> Self {
        self.config.orchestrator = orchestrator;
        self
    }

    /// Set the retirement tick cadence
    pub fn retirement_tick_secs(mut self, secs: f64) -> Self {
        self.config.retirement_tick_secs = secs;
        self
    }

    /// Build the configuration
    pub fn build(self) -> MonitorConfig {
        self.config
    }
}

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        // Top level
        MonitorConfig, MonitorConfigBuilder, MonitorError, PatientMonitor, Result,
        // Domain types
        Alert, AlertLevel, BoundingBox, EmotionLabel, EmotionObservation, Event,
        EventPayload, FaceRegion, Keypoint, Observation, PoseData, TrackId,
        // Agents
        standard_agents, MonitorAgent,
        // Orchestration
        FusionRule, Orchestrator, OrchestratorConfig, RuleCondition,
        // Delivery
        AlertSink, ConsoleSink, JsonLinesSink,
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_builder() {
        let config = MonitorConfig::builder()
            .environment_enabled(false)
            .retirement_tick_secs(2.0)
            .build();

        assert!(!config.environment.enabled);
        assert!((config.retirement_tick_secs - 2.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_nonpositive_tick_rejected() {
        let config = MonitorConfig::builder().retirement_tick_secs(0.0).build();
        assert!(config.validate().is_err());
        assert!(pipeline::PatientMonitor::new(config).is_err());
    }

    #[test]
    fn test_invalid_section_fails_validation() {
        let mut config = MonitorConfig::builder().build();
        config.fall.confidence_floor = 2.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
