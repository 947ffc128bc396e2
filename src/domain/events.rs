//! Typed events emitted by the monitoring agents.
//!
//! Every event carries the same envelope (timestamp, confidence, source
//! agent, frame and track identifiers) plus a type-specific payload. The
//! serialized form is the stable wire shape external consumers depend on:
//! an `event_type` tag with the payload fields flattened alongside the
//! envelope fields.

use serde::{Deserialize, Serialize};

use super::observation::{EmotionLabel, TrackId};

/// Detection confidence clamped to [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Confidence(f64);

impl Confidence {
    /// Create a confidence score, clamped to [0.0, 1.0].
    pub fn new(value: f64) -> Self {
        Self(value.clamp(0.0, 1.0))
    }

    /// Get the raw value.
    pub fn value(&self) -> f64 {
        self.0
    }
}

impl Default for Confidence {
    fn default() -> Self {
        Self(0.0)
    }
}

/// The monitoring agents, in fixed tie-break priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentKind {
    /// Fall detection
    FallDetection,
    /// Seizure detection
    SeizureDetection,
    /// Vital signs (rPPG)
    VitalSigns,
    /// Bed-exit state machine
    BedExit,
    /// Prolonged immobility
    Immobility,
    /// Distress emotion
    EmotionDetection,
    /// Lighting conditions
    Environment,
}

impl AgentKind {
    /// Wire name of the agent (the `agent_name` field).
    pub fn name(&self) -> &'static str {
        match self {
            AgentKind::FallDetection => "fall_detection",
            AgentKind::SeizureDetection => "seizure_detection",
            AgentKind::VitalSigns => "vital_signs",
            AgentKind::BedExit => "bed_exit",
            AgentKind::Immobility => "immobility",
            AgentKind::EmotionDetection => "emotion_detection",
            AgentKind::Environment => "environment",
        }
    }

    /// Severity-independent tie-break rank: lower sorts first.
    /// fall > seizure > vital-signs > bed-exit > immobility > emotion >
    /// environment.
    pub fn priority_rank(&self) -> u8 {
        match self {
            AgentKind::FallDetection => 0,
            AgentKind::SeizureDetection => 1,
            AgentKind::VitalSigns => 2,
            AgentKind::BedExit => 3,
            AgentKind::Immobility => 4,
            AgentKind::EmotionDetection => 5,
            AgentKind::Environment => 6,
        }
    }
}

impl std::fmt::Display for AgentKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Fall classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallType {
    /// Rapid descent with torso rotation
    Fall,
    /// Partial indicators without a confirmed descent
    NearFall,
    /// Static low-and-horizontal posture
    Lying,
}

impl std::fmt::Display for FallType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            FallType::Fall => "fall",
            FallType::NearFall => "near_fall",
            FallType::Lying => "lying",
        };
        f.write_str(s)
    }
}

/// Bed occupancy states tracked by the bed-exit machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BedState {
    /// Accumulating samples to establish the bed region
    Calibrating,
    /// Lying within the bed region
    InBed,
    /// Torso raised while still over the bed
    SittingUp,
    /// Upright, still near the bed
    Standing,
    /// Left the bed region entirely
    OutOfBed,
}

impl std::fmt::Display for BedState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BedState::Calibrating => "CALIBRATING",
            BedState::InBed => "IN_BED",
            BedState::SittingUp => "SITTING_UP",
            BedState::Standing => "STANDING",
            BedState::OutOfBed => "OUT_OF_BED",
        };
        f.write_str(s)
    }
}

/// Escalation stages of an empty-bed episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BedAbsenceKind {
    /// Bed empty past the warning threshold
    EmptyBedWarning,
    /// Bed empty past the critical threshold
    EmptyBedCritical,
    /// Person unobserved after leaving the bed (bathroom-visit overdue)
    ExtendedAbsence,
}

/// Immobility risk grading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ImmobilityRisk {
    /// Past the warning duration
    Medium,
    /// Past the alert duration
    High,
}

/// Coarse lying posture labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Posture {
    /// Face up
    Supine,
    /// Face down
    Prone,
    /// On either side
    LyingSide,
}

/// Limbs analyzed for repetitive motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Limb {
    /// Left shoulder-elbow-wrist chain
    LeftArm,
    /// Right shoulder-elbow-wrist chain
    RightArm,
    /// Left hip-knee-ankle chain
    LeftLeg,
    /// Right hip-knee-ankle chain
    RightLeg,
}

/// Low-light risk bands, darkest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LightBand {
    /// Brightness below the very-dark threshold
    VeryDark,
    /// Brightness below the dim threshold
    Dim,
    /// Brightness below the slightly-dark threshold
    SlightlyDark,
}

/// Type-specific event payloads. The serde tag is the `event_type` wire
/// field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event_type")]
pub enum EventPayload {
    /// Fall, near-fall, or lying detection
    #[serde(rename = "fall_detection")]
    FallDetected {
        /// Fall classification
        fall_type: FallType,
        /// Torso angle from vertical in degrees
        torso_angle: f64,
        /// Normalized hip height
        hip_height: f64,
        /// Normalized hip descent rate in units per second
        vertical_velocity: f64,
    },

    /// Heart and respiratory rate estimate from rPPG
    #[serde(rename = "vital_signs")]
    VitalSigns {
        /// Heart rate in beats per minute
        heart_rate: f64,
        /// Respiratory rate in breaths per minute
        respiratory_rate: f64,
        /// Peak-energy ratio of the pulse spectrum, 0-1
        signal_quality: f64,
        /// Confidence in the heart-rate peak
        hr_confidence: f64,
        /// Confidence in the respiratory-rate peak
        rr_confidence: f64,
    },

    /// Actionable distress emotion
    #[serde(rename = "emotion_detection")]
    Distress {
        /// Classified label
        emotion: EmotionLabel,
        /// Classifier probability
        probability: f64,
        /// Valence coordinate, -1 to 1
        valence: f64,
        /// Arousal coordinate, -1 to 1
        arousal: f64,
    },

    /// Bed-exit state machine transition
    #[serde(rename = "bed_exit")]
    BedTransition {
        /// New state
        state: BedState,
        /// State before the transition
        previous_state: BedState,
        /// Seconds spent in the previous state
        duration_in_state: f64,
    },

    /// Empty-bed escalation
    #[serde(rename = "bed_absence")]
    BedAbsence {
        /// Escalation stage
        kind: BedAbsenceKind,
        /// Seconds since the bed was vacated
        absent_secs: f64,
    },

    /// Prolonged immobility
    #[serde(rename = "immobility")]
    Immobility {
        /// Seconds since the last confirmed movement
        duration_secs: f64,
        /// Risk grading
        risk: ImmobilityRisk,
        /// Current posture, if a pose was available
        posture: Option<Posture>,
        /// Posture changes observed for this track
        posture_change_count: u32,
    },

    /// Sustained multi-limb repetitive motion
    #[serde(rename = "seizure_detection")]
    Seizure {
        /// Strongest dominant limb frequency in Hz
        dominant_frequency_hz: f64,
        /// Limbs showing the repetitive pattern
        affected_limbs: Vec<Limb>,
        /// Seconds the pattern has been sustained
        duration_secs: f64,
        /// Normalized spectral magnitude of the strongest limb
        magnitude: f64,
    },

    /// Low-light fall-risk band transition
    #[serde(rename = "low_light")]
    LowLight {
        /// Risk band entered
        band: LightBand,
        /// Mean frame luma that produced the transition
        brightness: f64,
    },
}

/// Coarse event class used for deduplication and rule conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventClass {
    /// Fall events
    Fall,
    /// Vital-signs events
    Vitals,
    /// Distress events
    Distress,
    /// Bed state transitions
    BedTransition,
    /// Empty-bed escalations
    BedAbsence,
    /// Immobility events
    Immobility,
    /// Seizure events
    Seizure,
    /// Low-light events
    LowLight,
}

impl EventPayload {
    /// Event class of the payload.
    pub fn class(&self) -> EventClass {
        match self {
            EventPayload::FallDetected { .. } => EventClass::Fall,
            EventPayload::VitalSigns { .. } => EventClass::Vitals,
            EventPayload::Distress { .. } => EventClass::Distress,
            EventPayload::BedTransition { .. } => EventClass::BedTransition,
            EventPayload::BedAbsence { .. } => EventClass::BedAbsence,
            EventPayload::Immobility { .. } => EventClass::Immobility,
            EventPayload::Seizure { .. } => EventClass::Seizure,
            EventPayload::LowLight { .. } => EventClass::LowLight,
        }
    }

    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        match self {
            EventPayload::FallDetected { .. } => "fall_detection",
            EventPayload::VitalSigns { .. } => "vital_signs",
            EventPayload::Distress { .. } => "emotion_detection",
            EventPayload::BedTransition { .. } => "bed_exit",
            EventPayload::BedAbsence { .. } => "bed_absence",
            EventPayload::Immobility { .. } => "immobility",
            EventPayload::Seizure { .. } => "seizure_detection",
            EventPayload::LowLight { .. } => "low_light",
        }
    }
}

/// An emitted monitoring event: common envelope plus typed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Type-specific payload, flattened into the wire record
    #[serde(flatten)]
    pub payload: EventPayload,
    /// Stream timestamp in seconds (fractional)
    pub timestamp: f64,
    /// Detection confidence
    pub confidence: Confidence,
    /// Emitting agent
    #[serde(rename = "agent_name")]
    pub agent: AgentKind,
    /// Frame the event derives from
    pub frame_id: u64,
    /// Track the event concerns
    pub track_id: TrackId,
}

impl Event {
    /// Create a new event.
    pub fn new(
        payload: EventPayload,
        timestamp: f64,
        confidence: f64,
        agent: AgentKind,
        frame_id: u64,
        track_id: TrackId,
    ) -> Self {
        Self {
            payload,
            timestamp,
            confidence: Confidence::new(confidence),
            agent,
            frame_id,
            track_id,
        }
    }

    /// Event class for dedup and rule matching.
    pub fn class(&self) -> EventClass {
        self.payload.class()
    }

    /// Wire name of the event type.
    pub fn event_type(&self) -> &'static str {
        self.payload.event_type()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_clamping() {
        assert_eq!(Confidence::new(1.5).value(), 1.0);
        assert_eq!(Confidence::new(-0.2).value(), 0.0);
        assert_eq!(Confidence::new(0.42).value(), 0.42);
    }

    #[test]
    fn test_agent_priority_order() {
        let order = [
            AgentKind::FallDetection,
            AgentKind::SeizureDetection,
            AgentKind::VitalSigns,
            AgentKind::BedExit,
            AgentKind::Immobility,
            AgentKind::EmotionDetection,
            AgentKind::Environment,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].priority_rank() < pair[1].priority_rank());
        }
    }

    #[test]
    fn test_event_wire_shape() {
        let event = Event::new(
            EventPayload::FallDetected {
                fall_type: FallType::Fall,
                torso_angle: 72.5,
                hip_height: 0.21,
                vertical_velocity: 0.6,
            },
            12.5,
            0.9,
            AgentKind::FallDetection,
            42,
            TrackId(7),
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event_type"], "fall_detection");
        assert_eq!(json["fall_type"], "fall");
        assert_eq!(json["agent_name"], "fall_detection");
        assert_eq!(json["frame_id"], 42);
        assert_eq!(json["track_id"], 7);
        assert_eq!(json["confidence"], 0.9);
        assert_eq!(json["timestamp"], 12.5);
    }

    #[test]
    fn test_event_roundtrip() {
        let event = Event::new(
            EventPayload::VitalSigns {
                heart_rate: 72.0,
                respiratory_rate: 16.0,
                signal_quality: 0.8,
                hr_confidence: 0.7,
                rr_confidence: 0.6,
            },
            3.0,
            0.8,
            AgentKind::VitalSigns,
            90,
            TrackId(1),
        );

        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }
}
