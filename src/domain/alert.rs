//! Prioritized alerts produced by the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::Event;

/// Unique identifier for an alert.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(Uuid);

impl AlertId {
    /// Create a new random alert ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AlertId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Alert severity, strictly ordered: Info < Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AlertLevel {
    /// Informational
    Info,
    /// Low severity
    Low,
    /// Medium severity
    Medium,
    /// High severity, urgent attention
    High,
    /// Critical, immediate action required
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            AlertLevel::Info => "INFO",
            AlertLevel::Low => "LOW",
            AlertLevel::Medium => "MEDIUM",
            AlertLevel::High => "HIGH",
            AlertLevel::Critical => "CRITICAL",
        };
        f.write_str(s)
    }
}

/// A consolidated, human-actionable alert.
///
/// `related_events` holds the additional events that satisfied a
/// multi-condition fusion rule; all of them fall within the correlation
/// window of `primary_event`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert identifier
    pub alert_id: AlertId,
    /// Severity level
    pub level: AlertLevel,
    /// Human-readable message
    pub message: String,
    /// Stream timestamp of the primary event
    pub timestamp: f64,
    /// Frame the alert derives from
    pub frame_id: u64,
    /// The event that triggered the alert
    pub primary_event: Event,
    /// Further contributing events, possibly empty
    pub related_events: Vec<Event>,
    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Create an alert around a primary event.
    pub fn new(level: AlertLevel, message: impl Into<String>, primary_event: Event) -> Self {
        Self {
            alert_id: AlertId::new(),
            level,
            message: message.into(),
            timestamp: primary_event.timestamp,
            frame_id: primary_event.frame_id,
            primary_event,
            related_events: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Attach related events.
    pub fn with_related(mut self, related: Vec<Event>) -> Self {
        self.related_events = related;
        self
    }

    /// All contributing events, primary first.
    pub fn events(&self) -> impl Iterator<Item = &Event> {
        std::iter::once(&self.primary_event).chain(self.related_events.iter())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::{AgentKind, EventPayload, LightBand};
    use crate::domain::observation::TrackId;

    fn sample_event() -> Event {
        Event::new(
            EventPayload::LowLight {
                band: LightBand::Dim,
                brightness: 55.0,
            },
            1.0,
            0.8,
            AgentKind::Environment,
            10,
            TrackId(3),
        )
    }

    #[test]
    fn test_level_ordering() {
        assert!(AlertLevel::Info < AlertLevel::Low);
        assert!(AlertLevel::Low < AlertLevel::Medium);
        assert!(AlertLevel::Medium < AlertLevel::High);
        assert!(AlertLevel::High < AlertLevel::Critical);
    }

    #[test]
    fn test_alert_inherits_event_envelope() {
        let alert = Alert::new(AlertLevel::Low, "dim lighting", sample_event());
        assert_eq!(alert.timestamp, 1.0);
        assert_eq!(alert.frame_id, 10);
        assert!(alert.related_events.is_empty());
        assert_eq!(alert.events().count(), 1);
    }

    #[test]
    fn test_level_wire_format() {
        let json = serde_json::to_value(AlertLevel::Critical).unwrap();
        assert_eq!(json, "CRITICAL");
    }
}
