//! Alert delivery boundary.
//!
//! An [`AlertSink`] receives every alert the pipeline emits. Sinks are the
//! edge of this crate: anything beyond local output (paging, messaging,
//! nurse-station integration) is implemented as a sink by the embedding
//! application. Sink failures are logged and never stall the pipeline.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::domain::{Alert, AlertLevel};
use crate::Result;

/// Receives alerts at the edge of the pipeline.
#[async_trait]
pub trait AlertSink: Send + Sync {
    /// Stable sink name, used in delivery-failure logs.
    fn name(&self) -> &str;

    /// Deliver one alert. Errors are logged by the caller, not retried.
    async fn handle(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to stdout, one line each, colorized by level.
pub struct ConsoleSink {
    use_color: bool,
}

impl ConsoleSink {
    /// Create a console sink with ANSI colors enabled.
    pub fn new() -> Self {
        Self { use_color: true }
    }

    /// Create a console sink that emits plain text.
    pub fn plain() -> Self {
        Self { use_color: false }
    }

    fn color_code(level: AlertLevel) -> &'static str {
        match level {
            AlertLevel::Critical => "\x1b[1;31m",
            AlertLevel::High => "\x1b[31m",
            AlertLevel::Medium => "\x1b[33m",
            AlertLevel::Low => "\x1b[36m",
            AlertLevel::Info => "\x1b[37m",
        }
    }
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AlertSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn handle(&self, alert: &Alert) -> Result<()> {
        let line = format!(
            "[{}] t={:.2}s track={} {}",
            alert.level, alert.timestamp, alert.primary_event.track_id, alert.message
        );
        if self.use_color {
            println!("{}{}\x1b[0m", Self::color_code(alert.level), line);
        } else {
            println!("{line}");
        }
        Ok(())
    }
}

/// Appends alerts to a file as JSON Lines, one serialized [`Alert`] per
/// line. Suitable for audit trails and downstream ingestion.
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<File>,
}

impl JsonLinesSink {
    /// Open (or create) the log file in append mode.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    /// Path of the underlying log file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl AlertSink for JsonLinesSink {
    fn name(&self) -> &str {
        "jsonl"
    }

    async fn handle(&self, alert: &Alert) -> Result<()> {
        let mut line = serde_json::to_string(alert)?;
        line.push('\n');

        let mut file = self.file.lock().await;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AgentKind, Event, EventPayload, FallType, TrackId};

    fn sample_alert() -> Alert {
        let event = Event::new(
            EventPayload::FallDetected {
                fall_type: FallType::Fall,
                torso_angle: 78.0,
                hip_height: 0.15,
                vertical_velocity: 0.7,
            },
            12.5,
            0.9,
            AgentKind::FallDetection,
            375,
            TrackId(2),
        );
        Alert::new(AlertLevel::Critical, "Fall detected", event)
    }

    #[tokio::test]
    async fn test_console_sink_accepts_alert() {
        let sink = ConsoleSink::plain();
        assert!(sink.handle(&sample_alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_jsonl_sink_appends_parseable_lines() {
        let path = std::env::temp_dir().join(format!("alerts-{}.jsonl", uuid::Uuid::new_v4()));
        let sink = JsonLinesSink::create(&path).await.unwrap();

        sink.handle(&sample_alert()).await.unwrap();
        sink.handle(&sample_alert()).await.unwrap();

        let contents = tokio::fs::read_to_string(&path).await.unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["level"], "CRITICAL");
        assert_eq!(parsed["primary_event"]["event_type"], "fall_detection");

        tokio::fs::remove_file(&path).await.unwrap();
    }
}
