//! Status reporting abstraction
//!
//! The cell reports human-readable progress to whatever presentation
//! layer embeds it. Sinks must return immediately; the sequencer never
//! waits on them.

use serde::Serialize;
use tracing::info;

/// Trait for receiving status messages from the cell
pub trait StatusSink: Send + Sync {
    fn report(&self, message: &str);
}

/// Discards all status messages
#[derive(Debug, Clone, Default)]
pub struct NoOpStatus;

impl StatusSink for NoOpStatus {
    fn report(&self, _message: &str) {}
}

/// Forwards status messages to the tracing subscriber
#[derive(Debug, Clone, Default)]
pub struct LogStatus;

impl StatusSink for LogStatus {
    fn report(&self, message: &str) {
        info!(target: "trayd::status", "{}", message);
    }
}

/// Status line emitted by [`ConsoleStatus`]
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent<'a> {
    pub timestamp: String,
    #[serde(rename = "type")]
    pub event_type: &'static str,
    pub message: &'a str,
}

impl<'a> StatusEvent<'a> {
    pub fn now(message: &'a str) -> Self {
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            event_type: "status",
            message,
        }
    }

    /// One compact JSON line
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Prints status messages to stderr as JSON lines, leaving stdout to results
#[derive(Debug, Clone, Default)]
pub struct ConsoleStatus;

impl ConsoleStatus {
    pub fn new() -> Self {
        Self
    }
}

impl StatusSink for ConsoleStatus {
    fn report(&self, message: &str) {
        match StatusEvent::now(message).to_line() {
            Ok(line) => eprintln!("{}", line),
            Err(e) => tracing::warn!("Failed to render status event: {}", e),
        }
    }
}
