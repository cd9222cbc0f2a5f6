//! Status records streamed by a running worker.
//!
//! Workers interleave `{"type":"status", ...}` lines with free-form output.
//! Lines that are not status records are dropped here without error.

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

/// Buffered events per subscriber before the slowest one starts lagging.
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// One progress notification from a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtext: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub color: Option<String>,
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
enum WorkerLine {
    Status(StatusEvent),
}

/// Parse one output line as a status record.
pub fn parse_status_line(line: &str) -> Option<StatusEvent> {
    let line = line.trim();
    if !line.starts_with('{') {
        return None;
    }
    match serde_json::from_str::<WorkerLine>(line) {
        Ok(WorkerLine::Status(event)) => Some(event),
        Err(_) => None,
    }
}

/// Fan-out of status events to any number of listeners (a UI, a log sink,
/// a test harness).
///
/// Events are published as each line is read and arrive in order. A
/// subscriber only sees events published after it subscribed.
#[derive(Debug, Clone)]
pub struct StatusEventBus {
    tx: broadcast::Sender<StatusEvent>,
}

impl StatusEventBus {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: StatusEvent) {
        // No subscribers is fine
        let _ = self.tx.send(event);
    }

    /// Publish `line` if it is a status record. Returns whether it was one.
    pub fn publish_line(&self, line: &str) -> bool {
        match parse_status_line(line) {
            Some(event) => {
                debug!("Worker status: {}", event.text);
                self.publish(event);
                true
            }
            None => false,
        }
    }
}

/// Next event for a subscriber, skipping over any it fell behind on.
///
/// Returns `None` once the bus is gone and everything buffered was read.
pub async fn next_status(rx: &mut broadcast::Receiver<StatusEvent>) -> Option<StatusEvent> {
    loop {
        match rx.recv().await {
            Ok(event) => return Some(event),
            Err(RecvError::Lagged(skipped)) => {
                warn!("Status subscriber lagged, {} events skipped", skipped);
            }
            Err(RecvError::Closed) => return None,
        }
    }
}

impl Default for StatusEventBus {
    fn default() -> Self {
        Self::new()
    }
}
