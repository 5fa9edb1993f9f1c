//! EventLog - in-memory telemetry sink
//!
//! - Event: envelope with id + timestamp + kind
//! - EventLog: thread-safe, append-only log; exports NDJSON for `--events-file`

use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ReportError, Result};

use super::sink::TelemetrySink;
use super::status::{StatusEvent, STATUS_EVENT_NAME};

/// Single entry in the log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// Monotonic sequence ID (for ordering)
    pub id: u64,
    /// Time since log creation (ms)
    pub timestamp_ms: u64,
    pub kind: EventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    CustomEvent {
        name: String,
        fields: Map<String, Value>,
    },
    Error {
        code: String,
        message: String,
    },
}

/// Thread-safe, append-only event log
#[derive(Clone)]
pub struct EventLog {
    events: Arc<RwLock<Vec<Event>>>,
    start_time: Instant,
    next_id: Arc<AtomicU64>,
}

impl EventLog {
    pub fn new() -> Self {
        Self {
            events: Arc::new(RwLock::new(Vec::new())),
            start_time: Instant::now(),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Append an event (thread-safe, returns event ID)
    pub fn emit(&self, kind: EventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let event = Event {
            id,
            timestamp_ms: self.start_time.elapsed().as_millis() as u64,
            kind,
        };

        self.events.write().push(event);
        id
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.read().clone()
    }

    /// Zero-copy access to events via callback
    ///
    /// Holds the read lock for the duration of the callback.
    pub fn with_events<T>(&self, f: impl FnOnce(&[Event]) -> T) -> T {
        f(&self.events.read())
    }

    /// Report status events, in emission order
    pub fn status_events(&self) -> Vec<StatusEvent> {
        self.with_events(|events| {
            events
                .iter()
                .filter_map(|e| match &e.kind {
                    EventKind::CustomEvent { name, fields } if name == STATUS_EVENT_NAME => {
                        StatusEvent::from_fields(fields)
                    }
                    _ => None,
                })
                .collect()
        })
    }

    /// Messages of noticed errors, in order
    pub fn errors(&self) -> Vec<String> {
        self.with_events(|events| {
            events
                .iter()
                .filter_map(|e| match &e.kind {
                    EventKind::Error { message, .. } => Some(message.clone()),
                    _ => None,
                })
                .collect()
        })
    }

    pub fn to_json(&self) -> Value {
        self.with_events(|events| serde_json::to_value(events).unwrap_or(Value::Null))
    }

    /// Write one JSON object per line
    pub fn write_ndjson(&self, path: &Path) -> Result<()> {
        let mut file = std::fs::File::create(path)?;
        self.with_events(|events| -> Result<()> {
            for event in events {
                let line = serde_json::to_string(event).map_err(ReportError::from)?;
                writeln!(file, "{}", line)?;
            }
            Ok(())
        })
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog").field("len", &self.len()).finish()
    }
}

impl TelemetrySink for EventLog {
    fn record_custom_event(&self, name: &str, fields: Map<String, Value>) {
        self.emit(EventKind::CustomEvent {
            name: name.to_string(),
            fields,
        });
    }

    fn notice_error(&self, error: &ReportError) {
        self.emit(EventKind::Error {
            code: error.code().to_string(),
            message: error.to_string(),
        });
    }
}
