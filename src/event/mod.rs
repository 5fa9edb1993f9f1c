//! Event Module - report status events and telemetry sinks
//!
//! Key types:
//! - `StatusEvent`: fixed-schema record emitted once per processed report
//! - `TelemetrySink`: fire-and-forget collaborator (custom events + errors)
//! - `TracingSink`: logs everything through `tracing`
//! - `EventLog`: thread-safe, append-only in-memory sink (NDJSON export)
//! - `FanoutSink`: forwards to several sinks

mod log;
mod sink;
mod status;

pub use log::{Event, EventKind, EventLog};
pub use sink::{FanoutSink, NoopSink, TelemetrySink, TracingSink};
pub use status::{StatusEvent, STATUS_EVENT_NAME};
