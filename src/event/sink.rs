//! TelemetrySink trait - abstraction for event and error reporting
//!
//! Enables dependency injection: the engine never talks to a telemetry
//! backend directly. Both calls are fire-and-forget.

use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{error, info};

use crate::error::ReportError;

/// External telemetry collaborator
pub trait TelemetrySink: Send + Sync {
    /// Record a named custom event with flat attributes
    fn record_custom_event(&self, name: &str, fields: Map<String, Value>);

    /// Surface an error to the error-reporting backend
    fn notice_error(&self, error: &ReportError);
}

/// Sink that logs through `tracing`
#[derive(Debug, Clone, Default)]
pub struct TracingSink;

impl TelemetrySink for TracingSink {
    fn record_custom_event(&self, name: &str, fields: Map<String, Value>) {
        info!(event = name, fields = %serde_json::Value::Object(fields), "custom event");
    }

    fn notice_error(&self, error: &ReportError) {
        error!(code = error.code(), "{}", error);
    }
}

/// No-op sink for tests (zero allocation)
#[derive(Debug, Clone, Default)]
pub struct NoopSink;

impl TelemetrySink for NoopSink {
    fn record_custom_event(&self, _name: &str, _fields: Map<String, Value>) {}

    fn notice_error(&self, _error: &ReportError) {}
}

/// Forwards every call to each inner sink, in order
#[derive(Clone, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn TelemetrySink>>,
}

impl FanoutSink {
    pub fn new(sinks: Vec<Arc<dyn TelemetrySink>>) -> Self {
        Self { sinks }
    }
}

impl TelemetrySink for FanoutSink {
    fn record_custom_event(&self, name: &str, fields: Map<String, Value>) {
        for sink in &self.sinks {
            sink.record_custom_event(name, fields.clone());
        }
    }

    fn notice_error(&self, error: &ReportError) {
        for sink in &self.sinks {
            sink.notice_error(error);
        }
    }
}
