//! Status Event schema
//!
//! Field names are fixed for compatibility with downstream dashboards.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Custom event name used for report status records
pub const STATUS_EVENT_NAME: &str = "ReportStatus";

/// Outcome of one processed report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusEvent {
    pub report_id: String,
    pub report_name: String,
    pub runner_id: String,
    pub runner_version: String,
    /// Selected publish configuration ids, comma-joined
    pub publish_config_ids: String,
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StatusEvent {
    /// Event fields as a flat attribute map
    pub fn to_fields(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    pub fn from_fields(fields: &Map<String, Value>) -> Option<Self> {
        serde_json::from_value(Value::Object(fields.clone())).ok()
    }
}
