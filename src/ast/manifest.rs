//! Manifest - ordered reports plus shared variables
//!
//! Accepted document shapes (YAML or JSON):
//!
//! ```yaml
//! # list form
//! - id: daily
//!   templateName: daily.md
//!
//! # mapping form
//! variables:
//!   team: core
//! reports:
//!   - id: weekly
//!     dashboards: [ "MXxBUE18..." ]
//! ```

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{ReportError, Result};

use super::report::Report;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Manifest {
    pub reports: Vec<Report>,
    pub variables: Map<String, Value>,
}

impl Manifest {
    pub fn new(reports: Vec<Report>, variables: Map<String, Value>) -> Self {
        Self { reports, variables }
    }

    /// Parse a manifest document; `.json` files use the JSON parser, all
    /// others YAML
    pub fn parse(content: &str, path: &str) -> Result<Self> {
        let parse_err = |details: String| ReportError::ManifestParse {
            path: path.to_string(),
            details,
        };

        let is_json = Path::new(path)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let doc: Value = if is_json {
            serde_json::from_str(content).map_err(|e| parse_err(e.to_string()))?
        } else {
            serde_yaml::from_str(content).map_err(|e| parse_err(e.to_string()))?
        };

        // Report entries are taken as raw values; a malformed one becomes an
        // invalid report rather than a parse error for the whole document.
        match doc {
            Value::Array(entries) => Ok(Self::new(reports_from(entries), Map::new())),
            Value::Object(mut doc) => {
                let reports = match doc.remove("reports") {
                    None | Some(Value::Null) => Vec::new(),
                    Some(Value::Array(entries)) => reports_from(entries),
                    Some(other) => {
                        return Err(parse_err(format!(
                            "'reports' must be a list, got {}",
                            other
                        )))
                    }
                };
                let variables = match doc.remove("variables") {
                    None | Some(Value::Null) => Map::new(),
                    Some(Value::Object(vars)) => vars,
                    Some(other) => {
                        return Err(parse_err(format!(
                            "'variables' must be a mapping, got {}",
                            other
                        )))
                    }
                };
                Ok(Self::new(reports, variables))
            }
            other => Err(parse_err(format!(
                "expected a list of reports or a mapping with 'reports', got {}",
                other
            ))),
        }
    }

    /// Append another manifest (reports in order, later variables win)
    pub fn merge(&mut self, other: Manifest) {
        self.reports.extend(other.reports);
        self.variables.extend(other.variables);
    }

    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    pub fn len(&self) -> usize {
        self.reports.len()
    }
}

fn reports_from(entries: Vec<Value>) -> Vec<Report> {
    entries.into_iter().map(Report::from_value).collect()
}
