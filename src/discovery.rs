//! Discovery - resolving the manifest for a run
//!
//! `FileDiscovery` loads manifest files (YAML or JSON, glob patterns
//! allowed) and merges them in order, or builds a one-report manifest from
//! the single-report options. `--var` overrides win over manifest
//! variables.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::ast::{Manifest, Report};
use crate::context::RunContext;
use crate::error::{ReportError, Result};

/// Options of one run (parsed from the CLI by the binary)
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Manifest files or glob patterns
    pub manifest_paths: Vec<String>,
    /// Single template report
    pub template_name: Option<String>,
    /// Single dashboard report
    pub dashboards: Vec<String>,
    /// Single query report
    pub query: Option<String>,
    pub account_ids: Vec<u64>,
    pub combine_pdfs: bool,
    /// Id/name of the synthesized single report
    pub report_name: Option<String>,
    /// Publish configurations to deliver to
    pub publish_config_ids: Vec<String>,
    /// `--var key=value` overrides
    pub variables: Map<String, Value>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            manifest_paths: Vec::new(),
            template_name: None,
            dashboards: Vec::new(),
            query: None,
            account_ids: Vec::new(),
            combine_pdfs: false,
            report_name: None,
            publish_config_ids: vec!["default".to_string()],
            variables: Map::new(),
        }
    }
}

impl RunOptions {
    pub fn with_manifest(mut self, path: impl Into<String>) -> Self {
        self.manifest_paths.push(path.into());
        self
    }

    pub fn with_publish_config_ids(mut self, ids: Vec<String>) -> Self {
        self.publish_config_ids = ids;
        self
    }

    /// Comma-joined ids, as recorded on Status Events
    pub fn publish_config_ids_joined(&self) -> String {
        self.publish_config_ids.join(",")
    }

    fn single_report(&self) -> Option<Report> {
        let mut fields = Map::new();
        if let Some(template) = &self.template_name {
            fields.insert("templateName".into(), Value::String(template.clone()));
        } else if !self.dashboards.is_empty() {
            fields.insert(
                "dashboards".into(),
                Value::Array(self.dashboards.iter().cloned().map(Value::String).collect()),
            );
            fields.insert("combinePdfs".into(), Value::Bool(self.combine_pdfs));
        } else if let Some(query) = &self.query {
            fields.insert("query".into(), Value::String(query.clone()));
            if !self.account_ids.is_empty() {
                fields.insert("accountIds".into(), Value::from(self.account_ids.clone()));
            }
        } else {
            return None;
        }

        let id = self.report_name.clone().unwrap_or_else(|| "report".to_string());
        fields.insert("id".into(), Value::String(id));
        Some(Report::from_fields(fields))
    }
}

/// Parse `key=value`; values that parse as JSON keep their type
pub fn parse_var(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw.split_once('=').ok_or_else(|| ReportError::InvalidSetting {
        key: "var".to_string(),
        value: raw.to_string(),
        reason: "expected key=value".to_string(),
    })?;
    let key = key.trim();
    if key.is_empty() {
        return Err(ReportError::InvalidSetting {
            key: "var".to_string(),
            value: raw.to_string(),
            reason: "empty key".to_string(),
        });
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[async_trait]
pub trait Discovery: Send + Sync {
    async fn discover_reports(&self, ctx: &RunContext, options: &RunOptions) -> Result<Manifest>;
}

/// Manifest files on disk
#[derive(Debug, Clone, Copy, Default)]
pub struct FileDiscovery;

impl FileDiscovery {
    fn expand(pattern: &str) -> Result<Vec<PathBuf>> {
        let is_glob = pattern.contains(['*', '?', '[']);
        if !is_glob {
            let path = PathBuf::from(pattern);
            if !path.is_file() {
                return Err(ReportError::ManifestNotFound {
                    path: pattern.to_string(),
                });
            }
            return Ok(vec![path]);
        }

        let entries = glob::glob(pattern).map_err(|e| ReportError::Discovery {
            reason: format!("invalid pattern '{}': {}", pattern, e),
        })?;
        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok())
            .filter(|p| p.is_file())
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(ReportError::ManifestNotFound {
                path: pattern.to_string(),
            });
        }
        Ok(paths)
    }
}

#[async_trait]
impl Discovery for FileDiscovery {
    async fn discover_reports(&self, ctx: &RunContext, options: &RunOptions) -> Result<Manifest> {
        let mut manifest = match options.single_report() {
            Some(report) => {
                debug!(kind = report.kind.name(), "single report from options");
                Manifest::new(vec![report], Map::new())
            }
            None => {
                let mut patterns = options.manifest_paths.clone();
                if patterns.is_empty() {
                    if let Some(path) = ctx.get_str("manifestFilePath", Some("MANIFEST_FILE_PATH")) {
                        patterns.push(path);
                    }
                }

                let mut merged = Manifest::default();
                for pattern in &patterns {
                    for path in Self::expand(pattern)? {
                        let content = tokio::fs::read_to_string(&path).await?;
                        let display_path = path.display().to_string();
                        let manifest = Manifest::parse(&content, &display_path)?;
                        info!(path = %display_path, reports = manifest.len(), "loaded manifest");
                        merged.merge(manifest);
                    }
                }
                merged
            }
        };

        for (key, value) in &options.variables {
            manifest.variables.insert(key.clone(), value.clone());
        }
        Ok(manifest)
    }
}
