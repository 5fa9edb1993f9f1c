//! Runner Configuration Module
//!
//! Persistent settings for the report runner.
//! Config is stored in `~/.config/nr-reports/config.toml`.
//!
//! ## Priority Order (highest to lowest)
//!
//! 1. CLI flags (applied by the binary)
//! 2. Environment variables (`NEW_RELIC_API_KEY`, `TEMPLATE_PATH`, ...)
//! 3. Config file (`~/.config/nr-reports/config.toml`)
//! 4. Defaults

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::context::{EnvSource, ProcessEnv};
use crate::error::{ReportError, Result};
use crate::generator::{DashboardFailureMode, DEFAULT_DOWNLOAD_CONCURRENCY};
use crate::platform::DEFAULT_NERDGRAPH_ENDPOINT;
use crate::resource::DEFAULT_MERGE_COMMAND;

pub const DEFAULT_RUNNER_ID: &str = "nr-reports-cli";

/// Main configuration structure
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RunnerConfig {
    /// Telemetry platform access
    #[serde(default)]
    pub api: ApiSettings,

    /// Run behaviour
    #[serde(default)]
    pub runner: RunnerSettings,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct ApiSettings {
    /// User API key (NRAK-...)
    pub api_key: Option<String>,

    pub account_id: Option<u64>,

    /// GraphQL endpoint (defaults to the US region)
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct RunnerSettings {
    pub runner_id: Option<String>,

    /// Template search path, `:`-separated
    pub template_path: Option<String>,

    pub default_channel_type: Option<String>,

    /// Parallel dashboard downloads per report (0 = unbounded)
    pub download_concurrency: Option<u64>,

    /// `no-output` or `fail`
    pub dashboard_failure_mode: Option<String>,

    pub chrome_path: Option<String>,

    /// Merge command; `{inputs}` and `{output}` are substituted
    pub pdf_merge_command: Option<String>,
}

impl RunnerConfig {
    /// Returns `~/.config/nr-reports/` on Unix, `%APPDATA%/nr-reports/` on Windows
    pub fn config_dir() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("nr-reports")
    }

    pub fn config_path() -> PathBuf {
        Self::config_dir().join("config.toml")
    }

    /// Load configuration from the default file
    ///
    /// Returns default config if file doesn't exist.
    /// Returns error if file exists but is malformed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ReportError::ConfigError {
            reason: format!("Failed to read config file: {}", e),
        })?;

        toml::from_str(&content).map_err(|e| ReportError::ConfigError {
            reason: format!("Failed to parse config file: {}", e),
        })
    }

    /// Merge with process environment variables
    ///
    /// Environment variables take precedence over config file values.
    pub fn with_env(self) -> Result<Self> {
        self.with_env_source(&ProcessEnv)
    }

    pub fn with_env_source(mut self, env: &dyn EnvSource) -> Result<Self> {
        if let Some(key) = env.var("NEW_RELIC_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(raw) = env.var("NEW_RELIC_ACCOUNT_ID") {
            self.api.account_id = Some(parse_u64("NEW_RELIC_ACCOUNT_ID", &raw)?);
        }
        if let Some(endpoint) = env.var("NEW_RELIC_API_ENDPOINT") {
            self.api.endpoint = Some(endpoint);
        }

        let runner = &mut self.runner;
        if let Some(v) = env.var("RUNNER_ID") {
            runner.runner_id = Some(v);
        }
        if let Some(v) = env.var("TEMPLATE_PATH") {
            runner.template_path = Some(v);
        }
        if let Some(v) = env.var("DEFAULT_CHANNEL_TYPE") {
            runner.default_channel_type = Some(v);
        }
        if let Some(raw) = env.var("DOWNLOAD_CONCURRENCY") {
            runner.download_concurrency = Some(parse_u64("DOWNLOAD_CONCURRENCY", &raw)?);
        }
        if let Some(v) = env.var("DASHBOARD_FAILURE_MODE") {
            runner.dashboard_failure_mode = Some(v);
        }
        if let Some(v) = env.var("CHROME_PATH") {
            runner.chrome_path = Some(v);
        }
        if let Some(v) = env.var("PDF_MERGE_COMMAND") {
            runner.pdf_merge_command = Some(v);
        }

        Ok(self)
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api.api_key.as_deref()
    }

    pub fn endpoint(&self) -> &str {
        self.api.endpoint.as_deref().unwrap_or(DEFAULT_NERDGRAPH_ENDPOINT)
    }

    pub fn runner_id(&self) -> &str {
        self.runner.runner_id.as_deref().unwrap_or(DEFAULT_RUNNER_ID)
    }

    pub fn default_channel_type(&self) -> &str {
        self.runner.default_channel_type.as_deref().unwrap_or("file")
    }

    pub fn download_concurrency(&self) -> u64 {
        self.runner
            .download_concurrency
            .unwrap_or(DEFAULT_DOWNLOAD_CONCURRENCY)
    }

    pub fn dashboard_failure_mode(&self) -> Result<DashboardFailureMode> {
        match &self.runner.dashboard_failure_mode {
            Some(raw) => raw.parse(),
            None => Ok(DashboardFailureMode::default()),
        }
    }

    pub fn merge_command(&self) -> &str {
        self.runner
            .pdf_merge_command
            .as_deref()
            .unwrap_or(DEFAULT_MERGE_COMMAND)
    }

    pub fn chrome_path(&self) -> Option<PathBuf> {
        self.runner.chrome_path.as_ref().map(PathBuf::from)
    }

    /// Values seeding the root Run Context
    pub fn context_values(&self) -> Result<Map<String, Value>> {
        let mut values = Map::new();
        if let Some(path) = &self.runner.template_path {
            values.insert("templatePath".into(), Value::String(path.clone()));
        }
        if let Some(id) = self.api.account_id {
            values.insert("accountId".into(), Value::from(id));
        }
        values.insert(
            "downloadConcurrency".into(),
            Value::from(self.download_concurrency()),
        );
        values.insert(
            "dashboardFailureMode".into(),
            Value::String(self.dashboard_failure_mode()?.as_str().to_string()),
        );
        Ok(values)
    }
}

fn parse_u64(key: &str, raw: &str) -> Result<u64> {
    raw.trim().parse().map_err(|_| ReportError::InvalidSetting {
        key: key.to_string(),
        value: raw.to_string(),
        reason: "expected a non-negative integer".to_string(),
    })
}

/// Mask an API key for display
///
/// Shows first N chars + asterisks, e.g. "NRAK-AB***"
pub fn mask_api_key(key: &str, visible_chars: usize) -> String {
    if key.is_empty() {
        return String::new();
    }

    let visible: String = key.chars().take(visible_chars).collect();
    format!("{}***", visible)
}
