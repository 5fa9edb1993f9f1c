// The #[error] attribute from thiserror uses struct fields via string interpolation,
// but Rust's unused_assignments lint doesn't recognize this.
#![allow(unused_assignments)]

//! Error types with error codes and fix suggestions
//!
//! Error code ranges:
//! - NR-000-009: Manifest/discovery errors (run-level, fatal)
//! - NR-010-019: Configuration errors
//! - NR-020-029: Generator errors
//! - NR-030-039: Telemetry platform API errors
//! - NR-040-049: Channel/publish errors
//! - NR-050-059: Resource errors (workspace, browser, merge)
//! - NR-090-099: IO/serialization errors

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ReportError>;

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// All error variants are part of the public API.
#[derive(Error, Debug)]
pub enum ReportError {
    // ═══════════════════════════════════════════
    // MANIFEST / DISCOVERY ERRORS (000-009)
    // ═══════════════════════════════════════════
    #[error("[NR-001] No reports selected")]
    NoReports,

    #[error("[NR-002] Manifest not found: {path}")]
    ManifestNotFound { path: String },

    #[error("[NR-003] Failed to parse manifest '{path}': {details}")]
    ManifestParse { path: String, details: String },

    #[error("[NR-004] Discovery failed: {reason}")]
    Discovery { reason: String },

    // ═══════════════════════════════════════════
    // CONFIGURATION ERRORS (010-019)
    // ═══════════════════════════════════════════
    #[error("[NR-010] Configuration error: {reason}")]
    ConfigError { reason: String },

    #[error("[NR-011] Invalid format '{format}' for channel '{channel}' (expected html or text)")]
    InvalidFormat { channel: String, format: String },

    #[error("[NR-012] Missing required setting '{key}'")]
    MissingSetting { key: String },

    #[error("[NR-013] Unknown channel type '{kind}'")]
    UnknownChannel { kind: String },

    #[error("[NR-014] Invalid value '{value}' for '{key}': {reason}")]
    InvalidSetting {
        key: String,
        value: String,
        reason: String,
    },

    #[error("[NR-015] Invalid report '{report}': {reason}")]
    InvalidReport { report: String, reason: String },

    // ═══════════════════════════════════════════
    // GENERATOR ERRORS (020-029)
    // ═══════════════════════════════════════════
    #[error("[NR-020] Template '{name}' not found in search path")]
    TemplateNotFound { name: String },

    #[error("[NR-021] Template error in '{template}': {reason}")]
    TemplateError { template: String, reason: String },

    #[error("[NR-022] Dashboard export failed for '{guid}': {reason}")]
    DashboardExport { guid: String, reason: String },

    #[error("[NR-023] Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("[NR-024] Generator for report '{report}' failed: {reason}")]
    GeneratorFailed { report: String, reason: String },

    // ═══════════════════════════════════════════
    // PLATFORM API ERRORS (030-039)
    // ═══════════════════════════════════════════
    #[error("[NR-030] Platform API error: {message}")]
    PlatformApi { message: String },

    #[error("[NR-031] Missing API key")]
    MissingApiKey,

    #[error("[NR-032] Download of {url} failed: status={status}")]
    DownloadFailed { url: String, status: u16 },

    #[error("[NR-033] HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    // ═══════════════════════════════════════════
    // CHANNEL ERRORS (040-049)
    // ═══════════════════════════════════════════
    #[error("[NR-040] Channel '{channel}' failed: {reason}")]
    ChannelFailed { channel: String, reason: String },

    #[error("[NR-041] Publishing failed for {} channel(s): {}", .failures.len(), .failures.join("; "))]
    PublishFailed { failures: Vec<String> },

    // ═══════════════════════════════════════════
    // RESOURCE ERRORS (050-059)
    // ═══════════════════════════════════════════
    #[error("[NR-050] Failed to create temp workspace: {reason}")]
    Workspace { reason: String },

    #[error("[NR-051] Browser error: {reason}")]
    Browser { reason: String },

    #[error("[NR-052] Failed to merge {count} documents: {reason}")]
    MergeFailed { count: usize, reason: String },

    #[error("[NR-053] Report '{report}' panicked: {reason}")]
    Panicked { report: String, reason: String },

    // ═══════════════════════════════════════════
    // IO / SERIALIZATION ERRORS (090-099)
    // ═══════════════════════════════════════════
    #[error("[NR-090] IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("[NR-091] JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("[NR-092] YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("[NR-093] CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl ReportError {
    /// Run-level errors abort the whole run before any report is processed.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::NoReports
                | Self::ManifestNotFound { .. }
                | Self::ManifestParse { .. }
                | Self::Discovery { .. }
                | Self::Workspace { .. }
        )
    }

    /// Get the error code (e.g., "NR-001")
    pub fn code(&self) -> &'static str {
        match self {
            Self::NoReports => "NR-001",
            Self::ManifestNotFound { .. } => "NR-002",
            Self::ManifestParse { .. } => "NR-003",
            Self::Discovery { .. } => "NR-004",
            Self::ConfigError { .. } => "NR-010",
            Self::InvalidFormat { .. } => "NR-011",
            Self::MissingSetting { .. } => "NR-012",
            Self::UnknownChannel { .. } => "NR-013",
            Self::InvalidSetting { .. } => "NR-014",
            Self::InvalidReport { .. } => "NR-015",
            Self::TemplateNotFound { .. } => "NR-020",
            Self::TemplateError { .. } => "NR-021",
            Self::DashboardExport { .. } => "NR-022",
            Self::QueryFailed { .. } => "NR-023",
            Self::GeneratorFailed { .. } => "NR-024",
            Self::PlatformApi { .. } => "NR-030",
            Self::MissingApiKey => "NR-031",
            Self::DownloadFailed { .. } => "NR-032",
            Self::Http(_) => "NR-033",
            Self::ChannelFailed { .. } => "NR-040",
            Self::PublishFailed { .. } => "NR-041",
            Self::Workspace { .. } => "NR-050",
            Self::Browser { .. } => "NR-051",
            Self::MergeFailed { .. } => "NR-052",
            Self::Panicked { .. } => "NR-053",
            Self::Io(_) => "NR-090",
            Self::Json(_) => "NR-091",
            Self::Yaml(_) => "NR-092",
            Self::Csv(_) => "NR-093",
        }
    }
}

impl FixSuggestion for ReportError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            ReportError::NoReports => {
                Some("Pass a manifest with -f, or select a single report with --template-name, --dashboard or --query")
            }
            ReportError::ManifestNotFound { .. } => Some("Check the manifest path or glob pattern"),
            ReportError::ManifestParse { .. } => {
                Some("Manifests are YAML or JSON: a list of reports, or { reports, variables }")
            }
            ReportError::InvalidFormat { .. } => Some("Set the channel 'format' to 'html' or 'text'"),
            ReportError::InvalidReport { .. } => {
                Some("Check the report's templateName, dashboards or query fields and their types")
            }
            ReportError::UnknownChannel { .. } => {
                Some("Supported channel types: file, and email when a mail transport is registered")
            }
            ReportError::MissingApiKey => {
                Some("Set NEW_RELIC_API_KEY or add api_key to the config file")
            }
            ReportError::TemplateNotFound { .. } => {
                Some("Add the template directory with --template-path or TEMPLATE_PATH")
            }
            ReportError::MergeFailed { .. } => {
                Some("Install qpdf or set PDF_MERGE_COMMAND to a working merge command")
            }
            ReportError::Browser { .. } => {
                Some("Install Chrome/Chromium or point CHROME_PATH at the executable")
            }
            _ => None,
        }
    }
}
