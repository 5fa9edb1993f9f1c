//! nr-reports - report run orchestration
//!
//! ```text
//! Manifest ──► Discovery ──► Engine ──► Generator ──► Output ──► Channels
//!                              │                                    │
//!                         RunContext                          Status Events
//! ```
//!
//! - `ast`: report definitions and manifests
//! - `context`: layered, immutable run configuration
//! - `generator`: template / dashboard / query variants
//! - `channel`: publisher contract, settings resolution, file and email
//!   channels
//! - `resource`: temp workspace, headless browser, PDF merging
//! - `engine`: the run loop with per-report isolation

pub mod ast;
pub mod channel;
pub mod config;
pub mod context;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod event;
pub mod generator;
pub mod output;
pub mod platform;
pub mod resource;
pub mod secrets;
pub mod template;
pub mod testing;

pub use ast::{ChannelEntry, Manifest, PublishConfig, Report, ReportKind};
pub use channel::{Channel, ChannelRegistry, EmailChannel, Mailer, ResolvedChannel};
pub use config::RunnerConfig;
pub use context::{RunContext, Services};
pub use discovery::{Discovery, FileDiscovery, RunOptions};
pub use engine::{Engine, OutcomeStatus, ReportOutcome, RunSummary};
pub use error::{FixSuggestion, ReportError, Result};
pub use event::{EventLog, StatusEvent, TelemetrySink, STATUS_EVENT_NAME};
pub use generator::{Generator, Generators};
pub use output::{Content, Output, QueryData};
pub use platform::{NerdgraphClient, TelemetryApi};
pub use template::TemplateEngine;
