//! AST Module - parsed manifest and report definitions
//!
//! - `manifest`: Manifest (reports + shared variables), parsing from YAML/JSON
//! - `report`: Report, ReportKind and the per-variant parameter structs
//!
//! The generator variant of a report is decided once, at load time, and
//! stored as a `ReportKind`; dispatch is a closed match over it.

mod manifest;
mod report;

pub use manifest::Manifest;
pub use report::{
    ChannelEntry, DashboardParams, PublishConfig, QueryParams, Report, ReportKind, TemplateParams,
};
