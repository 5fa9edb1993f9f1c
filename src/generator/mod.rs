//! Generator Module - report definition to Output
//!
//! Closed set of variants, selected by `ReportKind`:
//! - `TemplateGenerator`: interpolated template, inline or as a page document
//! - `DashboardGenerator`: dashboard PDF snapshots, optionally merged
//! - `QueryGenerator`: NRQL results, rendered later per channel
//!
//! `generate` returns `Ok(None)` when the variant decided there is no
//! output (e.g. a swallowed dashboard export failure).

mod dashboard;
mod query;
mod template;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;

use crate::ast::{Manifest, Report, ReportKind};
use crate::context::RunContext;
use crate::error::{ReportError, Result};
use crate::output::Output;
use crate::platform::TelemetryApi;
use crate::resource::DocumentMerger;

pub use dashboard::{
    DashboardFailureMode, DashboardGenerator, CONSOLIDATED_PDF_NAME, DEFAULT_DOWNLOAD_CONCURRENCY,
};
pub use query::QueryGenerator;
pub use template::TemplateGenerator;

#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &'static str;

    /// Prepare variant-wide state; called once per run, must be idempotent
    fn init(&self, _ctx: &RunContext) -> Result<()> {
        Ok(())
    }

    async fn generate(
        &self,
        ctx: &RunContext,
        manifest: &Manifest,
        report: &Report,
        workspace: &Path,
    ) -> Result<Option<Output>>;
}

/// Error for a report handed to the wrong variant
pub(crate) fn kind_mismatch(generator: &str, report: &Report) -> ReportError {
    ReportError::GeneratorFailed {
        report: report.display_name(0),
        reason: format!(
            "{} generator cannot run a {} report",
            generator,
            report.kind.name()
        ),
    }
}

/// One generator per variant
#[derive(Clone)]
pub struct Generators {
    template: Arc<dyn Generator>,
    dashboard: Arc<dyn Generator>,
    query: Arc<dyn Generator>,
}

impl Generators {
    /// Built-in generators over the given platform and merger
    pub fn new(api: Arc<dyn TelemetryApi>, merger: Arc<dyn DocumentMerger>) -> Self {
        Self {
            template: Arc::new(TemplateGenerator),
            dashboard: Arc::new(DashboardGenerator::new(Arc::clone(&api), merger)),
            query: Arc::new(QueryGenerator::new(api)),
        }
    }

    pub fn with_template(mut self, generator: Arc<dyn Generator>) -> Self {
        self.template = generator;
        self
    }

    pub fn with_dashboard(mut self, generator: Arc<dyn Generator>) -> Self {
        self.dashboard = generator;
        self
    }

    pub fn with_query(mut self, generator: Arc<dyn Generator>) -> Self {
        self.query = generator;
        self
    }

    /// Generator for a report kind; `None` for unrecognized or invalid reports
    pub fn select(&self, kind: &ReportKind) -> Option<&Arc<dyn Generator>> {
        match kind {
            ReportKind::Template(_) => Some(&self.template),
            ReportKind::Dashboard(_) => Some(&self.dashboard),
            ReportKind::Query(_) => Some(&self.query),
            ReportKind::Unrecognized | ReportKind::Invalid(_) => None,
        }
    }

    pub fn init_all(&self, ctx: &RunContext) -> Result<()> {
        self.template.init(ctx)?;
        self.dashboard.init(ctx)?;
        self.query.init(ctx)
    }
}

impl std::fmt::Debug for Generators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Generators")
            .field("template", &self.template.name())
            .field("dashboard", &self.dashboard.name())
            .field("query", &self.query.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MockPlatform, RecordingMerger};
    use serde_json::json;

    #[test]
    fn select_is_a_closed_match() {
        let generators = Generators::new(
            Arc::new(MockPlatform::new()),
            Arc::new(RecordingMerger::new()),
        );
        let kind = |v| Report::from_value(v).kind;

        let name = |k: &ReportKind| generators.select(k).map(|g| g.name());
        assert_eq!(name(&kind(json!({ "templateName": "a.md" }))), Some("template"));
        assert_eq!(name(&kind(json!({ "dashboards": [] }))), Some("dashboard"));
        assert_eq!(name(&kind(json!({ "query": "q" }))), Some("query"));
        assert_eq!(name(&kind(json!({ "other": 1 }))), None);
        assert_eq!(name(&kind(json!({ "query": 7 }))), None);
    }
}
