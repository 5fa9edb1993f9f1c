//! Run Orchestrator
//!
//! ```text
//! Init → Discover → (per report: Select → Generate → Publish → Record) → Teardown
//! ```
//!
//! - Discover failures and empty manifests abort the run before any report.
//! - Reports run sequentially, in manifest order.
//! - Each report is isolated: an error, a panic or a malformed definition
//!   becomes a failure Status Event and the loop continues.
//! - Exactly one Status Event per processed report; none for skipped ones.
//! - The browser is opened only if some report needs it, and closed once at
//!   teardown. The temp workspace lives for the whole run.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use futures::FutureExt;
use serde::Serialize;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::ast::{Manifest, Report};
use crate::channel::{publish_all, resolve_channels, ChannelRegistry};
use crate::context::RunContext;
use crate::discovery::{Discovery, FileDiscovery, RunOptions};
use crate::error::{ReportError, Result};
use crate::event::{StatusEvent, STATUS_EVENT_NAME};
use crate::generator::{Generator, Generators};
use crate::resource::{BrowserLauncher, ChromeLauncher, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    /// Output generated and delivered to every channel
    Succeeded,
    /// Generator produced nothing; recorded as a success
    NoOutput,
    Failed,
    /// Unrecognized report; no Status Event
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportOutcome {
    pub index: usize,
    pub report_id: String,
    pub report_name: String,
    pub status: OutcomeStatus,
    pub message: Option<String>,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub run_id: String,
    pub processed: usize,
    pub succeeded: usize,
    pub no_output: usize,
    pub failed: usize,
    pub skipped: usize,
    pub browser_opened: bool,
    pub outcomes: Vec<ReportOutcome>,
}

impl RunSummary {
    fn new(run_id: String, browser_opened: bool, outcomes: Vec<ReportOutcome>) -> Self {
        let count = |status: OutcomeStatus| outcomes.iter().filter(|o| o.status == status).count();
        let skipped = count(OutcomeStatus::Skipped);
        Self {
            run_id,
            processed: outcomes.len() - skipped,
            succeeded: count(OutcomeStatus::Succeeded),
            no_output: count(OutcomeStatus::NoOutput),
            failed: count(OutcomeStatus::Failed),
            skipped,
            browser_opened,
            outcomes,
        }
    }

    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// What a successful iteration produced
enum Processed {
    Published,
    NoOutput,
}

/// Report run orchestrator
pub struct Engine {
    discovery: Arc<dyn Discovery>,
    generators: Generators,
    channels: ChannelRegistry,
    browser: Arc<dyn BrowserLauncher>,
}

impl Engine {
    /// Engine with file discovery, built-in channels and headless Chrome
    pub fn new(generators: Generators) -> Self {
        Self {
            discovery: Arc::new(FileDiscovery),
            generators,
            channels: ChannelRegistry::builtin(),
            browser: Arc::new(ChromeLauncher::default()),
        }
    }

    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = discovery;
        self
    }

    pub fn with_channels(mut self, channels: ChannelRegistry) -> Self {
        self.channels = channels;
        self
    }

    pub fn with_browser_launcher(mut self, browser: Arc<dyn BrowserLauncher>) -> Self {
        self.browser = browser;
        self
    }

    /// Execute one run
    ///
    /// Returns `Err` only for run-level failures; per-report failures are
    /// reported through Status Events and the summary.
    #[instrument(skip_all, fields(runner = %ctx.runner_id()))]
    pub async fn run(&self, ctx: &RunContext, options: &RunOptions) -> Result<RunSummary> {
        let run_id = Uuid::new_v4().to_string();
        let started = Instant::now();

        let manifest = self.discovery.discover_reports(ctx, options).await?;
        if manifest.is_empty() {
            return Err(ReportError::NoReports);
        }
        info!(run_id = %run_id, reports = manifest.len(), "starting run");

        let root = ctx.derive(manifest.variables.clone());
        self.generators.init_all(&root)?;

        let workspace = Workspace::new()?;

        let session = match manifest.reports.iter().position(Report::needs_browser) {
            Some(index) => {
                debug!(first = index, "report needs page rendering, launching browser");
                Some(self.browser.open(self.browser.launch_args()).await?)
            }
            None => None,
        };
        let run_ctx = match &session {
            Some(session) => root.with_browser(Arc::clone(session)),
            None => root,
        };

        let looped = AssertUnwindSafe(self.run_reports(&run_ctx, &manifest, options, workspace.path()))
            .catch_unwind()
            .await;

        let browser_opened = session.is_some();
        if let Some(session) = session {
            if let Err(e) = self.browser.close(session).await {
                warn!(error = %e, "failed to close browser");
            }
        }
        if let Err(e) = workspace.close() {
            warn!(error = %e, "failed to remove temp workspace");
        }

        let outcomes = match looped {
            Ok(outcomes) => outcomes,
            Err(panic) => std::panic::resume_unwind(panic),
        };

        let summary = RunSummary::new(run_id, browser_opened, outcomes);
        info!(
            processed = summary.processed,
            failed = summary.failed,
            skipped = summary.skipped,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "run finished"
        );
        Ok(summary)
    }

    async fn run_reports(
        &self,
        ctx: &RunContext,
        manifest: &Manifest,
        options: &RunOptions,
        workspace: &Path,
    ) -> Vec<ReportOutcome> {
        let mut outcomes = Vec::with_capacity(manifest.len());
        let publish_config_ids = options.publish_config_ids_joined();

        for (index, report) in manifest.reports.iter().enumerate() {
            let report_id = report.report_id(index);
            let report_name = report.display_name(index);
            let started = Instant::now();

            let report_ctx = ctx.derive_namespace(&report_id, report.fields.clone());

            let result = if let Some(reason) = report.invalid_reason() {
                Err(ReportError::InvalidReport {
                    report: report_name.clone(),
                    reason: reason.to_string(),
                })
            } else {
                let Some(generator) = self.generators.select(&report.kind) else {
                    warn!(report = %report_name, "report has no recognized type, skipping");
                    outcomes.push(ReportOutcome {
                        index,
                        report_id,
                        report_name,
                        status: OutcomeStatus::Skipped,
                        message: None,
                        duration_ms: 0,
                    });
                    continue;
                };

                info!(report = %report_name, kind = report.kind.name(), "processing report");
                let iteration = self.process_report(
                    &report_ctx,
                    manifest,
                    report,
                    &report_name,
                    generator.as_ref(),
                    options,
                    workspace,
                );
                match AssertUnwindSafe(iteration).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(ReportError::Panicked {
                        report: report_name.clone(),
                        reason: panic_message(panic.as_ref()),
                    }),
                }
            };

            let (status, message) = match result {
                Ok(Processed::Published) => (OutcomeStatus::Succeeded, None),
                Ok(Processed::NoOutput) => (OutcomeStatus::NoOutput, None),
                Err(e) => {
                    error!(report = %report_name, code = e.code(), error = %e, "report failed");
                    report_ctx.telemetry().notice_error(&e);
                    (OutcomeStatus::Failed, Some(e.to_string()))
                }
            };

            let event = StatusEvent {
                report_id: report_id.clone(),
                report_name: report_name.clone(),
                runner_id: ctx.runner_id().to_string(),
                runner_version: ctx.runner_version().to_string(),
                publish_config_ids: publish_config_ids.clone(),
                error: status == OutcomeStatus::Failed,
                message: message.clone(),
            };
            ctx.telemetry()
                .record_custom_event(STATUS_EVENT_NAME, event.to_fields());

            outcomes.push(ReportOutcome {
                index,
                report_id,
                report_name,
                status,
                message,
                duration_ms: started.elapsed().as_millis() as u64,
            });
        }

        outcomes
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_report(
        &self,
        ctx: &RunContext,
        manifest: &Manifest,
        report: &Report,
        report_name: &str,
        generator: &dyn Generator,
        options: &RunOptions,
        workspace: &Path,
    ) -> Result<Processed> {
        let channels = resolve_channels(ctx, report, &options.publish_config_ids, &self.channels)?;

        let output = generator.generate(ctx, manifest, report, workspace).await?;
        let Some(output) = output.filter(|o| !o.is_empty()) else {
            warn!(report = %report_name, "no output generated");
            return Ok(Processed::NoOutput);
        };

        if channels.is_empty() {
            debug!(report = %report_name, "no channels selected, output not delivered");
            return Ok(Processed::Published);
        }

        publish_all(ctx, manifest, report, report_name, &output, &channels, workspace).await?;
        Ok(Processed::Published)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("generators", &self.generators)
            .field("channels", &self.channels)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
