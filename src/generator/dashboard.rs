//! Dashboard generator
//!
//! Each dashboard GUID is exported to a one-time snapshot URL and the PDF
//! downloaded into the workspace as `dashboard-<guid>.pdf`; a repeated GUID
//! gets its input position appended so no two downloads share a file. Downloads run
//! concurrently up to `downloadConcurrency` (0 = no cap); the resulting
//! paths keep the input order. Any failed download fails the whole export.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, instrument, trace};

use crate::ast::{DashboardParams, Manifest, Report, ReportKind};
use crate::context::RunContext;
use crate::error::{ReportError, Result};
use crate::output::Output;
use crate::platform::TelemetryApi;
use crate::resource::DocumentMerger;

use super::{kind_mismatch, Generator};

pub const CONSOLIDATED_PDF_NAME: &str = "consolidated_dashboards.pdf";

pub const DEFAULT_DOWNLOAD_CONCURRENCY: u64 = 4;

/// What an export failure turns into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DashboardFailureMode {
    /// Log the error and produce no output (report still succeeds)
    #[default]
    NoOutput,
    /// Propagate the error as a report failure
    Fail,
}

impl FromStr for DashboardFailureMode {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "no-output" | "no_output" | "nooutput" => Ok(Self::NoOutput),
            "fail" => Ok(Self::Fail),
            other => Err(ReportError::InvalidSetting {
                key: "dashboardFailureMode".to_string(),
                value: other.to_string(),
                reason: "expected no-output or fail".to_string(),
            }),
        }
    }
}

impl DashboardFailureMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoOutput => "no-output",
            Self::Fail => "fail",
        }
    }
}

pub struct DashboardGenerator {
    api: Arc<dyn TelemetryApi>,
    merger: Arc<dyn DocumentMerger>,
    http: reqwest::Client,
}

impl DashboardGenerator {
    pub fn new(api: Arc<dyn TelemetryApi>, merger: Arc<dyn DocumentMerger>) -> Self {
        Self {
            api,
            merger,
            http: reqwest::Client::new(),
        }
    }

    /// Download one dashboard PDF to `dir/file_name`
    async fn download(&self, guid: &str, dir: &Path, file_name: &str) -> Result<PathBuf> {
        let url = self.api.dashboard_snapshot_url(guid).await?;
        trace!(guid, url = %url, "fetching dashboard");

        let response = self.http.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ReportError::DownloadFailed {
                url,
                status: status.as_u16(),
            });
        }

        let path = dir.join(file_name);
        let mut file = tokio::fs::File::create(&path).await?;
        let mut body = response.bytes_stream();
        while let Some(chunk) = body.next().await {
            file.write_all(&chunk?).await?;
        }
        file.flush().await?;

        trace!(path = %path.display(), "wrote dashboard PDF");
        Ok(path)
    }

    async fn export(
        &self,
        ctx: &RunContext,
        params: &DashboardParams,
        workspace: &Path,
    ) -> Result<Output> {
        let cap = match ctx.get_u64(
            "downloadConcurrency",
            Some("DOWNLOAD_CONCURRENCY"),
            DEFAULT_DOWNLOAD_CONCURRENCY,
        ) {
            0 => params.dashboards.len().max(1),
            n => n as usize,
        };
        debug!(dashboards = params.dashboards.len(), cap, "exporting dashboards");

        let names = dashboard_file_names(&params.dashboards);
        let pending: Vec<_> = params
            .dashboards
            .iter()
            .zip(&names)
            .map(|(guid, name)| self.download(guid, workspace, name))
            .collect();
        let downloads: Vec<Result<PathBuf>> = stream::iter(pending)
        .buffered(cap)
        .collect()
        .await;
        let paths = downloads.into_iter().collect::<Result<Vec<_>>>()?;

        if params.combine_pdfs && paths.len() > 1 {
            let merged = workspace.join(CONSOLIDATED_PDF_NAME);
            debug!(count = paths.len(), target = %merged.display(), "merging PDFs");
            self.merger.merge(&paths, &merged).await?;
            return Ok(Output::files(vec![merged]));
        }

        Ok(Output::files(paths))
    }
}

#[async_trait]
impl Generator for DashboardGenerator {
    fn name(&self) -> &'static str {
        "dashboard"
    }

    #[instrument(skip_all, fields(report = ?report.id))]
    async fn generate(
        &self,
        ctx: &RunContext,
        _manifest: &Manifest,
        report: &Report,
        workspace: &Path,
    ) -> Result<Option<Output>> {
        let ReportKind::Dashboard(params) = &report.kind else {
            return Err(kind_mismatch(self.name(), report));
        };

        let mode = match ctx.get_str("dashboardFailureMode", Some("DASHBOARD_FAILURE_MODE")) {
            Some(raw) => raw.parse::<DashboardFailureMode>()?,
            None => DashboardFailureMode::default(),
        };

        match self.export(ctx, params, workspace).await {
            Ok(output) => Ok(Some(output)),
            Err(e) => match mode {
                DashboardFailureMode::NoOutput => {
                    error!(error = %e, "dashboard export failed");
                    Ok(None)
                }
                DashboardFailureMode::Fail => Err(e),
            },
        }
    }
}

/// GUIDs are base64; `/` is not allowed in file names
fn dashboard_file_name(guid: &str) -> String {
    format!("dashboard-{}.pdf", guid.replace('/', "_"))
}

/// One distinct file name per input position
fn dashboard_file_names(guids: &[String]) -> Vec<String> {
    let mut taken = HashSet::new();
    guids
        .iter()
        .enumerate()
        .map(|(index, guid)| {
            let mut name = dashboard_file_name(guid);
            let mut suffix = String::new();
            while taken.contains(&name) {
                suffix.push_str(&format!("-{}", index));
                name = dashboard_file_name(&format!("{}{}", guid, suffix));
            }
            taken.insert(name.clone());
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failure_mode_parses() {
        assert_eq!("No-Output".parse::<DashboardFailureMode>().unwrap(), DashboardFailureMode::NoOutput);
        assert_eq!(" fail ".parse::<DashboardFailureMode>().unwrap(), DashboardFailureMode::Fail);
        assert_eq!("explode".parse::<DashboardFailureMode>().unwrap_err().code(), "NR-014");
    }

    #[test]
    fn file_names_are_per_guid() {
        assert_eq!(dashboard_file_name("MXxWSVp8"), "dashboard-MXxWSVp8.pdf");
        assert_eq!(dashboard_file_name("a/b=="), "dashboard-a_b==.pdf");
    }

    #[test]
    fn repeated_guids_get_distinct_file_names() {
        let guids: Vec<String> = ["g1", "g2", "g1", "a/b", "a_b"]
            .iter()
            .map(|g| g.to_string())
            .collect();
        assert_eq!(
            dashboard_file_names(&guids),
            vec![
                "dashboard-g1.pdf",
                "dashboard-g2.pdf",
                "dashboard-g1-2.pdf",
                "dashboard-a_b.pdf",
                "dashboard-a_b-4.pdf",
            ]
        );
    }
}
