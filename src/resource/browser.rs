//! Browser collaborator
//!
//! Launching the browser is expensive, so the engine opens at most one
//! session per run and only when a report needs page rendering.
//!
//! `ChromeLauncher` drives a headless Chrome/Chromium executable in
//! `--print-to-pdf` mode. Opening a session checks the executable once and
//! creates a profile directory shared by every print of the run; the
//! directory is removed when the session is closed and dropped. Each print
//! is still its own Chrome process: keeping one process alive would need a
//! DevTools protocol client, which this crate does not carry.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, info};
use url::Url;

use crate::error::{ReportError, Result};

/// Hard limit for one page print
const PRINT_TIMEOUT: Duration = Duration::from_secs(120);

/// Hard limit for the launch check
const VERSION_CHECK_TIMEOUT: Duration = Duration::from_secs(30);

/// Executables searched on PATH when no explicit path is configured
const CHROME_CANDIDATES: &[&str] = &[
    "google-chrome",
    "google-chrome-stable",
    "chromium",
    "chromium-browser",
    "chrome",
];

/// An open browser handle
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Print the HTML page at `html` to a PDF at `pdf`
    async fn render_pdf(&self, html: &Path, pdf: &Path) -> Result<()>;
}

/// Opens and closes browser sessions
#[async_trait]
pub trait BrowserLauncher: Send + Sync {
    fn launch_args(&self) -> Vec<String>;

    async fn open(&self, args: Vec<String>) -> Result<Arc<dyn BrowserSession>>;

    async fn close(&self, session: Arc<dyn BrowserSession>) -> Result<()>;
}

/// Headless Chrome launcher
#[derive(Debug, Clone, Default)]
pub struct ChromeLauncher {
    executable: Option<PathBuf>,
}

impl ChromeLauncher {
    pub fn new(executable: Option<PathBuf>) -> Self {
        Self { executable }
    }

    fn resolve_executable(&self) -> Result<PathBuf> {
        if let Some(path) = &self.executable {
            if path.is_file() {
                return Ok(path.clone());
            }
            return Err(ReportError::Browser {
                reason: format!("executable not found at {}", path.display()),
            });
        }

        let search = std::env::var_os("PATH").unwrap_or_default();
        for dir in std::env::split_paths(&search) {
            for name in CHROME_CANDIDATES {
                let candidate = dir.join(name);
                if candidate.is_file() {
                    return Ok(candidate);
                }
            }
        }

        Err(ReportError::Browser {
            reason: "no Chrome or Chromium executable on PATH".to_string(),
        })
    }
}

#[async_trait]
impl BrowserLauncher for ChromeLauncher {
    fn launch_args(&self) -> Vec<String> {
        vec![
            "--headless".to_string(),
            "--disable-gpu".to_string(),
            "--no-sandbox".to_string(),
            "--no-pdf-header-footer".to_string(),
        ]
    }

    async fn open(&self, args: Vec<String>) -> Result<Arc<dyn BrowserSession>> {
        let executable = self.resolve_executable()?;
        info!(executable = %executable.display(), ?args, "launching browser");

        let check = tokio::time::timeout(
            VERSION_CHECK_TIMEOUT,
            tokio::process::Command::new(&executable).arg("--version").output(),
        )
        .await
        .map_err(|_| ReportError::Browser {
            reason: format!(
                "{} did not start within {}s",
                executable.display(),
                VERSION_CHECK_TIMEOUT.as_secs()
            ),
        })?
        .map_err(|e| ReportError::Browser {
            reason: format!("failed to run {}: {}", executable.display(), e),
        })?;
        if !check.status.success() {
            return Err(ReportError::Browser {
                reason: format!("{} exited with {}", executable.display(), check.status),
            });
        }
        debug!(version = %String::from_utf8_lossy(&check.stdout).trim(), "browser available");

        let profile = tempfile::Builder::new()
            .prefix("nr-reports-chrome-")
            .tempdir()
            .map_err(|e| ReportError::Browser {
                reason: format!("cannot create browser profile: {}", e),
            })?;
        Ok(Arc::new(ChromeSession {
            executable,
            args,
            profile,
        }))
    }

    async fn close(&self, session: Arc<dyn BrowserSession>) -> Result<()> {
        drop(session);
        debug!("browser closed");
        Ok(())
    }
}

/// Session backed by a Chrome executable and a per-run profile directory
#[derive(Debug)]
pub struct ChromeSession {
    executable: PathBuf,
    args: Vec<String>,
    profile: TempDir,
}

#[async_trait]
impl BrowserSession for ChromeSession {
    async fn render_pdf(&self, html: &Path, pdf: &Path) -> Result<()> {
        let page = Url::from_file_path(html).map_err(|_| ReportError::Browser {
            reason: format!("not an absolute path: {}", html.display()),
        })?;

        let output = tokio::time::timeout(
            PRINT_TIMEOUT,
            tokio::process::Command::new(&self.executable)
                .args(&self.args)
                .arg(format!("--user-data-dir={}", self.profile.path().display()))
                .arg(format!("--print-to-pdf={}", pdf.display()))
                .arg(page.as_str())
                .output(),
        )
        .await
        .map_err(|_| ReportError::Browser {
            reason: format!("print timed out after {}s", PRINT_TIMEOUT.as_secs()),
        })?
        .map_err(|e| ReportError::Browser {
            reason: format!("failed to run {}: {}", self.executable.display(), e),
        })?;

        if !output.status.success() || !pdf.exists() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(ReportError::Browser {
                reason: format!("print to PDF failed: {}", stderr.trim()),
            });
        }

        debug!(pdf = %pdf.display(), "printed page");
        Ok(())
    }
}
