//! Test doubles for the engine's collaborators
//!
//! Shared by unit tests, integration tests and downstream users:
//! - `MockPlatform`: scripted snapshot URLs and query rows, with a
//!   peak-in-flight counter for export concurrency
//! - `StaticDiscovery`: returns a fixed manifest
//! - `ScriptedGenerator`: returns, fails or panics on demand
//! - `RecordingChannel` / `FailingChannel`: capture or reject deliveries
//! - `RecordingMailer`: captures email messages, or rejects them
//! - `CountingLauncher` / `FakeBrowser`: browser lifecycle counters
//! - `RecordingMerger`: records merge calls and writes a stub file

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};

use crate::ast::{Manifest, Report};
use crate::channel::{Channel, EmailMessage, Mailer, ResolvedChannel};
use crate::context::RunContext;
use crate::discovery::{Discovery, RunOptions};
use crate::error::{ReportError, Result};
use crate::generator::Generator;
use crate::output::Output;
use crate::platform::TelemetryApi;
use crate::resource::{BrowserLauncher, BrowserSession, DocumentMerger};

// ═══════════════════════════════════════════
// PLATFORM
// ═══════════════════════════════════════════

#[derive(Debug, Default)]
pub struct MockPlatform {
    snapshot_base: Option<String>,
    failing_guids: HashSet<String>,
    rows: Vec<Value>,
    queries: Mutex<Vec<(Vec<u64>, String)>>,
    snapshots: Mutex<Vec<String>>,
    snapshot_delay: Option<Duration>,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot URLs become `<base>/snapshots/<guid>.pdf`
    pub fn with_snapshot_base(mut self, base: impl Into<String>) -> Self {
        self.snapshot_base = Some(base.into());
        self
    }

    pub fn with_failing_guid(mut self, guid: impl Into<String>) -> Self {
        self.failing_guids.insert(guid.into());
        self
    }

    pub fn with_query_rows(mut self, rows: Vec<Value>) -> Self {
        self.rows = rows;
        self
    }

    /// Hold every snapshot request open for `delay`
    pub fn with_snapshot_delay(mut self, delay: Duration) -> Self {
        self.snapshot_delay = Some(delay);
        self
    }

    pub fn queries(&self) -> Vec<(Vec<u64>, String)> {
        self.queries.lock().clone()
    }

    /// Most snapshot requests seen open at the same time
    pub fn peak_in_flight(&self) -> usize {
        self.peak_in_flight.load(Ordering::SeqCst)
    }

    pub fn snapshots(&self) -> Vec<String> {
        self.snapshots.lock().clone()
    }
}

#[async_trait]
impl TelemetryApi for MockPlatform {
    async fn dashboard_snapshot_url(&self, guid: &str) -> Result<String> {
        self.snapshots.lock().push(guid.to_string());
        let open = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_in_flight.fetch_max(open, Ordering::SeqCst);
        if let Some(delay) = self.snapshot_delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if self.failing_guids.contains(guid) {
            return Err(ReportError::DashboardExport {
                guid: guid.to_string(),
                reason: "scripted failure".to_string(),
            });
        }
        let base = self
            .snapshot_base
            .as_deref()
            .unwrap_or("http://127.0.0.1:9");
        Ok(format!("{}/snapshots/{}.pdf", base, guid))
    }

    async fn run_query(&self, account_ids: &[u64], nrql: &str) -> Result<Vec<Value>> {
        self.queries
            .lock()
            .push((account_ids.to_vec(), nrql.to_string()));
        Ok(self.rows.clone())
    }
}

// ═══════════════════════════════════════════
// DISCOVERY / GENERATORS
// ═══════════════════════════════════════════

/// Discovery returning a fixed manifest (or error)
pub struct StaticDiscovery {
    manifest: Mutex<Option<Result<Manifest>>>,
    fallback: Manifest,
}

impl StaticDiscovery {
    pub fn new(manifest: Manifest) -> Self {
        Self {
            manifest: Mutex::new(None),
            fallback: manifest,
        }
    }

    /// Reports from a JSON array (or a single definition)
    pub fn from_json(reports: Value) -> Self {
        let reports = match reports {
            Value::Array(items) => items.into_iter().map(Report::from_value).collect(),
            other => vec![Report::from_value(other)],
        };
        Self::new(Manifest::new(reports, Map::new()))
    }

    /// First call fails with `error`
    pub fn failing(error: ReportError) -> Self {
        Self {
            manifest: Mutex::new(Some(Err(error))),
            fallback: Manifest::default(),
        }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn discover_reports(&self, _ctx: &RunContext, _options: &RunOptions) -> Result<Manifest> {
        match self.manifest.lock().take() {
            Some(result) => result,
            None => Ok(self.fallback.clone()),
        }
    }
}

/// Behaviour of a `ScriptedGenerator` for one report id
#[derive(Debug, Clone)]
pub enum Script {
    Output(Output),
    NoOutput,
    Fail(String),
    Panic(String),
}

/// Generator answering per report id, defaulting to an inline text output
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    scripts: HashMap<String, Script>,
    calls: Mutex<Vec<String>>,
    inits: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, report_id: impl Into<String>, script: Script) -> Self {
        self.scripts.insert(report_id.into(), script);
        self
    }

    /// Report ids in call order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn inits(&self) -> usize {
        self.inits.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn init(&self, _ctx: &RunContext) -> Result<()> {
        self.inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn generate(
        &self,
        _ctx: &RunContext,
        _manifest: &Manifest,
        report: &Report,
        _workspace: &Path,
    ) -> Result<Option<Output>> {
        let id = report.report_id(0);
        self.calls.lock().push(id.clone());
        match self.scripts.get(&id) {
            Some(Script::Output(output)) => Ok(Some(output.clone())),
            Some(Script::NoOutput) => Ok(None),
            Some(Script::Fail(reason)) => Err(ReportError::GeneratorFailed {
                report: id,
                reason: reason.clone(),
            }),
            Some(Script::Panic(message)) => panic!("{}", message),
            None => Ok(Some(Output::text(format!("output of {}", id)))),
        }
    }
}

// ═══════════════════════════════════════════
// CHANNELS
// ═══════════════════════════════════════════

/// One captured delivery
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub report_id: String,
    pub namespace: Option<String>,
    pub output: Output,
    pub channel: ResolvedChannel,
    pub rendered: Option<String>,
}

/// Channel that records every publish call
#[derive(Debug)]
pub struct RecordingChannel {
    kind: String,
    defaults: Map<String, Value>,
    deliveries: Mutex<Vec<Delivery>>,
}

impl RecordingChannel {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            defaults: Map::new(),
            deliveries: Mutex::new(Vec::new()),
        }
    }

    pub fn with_default(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.defaults.insert(key.to_string(), value.into());
        self
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn report_ids(&self) -> Vec<String> {
        self.deliveries
            .lock()
            .iter()
            .map(|d| d.report_id.clone())
            .collect()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn kind(&self) -> &str {
        &self.kind
    }

    fn defaults(&self) -> Map<String, Value> {
        self.defaults.clone()
    }

    async fn publish(
        &self,
        ctx: &RunContext,
        _manifest: &Manifest,
        report: &Report,
        output: &Output,
        channel: &ResolvedChannel,
        _workspace: &Path,
    ) -> Result<()> {
        let rendered = if output.is_file() {
            None
        } else {
            Some(output.render(ctx, report, channel).await?)
        };
        self.deliveries.lock().push(Delivery {
            report_id: report.report_id(0),
            namespace: ctx.namespace().map(String::from),
            output: output.clone(),
            channel: channel.clone(),
            rendered,
        });
        Ok(())
    }
}

/// Channel that always fails
#[derive(Debug)]
pub struct FailingChannel {
    kind: String,
    attempts: AtomicUsize,
}

impl FailingChannel {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            attempts: AtomicUsize::new(0),
        }
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Channel for FailingChannel {
    fn kind(&self) -> &str {
        &self.kind
    }

    async fn publish(
        &self,
        _ctx: &RunContext,
        _manifest: &Manifest,
        _report: &Report,
        _output: &Output,
        _channel: &ResolvedChannel,
        _workspace: &Path,
    ) -> Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(ReportError::ChannelFailed {
            channel: self.kind.clone(),
            reason: "delivery refused".to_string(),
        })
    }
}

// ═══════════════════════════════════════════
// RESOURCES
// ═══════════════════════════════════════════

/// Browser session that writes a stub PDF
#[derive(Debug, Default)]
pub struct FakeBrowser {
    renders: AtomicUsize,
}

impl FakeBrowser {
    pub fn renders(&self) -> usize {
        self.renders.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BrowserSession for FakeBrowser {
    async fn render_pdf(&self, html: &Path, pdf: &Path) -> Result<()> {
        self.renders.fetch_add(1, Ordering::SeqCst);
        let html = tokio::fs::read(html).await?;
        let mut bytes = b"%PDF-FAKE\n".to_vec();
        bytes.extend_from_slice(&html);
        tokio::fs::write(pdf, bytes).await?;
        Ok(())
    }
}

/// Launcher counting open/close calls
#[derive(Debug, Default)]
pub struct CountingLauncher {
    opens: AtomicUsize,
    closes: AtomicUsize,
    fail_open: bool,
    session: Arc<FakeBrowser>,
}

impl CountingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail_open: true,
            ..Self::default()
        }
    }

    pub fn opens(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn session(&self) -> &Arc<FakeBrowser> {
        &self.session
    }
}

#[async_trait]
impl BrowserLauncher for CountingLauncher {
    fn launch_args(&self) -> Vec<String> {
        vec!["--headless".to_string()]
    }

    async fn open(&self, _args: Vec<String>) -> Result<Arc<dyn BrowserSession>> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        if self.fail_open {
            return Err(ReportError::Browser {
                reason: "scripted launch failure".to_string(),
            });
        }
        Ok(self.session.clone())
    }

    async fn close(&self, _session: Arc<dyn BrowserSession>) -> Result<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Merger that records calls and writes a stub output file
#[derive(Debug, Default)]
pub struct RecordingMerger {
    calls: Mutex<Vec<(Vec<PathBuf>, PathBuf)>>,
    fail: bool,
}

impl RecordingMerger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(Vec<PathBuf>, PathBuf)> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl DocumentMerger for RecordingMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        self.calls
            .lock()
            .push((inputs.to_vec(), output.to_path_buf()));
        if self.fail {
            return Err(ReportError::MergeFailed {
                count: inputs.len(),
                reason: "scripted failure".to_string(),
            });
        }
        tokio::fs::write(output, b"%PDF-MERGED").await?;
        Ok(())
    }
}

// ═══════════════════════════════════════════
// MAIL
// ═══════════════════════════════════════════

#[derive(Debug, Default)]
pub struct RecordingMailer {
    fail: bool,
    messages: Mutex<Vec<EmailMessage>>,
}

impl RecordingMailer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every send fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn messages(&self) -> Vec<EmailMessage> {
        self.messages.lock().clone()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, message: &EmailMessage) -> Result<()> {
        if self.fail {
            return Err(ReportError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "mail relay refused the message",
            )));
        }
        self.messages.lock().push(message.clone());
        Ok(())
    }
}
