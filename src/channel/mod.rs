//! Channel Module - delivery of report outputs
//!
//! - `Channel`: the publisher contract (one call per report per channel)
//! - `ChannelRegistry`: channel implementations by type name
//! - `ResolvedChannel`: channel settings after defaults/report/entry merge
//! - `FileChannel`: built-in `file` channel
//! - `EmailChannel`: `email` channel over a caller-supplied `Mailer`
//!
//! Channels never mutate the Output or the Report. A failing channel does
//! not prevent delivery to the report's other channels.

mod email;
mod file;
mod resolve;

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{instrument, warn};

use crate::ast::{Manifest, Report};
use crate::context::RunContext;
use crate::error::{ReportError, Result};
use crate::output::Output;

pub use email::{
    Attachment, EmailChannel, EmailMessage, Mailer, DEFAULT_ATTACHMENTS_TEMPLATE,
    DEFAULT_EMAIL_TEMPLATE, EMAIL_CHANNEL,
};
pub use file::{FileChannel, FILE_CHANNEL};
pub use resolve::{resolve_channels, ChannelFormat, ResolvedChannel, ResultsFormat};

/// Publisher contract
#[async_trait]
pub trait Channel: Send + Sync {
    /// Type name used in `publishConfigs[].channels[].type`
    fn kind(&self) -> &str;

    /// Lowest-precedence settings for this channel type
    fn defaults(&self) -> Map<String, Value> {
        Map::new()
    }

    /// Deliver `output`; `ctx` is the channel-scoped context
    async fn publish(
        &self,
        ctx: &RunContext,
        manifest: &Manifest,
        report: &Report,
        output: &Output,
        channel: &ResolvedChannel,
        workspace: &Path,
    ) -> Result<()>;
}

/// Channel implementations by type name
#[derive(Clone, Default)]
pub struct ChannelRegistry {
    channels: HashMap<String, Arc<dyn Channel>>,
}

impl ChannelRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in channels
    pub fn builtin() -> Self {
        Self::new().with(Arc::new(FileChannel))
    }

    /// Register the `email` channel sending through `mailer`
    pub fn with_mailer(self, mailer: Arc<dyn Mailer>) -> Self {
        self.with(Arc::new(EmailChannel::new(mailer)))
    }

    pub fn with(mut self, channel: Arc<dyn Channel>) -> Self {
        self.register(channel);
        self
    }

    pub fn register(&mut self, channel: Arc<dyn Channel>) {
        self.channels.insert(channel.kind().to_string(), channel);
    }

    pub fn get(&self, kind: &str) -> Result<Arc<dyn Channel>> {
        self.channels
            .get(kind)
            .cloned()
            .ok_or_else(|| ReportError::UnknownChannel {
                kind: kind.to_string(),
            })
    }

    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.channels.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

/// Publish to every channel, attempting each even if an earlier one failed
///
/// Returns `PublishFailed` listing the failing channels, if any.
#[instrument(skip_all, fields(report = %report_name, channels = channels.len()))]
pub async fn publish_all(
    ctx: &RunContext,
    manifest: &Manifest,
    report: &Report,
    report_name: &str,
    output: &Output,
    channels: &[(Arc<dyn Channel>, ResolvedChannel)],
    workspace: &Path,
) -> Result<()> {
    let mut failures = Vec::new();

    for (channel, resolved) in channels {
        let channel_ctx = ctx.derive(resolved.settings.clone());
        if let Err(e) = channel
            .publish(&channel_ctx, manifest, report, output, resolved, workspace)
            .await
        {
            warn!(report = %report_name, channel = %resolved.kind, error = %e, "channel failed");
            failures.push(format!("{}: {}", resolved.kind, e));
        }
    }

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ReportError::PublishFailed { failures })
    }
}
