//! `file` channel - writes outputs into a destination directory
//!
//! Destination: `destDir` setting, else `FILE_DEST_DIR`, else the current
//! directory. File outputs are copied under their own names; inline
//! outputs are rendered and written as `Output::output_file_name`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{info, instrument};

use crate::ast::{Manifest, Report};
use crate::context::RunContext;
use crate::error::{ReportError, Result};
use crate::output::Output;

use super::{Channel, ResolvedChannel};

pub const FILE_CHANNEL: &str = "file";

#[derive(Debug, Clone, Copy, Default)]
pub struct FileChannel;

impl FileChannel {
    fn dest_dir(ctx: &RunContext, channel: &ResolvedChannel) -> PathBuf {
        channel
            .get_str("destDir")
            .or_else(|| ctx.env_var("FILE_DEST_DIR"))
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

#[async_trait]
impl Channel for FileChannel {
    fn kind(&self) -> &str {
        FILE_CHANNEL
    }

    fn defaults(&self) -> Map<String, Value> {
        let mut defaults = Map::new();
        defaults.insert("format".to_string(), Value::String("html".to_string()));
        defaults
    }

    #[instrument(skip_all, fields(channel = FILE_CHANNEL))]
    async fn publish(
        &self,
        ctx: &RunContext,
        _manifest: &Manifest,
        report: &Report,
        output: &Output,
        channel: &ResolvedChannel,
        _workspace: &Path,
    ) -> Result<()> {
        let dest = Self::dest_dir(ctx, channel);
        tokio::fs::create_dir_all(&dest)
            .await
            .map_err(|e| ReportError::ChannelFailed {
                channel: FILE_CHANNEL.to_string(),
                reason: format!("cannot create {}: {}", dest.display(), e),
            })?;

        match output {
            Output::File(paths) => {
                for path in paths {
                    let name = path.file_name().ok_or_else(|| ReportError::ChannelFailed {
                        channel: FILE_CHANNEL.to_string(),
                        reason: format!("not a file path: {}", path.display()),
                    })?;
                    let target = dest.join(name);
                    tokio::fs::copy(path, &target).await?;
                    info!(path = %target.display(), "wrote report file");
                }
            }
            Output::Inline(_) => {
                let text = output.render(ctx, report, channel).await?;
                let target = dest.join(output.output_file_name(ctx, report, channel));
                tokio::fs::write(&target, text).await?;
                info!(path = %target.display(), "wrote report file");
            }
        }
        Ok(())
    }
}
