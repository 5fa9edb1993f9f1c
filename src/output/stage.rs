//! Output staging for channels that attach files
//!
//! File outputs pass through untouched. Inline outputs are rendered and
//! written to a scoped temp file that is removed when the staging guard
//! drops.

use std::path::{Path, PathBuf};

use tracing::trace;

use crate::ast::Report;
use crate::channel::ResolvedChannel;
use crate::context::RunContext;
use crate::error::Result;
use crate::resource::ScopedFile;

use super::Output;

/// Files ready for attachment; keeps any temp file alive
#[derive(Debug)]
pub struct StagedOutput {
    paths: Vec<PathBuf>,
    _guard: Option<ScopedFile>,
}

impl StagedOutput {
    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

pub async fn stage_output(
    ctx: &RunContext,
    report: &Report,
    output: &Output,
    channel: &ResolvedChannel,
    workspace: &Path,
) -> Result<StagedOutput> {
    if let Output::File(paths) = output {
        return Ok(StagedOutput {
            paths: paths.clone(),
            _guard: None,
        });
    }

    let text = output.render(ctx, report, channel).await?;
    let scoped = ScopedFile::create_in(workspace, &report.file_stem(), &output.extension(channel))?;
    tokio::fs::write(scoped.path(), text).await?;

    trace!(path = %scoped.path().display(), "staged inline output");
    Ok(StagedOutput {
        paths: vec![scoped.to_path_buf()],
        _guard: Some(scoped),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::ChannelEntry;
    use crate::context::{MapEnv, Services};
    use serde_json::{json, Map};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn inline_output_is_staged_and_cleaned_up() {
        let dir = TempDir::new().unwrap();
        let ctx = RunContext::new(
            Services::new("r", "0").with_env(Arc::new(MapEnv::new())),
            Map::new(),
        );
        let report = Report::from_value(json!({ "id": "daily", "templateName": "t.txt" }));
        let channel = ResolvedChannel::resolve(
            Map::new(),
            &report,
            &ChannelEntry::new("file").with("format", "text"),
        )
        .unwrap();

        let staged = stage_output(&ctx, &report, &Output::text("body"), &channel, dir.path())
            .await
            .unwrap();
        let path = staged.paths()[0].clone();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "body");
        assert!(path.file_name().unwrap().to_string_lossy().starts_with("daily-"));

        drop(staged);
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn file_output_passes_through() {
        let dir = TempDir::new().unwrap();
        let ctx = RunContext::new(
            Services::new("r", "0").with_env(Arc::new(MapEnv::new())),
            Map::new(),
        );
        let report = Report::from_value(json!({ "dashboards": ["g"] }));
        let channel =
            ResolvedChannel::resolve(Map::new(), &report, &ChannelEntry::new("file")).unwrap();
        let output = Output::files(vec![PathBuf::from("/x/a.pdf"), PathBuf::from("/x/b.pdf")]);

        let staged = stage_output(&ctx, &report, &output, &channel, dir.path())
            .await
            .unwrap();
        assert_eq!(staged.paths(), output.paths());
    }
}
