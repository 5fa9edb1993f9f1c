//! Document merging
//!
//! The merge internals are delegated to an external command.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{ReportError, Result};

/// `{inputs}` expands to every input path, `{output}` to the target path
pub const DEFAULT_MERGE_COMMAND: &str = "qpdf --empty --pages {inputs} -- {output}";

#[async_trait]
pub trait DocumentMerger: Send + Sync {
    /// Merge `inputs` (in order) into a single file at `output`
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()>;
}

/// Merger that shells out to a command template
#[derive(Debug, Clone)]
pub struct CommandMerger {
    template: String,
}

impl CommandMerger {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }

    /// Expand the template into program + arguments
    fn command_line(&self, inputs: &[PathBuf], output: &Path) -> Vec<String> {
        let mut argv = Vec::new();
        for token in self.template.split_whitespace() {
            match token {
                "{inputs}" => argv.extend(inputs.iter().map(|p| p.display().to_string())),
                "{output}" => argv.push(output.display().to_string()),
                other => argv.push(other.to_string()),
            }
        }
        argv
    }
}

impl Default for CommandMerger {
    fn default() -> Self {
        Self::new(DEFAULT_MERGE_COMMAND)
    }
}

#[async_trait]
impl DocumentMerger for CommandMerger {
    async fn merge(&self, inputs: &[PathBuf], output: &Path) -> Result<()> {
        let argv = self.command_line(inputs, output);
        let failed = |reason: String| ReportError::MergeFailed {
            count: inputs.len(),
            reason,
        };

        let (program, args) = argv
            .split_first()
            .ok_or_else(|| failed("empty merge command".to_string()))?;

        debug!(program, count = inputs.len(), "merging documents");

        let result = tokio::process::Command::new(program)
            .args(args)
            .output()
            .await
            .map_err(|e| failed(format!("failed to run {}: {}", program, e)))?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(failed(stderr.trim().to_string()));
        }
        Ok(())
    }
}
