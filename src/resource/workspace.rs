//! Scoped temp workspace and temp files
//!
//! Both are deleted when dropped, on every exit path.

use std::path::{Path, PathBuf};

use tempfile::{Builder, NamedTempFile, TempDir};
use tracing::debug;

use crate::error::{ReportError, Result};

const WORKSPACE_PREFIX: &str = "nr-reports-";

/// Temp directory that lives for one run
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    pub fn new() -> Result<Self> {
        let dir = Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()
            .map_err(|e| ReportError::Workspace {
                reason: e.to_string(),
            })?;
        debug!(path = %dir.path().display(), "created temp workspace");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Explicit cleanup that surfaces removal errors instead of ignoring them
    pub fn close(self) -> Result<()> {
        let path = self.dir.path().to_path_buf();
        self.dir.close()?;
        debug!(path = %path.display(), "removed temp workspace");
        Ok(())
    }
}

/// Temp file guard: the file exists until the guard is dropped
#[derive(Debug)]
pub struct ScopedFile {
    file: NamedTempFile,
}

impl ScopedFile {
    /// Create a uniquely named file `<stem>-*.<ext>` in `dir`
    pub fn create_in(dir: &Path, stem: &str, ext: &str) -> Result<Self> {
        let suffix = format!(".{}", ext);
        let file = Builder::new()
            .prefix(&format!("{}-", stem))
            .suffix(&suffix)
            .tempfile_in(dir)?;
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn to_path_buf(&self) -> PathBuf {
        self.file.path().to_path_buf()
    }
}
