//! Resource Module - run-scoped scarce resources
//!
//! - `Workspace`: temp directory shared by every report of a run, removed on drop
//! - `BrowserLauncher` / `BrowserSession`: page-to-PDF rendering, opened lazily
//! - `DocumentMerger`: combines several documents into one file

mod browser;
mod merge;
mod workspace;

pub use browser::{BrowserLauncher, BrowserSession, ChromeLauncher, ChromeSession};
pub use merge::{CommandMerger, DocumentMerger, DEFAULT_MERGE_COMMAND};
pub use workspace::{ScopedFile, Workspace};
