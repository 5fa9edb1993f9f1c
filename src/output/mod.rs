//! Output Module - what a generator produces
//!
//! - `Output::Inline`: in-memory content (text or query results)
//! - `Output::File`: ordered file paths; zero paths means "no output"
//!
//! `render()` turns an Output into text for one channel. It is not cached,
//! so a report with several channels renders once per channel.

mod query;
mod stage;

use std::path::PathBuf;

use serde_json::Value;

use crate::ast::Report;
use crate::channel::ResolvedChannel;
use crate::context::RunContext;
use crate::error::Result;
use crate::template::render_str;

pub use query::QueryData;
pub use stage::{stage_output, StagedOutput};

/// In-memory content
#[derive(Debug, Clone, PartialEq)]
pub enum Content {
    Text(String),
    Query(QueryData),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Output {
    Inline(Content),
    File(Vec<PathBuf>),
}

impl Output {
    pub fn text(text: impl Into<String>) -> Self {
        Output::Inline(Content::Text(text.into()))
    }

    pub fn files(paths: Vec<PathBuf>) -> Self {
        Output::File(paths)
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Output::File(_))
    }

    /// A file output without paths
    pub fn is_empty(&self) -> bool {
        matches!(self, Output::File(paths) if paths.is_empty())
    }

    pub fn paths(&self) -> &[PathBuf] {
        match self {
            Output::File(paths) => paths,
            Output::Inline(_) => &[],
        }
    }

    /// Text of this output for `channel`
    ///
    /// Query results: the channel `template`, when set, is rendered with
    /// `{ result }` bound (the table, or the raw results of a `passThrough`
    /// query); otherwise raw JSON when there is no table shape, else the
    /// table as CSV or JSON rows.
    ///
    /// File outputs return the (lossy UTF-8) content of their files.
    pub async fn render(
        &self,
        ctx: &RunContext,
        _report: &Report,
        channel: &ResolvedChannel,
    ) -> Result<String> {
        match self {
            Output::Inline(Content::Text(text)) => Ok(text.clone()),
            Output::Inline(Content::Query(data)) => {
                match channel.template() {
                    Some(name) => {
                        let templates = ctx.templates();
                        templates.init(ctx);
                        let body = templates.load(&name)?;
                        Ok(render_str(&body, &ctx.with_value("result", data.to_value())))
                    }
                    None => data.serialize(channel.results_format),
                }
            }
            Output::File(paths) => {
                let mut parts = Vec::with_capacity(paths.len());
                for path in paths {
                    let bytes = tokio::fs::read(path).await?;
                    parts.push(String::from_utf8_lossy(&bytes).into_owned());
                }
                Ok(parts.join("\n"))
            }
        }
    }

    /// Extension of the artifact delivered for `channel`
    pub fn extension(&self, channel: &ResolvedChannel) -> String {
        match self {
            Output::Inline(Content::Text(_)) => channel.format.extension().to_string(),
            Output::Inline(Content::Query(data)) => {
                if channel.template().is_some() {
                    channel.format.extension().to_string()
                } else {
                    data.extension(channel.results_format).to_string()
                }
            }
            Output::File(paths) => paths
                .first()
                .and_then(|p| p.extension())
                .map(|e| e.to_string_lossy().into_owned())
                .unwrap_or_else(|| "bin".to_string()),
        }
    }

    /// File name for this output: `outputFileName` if set, else
    /// `<report stem>.<extension>`
    pub fn output_file_name(
        &self,
        ctx: &RunContext,
        report: &Report,
        channel: &ResolvedChannel,
    ) -> String {
        if let Some(name) = ctx
            .get_str("outputFileName", None)
            .filter(|n| !n.trim().is_empty())
        {
            return render_str(&name, ctx);
        }
        format!("{}.{}", report.file_stem(), self.extension(channel))
    }
}

impl From<QueryData> for Output {
    fn from(data: QueryData) -> Self {
        Output::Inline(Content::Query(data))
    }
}

impl From<Value> for Output {
    fn from(value: Value) -> Self {
        Output::Inline(Content::Query(QueryData::Raw(value)))
    }
}
