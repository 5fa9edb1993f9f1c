//! Template engine - `{{ key }}` interpolation against a Run Context
//!
//! Syntax: `{{ key }}` or `{{ key.path.0.field }}`. The first segment is
//! looked up through the context layers; the rest traverses objects by key
//! and arrays by index. Missing values render as the empty string.
//!
//! Templates are loaded by name from the search path (`templatePath`,
//! fallback `TEMPLATE_PATH`, `:`-separated, searched recursively) and
//! cached for the lifetime of the engine.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use dashmap::DashMap;
use once_cell::sync::{Lazy, OnceCell};
use pulldown_cmark::{html, Options, Parser};
use regex::Regex;
use serde_json::Value;
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::context::{value_as_string, RunContext};
use crate::error::{ReportError, Result};

/// Pre-compiled regex for {{ key }} or {{ key.path }}
static VAR_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{\{\s*([A-Za-z_][\w-]*(?:\.[\w-]+)*)\s*\}\}").unwrap()
});

/// Run-wide template loader and renderer
#[derive(Debug, Default)]
pub struct TemplateEngine {
    search_path: OnceCell<Vec<PathBuf>>,
    cache: DashMap<String, Arc<str>>,
}

impl TemplateEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Engine with a fixed search path (skips context resolution)
    pub fn with_search_path(paths: Vec<PathBuf>) -> Self {
        let engine = Self::new();
        let _ = engine.search_path.set(paths);
        engine
    }

    /// Resolve the search path once; later calls are no-ops
    pub fn init(&self, ctx: &RunContext) {
        self.search_path.get_or_init(|| {
            let raw = ctx
                .get_str("templatePath", Some("TEMPLATE_PATH"))
                .unwrap_or_default();
            let mut paths: Vec<PathBuf> = std::env::split_paths(&raw)
                .filter(|p| !p.as_os_str().is_empty())
                .collect();
            paths.push(PathBuf::from("."));
            debug!(?paths, "template search path");
            paths
        });
    }

    pub fn search_path(&self) -> &[PathBuf] {
        self.search_path.get().map(Vec::as_slice).unwrap_or(&[])
    }

    /// Load a template by name (cached)
    pub fn load(&self, name: &str) -> Result<Arc<str>> {
        if let Some(cached) = self.cache.get(name) {
            return Ok(Arc::clone(&cached));
        }

        let path = self
            .find(name)
            .ok_or_else(|| ReportError::TemplateNotFound {
                name: name.to_string(),
            })?;
        let content: Arc<str> = std::fs::read_to_string(&path)
            .map_err(|e| ReportError::TemplateError {
                template: name.to_string(),
                reason: e.to_string(),
            })?
            .into();

        trace!(template = name, path = %path.display(), "loaded template");
        self.cache.insert(name.to_string(), Arc::clone(&content));
        Ok(content)
    }

    fn find(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.is_absolute() {
            return direct.is_file().then(|| direct.to_path_buf());
        }

        for root in self.search_path() {
            let candidate = root.join(name);
            if candidate.is_file() {
                return Some(candidate);
            }
        }

        // Recursive search by file name
        let file_name = direct.file_name()?;
        self.search_path().iter().find_map(|root| {
            WalkDir::new(root)
                .follow_links(true)
                .into_iter()
                .filter_map(|entry| entry.ok())
                .find(|entry| entry.file_type().is_file() && entry.file_name() == file_name)
                .map(|entry| entry.into_path())
        })
    }

    /// Load and interpolate a named template
    pub fn render(&self, name: &str, ctx: &RunContext) -> Result<String> {
        let template = self.load(name)?;
        Ok(render_str(&template, ctx))
    }

    pub fn markdown_to_html(&self, markdown: &str) -> String {
        markdown_to_html(markdown)
    }

    pub fn cached(&self) -> usize {
        self.cache.len()
    }
}

/// Interpolate `{{ key }}` placeholders from the context
pub fn render_str(template: &str, ctx: &RunContext) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }

    VAR_RE
        .replace_all(template, |caps: &regex::Captures| {
            let mut segments = caps[1].split('.');
            let value = segments
                .next()
                .and_then(|root| ctx.lookup(root))
                .and_then(|root| segments.try_fold(root, step));

            match value {
                Some(v) => value_as_string(v),
                None => {
                    trace!(placeholder = &caps[1], "unresolved placeholder");
                    String::new()
                }
            }
        })
        .into_owned()
}

fn step<'a>(value: &'a Value, segment: &str) -> Option<&'a Value> {
    match value {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    }
}

/// Markdown (with tables and strikethrough) to HTML
pub fn markdown_to_html(markdown: &str) -> String {
    let options = Options::ENABLE_TABLES | Options::ENABLE_STRIKETHROUGH;
    let parser = Parser::new_ext(markdown, options);
    let mut out = String::with_capacity(markdown.len() * 3 / 2);
    html::push_html(&mut out, parser);
    out
}
