//! Run Context - layered, immutable configuration carrier
//!
//! A `RunContext` is a chain of value layers plus the process-wide
//! collaborators of a run (`Services`). Lookups read through the chain,
//! child first; deriving a child never touches the parent, so a context
//! can be shared freely between report iterations.
//!
//! ```text
//! root (config + manifest variables)
//!   └─ report namespace (report id, report fields)
//!        └─ channel layer (resolved channel settings)
//!             └─ render layer ({ result })
//! ```
//!
//! Resolution order for `get(key, fallback)`:
//! 1. `key` in the current layer or any ancestor
//! 2. `<NAMESPACE>_<fallback>` in the environment (namespaced contexts only)
//! 3. `<fallback>` in the environment
//! 4. the caller's default

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::event::{TelemetrySink, TracingSink};
use crate::resource::BrowserSession;
use crate::secrets::{EnvSecrets, SecretStore};
use crate::template::TemplateEngine;

/// Source of environment-like fallback values
pub trait EnvSource: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment (empty values count as unset)
#[derive(Debug, Clone, Default)]
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.is_empty())
    }
}

/// Fixed environment, for tests and embedding
#[derive(Debug, Clone, Default)]
pub struct MapEnv {
    vars: HashMap<String, String>,
}

impl MapEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.vars.insert(key.into(), value.into());
        self
    }
}

impl EnvSource for MapEnv {
    fn var(&self, key: &str) -> Option<String> {
        self.vars.get(key).cloned()
    }
}

/// Process-wide collaborators shared by every layer of a run
pub struct Services {
    pub telemetry: Arc<dyn TelemetrySink>,
    pub secrets: Arc<dyn SecretStore>,
    pub env: Arc<dyn EnvSource>,
    pub templates: Arc<TemplateEngine>,
    pub runner_id: String,
    pub runner_version: String,
    pub default_channel_type: String,
}

impl Services {
    /// Services backed by the process environment and tracing telemetry
    pub fn new(runner_id: impl Into<String>, runner_version: impl Into<String>) -> Self {
        Self {
            telemetry: Arc::new(TracingSink),
            secrets: Arc::new(EnvSecrets::new(Arc::new(ProcessEnv))),
            env: Arc::new(ProcessEnv),
            templates: Arc::new(TemplateEngine::new()),
            runner_id: runner_id.into(),
            runner_version: runner_version.into(),
            default_channel_type: "file".to_string(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn TelemetrySink>) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_secrets(mut self, secrets: Arc<dyn SecretStore>) -> Self {
        self.secrets = secrets;
        self
    }

    pub fn with_env(mut self, env: Arc<dyn EnvSource>) -> Self {
        self.env = env;
        self
    }

    pub fn with_templates(mut self, templates: Arc<TemplateEngine>) -> Self {
        self.templates = templates;
        self
    }

    pub fn with_default_channel_type(mut self, kind: impl Into<String>) -> Self {
        self.default_channel_type = kind.into();
        self
    }
}

struct Layer {
    values: Map<String, Value>,
    namespace: Option<Arc<str>>,
    browser: Option<Arc<dyn BrowserSession>>,
    parent: Option<Arc<Layer>>,
}

/// Immutable, hierarchically scoped configuration for one run
#[derive(Clone)]
pub struct RunContext {
    layer: Arc<Layer>,
    services: Arc<Services>,
}

impl RunContext {
    /// Create a root context with the given values
    pub fn new(services: Services, values: Map<String, Value>) -> Self {
        Self {
            layer: Arc::new(Layer {
                values,
                namespace: None,
                browser: None,
                parent: None,
            }),
            services: Arc::new(services),
        }
    }

    fn child(
        &self,
        values: Map<String, Value>,
        namespace: Option<Arc<str>>,
        browser: Option<Arc<dyn BrowserSession>>,
    ) -> Self {
        Self {
            layer: Arc::new(Layer {
                values,
                namespace: namespace.or_else(|| self.layer.namespace.clone()),
                browser: browser.or_else(|| self.layer.browser.clone()),
                parent: Some(Arc::clone(&self.layer)),
            }),
            services: Arc::clone(&self.services),
        }
    }

    /// Child context shadowing this one with `extra`
    pub fn derive(&self, extra: Map<String, Value>) -> Self {
        self.child(extra, None, None)
    }

    /// Child context scoped to one report id
    pub fn derive_namespace(&self, id: &str, seed: Map<String, Value>) -> Self {
        self.child(seed, Some(Arc::from(id)), None)
    }

    /// Child context with a browser session attached
    pub fn with_browser(&self, browser: Arc<dyn BrowserSession>) -> Self {
        self.child(Map::new(), None, Some(browser))
    }

    /// Shorthand for deriving a single key
    pub fn with_value(&self, key: &str, value: Value) -> Self {
        let mut extra = Map::new();
        extra.insert(key.to_string(), value);
        self.derive(extra)
    }

    /// Local value lookup through the layer chain (no environment)
    pub fn lookup(&self, key: &str) -> Option<&Value> {
        let mut layer: &Layer = &self.layer;
        loop {
            if let Some(value) = layer.values.get(key) {
                return Some(value);
            }
            match &layer.parent {
                Some(parent) => layer = parent.as_ref(),
                None => return None,
            }
        }
    }

    /// Environment lookup honoring the namespace prefix
    pub fn env_var(&self, fallback: &str) -> Option<String> {
        if let Some(ns) = self.namespace() {
            let scoped = format!("{}_{}", env_prefix(ns), fallback);
            if let Some(value) = self.services.env.var(&scoped) {
                return Some(value);
            }
        }
        self.services.env.var(fallback)
    }

    /// Local overrides, then the environment under `fallback`
    pub fn get(&self, key: &str, fallback: Option<&str>) -> Option<Value> {
        if let Some(value) = self.lookup(key) {
            return Some(value.clone());
        }
        fallback
            .and_then(|name| self.env_var(name))
            .map(Value::String)
    }

    pub fn get_or(&self, key: &str, fallback: Option<&str>, default: impl Into<Value>) -> Value {
        self.get(key, fallback).unwrap_or_else(|| default.into())
    }

    pub fn get_str(&self, key: &str, fallback: Option<&str>) -> Option<String> {
        self.get(key, fallback)
            .filter(|v| !v.is_null())
            .map(|v| value_as_string(&v))
    }

    pub fn get_bool(&self, key: &str, fallback: Option<&str>, default: bool) -> bool {
        self.get(key, fallback)
            .and_then(|v| value_as_bool(&v))
            .unwrap_or(default)
    }

    pub fn get_u64(&self, key: &str, fallback: Option<&str>, default: u64) -> u64 {
        match self.get(key, fallback) {
            Some(Value::Number(n)) => n.as_u64().unwrap_or(default),
            Some(Value::String(s)) => s.trim().parse().unwrap_or(default),
            _ => default,
        }
    }

    /// Nearest namespace (report id) of this context
    pub fn namespace(&self) -> Option<&str> {
        self.layer.namespace.as_deref()
    }

    pub fn browser(&self) -> Option<&Arc<dyn BrowserSession>> {
        self.layer.browser.as_ref()
    }

    pub fn telemetry(&self) -> &Arc<dyn TelemetrySink> {
        &self.services.telemetry
    }

    pub fn secrets(&self) -> &Arc<dyn SecretStore> {
        &self.services.secrets
    }

    pub fn templates(&self) -> &Arc<TemplateEngine> {
        &self.services.templates
    }

    pub fn runner_id(&self) -> &str {
        &self.services.runner_id
    }

    pub fn runner_version(&self) -> &str {
        &self.services.runner_version
    }

    pub fn default_channel_type(&self) -> &str {
        &self.services.default_channel_type
    }

    /// All visible values merged into one object (child wins)
    pub fn to_value(&self) -> Value {
        let mut chain: Vec<&Layer> = Vec::new();
        let mut layer: &Layer = &self.layer;
        loop {
            chain.push(layer);
            match &layer.parent {
                Some(parent) => layer = parent.as_ref(),
                None => break,
            }
        }

        let mut merged = Map::new();
        for layer in chain.into_iter().rev() {
            for (k, v) in &layer.values {
                merged.insert(k.clone(), v.clone());
            }
        }
        Value::Object(merged)
    }
}

impl fmt::Debug for RunContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<String> = match self.to_value() {
            Value::Object(map) => map.keys().cloned().collect(),
            _ => Vec::new(),
        };
        f.debug_struct("RunContext")
            .field("namespace", &self.namespace())
            .field("runner_id", &self.runner_id())
            .field("keys", &keys)
            .field("browser", &self.browser().is_some())
            .finish()
    }
}

/// `my-report.1` → `MY_REPORT_1`
fn env_prefix(namespace: &str) -> String {
    namespace
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect()
}

/// Render a JSON value as plain text (strings unquoted)
pub fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

pub fn value_as_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => n.as_f64().map(|f| f != 0.0),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Some(true),
            "false" | "0" | "no" | "off" | "" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
