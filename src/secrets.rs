//! Secret accessors
//!
//! Credentials are injected through `SecretStore` instead of being read from
//! module-level clients, so tests can substitute fixed values.

use std::collections::HashMap;
use std::sync::Arc;

use crate::context::EnvSource;

/// Well-known secret names
pub const API_KEY_SECRET: &str = "apiKey";

/// Read-only access to named secrets
pub trait SecretStore: Send + Sync {
    fn secret(&self, name: &str) -> Option<String>;
}

/// Secrets resolved from an environment source
///
/// `apiKey` maps to `NEW_RELIC_API_KEY`; any other name is upper-snake-cased
/// (`emailPassword` → `EMAIL_PASSWORD`).
pub struct EnvSecrets {
    env: Arc<dyn EnvSource>,
}

impl EnvSecrets {
    pub fn new(env: Arc<dyn EnvSource>) -> Self {
        Self { env }
    }
}

impl SecretStore for EnvSecrets {
    fn secret(&self, name: &str) -> Option<String> {
        if name == API_KEY_SECRET {
            return self.env.var("NEW_RELIC_API_KEY");
        }
        self.env.var(&to_env_name(name))
    }
}

/// Fixed secrets, for tests and for values loaded from the config file
#[derive(Debug, Clone, Default)]
pub struct StaticSecrets {
    values: HashMap<String, String>,
}

impl StaticSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }
}

impl SecretStore for StaticSecrets {
    fn secret(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned()
    }
}

fn to_env_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() && i > 0 {
            out.push('_');
        }
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_uppercase());
        } else {
            out.push('_');
        }
    }
    out
}
