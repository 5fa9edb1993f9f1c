//! Channel resolution
//!
//! Settings precedence, lowest first:
//! 1. `Channel::defaults()`
//! 2. channel keys set directly on the report
//! 3. the publish configuration's channel entry

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde_json::{Map, Value};

use crate::ast::{ChannelEntry, Report};
use crate::context::{value_as_bool, value_as_string, RunContext};
use crate::error::{ReportError, Result};

use super::{Channel, ChannelRegistry};

/// Report-level keys that flow into channel settings
///
/// `passThrough` is left out: on a report it shapes the query result, on a
/// channel entry it skips the message body template.
const REPORT_CHANNEL_KEYS: &[&str] = &[
    "format",
    "attachOutput",
    "template",
    "resultsFormat",
    "outputFileName",
    "destDir",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChannelFormat {
    #[default]
    Html,
    Text,
}

impl ChannelFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelFormat::Html => "html",
            ChannelFormat::Text => "text",
        }
    }

    /// File extension for inline content in this format
    pub fn extension(&self) -> &'static str {
        match self {
            ChannelFormat::Html => "html",
            ChannelFormat::Text => "txt",
        }
    }
}

impl FromStr for ChannelFormat {
    type Err = ();

    fn from_str(s: &str) -> std::result::Result<Self, ()> {
        match s.trim().to_ascii_lowercase().as_str() {
            "html" => Ok(ChannelFormat::Html),
            "text" => Ok(ChannelFormat::Text),
            _ => Err(()),
        }
    }
}

impl fmt::Display for ChannelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Table serialization for query results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultsFormat {
    #[default]
    Csv,
    Json,
}

impl ResultsFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ResultsFormat::Csv => "csv",
            ResultsFormat::Json => "json",
        }
    }
}

/// One channel of one report, with merged settings
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedChannel {
    pub kind: String,
    pub format: ChannelFormat,
    pub results_format: ResultsFormat,
    pub settings: Map<String, Value>,
}

impl ResolvedChannel {
    /// Merge and validate settings for `entry`
    pub fn resolve(
        defaults: Map<String, Value>,
        report: &Report,
        entry: &ChannelEntry,
    ) -> Result<Self> {
        let mut settings = defaults;

        let report_keys: Vec<String> = REPORT_CHANNEL_KEYS
            .iter()
            .map(|k| k.to_string())
            .chain(settings.keys().cloned())
            .collect();
        for key in report_keys {
            if let Some(value) = report.get(&key) {
                settings.insert(key, value.clone());
            }
        }
        for (key, value) in &entry.settings {
            settings.insert(key.clone(), value.clone());
        }
        settings.insert("type".to_string(), Value::String(entry.kind.clone()));

        let format = match settings.get("format") {
            None | Some(Value::Null) => ChannelFormat::default(),
            Some(value) => {
                let raw = value_as_string(value);
                raw.parse::<ChannelFormat>().map_err(|_| ReportError::InvalidFormat {
                    channel: entry.kind.clone(),
                    format: raw,
                })?
            }
        };

        let results_format = match settings.get("resultsFormat") {
            None | Some(Value::Null) => ResultsFormat::default(),
            Some(value) => {
                let raw = value_as_string(value);
                match raw.trim().to_ascii_lowercase().as_str() {
                    "csv" => ResultsFormat::Csv,
                    "json" => ResultsFormat::Json,
                    _ => {
                        return Err(ReportError::InvalidSetting {
                            key: "resultsFormat".to_string(),
                            value: raw,
                            reason: "expected csv or json".to_string(),
                        })
                    }
                }
            }
        };

        Ok(Self {
            kind: entry.kind.clone(),
            format,
            results_format,
            settings,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.settings.get(key).filter(|v| !v.is_null())
    }

    pub fn get_str(&self, key: &str) -> Option<String> {
        self.get(key).map(value_as_string).filter(|s| !s.is_empty())
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(value_as_bool).unwrap_or(default)
    }

    /// Deliver the output as a file rather than inline text
    pub fn attach_output(&self) -> bool {
        self.get_bool("attachOutput", false)
    }

    /// Deliver rendered output as the message body, skipping the body template
    pub fn pass_through(&self) -> bool {
        self.get_bool("passThrough", false)
    }

    /// Template override used to render inline results
    pub fn template(&self) -> Option<String> {
        self.get_str("template")
    }
}

/// Channels of `report` for the selected publish configuration ids
///
/// A report without `publishConfigs` gets one channel of the context's
/// default channel type.
pub fn resolve_channels(
    ctx: &RunContext,
    report: &Report,
    publish_config_ids: &[String],
    registry: &ChannelRegistry,
) -> Result<Vec<(Arc<dyn Channel>, ResolvedChannel)>> {
    let entries: Vec<ChannelEntry> = match &report.publish_configs {
        None => vec![ChannelEntry::new(ctx.default_channel_type())],
        Some(configs) => configs
            .iter()
            .filter(|config| publish_config_ids.iter().any(|id| *id == config.id))
            .flat_map(|config| config.channels.iter().cloned())
            .collect(),
    };

    entries
        .iter()
        .map(|entry| {
            let channel = registry.get(&entry.kind)?;
            let resolved = ResolvedChannel::resolve(channel.defaults(), report, entry)?;
            Ok((channel, resolved))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MapEnv, Services};
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn report(value: Value) -> Report {
        Report::from_value(value)
    }

    fn defaults() -> Map<String, Value> {
        match json!({ "format": "text", "destDir": "/default", "attachOutput": true }) {
            Value::Object(m) => m,
            _ => Map::new(),
        }
    }

    #[test]
    fn entry_beats_report_beats_defaults() {
        let r = report(json!({ "query": "q", "destDir": "/report", "format": "HTML " }));
        let entry = ChannelEntry::new("file").with("destDir", "/entry");
        let resolved = ResolvedChannel::resolve(defaults(), &r, &entry).unwrap();

        assert_eq!(resolved.get_str("destDir").as_deref(), Some("/entry"));
        assert_eq!(resolved.format, ChannelFormat::Html);
        assert!(resolved.attach_output());
        assert_eq!(resolved.results_format, ResultsFormat::Csv);
    }

    #[test]
    fn format_is_html_by_default_and_closed() {
        let r = report(json!({ "query": "q" }));
        let ok = ResolvedChannel::resolve(Map::new(), &r, &ChannelEntry::new("file")).unwrap();
        assert_eq!(ok.format, ChannelFormat::Html);

        let bad = ChannelEntry::new("file").with("format", "pdf");
        let err = ResolvedChannel::resolve(Map::new(), &r, &bad).unwrap_err();
        assert!(matches!(err, ReportError::InvalidFormat { ref format, .. } if format == "pdf"));
    }

    #[test]
    fn results_format_is_validated() {
        let r = report(json!({ "query": "q", "resultsFormat": "JSON" }));
        let ok = ResolvedChannel::resolve(Map::new(), &r, &ChannelEntry::new("file")).unwrap();
        assert_eq!(ok.results_format, ResultsFormat::Json);

        let bad = ChannelEntry::new("file").with("resultsFormat", "xml");
        assert_eq!(
            ResolvedChannel::resolve(Map::new(), &r, &bad).unwrap_err().code(),
            "NR-014"
        );
    }

    fn ctx() -> RunContext {
        let services = Services::new("r", "0").with_env(Arc::new(MapEnv::new()));
        RunContext::new(services, Map::new())
    }

    #[test]
    fn report_without_publish_configs_gets_default_channel() {
        let r = report(json!({ "query": "q" }));
        let channels =
            resolve_channels(&ctx(), &r, &["default".to_string()], &ChannelRegistry::builtin())
                .unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].1.kind, "file");
    }

    #[test]
    fn only_selected_publish_configs_contribute() {
        let r = report(json!({
            "query": "q",
            "publishConfigs": [
                { "id": "default", "channels": [{ "type": "file", "destDir": "/a" }] },
                { "id": "ops", "channels": [{ "type": "file", "destDir": "/b" }, { "type": "file", "destDir": "/c" }] },
                { "id": "unused", "channels": [{ "type": "nope" }] }
            ]
        }));
        let ids = vec!["ops".to_string(), "default".to_string()];
        let channels = resolve_channels(&ctx(), &r, &ids, &ChannelRegistry::builtin()).unwrap();
        let dirs: Vec<_> = channels
            .iter()
            .map(|(_, c)| c.get_str("destDir").unwrap_or_default())
            .collect();
        assert_eq!(dirs, vec!["/a", "/b", "/c"]);
    }

    #[test]
    fn selected_unknown_channel_fails_resolution() {
        let r = report(json!({
            "query": "q",
            "publishConfigs": [{ "id": "default", "channels": [{ "type": "nope" }] }]
        }));
        let err = match resolve_channels(&ctx(), &r, &["default".to_string()], &ChannelRegistry::builtin()) {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert_eq!(err.code(), "NR-013");
    }

    #[test]
    fn empty_channel_list_is_not_an_error() {
        let r = report(json!({ "query": "q", "publishConfigs": [{ "id": "default", "channels": [] }] }));
        let channels =
            resolve_channels(&ctx(), &r, &["default".to_string()], &ChannelRegistry::builtin())
                .unwrap();
        assert!(channels.is_empty());
    }
}
