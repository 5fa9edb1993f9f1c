//! Report definitions
//!
//! A report is identified by which shape marker it carries, in priority
//! order: `templateName`, `dashboards`, `query`. The raw map is kept in
//! `fields` because it seeds the report's namespaced Run Context.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Template variant
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateParams {
    pub template_name: String,
    /// Overrides the `.md` extension inference
    #[serde(default)]
    pub is_markdown: Option<bool>,
    /// Render to a page document (HTML, then PDF when a browser is open)
    #[serde(default = "default_true")]
    pub render: bool,
}

impl TemplateParams {
    pub fn is_markdown(&self) -> bool {
        self.is_markdown.unwrap_or_else(|| {
            self.template_name.to_ascii_lowercase().ends_with(".md")
        })
    }
}

/// Dashboard variant
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardParams {
    pub dashboards: Vec<String>,
    #[serde(default)]
    pub combine_pdfs: bool,
}

/// Query variant
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryParams {
    pub query: String,
    #[serde(default)]
    pub account_id: Option<u64>,
    #[serde(default)]
    pub account_ids: Vec<u64>,
    /// Keep the raw result instead of building a column/row table
    #[serde(default)]
    pub pass_through: bool,
    #[serde(default)]
    pub columns: Option<Vec<String>>,
}

fn default_true() -> bool {
    true
}

/// The generator variant a report maps to
#[derive(Debug, Clone, PartialEq)]
pub enum ReportKind {
    Template(TemplateParams),
    Dashboard(DashboardParams),
    Query(QueryParams),
    /// None of the shape markers is present
    Unrecognized,
    /// A shape marker is present but the definition does not parse
    Invalid(String),
}

impl ReportKind {
    pub fn name(&self) -> &'static str {
        match self {
            ReportKind::Template(_) => "template",
            ReportKind::Dashboard(_) => "dashboard",
            ReportKind::Query(_) => "query",
            ReportKind::Unrecognized => "unrecognized",
            ReportKind::Invalid(_) => "invalid",
        }
    }
}

/// One channel entry inside a publish configuration
///
/// `type` selects the channel; every other key is a channel setting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl ChannelEntry {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            settings: Map::new(),
        }
    }

    pub fn with(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.settings.insert(key.to_string(), value.into());
        self
    }
}

/// Named group of channels, selected per run by id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishConfig {
    #[serde(default = "default_publish_config_id")]
    pub id: String,
    #[serde(default)]
    pub channels: Vec<ChannelEntry>,
}

fn default_publish_config_id() -> String {
    "default".to_string()
}

/// A configured unit of work
///
/// Parsing never fails as a whole: a definition whose variant fields or
/// `publishConfigs` do not parse becomes `ReportKind::Invalid`, so one bad
/// report cannot take the rest of the manifest down with it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "Value")]
pub struct Report {
    pub id: Option<String>,
    pub name: Option<String>,
    pub kind: ReportKind,
    pub publish_configs: Option<Vec<PublishConfig>>,
    /// Every key of the definition, as written
    pub fields: Map<String, Value>,
}

impl Report {
    /// Build a report from its raw definition map
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        let kind = match variant(&fields) {
            Ok(kind) => kind,
            Err(reason) => ReportKind::Invalid(reason),
        };

        let (kind, publish_configs) = match fields.get("publishConfigs") {
            None | Some(Value::Null) => (kind, None),
            Some(value) => match serde_json::from_value(value.clone()) {
                Ok(configs) => (kind, Some(configs)),
                Err(e) => (ReportKind::Invalid(format!("invalid publishConfigs: {}", e)), None),
            },
        };

        Self {
            id: string_field(&fields, "id"),
            name: string_field(&fields, "name"),
            kind,
            publish_configs,
            fields,
        }
    }

    /// Build a report from any manifest entry; non-mappings are invalid
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(map) => Self::from_fields(map),
            other => Self {
                id: None,
                name: None,
                kind: ReportKind::Invalid(format!(
                    "report definition must be a mapping, got {}",
                    other
                )),
                publish_configs: None,
                fields: Map::new(),
            },
        }
    }

    /// Why the definition was rejected, if it was
    pub fn invalid_reason(&self) -> Option<&str> {
        match &self.kind {
            ReportKind::Invalid(reason) => Some(reason),
            _ => None,
        }
    }

    /// Status Event id: `id`, else the manifest index
    pub fn report_id(&self, index: usize) -> String {
        self.id.clone().unwrap_or_else(|| index.to_string())
    }

    /// Status Event name: `name`, else `id`, else the manifest index
    pub fn display_name(&self, index: usize) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| index.to_string())
    }

    /// Only page-rendering template reports need the browser
    pub fn needs_browser(&self) -> bool {
        matches!(&self.kind, ReportKind::Template(t) if t.render)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Stem used for output files: slug of id or name, else `report`
    pub fn file_stem(&self) -> String {
        let source = self
            .id
            .as_deref()
            .or(self.name.as_deref())
            .unwrap_or("report");
        let slug: String = source
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c.to_ascii_lowercase()
                } else {
                    '-'
                }
            })
            .collect();
        let slug = slug.trim_matches('-');
        if slug.is_empty() {
            "report".to_string()
        } else {
            slug.to_string()
        }
    }
}

impl From<Value> for Report {
    fn from(value: Value) -> Self {
        Self::from_value(value)
    }
}

/// Pick the variant by marker priority and parse its parameters
fn variant(fields: &Map<String, Value>) -> std::result::Result<ReportKind, String> {
    if fields.contains_key("templateName") {
        params(fields, "templateName").map(ReportKind::Template)
    } else if fields.contains_key("dashboards") {
        params(fields, "dashboards").map(ReportKind::Dashboard)
    } else if fields.contains_key("query") {
        params(fields, "query").map(ReportKind::Query)
    } else {
        Ok(ReportKind::Unrecognized)
    }
}

fn params<T: DeserializeOwned>(
    fields: &Map<String, Value>,
    marker: &str,
) -> std::result::Result<T, String> {
    serde_json::from_value(Value::Object(fields.clone()))
        .map_err(|e| format!("invalid '{}' report: {}", marker, e))
}

fn string_field(fields: &Map<String, Value>, key: &str) -> Option<String> {
    match fields.get(key) {
        Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
