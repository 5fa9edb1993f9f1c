//! Query results and their serializations

use serde_json::{Map, Value};

use crate::channel::ResultsFormat;
use crate::context::value_as_string;
use crate::error::{ReportError, Result};

/// Query results as returned, or shaped into a column/row table
#[derive(Debug, Clone, PartialEq)]
pub enum QueryData {
    Raw(Value),
    Table {
        columns: Vec<String>,
        rows: Vec<Map<String, Value>>,
    },
}

impl QueryData {
    /// Build a table from result rows
    ///
    /// Columns are `columns` when given, else every row key in first-seen
    /// order. Non-object rows are stored under a `value` column.
    pub fn table(results: Vec<Value>, columns: Option<Vec<String>>) -> Self {
        let rows: Vec<Map<String, Value>> = results
            .into_iter()
            .map(|item| match item {
                Value::Object(map) => map,
                other => {
                    let mut map = Map::new();
                    map.insert("value".to_string(), other);
                    map
                }
            })
            .collect();

        let columns = columns.unwrap_or_else(|| {
            let mut seen: Vec<String> = Vec::new();
            for row in &rows {
                for key in row.keys() {
                    if !seen.contains(key) {
                        seen.push(key.clone());
                    }
                }
            }
            seen
        });

        QueryData::Table { columns, rows }
    }

    /// Value bound as `result` when rendering templates
    pub fn to_value(&self) -> Value {
        match self {
            QueryData::Raw(value) => value.clone(),
            QueryData::Table { columns, rows } => {
                let mut map = Map::new();
                map.insert(
                    "columns".to_string(),
                    Value::Array(columns.iter().cloned().map(Value::String).collect()),
                );
                map.insert(
                    "rows".to_string(),
                    Value::Array(rows.iter().cloned().map(Value::Object).collect()),
                );
                Value::Object(map)
            }
        }
    }

    pub fn extension(&self, format: ResultsFormat) -> &'static str {
        match self {
            QueryData::Raw(_) => "json",
            QueryData::Table { .. } => format.extension(),
        }
    }

    /// Serialize without a template
    pub fn serialize(&self, format: ResultsFormat) -> Result<String> {
        match self {
            QueryData::Raw(value) => Ok(serde_json::to_string_pretty(value)?),
            QueryData::Table { columns, rows } => match format {
                ResultsFormat::Json => {
                    let shaped = json_rows(columns, rows);
                    Ok(serde_json::to_string_pretty(&shaped)?)
                }
                ResultsFormat::Csv => to_csv(columns, rows),
            },
        }
    }
}

/// Rows restricted to `columns`; absent values become null
fn json_rows(columns: &[String], rows: &[Map<String, Value>]) -> Vec<Value> {
    rows.iter()
        .map(|row| {
            let shaped: Map<String, Value> = columns
                .iter()
                .map(|col| (col.clone(), row.get(col).cloned().unwrap_or(Value::Null)))
                .collect();
            Value::Object(shaped)
        })
        .collect()
}

fn to_csv(columns: &[String], rows: &[Map<String, Value>]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(columns)?;
    for row in rows {
        writer.write_record(
            columns
                .iter()
                .map(|col| row.get(col).map(value_as_string).unwrap_or_default()),
        )?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ReportError::Io(e.into_error()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}
