//! NerdGraph (GraphQL) client

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::error::{ReportError, Result};

use super::TelemetryApi;

pub const DEFAULT_NERDGRAPH_ENDPOINT: &str = "https://api.newrelic.com/graphql";

/// HTTP request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

const SNAPSHOT_MUTATION: &str = "mutation($guid: EntityGuid!) { dashboardCreateSnapshotUrl(guid: $guid) }";

const NRQL_QUERY: &str = "query($accountIds: [Int!]!, $nrql: Nrql!) { actor { nrql(accounts: $accountIds, query: $nrql) { results } } }";

#[derive(Debug, Deserialize)]
struct GraphqlResponse {
    #[serde(default)]
    data: Option<Value>,
    #[serde(default)]
    errors: Vec<GraphqlError>,
}

#[derive(Debug, Deserialize)]
struct GraphqlError {
    message: String,
}

#[derive(Clone)]
pub struct NerdgraphClient {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl NerdgraphClient {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            endpoint: endpoint.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Execute a GraphQL document and return its `data`
    async fn execute(&self, query: &str, variables: Value) -> Result<Value> {
        let api_key = self.api_key.as_deref().ok_or(ReportError::MissingApiKey)?;

        let response = self
            .http
            .post(&self.endpoint)
            .header("API-Key", api_key)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ReportError::PlatformApi {
                message: format!("status={} body={}", status.as_u16(), body.trim()),
            });
        }

        let body: GraphqlResponse = response.json().await?;
        if !body.errors.is_empty() {
            let messages: Vec<String> = body.errors.into_iter().map(|e| e.message).collect();
            return Err(ReportError::PlatformApi {
                message: messages.join("; "),
            });
        }

        body.data.ok_or_else(|| ReportError::PlatformApi {
            message: "response has no data".to_string(),
        })
    }
}

impl std::fmt::Debug for NerdgraphClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NerdgraphClient")
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .finish()
    }
}

#[async_trait]
impl TelemetryApi for NerdgraphClient {
    #[instrument(skip(self))]
    async fn dashboard_snapshot_url(&self, guid: &str) -> Result<String> {
        let data = self.execute(SNAPSHOT_MUTATION, json!({ "guid": guid })).await?;
        let url = data
            .get("dashboardCreateSnapshotUrl")
            .and_then(Value::as_str)
            .ok_or_else(|| ReportError::DashboardExport {
                guid: guid.to_string(),
                reason: "no snapshot URL in response".to_string(),
            })?;
        debug!(url, "snapshot url created");
        Ok(url.to_string())
    }

    #[instrument(skip(self))]
    async fn run_query(&self, account_ids: &[u64], nrql: &str) -> Result<Vec<Value>> {
        let data = self
            .execute(NRQL_QUERY, json!({ "accountIds": account_ids, "nrql": nrql }))
            .await?;
        let results = data
            .pointer("/actor/nrql/results")
            .and_then(Value::as_array)
            .ok_or_else(|| ReportError::QueryFailed {
                reason: "no results in response".to_string(),
            })?;
        debug!(rows = results.len(), "query returned");
        Ok(results.clone())
    }
}
