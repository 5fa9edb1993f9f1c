//! Platform Module - telemetry platform API collaborator
//!
//! - `TelemetryApi`: what the generators need from the platform
//! - `NerdgraphClient`: GraphQL implementation over `reqwest`

mod nerdgraph;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::Result;

pub use nerdgraph::{NerdgraphClient, DEFAULT_NERDGRAPH_ENDPOINT};

#[async_trait]
pub trait TelemetryApi: Send + Sync {
    /// One-time URL from which the dashboard's PDF snapshot can be fetched
    async fn dashboard_snapshot_url(&self, guid: &str) -> Result<String>;

    /// Run an NRQL query across accounts; returns the result rows
    async fn run_query(&self, account_ids: &[u64], nrql: &str) -> Result<Vec<Value>>;
}
