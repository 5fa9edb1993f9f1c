//! Query generator

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument};

use crate::ast::{Manifest, QueryParams, Report, ReportKind};
use crate::context::RunContext;
use crate::error::{ReportError, Result};
use crate::output::{Output, QueryData};
use crate::platform::TelemetryApi;
use crate::template::render_str;

use super::{kind_mismatch, Generator};

pub struct QueryGenerator {
    api: Arc<dyn TelemetryApi>,
}

impl QueryGenerator {
    pub fn new(api: Arc<dyn TelemetryApi>) -> Self {
        Self { api }
    }
}

/// `accountIds`, else `accountId`, else `NEW_RELIC_ACCOUNT_ID`
fn account_ids(ctx: &RunContext, params: &QueryParams) -> Result<Vec<u64>> {
    if !params.account_ids.is_empty() {
        return Ok(params.account_ids.clone());
    }
    if let Some(id) = params.account_id {
        return Ok(vec![id]);
    }
    match ctx.get_u64("accountId", Some("NEW_RELIC_ACCOUNT_ID"), 0) {
        0 => Err(ReportError::MissingSetting {
            key: "accountId".to_string(),
        }),
        id => Ok(vec![id]),
    }
}

#[async_trait]
impl Generator for QueryGenerator {
    fn name(&self) -> &'static str {
        "query"
    }

    #[instrument(skip_all, fields(report = ?report.id))]
    async fn generate(
        &self,
        ctx: &RunContext,
        _manifest: &Manifest,
        report: &Report,
        _workspace: &Path,
    ) -> Result<Option<Output>> {
        let ReportKind::Query(params) = &report.kind else {
            return Err(kind_mismatch(self.name(), report));
        };

        let accounts = account_ids(ctx, params)?;
        let nrql = render_str(&params.query, ctx);
        debug!(accounts = ?accounts, nrql = %nrql, "running query");

        let results = self
            .api
            .run_query(&accounts, &nrql)
            .await
            .map_err(|e| match e {
                ReportError::QueryFailed { .. } | ReportError::MissingApiKey => e,
                other => ReportError::QueryFailed {
                    reason: other.to_string(),
                },
            })?;

        let data = if params.pass_through {
            QueryData::Raw(Value::Array(results))
        } else {
            QueryData::table(results, params.columns.clone())
        };
        Ok(Some(Output::from(data)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{MapEnv, Services};
    use crate::testing::MockPlatform;
    use serde_json::{json, Map};

    fn ctx(env: MapEnv) -> RunContext {
        let mut values = Map::new();
        values.insert("since".into(), json!("1 day ago"));
        RunContext::new(Services::new("r", "0").with_env(Arc::new(env)), values)
    }

    fn report(value: Value) -> Report {
        Report::from_value(value)
    }

    #[tokio::test]
    async fn builds_table_and_interpolates_query() {
        let platform = Arc::new(MockPlatform::new().with_query_rows(vec![json!({ "count": 3 })]));
        let generator = QueryGenerator::new(platform.clone());
        let r = report(json!({ "query": "SELECT count(*) SINCE {{ since }}", "accountId": 42 }));

        let out = generator
            .generate(&ctx(MapEnv::new()), &Manifest::default(), &r, Path::new("."))
            .await
            .unwrap();

        assert_eq!(
            out,
            Some(Output::from(QueryData::Table {
                columns: vec!["count".into()],
                rows: vec![json!({ "count": 3 }).as_object().cloned().unwrap()],
            }))
        );
        assert_eq!(
            platform.queries(),
            vec![(vec![42], "SELECT count(*) SINCE 1 day ago".to_string())]
        );
    }

    #[tokio::test]
    async fn pass_through_keeps_raw_results() {
        let platform = Arc::new(MockPlatform::new().with_query_rows(vec![json!({ "a": 1 })]));
        let generator = QueryGenerator::new(platform);
        let r = report(json!({ "query": "q", "accountIds": [1, 2], "passThrough": true }));

        let out = generator
            .generate(&ctx(MapEnv::new()), &Manifest::default(), &r, Path::new("."))
            .await
            .unwrap();
        assert_eq!(out, Some(Output::from(json!([{ "a": 1 }]))));
    }

    #[tokio::test]
    async fn account_falls_back_to_env_then_errors() {
        let generator = QueryGenerator::new(Arc::new(MockPlatform::new()));
        let r = report(json!({ "query": "q" }));

        let env = MapEnv::new().with("NEW_RELIC_ACCOUNT_ID", "7");
        assert!(generator
            .generate(&ctx(env), &Manifest::default(), &r, Path::new("."))
            .await
            .is_ok());

        let err = generator
            .generate(&ctx(MapEnv::new()), &Manifest::default(), &r, Path::new("."))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NR-012");
    }
}
