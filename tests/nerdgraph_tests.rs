//! NerdGraph client against a wiremock GraphQL endpoint

use pretty_assertions::assert_eq;
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use nr_reports::{NerdgraphClient, ReportError, TelemetryApi};

async fn client(server: &MockServer) -> NerdgraphClient {
    NerdgraphClient::new(format!("{}/graphql", server.uri()), Some("NRAK-TEST".into()))
}

#[tokio::test]
async fn snapshot_url_is_read_from_mutation_result() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("API-Key", "NRAK-TEST"))
        .and(body_partial_json(json!({ "variables": { "guid": "MXxEQVNI" } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "dashboardCreateSnapshotUrl": "https://snap.example/abc.pdf" }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let url = client(&server)
        .await
        .dashboard_snapshot_url("MXxEQVNI")
        .await
        .unwrap();
    assert_eq!(url, "https://snap.example/abc.pdf");
}

#[tokio::test]
async fn query_rows_are_returned_in_order() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(body_partial_json(json!({ "variables": { "accountIds": [1, 2] } })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": { "actor": { "nrql": { "results": [{ "count": 3 }, { "count": 5 }] } } }
        })))
        .mount(&server)
        .await;

    let rows = client(&server)
        .await
        .run_query(&[1, 2], "SELECT count(*) FROM Transaction")
        .await
        .unwrap();
    assert_eq!(rows, vec![json!({ "count": 3 }), json!({ "count": 5 })]);
}

#[tokio::test]
async fn graphql_errors_become_platform_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": null,
            "errors": [{ "message": "Access denied" }, { "message": "Try again" }]
        })))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .run_query(&[1], "SELECT 1")
        .await
        .unwrap_err();
    match err {
        ReportError::PlatformApi { message } => assert_eq!(message, "Access denied; Try again"),
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn http_failures_carry_the_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .dashboard_snapshot_url("guid")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NR-030");
    assert!(err.to_string().contains("status=503"));
    assert!(err.to_string().contains("maintenance"));
}

#[tokio::test]
async fn missing_snapshot_url_is_an_export_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "data": {} })))
        .mount(&server)
        .await;

    let err = client(&server)
        .await
        .dashboard_snapshot_url("guid")
        .await
        .unwrap_err();
    assert_eq!(err.code(), "NR-022");
}
