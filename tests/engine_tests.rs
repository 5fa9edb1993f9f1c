//! Orchestrator behaviour tests
//!
//! Runs the engine against in-crate doubles: scripted generators,
//! recording channels, a counting browser launcher and an event log.

use std::sync::Arc;

use pretty_assertions::assert_eq;
use serde_json::{json, Map, Value};

use nr_reports::context::MapEnv;
use nr_reports::testing::{
    CountingLauncher, FailingChannel, MockPlatform, RecordingChannel, RecordingMerger, Script,
    ScriptedGenerator, StaticDiscovery,
};
use nr_reports::{
    ChannelRegistry, Engine, EventLog, FileDiscovery, Generators, OutcomeStatus, Output,
    ReportError, RunContext, RunOptions, Services,
};

struct Harness {
    events: EventLog,
    generator: Arc<ScriptedGenerator>,
    channel: Arc<RecordingChannel>,
    launcher: Arc<CountingLauncher>,
}

impl Harness {
    fn new(generator: ScriptedGenerator) -> Self {
        Self {
            events: EventLog::new(),
            generator: Arc::new(generator),
            channel: Arc::new(RecordingChannel::new("file")),
            launcher: Arc::new(CountingLauncher::new()),
        }
    }

    fn ctx(&self) -> RunContext {
        let services = Services::new("test-runner", "1.2.3")
            .with_env(Arc::new(MapEnv::new()))
            .with_telemetry(Arc::new(self.events.clone()));
        RunContext::new(services, Map::new())
    }

    fn engine(&self, reports: Value) -> Engine {
        self.engine_with(reports, ChannelRegistry::new().with(self.channel.clone()))
    }

    fn engine_with(&self, reports: Value, channels: ChannelRegistry) -> Engine {
        let generators = Generators::new(
            Arc::new(MockPlatform::new()),
            Arc::new(RecordingMerger::new()),
        )
        .with_template(self.generator.clone())
        .with_dashboard(self.generator.clone())
        .with_query(self.generator.clone());

        Engine::new(generators)
            .with_discovery(Arc::new(StaticDiscovery::from_json(reports)))
            .with_channels(channels)
            .with_browser_launcher(self.launcher.clone())
    }

    fn status(&self) -> Vec<(String, bool, Option<String>)> {
        self.events
            .status_events()
            .into_iter()
            .map(|e| (e.report_id, e.error, e.message))
            .collect()
    }
}

fn three_reports() -> Value {
    json!([
        { "id": "a", "templateName": "a.md", "render": false },
        { "id": "b", "query": "SELECT count(*) FROM Transaction" },
        { "id": "c", "dashboards": ["g1"] }
    ])
}

#[tokio::test]
async fn every_processed_report_emits_one_event_in_order() {
    let h = Harness::new(ScriptedGenerator::new());
    let summary = h
        .engine(three_reports())
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    let events = h.events.status_events();
    let ids: Vec<_> = events.iter().map(|e| e.report_id.as_str()).collect();
    assert_eq!(ids, vec!["a", "b", "c"]);
    for event in &events {
        assert!(!event.error);
        assert_eq!(event.runner_id, "test-runner");
        assert_eq!(event.runner_version, "1.2.3");
        assert_eq!(event.publish_config_ids, "default");
        assert_eq!(event.message, None);
    }

    assert_eq!(summary.processed, 3);
    assert_eq!(summary.succeeded, 3);
    assert_eq!(h.generator.calls(), vec!["a", "b", "c"]);
    assert_eq!(h.generator.inits(), 3);
    assert_eq!(h.channel.report_ids(), vec!["a", "b", "c"]);
}

#[tokio::test]
async fn failing_report_does_not_stop_the_run() {
    let h = Harness::new(
        ScriptedGenerator::new().with("b", Script::Fail("query timed out".into())),
    );
    let summary = h
        .engine(three_reports())
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    let status = h.status();
    assert_eq!(status.len(), 3);
    assert!(!status[0].1);
    assert!(status[1].1);
    assert!(status[1].2.as_deref().unwrap().contains("query timed out"));
    assert!(!status[2].1);

    assert_eq!(h.channel.report_ids(), vec!["a", "c"]);
    assert_eq!(h.events.errors().len(), 1);
    assert_eq!(summary.failed, 1);
    assert!(summary.has_failures());
}

#[tokio::test]
async fn panicking_report_is_isolated() {
    let h = Harness::new(ScriptedGenerator::new().with("a", Script::Panic("kaboom".into())));
    let summary = h
        .engine(three_reports())
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    let status = h.status();
    assert_eq!(status.len(), 3);
    assert!(status[0].1);
    assert!(status[0].2.as_deref().unwrap().contains("kaboom"));
    assert_eq!(h.channel.report_ids(), vec!["b", "c"]);
    assert_eq!(summary.outcomes[0].status, OutcomeStatus::Failed);
}

#[tokio::test]
async fn unrecognized_reports_are_skipped_without_event() {
    let h = Harness::new(ScriptedGenerator::new());
    let summary = h
        .engine(json!([
            { "id": "a", "query": "q" },
            { "id": "mystery", "color": "blue" },
            { "id": "c", "query": "q" }
        ]))
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    let ids: Vec<_> = h.status().into_iter().map(|s| s.0).collect();
    assert_eq!(ids, vec!["a", "c"]);
    assert_eq!(summary.skipped, 1);
    assert_eq!(summary.processed, 2);
    assert_eq!(summary.outcomes[1].status, OutcomeStatus::Skipped);
}

#[tokio::test]
async fn malformed_report_fails_alone() {
    let dir = tempfile::TempDir::new().unwrap();
    let manifest = dir.path().join("reports.yaml");
    std::fs::write(
        &manifest,
        r#"
- { id: good, query: "SELECT count(*) FROM Transaction", accountId: 1 }
- { id: bad, dashboards: not-a-list }
- { id: typed, query: "SELECT 1", accountId: "123" }
- { id: after, templateName: a.md, render: false }
"#,
    )
    .unwrap();

    let h = Harness::new(ScriptedGenerator::new());
    let options = RunOptions::default().with_manifest(manifest.to_string_lossy());
    let summary = h
        .engine(json!([]))
        .with_discovery(Arc::new(FileDiscovery))
        .run(&h.ctx(), &options)
        .await
        .unwrap();

    let status = h.status();
    let ids: Vec<_> = status.iter().map(|s| s.0.as_str()).collect();
    assert_eq!(ids, vec!["good", "bad", "typed", "after"]);
    assert!(!status[0].1);
    assert!(status[1].1);
    assert!(status[1].2.as_deref().unwrap().contains("NR-015"));
    assert!(status[1].2.as_deref().unwrap().contains("dashboards"));
    assert!(status[2].1);
    assert!(!status[3].1);

    assert_eq!(h.generator.calls(), vec!["good", "after"]);
    assert_eq!(summary.failed, 2);
    assert_eq!(summary.succeeded, 2);
}

#[tokio::test]
async fn no_output_is_a_success_without_delivery() {
    let h = Harness::new(ScriptedGenerator::new().with("c", Script::NoOutput));
    let summary = h
        .engine(three_reports())
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(h.status()[2], ("c".to_string(), false, None));
    assert_eq!(h.channel.report_ids(), vec!["a", "b"]);
    assert_eq!(summary.no_output, 1);
    assert!(!summary.has_failures());
}

#[tokio::test]
async fn empty_file_output_counts_as_no_output() {
    let h = Harness::new(
        ScriptedGenerator::new().with("c", Script::Output(Output::files(Vec::new()))),
    );
    h.engine(three_reports())
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(h.status()[2], ("c".to_string(), false, None));
    assert_eq!(h.channel.report_ids(), vec!["a", "b"]);
}

#[tokio::test]
async fn browser_opens_once_for_rendering_reports() {
    let h = Harness::new(ScriptedGenerator::new());
    let summary = h
        .engine(json!([
            { "id": "p1", "templateName": "a.md" },
            { "id": "q", "query": "q" },
            { "id": "p2", "templateName": "b.html", "render": true }
        ]))
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    assert!(summary.browser_opened);
    assert_eq!(h.launcher.opens(), 1);
    assert_eq!(h.launcher.closes(), 1);
}

#[tokio::test]
async fn browser_never_opens_without_rendering_reports() {
    let h = Harness::new(ScriptedGenerator::new());
    let summary = h
        .engine(three_reports())
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    assert!(!summary.browser_opened);
    assert_eq!(h.launcher.opens(), 0);
    assert_eq!(h.launcher.closes(), 0);
}

#[tokio::test]
async fn browser_is_closed_even_when_reports_fail() {
    let h = Harness::new(ScriptedGenerator::new().with("p", Script::Panic("render".into())));
    h.engine(json!([{ "id": "p", "templateName": "a.md" }]))
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    assert_eq!(h.launcher.opens(), 1);
    assert_eq!(h.launcher.closes(), 1);
    assert!(h.status()[0].1);
}

#[tokio::test]
async fn browser_launch_failure_aborts_the_run() {
    let mut h = Harness::new(ScriptedGenerator::new());
    h.launcher = Arc::new(CountingLauncher::failing());
    let err = h
        .engine(json!([{ "id": "p", "templateName": "a.md" }]))
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, ReportError::Browser { .. }));
    assert!(h.events.is_empty());
    assert!(h.generator.calls().is_empty());
}

#[tokio::test]
async fn empty_manifest_is_a_run_level_error() {
    let h = Harness::new(ScriptedGenerator::new());
    let err = h
        .engine(json!([]))
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "NR-001");
    assert!(h.events.is_empty());
}

#[tokio::test]
async fn discovery_failure_emits_no_events() {
    let h = Harness::new(ScriptedGenerator::new());
    let engine = h.engine(json!([])).with_discovery(Arc::new(StaticDiscovery::failing(
        ReportError::ManifestNotFound {
            path: "reports/*.yaml".into(),
        },
    )));
    let err = engine
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap_err();

    assert!(err.is_fatal());
    assert!(h.events.is_empty());
    assert_eq!(h.launcher.opens(), 0);
}

#[tokio::test]
async fn failing_channel_does_not_block_other_channels() {
    let h = Harness::new(ScriptedGenerator::new());
    let broken = Arc::new(FailingChannel::new("broken"));
    let channels = ChannelRegistry::new()
        .with(h.channel.clone())
        .with(broken.clone());

    h.engine_with(
        json!([
            {
                "id": "a",
                "query": "q",
                "publishConfigs": [{
                    "id": "default",
                    "channels": [{ "type": "broken" }, { "type": "file" }]
                }]
            },
            { "id": "b", "query": "q" }
        ]),
        channels,
    )
    .run(&h.ctx(), &RunOptions::default())
    .await
    .unwrap();

    assert_eq!(broken.attempts(), 1);
    assert_eq!(h.channel.report_ids(), vec!["a", "b"]);

    let status = h.status();
    assert!(status[0].1);
    assert!(status[0].2.as_deref().unwrap().contains("broken"));
    assert!(!status[1].1);
}

#[tokio::test]
async fn unknown_channel_fails_before_generation() {
    let h = Harness::new(ScriptedGenerator::new());
    h.engine(json!([
        {
            "id": "a",
            "query": "q",
            "publishConfigs": [{ "channels": [{ "type": "carrier-pigeon" }] }]
        },
        { "id": "b", "query": "q" }
    ]))
    .run(&h.ctx(), &RunOptions::default())
    .await
    .unwrap();

    assert_eq!(h.generator.calls(), vec!["b"]);
    let status = h.status();
    assert!(status[0].1);
    assert!(status[0].2.as_deref().unwrap().contains("NR-013"));
}

#[tokio::test]
async fn invalid_channel_format_fails_the_report() {
    let h = Harness::new(ScriptedGenerator::new());
    h.engine(json!([{ "id": "a", "query": "q", "format": "pdf" }]))
        .run(&h.ctx(), &RunOptions::default())
        .await
        .unwrap();

    let status = h.status();
    assert!(status[0].1);
    assert!(status[0].2.as_deref().unwrap().contains("NR-011"));
}

#[tokio::test]
async fn only_selected_publish_configs_are_delivered() {
    let h = Harness::new(ScriptedGenerator::new());
    let options = RunOptions::default()
        .with_publish_config_ids(vec!["weekly".into(), "audit".into()]);

    h.engine(json!([{
        "id": "a",
        "query": "q",
        "publishConfigs": [
            { "id": "default", "channels": [{ "type": "file", "destDir": "/daily" }] },
            { "id": "weekly", "channels": [{ "type": "file", "destDir": "/weekly" }] }
        ]
    }]))
    .run(&h.ctx(), &options)
    .await
    .unwrap();

    let deliveries = h.channel.deliveries();
    assert_eq!(deliveries.len(), 1);
    assert_eq!(deliveries[0].channel.get_str("destDir").as_deref(), Some("/weekly"));
    assert_eq!(h.events.status_events()[0].publish_config_ids, "weekly,audit");
}

#[tokio::test]
async fn channels_see_report_scoped_context() {
    let h = Harness::new(ScriptedGenerator::new());
    let mut variables = Map::new();
    variables.insert("team".into(), json!("core"));
    let options = RunOptions {
        variables,
        ..Default::default()
    };

    h.engine(json!([{ "id": "daily", "query": "q", "format": "text" }]))
        .run(&h.ctx(), &options)
        .await
        .unwrap();

    let delivery = &h.channel.deliveries()[0];
    assert_eq!(delivery.namespace.as_deref(), Some("daily"));
    assert_eq!(delivery.rendered.as_deref(), Some("output of daily"));
    assert_eq!(delivery.channel.format.as_str(), "text");
}

#[tokio::test]
async fn reports_without_id_are_identified_by_index() {
    let h = Harness::new(ScriptedGenerator::new());
    h.engine(json!([
        { "name": "Named", "query": "q" },
        { "query": "q" }
    ]))
    .run(&h.ctx(), &RunOptions::default())
    .await
    .unwrap();

    let events = h.events.status_events();
    assert_eq!(events[0].report_id, "0");
    assert_eq!(events[0].report_name, "Named");
    assert_eq!(events[1].report_id, "1");
    assert_eq!(events[1].report_name, "1");
}
