// crates/opsrunbook-server/tests/server.rs
// ============================================================================
// Module: Server Flow Tests
// Description: End-to-end incident runs over the local pipeline runtime.
// Purpose: Ensure ingress, pipeline, actions, and replay compose.
// Dependencies: opsrunbook-server, opsrunbook-core, tokio
// ============================================================================
//! ## Overview
//! Drives the creation flow against in-memory stores and a canned logs
//! backend: the happy path produces a packet and gated actions, replay
//! reports a matching plan, and an unconfigured runtime answers 503.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use opsrunbook_actions::ActionClients;
use opsrunbook_actions::ActionSettings;
use opsrunbook_actions::DryRunNotifier;
use opsrunbook_actions::DryRunSourceControl;
use opsrunbook_actions::DryRunTicketClient;
use opsrunbook_collectors::StubLogsBackend;
use opsrunbook_collectors::StubMetricsBackend;
use opsrunbook_collectors::StubWorkflowBackend;
use opsrunbook_collectors::logs::RECENT_ERRORS_QUERY;
use opsrunbook_config::OpsRunbookConfig;
use opsrunbook_core::InMemoryObjectStore;
use opsrunbook_core::InMemoryRecordStore;
use opsrunbook_core::IncidentEvent;
use opsrunbook_core::IncidentHints;
use opsrunbook_core::PrReviewEvent;
use opsrunbook_core::QueryOrder;
use opsrunbook_core::RecordStore;
use opsrunbook_core::TimeWindow;
use axum::response::IntoResponse;
use opsrunbook_review::ReviewDispatcher;
use opsrunbook_server::AppState;
use opsrunbook_server::LocalPipelineRuntime;
use opsrunbook_server::PipelineBackends;
use opsrunbook_server::PipelineRuntime;
use opsrunbook_server::create_incident_inner;
use opsrunbook_server::load_latest_actions;
use opsrunbook_server::replay_incident_inner;
use serde_json::json;
use time::Duration as TimeDuration;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Dispatcher that refuses nothing and records nothing.
struct NoopDispatcher;

impl ReviewDispatcher for NoopDispatcher {
    fn dispatch(&self, _event: &PrReviewEvent) -> Result<(), String> {
        Ok(())
    }
}

/// Builds an app state over in-memory stores and a canned logs backend.
fn app_state(with_runtime: bool) -> (AppState, Arc<InMemoryRecordStore>) {
    let config = OpsRunbookConfig::default();
    let store = Arc::new(InMemoryObjectStore::new());
    let records = Arc::new(InMemoryRecordStore::new());

    let logs = StubLogsBackend::new();
    logs.set_rows(
        RECENT_ERRORS_QUERY,
        vec![
            json!({"@timestamp": "2026-02-15T11:59:00Z", "@message": "ERROR ValueError: simulated"}),
            json!({"@timestamp": "2026-02-15T11:58:00Z", "@message": "ERROR ValueError: simulated"}),
            json!({"@timestamp": "2026-02-15T11:57:00Z", "@message": "ERROR ValueError: simulated"}),
        ],
    );

    let runtime: Option<Arc<dyn PipelineRuntime>> = with_runtime.then(|| {
        Arc::new(LocalPipelineRuntime {
            store: store.clone() as Arc<dyn opsrunbook_core::ObjectStore>,
            records: records.clone() as Arc<dyn RecordStore>,
            bus: None,
            resource_repo_map: BTreeMap::new(),
            action_settings: ActionSettings {
                automation_enabled: true,
                dry_run: true,
                enable_pr_action: true,
                pr_confidence_threshold: 0.7,
                owner: "org".to_string(),
                mapping_rules: Vec::new(),
                legacy_repo_map: BTreeMap::new(),
            },
            action_clients: ActionClients {
                ticket: Some(Arc::new(DryRunTicketClient::new())),
                notify: Some(Arc::new(DryRunNotifier::new())),
                github: Some(Arc::new(DryRunSourceControl::new("org"))),
            },
            backends: PipelineBackends {
                logs: Arc::new(logs),
                metrics: Arc::new(StubMetricsBackend::new()),
                workflow: Arc::new(StubWorkflowBackend::new()),
            },
        }) as Arc<dyn PipelineRuntime>
    });

    let state = AppState {
        config: Arc::new(config),
        store,
        records: records.clone(),
        runtime,
        dispatcher: Arc::new(NoopDispatcher),
    };
    (state, records)
}

/// Builds a logs-only incident event.
fn incident_event() -> IncidentEvent {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    IncidentEvent {
        schema_version: "incident_event.v1".to_string(),
        event_id: "evt-12345678".to_string(),
        incident_id: None,
        tenant_id: None,
        source: "manual".to_string(),
        service: "loggen".to_string(),
        environment: "dev".to_string(),
        severity: None,
        time_window: TimeWindow::new(end - TimeDuration::minutes(10), end).unwrap(),
        hints: IncidentHints {
            log_groups: vec!["/aws/lambda/loggen".to_string()],
            metric_queries: Vec::new(),
            workflow_arns: Vec::new(),
        },
    }
}

/// Polls until the run record reaches a terminal status.
fn wait_for_terminal(records: &InMemoryRecordStore, pk: &str, sk: &str) -> String {
    let give_up = Instant::now() + Duration::from_secs(10);
    loop {
        if let Ok(Some(record)) = records.get(pk, sk) {
            let status = record.field_str("status").unwrap_or("STARTING").to_string();
            if status == "SUCCEEDED" || status == "FAILED" {
                return status;
            }
        }
        assert!(Instant::now() < give_up, "pipeline did not finish in time");
        std::thread::sleep(Duration::from_millis(20));
    }
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

/// Verifies the logs-only happy path end to end.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn logs_only_happy_path() {
    let (state, records) = app_state(true);

    let response = create_incident_inner(&state, incident_event()).unwrap();
    let incident_id = response["incident_id"].as_str().unwrap().to_string();
    let run_id = response["collector_run_id"].as_str().unwrap().to_string();
    assert!(incident_id.starts_with("inc-"));
    assert!(response["execution_handle"].as_str().unwrap().starts_with("local:"));

    let pk = format!("INCIDENT#{incident_id}");
    let status = wait_for_terminal(&records, &pk, &format!("RUN#{run_id}"));
    assert_eq!(status, "SUCCEEDED");

    // Snapshot and packet records landed.
    assert_eq!(records.query(&pk, "SNAPSHOT#", QueryOrder::Descending, None).unwrap().len(), 1);
    let packets = records.query(&pk, "PACKET#", QueryOrder::Descending, None).unwrap();
    assert_eq!(packets.len(), 1);

    // Actions: ticket and notify succeed, PR is gated on unknown confidence.
    let assembled = load_latest_actions(&state, &incident_id).unwrap().unwrap();
    let results = assembled["results"].as_array().unwrap();
    let status_of = |action_type: &str| -> String {
        results
            .iter()
            .find(|result| result["action_type"] == action_type)
            .map(|result| result["status"].as_str().unwrap_or_default().to_string())
            .unwrap_or_default()
    };
    assert_eq!(status_of("ticket"), "success");
    assert_eq!(status_of("notify"), "success");
    assert_eq!(status_of("pr"), "skipped");

    // Replay reports a matching deterministic plan and never executes.
    let replay = replay_incident_inner(&state, &incident_id).unwrap();
    assert_eq!(replay["match"], true);
    assert!(replay["diffs"].as_array().unwrap().is_empty());
    assert!(!replay["packet_hash"].as_str().unwrap().is_empty());
}

// ============================================================================
// SECTION: Error Shapes
// ============================================================================

/// Verifies 503 when the runtime is not configured.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_runtime_is_503() {
    let (state, _records) = app_state(false);
    let err = create_incident_inner(&state, incident_event()).unwrap_err();
    let response = err.into_response();
    assert_eq!(response.status(), 503);
}

/// Verifies invalid events are rejected with a client error.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_event_is_client_error() {
    let (state, _records) = app_state(true);
    let mut event = incident_event();
    event.event_id = "short".to_string();
    let err = create_incident_inner(&state, event).unwrap_err();
    assert_eq!(err.into_response().status(), 422);

    let mut event = incident_event();
    event.hints = IncidentHints::default();
    let err = create_incident_inner(&state, event).unwrap_err();
    assert_eq!(err.into_response().status(), 422);
}

/// Verifies replay on an unknown incident is 404.
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn replay_unknown_incident_is_404() {
    let (state, _records) = app_state(true);
    let err = replay_incident_inner(&state, "inc-missing").unwrap_err();
    assert_eq!(err.into_response().status(), 404);
}
