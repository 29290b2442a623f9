// crates/opsrunbook-collectors/tests/workflow.rs
// ============================================================================
// Module: Workflow Collector Tests
// Description: Orchestrator sections, failed-peer listing, and attribution.
// Purpose: Ensure workflow evidence is bounded, deduplicated, and windowed.
// Dependencies: opsrunbook-collectors, opsrunbook-core
// ============================================================================
//! ## Overview
//! Drives the workflow collector against the stub backend, covering the
//! running-orchestrator case, failed-state attribution, window filtering,
//! self-dedup, and the execution cap.

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

use opsrunbook_collectors::CollectorContext;
use opsrunbook_collectors::ExecutionDescription;
use opsrunbook_collectors::ExecutionListItem;
use opsrunbook_collectors::FailureDetails;
use opsrunbook_collectors::RawHistoryEvent;
use opsrunbook_collectors::StubWorkflowBackend;
use opsrunbook_collectors::WorkflowTarget;
use opsrunbook_collectors::collect_workflow;
use opsrunbook_collectors::infer_last_failed_state;
use opsrunbook_core::CollectorRunId;
use opsrunbook_core::IncidentId;
use opsrunbook_core::InMemoryObjectStore;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::TimeWindow;
use serde_json::Value;
use time::Duration;
use time::OffsetDateTime;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Window end used across fixtures.
const fn window_end() -> OffsetDateTime {
    datetime!(2026-02-15 12:00:00 UTC)
}

/// Builds a standard collector context.
fn ctx() -> CollectorContext {
    let end = window_end();
    CollectorContext {
        incident_id: IncidentId::new("inc-test456"),
        collector_run_id: CollectorRunId::new("run-1"),
        service: "loggen".to_string(),
        environment: "dev".to_string(),
        time_window: TimeWindow::new(end - Duration::minutes(10), end).unwrap(),
        evidence_bucket: "evidence".to_string(),
        max_rows_per_section: 100,
        max_total_bytes: 200_000,
    }
}

/// Builds one failed listing item inside the window.
fn failed_item(arn: &str, minutes_before_end: i64) -> ExecutionListItem {
    ExecutionListItem {
        execution_arn: arn.to_string(),
        name: arn.rsplit(':').next().unwrap_or(arn).to_string(),
        status: "FAILED".to_string(),
        start_date: Some(window_end() - Duration::minutes(minutes_before_end)),
        stop_date: Some(window_end()),
    }
}

/// Reads the persisted blob back as JSON.
fn read_blob(store: &InMemoryObjectStore, key: &str) -> Value {
    let bytes = store.get("evidence", key, 1_000_000).unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

// ============================================================================
// SECTION: Skip Path
// ============================================================================

/// Verifies an empty target skips.
#[test]
fn empty_target_skips() {
    let store = InMemoryObjectStore::new();
    let backend = StubWorkflowBackend::new();

    let result = collect_workflow(&ctx(), &WorkflowTarget::default(), &backend, &store, None);

    assert!(result.skipped);
    assert!(store.is_empty());
}

// ============================================================================
// SECTION: Orchestrator Section
// ============================================================================

/// Verifies a running orchestrator is recorded with its status intact.
#[test]
fn running_orchestrator_is_recorded() {
    let store = InMemoryObjectStore::new();
    let backend = StubWorkflowBackend::new();
    backend.set_description(
        "arn:exec:orch",
        ExecutionDescription {
            status: Some("RUNNING".to_string()),
            start_date: Some(window_end() - Duration::minutes(1)),
            ..ExecutionDescription::default()
        },
    );

    let target = WorkflowTarget {
        orchestrator_execution_arn: Some("arn:exec:orch".to_string()),
        orchestrator_state_machine_arn: Some("arn:sm:orch".to_string()),
        state_machine_arns: Vec::new(),
    };
    let result = collect_workflow(&ctx(), &target, &backend, &store, None);

    let blob = read_blob(&store, &result.evidence_ref.unwrap().key);
    let section = &blob["sections"][0];
    assert_eq!(section["name"], "orchestrator_execution");
    assert_eq!(section["status"], "RUNNING");
    assert!(section.get("last_failed_state").is_none());
}

// ============================================================================
// SECTION: Failed-State Attribution
// ============================================================================

/// Verifies detail names win over the entered-state fallback.
#[test]
fn attribution_prefers_failure_detail_name() {
    let events = vec![
        RawHistoryEvent {
            id: 9,
            event_type: "TaskFailed".to_string(),
            timestamp: None,
            failure: Some(FailureDetails {
                name: Some("PersistSnapshot".to_string()),
                error: None,
                cause: None,
            }),
            entered_state_name: None,
        },
        RawHistoryEvent {
            id: 8,
            event_type: "TaskStateEntered".to_string(),
            timestamp: None,
            failure: None,
            entered_state_name: Some("CollectLogs".to_string()),
        },
    ];
    assert_eq!(infer_last_failed_state(&events), Some("PersistSnapshot".to_string()));
}

/// Verifies the entered-state fallback fires when details carry no name.
#[test]
fn attribution_falls_back_to_entered_state() {
    let events = vec![
        RawHistoryEvent {
            id: 9,
            event_type: "ExecutionFailed".to_string(),
            timestamp: None,
            failure: Some(FailureDetails::default()),
            entered_state_name: None,
        },
        RawHistoryEvent {
            id: 8,
            event_type: "TaskStateEntered".to_string(),
            timestamp: None,
            failure: None,
            entered_state_name: Some("CollectLogs".to_string()),
        },
    ];
    assert_eq!(infer_last_failed_state(&events), Some("CollectLogs".to_string()));
}

/// Verifies the event type is the last resort.
#[test]
fn attribution_last_resort_is_event_type() {
    let events = vec![RawHistoryEvent {
        id: 9,
        event_type: "ExecutionTimedOut".to_string(),
        timestamp: None,
        failure: None,
        entered_state_name: None,
    }];
    assert_eq!(infer_last_failed_state(&events), Some("ExecutionTimedOut".to_string()));
}

/// Verifies a clean history yields no failed state.
#[test]
fn attribution_none_without_failures() {
    let events = vec![RawHistoryEvent {
        id: 9,
        event_type: "TaskSucceeded".to_string(),
        timestamp: None,
        failure: None,
        entered_state_name: None,
    }];
    assert_eq!(infer_last_failed_state(&events), None);
}

// ============================================================================
// SECTION: Failed Executions
// ============================================================================

/// Verifies window filtering, self-dedup, and the execution cap.
#[test]
fn failed_listing_is_windowed_deduped_and_capped() {
    let store = InMemoryObjectStore::new();
    let backend = StubWorkflowBackend::new();

    let mut items: Vec<ExecutionListItem> = (0..25)
        .map(|idx| failed_item(&format!("arn:exec:peer-{idx}"), i64::from(idx % 9) + 1))
        .collect();
    // The orchestrator's own execution and one outside the window.
    items.push(failed_item("arn:exec:orch", 2));
    let mut outside = failed_item("arn:exec:late", 0);
    outside.start_date = Some(window_end() + Duration::minutes(5));
    items.insert(0, outside);
    backend.set_listing("arn:sm:peer", "FAILED", items);

    let target = WorkflowTarget {
        orchestrator_execution_arn: Some("arn:exec:orch".to_string()),
        orchestrator_state_machine_arn: None,
        state_machine_arns: vec!["arn:sm:peer".to_string()],
    };
    let result = collect_workflow(&ctx(), &target, &backend, &store, None);

    let evidence_ref = result.evidence_ref.unwrap();
    assert!(evidence_ref.truncated);

    let blob = read_blob(&store, &evidence_ref.key);
    let failed = blob["sections"]
        .as_array()
        .unwrap()
        .iter()
        .find(|section| section["name"] == "failed_executions")
        .unwrap();
    assert_eq!(failed["total_found"], 25);
    let executions = failed["executions"].as_array().unwrap();
    assert_eq!(executions.len(), 20);
    assert!(
        executions
            .iter()
            .all(|execution| execution["execution_arn"] != "arn:exec:orch")
    );
    assert!(executions.iter().all(|execution| execution["execution_arn"] != "arn:exec:late"));
}

/// Verifies enrichment copies error/cause and the inferred failed state.
#[test]
fn failed_executions_are_enriched() {
    let store = InMemoryObjectStore::new();
    let backend = StubWorkflowBackend::new();
    backend.set_listing("arn:sm:peer", "FAILED", vec![failed_item("arn:exec:peer-0", 3)]);
    backend.set_description(
        "arn:exec:peer-0",
        ExecutionDescription {
            status: Some("FAILED".to_string()),
            error: Some("States.TaskFailed".to_string()),
            cause: Some("ValueError: simulated".to_string()),
            ..ExecutionDescription::default()
        },
    );
    backend.set_history(
        "arn:exec:peer-0",
        vec![RawHistoryEvent {
            id: 3,
            event_type: "TaskFailed".to_string(),
            timestamp: None,
            failure: Some(FailureDetails {
                name: Some("DoWork".to_string()),
                error: None,
                cause: None,
            }),
            entered_state_name: None,
        }],
    );

    let target = WorkflowTarget {
        orchestrator_execution_arn: None,
        orchestrator_state_machine_arn: None,
        state_machine_arns: vec!["arn:sm:peer".to_string()],
    };
    let result = collect_workflow(&ctx(), &target, &backend, &store, None);

    let blob = read_blob(&store, &result.evidence_ref.unwrap().key);
    let execution = &blob["sections"][0]["executions"][0];
    assert_eq!(execution["error"], "States.TaskFailed");
    assert_eq!(execution["cause"], "ValueError: simulated");
    assert_eq!(execution["last_failed_state"], "DoWork");
}
