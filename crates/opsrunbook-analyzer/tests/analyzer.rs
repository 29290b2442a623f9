// crates/opsrunbook-analyzer/tests/analyzer.rs
// ============================================================================
// Module: Analyzer Tests
// Description: Snapshot-to-packet behavior over collected evidence.
// Purpose: Ensure findings, limits, owners, idempotency, and determinism.
// Dependencies: opsrunbook-analyzer, opsrunbook-collectors, opsrunbook-core
// ============================================================================
//! ## Overview
//! Runs collectors against stubs, persists a snapshot, and drives the
//! analyzer end-to-end over the in-memory stores.

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

use opsrunbook_analyzer::AnalyzeRequest;
use opsrunbook_analyzer::AnalyzerOutcome;
use opsrunbook_analyzer::analyze;
use opsrunbook_collectors::CollectorContext;
use opsrunbook_collectors::ExecutionDescription;
use opsrunbook_collectors::StubLogsBackend;
use opsrunbook_collectors::StubWorkflowBackend;
use opsrunbook_collectors::WorkflowTarget;
use opsrunbook_collectors::collect_logs;
use opsrunbook_collectors::collect_workflow;
use opsrunbook_collectors::logs::RECENT_ERRORS_QUERY;
use opsrunbook_collectors::persist_snapshot;
use opsrunbook_core::CollectorResult;
use opsrunbook_core::CollectorRunId;
use opsrunbook_core::CollectorType;
use opsrunbook_core::InMemoryObjectStore;
use opsrunbook_core::InMemoryRecordStore;
use opsrunbook_core::IncidentId;
use opsrunbook_core::RecordingEventBus;
use opsrunbook_core::TimeWindow;
use serde_json::json;
use time::Duration;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a standard collector context.
fn ctx() -> CollectorContext {
    let end = datetime!(2026-02-15 12:00:00 UTC);
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

/// Collects logs-only evidence and persists the snapshot.
fn logs_only_snapshot(
    store: &InMemoryObjectStore,
    records: &InMemoryRecordStore,
) -> AnalyzeRequest {
    let context = ctx();
    let backend = StubLogsBackend::new();
    backend.set_rows(
        RECENT_ERRORS_QUERY,
        vec![
            json!({"@timestamp": "2026-02-15T11:59:00Z", "@message": "ERROR ValueError: simulated"}),
            json!({"@timestamp": "2026-02-15T11:58:00Z", "@message": "ERROR ValueError: simulated"}),
            json!({"@timestamp": "2026-02-15T11:57:00Z", "@message": "ERROR ValueError: simulated"}),
        ],
    );
    let logs =
        collect_logs(&context, &["/aws/lambda/loggen".to_string()], &backend, store, None);
    let results = vec![
        logs,
        CollectorResult::skipped(CollectorType::Metrics),
        CollectorResult::skipped(CollectorType::Workflow),
    ];
    let outcome = persist_snapshot(&context, &results, store, records, None).unwrap();
    AnalyzeRequest {
        incident_id: context.incident_id,
        collector_run_id: context.collector_run_id,
        snapshot_ref: outcome.snapshot_ref,
        service: context.service,
        environment: context.environment,
        time_window: context.time_window,
    }
}

// ============================================================================
// SECTION: Happy Path
// ============================================================================

/// Verifies the logs-only scenario: one finding, limits, unknown owner.
#[test]
fn logs_only_produces_one_finding() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();
    let bus = RecordingEventBus::new();
    let request = logs_only_snapshot(&store, &records);

    let outcome = analyze(&request, &BTreeMap::new(), &store, &records, Some(&bus)).unwrap();
    let AnalyzerOutcome::Analyzed {
        packet, ..
    } = outcome
    else {
        panic!("expected an analyzed outcome");
    };

    assert_eq!(packet.findings.len(), 1);
    assert_eq!(packet.findings[0].id, "logs-errors-found");
    assert!((packet.findings[0].confidence - 0.8).abs() < f64::EPSILON);
    assert_eq!(packet.findings[0].evidence_refs.len(), 1);
    assert!(packet.limits.iter().any(|limit| limit.contains("Metrics")));
    assert!(packet.limits.iter().any(|limit| limit.contains("Workflow")));
    assert_eq!(packet.suspected_owners.len(), 1);
    assert_eq!(packet.suspected_owners[0].repo, "unknown");
    assert!((packet.suspected_owners[0].confidence - 0.1).abs() < f64::EPSILON);
    assert!(packet.packet_hashes.is_some());

    assert_eq!(bus.captured_of("incident.analyzed").len(), 1);
}

/// Verifies owners come from the prefix map when resources match.
#[test]
fn owners_match_prefix_map() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();
    let request = logs_only_snapshot(&store, &records);

    let mut map = BTreeMap::new();
    map.insert("loggen".to_string(), "loggen-repo".to_string());
    let outcome = analyze(&request, &map, &store, &records, None).unwrap();
    let AnalyzerOutcome::Analyzed {
        packet, ..
    } = outcome
    else {
        panic!("expected an analyzed outcome");
    };

    assert_eq!(packet.suspected_owners[0].repo, "loggen-repo");
    assert!(packet.suspected_owners[0].confidence >= 0.4 - f64::EPSILON);
    assert!(
        packet.suspected_owners[0].reasons[0].contains("matches prefix 'loggen'"),
        "unexpected reason: {}",
        packet.suspected_owners[0].reasons[0]
    );
}

// ============================================================================
// SECTION: Idempotency and Determinism
// ============================================================================

/// Verifies the second analysis of one run is a no-op.
#[test]
fn second_analysis_is_idempotent() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();
    let request = logs_only_snapshot(&store, &records);

    let first = analyze(&request, &BTreeMap::new(), &store, &records, None).unwrap();
    assert!(matches!(first, AnalyzerOutcome::Analyzed { .. }));
    let second = analyze(&request, &BTreeMap::new(), &store, &records, None).unwrap();
    assert_eq!(second, AnalyzerOutcome::AlreadyAnalyzed);
}

/// Verifies re-analysis of one snapshot is hash-identical.
#[test]
fn reanalysis_is_hash_identical() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();
    let request = logs_only_snapshot(&store, &records);

    let first = analyze(&request, &BTreeMap::new(), &store, &InMemoryRecordStore::new(), None)
        .unwrap();
    let second = analyze(&request, &BTreeMap::new(), &store, &InMemoryRecordStore::new(), None)
        .unwrap();
    let AnalyzerOutcome::Analyzed {
        packet_sha256: first_sha,
        ..
    } = first
    else {
        panic!("expected an analyzed outcome");
    };
    let AnalyzerOutcome::Analyzed {
        packet_sha256: second_sha,
        ..
    } = second
    else {
        panic!("expected an analyzed outcome");
    };
    assert_eq!(first_sha, second_sha);
}

// ============================================================================
// SECTION: Workflow Rules
// ============================================================================

/// Verifies a running orchestrator never yields the failure finding.
#[test]
fn running_orchestrator_is_not_flagged() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();
    let context = ctx();

    let backend = StubWorkflowBackend::new();
    backend.set_description(
        "arn:exec:orch",
        ExecutionDescription {
            status: Some("RUNNING".to_string()),
            ..ExecutionDescription::default()
        },
    );
    let target = WorkflowTarget {
        orchestrator_execution_arn: Some("arn:exec:orch".to_string()),
        orchestrator_state_machine_arn: None,
        state_machine_arns: Vec::new(),
    };
    let workflow = collect_workflow(&context, &target, &backend, &store, None);
    let results = vec![
        CollectorResult::skipped(CollectorType::Logs),
        CollectorResult::skipped(CollectorType::Metrics),
        workflow,
    ];
    let outcome = persist_snapshot(&context, &results, &store, &records, None).unwrap();

    let request = AnalyzeRequest {
        incident_id: context.incident_id,
        collector_run_id: context.collector_run_id,
        snapshot_ref: outcome.snapshot_ref,
        service: context.service,
        environment: context.environment,
        time_window: context.time_window,
    };
    let analyzed = analyze(&request, &BTreeMap::new(), &store, &records, None).unwrap();
    let AnalyzerOutcome::Analyzed {
        packet, ..
    } = analyzed
    else {
        panic!("expected an analyzed outcome");
    };

    assert!(
        packet.findings.iter().all(|finding| finding.id != "stepfn-orchestrator-failed"),
        "running orchestrator must not be flagged"
    );
}

/// Verifies a failed orchestrator yields the high-confidence finding.
#[test]
fn failed_orchestrator_is_flagged() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();
    let context = ctx();

    let backend = StubWorkflowBackend::new();
    backend.set_description(
        "arn:exec:orch",
        ExecutionDescription {
            status: Some("FAILED".to_string()),
            error: Some("States.TaskFailed".to_string()),
            ..ExecutionDescription::default()
        },
    );
    let target = WorkflowTarget {
        orchestrator_execution_arn: Some("arn:exec:orch".to_string()),
        orchestrator_state_machine_arn: None,
        state_machine_arns: Vec::new(),
    };
    let workflow = collect_workflow(&context, &target, &backend, &store, None);
    let outcome = persist_snapshot(&context, &[workflow], &store, &records, None).unwrap();

    let request = AnalyzeRequest {
        incident_id: context.incident_id,
        collector_run_id: context.collector_run_id,
        snapshot_ref: outcome.snapshot_ref,
        service: context.service,
        environment: context.environment,
        time_window: context.time_window,
    };
    let analyzed = analyze(&request, &BTreeMap::new(), &store, &records, None).unwrap();
    let AnalyzerOutcome::Analyzed {
        packet, ..
    } = analyzed
    else {
        panic!("expected an analyzed outcome");
    };

    let finding = packet
        .findings
        .iter()
        .find(|finding| finding.id == "stepfn-orchestrator-failed")
        .unwrap();
    assert!((finding.confidence - 0.9).abs() < f64::EPSILON);
    assert!(finding.summary.contains("FAILED"));
}
