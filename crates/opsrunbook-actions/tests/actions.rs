// crates/opsrunbook-actions/tests/actions.rs
// ============================================================================
// Module: Action Executor Tests
// Description: Kill switch, idempotency, confidence gate, and dry-run flows.
// Purpose: Ensure write-side actions stay gated, recorded, and idempotent.
// Dependencies: opsrunbook-actions, opsrunbook-core
// ============================================================================
//! ## Overview
//! Drives the executor with dry-run providers over the in-memory record
//! store, covering the full sequence, the PR gate, and re-run behavior.

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

use opsrunbook_actions::ActionClients;
use opsrunbook_actions::ActionSettings;
use opsrunbook_actions::DryRunNotifier;
use opsrunbook_actions::DryRunSourceControl;
use opsrunbook_actions::DryRunTicketClient;
use opsrunbook_actions::RunOutcome;
use opsrunbook_actions::run_actions;
use opsrunbook_core::ActionStatus;
use opsrunbook_core::ActionType;
use opsrunbook_core::CollectorRunId;
use opsrunbook_core::CollectorType;
use opsrunbook_core::EvidenceRef;
use opsrunbook_core::Finding;
use opsrunbook_core::InMemoryRecordStore;
use opsrunbook_core::IncidentId;
use opsrunbook_core::IncidentPacket;
use opsrunbook_core::MappingRule;
use opsrunbook_core::MappingSignal;
use opsrunbook_core::MatchKind;
use opsrunbook_core::ModelTrace;
use opsrunbook_core::PACKET_SCHEMA;
use opsrunbook_core::QueryOrder;
use opsrunbook_core::RecordStore;
use opsrunbook_core::RecordingEventBus;
use opsrunbook_core::SnapshotRef;
use opsrunbook_core::SuspectedOwner;
use opsrunbook_core::TimeWindow;
use time::Duration;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a packet with one finding and one suspected owner.
fn packet() -> IncidentPacket {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    IncidentPacket {
        schema_version: PACKET_SCHEMA.to_string(),
        incident_id: IncidentId::new("inc-test456"),
        collector_run_id: CollectorRunId::new("run-1"),
        service: "loggen".to_string(),
        environment: "dev".to_string(),
        time_window: TimeWindow::new(end - Duration::minutes(10), end).unwrap(),
        snapshot_ref: SnapshotRef {
            bucket: "evidence".to_string(),
            key: "evidence/inc-test456/run-1.json".to_string(),
            sha256: "deadbeef".to_string(),
        },
        findings: vec![Finding {
            id: "logs-errors-found".to_string(),
            summary: "Found 3 recent error(s) in logs.".to_string(),
            confidence: 0.8,
            evidence_refs: vec![logs_ref()],
            notes: None,
        }],
        hypotheses: Vec::new(),
        next_actions: Vec::new(),
        suspected_owners: vec![SuspectedOwner {
            repo: "unknown".to_string(),
            confidence: 0.1,
            reasons: vec!["No resource-to-repo mapping matched".to_string()],
        }],
        limits: Vec::new(),
        model_trace: ModelTrace {
            provider: "stub".to_string(),
            model: None,
            prompt_version: "v1".to_string(),
            created_at: "2026-02-15T12:00:05Z".to_string(),
        },
        packet_hashes: None,
        all_evidence_refs: vec![logs_ref()],
    }
}

/// Builds the logs evidence reference.
fn logs_ref() -> EvidenceRef {
    EvidenceRef {
        collector_type: CollectorType::Logs,
        bucket: "evidence".to_string(),
        key: "evidence/inc-test456/run-1/logs.json".to_string(),
        sha256: "cafebabe".to_string(),
        byte_size: 2048,
        truncated: false,
    }
}

/// Builds default dry-run settings with the PR channel enabled.
fn settings() -> ActionSettings {
    ActionSettings {
        automation_enabled: true,
        dry_run: true,
        enable_pr_action: true,
        pr_confidence_threshold: 0.7,
        owner: "org".to_string(),
        mapping_rules: Vec::new(),
        legacy_repo_map: BTreeMap::new(),
    }
}

/// Builds the full dry-run client set.
fn dry_run_clients() -> ActionClients {
    ActionClients {
        ticket: Some(Arc::new(DryRunTicketClient::new())),
        notify: Some(Arc::new(DryRunNotifier::new())),
        github: Some(Arc::new(DryRunSourceControl::new("org"))),
    }
}

/// Unwraps the completed report.
fn completed(outcome: RunOutcome) -> opsrunbook_actions::RunReport {
    match outcome {
        RunOutcome::Completed(report) => report,
        RunOutcome::AutomationDisabled => panic!("expected a completed run"),
    }
}

// ============================================================================
// SECTION: Kill Switch
// ============================================================================

/// Verifies the kill switch prevents every write.
#[test]
fn kill_switch_blocks_execution() {
    let records = InMemoryRecordStore::new();
    let mut blocked = settings();
    blocked.automation_enabled = false;

    let outcome = run_actions(&packet(), &blocked, &dry_run_clients(), &records, None);

    assert_eq!(outcome, RunOutcome::AutomationDisabled);
    let rows = records.query("INCIDENT#inc-test456", "", QueryOrder::Ascending, None).unwrap();
    assert!(rows.is_empty());
}

// ============================================================================
// SECTION: Dry-Run Sequence
// ============================================================================

/// Verifies the ticket and notify actions succeed with deterministic refs.
#[test]
fn dry_run_ticket_and_notify_succeed() {
    let records = InMemoryRecordStore::new();
    let bus = RecordingEventBus::new();

    let report = completed(run_actions(&packet(), &settings(), &dry_run_clients(), &records, Some(&bus)));

    let ticket = &report.results[0];
    assert_eq!(ticket.action_type, ActionType::Ticket);
    assert_eq!(ticket.status, ActionStatus::Success);
    assert_eq!(
        ticket.external_refs.get("ticket_key").and_then(serde_json::Value::as_str),
        Some("DRYRUN-1")
    );

    let notify = &report.results[1];
    assert_eq!(notify.status, ActionStatus::Success);
    assert_eq!(
        notify.external_refs.get("notify_message_id").and_then(serde_json::Value::as_str),
        Some("dryrun-notify-1")
    );

    assert_eq!(bus.captured_of("action.completed").len(), 3);
    let latest = records.get("INCIDENT#inc-test456", "ACTIONS#LATEST").unwrap().unwrap();
    assert_eq!(
        latest.field_str("latest_actionplan_sk"),
        Some(report.plan_sk.as_str())
    );
}

/// Verifies the confidence gate skips low-confidence PR actions.
#[test]
fn low_confidence_pr_is_skipped() {
    let records = InMemoryRecordStore::new();

    let report =
        completed(run_actions(&packet(), &settings(), &dry_run_clients(), &records, None));

    let pr = &report.results[2];
    assert_eq!(pr.action_type, ActionType::Pr);
    assert_eq!(pr.status, ActionStatus::Skipped);
    let reason = pr.error.clone().unwrap();
    assert!(reason.contains("repo_confidence=0.10"));
    assert!(reason.contains("threshold=0.70"));
    assert!(pr.external_refs.contains_key("repo_resolution"));
}

/// Verifies a mapping-rule hit drives the PR through the dry-run host.
#[test]
fn mapping_hit_creates_pr() {
    let records = InMemoryRecordStore::new();
    let mut with_rule = settings();
    with_rule.mapping_rules = vec![MappingRule {
        kind: MatchKind::Exact,
        signal: MappingSignal::ServiceName,
        pattern: "loggen".to_string(),
        repo: "org/loggen-repo".to_string(),
    }];
    let github = Arc::new(DryRunSourceControl::new("org"));
    let clients = ActionClients {
        ticket: Some(Arc::new(DryRunTicketClient::new())),
        notify: Some(Arc::new(DryRunNotifier::new())),
        github: Some(Arc::clone(&github) as Arc<dyn opsrunbook_actions::SourceControlClient>),
    };

    let report = completed(run_actions(&packet(), &with_rule, &clients, &records, None));

    let pr = &report.results[2];
    assert_eq!(pr.status, ActionStatus::Success);
    assert_eq!(
        pr.external_refs.get("branch").and_then(serde_json::Value::as_str),
        Some("opsrunbook/DRYRUN-1")
    );
    assert_eq!(
        pr.external_refs.get("pr_url").and_then(serde_json::Value::as_str),
        Some("https://github.com/org/loggen-repo/pull/1")
    );

    let recorded = github.recorded();
    assert_eq!(recorded.len(), 1);
    assert_eq!(recorded[0].repo, "loggen-repo");
    assert_eq!(recorded[0].branch_name, "opsrunbook/DRYRUN-1");
    assert_eq!(recorded[0].file_path, ".opsrunbook/pr-notes/DRYRUN-1.md");
    assert!(recorded[0].pr_body.starts_with("<!-- opsrunbook_copilot: true -->"));
    assert!(recorded[0].file_content.contains("inc-test456"));
}

/// Verifies a missing ticket key fails the PR action.
#[test]
fn missing_ticket_key_fails_pr() {
    let records = InMemoryRecordStore::new();
    let clients = ActionClients {
        ticket: None,
        notify: Some(Arc::new(DryRunNotifier::new())),
        github: Some(Arc::new(DryRunSourceControl::new("org"))),
    };

    let report = completed(run_actions(&packet(), &settings(), &clients, &records, None));

    assert_eq!(report.results[0].status, ActionStatus::Skipped);
    let pr = &report.results[2];
    assert_eq!(pr.status, ActionStatus::Failed);
    assert!(pr.error.clone().unwrap().contains("missing ticket key"));
}

// ============================================================================
// SECTION: Idempotency
// ============================================================================

/// Verifies a second run reuses successes without duplicate records.
#[test]
fn second_run_reuses_successes() {
    let records = InMemoryRecordStore::new();
    let bus = RecordingEventBus::new();
    let config = settings();

    let first = completed(run_actions(&packet(), &config, &dry_run_clients(), &records, Some(&bus)));
    let second =
        completed(run_actions(&packet(), &config, &dry_run_clients(), &records, Some(&bus)));

    // The reused ticket carries the original key even with a fresh counter.
    assert_eq!(
        second.results[0].external_refs.get("ticket_key"),
        first.results[0].external_refs.get("ticket_key")
    );

    let rows = records
        .query("INCIDENT#inc-test456", "ACTION#", QueryOrder::Ascending, None)
        .unwrap();
    let ticket_successes = rows
        .iter()
        .filter(|row| {
            row.field_str("action_type") == Some("ticket")
                && row.field_str("status") == Some("success")
        })
        .count();
    assert_eq!(ticket_successes, 1);

    // Only the skipped PR re-executes; no duplicate success events.
    assert_eq!(bus.captured_of("action.completed").len(), 4);
}
