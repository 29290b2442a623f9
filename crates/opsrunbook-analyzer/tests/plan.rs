// crates/opsrunbook-analyzer/tests/plan.rs
// ============================================================================
// Module: Plan Generator Tests
// Description: Fixed action order, priority derivation, and templates.
// Purpose: Ensure plans are pure functions of their packet.
// Dependencies: opsrunbook-analyzer, opsrunbook-core
// ============================================================================
//! ## Overview
//! Validates the three-action plan shape, priority boundaries, markdown
//! template contents, and plan-hash stability.

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

use opsrunbook_analyzer::build_notify_body;
use opsrunbook_analyzer::build_pr_body;
use opsrunbook_analyzer::build_pr_notes;
use opsrunbook_analyzer::generate_plan;
use opsrunbook_analyzer::plan_hash;
use opsrunbook_core::ActionType;
use opsrunbook_core::CollectorRunId;
use opsrunbook_core::CollectorType;
use opsrunbook_core::EvidenceRef;
use opsrunbook_core::Finding;
use opsrunbook_core::IncidentId;
use opsrunbook_core::IncidentPacket;
use opsrunbook_core::ModelTrace;
use opsrunbook_core::PACKET_SCHEMA;
use opsrunbook_core::Priority;
use opsrunbook_core::RepoResolution;
use opsrunbook_core::SnapshotRef;
use opsrunbook_core::SuspectedOwner;
use opsrunbook_core::TimeWindow;
use opsrunbook_core::Verification;
use time::Duration;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a packet with one high-signal finding.
fn sample_packet() -> IncidentPacket {
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
            summary: "Found 3 recent error(s) in logs. Top: RuntimeError: simulated".to_string(),
            confidence: 0.8,
            evidence_refs: vec![EvidenceRef {
                collector_type: CollectorType::Logs,
                bucket: "evidence".to_string(),
                key: "evidence/inc-test456/run-1/logs.json".to_string(),
                sha256: "cafebabe".to_string(),
                byte_size: 2048,
                truncated: false,
            }],
            notes: None,
        }],
        hypotheses: Vec::new(),
        next_actions: Vec::new(),
        suspected_owners: vec![SuspectedOwner {
            repo: "loggen-repo".to_string(),
            confidence: 0.4,
            reasons: vec!["resource 'loggen' matches prefix 'loggen'".to_string()],
        }],
        limits: vec!["Metrics collector evidence not available or skipped.".to_string()],
        model_trace: ModelTrace {
            provider: "stub".to_string(),
            model: None,
            prompt_version: "v1".to_string(),
            created_at: "2026-02-15T12:00:05Z".to_string(),
        },
        packet_hashes: None,
        all_evidence_refs: vec![EvidenceRef {
            collector_type: CollectorType::Logs,
            bucket: "evidence".to_string(),
            key: "evidence/inc-test456/run-1/logs.json".to_string(),
            sha256: "cafebabe".to_string(),
            byte_size: 2048,
            truncated: false,
        }],
    }
}

// ============================================================================
// SECTION: Plan Shape
// ============================================================================

/// Verifies three actions in ticket, notify, pr order.
#[test]
fn plan_has_three_actions_in_fixed_order() {
    let plan = generate_plan(&sample_packet(), true);

    assert_eq!(plan.schema_version, "incident_action_plan.v1");
    assert_eq!(plan.incident_id.as_str(), "inc-test456");
    let types: Vec<ActionType> = plan.actions.iter().map(|action| action.action_type).collect();
    assert_eq!(types, vec![ActionType::Ticket, ActionType::Notify, ActionType::Pr]);
    assert!(plan.actions.iter().all(|action| action.dry_run));
}

/// Verifies the PR action carries its context block.
#[test]
fn pr_action_carries_context() {
    let plan = generate_plan(&sample_packet(), true);
    let pr = plan.action(ActionType::Pr).unwrap();
    let context = pr.context.as_ref().unwrap();
    assert_eq!(context["incident_id"], "inc-test456");
    assert_eq!(context["service"], "loggen");
}

// ============================================================================
// SECTION: Priority
// ============================================================================

/// Verifies confidence at or above 0.9 escalates to P1.
#[test]
fn high_confidence_is_p1() {
    let mut packet = sample_packet();
    packet.findings[0].confidence = 0.95;
    let plan = generate_plan(&packet, true);
    assert_eq!(plan.actions[0].priority, Priority::P1);
}

/// Verifies lower confidences remain P2.
#[test]
fn low_confidence_is_p2() {
    let mut packet = sample_packet();
    packet.findings[0].confidence = 0.3;
    let plan = generate_plan(&packet, true);
    assert_eq!(plan.actions[0].priority, Priority::P2);

    packet.findings.clear();
    let empty_plan = generate_plan(&packet, true);
    assert_eq!(empty_plan.actions[0].priority, Priority::P2);
}

// ============================================================================
// SECTION: Templates
// ============================================================================

/// Verifies the ticket description assembles findings and limits.
#[test]
fn ticket_description_contains_findings() {
    let plan = generate_plan(&sample_packet(), true);
    let ticket = plan.action(ActionType::Ticket).unwrap();
    assert!(ticket.description_md.contains("## Findings"));
    assert!(ticket.description_md.contains("RuntimeError"));
    assert!(ticket.description_md.contains("## Limits"));
    assert!(ticket.title.contains("incident inc-test456"));
    assert!(ticket.title.contains("1 finding(s)"));
}

/// Verifies the notify body carries id, window, finding, and ticket link.
#[test]
fn notify_body_contents() {
    let packet = sample_packet();
    let body = build_notify_body(&packet, Some(("OPS-1", "https://tracker/browse/OPS-1")));
    assert!(body.contains("inc-test456"));
    assert!(body.contains("dev"));
    assert!(body.contains("Top finding"));
    assert!(body.contains("[OPS-1](https://tracker/browse/OPS-1)"));
}

/// Verifies the notes file carries ticket, findings, and evidence.
#[test]
fn pr_notes_contents() {
    let packet = sample_packet();
    let notes = build_pr_notes(&packet, "KAN-5", "https://tracker/browse/KAN-5");
    assert!(notes.contains("inc-test456"));
    assert!(notes.contains("KAN-5"));
    assert!(notes.contains("## Findings"));
    assert!(notes.contains("## Evidence"));
}

/// Verifies the PR body opens with the marker and embeds the resolution.
#[test]
fn pr_body_contents() {
    let packet = sample_packet();
    let resolution = RepoResolution {
        repo_full_name: "org/loggen-repo".to_string(),
        confidence: 0.95,
        reasons: vec!["mapping rule: exact service_name='loggen'".to_string()],
        verification: Verification::Mapping,
        trace_frames: Vec::new(),
    };
    let body = build_pr_body(&packet, "KAN-5", "https://tracker/browse/KAN-5", &resolution);
    assert!(body.starts_with("<!-- opsrunbook_copilot: true -->"));
    assert!(body.contains("inc-test456"));
    assert!(body.contains("org/loggen-repo"));
    assert!(body.contains("mapping"));
    assert!(body.contains("1 Finding(s)"));
}

// ============================================================================
// SECTION: Purity
// ============================================================================

/// Verifies two plans over one packet hash identically.
#[test]
fn plan_generation_is_pure() {
    let packet = sample_packet();
    let first = generate_plan(&packet, true);
    let second = generate_plan(&packet, true);
    assert_eq!(plan_hash(&first), plan_hash(&second));

    let mut other_packet = sample_packet();
    other_packet.suspected_owners.clear();
    let third = generate_plan(&other_packet, true);
    assert_ne!(plan_hash(&first), plan_hash(&third));
}
