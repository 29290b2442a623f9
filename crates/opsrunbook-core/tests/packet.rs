// crates/opsrunbook-core/tests/packet.rs
// ============================================================================
// Module: Incident Packet Tests
// Description: Packet invariants and hash determinism.
// Purpose: Ensure high-confidence findings cite evidence and hashes replay.
// Dependencies: opsrunbook-core
// ============================================================================
//! ## Overview
//! Validates the confidence/evidence invariant boundary (0.6 inclusive) and
//! the single-canonical-hash finalization.

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

use opsrunbook_core::CollectorRunId;
use opsrunbook_core::CollectorType;
use opsrunbook_core::EvidenceRef;
use opsrunbook_core::Finding;
use opsrunbook_core::IncidentId;
use opsrunbook_core::IncidentPacket;
use opsrunbook_core::ModelTrace;
use opsrunbook_core::PACKET_SCHEMA;
use opsrunbook_core::SnapshotRef;
use opsrunbook_core::TimeWindow;
use time::Duration;
use time::macros::datetime;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a minimal valid packet with no findings.
fn base_packet() -> IncidentPacket {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    IncidentPacket {
        schema_version: PACKET_SCHEMA.to_string(),
        incident_id: IncidentId::new("inc-test456"),
        collector_run_id: CollectorRunId::new("runabc"),
        service: "loggen".to_string(),
        environment: "dev".to_string(),
        time_window: TimeWindow::new(end - Duration::minutes(10), end)
            .unwrap_or_else(|_| unreachable!()),
        snapshot_ref: SnapshotRef {
            bucket: "evidence".to_string(),
            key: "evidence/inc-test456/runabc.json".to_string(),
            sha256: "deadbeef".to_string(),
        },
        findings: Vec::new(),
        hypotheses: Vec::new(),
        next_actions: Vec::new(),
        suspected_owners: Vec::new(),
        limits: Vec::new(),
        model_trace: ModelTrace {
            provider: "stub".to_string(),
            model: None,
            prompt_version: "v1".to_string(),
            created_at: "2026-02-15T12:00:05Z".to_string(),
        },
        packet_hashes: None,
        all_evidence_refs: Vec::new(),
    }
}

/// Builds a logs evidence reference.
fn logs_ref() -> EvidenceRef {
    EvidenceRef {
        collector_type: CollectorType::Logs,
        bucket: "evidence".to_string(),
        key: "evidence/inc-test456/runabc/logs.json".to_string(),
        sha256: "cafebabe".to_string(),
        byte_size: 1234,
        truncated: false,
    }
}

/// Builds a finding at the given confidence.
fn finding(confidence: f64, refs: Vec<EvidenceRef>) -> Finding {
    Finding {
        id: "logs-errors-found".to_string(),
        summary: "Found recent error(s) in logs".to_string(),
        confidence,
        evidence_refs: refs,
        notes: None,
    }
}

// ============================================================================
// SECTION: Evidence Invariant
// ============================================================================

/// Verifies confidence exactly 0.6 without evidence is valid.
#[test]
fn confidence_at_boundary_is_valid() {
    let mut packet = base_packet();
    packet.findings.push(finding(0.6, Vec::new()));
    assert!(packet.validate().is_ok());
}

/// Verifies confidence 0.61 without evidence is rejected.
#[test]
fn confidence_above_boundary_requires_evidence() {
    let mut packet = base_packet();
    packet.findings.push(finding(0.61, Vec::new()));
    assert!(packet.validate().is_err());
}

/// Verifies high confidence with evidence is valid.
#[test]
fn high_confidence_with_evidence_is_valid() {
    let mut packet = base_packet();
    packet.findings.push(finding(0.9, vec![logs_ref()]));
    assert!(packet.validate().is_ok());
}

/// Verifies out-of-range confidences are rejected.
#[test]
fn confidence_out_of_range_is_rejected() {
    let mut packet = base_packet();
    packet.findings.push(finding(1.2, vec![logs_ref()]));
    assert!(packet.validate().is_err());
}

// ============================================================================
// SECTION: Hash Determinism
// ============================================================================

/// Verifies finalize stores a hash that recomputes to itself.
#[test]
fn finalized_hash_is_stable_against_itself() {
    let mut packet = base_packet();
    packet.findings.push(finding(0.8, vec![logs_ref()]));
    packet.finalize().unwrap();

    let stored = packet.packet_hashes.clone().unwrap().sha256;
    let recomputed = packet.compute_hash().unwrap();
    assert_eq!(stored, recomputed);
}

/// Verifies two identical packets finalize to the same hash.
#[test]
fn identical_packets_hash_identically() {
    let mut first = base_packet();
    first.findings.push(finding(0.8, vec![logs_ref()]));
    let mut second = first.clone();

    first.finalize().unwrap();
    second.finalize().unwrap();

    assert_eq!(first.packet_hashes, second.packet_hashes);
}

/// Verifies differing packets hash differently.
#[test]
fn different_packets_hash_differently() {
    let mut first = base_packet();
    first.findings.push(finding(0.8, vec![logs_ref()]));
    let mut second = first.clone();
    second.limits.push("Metrics collector evidence not available or skipped.".to_string());

    first.finalize().unwrap();
    second.finalize().unwrap();

    assert_ne!(first.packet_hashes, second.packet_hashes);
}
