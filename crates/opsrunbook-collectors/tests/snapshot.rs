// crates/opsrunbook-collectors/tests/snapshot.rs
// ============================================================================
// Module: Snapshot Persister Tests
// Description: Aggregation, truncation OR, record layout, and events.
// Purpose: Ensure the snapshot step always runs and flags faithfully.
// Dependencies: opsrunbook-collectors, opsrunbook-core
// ============================================================================
//! ## Overview
//! Drives the snapshot persister over mixed collector results and checks the
//! manifest, the `SNAPSHOT#` record, and the emitted event.

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
use opsrunbook_collectors::persist_snapshot;
use opsrunbook_core::CollectorResult;
use opsrunbook_core::CollectorRunId;
use opsrunbook_core::CollectorType;
use opsrunbook_core::EvidenceRef;
use opsrunbook_core::InMemoryObjectStore;
use opsrunbook_core::InMemoryRecordStore;
use opsrunbook_core::IncidentId;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::QueryOrder;
use opsrunbook_core::RecordStore;
use opsrunbook_core::RecordingEventBus;
use opsrunbook_core::TimeWindow;
use opsrunbook_core::sha256_hex;
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

/// Builds a successful collector result.
fn ok_result(collector_type: CollectorType, truncated: bool) -> CollectorResult {
    CollectorResult {
        collector_type,
        skipped: false,
        evidence_ref: Some(EvidenceRef {
            collector_type,
            bucket: "evidence".to_string(),
            key: format!("evidence/inc-test456/run-1/{}.json", collector_type.as_str()),
            sha256: "cafebabe".to_string(),
            byte_size: 512,
            truncated,
        }),
        error: None,
        cause: None,
    }
}

// ============================================================================
// SECTION: Persistence
// ============================================================================

/// Verifies manifest, record, and event for a clean run.
#[test]
fn persists_manifest_record_and_event() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();
    let bus = RecordingEventBus::new();

    let results = vec![
        ok_result(CollectorType::Logs, false),
        CollectorResult::skipped(CollectorType::Metrics),
        CollectorResult::skipped(CollectorType::Workflow),
    ];
    let outcome = persist_snapshot(&ctx(), &results, &store, &records, Some(&bus)).unwrap();

    assert!(!outcome.manifest.truncated);
    assert_eq!(outcome.snapshot_ref.key, "evidence/inc-test456/run-1.json");
    let bytes = store.get("evidence", &outcome.snapshot_ref.key, 1_000_000).unwrap();
    assert_eq!(sha256_hex(&bytes), outcome.snapshot_ref.sha256);

    let rows = records
        .query("INCIDENT#inc-test456", "SNAPSHOT#", QueryOrder::Descending, None)
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].field_str("evidence_sha256"), Some(outcome.snapshot_ref.sha256.as_str()));
    assert!(!rows[0].field_bool("truncated"));

    let events = bus.captured_of("evidence.snapshot.persisted");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].detail["incident_id"], "inc-test456");
}

// ============================================================================
// SECTION: Truncation OR
// ============================================================================

/// Verifies a truncated collector flips the snapshot bit.
#[test]
fn truncated_collector_flips_snapshot() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();

    let results = vec![
        ok_result(CollectorType::Logs, true),
        CollectorResult::skipped(CollectorType::Metrics),
    ];
    let outcome = persist_snapshot(&ctx(), &results, &store, &records, None).unwrap();

    assert!(outcome.manifest.truncated);
}

/// Verifies a collector error flips the snapshot bit too.
#[test]
fn collector_error_flips_snapshot() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();

    let results = vec![CollectorResult {
        collector_type: CollectorType::Logs,
        skipped: false,
        evidence_ref: None,
        error: Some("logs collection failed".to_string()),
        cause: Some("backend call failed: boom".to_string()),
    }];
    let outcome = persist_snapshot(&ctx(), &results, &store, &records, None).unwrap();

    assert!(outcome.manifest.truncated);
}

/// Verifies skipped-only runs stay untruncated.
#[test]
fn skipped_only_run_is_clean() {
    let store = InMemoryObjectStore::new();
    let records = InMemoryRecordStore::new();

    let results = vec![
        CollectorResult::skipped(CollectorType::Logs),
        CollectorResult::skipped(CollectorType::Metrics),
        CollectorResult::skipped(CollectorType::Workflow),
    ];
    let outcome = persist_snapshot(&ctx(), &results, &store, &records, None).unwrap();

    assert!(!outcome.manifest.truncated);
}
