// crates/opsrunbook-collectors/tests/metrics.rs
// ============================================================================
// Module: Metrics Collector Tests
// Description: Period selection, caps, pagination, and summary behavior.
// Purpose: Ensure metric evidence stays bounded and summarized.
// Dependencies: opsrunbook-collectors, opsrunbook-core
// ============================================================================
//! ## Overview
//! Drives the metrics collector against the stub backend, covering the
//! period ladder boundaries, the query cap, point truncation, and the
//! halving loop.

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
use opsrunbook_collectors::MetricDataResult;
use opsrunbook_collectors::StubMetricsBackend;
use opsrunbook_collectors::auto_period;
use opsrunbook_collectors::collect_metrics;
use opsrunbook_core::CollectorRunId;
use opsrunbook_core::IncidentId;
use opsrunbook_core::MetricQueryHint;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::InMemoryObjectStore;
use opsrunbook_core::TimeWindow;
use serde_json::Value;
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

/// Builds one metric query hint with an auto-select period.
fn hint(name: &str) -> MetricQueryHint {
    MetricQueryHint {
        namespace: "AWS/Lambda".to_string(),
        metric_name: name.to_string(),
        dimensions: std::collections::BTreeMap::new(),
        period: 0,
        stat: "Sum".to_string(),
    }
}

/// Builds one backend series with evenly spaced points.
fn series(id: &str, points: usize) -> MetricDataResult {
    let start = datetime!(2026-02-15 11:50:00 UTC);
    MetricDataResult {
        id: id.to_string(),
        label: format!("series-{id}"),
        timestamps: (0..points)
            .map(|idx| start + Duration::seconds(i64::try_from(idx).unwrap() * 60))
            .collect(),
        values: (0..points).map(|idx| idx as f64).collect(),
    }
}

// ============================================================================
// SECTION: Period Selection
// ============================================================================

/// Verifies a five-minute window selects the 60-second period.
#[test]
fn five_minute_window_selects_minimum_period() {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    assert_eq!(auto_period(end - Duration::minutes(5), end), 60);
}

/// Verifies a 24-hour window selects at least the 300-second period.
#[test]
fn day_window_selects_larger_period() {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    let period = auto_period(end - Duration::hours(24), end);
    assert!(period >= 300);
}

/// Verifies a degenerate window falls back to the minimum.
#[test]
fn degenerate_window_selects_minimum() {
    let at = datetime!(2026-02-15 12:00:00 UTC);
    assert_eq!(auto_period(at, at), 60);
}

// ============================================================================
// SECTION: Collection
// ============================================================================

/// Verifies skip when no metric hints are supplied.
#[test]
fn no_queries_skips() {
    let store = InMemoryObjectStore::new();
    let backend = StubMetricsBackend::new();

    let result = collect_metrics(&ctx(), &[], &backend, &store, None);

    assert!(result.skipped);
    assert!(store.is_empty());
}

/// Verifies series land in the blob with computed summaries.
#[test]
fn collects_series_with_summaries() {
    let store = InMemoryObjectStore::new();
    let backend = StubMetricsBackend::with_series(vec![series("m0", 5)]);

    let result = collect_metrics(&ctx(), &[hint("Errors")], &backend, &store, None);

    let evidence_ref = result.evidence_ref.unwrap();
    assert!(!evidence_ref.truncated);
    let bytes = store.get("evidence", &evidence_ref.key, 1_000_000).unwrap();
    let blob: Value = serde_json::from_slice(&bytes).unwrap();
    let first = &blob["series"][0];
    assert_eq!(first["point_count"], 5);
    assert_eq!(first["summary"]["min"], 0.0);
    assert_eq!(first["summary"]["max"], 4.0);
    assert_eq!(first["summary"]["avg"], 2.0);
    assert_eq!(first["summary"]["count"], 5);
    assert_eq!(blob["sections"][0]["name"], "metrics");
}

/// Verifies the query cap marks the blob truncated.
#[test]
fn query_cap_marks_truncated() {
    let store = InMemoryObjectStore::new();
    let backend = StubMetricsBackend::with_series(vec![series("m0", 2)]);
    let hints: Vec<MetricQueryHint> = (0..25).map(|idx| hint(&format!("metric{idx}"))).collect();

    let result = collect_metrics(&ctx(), &hints, &backend, &store, None);

    assert!(result.evidence_ref.unwrap().truncated);
}

/// Verifies oversize payloads are halved until they fit.
#[test]
fn oversize_series_is_halved() {
    let store = InMemoryObjectStore::new();
    let backend = StubMetricsBackend::with_series(vec![series("m0", 400)]);

    let mut context = ctx();
    context.max_total_bytes = 6_000;
    let result = collect_metrics(&context, &[hint("Errors")], &backend, &store, None);

    let evidence_ref = result.evidence_ref.unwrap();
    assert!(evidence_ref.truncated);
    assert!(evidence_ref.byte_size <= 6_000);
    let bytes = store.get("evidence", &evidence_ref.key, 1_000_000).unwrap();
    let blob: Value = serde_json::from_slice(&bytes).unwrap();
    let kept = blob["series"][0]["point_count"].as_u64().unwrap();
    assert!(kept < 400);
    assert_eq!(blob["series"][0]["truncated"], true);
}
