// crates/opsrunbook-collectors/src/metrics.rs
// ============================================================================
// Module: Metrics Collector
// Description: Bounded metric time-series collection with period selection.
// Purpose: Produce summarized, budgeted series evidence for one window.
// Dependencies: opsrunbook-core, time, crate::{backend, context}
// ============================================================================

//! ## Overview
//! Converts hint queries to backend form. Periods below the backend minimum
//! are auto-selected so one series targets roughly 300 points, rounded up to
//! the standard period ladder. Caps: at most 20 queries, at most 500 points
//! per series. Pagination continues until the backend stops returning a
//! token. If the assembled payload is oversize, every series is halved and
//! the check repeats until the payload fits or no points remain.

// ============================================================================
// SECTION: Imports
// ============================================================================

use opsrunbook_core::CollectorResult;
use opsrunbook_core::CollectorType;
use opsrunbook_core::EVIDENCE_SCHEMA;
use opsrunbook_core::EventBus;
use opsrunbook_core::MetricQueryHint;
use opsrunbook_core::MetricSeries;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::Redactor;
use opsrunbook_core::SeriesSummary;
use opsrunbook_core::format_rfc3339;
use opsrunbook_core::json_size_bytes;
use opsrunbook_core::now_rfc3339;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;

use crate::backend::MetricDataQuery;
use crate::backend::MetricDataResult;
use crate::backend::MetricsBackend;
use crate::context::CollectorContext;
use crate::context::emit_collected;
use crate::context::persist_evidence;

// ============================================================================
// SECTION: Caps
// ============================================================================

/// Maximum queries per collection.
pub const MAX_METRIC_QUERIES: usize = 20;
/// Maximum points kept per series.
pub const MAX_DATA_POINTS: usize = 500;
/// Target point count for period auto-selection.
pub const DESIRED_POINTS: i64 = 300;
/// Minimum backend aggregation period in seconds.
pub const MIN_PERIOD: u32 = 60;

/// Standard period ladder, seconds.
const PERIOD_LADDER: [u32; 6] = [60, 300, 900, 3600, 21_600, 86_400];

// ============================================================================
// SECTION: Period Selection
// ============================================================================

/// Picks the smallest ladder period keeping points near the target.
///
/// A five-minute window yields 60; a day-long window yields at least 300.
#[must_use]
pub fn auto_period(start: OffsetDateTime, end: OffsetDateTime) -> u32 {
    let span_seconds = (end - start).whole_seconds();
    if span_seconds <= 0 {
        return MIN_PERIOD;
    }
    let raw = span_seconds / DESIRED_POINTS;
    let raw = u32::try_from(raw).unwrap_or(u32::MAX);
    for period in PERIOD_LADDER {
        if period >= raw {
            return period;
        }
    }
    86_400
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Collects metric evidence for one incident window.
///
/// Skips when no metric queries are hinted. Backend failures are captured
/// into the result and never propagate.
#[must_use]
pub fn collect_metrics(
    ctx: &CollectorContext,
    metric_queries: &[MetricQueryHint],
    backend: &dyn MetricsBackend,
    store: &dyn ObjectStore,
    bus: Option<&dyn EventBus>,
) -> CollectorResult {
    if metric_queries.is_empty() {
        return CollectorResult::skipped(CollectorType::Metrics);
    }
    match try_collect(ctx, metric_queries, backend, store) {
        Ok(evidence_ref) => {
            emit_collected(ctx, &evidence_ref, bus);
            CollectorResult {
                collector_type: CollectorType::Metrics,
                skipped: false,
                evidence_ref: Some(evidence_ref),
                error: None,
                cause: None,
            }
        }
        Err(err) => CollectorResult {
            collector_type: CollectorType::Metrics,
            skipped: false,
            evidence_ref: None,
            error: Some("metrics collection failed".to_string()),
            cause: Some(err),
        },
    }
}

/// Fetches, bounds, and persists the metric series.
fn try_collect(
    ctx: &CollectorContext,
    metric_queries: &[MetricQueryHint],
    backend: &dyn MetricsBackend,
    store: &dyn ObjectStore,
) -> Result<opsrunbook_core::EvidenceRef, String> {
    let bounded: Vec<&MetricQueryHint> = metric_queries.iter().take(MAX_METRIC_QUERIES).collect();
    let mut truncated = metric_queries.len() > MAX_METRIC_QUERIES;

    let queries: Vec<MetricDataQuery> = bounded
        .iter()
        .enumerate()
        .map(|(idx, hint)| MetricDataQuery {
            id: format!("m{idx}"),
            namespace: hint.namespace.clone(),
            metric_name: hint.metric_name.clone(),
            dimensions: hint.dimensions.clone(),
            period: if hint.period < MIN_PERIOD {
                auto_period(ctx.time_window.start, ctx.time_window.end)
            } else {
                hint.period
            },
            stat: hint.stat.clone(),
        })
        .collect();

    let mut results: Vec<MetricDataResult> = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let page = backend
            .get_metric_data(
                &queries,
                ctx.time_window.start,
                ctx.time_window.end,
                next_token.as_deref(),
            )
            .map_err(|err| err.to_string())?;
        results.extend(page.results);
        next_token = page.next_token;
        if next_token.is_none() {
            break;
        }
    }

    let mut series_list: Vec<MetricSeries> = Vec::new();
    for result in results {
        let mut timestamps: Vec<String> =
            result.timestamps.into_iter().map(format_rfc3339).collect();
        let mut values = result.values;
        let series_truncated = values.len() > MAX_DATA_POINTS;
        if series_truncated {
            timestamps.truncate(MAX_DATA_POINTS);
            values.truncate(MAX_DATA_POINTS);
            truncated = true;
        }
        let origin = lookup_query(&queries, &result.id);
        series_list.push(MetricSeries {
            query_id: result.id,
            label: if result.label.is_empty() {
                origin.map_or_else(String::new, |query| query.metric_name.clone())
            } else {
                result.label
            },
            summary: compute_summary(&values),
            point_count: values.len(),
            truncated: series_truncated,
            stat: origin.map_or_else(|| "Average".to_string(), |query| query.stat.clone()),
            period: origin.map_or(MIN_PERIOD, |query| query.period),
            timestamps,
            values,
        });
    }

    let created_at = now_rfc3339();
    let mut payload = build_payload(ctx, &created_at, &series_list);
    while json_size_bytes(&payload) > ctx.max_total_bytes
        && series_list.iter().any(|series| !series.values.is_empty())
    {
        for series in &mut series_list {
            let half = series.values.len() / 2;
            series.values.truncate(half);
            series.timestamps.truncate(half);
            series.point_count = half;
            series.truncated = true;
        }
        truncated = true;
        payload = build_payload(ctx, &created_at, &series_list);
    }

    let redacted = Redactor::new().redact_value(payload);
    persist_evidence(ctx, CollectorType::Metrics, &redacted, truncated, store)
        .map_err(|err| err.to_string())
}

/// Finds the originating query for a result id.
fn lookup_query<'a>(queries: &'a [MetricDataQuery], id: &str) -> Option<&'a MetricDataQuery> {
    queries.iter().find(|query| query.id == id)
}

/// Builds the blob payload from the current series list.
fn build_payload(ctx: &CollectorContext, created_at: &str, series_list: &[MetricSeries]) -> Value {
    json!({
        "schema_version": EVIDENCE_SCHEMA,
        "collector_type": CollectorType::Metrics,
        "incident_id": ctx.incident_id,
        "collector_run_id": ctx.collector_run_id,
        "created_at": created_at,
        "time_window": ctx.time_window,
        "sections": [{"name": "metrics", "series": series_list}],
        "series": series_list,
    })
}

/// Computes min/max/avg/count over kept values, rounded to six places.
#[must_use]
pub fn compute_summary(values: &[f64]) -> SeriesSummary {
    if values.is_empty() {
        return SeriesSummary {
            min: None,
            max: None,
            avg: None,
            count: 0,
        };
    }
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    let mut sum = 0.0;
    for value in values {
        min = min.min(*value);
        max = max.max(*value);
        sum += value;
    }
    #[allow(
        clippy::cast_precision_loss,
        reason = "Point counts are far below the f64 mantissa limit."
    )]
    let avg = sum / values.len() as f64;
    SeriesSummary {
        min: Some(round6(min)),
        max: Some(round6(max)),
        avg: Some(round6(avg)),
        count: values.len(),
    }
}

/// Rounds to six decimal places.
fn round6(value: f64) -> f64 {
    (value * 1_000_000.0).round() / 1_000_000.0
}
