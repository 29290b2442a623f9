// crates/opsrunbook-collectors/src/logs.rs
// ============================================================================
// Module: Logs Collector
// Description: Two bounded analytic queries over the incident window.
// Purpose: Produce redacted, budgeted log evidence with a content-addressed ref.
// Dependencies: opsrunbook-core, crate::{backend, context}
// ============================================================================

//! ## Overview
//! Runs two fixed analytic queries: recent error-shaped rows (newest-first,
//! capped at 50) and top error signatures by count (capped at 20). Each query
//! is polled at one-second intervals until the backend reports a terminal
//! status or the client deadline lapses, in which case the section status is
//! `ClientTimeout`. Redaction runs over every string field before sizing; an
//! oversize payload drops section rows and keeps a note.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::time::Duration;
use std::time::Instant;

use opsrunbook_core::CollectorResult;
use opsrunbook_core::CollectorType;
use opsrunbook_core::EVIDENCE_SCHEMA;
use opsrunbook_core::EventBus;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::Redactor;
use opsrunbook_core::json_size_bytes;
use opsrunbook_core::now_rfc3339;
use serde_json::Value;
use serde_json::json;

use crate::backend::BackendError;
use crate::backend::LogQueryRequest;
use crate::backend::LogQueryState;
use crate::backend::LogsBackend;
use crate::context::CollectorContext;
use crate::context::emit_collected;
use crate::context::persist_evidence;

// ============================================================================
// SECTION: Queries
// ============================================================================

/// Recent error-shaped rows, newest-first.
pub const RECENT_ERRORS_QUERY: &str = "fields @timestamp, @message, @logStream\n\
     | filter @message like /ERROR|Error|Exception|Traceback/\n\
     | sort @timestamp desc\n\
     | limit 50";

/// Top error signatures by count.
pub const TOP_ERRORS_QUERY: &str = "fields @timestamp, @message\n\
     | filter @message like /ERROR|Error|Exception|Traceback/\n\
     | stats count() as cnt by @message\n\
     | sort cnt desc\n\
     | limit 20";

/// Row cap for the recent-errors section.
pub const RECENT_ERRORS_LIMIT: usize = 50;
/// Row cap for the top-errors section.
pub const TOP_ERRORS_LIMIT: usize = 20;
/// Client-side polling deadline.
pub const POLL_DEADLINE: Duration = Duration::from_secs(30);
/// Interval between polling probes.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

// ============================================================================
// SECTION: Polling
// ============================================================================

/// Starts a query and polls it to a terminal state under a deadline.
///
/// A deadline lapse yields status `ClientTimeout` with whatever rows the
/// last probe returned.
fn run_query(
    backend: &dyn LogsBackend,
    request: &LogQueryRequest,
    deadline: Duration,
) -> Result<LogQueryState, BackendError> {
    let query_id = backend.start_query(request)?;
    let give_up_at = Instant::now() + deadline;
    let mut last = LogQueryState {
        status: "ClientTimeout".to_string(),
        rows: Vec::new(),
        stats: Value::Object(serde_json::Map::new()),
    };
    loop {
        let state = backend.get_query_results(&query_id)?;
        if state.is_terminal() {
            return Ok(state);
        }
        last.rows = state.rows;
        last.stats = state.stats;
        if Instant::now() >= give_up_at {
            return Ok(last);
        }
        std::thread::sleep(POLL_INTERVAL);
    }
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Collects log evidence for one incident window.
///
/// Skips when no log groups are hinted. Backend failures are captured into
/// the result and never propagate.
#[must_use]
pub fn collect_logs(
    ctx: &CollectorContext,
    log_groups: &[String],
    backend: &dyn LogsBackend,
    store: &dyn ObjectStore,
    bus: Option<&dyn EventBus>,
) -> CollectorResult {
    if log_groups.is_empty() {
        return CollectorResult::skipped(CollectorType::Logs);
    }
    match try_collect(ctx, log_groups, backend, store) {
        Ok(evidence_ref) => {
            emit_collected(ctx, &evidence_ref, bus);
            CollectorResult {
                collector_type: CollectorType::Logs,
                skipped: false,
                evidence_ref: Some(evidence_ref),
                error: None,
                cause: None,
            }
        }
        Err(err) => CollectorResult {
            collector_type: CollectorType::Logs,
            skipped: false,
            evidence_ref: None,
            error: Some("logs collection failed".to_string()),
            cause: Some(err),
        },
    }
}

/// Runs both queries, builds the payload, and persists the blob.
fn try_collect(
    ctx: &CollectorContext,
    log_groups: &[String],
    backend: &dyn LogsBackend,
    store: &dyn ObjectStore,
) -> Result<opsrunbook_core::EvidenceRef, String> {
    let start_epoch = ctx.time_window.start.unix_timestamp();
    let end_epoch = ctx.time_window.end.unix_timestamp();

    let recent = run_query(
        backend,
        &LogQueryRequest {
            log_groups: log_groups.to_vec(),
            query: RECENT_ERRORS_QUERY.to_string(),
            start_epoch,
            end_epoch,
            limit: RECENT_ERRORS_LIMIT,
        },
        POLL_DEADLINE,
    )
    .map_err(|err| err.to_string())?;
    let top = run_query(
        backend,
        &LogQueryRequest {
            log_groups: log_groups.to_vec(),
            query: TOP_ERRORS_QUERY.to_string(),
            start_epoch,
            end_epoch,
            limit: TOP_ERRORS_LIMIT,
        },
        POLL_DEADLINE,
    )
    .map_err(|err| err.to_string())?;

    let payload = json!({
        "schema_version": EVIDENCE_SCHEMA,
        "collector_type": CollectorType::Logs,
        "incident_id": ctx.incident_id,
        "collector_run_id": ctx.collector_run_id,
        "created_at": now_rfc3339(),
        "time_window": ctx.time_window,
        "log_groups": log_groups,
        "sections": [
            section("recent_errors", recent),
            section("top_errors", top),
        ],
    });

    let redacted = Redactor::new().redact_value(payload);
    let (bounded, truncated) =
        enforce_budget(redacted, ctx.max_rows_per_section, ctx.max_total_bytes);

    persist_evidence(ctx, CollectorType::Logs, &bounded, truncated, store)
        .map_err(|err| err.to_string())
}

/// Builds one section value from a terminal query state.
fn section(name: &str, state: LogQueryState) -> Value {
    json!({
        "name": name,
        "status": state.status,
        "rows": state.rows,
        "stats": state.stats,
    })
}

/// Applies the row cap, then drops section rows if still oversize.
fn enforce_budget(mut payload: Value, max_rows: usize, max_bytes: usize) -> (Value, bool) {
    let mut truncated = false;
    if let Some(sections) = payload.get_mut("sections").and_then(Value::as_array_mut) {
        for sec in sections.iter_mut() {
            if let Some(rows) = sec.get_mut("rows").and_then(Value::as_array_mut)
                && rows.len() > max_rows
            {
                rows.truncate(max_rows);
                truncated = true;
            }
        }
    }
    if json_size_bytes(&payload) > max_bytes {
        if let Some(sections) = payload.get_mut("sections").and_then(Value::as_array_mut) {
            let minimized: Vec<Value> = sections
                .iter()
                .map(|sec| {
                    let name = sec.get("name").and_then(Value::as_str).unwrap_or("?");
                    json!({"name": name, "note": "Dropped due to size budget"})
                })
                .collect();
            *sections = minimized;
        }
        truncated = true;
    }
    (payload, truncated)
}
