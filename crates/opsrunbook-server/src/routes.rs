// crates/opsrunbook-server/src/routes.rs
// ============================================================================
// Module: HTTP Ingress Routes
// Description: Incident endpoints, replay harness, and the webhook endpoint.
// Purpose: Expose the pipeline over the /v1 HTTP surface.
// Dependencies: axum, opsrunbook-analyzer, opsrunbook-core, opsrunbook-review
// ============================================================================

//! ## Overview
//! `POST /v1/incidents` validates, clamps the window, writes the `META` and
//! `RUN#` records, and starts a pipeline instance (503 when no runtime is
//! configured). The read endpoints serve records and packet blobs; the
//! replay endpoint re-runs the plan generator without executing actions; the
//! webhook endpoint drives the review ingress. Client errors are 4xx,
//! missing rows are 404, upstream failures are 502, unconfigured downstreams
//! are 503. Internal errors carry a short message and never an upstream
//! payload.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::Json;
use axum::Router;
use axum::body::Bytes;
use axum::extract::Path;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::routing::get;
use axum::routing::post;
use opsrunbook_analyzer::generate_plan;
use opsrunbook_analyzer::plan_hash;
use opsrunbook_collectors::CollectorContext;
use opsrunbook_config::OpsRunbookConfig;
use opsrunbook_core::ActionPlan;
use opsrunbook_core::CollectorRunId;
use opsrunbook_core::IncidentEvent;
use opsrunbook_core::IncidentId;
use opsrunbook_core::IncidentPacket;
use opsrunbook_core::MetricQueryHint;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::QueryOrder;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use opsrunbook_core::now_rfc3339;
use opsrunbook_core::records::SK_ACTION_PREFIX;
use opsrunbook_core::records::SK_ACTIONS_LATEST;
use opsrunbook_core::records::SK_META;
use opsrunbook_core::records::SK_PACKET_PREFIX;
use opsrunbook_core::records::SK_SNAPSHOT_PREFIX;
use opsrunbook_core::records::pk_incident;
use opsrunbook_core::records::sk_run;
use opsrunbook_review::DeliveryHeaders;
use opsrunbook_review::IngressDeps;
use opsrunbook_review::ReviewDispatcher;
use opsrunbook_review::handle_delivery;
use serde_json::Value;
use serde_json::json;

use crate::pipeline::PipelineRuntime;
use crate::pipeline::StartRequest;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum bytes read back per packet blob.
const MAX_PACKET_READ_BYTES: usize = 1_048_576;
/// Action rows returned by the listing endpoint.
const ACTION_LIST_LIMIT: usize = 20;

// ============================================================================
// SECTION: State
// ============================================================================

/// Shared application state behind every route.
#[derive(Clone)]
pub struct AppState {
    /// Validated configuration.
    pub config: Arc<OpsRunbookConfig>,
    /// Object store gateway.
    pub store: Arc<dyn ObjectStore>,
    /// Record store gateway.
    pub records: Arc<dyn RecordStore>,
    /// Pipeline runtime, when configured.
    pub runtime: Option<Arc<dyn PipelineRuntime>>,
    /// Review cycle dispatcher for the webhook endpoint.
    pub dispatcher: Arc<dyn ReviewDispatcher>,
}

/// Builds the `/v1` router over the shared state.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/incidents", post(create_incident))
        .route("/v1/incidents/{incident_id}/runs/{run_id}", get(get_run_status))
        .route("/v1/incidents/{incident_id}/meta", get(get_meta))
        .route("/v1/incidents/{incident_id}/snapshot/latest", get(get_latest_snapshot))
        .route("/v1/incidents/{incident_id}/packet/{run_id}", get(get_packet))
        .route("/v1/incidents/{incident_id}/actions/latest", get(get_latest_actions))
        .route("/v1/incidents/{incident_id}/actions", get(list_actions))
        .route("/v1/incidents/{incident_id}/replay", post(replay_incident))
        .route("/v1/webhooks/github", post(github_webhook))
        .with_state(state)
}

// ============================================================================
// SECTION: Error Shape
// ============================================================================

/// API error carrying a short, upstream-free message.
#[derive(Debug)]
pub struct ApiError {
    /// HTTP status.
    status: StatusCode,
    /// Short message (at most 500 chars).
    message: String,
}

impl ApiError {
    /// Builds an error, clipping the message.
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into().chars().take(500).collect(),
        }
    }

    /// 404 for missing rows.
    fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    /// 502 for failed upstream calls.
    fn upstream(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_GATEWAY, message)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({"detail": self.message}))).into_response()
    }
}

// ============================================================================
// SECTION: Incident Creation
// ============================================================================

/// `POST /v1/incidents`: validate, persist, and start one pipeline run.
async fn create_incident(
    State(state): State<AppState>,
    Json(event): Json<IncidentEvent>,
) -> Result<Json<Value>, ApiError> {
    let response = create_incident_inner(&state, event)?;
    Ok(Json(response))
}

/// Synchronous creation flow shared with tests.
pub fn create_incident_inner(state: &AppState, mut event: IncidentEvent) -> Result<Value, ApiError> {
    event
        .validate()
        .map_err(|err| ApiError::new(StatusCode::UNPROCESSABLE_ENTITY, err.to_string()))?;
    let Some(runtime) = state.runtime.as_ref() else {
        return Err(ApiError::new(
            StatusCode::SERVICE_UNAVAILABLE,
            "pipeline runtime not configured",
        ));
    };

    let incident_id = event.incident_id.clone().unwrap_or_else(IncidentId::generate);
    let collector_run_id = CollectorRunId::generate();
    let created_at = now_rfc3339();
    let (window, _clamped) =
        event.time_window.clamp_to_minutes(state.config.budgets.max_window_minutes);

    let pk = pk_incident(&incident_id);
    let mut meta = serde_json::Map::new();
    meta.insert("incident_id".to_string(), json!(incident_id));
    meta.insert("service".to_string(), json!(event.service));
    meta.insert("environment".to_string(), json!(event.environment));
    meta.insert("created_at".to_string(), json!(created_at));
    meta.insert("source".to_string(), json!(event.source));
    meta.insert("event_id".to_string(), json!(event.event_id));
    if let Some(tenant_id) = &event.tenant_id {
        meta.insert("tenant_id".to_string(), json!(tenant_id));
    }
    if let Some(severity) = &event.severity {
        meta.insert("severity".to_string(), json!(severity));
    }
    state
        .records
        .put(&Record::new(pk.clone(), SK_META, meta))
        .map_err(|err| ApiError::upstream(err.to_string()))?;

    let mut run = serde_json::Map::new();
    run.insert("incident_id".to_string(), json!(incident_id));
    run.insert("collector_run_id".to_string(), json!(collector_run_id));
    run.insert("created_at".to_string(), json!(created_at));
    run.insert("execution_handle".to_string(), json!("pending"));
    run.insert("status".to_string(), json!("STARTING"));
    state
        .records
        .put(&Record::new(pk.clone(), sk_run(&collector_run_id), run))
        .map_err(|err| ApiError::upstream(err.to_string()))?;

    let mut hints = event.hints.clone();
    if hints.metric_queries.is_empty()
        && state.config.pipeline.demo_service.as_deref() == Some(event.service.as_str())
    {
        hints.metric_queries = demo_metric_queries(&event.service, &event.environment);
    }

    let ctx = CollectorContext {
        incident_id: incident_id.clone(),
        collector_run_id: collector_run_id.clone(),
        service: event.service.clone(),
        environment: event.environment.clone(),
        time_window: window,
        evidence_bucket: state.config.object_store.evidence_bucket.clone(),
        max_rows_per_section: state.config.budgets.max_rows_per_section,
        max_total_bytes: state.config.budgets.max_total_bytes,
    };
    let execution_handle = runtime
        .start(StartRequest {
            ctx,
            hints,
        })
        .map_err(|err| ApiError::upstream(format!("failed to start orchestration: {err}")))?;

    Ok(json!({
        "ok": true,
        "incident_id": incident_id,
        "collector_run_id": collector_run_id,
        "execution_handle": execution_handle,
    }))
}

/// Default function metric queries for the configured demo service.
fn demo_metric_queries(service: &str, environment: &str) -> Vec<MetricQueryHint> {
    let function_name = format!("opsrunbook-copilot-{environment}-{service}");
    let dimensions = |name: &str| {
        let mut map = std::collections::BTreeMap::new();
        map.insert("FunctionName".to_string(), name.to_string());
        map
    };
    [("Invocations", "Sum"), ("Errors", "Sum"), ("Duration", "p95"), ("Throttles", "Sum")]
        .into_iter()
        .map(|(metric_name, stat)| MetricQueryHint {
            namespace: "AWS/Lambda".to_string(),
            metric_name: metric_name.to_string(),
            dimensions: dimensions(&function_name),
            period: 300,
            stat: stat.to_string(),
        })
        .collect()
}

// ============================================================================
// SECTION: Read Endpoints
// ============================================================================

/// `GET /v1/incidents/{id}/runs/{run_id}`: execution status plus refs.
async fn get_run_status(
    State(state): State<AppState>,
    Path((incident_id, run_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .records
        .get(&pk_incident(&IncidentId::new(&incident_id)), &sk_run(&CollectorRunId::new(&run_id)))
        .map_err(|err| ApiError::upstream(err.to_string()))?
        .ok_or_else(|| ApiError::not_found("run not found"))?;
    Ok(Json(json!({
        "ok": true,
        "incident_id": incident_id,
        "collector_run_id": run_id,
        "execution_handle": record.field_str("execution_handle").unwrap_or("pending"),
        "status": record.field_str("status").unwrap_or("STARTING"),
        "evidence_refs": record.fields.get("evidence_refs").cloned().unwrap_or_else(|| json!([])),
        "error": record.fields.get("error").cloned().unwrap_or(Value::Null),
    })))
}

/// `GET /v1/incidents/{id}/meta`: incident metadata.
async fn get_meta(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let record = state
        .records
        .get(&pk_incident(&IncidentId::new(&incident_id)), SK_META)
        .map_err(|err| ApiError::upstream(err.to_string()))?
        .ok_or_else(|| ApiError::not_found("incident not found"))?;
    Ok(Json(Value::Object(record.fields)))
}

/// `GET /v1/incidents/{id}/snapshot/latest`: latest snapshot record.
async fn get_latest_snapshot(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let rows = state
        .records
        .query(
            &pk_incident(&IncidentId::new(&incident_id)),
            SK_SNAPSHOT_PREFIX,
            QueryOrder::Descending,
            Some(1),
        )
        .map_err(|err| ApiError::upstream(err.to_string()))?;
    let record = rows.into_iter().next().ok_or_else(|| ApiError::not_found("snapshot not found"))?;
    Ok(Json(Value::Object(record.fields)))
}

/// `GET /v1/incidents/{id}/packet/{latest|run}`: packet JSON from the store.
async fn get_packet(
    State(state): State<AppState>,
    Path((incident_id, run_id)): Path<(String, String)>,
) -> Result<Json<Value>, ApiError> {
    let selector = if run_id == "latest" { None } else { Some(run_id.as_str()) };
    let packet = load_packet(&state, &incident_id, selector)?;
    Ok(Json(json!({"ok": true, "incident_id": incident_id, "packet": packet})))
}

/// Loads the packet blob selected by run id (or the latest).
fn load_packet(
    state: &AppState,
    incident_id: &str,
    run_id: Option<&str>,
) -> Result<Value, ApiError> {
    let rows = state
        .records
        .query(
            &pk_incident(&IncidentId::new(incident_id)),
            SK_PACKET_PREFIX,
            QueryOrder::Descending,
            None,
        )
        .map_err(|err| ApiError::upstream(err.to_string()))?;
    let record = rows
        .into_iter()
        .find(|row| {
            run_id.is_none_or(|wanted| row.field_str("collector_run_id") == Some(wanted))
        })
        .ok_or_else(|| ApiError::not_found("packet not found"))?;
    let bucket = record.field_str("packet_bucket").unwrap_or_default().to_string();
    let key = record.field_str("packet_key").unwrap_or_default().to_string();
    let bytes = state
        .store
        .get(&bucket, &key, MAX_PACKET_READ_BYTES)
        .map_err(|_| ApiError::not_found("packet blob not found"))?;
    serde_json::from_slice(&bytes).map_err(|err| ApiError::upstream(err.to_string()))
}

/// `GET /v1/incidents/{id}/actions/latest`: plan plus per-action results.
async fn get_latest_actions(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let assembled = load_latest_actions(&state, &incident_id)?
        .ok_or_else(|| ApiError::not_found("actions not found"))?;
    Ok(Json(assembled))
}

/// Assembles the latest plan and results from the pointer row.
pub fn load_latest_actions(state: &AppState, incident_id: &str) -> Result<Option<Value>, ApiError> {
    let pk = pk_incident(&IncidentId::new(incident_id));
    let Some(pointer) = state
        .records
        .get(&pk, SK_ACTIONS_LATEST)
        .map_err(|err| ApiError::upstream(err.to_string()))?
    else {
        return Ok(None);
    };

    let action_plan = match pointer.field_str("latest_actionplan_sk") {
        Some(plan_sk) => state
            .records
            .get(&pk, plan_sk)
            .map_err(|err| ApiError::upstream(err.to_string()))?
            .and_then(|row| row.fields.get("plan").cloned())
            .unwrap_or(Value::Null),
        None => Value::Null,
    };

    let mut results: Vec<Value> = Vec::new();
    if let Some(Value::Array(sks)) = pointer.fields.get("latest_action_sks") {
        for sk in sks {
            if let Some(sk) = sk.as_str()
                && let Some(row) = state
                    .records
                    .get(&pk, sk)
                    .map_err(|err| ApiError::upstream(err.to_string()))?
            {
                results.push(Value::Object(row.fields));
            }
        }
    }

    Ok(Some(json!({
        "ok": true,
        "incident_id": incident_id,
        "action_plan": action_plan,
        "results": results,
    })))
}

/// `GET /v1/incidents/{id}/actions`: descending action history.
async fn list_actions(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let rows = state
        .records
        .query(
            &pk_incident(&IncidentId::new(&incident_id)),
            SK_ACTION_PREFIX,
            QueryOrder::Descending,
            Some(ACTION_LIST_LIMIT),
        )
        .map_err(|err| ApiError::upstream(err.to_string()))?;
    if rows.is_empty() {
        return Err(ApiError::not_found("actions not found"));
    }
    let actions: Vec<Value> = rows.into_iter().map(|row| Value::Object(row.fields)).collect();
    Ok(Json(json!({"ok": true, "incident_id": incident_id, "actions": actions})))
}

// ============================================================================
// SECTION: Replay
// ============================================================================

/// `POST /v1/incidents/{id}/replay`: regenerate and diff the plan.
async fn replay_incident(
    State(state): State<AppState>,
    Path(incident_id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let response = replay_incident_inner(&state, &incident_id)?;
    Ok(Json(response))
}

/// Replay flow shared with tests. Never executes actions.
pub fn replay_incident_inner(state: &AppState, incident_id: &str) -> Result<Value, ApiError> {
    let packet_value = load_packet(state, incident_id, None)?;
    let packet: IncidentPacket = serde_json::from_value(packet_value)
        .map_err(|err| ApiError::upstream(format!("stored packet invalid: {err}")))?;

    let existing_plan: Option<ActionPlan> = load_latest_actions(state, incident_id)?
        .and_then(|assembled| assembled.get("action_plan").cloned())
        .and_then(|plan| serde_json::from_value(plan).ok());

    let new_plan = generate_plan(&packet, true);
    let new_hash = plan_hash(&new_plan);
    let existing_hash = existing_plan.as_ref().map(plan_hash).unwrap_or_default();
    let matches = existing_hash == new_hash;

    let mut diffs: Vec<String> = Vec::new();
    if let Some(existing) = &existing_plan
        && !matches
    {
        if existing.actions.len() != new_plan.actions.len() {
            diffs.push(format!(
                "action_count: {} -> {}",
                existing.actions.len(),
                new_plan.actions.len()
            ));
        }
        let mut old_types: Vec<&str> =
            existing.actions.iter().map(|action| action.action_type.as_str()).collect();
        let mut new_types: Vec<&str> =
            new_plan.actions.iter().map(|action| action.action_type.as_str()).collect();
        old_types.sort_unstable();
        new_types.sort_unstable();
        if old_types != new_types {
            diffs.push(format!("action_types: {} -> {}", old_types.join(","), new_types.join(",")));
        }
        if existing.suspected_owners != new_plan.suspected_owners {
            diffs.push("suspected_owners changed".to_string());
        }
    }

    let packet_hash =
        packet.packet_hashes.as_ref().map_or_else(String::new, |hashes| hashes.sha256.clone());
    Ok(json!({
        "ok": true,
        "incident_id": incident_id,
        "packet_hash": packet_hash,
        "existing_plan_hash": existing_hash,
        "new_plan_hash": new_hash,
        "match": matches,
        "diffs": diffs,
        "new_plan_preview": {
            "action_count": new_plan.actions.len(),
            "action_types": new_plan
                .actions
                .iter()
                .map(|action| action.action_type.as_str())
                .collect::<Vec<&str>>(),
            "suspected_owners": new_plan.suspected_owners,
        },
    }))
}

// ============================================================================
// SECTION: Webhook Endpoint
// ============================================================================

/// `POST /v1/webhooks/github`: verified review delivery handling.
async fn github_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let header = |name: &str| headers.get(name).and_then(|value| value.to_str().ok());
    let delivery_headers = DeliveryHeaders {
        signature: header("x-hub-signature-256"),
        event_type: header("x-github-event"),
        delivery_id: header("x-github-delivery"),
    };
    let secret = state
        .config
        .github
        .as_ref()
        .map(|github| github.webhook_secret.clone())
        .unwrap_or_default();
    let bot_slug = state
        .config
        .github
        .as_ref()
        .map_or_else(|| "opsrunbook-copilot-bot".to_string(), |github| github.app_slug.clone());
    let deps = IngressDeps {
        secret: &secret,
        bot_slug: &bot_slug,
        evidence_bucket: &state.config.object_store.evidence_bucket,
        store: state.store.as_ref(),
        records: state.records.as_ref(),
    };

    match handle_delivery(delivery_headers, &body, &deps, state.dispatcher.as_ref()) {
        Ok(outcome) => {
            let status =
                StatusCode::from_u16(outcome.status_code).unwrap_or(StatusCode::ACCEPTED);
            let mut body = json!({
                "ok": true,
                "delivery_id": outcome.delivery_id,
                "status": outcome.status,
            });
            if let (Some(reason), Some(map)) = (outcome.reason, body.as_object_mut()) {
                map.insert("reason".to_string(), json!(reason));
            }
            (status, Json(body)).into_response()
        }
        Err(err) => {
            let status =
                StatusCode::from_u16(err.status_code()).unwrap_or(StatusCode::BAD_REQUEST);
            (status, Json(json!({"detail": err.to_string()}))).into_response()
        }
    }
}
