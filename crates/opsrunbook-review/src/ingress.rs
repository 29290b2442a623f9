// crates/opsrunbook-review/src/ingress.rs
// ============================================================================
// Module: Webhook Ingress
// Description: Authenticated, deduplicated source-control webhook handling.
// Purpose: Verify, filter, normalize, and dispatch inbound deliveries.
// Dependencies: hmac, opsrunbook-core, serde_json, sha2, subtle
// ============================================================================

//! ## Overview
//! Every delivery is verified with a constant-time HMAC-SHA256 comparison
//! before anything else. Validation failures reject; every other condition
//! (dedupe, unsupported event, self event, pause) is an accepted response
//! with a status string. The raw delivery is persisted before filtering so
//! rejected shapes remain auditable. `/copilot stop` and `/copilot resume`
//! flip the per-PR pause flag and short-circuit dispatch.
//!
//! Security posture: the webhook body is untrusted input from the public
//! internet; signature verification is the only trust anchor.

// ============================================================================
// SECTION: Imports
// ============================================================================

use hmac::Hmac;
use hmac::Mac;
use opsrunbook_core::DeliveryId;
use opsrunbook_core::InlineContext;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::PR_REVIEW_EVENT_SCHEMA;
use opsrunbook_core::PrReviewEvent;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use opsrunbook_core::now_rfc3339;
use opsrunbook_core::records::PK_WEBHOOK_DELIVERY;
use opsrunbook_core::records::pk_webhook_pr;
use opsrunbook_core::records::sk_delivery;
use opsrunbook_core::records::sk_pr;
use opsrunbook_core::review::MAX_COMMENT_LENGTH;
use serde_json::Value;
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Event types the dispatcher accepts.
const SUPPORTED_EVENTS: [&str; 4] =
    ["issue_comment", "pull_request_review", "pull_request_review_comment", "pull_request"];

/// Pause command string.
const STOP_COMMAND: &str = "/copilot stop";
/// Resume command string.
const RESUME_COMMAND: &str = "/copilot resume";

/// Diff hunk excerpt cap in normalized events.
const MAX_DIFF_HUNK: usize = 2000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation failures that reject a delivery.
#[derive(Debug, Error)]
pub enum IngressError {
    /// The shared secret is not configured (503).
    #[error("webhook secret not configured")]
    SecretUnconfigured,
    /// The signature header is missing or wrong (401).
    #[error("invalid signature")]
    InvalidSignature,
    /// Required event or delivery headers are missing (400).
    #[error("missing required webhook headers")]
    MissingHeaders,
    /// The body is not valid JSON (400).
    #[error("invalid webhook payload: {0}")]
    InvalidPayload(String),
    /// A downstream write failed (502).
    #[error("webhook processing failed: {0}")]
    Downstream(String),
}

impl IngressError {
    /// Returns the HTTP status the error maps to.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::SecretUnconfigured => 503,
            Self::InvalidSignature => 401,
            Self::MissingHeaders | Self::InvalidPayload(_) => 400,
            Self::Downstream(_) => 502,
        }
    }
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Accepted-delivery outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngressOutcome {
    /// Delivery this outcome answers.
    pub delivery_id: DeliveryId,
    /// Response status string.
    pub status: String,
    /// Optional skip reason.
    pub reason: Option<String>,
    /// HTTP status code for the response.
    pub status_code: u16,
}

impl IngressOutcome {
    /// Builds a 202 outcome.
    fn accepted(delivery_id: DeliveryId, status: &str, reason: Option<&str>) -> Self {
        Self {
            delivery_id,
            status: status.to_string(),
            reason: reason.map(str::to_string),
            status_code: 202,
        }
    }
}

// ============================================================================
// SECTION: Dependencies
// ============================================================================

/// Downstream surfaces the ingress writes through.
pub struct IngressDeps<'a> {
    /// Shared webhook secret.
    pub secret: &'a str,
    /// Bot slug for loop prevention.
    pub bot_slug: &'a str,
    /// Bucket raw deliveries are persisted under.
    pub evidence_bucket: &'a str,
    /// Object store for raw delivery persistence.
    pub store: &'a dyn ObjectStore,
    /// Record store for dedupe and pause flags.
    pub records: &'a dyn RecordStore,
}

/// Review cycle dispatch capability.
pub trait ReviewDispatcher: Send + Sync {
    /// Starts the review cycle for one normalized event.
    ///
    /// Implementations use `pr-review-<delivery_id>` as the execution name;
    /// a name collision is treated as already-started and is not an error.
    ///
    /// # Errors
    ///
    /// Returns a short message when dispatch genuinely fails.
    fn dispatch(&self, event: &PrReviewEvent) -> Result<(), String>;
}

/// Raw headers of one delivery.
#[derive(Debug, Clone, Copy, Default)]
pub struct DeliveryHeaders<'a> {
    /// `x-hub-signature-256` value.
    pub signature: Option<&'a str>,
    /// `x-github-event` value.
    pub event_type: Option<&'a str>,
    /// `x-github-delivery` value.
    pub delivery_id: Option<&'a str>,
}

// ============================================================================
// SECTION: Signature Verification
// ============================================================================

/// Verifies a `sha256=<hex>` signature over the raw body in constant time.
#[must_use]
pub fn verify_signature(payload: &[u8], signature: &str, secret: &str) -> bool {
    if secret.is_empty() || signature.is_empty() {
        return false;
    }
    let Some(provided) = signature.strip_prefix("sha256=") else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(payload);
    let expected = hex_encode(&mac.finalize().into_bytes());
    expected.as_bytes().ct_eq(provided.as_bytes()).into()
}

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}

// ============================================================================
// SECTION: Delivery Handling
// ============================================================================

/// Handles one webhook POST end to end.
///
/// # Errors
///
/// Returns [`IngressError`] only for validation and downstream failures;
/// every policy condition is an [`IngressOutcome`].
pub fn handle_delivery(
    headers: DeliveryHeaders<'_>,
    raw_body: &[u8],
    deps: &IngressDeps<'_>,
    dispatcher: &dyn ReviewDispatcher,
) -> Result<IngressOutcome, IngressError> {
    if deps.secret.is_empty() {
        return Err(IngressError::SecretUnconfigured);
    }
    if !verify_signature(raw_body, headers.signature.unwrap_or_default(), deps.secret) {
        return Err(IngressError::InvalidSignature);
    }
    let (Some(event_type), Some(delivery)) = (headers.event_type, headers.delivery_id) else {
        return Err(IngressError::MissingHeaders);
    };
    let delivery_id = DeliveryId::new(delivery);

    if already_processed(deps.records, &delivery_id) {
        return Ok(IngressOutcome {
            delivery_id,
            status: "already_processed".to_string(),
            reason: None,
            status_code: 200,
        });
    }

    let body: Value = serde_json::from_slice(raw_body)
        .map_err(|err| IngressError::InvalidPayload(err.to_string()))?;

    persist_raw_delivery(deps, event_type, &delivery_id, &body)?;

    if !SUPPORTED_EVENTS.contains(&event_type) {
        mark_processed(deps.records, &delivery_id, "skipped_unsupported_event");
        return Ok(IngressOutcome::accepted(delivery_id, "skipped", Some("unsupported_event")));
    }
    if event_type == "issue_comment" && body.pointer("/issue/pull_request").is_none() {
        mark_processed(deps.records, &delivery_id, "skipped_not_pr");
        return Ok(IngressOutcome::accepted(delivery_id, "skipped", Some("not_a_pr")));
    }

    let event = normalize_event(event_type, &delivery_id, &body);

    let sender = event.sender_login.to_lowercase();
    if sender.ends_with("[bot]") || sender == deps.bot_slug.to_lowercase() {
        mark_processed(deps.records, &delivery_id, "skipped_self_event");
        return Ok(IngressOutcome::accepted(delivery_id, "skipped", Some("self_event")));
    }

    let comment = event.comment_body.to_lowercase();
    if comment.contains(STOP_COMMAND) {
        mark_processed(deps.records, &delivery_id, "copilot_paused");
        set_pr_paused(deps.records, &event.repo_full_name, event.pr_number, true);
        return Ok(IngressOutcome::accepted(delivery_id, "paused", None));
    }
    if comment.contains(RESUME_COMMAND) {
        set_pr_paused(deps.records, &event.repo_full_name, event.pr_number, false);
        mark_processed(deps.records, &delivery_id, "copilot_resumed");
        return Ok(IngressOutcome::accepted(delivery_id, "resumed", None));
    }

    if is_pr_paused(deps.records, &event.repo_full_name, event.pr_number) {
        mark_processed(deps.records, &delivery_id, "skipped_paused");
        return Ok(IngressOutcome::accepted(delivery_id, "skipped", Some("pr_paused")));
    }

    if let Err(err) = dispatcher.dispatch(&event) {
        return Err(IngressError::Downstream(err));
    }
    mark_processed(deps.records, &delivery_id, "dispatched");
    Ok(IngressOutcome::accepted(delivery_id, "accepted", None))
}

/// Persists the raw delivery for audit before filtering.
fn persist_raw_delivery(
    deps: &IngressDeps<'_>,
    event_type: &str,
    delivery_id: &DeliveryId,
    body: &Value,
) -> Result<(), IngressError> {
    let repo = body
        .pointer("/repository/full_name")
        .and_then(Value::as_str)
        .unwrap_or("unknown")
        .replace('/', "_");
    let key = format!("webhooks/github/{repo}/{delivery_id}.json");
    let payload = json!({
        "metadata": {
            "delivery_id": delivery_id,
            "event_type": event_type,
            "action": body.get("action").and_then(Value::as_str).unwrap_or_default(),
            "received_at": now_rfc3339(),
            "repository": body.pointer("/repository/full_name").and_then(Value::as_str).unwrap_or_default(),
            "installation_id": body.pointer("/installation/id"),
            "sender_login": body.pointer("/sender/login").and_then(Value::as_str).unwrap_or_default(),
        },
        "payload": body,
    });
    let bytes = opsrunbook_core::canonical_json_bytes(&payload)
        .map_err(|err| IngressError::Downstream(err.to_string()))?;
    deps.store
        .put(deps.evidence_bucket, &key, bytes)
        .map_err(|err| IngressError::Downstream(err.to_string()))
}

// ============================================================================
// SECTION: Dedupe and Pause State
// ============================================================================

/// Returns true when the delivery was already processed.
fn already_processed(records: &dyn RecordStore, delivery_id: &DeliveryId) -> bool {
    records
        .get(PK_WEBHOOK_DELIVERY, &sk_delivery(delivery_id))
        .map(|row| row.is_some())
        .unwrap_or(false)
}

/// Marks the delivery processed with an outcome string.
fn mark_processed(records: &dyn RecordStore, delivery_id: &DeliveryId, outcome: &str) {
    let mut fields = serde_json::Map::new();
    fields.insert("delivery_id".to_string(), json!(delivery_id));
    fields.insert("outcome".to_string(), json!(outcome));
    fields.insert("processed_at".to_string(), json!(now_rfc3339()));
    if let Err(err) =
        records.put(&Record::new(PK_WEBHOOK_DELIVERY, sk_delivery(delivery_id), fields))
    {
        tracing::warn!(delivery_id = %delivery_id, error = %err, "delivery mark failed");
    }
}

/// Writes the per-PR pause flag (last-write-wins).
fn set_pr_paused(records: &dyn RecordStore, repo_full_name: &str, pr_number: Option<u64>, paused: bool) {
    let Some(pr_number) = pr_number else {
        return;
    };
    let mut fields = serde_json::Map::new();
    fields.insert("paused".to_string(), json!(paused));
    fields.insert("updated_at".to_string(), json!(now_rfc3339()));
    if let Err(err) =
        records.put(&Record::new(pk_webhook_pr(repo_full_name), sk_pr(pr_number), fields))
    {
        tracing::warn!(repo_full_name, pr_number, error = %err, "pause flag write failed");
    }
}

/// Returns the per-PR pause flag.
fn is_pr_paused(records: &dyn RecordStore, repo_full_name: &str, pr_number: Option<u64>) -> bool {
    let Some(pr_number) = pr_number else {
        return false;
    };
    records
        .get(&pk_webhook_pr(repo_full_name), &sk_pr(pr_number))
        .ok()
        .flatten()
        .is_some_and(|row| row.field_bool("paused"))
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Normalizes a raw delivery into `github_pr_review_event.v1`.
#[must_use]
pub fn normalize_event(event_type: &str, delivery_id: &DeliveryId, body: &Value) -> PrReviewEvent {
    let text_at = |pointer: &str| -> String {
        body.pointer(pointer).and_then(Value::as_str).unwrap_or_default().to_string()
    };

    let (pr_number, pr_url) = match event_type {
        "issue_comment" => {
            let url = {
                let linked = text_at("/issue/pull_request/html_url");
                if linked.is_empty() { text_at("/issue/html_url") } else { linked }
            };
            (body.pointer("/issue/number").and_then(Value::as_u64), url)
        }
        _ => (
            body.pointer("/pull_request/number").and_then(Value::as_u64),
            text_at("/pull_request/html_url"),
        ),
    };

    let (comment_body, comment_url) = match event_type {
        "issue_comment" | "pull_request_review_comment" => {
            (text_at("/comment/body"), text_at("/comment/html_url"))
        }
        "pull_request_review" => (text_at("/review/body"), text_at("/review/html_url")),
        _ => (String::new(), String::new()),
    };

    let inline_context = (event_type == "pull_request_review_comment").then(|| InlineContext {
        path: text_at("/comment/path"),
        position: body.pointer("/comment/position").and_then(Value::as_i64),
        original_position: body.pointer("/comment/original_position").and_then(Value::as_i64),
        line: body
            .pointer("/comment/line")
            .and_then(Value::as_u64)
            .and_then(|line| u32::try_from(line).ok()),
        original_line: body
            .pointer("/comment/original_line")
            .and_then(Value::as_u64)
            .and_then(|line| u32::try_from(line).ok()),
        side: text_at("/comment/side"),
        diff_hunk: text_at("/comment/diff_hunk").chars().take(MAX_DIFF_HUNK).collect(),
    });

    let review_state = (event_type == "pull_request_review").then(|| text_at("/review/state"));

    PrReviewEvent {
        schema_version: PR_REVIEW_EVENT_SCHEMA.to_string(),
        delivery_id: delivery_id.clone(),
        event_type: event_type.to_string(),
        action: text_at("/action"),
        pr_number,
        repo_full_name: text_at("/repository/full_name"),
        installation_id: body.pointer("/installation/id").and_then(Value::as_i64),
        sender_login: text_at("/sender/login"),
        comment_body: comment_body.chars().take(MAX_COMMENT_LENGTH).collect(),
        comment_url,
        pr_url,
        inline_context,
        review_state,
        received_at: Some(now_rfc3339()),
    }
}
