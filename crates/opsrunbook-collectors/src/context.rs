// crates/opsrunbook-collectors/src/context.rs
// ============================================================================
// Module: Collector Context
// Description: Shared per-run inputs and blob persistence helpers.
// Purpose: Keep collector steps pure over one explicit context value.
// Dependencies: opsrunbook-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! Every collector receives one [`CollectorContext`] carrying the identifiers,
//! window, bucket, and budgets for the run. The persist helper canonicalizes
//! the (already redacted and budgeted) payload, content-addresses it, writes
//! it, and returns the [`EvidenceRef`]. Event emission is best-effort: a
//! failed emit is logged and never fails the step.

// ============================================================================
// SECTION: Imports
// ============================================================================

use opsrunbook_core::CollectorRunId;
use opsrunbook_core::CollectorType;
use opsrunbook_core::DomainEvent;
use opsrunbook_core::EventBus;
use opsrunbook_core::EvidenceRef;
use opsrunbook_core::IncidentId;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::ObjectStoreError;
use opsrunbook_core::TimeWindow;
use opsrunbook_core::evidence_blob_key;
use opsrunbook_core::hashing::canonical_bytes_and_sha;
use opsrunbook_core::now_rfc3339;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Context
// ============================================================================

/// Shared inputs for one collector invocation.
#[derive(Debug, Clone)]
pub struct CollectorContext {
    /// Incident being collected for.
    pub incident_id: IncidentId,
    /// Pipeline instance identifier.
    pub collector_run_id: CollectorRunId,
    /// Logical service name.
    pub service: String,
    /// Deployment environment.
    pub environment: String,
    /// Clamped collection window.
    pub time_window: TimeWindow,
    /// Bucket evidence blobs are written under.
    pub evidence_bucket: String,
    /// Maximum rows kept per evidence section.
    pub max_rows_per_section: usize,
    /// Maximum canonical bytes per evidence blob.
    pub max_total_bytes: usize,
}

// ============================================================================
// SECTION: Blob Persistence
// ============================================================================

/// Canonicalizes, content-addresses, and writes one evidence payload.
///
/// # Errors
///
/// Returns [`ObjectStoreError`] when serialization or the write fails.
pub fn persist_evidence(
    ctx: &CollectorContext,
    collector_type: CollectorType,
    payload: &Value,
    truncated: bool,
    store: &dyn ObjectStore,
) -> Result<EvidenceRef, ObjectStoreError> {
    let (bytes, sha256) = canonical_bytes_and_sha(payload)
        .map_err(|err| ObjectStoreError::Invalid(err.to_string()))?;
    let key = evidence_blob_key(&ctx.incident_id, &ctx.collector_run_id, collector_type);
    let byte_size = bytes.len();
    store.put(&ctx.evidence_bucket, &key, bytes)?;
    Ok(EvidenceRef {
        collector_type,
        bucket: ctx.evidence_bucket.clone(),
        key,
        sha256,
        byte_size,
        truncated,
    })
}

// ============================================================================
// SECTION: Event Emission
// ============================================================================

/// Emits `evidence.collected` best-effort.
pub fn emit_collected(
    ctx: &CollectorContext,
    evidence_ref: &EvidenceRef,
    bus: Option<&dyn EventBus>,
) {
    let Some(bus) = bus else {
        return;
    };
    let detail = json!({
        "incident_id": ctx.incident_id,
        "collector_run_id": ctx.collector_run_id,
        "collector_type": evidence_ref.collector_type,
        "evidence_ref": evidence_ref,
        "time_window": ctx.time_window,
        "service": ctx.service,
        "emitted_at": now_rfc3339(),
    });
    let event = DomainEvent::new("evidence.collected", detail);
    if let Err(err) = bus.emit(&event) {
        tracing::warn!(
            incident_id = %ctx.incident_id,
            error = %err,
            "evidence.collected emit failed"
        );
    }
}
