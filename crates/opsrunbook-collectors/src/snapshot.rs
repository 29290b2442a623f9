// crates/opsrunbook-collectors/src/snapshot.rs
// ============================================================================
// Module: Snapshot Persister
// Description: Aggregates collector results into one durable snapshot.
// Purpose: Produce the manifest the analyzer loads and the event it reacts to.
// Dependencies: opsrunbook-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The snapshot persister always runs, regardless of collector outcomes. It
//! writes the aggregate manifest blob, records a `SNAPSHOT#` row, and emits
//! `evidence.snapshot.persisted` best-effort. The snapshot `truncated` bit is
//! the OR across collectors of truncation-or-error.

// ============================================================================
// SECTION: Imports
// ============================================================================

use opsrunbook_core::CollectorResult;
use opsrunbook_core::DomainEvent;
use opsrunbook_core::EventBus;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::ObjectStoreError;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use opsrunbook_core::SNAPSHOT_SCHEMA;
use opsrunbook_core::SnapshotManifest;
use opsrunbook_core::SnapshotRef;
use opsrunbook_core::hashing::canonical_bytes_and_sha;
use opsrunbook_core::now_rfc3339;
use opsrunbook_core::records::pk_incident;
use opsrunbook_core::records::sk_snapshot;
use opsrunbook_core::snapshot_key;
use serde_json::Map;
use serde_json::json;
use thiserror::Error;

use crate::context::CollectorContext;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Snapshot persistence errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Canonical serialization failed.
    #[error("snapshot serialization failed: {0}")]
    Serialize(String),
    /// The manifest blob write failed.
    #[error("snapshot write failed: {0}")]
    Write(#[from] ObjectStoreError),
    /// The snapshot record write failed.
    #[error("snapshot record failed: {0}")]
    Record(String),
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Result of persisting one snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotOutcome {
    /// The written manifest.
    pub manifest: SnapshotManifest,
    /// Pointer to the manifest blob.
    pub snapshot_ref: SnapshotRef,
    /// Sort key of the `SNAPSHOT#` record.
    pub snapshot_sk: String,
    /// Manifest byte size.
    pub byte_size: usize,
}

// ============================================================================
// SECTION: Persister
// ============================================================================

/// Writes the aggregate snapshot and its record, then emits the event.
///
/// # Errors
///
/// Returns [`SnapshotError`] when the blob or record write fails. Event
/// emission failures are logged, never returned.
pub fn persist_snapshot(
    ctx: &CollectorContext,
    results: &[CollectorResult],
    store: &dyn ObjectStore,
    records: &dyn RecordStore,
    bus: Option<&dyn EventBus>,
) -> Result<SnapshotOutcome, SnapshotError> {
    let created_at = now_rfc3339();
    let truncated = results.iter().any(CollectorResult::truncated_or_error);
    let manifest = SnapshotManifest {
        schema_version: SNAPSHOT_SCHEMA.to_string(),
        incident_id: ctx.incident_id.clone(),
        collector_run_id: ctx.collector_run_id.clone(),
        created_at: created_at.clone(),
        service: ctx.service.clone(),
        environment: ctx.environment.clone(),
        time_window: ctx.time_window,
        collectors: results.to_vec(),
        truncated,
    };

    let (bytes, sha256) =
        canonical_bytes_and_sha(&manifest).map_err(|err| SnapshotError::Serialize(err.to_string()))?;
    let byte_size = bytes.len();
    let key = snapshot_key(&ctx.incident_id, &ctx.collector_run_id);
    store.put(&ctx.evidence_bucket, &key, bytes)?;

    let snapshot_ref = SnapshotRef {
        bucket: ctx.evidence_bucket.clone(),
        key: key.clone(),
        sha256: sha256.clone(),
    };

    let snapshot_sk = sk_snapshot(&created_at, &ctx.collector_run_id);
    let mut fields = Map::new();
    fields.insert("incident_id".to_string(), json!(ctx.incident_id));
    fields.insert("collector_run_id".to_string(), json!(ctx.collector_run_id));
    fields.insert("created_at".to_string(), json!(created_at));
    fields.insert("evidence_bucket".to_string(), json!(ctx.evidence_bucket));
    fields.insert("evidence_key".to_string(), json!(key));
    fields.insert("evidence_sha256".to_string(), json!(sha256));
    fields.insert("evidence_byte_size".to_string(), json!(byte_size));
    fields.insert("truncated".to_string(), json!(truncated));
    records
        .put(&Record::new(pk_incident(&ctx.incident_id), snapshot_sk.clone(), fields))
        .map_err(|err| SnapshotError::Record(err.to_string()))?;

    if let Some(bus) = bus {
        let detail = json!({
            "incident_id": ctx.incident_id,
            "collector_run_id": ctx.collector_run_id,
            "evidence_bucket": ctx.evidence_bucket,
            "evidence_key": key,
            "evidence_sha256": sha256,
            "created_at": created_at,
            "service": ctx.service,
            "environment": ctx.environment,
            "time_window": ctx.time_window,
        });
        if let Err(err) = bus.emit(&DomainEvent::new("evidence.snapshot.persisted", detail)) {
            tracing::warn!(
                incident_id = %ctx.incident_id,
                error = %err,
                "evidence.snapshot.persisted emit failed"
            );
        }
    }

    Ok(SnapshotOutcome {
        manifest,
        snapshot_ref,
        snapshot_sk,
        byte_size,
    })
}
