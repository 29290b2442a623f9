// crates/opsrunbook-core/src/interfaces/mod.rs
// ============================================================================
// Module: OpsRunbook Interfaces
// Description: Backend-agnostic interfaces for blobs, records, and events.
// Purpose: Define the contract surfaces the pipeline consumes from providers.
// Dependencies: serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Interfaces define how the pipeline integrates with the object store, the
//! key-ordered record store, and the event bus without embedding
//! backend-specific details. Implementations must be deterministic where the
//! backend allows it and fail closed on missing or invalid data. Event
//! emission is best-effort by contract: emit failures never fail a step.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;
use thiserror::Error;

// ============================================================================
// SECTION: Object Store
// ============================================================================

/// Object store errors.
#[derive(Debug, Error)]
pub enum ObjectStoreError {
    /// Invalid bucket or key input.
    #[error("object store invalid: {0}")]
    Invalid(String),
    /// Backend I/O failure.
    #[error("object store io error: {0}")]
    Io(String),
    /// The requested object does not exist.
    #[error("object not found: {0}")]
    NotFound(String),
    /// Object exceeds the read size limit.
    #[error("object too large: {key} ({actual_bytes} > {max_bytes})")]
    TooLarge {
        /// Object key.
        key: String,
        /// Maximum allowed bytes.
        max_bytes: usize,
        /// Actual size in bytes.
        actual_bytes: usize,
    },
}

/// Content-addressed JSON blob storage.
///
/// # Invariants
/// - Writes never mutate existing content; keys are written at most once per
///   pipeline step and re-writes carry identical bytes.
pub trait ObjectStore: Send + Sync {
    /// Writes one object.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the write fails.
    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError>;

    /// Reads one object, enforcing a byte limit.
    ///
    /// # Errors
    ///
    /// Returns [`ObjectStoreError`] when the object is missing, oversized, or
    /// the read fails.
    fn get(&self, bucket: &str, key: &str, max_bytes: usize) -> Result<Vec<u8>, ObjectStoreError>;
}

// ============================================================================
// SECTION: Record Store
// ============================================================================

/// Record store errors.
#[derive(Debug, Error)]
pub enum RecordStoreError {
    /// Backend I/O failure.
    #[error("record store io error: {0}")]
    Io(String),
    /// Stored data failed to decode.
    #[error("record store corrupt row: {0}")]
    Corrupt(String),
    /// Store reported an error.
    #[error("record store error: {0}")]
    Store(String),
}

/// One key-ordered record: a partition key, a sort key, and JSON fields.
///
/// # Invariants
/// - `(pk, sk)` uniquely identifies the record within the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Partition key.
    pub pk: String,
    /// Sort key.
    pub sk: String,
    /// Record fields.
    pub fields: Map<String, Value>,
}

impl Record {
    /// Builds a record from key parts and fields.
    #[must_use]
    pub fn new(pk: impl Into<String>, sk: impl Into<String>, fields: Map<String, Value>) -> Self {
        Self {
            pk: pk.into(),
            sk: sk.into(),
            fields,
        }
    }

    /// Returns a string field, when present.
    #[must_use]
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields.get(key).and_then(Value::as_str)
    }

    /// Returns a boolean field, defaulting to false.
    #[must_use]
    pub fn field_bool(&self, key: &str) -> bool {
        self.fields.get(key).and_then(Value::as_bool).unwrap_or(false)
    }
}

/// Sort-key query ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryOrder {
    /// Ascending sort-key order.
    Ascending,
    /// Descending sort-key order (latest first for timestamped keys).
    Descending,
}

/// Key-ordered, append-only record storage.
///
/// # Invariants
/// - Rows are append-only except singleton pointers, which are
///   last-write-wins via `put` on the same `(pk, sk)`.
pub trait RecordStore: Send + Sync {
    /// Writes (or overwrites) one record.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when the write fails.
    fn put(&self, record: &Record) -> Result<(), RecordStoreError>;

    /// Reads one record by exact key.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when the read fails.
    fn get(&self, pk: &str, sk: &str) -> Result<Option<Record>, RecordStoreError>;

    /// Queries records under one partition by sort-key prefix.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when the query fails.
    fn query(
        &self,
        pk: &str,
        sk_prefix: &str,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, RecordStoreError>;
}

// ============================================================================
// SECTION: Event Bus
// ============================================================================

/// Domain event source attached to every emitted event.
pub const EVENT_SOURCE: &str = "opsrunbook-copilot";

/// Event bus errors.
#[derive(Debug, Error)]
pub enum EventBusError {
    /// The bus rejected or failed the emit.
    #[error("event emit failed: {0}")]
    Emit(String),
}

/// One domain event published to the bus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainEvent {
    /// Event source, always [`EVENT_SOURCE`].
    pub source: String,
    /// Event detail type (`evidence.collected`, `incident.analyzed`, ...).
    pub detail_type: String,
    /// Structured event detail.
    pub detail: Value,
}

impl DomainEvent {
    /// Builds a domain event with the standard source.
    #[must_use]
    pub fn new(detail_type: impl Into<String>, detail: Value) -> Self {
        Self {
            source: EVENT_SOURCE.to_string(),
            detail_type: detail_type.into(),
            detail,
        }
    }
}

/// Best-effort domain event publisher.
pub trait EventBus: Send + Sync {
    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns [`EventBusError`] when publishing fails. Callers treat emission
    /// as best-effort and never fail a step on this error.
    fn emit(&self, event: &DomainEvent) -> Result<(), EventBusError>;
}
