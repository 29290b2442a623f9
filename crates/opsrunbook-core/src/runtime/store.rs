// crates/opsrunbook-core/src/runtime/store.rs
// ============================================================================
// Module: OpsRunbook In-Memory Stores
// Description: In-memory object store, record store, and recording event bus.
// Purpose: Provide deterministic backends for tests and dry-run wiring.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! These implementations back tests and local demos. They are not intended
//! for production use: durability is process-lifetime only. The recording
//! event bus captures every emitted event for assertion.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use crate::interfaces::DomainEvent;
use crate::interfaces::EventBus;
use crate::interfaces::EventBusError;
use crate::interfaces::ObjectStore;
use crate::interfaces::ObjectStoreError;
use crate::interfaces::QueryOrder;
use crate::interfaces::Record;
use crate::interfaces::RecordStore;
use crate::interfaces::RecordStoreError;

// ============================================================================
// SECTION: In-Memory Object Store
// ============================================================================

/// In-memory object store keyed by `(bucket, key)`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryObjectStore {
    /// Object map protected by a mutex.
    objects: Arc<Mutex<BTreeMap<(String, String), Vec<u8>>>>,
}

impl InMemoryObjectStore {
    /// Creates an empty in-memory object store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored objects.
    #[must_use]
    pub fn len(&self) -> usize {
        self.objects.lock().map_or(0, |guard| guard.len())
    }

    /// Returns true when no objects are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ObjectStore for InMemoryObjectStore {
    fn put(&self, bucket: &str, key: &str, bytes: Vec<u8>) -> Result<(), ObjectStoreError> {
        self.objects
            .lock()
            .map_err(|_| ObjectStoreError::Io("object store mutex poisoned".to_string()))?
            .insert((bucket.to_string(), key.to_string()), bytes);
        Ok(())
    }

    fn get(&self, bucket: &str, key: &str, max_bytes: usize) -> Result<Vec<u8>, ObjectStoreError> {
        let guard = self
            .objects
            .lock()
            .map_err(|_| ObjectStoreError::Io("object store mutex poisoned".to_string()))?;
        let bytes = guard
            .get(&(bucket.to_string(), key.to_string()))
            .ok_or_else(|| ObjectStoreError::NotFound(format!("{bucket}/{key}")))?;
        if bytes.len() > max_bytes {
            return Err(ObjectStoreError::TooLarge {
                key: key.to_string(),
                max_bytes,
                actual_bytes: bytes.len(),
            });
        }
        Ok(bytes.clone())
    }
}

// ============================================================================
// SECTION: In-Memory Record Store
// ============================================================================

/// In-memory key-ordered record store.
///
/// # Invariants
/// - Records are ordered by `(pk, sk)` via the backing `BTreeMap`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryRecordStore {
    /// Record map protected by a mutex.
    records: Arc<Mutex<BTreeMap<(String, String), Record>>>,
}

impl InMemoryRecordStore {
    /// Creates an empty in-memory record store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl RecordStore for InMemoryRecordStore {
    fn put(&self, record: &Record) -> Result<(), RecordStoreError> {
        self.records
            .lock()
            .map_err(|_| RecordStoreError::Io("record store mutex poisoned".to_string()))?
            .insert((record.pk.clone(), record.sk.clone()), record.clone());
        Ok(())
    }

    fn get(&self, pk: &str, sk: &str) -> Result<Option<Record>, RecordStoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| RecordStoreError::Io("record store mutex poisoned".to_string()))?;
        Ok(guard.get(&(pk.to_string(), sk.to_string())).cloned())
    }

    fn query(
        &self,
        pk: &str,
        sk_prefix: &str,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, RecordStoreError> {
        let guard = self
            .records
            .lock()
            .map_err(|_| RecordStoreError::Io("record store mutex poisoned".to_string()))?;
        let mut matched: Vec<Record> = guard
            .values()
            .filter(|record| record.pk == pk && record.sk.starts_with(sk_prefix))
            .cloned()
            .collect();
        if matches!(order, QueryOrder::Descending) {
            matched.reverse();
        }
        if let Some(cap) = limit {
            matched.truncate(cap);
        }
        Ok(matched)
    }
}

// ============================================================================
// SECTION: Recording Event Bus
// ============================================================================

/// Event bus that records every emitted event for assertions.
#[derive(Debug, Default, Clone)]
pub struct RecordingEventBus {
    /// Captured events protected by a mutex.
    events: Arc<Mutex<Vec<DomainEvent>>>,
}

impl RecordingEventBus {
    /// Creates an empty recording bus.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every captured event.
    #[must_use]
    pub fn captured(&self) -> Vec<DomainEvent> {
        self.events.lock().map_or_else(|_| Vec::new(), |guard| guard.clone())
    }

    /// Returns captured events of one detail type.
    #[must_use]
    pub fn captured_of(&self, detail_type: &str) -> Vec<DomainEvent> {
        self.captured().into_iter().filter(|event| event.detail_type == detail_type).collect()
    }
}

impl EventBus for RecordingEventBus {
    fn emit(&self, event: &DomainEvent) -> Result<(), EventBusError> {
        self.events
            .lock()
            .map_err(|_| EventBusError::Emit("event bus mutex poisoned".to_string()))?
            .push(event.clone());
        Ok(())
    }
}
