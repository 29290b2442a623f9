// crates/opsrunbook-store/src/tests.rs
// ============================================================================
// Module: Record Store Tests
// Description: Upsert, get, and prefix-query behavior on SQLite.
// Purpose: Ensure the durable store honors the key-ordered contract.
// Dependencies: crate, opsrunbook-core, tempfile
// ============================================================================
//! ## Overview
//! Exercises the SQLite record store against the same contract the in-memory
//! store satisfies: ordered prefix queries, upsert semantics for singleton
//! pointers, and field round-tripping.

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

use opsrunbook_core::QueryOrder;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use serde_json::Map;
use serde_json::Value;
use serde_json::json;

use crate::SqliteRecordStore;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a record with one marker field.
fn record(pk: &str, sk: &str, marker: &str) -> Record {
    let mut fields = Map::new();
    fields.insert("marker".to_string(), json!(marker));
    Record::new(pk, sk, fields)
}

// ============================================================================
// SECTION: Basic Operations
// ============================================================================

/// Verifies put/get round-trips fields.
#[test]
fn put_get_round_trip() {
    let store = SqliteRecordStore::open_in_memory().unwrap();
    store.put(&record("INCIDENT#inc-1", "META", "meta")).unwrap();

    let loaded = store.get("INCIDENT#inc-1", "META").unwrap().unwrap();
    assert_eq!(loaded.field_str("marker"), Some("meta"));
    assert!(store.get("INCIDENT#inc-1", "MISSING").unwrap().is_none());
}

/// Verifies put on the same key is last-write-wins.
#[test]
fn put_is_upsert() {
    let store = SqliteRecordStore::open_in_memory().unwrap();
    store.put(&record("INCIDENT#inc-1", "ACTIONS#LATEST", "first")).unwrap();
    store.put(&record("INCIDENT#inc-1", "ACTIONS#LATEST", "second")).unwrap();

    let loaded = store.get("INCIDENT#inc-1", "ACTIONS#LATEST").unwrap().unwrap();
    assert_eq!(loaded.field_str("marker"), Some("second"));
}

// ============================================================================
// SECTION: Prefix Queries
// ============================================================================

/// Verifies descending prefix queries return latest-first with a limit.
#[test]
fn descending_prefix_query_returns_latest_first() {
    let store = SqliteRecordStore::open_in_memory().unwrap();
    store.put(&record("INCIDENT#inc-1", "SNAPSHOT#2026-02-15T11:00:00Z#r1", "old")).unwrap();
    store.put(&record("INCIDENT#inc-1", "SNAPSHOT#2026-02-15T12:00:00Z#r2", "new")).unwrap();
    store.put(&record("INCIDENT#inc-1", "RUN#r1", "run")).unwrap();

    let rows = store
        .query("INCIDENT#inc-1", "SNAPSHOT#", QueryOrder::Descending, Some(1))
        .unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].field_str("marker"), Some("new"));
}

/// Verifies prefix queries do not leak other partitions or prefixes.
#[test]
fn prefix_query_is_isolated() {
    let store = SqliteRecordStore::open_in_memory().unwrap();
    store.put(&record("INCIDENT#inc-1", "PACKET#2026-02-15T12:00:00Z#r1", "p1")).unwrap();
    store.put(&record("INCIDENT#inc-2", "PACKET#2026-02-15T12:00:00Z#r9", "p9")).unwrap();
    store.put(&record("INCIDENT#inc-1", "ACTION#2026-02-15T12:01:00Z#a1", "a1")).unwrap();

    let rows = store.query("INCIDENT#inc-1", "PACKET#", QueryOrder::Ascending, None).unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].field_str("marker"), Some("p1"));
}

/// Verifies complex field values round-trip through storage.
#[test]
fn nested_fields_round_trip() {
    let store = SqliteRecordStore::open_in_memory().unwrap();
    let mut fields = Map::new();
    fields.insert("plan".to_string(), json!({"actions": [{"action_type": "ticket"}]}));
    fields.insert("truncated".to_string(), Value::Bool(true));
    store.put(&Record::new("INCIDENT#inc-1", "ACTIONPLAN#t", fields.clone())).unwrap();

    let loaded = store.get("INCIDENT#inc-1", "ACTIONPLAN#t").unwrap().unwrap();
    assert_eq!(loaded.fields, fields);
    assert!(loaded.field_bool("truncated"));
}

/// Verifies on-disk persistence across reopen.
#[test]
fn persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("records.db");
    {
        let store = SqliteRecordStore::open(&path).unwrap();
        store.put(&record("WEBHOOK#DELIVERY", "DLV#d-1", "processed")).unwrap();
    }
    let store = SqliteRecordStore::open(&path).unwrap();
    let loaded = store.get("WEBHOOK#DELIVERY", "DLV#d-1").unwrap().unwrap();
    assert_eq!(loaded.field_str("marker"), Some("processed"));
}
