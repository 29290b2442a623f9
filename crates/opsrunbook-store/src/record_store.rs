// crates/opsrunbook-store/src/record_store.rs
// ============================================================================
// Module: SQLite Record Store
// Description: Durable key-ordered record store backed by SQLite WAL.
// Purpose: Persist incident and webhook records with prefix queries.
// Dependencies: opsrunbook-core, rusqlite, serde_json
// ============================================================================

//! ## Overview
//! Records are rows of `(pk, sk, fields)` with `fields` stored as compact
//! JSON text. Sort-key prefix queries use a half-open range over the binary
//! text collation, which matches the key-ordered store contract. Writes are
//! upserts: append-only rows never collide, and the two singleton pointers
//! are last-write-wins by construction.
//!
//! Security posture: database contents are untrusted on load; rows that fail
//! to decode surface as corruption errors rather than being skipped.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Path;
use std::sync::Arc;
use std::sync::Mutex;

use opsrunbook_core::QueryOrder;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use opsrunbook_core::RecordStoreError;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::params;
use serde_json::Map;
use serde_json::Value;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// SQLite schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Busy timeout applied to every connection (ms).
const BUSY_TIMEOUT_MS: u64 = 5_000;
/// Upper-bound sentinel appended to prefixes for range queries.
const PREFIX_UPPER_SENTINEL: char = '\u{10FFFF}';

// ============================================================================
// SECTION: SQLite Record Store
// ============================================================================

/// SQLite-backed [`RecordStore`] implementation.
///
/// # Invariants
/// - `(pk, sk)` is the primary key; `put` upserts.
/// - `fields` round-trips as a JSON object.
#[derive(Clone)]
pub struct SqliteRecordStore {
    /// Shared connection protected by a mutex.
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Opens (and migrates) a record store at the given path.
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn open(path: &Path) -> Result<Self, RecordStoreError> {
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE;
        let conn = Connection::open_with_flags(path, flags)
            .map_err(|err| RecordStoreError::Io(err.to_string()))?;
        initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Opens an in-memory store (tests only).
    ///
    /// # Errors
    ///
    /// Returns [`RecordStoreError`] when initialization fails.
    pub fn open_in_memory() -> Result<Self, RecordStoreError> {
        let conn =
            Connection::open_in_memory().map_err(|err| RecordStoreError::Io(err.to_string()))?;
        initialize(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Locks the connection, mapping poisoning to a store error.
    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, RecordStoreError> {
        self.conn
            .lock()
            .map_err(|_| RecordStoreError::Io("record store mutex poisoned".to_string()))
    }
}

/// Applies pragmas and creates the schema when missing.
fn initialize(conn: &Connection) -> Result<(), RecordStoreError> {
    conn.busy_timeout(std::time::Duration::from_millis(BUSY_TIMEOUT_MS))
        .map_err(|err| RecordStoreError::Io(err.to_string()))?;
    conn.execute_batch("PRAGMA journal_mode = wal; PRAGMA synchronous = full;")
        .map_err(|err| RecordStoreError::Io(err.to_string()))?;
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);
         CREATE TABLE IF NOT EXISTS records (
             pk TEXT NOT NULL,
             sk TEXT NOT NULL,
             fields TEXT NOT NULL,
             PRIMARY KEY (pk, sk)
         );",
    )
    .map_err(|err| RecordStoreError::Io(err.to_string()))?;
    let version: Option<i64> = conn
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .map_or(None, Some);
    match version {
        None => {
            conn.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])
                .map_err(|err| RecordStoreError::Io(err.to_string()))?;
            Ok(())
        }
        Some(found) if found == SCHEMA_VERSION => Ok(()),
        Some(found) => Err(RecordStoreError::Store(format!(
            "record store schema version mismatch: found {found}, expected {SCHEMA_VERSION}"
        ))),
    }
}

/// Decodes a row's fields column into a JSON object map.
fn decode_fields(pk: &str, sk: &str, raw: &str) -> Result<Map<String, Value>, RecordStoreError> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(RecordStoreError::Corrupt(format!("{pk}/{sk}: fields is not an object"))),
        Err(err) => Err(RecordStoreError::Corrupt(format!("{pk}/{sk}: {err}"))),
    }
}

impl RecordStore for SqliteRecordStore {
    fn put(&self, record: &Record) -> Result<(), RecordStoreError> {
        let fields = serde_json::to_string(&record.fields)
            .map_err(|err| RecordStoreError::Store(err.to_string()))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO records (pk, sk, fields) VALUES (?1, ?2, ?3)
             ON CONFLICT (pk, sk) DO UPDATE SET fields = excluded.fields",
            params![record.pk, record.sk, fields],
        )
        .map_err(|err| RecordStoreError::Io(err.to_string()))?;
        Ok(())
    }

    fn get(&self, pk: &str, sk: &str) -> Result<Option<Record>, RecordStoreError> {
        let conn = self.lock()?;
        let mut stmt = conn
            .prepare("SELECT fields FROM records WHERE pk = ?1 AND sk = ?2")
            .map_err(|err| RecordStoreError::Io(err.to_string()))?;
        let mut rows =
            stmt.query(params![pk, sk]).map_err(|err| RecordStoreError::Io(err.to_string()))?;
        let Some(row) = rows.next().map_err(|err| RecordStoreError::Io(err.to_string()))? else {
            return Ok(None);
        };
        let raw: String = row.get(0).map_err(|err| RecordStoreError::Io(err.to_string()))?;
        Ok(Some(Record::new(pk, sk, decode_fields(pk, sk, &raw)?)))
    }

    fn query(
        &self,
        pk: &str,
        sk_prefix: &str,
        order: QueryOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Record>, RecordStoreError> {
        let upper = format!("{sk_prefix}{PREFIX_UPPER_SENTINEL}");
        let direction = match order {
            QueryOrder::Ascending => "ASC",
            QueryOrder::Descending => "DESC",
        };
        let sql = format!(
            "SELECT sk, fields FROM records
             WHERE pk = ?1 AND sk >= ?2 AND sk < ?3
             ORDER BY sk {direction}"
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql).map_err(|err| RecordStoreError::Io(err.to_string()))?;
        let mut rows = stmt
            .query(params![pk, sk_prefix, upper])
            .map_err(|err| RecordStoreError::Io(err.to_string()))?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|err| RecordStoreError::Io(err.to_string()))? {
            if let Some(cap) = limit
                && out.len() >= cap
            {
                break;
            }
            let sk: String = row.get(0).map_err(|err| RecordStoreError::Io(err.to_string()))?;
            let raw: String = row.get(1).map_err(|err| RecordStoreError::Io(err.to_string()))?;
            let fields = decode_fields(pk, &sk, &raw)?;
            out.push(Record::new(pk, sk, fields));
        }
        Ok(out)
    }
}
