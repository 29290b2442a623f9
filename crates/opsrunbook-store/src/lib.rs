// crates/opsrunbook-store/src/lib.rs
// ============================================================================
// Module: OpsRunbook Store Library
// Description: Durable gateways for the object store and record store.
// Purpose: Provide production implementations of the core storage interfaces.
// Dependencies: aws-sdk-s3, opsrunbook-core, rusqlite
// ============================================================================

//! ## Overview
//! This crate hosts the durable storage gateways: an S3-backed object store
//! for content-addressed blobs and a SQLite-backed key-ordered record store.
//! Both implement the interfaces in `opsrunbook-core`; in-memory equivalents
//! for tests live next to those interfaces.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod object_store;
pub mod record_store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use object_store::S3ObjectStore;
pub use record_store::SqliteRecordStore;

#[cfg(test)]
mod tests;
