// crates/opsrunbook-core/src/runtime/mod.rs
// ============================================================================
// Module: OpsRunbook Runtime Helpers
// Description: In-process store and bus implementations.
// Purpose: Provide deterministic backends for tests, demos, and dry-run mode.
// Dependencies: crate::interfaces
// ============================================================================

//! ## Overview
//! Runtime helpers host the in-memory object store, record store, recording
//! event bus, and the shared `Arc` wrappers used to thread one store through
//! the pipeline steps.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod store;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use store::InMemoryObjectStore;
pub use store::InMemoryRecordStore;
pub use store::RecordingEventBus;
