// crates/opsrunbook-analyzer/src/lib.rs
// ============================================================================
// Module: OpsRunbook Analyzer Library
// Description: Snapshot analysis and deterministic plan generation.
// Purpose: Turn evidence snapshots into packets and packets into plans.
// Dependencies: opsrunbook-core, serde_json
// ============================================================================

//! ## Overview
//! The analyzer reacts to persisted snapshots and produces incident packets;
//! the plan generator maps packets to the fixed ticket/notify/pr action
//! sequence. Both passes are deterministic: identical inputs produce
//! hash-identical packets and JSON-equal plans modulo timestamps.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod analyzer;
pub mod plan;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use analyzer::AnalyzeRequest;
pub use analyzer::AnalyzerError;
pub use analyzer::AnalyzerOutcome;
pub use analyzer::analyze;
pub use plan::build_notify_body;
pub use plan::build_pr_body;
pub use plan::build_pr_notes;
pub use plan::build_ticket_description;
pub use plan::generate_plan;
pub use plan::plan_hash;
