// crates/opsrunbook-config/src/lib.rs
// ============================================================================
// Module: OpsRunbook Config Library
// Description: Canonical config model and fail-closed validation.
// Purpose: Single source of truth for opsrunbook.toml semantics.
// Dependencies: opsrunbook-core, serde, toml
// ============================================================================

//! ## Overview
//! `opsrunbook-config` defines the canonical configuration model for the
//! pipeline. Config is loaded once at startup, optionally overridden from
//! deployment environment variables, validated strictly, and then passed
//! explicitly to every component.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod config;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use config::ActionsConfig;
pub use config::BudgetConfig;
pub use config::ConfigError;
pub use config::GithubConfig;
pub use config::NotifyConfig;
pub use config::ObjectStoreConfig;
pub use config::ObjectStoreType;
pub use config::OpsRunbookConfig;
pub use config::PipelineConfig;
pub use config::RecordStoreConfig;
pub use config::RecordStoreType;
pub use config::ResolverConfig;
pub use config::ServerConfig;
pub use config::TicketConfig;

#[cfg(test)]
mod tests;
