// crates/opsrunbook-actions/src/lib.rs
// ============================================================================
// Module: OpsRunbook Actions Library
// Description: Provider capabilities and the gated action executor.
// Purpose: Execute ticket, notify, and PR actions idempotently.
// Dependencies: opsrunbook-analyzer, opsrunbook-core, opsrunbook-resolver
// ============================================================================

//! ## Overview
//! Provider clients are narrow capabilities with production and dry-run
//! implementations; the executor drives the fixed ticket/notify/pr sequence
//! under the kill switch, per-action idempotency, and the repo-confidence
//! gate, recording every outcome as an `ACTION#` row.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod executor;
pub mod providers;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use executor::ActionClients;
pub use executor::ActionSettings;
pub use executor::RunOutcome;
pub use executor::RunReport;
pub use executor::run_actions;
pub use providers::CardLink;
pub use providers::ChatNotifier;
pub use providers::DryRunNotifier;
pub use providers::DryRunSourceControl;
pub use providers::DryRunTicketClient;
pub use providers::GithubClient;
pub use providers::HttpTicketClient;
pub use providers::NotifyRefs;
pub use providers::PrNotesRequest;
pub use providers::PrRefs;
pub use providers::ProviderError;
pub use providers::SourceControlClient;
pub use providers::TicketClient;
pub use providers::TicketRefs;
pub use providers::WebhookNotifier;
pub use providers::tracker_priority;
