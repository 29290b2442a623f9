// crates/opsrunbook-core/src/core/records.rs
// ============================================================================
// Module: OpsRunbook Record Keys
// Description: Stable partition and sort key derivation for the record store.
// Purpose: Keep the persisted key layout a single, testable contract.
// Dependencies: crate::core::identifiers
// ============================================================================

//! ## Overview
//! Records live in a key-ordered store under `pk = INCIDENT#<id>` with sort
//! keys discriminated by prefix (`META`, `RUN#`, `SNAPSHOT#`, `PACKET#`,
//! `ACTIONPLAN#`, `ACTION#`, `ACTIONS#LATEST`). Webhook state uses the
//! `WEBHOOK#` partitions. Consumers depend on these prefixes for history
//! queries, so they are a stable external contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use crate::core::identifiers::ActionId;
use crate::core::identifiers::CollectorRunId;
use crate::core::identifiers::DeliveryId;
use crate::core::identifiers::IncidentId;

// ============================================================================
// SECTION: Sort Key Prefixes
// ============================================================================

/// Sort key for incident metadata rows.
pub const SK_META: &str = "META";
/// Sort key prefix for run tracking rows.
pub const SK_RUN_PREFIX: &str = "RUN#";
/// Sort key prefix for snapshot rows.
pub const SK_SNAPSHOT_PREFIX: &str = "SNAPSHOT#";
/// Sort key prefix for packet rows.
pub const SK_PACKET_PREFIX: &str = "PACKET#";
/// Sort key prefix for action plan rows.
pub const SK_ACTIONPLAN_PREFIX: &str = "ACTIONPLAN#";
/// Sort key prefix for action result rows.
pub const SK_ACTION_PREFIX: &str = "ACTION#";
/// Singleton sort key for the latest-actions pointer (last-write-wins).
pub const SK_ACTIONS_LATEST: &str = "ACTIONS#LATEST";
/// Partition key for webhook delivery dedupe rows.
pub const PK_WEBHOOK_DELIVERY: &str = "WEBHOOK#DELIVERY";

// ============================================================================
// SECTION: Incident Partition
// ============================================================================

/// Returns the incident partition key.
#[must_use]
pub fn pk_incident(incident_id: &IncidentId) -> String {
    format!("INCIDENT#{incident_id}")
}

/// Returns the run tracking sort key.
#[must_use]
pub fn sk_run(run_id: &CollectorRunId) -> String {
    format!("{SK_RUN_PREFIX}{run_id}")
}

/// Returns the snapshot sort key (`SNAPSHOT#<created_at>#<run_id>`).
#[must_use]
pub fn sk_snapshot(created_at: &str, run_id: &CollectorRunId) -> String {
    format!("{SK_SNAPSHOT_PREFIX}{created_at}#{run_id}")
}

/// Returns the packet sort key (`PACKET#<created_at>#<run_id>`).
#[must_use]
pub fn sk_packet(created_at: &str, run_id: &CollectorRunId) -> String {
    format!("{SK_PACKET_PREFIX}{created_at}#{run_id}")
}

/// Returns the action plan sort key (`ACTIONPLAN#<created_at>`).
#[must_use]
pub fn sk_action_plan(created_at: &str) -> String {
    format!("{SK_ACTIONPLAN_PREFIX}{created_at}")
}

/// Returns the action result sort key (`ACTION#<created_at>#<action_id>`).
#[must_use]
pub fn sk_action(created_at: &str, action_id: &ActionId) -> String {
    format!("{SK_ACTION_PREFIX}{created_at}#{action_id}")
}

// ============================================================================
// SECTION: Webhook Partitions
// ============================================================================

/// Returns the delivery dedupe sort key (`DLV#<delivery_id>`).
#[must_use]
pub fn sk_delivery(delivery_id: &DeliveryId) -> String {
    format!("DLV#{delivery_id}")
}

/// Returns the per-repository PR pause partition key.
#[must_use]
pub fn pk_webhook_pr(repo_full_name: &str) -> String {
    format!("WEBHOOK#PR#{repo_full_name}")
}

/// Returns the PR pause sort key (`PR#<number>`).
#[must_use]
pub fn sk_pr(pr_number: u64) -> String {
    format!("PR#{pr_number}")
}

/// Returns the review outcome partition key.
#[must_use]
pub fn pk_pr_review(repo_full_name: &str, pr_number: u64) -> String {
    format!("WEBHOOK#PR_REVIEW#{repo_full_name}#{pr_number}")
}

/// Returns the review outcome sort key (`OUTCOME#<created_at>#<delivery>`).
#[must_use]
pub fn sk_review_outcome(created_at: &str, delivery_id: &DeliveryId) -> String {
    format!("OUTCOME#{created_at}#{delivery_id}")
}
