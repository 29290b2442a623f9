// crates/opsrunbook-core/src/core/plan.rs
// ============================================================================
// Module: OpsRunbook Action Plan
// Description: Action plan and result contracts with priority derivation.
// Purpose: Define the deterministic write-side schema for executed actions.
// Dependencies: serde, serde_json, crate::core::{evidence, identifiers}
// ============================================================================

//! ## Overview
//! An [`ActionPlan`] (`incident_action_plan.v1`) carries three action records
//! in fixed order: ticket, notify, pr. Each executed action produces an
//! [`ActionResult`] (`incident_action_result.v1`). Success is terminal;
//! failed and skipped results are retriable on the next run.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Map;
use serde_json::Value;

use crate::core::evidence::EvidenceRef;
use crate::core::identifiers::ActionId;
use crate::core::identifiers::IncidentId;
use crate::core::packet::SuspectedOwner;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema identifier for action plans.
pub const ACTION_PLAN_SCHEMA: &str = "incident_action_plan.v1";

/// Schema identifier for action results.
pub const ACTION_RESULT_SCHEMA: &str = "incident_action_result.v1";

/// Confidence at or above which a plan is escalated to P1.
pub const P1_CONFIDENCE_FLOOR: f64 = 0.9;

/// Maximum stored request/response summary length.
pub const MAX_SUMMARY_LENGTH: usize = 1000;

// ============================================================================
// SECTION: Action Types
// ============================================================================

/// External-effect action kinds, in fixed execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    /// Create a tracker ticket.
    Ticket,
    /// Post a chat notification.
    Notify,
    /// Open a source-control pull request.
    Pr,
}

impl ActionType {
    /// Returns the stable lowercase name used in records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Ticket => "ticket",
            Self::Notify => "notify",
            Self::Pr => "pr",
        }
    }
}

/// Plan priority labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Priority {
    /// Highest urgency (never auto-assigned).
    P0,
    /// Escalated urgency.
    P1,
    /// Default urgency.
    P2,
}

impl Priority {
    /// Returns the stable label string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::P0 => "P0",
            Self::P1 => "P1",
            Self::P2 => "P2",
        }
    }
}

/// Derives the plan priority from the top finding confidence.
///
/// Confidence at or above 0.9 escalates to P1; everything else is P2. P0 is
/// reserved for human escalation and never derived.
#[must_use]
pub fn derive_priority(top_finding_confidence: Option<f64>) -> Priority {
    match top_finding_confidence {
        Some(confidence) if confidence >= P1_CONFIDENCE_FLOOR => Priority::P1,
        _ => Priority::P2,
    }
}

// ============================================================================
// SECTION: Planned Actions
// ============================================================================

/// One planned action inside an [`ActionPlan`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedAction {
    /// Action kind.
    pub action_type: ActionType,
    /// Derived priority.
    pub priority: Priority,
    /// Action title.
    pub title: String,
    /// Markdown description body.
    #[serde(default)]
    pub description_md: String,
    /// Evidence citations carried into the result.
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceRef>,
    /// Relevant links.
    #[serde(default)]
    pub links: Vec<String>,
    /// Whether the action executes against fakes.
    pub dry_run: bool,
    /// Action-specific context payload (e.g. PR metadata).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<Value>,
}

/// Deterministic action plan (`incident_action_plan.v1`).
///
/// # Invariants
/// - `actions` holds exactly ticket, notify, pr in that order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionPlan {
    /// Schema identifier, always `incident_action_plan.v1`.
    pub schema_version: String,
    /// Incident the plan belongs to.
    pub incident_id: IncidentId,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Deployment environment.
    pub environment: String,
    /// Logical service name.
    pub service: String,
    /// Suspected owners copied from the packet.
    #[serde(default)]
    pub suspected_owners: Vec<SuspectedOwner>,
    /// Planned actions in fixed execution order.
    pub actions: Vec<PlannedAction>,
}

impl ActionPlan {
    /// Returns the planned action of the given type, when present.
    #[must_use]
    pub fn action(&self, action_type: ActionType) -> Option<&PlannedAction> {
        self.actions.iter().find(|action| action.action_type == action_type)
    }
}

// ============================================================================
// SECTION: Action Results
// ============================================================================

/// Terminality classification for one executed action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    /// The external call succeeded (terminal).
    Success,
    /// The external call failed (retriable).
    Failed,
    /// The action was deliberately not executed (retriable).
    Skipped,
}

impl ActionStatus {
    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
        }
    }
}

/// Result of one executed action (`incident_action_result.v1`).
///
/// # Invariants
/// - `request_summary` and `response_summary` are at most 1000 chars.
/// - At most one success result exists per (incident, action type).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionResult {
    /// Schema identifier, always `incident_action_result.v1`.
    pub schema_version: String,
    /// Incident the action belongs to.
    pub incident_id: IncidentId,
    /// Action identifier.
    pub action_id: ActionId,
    /// Action kind.
    pub action_type: ActionType,
    /// Execution status.
    pub status: ActionStatus,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Short request description.
    #[serde(default)]
    pub request_summary: String,
    /// Short response description.
    #[serde(default)]
    pub response_summary: String,
    /// Provider keys (ticket key, PR url, resolution trace, ...).
    #[serde(default)]
    pub external_refs: Map<String, Value>,
    /// Error label when failed or skipped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure cause detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Evidence citations carried from the plan.
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceRef>,
}

/// Truncates a summary string to the stored maximum.
#[must_use]
pub fn clip_summary(text: &str) -> String {
    text.chars().take(MAX_SUMMARY_LENGTH).collect()
}
