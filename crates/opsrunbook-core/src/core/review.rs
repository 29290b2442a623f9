// crates/opsrunbook-core/src/core/review.rs
// ============================================================================
// Module: OpsRunbook PR Review Contracts
// Description: Normalized webhook events, fix plans, and patch results.
// Purpose: Define the inbound review pathway schemas.
// Dependencies: serde, crate::core::identifiers
// ============================================================================

//! ## Overview
//! The webhook dispatcher normalizes raw source-control deliveries into
//! [`PrReviewEvent`] (`github_pr_review_event.v1`). The review planner turns
//! an event plus code context into a [`PrFixPlan`] (`pr_fix_plan.v1`), and
//! the safe-patch engine reports a [`PatchResult`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::DeliveryId;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema identifier for normalized review events.
pub const PR_REVIEW_EVENT_SCHEMA: &str = "github_pr_review_event.v1";

/// Schema identifier for fix plans.
pub const PR_FIX_PLAN_SCHEMA: &str = "pr_fix_plan.v1";

/// Schema identifier for persisted review packets.
pub const PR_REVIEW_PACKET_SCHEMA: &str = "pr_review_packet.v1";

/// Maximum normalized comment body length.
pub const MAX_COMMENT_LENGTH: usize = 4000;

// ============================================================================
// SECTION: Normalized Events
// ============================================================================

/// Inline review-comment context from the source-control host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InlineContext {
    /// File path the comment targets.
    #[serde(default)]
    pub path: String,
    /// Diff position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<i64>,
    /// Original diff position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_position: Option<i64>,
    /// Current line number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Original line number.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_line: Option<u32>,
    /// Diff side (LEFT/RIGHT).
    #[serde(default)]
    pub side: String,
    /// Surrounding diff hunk (truncated).
    #[serde(default)]
    pub diff_hunk: String,
}

/// Normalized review event (`github_pr_review_event.v1`).
///
/// # Invariants
/// - `comment_body` is at most 4000 chars.
/// - `delivery_id` uniquely identifies the inbound delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrReviewEvent {
    /// Schema identifier, always `github_pr_review_event.v1`.
    pub schema_version: String,
    /// Provider-assigned delivery identifier.
    pub delivery_id: DeliveryId,
    /// Raw webhook event type.
    pub event_type: String,
    /// Webhook action field.
    #[serde(default)]
    pub action: String,
    /// Pull request number, when PR-associated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pr_number: Option<u64>,
    /// Repository `owner/name`.
    pub repo_full_name: String,
    /// App installation identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub installation_id: Option<i64>,
    /// Login of the event sender.
    pub sender_login: String,
    /// Comment or review body (truncated).
    #[serde(default)]
    pub comment_body: String,
    /// Comment URL.
    #[serde(default)]
    pub comment_url: String,
    /// Pull request URL.
    #[serde(default)]
    pub pr_url: String,
    /// Inline context for review comments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inline_context: Option<InlineContext>,
    /// Review state for review events.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_state: Option<String>,
    /// Receipt timestamp (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub received_at: Option<String>,
}

// ============================================================================
// SECTION: Fix Plans
// ============================================================================

/// Edit kinds supported by the safe-patch engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    /// Modify an existing file.
    Edit,
    /// Create a new file.
    Create,
}

/// One proposed edit inside a fix plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProposedEdit {
    /// Repository-relative file path.
    pub file_path: String,
    /// Edit kind.
    pub change_type: ChangeType,
    /// Unified-diff patch text, empty when no deterministic fix was inferred.
    #[serde(default)]
    pub patch: String,
    /// Fallback find/replace instructions.
    #[serde(default)]
    pub instructions: String,
    /// Why this edit addresses the review comment.
    #[serde(default)]
    pub rationale: String,
    /// Target line the comment referenced.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_line: Option<u32>,
    /// Inclusive context line range around the target.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line_range: Option<[u32; 2]>,
    /// File content sha at plan time, for edits.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_sha: Option<String>,
}

/// Risk classification of a fix plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// Code context and a deterministic patch exist; auto-apply.
    Low,
    /// Code context without a patch; human required.
    Medium,
    /// No grounded context; human required.
    High,
}

/// Deterministic fix plan (`pr_fix_plan.v1`).
///
/// # Invariants
/// - `requires_human` or `risk_level == High` defers application.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrFixPlan {
    /// Schema identifier, always `pr_fix_plan.v1`.
    pub schema_version: String,
    /// Delivery that triggered the plan.
    pub delivery_id: DeliveryId,
    /// Pull request number.
    pub pr_number: u64,
    /// Repository `owner/name`.
    pub repo_full_name: String,
    /// Plan summary.
    pub summary: String,
    /// Proposed edits.
    #[serde(default)]
    pub proposed_edits: Vec<ProposedEdit>,
    /// Risk classification.
    pub risk_level: RiskLevel,
    /// Whether a human must review before applying.
    pub requires_human: bool,
    /// Planner provenance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_trace: Option<Value>,
    /// Creation timestamp (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
}

// ============================================================================
// SECTION: Patch Results
// ============================================================================

/// Outcome classification of a patch application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchStatus {
    /// All prepared files were committed.
    Success,
    /// Validation or commit failed; see `reason`.
    Failed,
    /// The plan required human review; nothing was attempted.
    Deferred,
}

impl PatchStatus {
    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Deferred => "deferred",
        }
    }
}

/// Result of one safe-patch application.
///
/// # Invariants
/// - Phase-1 validation failures leave `updated_files` empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatchResult {
    /// Outcome classification.
    pub status: PatchStatus,
    /// Failure or deferral reason.
    #[serde(default)]
    pub reason: String,
    /// Last commit sha produced, when any.
    #[serde(default)]
    pub commit_sha: String,
    /// Files committed before any failure.
    #[serde(default)]
    pub updated_files: Vec<String>,
}

impl Default for PatchStatus {
    fn default() -> Self {
        Self::Deferred
    }
}

impl PatchResult {
    /// Builds a success result.
    #[must_use]
    pub fn success(commit_sha: String, updated_files: Vec<String>) -> Self {
        Self {
            status: PatchStatus::Success,
            reason: String::new(),
            commit_sha,
            updated_files,
        }
    }

    /// Builds a failed result with a reason.
    #[must_use]
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            status: PatchStatus::Failed,
            reason: reason.into(),
            commit_sha: String::new(),
            updated_files: Vec::new(),
        }
    }

    /// Builds a deferred result with a reason.
    #[must_use]
    pub fn deferred(reason: impl Into<String>) -> Self {
        Self {
            status: PatchStatus::Deferred,
            reason: reason.into(),
            commit_sha: String::new(),
            updated_files: Vec::new(),
        }
    }
}
