// crates/opsrunbook-review/src/cycle.rs
// ============================================================================
// Module: PR Review Cycle
// Description: Seven-step inline state machine for one webhook delivery.
// Purpose: Load context, plan a fix, apply it safely, and record the outcome.
// Dependencies: opsrunbook-core, serde_json, crate::{context, host, patcher, planner}
// ============================================================================

//! ## Overview
//! Steps in order: load PR context, guardrails, persist the review packet,
//! plan the fix, apply it through the safe-patch engine, post the outcome
//! comment, persist the outcome record. Guardrails only proceed for PRs the
//! copilot owns (marker label, body marker, or bot author) and always abort
//! for bot senders to prevent loops. A plan that requires a human defers
//! without touching the source-control host.

// ============================================================================
// SECTION: Imports
// ============================================================================

use opsrunbook_core::ObjectStore;
use opsrunbook_core::PR_REVIEW_PACKET_SCHEMA;
use opsrunbook_core::PatchResult;
use opsrunbook_core::PatchStatus;
use opsrunbook_core::PrFixPlan;
use opsrunbook_core::PrReviewEvent;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use opsrunbook_core::RiskLevel;
use opsrunbook_core::hashing::canonical_bytes_and_sha;
use opsrunbook_core::now_rfc3339;
use opsrunbook_core::records::pk_pr_review;
use opsrunbook_core::records::sk_review_outcome;
use serde::Deserialize;
use serde::Serialize;
use serde_json::json;

use crate::context::CONTEXT_WINDOW;
use crate::context::CodeContext;
use crate::context::build_code_context;
use crate::context::extract_file_targets;
use crate::host::RepoHost;
use crate::patcher::apply_patch_plan;
use crate::planner::plan_fix;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Marker label/body token identifying copilot-owned PRs.
const COPILOT_MARKER: &str = "opsrunbook_copilot";
/// Marker label identifying copilot-owned PRs.
const COPILOT_LABEL: &str = "opsrunbook-copilot";
/// Stop command aborting the cycle.
const STOP_COMMAND: &str = "/copilot stop";
/// Maximum changed files captured in the context.
const MAX_CONTEXT_FILES: usize = 20;
/// Patch excerpt cap per captured file.
const MAX_FILE_PATCH: usize = 3000;
/// PR body cap in the captured context.
const MAX_PR_BODY: usize = 4000;
/// Maximum code contexts fetched per event.
const MAX_CODE_CONTEXTS: usize = 3;

// ============================================================================
// SECTION: Configuration
// ============================================================================

/// Review cycle configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewConfig {
    /// Bot slug for guardrail checks.
    pub bot_slug: String,
    /// Patcher path allowlist.
    pub allowed_paths: Vec<String>,
    /// Maximum files one plan may touch.
    pub max_files: usize,
    /// Maximum bytes per patched file.
    pub max_bytes: usize,
    /// Bucket review packets are persisted under.
    pub evidence_bucket: String,
}

/// Downstream surfaces the cycle operates through.
pub struct ReviewDeps<'a> {
    /// Source-control host.
    pub host: &'a dyn RepoHost,
    /// Object store for review packets.
    pub store: &'a dyn ObjectStore,
    /// Record store for outcome rows.
    pub records: &'a dyn RecordStore,
    /// Cycle configuration.
    pub config: &'a ReviewConfig,
}

// ============================================================================
// SECTION: Context Types
// ============================================================================

/// One changed file captured into the review packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextFile {
    /// File path.
    pub filename: String,
    /// Change status.
    pub status: String,
    /// Patch excerpt.
    pub patch: String,
}

/// Captured PR context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrContext {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Pull request number.
    pub pr_number: u64,
    /// PR title.
    pub title: String,
    /// PR body (truncated).
    pub body: String,
    /// PR state.
    pub state: String,
    /// Head branch name.
    pub head_ref: String,
    /// Head commit sha.
    pub head_sha: String,
    /// Base branch name.
    pub base_ref: String,
    /// Label names.
    pub labels: Vec<String>,
    /// PR author login.
    pub user_login: String,
    /// Changed files (bounded).
    pub files: Vec<ContextFile>,
    /// Fetched code contexts (bounded).
    pub code_contexts: Vec<CodeContext>,
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Final outcome of one review cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReviewOutcome {
    /// Outcome status (`success`, `failed`, `deferred`, `aborted`).
    pub status: String,
    /// Abort or failure reason, when any.
    pub reason: String,
    /// Commit sha when a fix was applied.
    pub commit_sha: String,
    /// Files committed by the apply step.
    pub updated_files: Vec<String>,
    /// URL of the posted outcome comment, when any.
    pub comment_url: String,
}

impl ReviewOutcome {
    /// Builds an aborted outcome.
    fn aborted(reason: &str) -> Self {
        Self {
            status: "aborted".to_string(),
            reason: reason.to_string(),
            commit_sha: String::new(),
            updated_files: Vec::new(),
            comment_url: String::new(),
        }
    }
}

// ============================================================================
// SECTION: Cycle
// ============================================================================

/// Runs the seven-step review cycle for one normalized event.
#[must_use]
pub fn run_review_cycle(event: &PrReviewEvent, deps: &ReviewDeps<'_>) -> ReviewOutcome {
    // Step 1: LoadPRContext.
    let Some(pr_number) = event.pr_number else {
        return persist_outcome(event, deps, ReviewOutcome::aborted("event carries no pr_number"));
    };
    let (owner, repo) = match event.repo_full_name.split_once('/') {
        Some((owner, repo)) => (owner.to_string(), repo.to_string()),
        None => {
            return persist_outcome(
                event,
                deps,
                ReviewOutcome::aborted("repo_full_name is not owner/name"),
            );
        }
    };
    let pr_context = match load_pr_context(event, deps, &owner, &repo, pr_number) {
        Ok(context) => context,
        Err(reason) => return persist_outcome(event, deps, ReviewOutcome::aborted(&reason)),
    };

    // Step 2: Guardrails.
    if let Some(reason) = guardrail_block(event, &pr_context, &deps.config.bot_slug) {
        tracing::info!(delivery_id = %event.delivery_id, reason, "review cycle guardrail abort");
        return persist_outcome(event, deps, ReviewOutcome::aborted(&reason));
    }

    // Step 3: BuildReviewPacket.
    if let Err(err) = persist_review_packet(event, deps, &pr_context) {
        return persist_outcome(event, deps, ReviewOutcome::aborted(&err));
    }

    // Step 4: Plan the fix deterministically.
    let plan = plan_fix(event, &pr_context.code_contexts);

    // Step 5: ApplyFixSafely.
    let apply_result = if plan.requires_human || plan.risk_level == RiskLevel::High {
        PatchResult::deferred("requires_human or high risk")
    } else {
        apply_patch_plan(
            deps.host,
            &owner,
            &repo,
            &pr_context.head_ref,
            &plan,
            &event.delivery_id,
            &deps.config.allowed_paths,
            deps.config.max_files,
            deps.config.max_bytes,
        )
    };

    // Step 6: PostPRComment.
    let comment = outcome_comment(event, &plan, &apply_result);
    let comment_url = match deps.host.post_comment(&owner, &repo, pr_number, &comment) {
        Ok(refs) => refs.url,
        Err(err) => {
            tracing::warn!(delivery_id = %event.delivery_id, error = %err, "outcome comment failed");
            String::new()
        }
    };

    // Step 7: PersistOutcome.
    persist_outcome(
        event,
        deps,
        ReviewOutcome {
            status: apply_result.status.as_str().to_string(),
            reason: apply_result.reason,
            commit_sha: apply_result.commit_sha,
            updated_files: apply_result.updated_files,
            comment_url,
        },
    )
}

// ============================================================================
// SECTION: Step Helpers
// ============================================================================

/// Loads PR metadata, changed files, and bounded code contexts.
fn load_pr_context(
    event: &PrReviewEvent,
    deps: &ReviewDeps<'_>,
    owner: &str,
    repo: &str,
    pr_number: u64,
) -> Result<PrContext, String> {
    let info = deps
        .host
        .get_pr(owner, repo, pr_number)
        .map_err(|err| format!("pr load failed: {err}"))?;
    let files = deps
        .host
        .get_pr_files(owner, repo, pr_number)
        .map_err(|err| format!("pr file listing failed: {err}"))?;

    let mut code_contexts: Vec<CodeContext> = Vec::new();
    for (path, line) in extract_file_targets(event).into_iter().take(MAX_CODE_CONTEXTS) {
        match deps.host.get_file_at_ref(owner, repo, &path, &info.head_ref) {
            Ok(file) => {
                code_contexts.push(build_code_context(
                    &file.text,
                    &path,
                    &info.head_ref,
                    &file.sha,
                    line,
                    CONTEXT_WINDOW,
                ));
            }
            Err(err) => {
                tracing::warn!(path, line, error = %err, "code context fetch failed");
            }
        }
    }

    Ok(PrContext {
        owner: owner.to_string(),
        repo: repo.to_string(),
        pr_number,
        title: info.title,
        body: info.body.chars().take(MAX_PR_BODY).collect(),
        state: info.state,
        head_ref: info.head_ref,
        head_sha: info.head_sha,
        base_ref: info.base_ref,
        labels: info.labels,
        user_login: info.user_login,
        files: files
            .into_iter()
            .take(MAX_CONTEXT_FILES)
            .map(|file| ContextFile {
                filename: file.filename,
                status: file.status,
                patch: file.patch.chars().take(MAX_FILE_PATCH).collect(),
            })
            .collect(),
        code_contexts,
    })
}

/// Returns the blocking reason when the guardrails refuse to proceed.
fn guardrail_block(event: &PrReviewEvent, context: &PrContext, bot_slug: &str) -> Option<String> {
    let body = context.body.to_lowercase();
    let author = context.user_login.to_lowercase();
    let labels: Vec<String> = context.labels.iter().map(|label| label.to_lowercase()).collect();
    let is_ours = labels.iter().any(|label| label == COPILOT_LABEL)
        || body.contains(COPILOT_MARKER)
        || author.contains(&bot_slug.to_lowercase())
        || author.ends_with("[bot]");
    if !is_ours {
        return Some("PR not created by opsrunbook-copilot".to_string());
    }

    let sender = event.sender_login.to_lowercase();
    if sender.ends_with("[bot]") || sender == bot_slug.to_lowercase() {
        return Some("sender is bot itself".to_string());
    }

    if event.comment_body.to_lowercase().contains(STOP_COMMAND) {
        return Some("stop command received".to_string());
    }
    None
}

/// Persists the normalized review packet to the object store.
fn persist_review_packet(
    event: &PrReviewEvent,
    deps: &ReviewDeps<'_>,
    context: &PrContext,
) -> Result<(), String> {
    let packet = json!({
        "schema_version": PR_REVIEW_PACKET_SCHEMA,
        "delivery_id": event.delivery_id,
        "event": event,
        "pr_context": context,
        "created_at": now_rfc3339(),
    });
    let (bytes, _sha) = canonical_bytes_and_sha(&packet).map_err(|err| err.to_string())?;
    let key = format!(
        "pr_review_packets/{}/{}/{}.json",
        context.owner, context.repo, event.delivery_id
    );
    deps.store
        .put(&deps.config.evidence_bucket, &key, bytes)
        .map_err(|err| format!("review packet persist failed: {err}"))
}

/// Builds the fixed-template outcome comment.
fn outcome_comment(event: &PrReviewEvent, plan: &PrFixPlan, result: &PatchResult) -> String {
    let delivery = event.delivery_id.as_str();
    let short: String = delivery.chars().take(12).collect();
    let mut lines: Vec<String> =
        vec![format!("**OpsRunbook Copilot** — review response `{short}`"), String::new()];

    match result.status {
        PatchStatus::Success => {
            let sha: String = result.commit_sha.chars().take(12).collect();
            lines.push(format!("Applied fix in commit `{sha}`"));
            for file in &result.updated_files {
                lines.push(format!("- `{file}`"));
            }
            lines.push(String::new());
            lines.push("Please verify the changes and re-review.".to_string());
        }
        PatchStatus::Deferred => {
            lines.push(
                "This change requires human review. The fix plan has been recorded but no code was pushed."
                    .to_string(),
            );
            if !plan.summary.is_empty() {
                lines.push(String::new());
                lines.push(format!("> {}", plan.summary));
            }
            if !plan.proposed_edits.is_empty() {
                lines.push(String::new());
                lines.push("**Files referenced:**".to_string());
                for edit in plan.proposed_edits.iter().take(5) {
                    let rationale: String = edit.rationale.chars().take(100).collect();
                    lines.push(format!("- `{}`: {rationale}", edit.file_path));
                }
            }
        }
        PatchStatus::Failed => {
            lines.push(format!("Status: `failed` — {}", result.reason));
        }
    }

    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(format!("_delivery: {delivery}_"));
    lines.join("\n")
}

/// Writes the outcome record and returns the outcome unchanged.
fn persist_outcome(
    event: &PrReviewEvent,
    deps: &ReviewDeps<'_>,
    outcome: ReviewOutcome,
) -> ReviewOutcome {
    let created_at = now_rfc3339();
    let pk = pk_pr_review(&event.repo_full_name, event.pr_number.unwrap_or_default());
    let sk = sk_review_outcome(&created_at, &event.delivery_id);
    let mut fields = serde_json::Map::new();
    fields.insert("delivery_id".to_string(), json!(event.delivery_id));
    fields.insert("action_type".to_string(), json!("respond_to_pr_review"));
    fields.insert("status".to_string(), json!(outcome.status));
    fields.insert("reason".to_string(), json!(outcome.reason));
    fields.insert("commit_sha".to_string(), json!(outcome.commit_sha));
    fields.insert("comment_url".to_string(), json!(outcome.comment_url));
    fields.insert("created_at".to_string(), json!(created_at));
    if let Err(err) = deps.records.put(&Record::new(pk, sk, fields)) {
        tracing::warn!(delivery_id = %event.delivery_id, error = %err, "outcome record failed");
    }
    outcome
}
