// crates/opsrunbook-review/src/lib.rs
// ============================================================================
// Module: OpsRunbook Review Library
// Description: Webhook ingress and the PR review fix pipeline.
// Purpose: Answer inbound review events with safe, bounded code patches.
// Dependencies: hmac, opsrunbook-core, regex, sha2, subtle
// ============================================================================

//! ## Overview
//! The inbound pathway: authenticated webhook ingress with delivery dedupe
//! and pause commands, a seven-step review cycle that grounds a
//! deterministic fix plan in fetched code context, and the all-or-nothing
//! safe-patch engine that commits it.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod context;
pub mod cycle;
pub mod host;
pub mod ingress;
pub mod patcher;
pub mod planner;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use context::CONTEXT_WINDOW;
pub use context::CodeContext;
pub use context::build_code_context;
pub use context::extract_file_targets;
pub use context::format_snippet;
pub use cycle::PrContext;
pub use cycle::ReviewConfig;
pub use cycle::ReviewDeps;
pub use cycle::ReviewOutcome;
pub use cycle::run_review_cycle;
pub use host::CommentRefs;
pub use host::FileAtRef;
pub use host::GithubRepoHost;
pub use host::HostError;
pub use host::InMemoryRepoHost;
pub use host::PrFile;
pub use host::PrInfo;
pub use host::RepoHost;
pub use ingress::DeliveryHeaders;
pub use ingress::IngressDeps;
pub use ingress::IngressError;
pub use ingress::IngressOutcome;
pub use ingress::ReviewDispatcher;
pub use ingress::handle_delivery;
pub use ingress::normalize_event;
pub use ingress::verify_signature;
pub use patcher::DEFAULT_MAX_BYTES;
pub use patcher::DEFAULT_MAX_FILES;
pub use patcher::apply_patch_plan;
pub use patcher::is_path_allowed;
pub use planner::infer_fix_from_comment;
pub use planner::make_unified_diff;
pub use planner::plan_fix;
