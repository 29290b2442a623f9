// crates/opsrunbook-review/tests/patcher.rs
// ============================================================================
// Module: Safe-Patch Engine Tests
// Description: Path policy, all-or-nothing validation, and diff application.
// Purpose: Ensure no mutation happens when any edit fails validation.
// Dependencies: opsrunbook-core, opsrunbook-review
// ============================================================================
//! ## Overview
//! Drives the patcher against the in-memory repo host, covering the
//! blocklist, the allowlist, strict diff verification, the instruction
//! fallback, and the file cap.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use opsrunbook_core::ChangeType;
use opsrunbook_core::DeliveryId;
use opsrunbook_core::PR_FIX_PLAN_SCHEMA;
use opsrunbook_core::PatchStatus;
use opsrunbook_core::PrFixPlan;
use opsrunbook_core::ProposedEdit;
use opsrunbook_core::RiskLevel;
use opsrunbook_review::InMemoryRepoHost;
use opsrunbook_review::apply_patch_plan;
use opsrunbook_review::is_path_allowed;

// ============================================================================
// SECTION: Fixtures
// ============================================================================

/// Builds a plan from edits.
fn plan(edits: Vec<ProposedEdit>) -> PrFixPlan {
    PrFixPlan {
        schema_version: PR_FIX_PLAN_SCHEMA.to_string(),
        delivery_id: DeliveryId::new("d-1"),
        pr_number: 7,
        repo_full_name: "org/repo".to_string(),
        summary: "test plan".to_string(),
        proposed_edits: edits,
        risk_level: RiskLevel::Low,
        requires_human: false,
        model_trace: None,
        created_at: None,
    }
}

/// Builds an instruction-only edit.
fn replace_edit(path: &str, old: &str, new: &str) -> ProposedEdit {
    ProposedEdit {
        file_path: path.to_string(),
        change_type: ChangeType::Edit,
        patch: String::new(),
        instructions: format!("replace \"{old}\" with \"{new}\""),
        rationale: String::new(),
        target_line: None,
        line_range: None,
        file_sha: None,
    }
}

/// Default allowlist used across tests.
fn allowed() -> Vec<String> {
    vec!["src/".to_string(), ".opsrunbook/".to_string(), "config/".to_string()]
}

/// Applies a plan with the default bounds.
fn apply(host: &InMemoryRepoHost, fix_plan: &PrFixPlan) -> opsrunbook_core::PatchResult {
    apply_patch_plan(
        host,
        "org",
        "repo",
        "feature",
        fix_plan,
        &DeliveryId::new("d-1"),
        &allowed(),
        5,
        204_800,
    )
}

// ============================================================================
// SECTION: Path Policy
// ============================================================================

/// Verifies the CI blocklist beats the allowlist.
#[test]
fn ci_paths_are_blocked() {
    assert!(!is_path_allowed(".github/workflows/deploy.yml", &[]));
    assert!(!is_path_allowed(".github/actions/setup/action.yml", &[]));
    assert!(!is_path_allowed(".circleci/config.yml", &[]));
    assert!(!is_path_allowed("Jenkinsfile", &[]));
    assert!(is_path_allowed("src/main.rs", &[]));
}

/// Verifies the allowlist restricts to configured prefixes.
#[test]
fn allowlist_restricts_prefixes() {
    let allowed = allowed();
    assert!(is_path_allowed("src/main.rs", &allowed));
    assert!(is_path_allowed(".opsrunbook/pr-notes/OPS-1.md", &allowed));
    assert!(!is_path_allowed("infra/deploy.sh", &allowed));
}

// ============================================================================
// SECTION: All-Or-Nothing Validation
// ============================================================================

/// Verifies one disallowed path fails the plan with zero mutations.
#[test]
fn disallowed_path_blocks_everything() {
    let host = InMemoryRepoHost::new();
    host.set_file("org", "repo", "src/main.py", "value = 1\n");

    let fix_plan = plan(vec![
        replace_edit("src/main.py", "value = 1", "value = 2"),
        replace_edit("infra/deploy.sh", "a", "b"),
    ]);
    let result = apply(&host, &fix_plan);

    assert_eq!(result.status, PatchStatus::Failed);
    assert!(result.reason.contains("path not allowed"));
    assert!(result.updated_files.is_empty());
    assert_eq!(host.file_text("org", "repo", "src/main.py").unwrap(), "value = 1\n");
}

/// Verifies a non-matching instruction fails before any commit.
#[test]
fn unmatched_instruction_fails_plan() {
    let host = InMemoryRepoHost::new();
    host.set_file("org", "repo", "src/a.py", "alpha\n");
    host.set_file("org", "repo", "src/b.py", "beta\n");

    let fix_plan = plan(vec![
        replace_edit("src/a.py", "alpha", "omega"),
        replace_edit("src/b.py", "missing-text", "anything"),
    ]);
    let result = apply(&host, &fix_plan);

    assert_eq!(result.status, PatchStatus::Failed);
    assert!(result.reason.contains("did not match"));
    assert_eq!(host.file_text("org", "repo", "src/a.py").unwrap(), "alpha\n");
}

/// Verifies the file cap fails oversized plans.
#[test]
fn too_many_files_fails() {
    let host = InMemoryRepoHost::new();
    let edits: Vec<ProposedEdit> =
        (0..6).map(|idx| replace_edit(&format!("src/f{idx}.py"), "a", "b")).collect();
    let result = apply(&host, &plan(edits));

    assert_eq!(result.status, PatchStatus::Failed);
    assert!(result.reason.contains("too many files"));
}

/// Verifies an empty plan defers.
#[test]
fn empty_plan_defers() {
    let host = InMemoryRepoHost::new();
    let result = apply(&host, &plan(Vec::new()));
    assert_eq!(result.status, PatchStatus::Deferred);
}

// ============================================================================
// SECTION: Application
// ============================================================================

/// Verifies instruction-based replacement commits exactly once.
#[test]
fn instruction_replacement_commits() {
    let host = InMemoryRepoHost::new();
    host.set_file("org", "repo", "src/main.py", "retries = 3\nretries = 3\n");

    let fix_plan = plan(vec![replace_edit("src/main.py", "retries = 3", "retries = 5")]);
    let result = apply(&host, &fix_plan);

    assert_eq!(result.status, PatchStatus::Success);
    assert_eq!(result.updated_files, vec!["src/main.py".to_string()]);
    assert!(!result.commit_sha.is_empty());
    assert_eq!(
        host.file_text("org", "repo", "src/main.py").unwrap(),
        "retries = 5\nretries = 3\n"
    );
}

/// Verifies a unified diff applies with strict context verification.
#[test]
fn unified_diff_applies() {
    let host = InMemoryRepoHost::new();
    host.set_file("org", "repo", "src/main.py", "one\ntwo\nthree\n");

    let mut edit = replace_edit("src/main.py", "", "");
    edit.instructions = String::new();
    edit.patch = "@@ -2,1 +2,1 @@\n-two\n+TWO".to_string();
    let result = apply(&host, &plan(vec![edit]));

    assert_eq!(result.status, PatchStatus::Success);
    assert_eq!(host.file_text("org", "repo", "src/main.py").unwrap(), "one\nTWO\nthree\n");
}

/// Verifies a mismatched diff context fails the plan.
#[test]
fn mismatched_diff_fails() {
    let host = InMemoryRepoHost::new();
    host.set_file("org", "repo", "src/main.py", "one\ntwo\nthree\n");

    let mut edit = replace_edit("src/main.py", "", "");
    edit.instructions = String::new();
    edit.patch = "@@ -2,1 +2,1 @@\n-NOT-THERE\n+TWO".to_string();
    let result = apply(&host, &plan(vec![edit]));

    assert_eq!(result.status, PatchStatus::Failed);
    assert_eq!(host.file_text("org", "repo", "src/main.py").unwrap(), "one\ntwo\nthree\n");
}

/// Verifies create-type edits write new files from instructions.
#[test]
fn create_edit_writes_new_file() {
    let host = InMemoryRepoHost::new();
    let edit = ProposedEdit {
        file_path: "src/NOTES.md".to_string(),
        change_type: ChangeType::Create,
        patch: String::new(),
        instructions: "# notes\n".to_string(),
        rationale: String::new(),
        target_line: None,
        line_range: None,
        file_sha: None,
    };
    let result = apply(&host, &plan(vec![edit]));

    assert_eq!(result.status, PatchStatus::Success);
    assert_eq!(host.file_text("org", "repo", "src/NOTES.md").unwrap(), "# notes\n");
}
