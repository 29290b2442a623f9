// crates/opsrunbook-review/src/patcher.rs
// ============================================================================
// Module: Safe-Patch Engine
// Description: All-or-nothing application of a fix plan to a PR branch.
// Purpose: Commit bounded, policy-checked edits with strict verification.
// Dependencies: opsrunbook-core, regex, crate::host
// ============================================================================

//! ## Overview
//! Two-phase apply. Phase one validates and prepares every edit without any
//! mutation: path blocklist and allowlist checks, file and result size caps,
//! and content computation via the unified-diff applier or the single
//! find/replace instruction. Any failure aborts the whole plan. Phase two
//! commits the prepared files sequentially and fails fast on the first
//! error, reporting the partial commit sha and updated files.
//!
//! Security posture: edit plans are derived from untrusted review comments;
//! the path policy is the write barrier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use opsrunbook_core::ChangeType;
use opsrunbook_core::DeliveryId;
use opsrunbook_core::PatchResult;
use opsrunbook_core::PrFixPlan;
use regex::Regex;

use crate::host::RepoHost;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Default maximum files one plan may touch.
pub const DEFAULT_MAX_FILES: usize = 5;
/// Default maximum bytes per patched file.
pub const DEFAULT_MAX_BYTES: usize = 204_800;

/// CI configuration paths that are never writable.
const BLOCKED_PATH_PATTERNS: [&str; 4] =
    [r"^\.github/workflows/", r"^\.github/actions/", r"^\.circleci/", r"^Jenkinsfile"];

// ============================================================================
// SECTION: Path Policy
// ============================================================================

/// Returns the compiled blocklist.
fn blocked_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        BLOCKED_PATH_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Returns true when a path passes the blocklist and allowlist.
#[must_use]
pub fn is_path_allowed(path: &str, allowed_paths: &[String]) -> bool {
    if blocked_patterns().iter().any(|pattern| pattern.is_match(path)) {
        return false;
    }
    let prefixes: Vec<&str> =
        allowed_paths.iter().map(|prefix| prefix.trim()).filter(|prefix| !prefix.is_empty()).collect();
    if prefixes.is_empty() {
        return true;
    }
    prefixes.iter().any(|prefix| path.starts_with(prefix))
}

// ============================================================================
// SECTION: Apply
// ============================================================================

/// One validated edit ready to commit.
struct PreparedEdit {
    /// Repository-relative path.
    path: String,
    /// Full new file content.
    content: String,
    /// Current file sha for edits; `None` for creates.
    file_sha: Option<String>,
}

/// Applies a fix plan to a branch with all-or-nothing semantics.
#[must_use]
pub fn apply_patch_plan(
    host: &dyn RepoHost,
    owner: &str,
    repo: &str,
    branch: &str,
    plan: &PrFixPlan,
    delivery_id: &DeliveryId,
    allowed_paths: &[String],
    max_files: usize,
    max_bytes: usize,
) -> PatchResult {
    let edits = &plan.proposed_edits;
    if edits.is_empty() {
        return PatchResult::deferred("no edits in plan");
    }
    if edits.len() > max_files {
        return PatchResult::failed(format!("too many files: {} > {max_files}", edits.len()));
    }

    // Phase 1: validate and prepare everything before any mutation.
    let mut prepared: Vec<PreparedEdit> = Vec::new();
    for edit in edits {
        if edit.file_path.is_empty() {
            return PatchResult::failed("empty file_path in edit");
        }
        if !is_path_allowed(&edit.file_path, allowed_paths) {
            return PatchResult::failed(format!("path not allowed: {}", edit.file_path));
        }
        match edit.change_type {
            ChangeType::Edit => {
                let current =
                    match host.get_file_at_ref(owner, repo, &edit.file_path, branch) {
                        Ok(file) => file,
                        Err(err) => {
                            return PatchResult::failed(format!(
                                "cannot fetch {}: {err}",
                                edit.file_path
                            ));
                        }
                    };
                if current.text.len() > max_bytes {
                    return PatchResult::failed(format!("file too large: {}", edit.file_path));
                }
                let mut new_content: Option<String> = None;
                if !edit.patch.is_empty() {
                    new_content = try_apply_patch(&current.text, &edit.patch);
                }
                if new_content.is_none() && !edit.instructions.is_empty() {
                    new_content = apply_instructions(&current.text, &edit.instructions);
                }
                let Some(content) = new_content else {
                    return PatchResult::failed(format!(
                        "could not apply edit to {}: patch/instructions did not match",
                        edit.file_path
                    ));
                };
                if content.len() > max_bytes {
                    return PatchResult::failed(format!("result too large: {}", edit.file_path));
                }
                prepared.push(PreparedEdit {
                    path: edit.file_path.clone(),
                    content,
                    file_sha: Some(current.sha),
                });
            }
            ChangeType::Create => {
                let content = if edit.patch.is_empty() {
                    edit.instructions.clone()
                } else {
                    edit.patch.clone()
                };
                if content.len() > max_bytes {
                    return PatchResult::failed(format!("new file too large: {}", edit.file_path));
                }
                prepared.push(PreparedEdit {
                    path: edit.file_path.clone(),
                    content,
                    file_sha: None,
                });
            }
        }
    }

    // Phase 2: sequential commits; fail fast with the partial state.
    let commit_message = format!("OpsRunbook: address review feedback (delivery {delivery_id})");
    let mut last_sha = String::new();
    let mut updated_files: Vec<String> = Vec::new();
    for edit in prepared {
        match host.put_file(
            owner,
            repo,
            &edit.path,
            &edit.content,
            &commit_message,
            branch,
            edit.file_sha.as_deref(),
        ) {
            Ok(sha) => {
                last_sha = sha;
                updated_files.push(edit.path);
            }
            Err(err) => {
                return PatchResult {
                    status: opsrunbook_core::PatchStatus::Failed,
                    reason: format!("commit failed for {}: {err}", edit.path),
                    commit_sha: last_sha,
                    updated_files,
                };
            }
        }
    }

    PatchResult::success(last_sha, updated_files)
}

// ============================================================================
// SECTION: Content DSL
// ============================================================================

/// Applies a unified diff hunk-by-hunk with strict context verification.
///
/// Any removal line that does not match the current content fails the whole
/// patch; a patch that produces no change is also a failure.
#[must_use]
pub fn try_apply_patch(original: &str, patch: &str) -> Option<String> {
    let hunk_header = Regex::new(r"^@@ -(\d+)(?:,(\d+))? \+(\d+)(?:,(\d+))? @@").ok()?;
    let lines: Vec<String> = original.split('\n').map(str::to_string).collect();
    let mut result_lines = lines;
    let patch_lines: Vec<&str> = patch.trim().split('\n').collect();

    let mut offset: i64 = 0;
    let mut index = 0;
    while index < patch_lines.len() {
        let Some(capture) = hunk_header.captures(patch_lines[index]) else {
            index += 1;
            continue;
        };
        let old_start: usize = capture.get(1)?.as_str().parse::<usize>().ok()?.saturating_sub(1);
        index += 1;

        let mut removals: Vec<&str> = Vec::new();
        let mut additions: Vec<&str> = Vec::new();
        while index < patch_lines.len() {
            let line = patch_lines[index];
            if line.starts_with("@@")
                || line.starts_with("diff ")
                || line.starts_with("---")
                || line.starts_with("+++")
            {
                break;
            }
            if let Some(removed) = line.strip_prefix('-') {
                removals.push(removed);
            } else if let Some(added) = line.strip_prefix('+') {
                additions.push(added);
            } else if line.starts_with(' ') && (!removals.is_empty() || !additions.is_empty()) {
                break;
            }
            index += 1;
        }

        let base = usize::try_from(i64::try_from(old_start).ok()? + offset).ok()?;
        if base + removals.len() > result_lines.len() {
            return None;
        }
        for (position, removed) in removals.iter().enumerate() {
            if result_lines[base + position].trim_end() != removed.trim_end() {
                return None;
            }
        }
        result_lines.splice(base..base + removals.len(), additions.iter().map(|s| (*s).to_string()));
        offset += i64::try_from(additions.len()).ok()? - i64::try_from(removals.len()).ok()?;
    }

    let result = result_lines.join("\n");
    if result == original {
        return None;
    }
    Some(result)
}

/// Applies a `replace "X" with "Y"` instruction exactly once.
#[must_use]
pub fn apply_instructions(original: &str, instructions: &str) -> Option<String> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    let pattern = PATTERN
        .get_or_init(|| {
            Regex::new(r#"(?i)replace\s+['"](.+?)['"]\s+with\s+['"](.+?)['"]"#).ok()
        })
        .as_ref()?;
    let capture = pattern.captures(instructions)?;
    let old_text = capture.get(1)?.as_str();
    let new_text = capture.get(2)?.as_str();
    if !original.contains(old_text) {
        return None;
    }
    Some(original.replacen(old_text, new_text, 1))
}
