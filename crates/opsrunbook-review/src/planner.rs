// crates/opsrunbook-review/src/planner.rs
// ============================================================================
// Module: Fix Planner
// Description: Deterministic fix planning from review-comment patterns.
// Purpose: Turn a comment plus code context into a bounded, risk-rated plan.
// Dependencies: opsrunbook-core, regex, crate::context
// ============================================================================

//! ## Overview
//! No hosted model runs here: the planner recognizes explicit replace
//! patterns in the comment (`replace "X" with "Y"`, `change "X" to "Y"`,
//! `typo: X should be Y`) and, when code context is available, builds a
//! minimal unified-diff hunk targeting the real file line derived from the
//! snippet's number prefixes. Risk classification: context plus patch is
//! low and auto-applies; context without a patch is medium; anything
//! ungrounded is high. Medium and high always require a human.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use opsrunbook_core::ChangeType;
use opsrunbook_core::PR_FIX_PLAN_SCHEMA;
use opsrunbook_core::PrFixPlan;
use opsrunbook_core::PrReviewEvent;
use opsrunbook_core::ProposedEdit;
use opsrunbook_core::RiskLevel;
use opsrunbook_core::now_rfc3339;
use regex::Regex;
use serde_json::json;

use crate::context::CodeContext;
use crate::context::extract_file_targets;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Context radius assumed when no fetched snippet anchors the line.
const FALLBACK_WINDOW: u32 = 20;

// ============================================================================
// SECTION: Patterns
// ============================================================================

/// Compiled fix-comment patterns.
struct FixPatterns {
    /// `replace "X" with "Y"` / `change "X" to "Y"`.
    replace: Regex,
    /// `typo: X should be Y` / `fix spelling of X to Y`.
    typo: Regex,
}

/// Returns the lazily compiled fix patterns.
fn fix_patterns() -> Option<&'static FixPatterns> {
    static PATTERNS: OnceLock<Option<FixPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(FixPatterns {
                replace: Regex::new(
                    r#"(?i)(?:replace|change)\s+['"](.+?)['"]\s+(?:with|to)\s+['"](.+?)['"]"#,
                )
                .ok()?,
                typo: Regex::new(
                    r#"(?i)(?:fix\s+spelling\s+(?:of\s+)?|typo:\s*)['"]?(\w+)['"]?\s+(?:should\s+be|to|->)\s+['"]?(\w+)['"]?"#,
                )
                .ok()?,
            })
        })
        .as_ref()
}

// ============================================================================
// SECTION: Planning
// ============================================================================

/// Builds the deterministic fix plan for one event.
#[must_use]
pub fn plan_fix(event: &PrReviewEvent, code_contexts: &[CodeContext]) -> PrFixPlan {
    let comment = event.comment_body.as_str();
    let mut proposed_edits: Vec<ProposedEdit> = Vec::new();
    let has_context = !code_contexts.is_empty();

    for context in code_contexts {
        let (patch, instructions) =
            infer_fix_from_comment(comment, &context.snippet, context.target_line);
        let rationale = format!(
            "Review comment on line {}: \"{}\"\nCode at lines {}-{}:\n{}",
            context.target_line,
            truncate(comment, 200),
            context.start_line,
            context.end_line,
            truncate(&context.snippet, 1000)
        );
        proposed_edits.push(ProposedEdit {
            file_path: context.path.clone(),
            change_type: ChangeType::Edit,
            patch,
            instructions,
            rationale,
            target_line: Some(context.target_line),
            line_range: Some([context.start_line, context.end_line]),
            file_sha: Some(context.file_sha.clone()),
        });
    }

    if !has_context
        && let Some(inline) = &event.inline_context
        && !inline.path.is_empty()
    {
        let target_line = inline.line.or(inline.original_line).unwrap_or(1);
        let (patch, instructions) =
            infer_fix_from_comment(comment, &inline.diff_hunk, target_line);
        proposed_edits.push(ProposedEdit {
            file_path: inline.path.clone(),
            change_type: ChangeType::Edit,
            patch,
            instructions,
            rationale: format!(
                "Inline review comment on {}:{target_line}: \"{}\"\nDiff hunk:\n{}",
                inline.path,
                truncate(comment, 200),
                truncate(&inline.diff_hunk, 800)
            ),
            target_line: Some(target_line),
            line_range: Some(fallback_range(target_line)),
            file_sha: None,
        });
    }

    if proposed_edits.is_empty() && !comment.is_empty() {
        for (path, line) in extract_file_targets(event).into_iter().take(3) {
            proposed_edits.push(ProposedEdit {
                file_path: path.clone(),
                change_type: ChangeType::Edit,
                patch: String::new(),
                instructions: format!(
                    "Address feedback at line {line}: {}",
                    truncate(comment, 300)
                ),
                rationale: format!("File {path}:{line} referenced in comment"),
                target_line: Some(line),
                line_range: Some(fallback_range(line)),
                file_sha: None,
            });
        }
    }

    let has_patch = proposed_edits.iter().any(|edit| !edit.patch.is_empty());
    let (risk_level, requires_human) = if has_patch && has_context {
        (RiskLevel::Low, false)
    } else if has_context {
        (RiskLevel::Medium, true)
    } else if proposed_edits.is_empty() {
        (RiskLevel::High, true)
    } else {
        (RiskLevel::Medium, true)
    };

    PrFixPlan {
        schema_version: PR_FIX_PLAN_SCHEMA.to_string(),
        delivery_id: event.delivery_id.clone(),
        pr_number: event.pr_number.unwrap_or_default(),
        repo_full_name: event.repo_full_name.clone(),
        summary: build_plan_summary(&proposed_edits, has_context, comment),
        proposed_edits,
        risk_level,
        requires_human,
        model_trace: Some(json!({
            "provider": "stub",
            "model": null,
            "code_contexts_used": code_contexts.len(),
            "created_at": now_rfc3339(),
        })),
        created_at: Some(now_rfc3339()),
    }
}

/// Returns the symmetric fallback context range around one line.
fn fallback_range(line: u32) -> [u32; 2] {
    [line.saturating_sub(FALLBACK_WINDOW).max(1), line + FALLBACK_WINDOW]
}

// ============================================================================
// SECTION: Fix Inference
// ============================================================================

/// Infers a deterministic fix from common review comment patterns.
///
/// Returns `(patch, instructions)`; the patch is empty when no hunk could be
/// built against the snippet.
#[must_use]
pub fn infer_fix_from_comment(comment: &str, snippet: &str, target_line: u32) -> (String, String) {
    let Some(patterns) = fix_patterns() else {
        return (String::new(), format!("Address review feedback: {}", truncate(comment, 500)));
    };
    let replacement = patterns
        .replace
        .captures(comment)
        .or_else(|| patterns.typo.captures(comment))
        .and_then(|capture| {
            let old = capture.get(1)?.as_str().to_string();
            let new = capture.get(2)?.as_str().to_string();
            Some((old, new))
        });
    match replacement {
        Some((old, new)) => {
            let patch = make_unified_diff(snippet, &old, &new, target_line);
            (patch, format!("replace \"{old}\" with \"{new}\""))
        }
        None => (String::new(), format!("Address review feedback: {}", truncate(comment, 500))),
    }
}

/// Produces a minimal one-line unified-diff hunk from a find/replace.
///
/// The snippet may carry `N | ` number prefixes; they are stripped before
/// searching, and the first prefix anchors the real file line.
#[must_use]
pub fn make_unified_diff(snippet: &str, old_text: &str, new_text: &str, target_line: u32) -> String {
    let mut raw_lines: Vec<String> = Vec::new();
    let mut first_number: Option<u32> = None;
    for (index, line) in snippet.split('\n').enumerate() {
        match split_numbered_line(line) {
            Some((number, content)) => {
                if index == 0 {
                    first_number = Some(number);
                }
                raw_lines.push(content.to_string());
            }
            None => raw_lines.push(line.to_string()),
        }
    }

    let Some(match_index) = raw_lines.iter().position(|line| line.contains(old_text)) else {
        return String::new();
    };
    let old_line = &raw_lines[match_index];
    let new_line = old_line.replacen(old_text, new_text, 1);
    let base = first_number
        .unwrap_or_else(|| target_line.saturating_sub(FALLBACK_WINDOW).max(1));
    let file_line = base + u32::try_from(match_index).unwrap_or(0);

    format!("@@ -{file_line},1 +{file_line},1 @@\n-{old_line}\n+{new_line}")
}

/// Splits a `N | content` snippet line into its number and content.
fn split_numbered_line(line: &str) -> Option<(u32, &str)> {
    let (prefix, content) = line.split_once(" | ")?;
    prefix.trim().parse().ok().map(|number| (number, content))
}

// ============================================================================
// SECTION: Summaries
// ============================================================================

/// Builds the one-line plan summary.
fn build_plan_summary(edits: &[ProposedEdit], has_context: bool, comment: &str) -> String {
    let count = edits.len();
    let files: Vec<&str> = edits.iter().take(3).map(|edit| edit.file_path.as_str()).collect();
    let files = files.join(", ");
    let has_patch = edits.iter().any(|edit| !edit.patch.is_empty());

    if has_context && has_patch {
        return format!("Context-grounded fix for {count} file(s) [{files}] with auto-generated patch");
    }
    if has_context {
        return format!("Code context extracted for {count} file(s) [{files}]; manual patch needed");
    }
    if count > 0 {
        return format!("{count} file(s) referenced in feedback [{files}]");
    }
    format!("No file targets identified from comment: \"{}\"", truncate(comment, 80))
}

/// Truncates text to a character budget.
fn truncate(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}
