// crates/opsrunbook-review/src/context.rs
// ============================================================================
// Module: Code Context Builder
// Description: Windowed, numbered snippets around a (path, line) target.
// Purpose: Ground fix plans in the code the review comment points at.
// Dependencies: opsrunbook-core, regex
// ============================================================================

//! ## Overview
//! Given a file's text and a 1-based target line, the builder extracts a
//! window of lines above and below the target and formats them with
//! right-aligned line-number prefixes (`42 | code`). File/line targets come
//! from the inline comment context first, then from `path:line` references in
//! the comment text.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::OnceLock;

use opsrunbook_core::PrReviewEvent;
use regex::Regex;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Context lines above and below the target.
pub const CONTEXT_WINDOW: usize = 20;
/// Maximum file/line targets extracted from one event.
pub const MAX_FILE_TARGETS: usize = 5;

// ============================================================================
// SECTION: Code Context
// ============================================================================

/// A windowed, numbered snippet around one target line.
///
/// # Invariants
/// - `start_line <= target_line <= end_line`, all 1-based.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeContext {
    /// File path relative to the repository root.
    pub path: String,
    /// Ref the file was fetched at.
    pub ref_name: String,
    /// File content sha at fetch time.
    pub file_sha: String,
    /// 1-based target line.
    pub target_line: u32,
    /// 1-based first snippet line.
    pub start_line: u32,
    /// 1-based last snippet line.
    pub end_line: u32,
    /// Numbered snippet text.
    pub snippet: String,
    /// Total line count of the file.
    pub total_lines: u32,
    /// File size in bytes.
    pub byte_size: usize,
}

/// Builds a context from already-loaded file text.
#[must_use]
pub fn build_code_context(
    text: &str,
    path: &str,
    ref_name: &str,
    file_sha: &str,
    line: u32,
    window: usize,
) -> CodeContext {
    let all_lines: Vec<&str> = text.split('\n').collect();
    let total = all_lines.len().max(1);
    let target = usize::try_from(line).unwrap_or(1).clamp(1, total);
    let start = target.saturating_sub(window).max(1);
    let end = (target + window).min(total);

    let selected = &all_lines[start - 1..end];
    let as_u32 = |value: usize| u32::try_from(value).unwrap_or(u32::MAX);
    CodeContext {
        path: path.to_string(),
        ref_name: ref_name.to_string(),
        file_sha: file_sha.to_string(),
        target_line: as_u32(target),
        start_line: as_u32(start),
        end_line: as_u32(end),
        snippet: format_snippet(selected, start),
        total_lines: as_u32(total),
        byte_size: text.len(),
    }
}

/// Formats lines with right-aligned line-number prefixes.
#[must_use]
pub fn format_snippet(lines: &[&str], start_line: usize) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let last = start_line + lines.len() - 1;
    let width = last.to_string().len();
    lines
        .iter()
        .enumerate()
        .map(|(offset, content)| format!("{:>width$} | {content}", start_line + offset))
        .collect::<Vec<String>>()
        .join("\n")
}

// ============================================================================
// SECTION: Target Extraction
// ============================================================================

/// Compiled target-extraction patterns.
struct TargetPatterns {
    /// `path:line` or `path line N` references.
    with_line: Regex,
    /// Bare file path references.
    bare: Regex,
}

/// Returns the lazily compiled target patterns.
fn target_patterns() -> Option<&'static TargetPatterns> {
    static PATTERNS: OnceLock<Option<TargetPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(TargetPatterns {
                with_line: Regex::new(r"([\w./_-]+\.\w+)(?::(\d+)|\s+line\s+(\d+))").ok()?,
                bare: Regex::new(r"([\w./_-]+\.\w+)").ok()?,
            })
        })
        .as_ref()
}

/// Pulls `(file_path, line)` pairs from a normalized event.
///
/// Priority: the inline comment context, then `path:line` references in the
/// comment body, then bare file paths defaulting to line one.
#[must_use]
pub fn extract_file_targets(event: &PrReviewEvent) -> Vec<(String, u32)> {
    if let Some(inline) = &event.inline_context
        && !inline.path.is_empty()
        && let Some(line) = inline.line.or(inline.original_line)
    {
        return vec![(inline.path.clone(), line)];
    }

    let Some(patterns) = target_patterns() else {
        return Vec::new();
    };
    let mut targets: Vec<(String, u32)> = Vec::new();
    for capture in patterns.with_line.captures_iter(&event.comment_body) {
        let path = capture.get(1).map_or("", |group| group.as_str()).to_string();
        let line = capture
            .get(2)
            .or_else(|| capture.get(3))
            .and_then(|group| group.as_str().parse().ok())
            .unwrap_or(1);
        targets.push((path, line));
    }
    if targets.is_empty() {
        for capture in patterns.bare.captures_iter(&event.comment_body) {
            let path = capture.get(1).map_or("", |group| group.as_str()).to_string();
            targets.push((path, 1));
        }
    }
    targets.truncate(MAX_FILE_TARGETS);
    targets
}
