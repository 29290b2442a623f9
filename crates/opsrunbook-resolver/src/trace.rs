// crates/opsrunbook-resolver/src/trace.rs
// ============================================================================
// Module: Trace Parser
// Description: Stack frame extraction and path normalization.
// Purpose: Turn free-form failure text into bounded application frames.
// Dependencies: opsrunbook-core, regex
// ============================================================================

//! ## Overview
//! Two primary patterns cover the common interpreter and runtime stack
//! formats; a generic `path:line` fallback catches the rest only when the
//! primaries matched nothing. Normalization strips a fixed list of runtime
//! prefixes, noise frames (dependency directories, synthetic modules) are
//! filtered out, and frames deduplicate on `(normalized_path, line)`. At
//! most five application frames are returned.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::sync::OnceLock;

use opsrunbook_core::TraceFrame;
use regex::Regex;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum application frames returned.
pub const MAX_APP_FRAMES: usize = 5;

/// Literal runtime prefixes stripped from raw paths.
const STRIP_PREFIXES: [&str; 5] =
    ["/var/task/", "/usr/src/app/", "/app/", "/opt/python/", "/opt/"];

/// Regex runtime prefixes stripped from raw paths.
const STRIP_PREFIX_PATTERNS: [&str; 2] =
    [r"^/home/runner/work/[^/]+/[^/]+/", r"^/tmp/[a-f0-9-]+/"];

/// Noise substrings that disqualify a frame.
const NOISE_PATTERNS: [&str; 11] = [
    r"site-packages/",
    r"node_modules/",
    r"\.venv/",
    r"dist-packages/",
    r"<frozen ",
    r"<string>",
    r"<module>",
    r"importlib",
    r"_bootstrap",
    r"__pycache__",
    r"lib/python\d",
];

// ============================================================================
// SECTION: Compiled Patterns
// ============================================================================

/// Compiled parser patterns, built once.
struct Patterns {
    /// Interpreter-style frames: `File "<path>", line <n>, in <fn>`.
    python: Regex,
    /// Runtime-style frames: `at fn (<path>:<line>:<col>)`.
    node: Regex,
    /// Generic `<path>:<line>` fallback.
    generic: Regex,
    /// Prefix-stripping regexes.
    strip: Vec<Regex>,
    /// Noise-detection regexes.
    noise: Vec<Regex>,
}

/// Returns the lazily compiled pattern set.
fn patterns() -> Option<&'static Patterns> {
    static PATTERNS: OnceLock<Option<Patterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(Patterns {
                python: Regex::new(r#"File "([^"]+)",\s+line (\d+)(?:,\s+in (\S+))?"#).ok()?,
                node: Regex::new(r"at\s+(?:(\S+)\s+)?\(?([^():\s]+):(\d+):(\d+)\)?").ok()?,
                generic: Regex::new(r"([\w./_-]+\.\w{1,5}):(\d+)").ok()?,
                strip: STRIP_PREFIX_PATTERNS
                    .iter()
                    .map(|pattern| Regex::new(pattern))
                    .collect::<Result<Vec<_>, _>>()
                    .ok()?,
                noise: NOISE_PATTERNS
                    .iter()
                    .map(|pattern| Regex::new(pattern))
                    .collect::<Result<Vec<_>, _>>()
                    .ok()?,
            })
        })
        .as_ref()
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Strips runtime prefixes from a raw file path.
#[must_use]
pub fn normalize_path(raw: &str) -> String {
    let mut result = raw.trim().to_string();
    for prefix in STRIP_PREFIXES {
        if let Some(stripped) = result.strip_prefix(prefix) {
            result = stripped.to_string();
        }
    }
    if let Some(compiled) = patterns() {
        for pattern in &compiled.strip {
            result = pattern.replace(&result, "").into_owned();
        }
    }
    if let Some(stripped) = result.strip_prefix("./") {
        result = stripped.to_string();
    }
    result
}

/// Returns true for dependency directories and synthetic frames.
fn is_noise(path: &str) -> bool {
    patterns().is_some_and(|compiled| {
        compiled.noise.iter().any(|pattern| pattern.is_match(path))
    })
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Extracts all trace frames from free-form failure text.
#[must_use]
pub fn parse_frames(text: &str) -> Vec<TraceFrame> {
    let Some(compiled) = patterns() else {
        return Vec::new();
    };
    let mut frames: Vec<TraceFrame> = Vec::new();
    let mut seen: BTreeSet<(String, Option<u32>)> = BTreeSet::new();

    for capture in compiled.python.captures_iter(text) {
        let raw = capture.get(1).map_or("", |group| group.as_str());
        let line = capture.get(2).and_then(|group| group.as_str().parse().ok());
        let normalized = normalize_path(raw);
        if seen.insert((normalized.clone(), line)) {
            frames.push(TraceFrame {
                raw_path: raw.to_string(),
                normalized_path: normalized,
                line,
                column: None,
                function: capture.get(3).map_or_else(String::new, |group| group.as_str().to_string()),
            });
        }
    }

    for capture in compiled.node.captures_iter(text) {
        let raw = capture.get(2).map_or("", |group| group.as_str());
        let line = capture.get(3).and_then(|group| group.as_str().parse().ok());
        let normalized = normalize_path(raw);
        if seen.insert((normalized.clone(), line)) {
            frames.push(TraceFrame {
                raw_path: raw.to_string(),
                normalized_path: normalized,
                line,
                column: capture.get(4).and_then(|group| group.as_str().parse().ok()),
                function: capture.get(1).map_or_else(String::new, |group| group.as_str().to_string()),
            });
        }
    }

    if frames.is_empty() {
        for capture in compiled.generic.captures_iter(text) {
            let raw = capture.get(1).map_or("", |group| group.as_str());
            let line = capture.get(2).and_then(|group| group.as_str().parse().ok());
            let normalized = normalize_path(raw);
            if seen.insert((normalized.clone(), line)) {
                frames.push(TraceFrame {
                    raw_path: raw.to_string(),
                    normalized_path: normalized,
                    line,
                    column: None,
                    function: String::new(),
                });
            }
        }
    }

    frames
}

/// Parses frames, filters noise, and returns the top application frames.
#[must_use]
pub fn extract_app_frames(text: &str) -> Vec<TraceFrame> {
    parse_frames(text)
        .into_iter()
        .filter(|frame| !is_noise(&frame.normalized_path))
        .take(MAX_APP_FRAMES)
        .collect()
}
