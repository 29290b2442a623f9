// crates/opsrunbook-resolver/tests/trace.rs
// ============================================================================
// Module: Trace Parser Tests
// Description: Frame extraction, normalization, and noise filtering.
// Purpose: Ensure only bounded application frames survive parsing.
// Dependencies: opsrunbook-resolver
// ============================================================================
//! ## Overview
//! Covers the interpreter and runtime patterns, the generic fallback, the
//! prefix-stripping table, dedup, and the five-frame cap.

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

use opsrunbook_resolver::extract_app_frames;
use opsrunbook_resolver::normalize_path;
use opsrunbook_resolver::parse_frames;

// ============================================================================
// SECTION: Interpreter Frames
// ============================================================================

/// Verifies interpreter-style frames parse with function names.
#[test]
fn parses_python_frames() {
    let text = r#"Traceback (most recent call last):
  File "/var/task/handler.py", line 42, in lambda_handler
    raise ValueError("boom")
"#;
    let frames = extract_app_frames(text);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].raw_path, "/var/task/handler.py");
    assert_eq!(frames[0].normalized_path, "handler.py");
    assert_eq!(frames[0].line, Some(42));
    assert_eq!(frames[0].function, "lambda_handler");
}

/// Verifies runtime-style frames parse with columns.
#[test]
fn parses_node_frames() {
    let text = "Error: boom\n    at handleRequest (/usr/src/app/src/server.js:10:5)\n";
    let frames = extract_app_frames(text);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].normalized_path, "src/server.js");
    assert_eq!(frames[0].line, Some(10));
    assert_eq!(frames[0].column, Some(5));
    assert_eq!(frames[0].function, "handleRequest");
}

/// Verifies the generic fallback only fires when primaries found nothing.
#[test]
fn generic_fallback_catches_path_line() {
    let frames = extract_app_frames("failure near src/billing/invoice.py:88 in prod");
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].normalized_path, "src/billing/invoice.py");
    assert_eq!(frames[0].line, Some(88));
}

// ============================================================================
// SECTION: Normalization
// ============================================================================

/// Verifies the runtime prefix table strips literal and regex prefixes.
#[test]
fn strips_runtime_prefixes() {
    assert_eq!(normalize_path("/var/task/app/main.py"), "app/main.py");
    assert_eq!(normalize_path("/opt/python/lib.py"), "lib.py");
    assert_eq!(normalize_path("./src/main.rs"), "src/main.rs");
    assert_eq!(
        normalize_path("/home/runner/work/org/repo/src/lib.rs"),
        "src/lib.rs"
    );
    assert_eq!(
        normalize_path("/tmp/0a1b2c3d-4e5f/module.py"),
        "module.py"
    );
}

// ============================================================================
// SECTION: Filtering and Caps
// ============================================================================

/// Verifies dependency and synthetic frames are filtered out.
#[test]
fn noise_frames_are_filtered() {
    let text = r#"
  File "/var/task/handler.py", line 10, in run
  File "/var/task/.venv/lib/python3.11/site-packages/requests/api.py", line 59, in get
  File "<frozen importlib._bootstrap>", line 241, in _call_with_frames_removed
"#;
    let frames = extract_app_frames(text);
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].normalized_path, "handler.py");
}

/// Verifies duplicate (path, line) pairs collapse.
#[test]
fn duplicate_frames_are_deduped() {
    let text = r#"
  File "/var/task/handler.py", line 10, in run
  File "/var/task/handler.py", line 10, in run
  File "/var/task/handler.py", line 22, in inner
"#;
    let frames = parse_frames(text);
    assert_eq!(frames.len(), 2);
}

/// Verifies at most five application frames are returned.
#[test]
fn frames_are_capped_at_five() {
    let mut text = String::new();
    for idx in 0..9 {
        text.push_str(&format!("  File \"/var/task/mod{idx}.py\", line {idx}, in f{idx}\n"));
    }
    assert_eq!(extract_app_frames(&text).len(), 5);
}
