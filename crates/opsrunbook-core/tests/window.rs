// crates/opsrunbook-core/tests/window.rs
// ============================================================================
// Module: Time Window Tests
// Description: Validation and clamping behavior for incident windows.
// Purpose: Ensure windows stay bounded and keep the most recent tail.
// Dependencies: opsrunbook-core, time
// ============================================================================
//! ## Overview
//! Validates ordering checks and server-side clamping.

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

use opsrunbook_core::TimeWindow;
use time::Duration;
use time::macros::datetime;

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Verifies windows with `end <= start` are rejected.
#[test]
fn end_must_follow_start() {
    let at = datetime!(2026-02-15 12:00:00 UTC);
    assert!(TimeWindow::new(at, at).is_err());
    assert!(TimeWindow::new(at, at - Duration::minutes(1)).is_err());
    assert!(TimeWindow::new(at, at + Duration::minutes(1)).is_ok());
}

// ============================================================================
// SECTION: Clamping
// ============================================================================

/// Verifies windows inside the cap pass through unclamped.
#[test]
fn short_window_is_not_clamped() {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    let window = TimeWindow::new(end - Duration::minutes(10), end).unwrap();

    let (clamped, was_clamped) = window.clamp_to_minutes(15);

    assert!(!was_clamped);
    assert_eq!(clamped, window);
}

/// Verifies oversized windows keep the most recent tail.
#[test]
fn long_window_keeps_recent_tail() {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    let window = TimeWindow::new(end - Duration::hours(4), end).unwrap();

    let (clamped, was_clamped) = window.clamp_to_minutes(15);

    assert!(was_clamped);
    assert_eq!(clamped.end, end);
    assert_eq!(clamped.start, end - Duration::minutes(15));
}

/// Verifies a window exactly at the cap is untouched.
#[test]
fn window_at_cap_is_untouched() {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    let window = TimeWindow::new(end - Duration::minutes(15), end).unwrap();

    let (_clamped, was_clamped) = window.clamp_to_minutes(15);

    assert!(!was_clamped);
}

// ============================================================================
// SECTION: Serialization
// ============================================================================

/// Verifies RFC 3339 round-tripping through serde.
#[test]
fn rfc3339_round_trip() {
    let end = datetime!(2026-02-15 12:00:00 UTC);
    let window = TimeWindow::new(end - Duration::minutes(5), end).unwrap();

    let encoded = serde_json::to_string(&window).unwrap();
    assert!(encoded.contains("2026-02-15T12:00:00Z"));

    let decoded: TimeWindow = serde_json::from_str(&encoded).unwrap();
    assert_eq!(decoded, window);
}
