// crates/opsrunbook-core/tests/hashing.rs
// ============================================================================
// Module: Canonical Hashing Tests
// Description: Round-trip and sanitizer tests for canonical serialization.
// Purpose: Ensure content addressing is stable across serialize cycles.
// Dependencies: opsrunbook-core, serde_json
// ============================================================================
//! ## Overview
//! Validates that canonical serialize -> deserialize -> canonical serialize
//! is byte-identical and sha-identical, and that the sanitizer strips exactly
//! the JSON-unsafe control codepoints.

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

use opsrunbook_core::canonical_bytes_and_sha;
use opsrunbook_core::canonical_json_bytes;
use opsrunbook_core::sanitize_value;
use opsrunbook_core::sha256_hex;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Round Trips
// ============================================================================

/// Verifies serialize -> deserialize -> serialize is byte- and sha-identical.
#[test]
fn canonical_round_trip_is_stable() {
    let payload = json!({
        "zeta": [3, 1, 2],
        "alpha": {"nested": true, "empty": null},
        "text": "plain ascii with tab\tand newline\n",
        "count": 42,
    });

    let (first_bytes, first_sha) = canonical_bytes_and_sha(&payload).unwrap();
    let reparsed: Value = serde_json::from_slice(&first_bytes).unwrap();
    let (second_bytes, second_sha) = canonical_bytes_and_sha(&reparsed).unwrap();

    assert_eq!(first_bytes, second_bytes);
    assert_eq!(first_sha, second_sha);
    assert_eq!(first_sha, sha256_hex(&first_bytes));
}

/// Verifies key order does not affect canonical bytes.
#[test]
fn canonical_bytes_ignore_key_order() {
    let one = json!({"b": 1, "a": 2});
    let two = json!({"a": 2, "b": 1});
    assert_eq!(canonical_json_bytes(&one).unwrap(), canonical_json_bytes(&two).unwrap());
}

// ============================================================================
// SECTION: Sanitizer
// ============================================================================

/// Verifies stripped and preserved control codepoints.
#[test]
fn sanitizer_strips_unsafe_controls_only() {
    let dirty = json!({
        "text": "a\u{0000}b\u{0008}c\u{000b}d\u{000c}e\u{001f}f",
        "kept": "tab\tnewline\ncr\r",
        "nested": ["x\u{0001}y"],
    });
    let clean = sanitize_value(dirty);
    assert_eq!(clean["text"], "abcdef");
    assert_eq!(clean["kept"], "tab\tnewline\ncr\r");
    assert_eq!(clean["nested"][0], "xy");
}

/// Verifies sanitizing runs inside canonical serialization.
#[test]
fn canonical_bytes_are_sanitized() {
    let dirty = json!({"text": "a\u{0002}b"});
    let bytes = canonical_json_bytes(&dirty).unwrap();
    let parsed: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(parsed["text"], "ab");
}
