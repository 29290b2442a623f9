// crates/opsrunbook-core/tests/budget.rs
// ============================================================================
// Module: Budget Enforcement Tests
// Description: Row-cap and byte-cap behavior over sectioned payloads.
// Purpose: Ensure oversized evidence is trimmed in the documented stages.
// Dependencies: opsrunbook-core, serde_json
// ============================================================================
//! ## Overview
//! Validates the staged trimming strategy: top-level lists, section rows,
//! then section replacement with a note.

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

use opsrunbook_core::apply_budgets;
use opsrunbook_core::json_size_bytes;
use serde_json::Value;
use serde_json::json;

// ============================================================================
// SECTION: Row Caps
// ============================================================================

/// Verifies 500 rows under a 50-row cap keep 50 rows and set truncated.
#[test]
fn row_cap_trims_top_level_lists() {
    let rows: Vec<Value> = (0..500).map(|idx| json!({"n": idx})).collect();
    let payload = json!({"rows": rows});

    let result = apply_budgets(payload, 50, 10_000);

    assert!(result.truncated);
    assert_eq!(result.payload["rows"].as_array().unwrap().len(), 50);
    assert!(result.byte_size <= 10_000);
}

/// Verifies payloads under both caps pass through untouched.
#[test]
fn within_budget_is_untouched() {
    let payload = json!({"rows": [1, 2, 3], "name": "small"});
    let expected_size = json_size_bytes(&payload);

    let result = apply_budgets(payload.clone(), 100, 200_000);

    assert!(!result.truncated);
    assert_eq!(result.payload, payload);
    assert_eq!(result.byte_size, expected_size);
}

// ============================================================================
// SECTION: Byte Caps
// ============================================================================

/// Verifies nested section rows are trimmed when the payload is oversize.
#[test]
fn byte_cap_trims_section_rows() {
    let rows: Vec<Value> = (0..80).map(|idx| json!({"message": format!("row {idx}")})).collect();
    let payload = json!({
        "sections": [{"name": "recent_errors", "rows": rows}],
    });

    let result = apply_budgets(payload, 10, 100_000);

    let kept = result.payload["sections"][0]["rows"].as_array().unwrap();
    assert_eq!(kept.len(), 10);
    assert!(result.truncated);
}

/// Verifies the last-resort stage drops rows and leaves names plus a note.
#[test]
fn byte_cap_last_resort_drops_rows() {
    let big_row = "x".repeat(2_000);
    let rows: Vec<Value> = (0..40).map(|_| json!({"message": big_row})).collect();
    let payload = json!({
        "sections": [
            {"name": "recent_errors", "rows": rows.clone()},
            {"name": "top_errors", "rows": rows},
        ],
    });

    let result = apply_budgets(payload, 100, 4_000);

    assert!(result.truncated);
    assert!(result.byte_size <= 4_000);
    let sections = result.payload["sections"].as_array().unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0]["name"], "recent_errors");
    assert_eq!(sections[0]["note"], "Dropped section rows due to size budget");
    assert!(sections[0].get("rows").is_none());
    assert_eq!(result.payload["note"], "Evidence was truncated to fit size budget");
}

/// Verifies a sectionless oversize payload collapses to the minimal note.
#[test]
fn byte_cap_without_sections_minimizes() {
    let payload = json!({"blob": "y".repeat(5_000)});

    let result = apply_budgets(payload, 100, 1_000);

    assert!(result.truncated);
    assert_eq!(result.payload["note"], "Evidence was truncated to fit size budget");
}

// ============================================================================
// SECTION: Properties
// ============================================================================

proptest::proptest! {
    /// Any sectioned payload either fits the byte cap or is flagged truncated,
    /// and the row cap holds for every surviving section.
    #[test]
    fn budgets_always_bound_sections(
        rows in 0usize..300,
        row_text in "[a-zA-Z0-9 ]{0,40}",
        max_rows in 1usize..60,
        max_bytes in 200usize..20_000,
    ) {
        let section_rows: Vec<Value> =
            (0..rows).map(|idx| json!({"n": idx, "message": row_text})).collect();
        let payload = json!({"sections": [{"name": "recent_errors", "rows": section_rows}]});

        let result = apply_budgets(payload, max_rows, max_bytes);

        proptest::prop_assert!(result.byte_size <= max_bytes || result.truncated);
        if let Some(kept) = result.payload["sections"][0]["rows"].as_array() {
            proptest::prop_assert!(kept.len() <= max_rows);
        }
        proptest::prop_assert_eq!(result.byte_size, json_size_bytes(&result.payload));
    }
}
