// crates/opsrunbook-core/src/core/budget.rs
// ============================================================================
// Module: OpsRunbook Budget Enforcement
// Description: Row-count and byte-size caps over structured evidence payloads.
// Purpose: Keep every blob under the size budget before it crosses a boundary.
// Dependencies: serde_json, crate::core::hashing
// ============================================================================

//! ## Overview
//! The budgeter enforces two caps over a JSON payload: a per-section row cap
//! and a total canonical-byte cap. Enforcement is staged: top-level list
//! fields are trimmed first, then `sections[].rows`, and as a last resort the
//! raw rows are dropped entirely leaving section names plus a note. The
//! `truncated` flag records whether any stage fired.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;
use serde_json::json;

use crate::core::hashing::canonical_json_bytes;

// ============================================================================
// SECTION: Budget Result
// ============================================================================

/// Outcome of budget enforcement over a payload.
///
/// # Invariants
/// - `byte_size` is the canonical-byte size of `payload`.
/// - `truncated` is true iff any trimming stage modified the payload.
#[derive(Debug, Clone, PartialEq)]
pub struct BudgetResult {
    /// The possibly-trimmed payload.
    pub payload: Value,
    /// Whether any trimming occurred.
    pub truncated: bool,
    /// Canonical byte size of the final payload.
    pub byte_size: usize,
}

// ============================================================================
// SECTION: Budget Enforcement
// ============================================================================

/// Enforces row and byte budgets over a JSON object payload.
///
/// Strategy, in order:
/// 1. Trim top-level list fields to `max_rows_per_section`.
/// 2. Trim nested `sections[].rows` lists to `max_rows_per_section`.
/// 3. Replace each section with `{name, note}` and keep only metadata.
#[must_use]
pub fn apply_budgets(payload: Value, max_rows_per_section: usize, max_total_bytes: usize) -> BudgetResult {
    let mut truncated = false;
    let mut work = payload;

    if let Value::Object(map) = &mut work {
        for (_key, val) in map.iter_mut() {
            if let Value::Array(items) = val
                && items.len() > max_rows_per_section
            {
                items.truncate(max_rows_per_section);
                truncated = true;
            }
        }
    }

    let size = json_size_bytes(&work);
    if size <= max_total_bytes {
        return BudgetResult {
            payload: work,
            truncated,
            byte_size: size,
        };
    }

    if let Some(sections) = work.get_mut("sections").and_then(Value::as_array_mut) {
        for section in sections.iter_mut() {
            if let Some(rows) = section.get_mut("rows").and_then(Value::as_array_mut)
                && rows.len() > max_rows_per_section
            {
                rows.truncate(max_rows_per_section);
                truncated = true;
            }
        }
    }

    let size = json_size_bytes(&work);
    if size <= max_total_bytes {
        return BudgetResult {
            payload: work,
            truncated,
            byte_size: size,
        };
    }

    let minimized = drop_section_rows(work);
    let size = json_size_bytes(&minimized);
    BudgetResult {
        payload: minimized,
        truncated: true,
        byte_size: size,
    }
}

/// Returns the canonical byte size of a JSON value, zero when unserializable.
#[must_use]
pub fn json_size_bytes(value: &Value) -> usize {
    canonical_json_bytes(value).map_or(0, |bytes| bytes.len())
}

/// Replaces section rows with a note, keeping names and outer metadata.
fn drop_section_rows(mut work: Value) -> Value {
    if let Some(sections) = work.get_mut("sections").and_then(Value::as_array_mut) {
        let minimized: Vec<Value> = sections
            .iter()
            .map(|section| {
                let name = section
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                json!({
                    "name": name,
                    "note": "Dropped section rows due to size budget",
                })
            })
            .collect();
        *sections = minimized;
        if let Value::Object(map) = &mut work {
            map.insert(
                "note".to_string(),
                Value::String("Evidence was truncated to fit size budget".to_string()),
            );
        }
        return work;
    }
    json!({ "note": "Evidence was truncated to fit size budget" })
}
