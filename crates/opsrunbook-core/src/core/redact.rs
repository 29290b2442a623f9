// crates/opsrunbook-core/src/core/redact.rs
// ============================================================================
// Module: OpsRunbook Redaction
// Description: Secret-shaped substring removal for evidence payloads.
// Purpose: Keep credentials out of every durable blob, fail-closed on values.
// Dependencies: regex, serde_json
// ============================================================================

//! ## Overview
//! Conservative value-level redaction applied to every string field before a
//! payload is sized or persisted. Patterns cover bearer tokens, key=value
//! credential forms, cloud access keys, password fields, and connection
//! strings. Keys are never redacted, only values.
//!
//! Security posture: evidence text is untrusted and may embed secrets copied
//! into log lines; redaction runs before budget enforcement so dropped rows
//! never skip it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use regex::Regex;
use serde_json::Value;

// ============================================================================
// SECTION: Redactor
// ============================================================================

/// Compiled redaction pattern with its replacement.
struct Rule {
    /// Compiled match pattern.
    pattern: Regex,
    /// Replacement template (may reference capture groups).
    replacement: &'static str,
}

/// Value-level secret redactor.
///
/// # Invariants
/// - Patterns are fixed at construction; redaction is deterministic.
/// - Structure (keys, nesting, non-string values) is preserved.
pub struct Redactor {
    /// Ordered redaction rules, applied in sequence.
    rules: Vec<Rule>,
}

impl Redactor {
    /// Builds the redactor with the standard rule set.
    ///
    /// Pattern compilation cannot fail for the fixed rule set; a rule whose
    /// pattern fails to compile is dropped rather than panicking.
    #[must_use]
    pub fn new() -> Self {
        let raw: [(&str, &'static str); 7] = [
            (
                r"(?i)\bAuthorization:\s*Bearer\s+[A-Za-z0-9\-\._~\+/]+=*",
                "Authorization: Bearer [REDACTED]",
            ),
            (r"(?i)\bBearer\s+[A-Za-z0-9\-\._~\+/]+=*", "Bearer [REDACTED]"),
            (
                r#"(?i)\b(api[_-]?key|token|access[_-]?token|secret)\s*[:=]\s*['"]?[A-Za-z0-9\-\._~\+/=]{8,}['"]?"#,
                "${1}=[REDACTED]",
            ),
            (r"\bAKIA[0-9A-Z]{16}\b", "AKIA[REDACTED]"),
            (
                r#"(?i)\baws_secret_access_key\s*[:=]\s*['"]?[A-Za-z0-9/+=]{16,}['"]?"#,
                "aws_secret_access_key=[REDACTED]",
            ),
            (
                r#"(?i)\b(password|passwd|pwd)\s*[:=]\s*['"]?[^'"\s]{6,}['"]?"#,
                "${1}=[REDACTED]",
            ),
            (
                r"(?i)\b(postgres|mysql|mongodb|redis)://[^ \n\r\t]+",
                "${1}://[REDACTED]",
            ),
        ];
        let rules = raw
            .into_iter()
            .filter_map(|(pattern, replacement)| {
                Regex::new(pattern).ok().map(|pattern| Rule {
                    pattern,
                    replacement,
                })
            })
            .collect();
        Self {
            rules,
        }
    }

    /// Redacts secret-shaped substrings from a text value.
    #[must_use]
    pub fn redact_text(&self, text: &str) -> String {
        let mut out = text.to_string();
        for rule in &self.rules {
            out = rule.pattern.replace_all(&out, rule.replacement).into_owned();
        }
        out
    }

    /// Recursively redacts every string inside a JSON structure.
    #[must_use]
    pub fn redact_value(&self, value: Value) -> Value {
        match value {
            Value::String(text) => Value::String(self.redact_text(&text)),
            Value::Array(items) => {
                Value::Array(items.into_iter().map(|item| self.redact_value(item)).collect())
            }
            Value::Object(map) => Value::Object(
                map.into_iter().map(|(key, val)| (key, self.redact_value(val))).collect(),
            ),
            other => other,
        }
    }
}

impl Default for Redactor {
    fn default() -> Self {
        Self::new()
    }
}
