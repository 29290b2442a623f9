// crates/opsrunbook-core/src/core/hashing.rs
// ============================================================================
// Module: OpsRunbook Canonical Hashing
// Description: RFC 8785 JSON canonicalization, sha256 digests, and sanitizing.
// Purpose: Provide deterministic, content-addressed bytes for every blob.
// Dependencies: serde, serde_jcs, serde_json, sha2
// ============================================================================

//! ## Overview
//! Every payload that crosses a durable boundary is serialized through one
//! canonical serializer (RFC 8785: stable key order, compact separators) and
//! content-addressed by the sha256 of those bytes. String fields are stripped
//! of JSON-unsafe control codepoints before serialization; tab, LF, and CR
//! are preserved.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Serialize;
use serde_json::Value;
use sha2::Digest;
use sha2::Sha256;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors raised when computing canonical bytes.
#[derive(Debug, Error)]
pub enum HashError {
    /// JSON canonicalization failed.
    #[error("failed to canonicalize json: {0}")]
    Canonicalization(String),
}

// ============================================================================
// SECTION: Canonical Serialization
// ============================================================================

/// Returns canonical JSON bytes for a serializable value using RFC 8785.
///
/// Control codepoints 0x00-0x08, 0x0B, 0x0C, and 0x0E-0x1F are removed from
/// every string field first.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_json_bytes<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, HashError> {
    let tree =
        serde_json::to_value(value).map_err(|err| HashError::Canonicalization(err.to_string()))?;
    let sanitized = sanitize_value(tree);
    serde_jcs::to_vec(&sanitized).map_err(|err| HashError::Canonicalization(err.to_string()))
}

/// Canonicalizes a value and returns `(bytes, sha256_hex)`.
///
/// # Errors
///
/// Returns [`HashError::Canonicalization`] when serialization fails.
pub fn canonical_bytes_and_sha<T: Serialize + ?Sized>(
    value: &T,
) -> Result<(Vec<u8>, String), HashError> {
    let bytes = canonical_json_bytes(value)?;
    let sha = sha256_hex(&bytes);
    Ok((bytes, sha))
}

// ============================================================================
// SECTION: Digests
// ============================================================================

/// Hashes raw bytes and returns a lowercase hex sha256 digest.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex_encode(&hasher.finalize())
}

// ============================================================================
// SECTION: Sanitizing
// ============================================================================

/// Recursively strips JSON-unsafe control codepoints from string fields.
///
/// Preserves `\t` (0x09), `\n` (0x0A), and `\r` (0x0D), which are legal in
/// JSON strings.
#[must_use]
pub fn sanitize_value(value: Value) -> Value {
    match value {
        Value::String(text) => Value::String(strip_control_chars(&text)),
        Value::Array(items) => Value::Array(items.into_iter().map(sanitize_value).collect()),
        Value::Object(map) => {
            Value::Object(map.into_iter().map(|(key, val)| (key, sanitize_value(val))).collect())
        }
        other => other,
    }
}

/// Removes codepoints 0x00-0x08, 0x0B, 0x0C, 0x0E-0x1F from a string.
fn strip_control_chars(text: &str) -> String {
    if text.chars().any(is_stripped_control) {
        text.chars().filter(|ch| !is_stripped_control(*ch)).collect()
    } else {
        text.to_string()
    }
}

/// Returns true for control codepoints that must not cross durable boundaries.
const fn is_stripped_control(ch: char) -> bool {
    matches!(ch, '\u{00}'..='\u{08}' | '\u{0b}' | '\u{0c}' | '\u{0e}'..='\u{1f}')
}

// ============================================================================
// SECTION: Hex Encoding
// ============================================================================

/// Encodes bytes as a lowercase hex string.
fn hex_encode(bytes: &[u8]) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut out = String::with_capacity(bytes.len() * 2);
    for byte in bytes {
        out.push(HEX[(byte >> 4) as usize] as char);
        out.push(HEX[(byte & 0x0f) as usize] as char);
    }
    out
}
