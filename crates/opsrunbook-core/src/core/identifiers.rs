// crates/opsrunbook-core/src/core/identifiers.rs
// ============================================================================
// Module: OpsRunbook Identifiers
// Description: Canonical opaque identifiers for incidents, runs, and actions.
// Purpose: Provide strongly typed, serializable IDs with stable string forms.
// Dependencies: rand, serde
// ============================================================================

//! ## Overview
//! This module defines the canonical string-based identifiers used throughout
//! the pipeline. Identifiers are opaque and serialize as strings. Validation
//! is handled at ingress boundaries rather than within these simple wrappers.
//!
//! Server-assigned identifiers follow fixed shapes: incident ids are
//! `inc-<12 hex>`, collector run ids are 32 hex chars, action ids are 12 hex
//! chars. Caller-provided identifiers (event ids, webhook delivery ids) are
//! accepted verbatim.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use rand::Rng;
use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Identifier Types
// ============================================================================

/// Incident identifier scoped to one observed anomaly window.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IncidentId(String);

impl IncidentId {
    /// Creates a new incident identifier from an existing string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh server-assigned incident identifier (`inc-<12 hex>`).
    #[must_use]
    pub fn generate() -> Self {
        Self(format!("inc-{}", random_hex(12)))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IncidentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for IncidentId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for IncidentId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Collector run identifier keying one pipeline instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CollectorRunId(String);

impl CollectorRunId {
    /// Creates a new collector run identifier from an existing string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh collector run identifier (32 hex chars).
    #[must_use]
    pub fn generate() -> Self {
        Self(random_hex(32))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CollectorRunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for CollectorRunId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for CollectorRunId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Action identifier for one executed external-effect operation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(String);

impl ActionId {
    /// Creates a new action identifier from an existing string form.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generates a fresh action identifier (12 hex chars).
    #[must_use]
    pub fn generate() -> Self {
        Self(random_hex(12))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for ActionId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for ActionId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

/// Webhook delivery identifier assigned by the source-control host.
///
/// # Invariants
/// - Values are caller-provided and never generated locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(String);

impl DeliveryId {
    /// Creates a new delivery identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<&str> for DeliveryId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for DeliveryId {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

// ============================================================================
// SECTION: Random Hex
// ============================================================================

/// Returns `len` lowercase hex characters from the thread RNG.
fn random_hex(len: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    let mut out = String::with_capacity(len);
    for _ in 0..len {
        let nibble: usize = rng.gen_range(0..16);
        out.push(HEX[nibble] as char);
    }
    out
}
