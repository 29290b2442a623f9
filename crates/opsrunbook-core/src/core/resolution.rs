// crates/opsrunbook-core/src/core/resolution.rs
// ============================================================================
// Module: OpsRunbook Repo Resolution Contracts
// Description: Trace frames, mapping rules, and resolution results.
// Purpose: Define the confidence-scored repository identity contract.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! The repo resolver converts heterogeneous incident signals into a single
//! repository identity with a calibrated confidence score. These contract
//! types cross the action boundary: the full [`RepoResolution`] is embedded
//! in PR action results for audit.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;

// ============================================================================
// SECTION: Confidence Scale
// ============================================================================

/// Confidence for a mapping-rule hit.
pub const CONFIDENCE_MAPPING: f64 = 0.95;
/// Confidence for a source-control-verified trace path.
pub const CONFIDENCE_VERIFIED: f64 = 0.85;
/// Confidence for a heuristic-only candidate.
pub const CONFIDENCE_HEURISTIC: f64 = 0.5;
/// Confidence when no candidate exists.
pub const CONFIDENCE_NONE: f64 = 0.0;

// ============================================================================
// SECTION: Trace Frames
// ============================================================================

/// One normalized application stack frame.
///
/// # Invariants
/// - `normalized_path` has runtime prefixes stripped and is noise-filtered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceFrame {
    /// Path exactly as it appeared in the trace text.
    pub raw_path: String,
    /// Path with runtime prefixes stripped.
    pub normalized_path: String,
    /// Line number, when the format carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    /// Column number, when the format carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column: Option<u32>,
    /// Function name, when the format carried one.
    #[serde(default)]
    pub function: String,
}

// ============================================================================
// SECTION: Mapping Rules
// ============================================================================

/// Match kinds for mapping rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Value must equal the pattern.
    Exact,
    /// Value must start with the pattern.
    Prefix,
}

/// Signals a mapping rule can match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingSignal {
    /// The incident's logical service name.
    ServiceName,
    /// A function name parsed from evidence keys or finding text.
    LambdaName,
    /// A log group name.
    LogGroup,
    /// A workflow state-machine name.
    WorkflowName,
}

impl MappingSignal {
    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ServiceName => "service_name",
            Self::LambdaName => "lambda_name",
            Self::LogGroup => "log_group",
            Self::WorkflowName => "workflow_name",
        }
    }
}

/// One configured (signal, pattern) -> repo mapping rule.
///
/// # Invariants
/// - Rules are evaluated in configuration order; first match wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingRule {
    /// Match kind.
    #[serde(rename = "type")]
    pub kind: MatchKind,
    /// Signal this rule applies to.
    pub signal: MappingSignal,
    /// Pattern to match against signal values.
    pub pattern: String,
    /// Repository the rule resolves to.
    pub repo: String,
}

impl MappingRule {
    /// Returns true when the rule matches a signal value.
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self.kind {
            MatchKind::Exact => value == self.pattern,
            MatchKind::Prefix => value.starts_with(&self.pattern),
        }
    }
}

// ============================================================================
// SECTION: Resolution Result
// ============================================================================

/// How the resolved repository was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verification {
    /// No resolution was attempted.
    None,
    /// A mapping rule matched.
    Mapping,
    /// A trace path was verified against the source-control host.
    Verified,
    /// Heuristic-only candidate, or no candidate at all.
    Unverified,
}

impl Verification {
    /// Returns the stable lowercase label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Mapping => "mapping",
            Self::Verified => "verified",
            Self::Unverified => "unverified",
        }
    }
}

/// Confidence-scored repository resolution.
///
/// # Invariants
/// - `trace_frames` is capped at the parser limit (five frames).
/// - `confidence` follows the fixed scale for each verification kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepoResolution {
    /// Resolved repository `owner/name`, empty when unresolved.
    pub repo_full_name: String,
    /// Calibrated confidence in `[0, 1]`.
    pub confidence: f64,
    /// Human-readable resolution reasons.
    #[serde(default)]
    pub reasons: Vec<String>,
    /// How the repository was established.
    pub verification: Verification,
    /// Parsed application trace frames.
    #[serde(default)]
    pub trace_frames: Vec<TraceFrame>,
}

impl RepoResolution {
    /// Builds the empty resolution for packets with no candidates.
    #[must_use]
    pub fn unresolved(trace_frames: Vec<TraceFrame>) -> Self {
        Self {
            repo_full_name: String::new(),
            confidence: CONFIDENCE_NONE,
            reasons: vec!["no repo could be determined".to_string()],
            verification: Verification::Unverified,
            trace_frames,
        }
    }
}
