// crates/opsrunbook-core/src/core/packet.rs
// ============================================================================
// Module: OpsRunbook Incident Packet
// Description: Analyzer output contract (`incident_packet.v1`).
// Purpose: Carry findings, hypotheses, actions, owners, and limits with hashes.
// Dependencies: serde, crate::core::{evidence, identifiers, time}
// ============================================================================

//! ## Overview
//! The packet is the analyzer's structured output: a finite bag of findings,
//! hypotheses, next actions, suspected owners, and limits, all citing
//! evidence references. High-confidence findings must cite evidence: any
//! finding with confidence above 0.6 and no refs fails validation.
//!
//! The packet hash is a single canonical sha256 computed with the
//! `packet_hashes` field excluded from serialization, then stored into it.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::evidence::EvidenceRef;
use crate::core::evidence::SnapshotRef;
use crate::core::hashing::HashError;
use crate::core::hashing::canonical_bytes_and_sha;
use crate::core::identifiers::CollectorRunId;
use crate::core::identifiers::IncidentId;
use crate::core::time::TimeWindow;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema identifier for incident packets.
pub const PACKET_SCHEMA: &str = "incident_packet.v1";

/// Confidence above which a finding must cite evidence.
pub const EVIDENCE_REQUIRED_ABOVE: f64 = 0.6;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Packet validation and finalization errors.
#[derive(Debug, Error)]
pub enum PacketError {
    /// A confidence value fell outside `[0, 1]`.
    #[error("confidence {confidence} out of range for '{id}'")]
    ConfidenceOutOfRange {
        /// Offending finding or owner identifier.
        id: String,
        /// The out-of-range value.
        confidence: f64,
    },
    /// A high-confidence finding cited no evidence.
    #[error(
        "finding '{id}' has confidence {confidence} > {EVIDENCE_REQUIRED_ABOVE} but no evidence_refs"
    )]
    MissingEvidence {
        /// Offending finding identifier.
        id: String,
        /// The finding's confidence.
        confidence: f64,
    },
    /// Canonical serialization failed while hashing.
    #[error("packet hashing failed: {0}")]
    Hashing(#[from] HashError),
}

// ============================================================================
// SECTION: Packet Items
// ============================================================================

/// One analyzer finding.
///
/// # Invariants
/// - `confidence` is in `[0, 1]`.
/// - `confidence > 0.6` requires at least one evidence reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    /// Stable finding identifier (e.g. `logs-errors-found`).
    pub id: String,
    /// Human-readable summary.
    pub summary: String,
    /// Calibrated confidence in `[0, 1]`.
    pub confidence: f64,
    /// Evidence citations.
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceRef>,
    /// Optional analyst notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// One analyzer hypothesis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Human-readable summary.
    pub summary: String,
    /// Calibrated confidence in `[0, 1]`.
    pub confidence: f64,
    /// Evidence citations.
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceRef>,
}

/// One suggested follow-up action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NextAction {
    /// Human-readable summary.
    pub summary: String,
    /// Suggested commands or queries.
    #[serde(default)]
    pub commands: Vec<String>,
    /// Relevant links.
    #[serde(default)]
    pub links: Vec<String>,
    /// Evidence citations.
    #[serde(default)]
    pub evidence_refs: Vec<EvidenceRef>,
}

/// One suspected owning repository.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspectedOwner {
    /// Repository name (bare or `owner/repo`).
    pub repo: String,
    /// Calibrated confidence in `[0, 1]`.
    pub confidence: f64,
    /// Match reasons, sorted for determinism.
    #[serde(default)]
    pub reasons: Vec<String>,
}

/// Provenance of the analysis pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelTrace {
    /// Analysis provider (`stub` for the deterministic analyzer).
    pub provider: String,
    /// Model identifier, when a hosted model was used.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Prompt/template version.
    pub prompt_version: String,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
}

/// Stable hashes over the finalized packet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketHashes {
    /// Canonical sha256 with `packet_hashes` excluded from serialization.
    pub sha256: String,
}

// ============================================================================
// SECTION: Incident Packet
// ============================================================================

/// Analyzer output (`incident_packet.v1`).
///
/// # Invariants
/// - Any finding with confidence above 0.6 carries at least one evidence ref.
/// - Recomputing the canonical hash with `packet_hashes` excluded reproduces
///   `packet_hashes.sha256` (determinism).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentPacket {
    /// Schema identifier, always `incident_packet.v1`.
    pub schema_version: String,
    /// Incident this packet belongs to.
    pub incident_id: IncidentId,
    /// Pipeline instance that produced it.
    pub collector_run_id: CollectorRunId,
    /// Logical service name.
    pub service: String,
    /// Deployment environment.
    pub environment: String,
    /// Window the evidence covers.
    pub time_window: TimeWindow,
    /// Pointer to the snapshot manifest.
    pub snapshot_ref: SnapshotRef,
    /// Findings, highest-signal first.
    #[serde(default)]
    pub findings: Vec<Finding>,
    /// Hypotheses.
    #[serde(default)]
    pub hypotheses: Vec<Hypothesis>,
    /// Suggested follow-up actions.
    #[serde(default)]
    pub next_actions: Vec<NextAction>,
    /// Suspected owning repositories.
    #[serde(default)]
    pub suspected_owners: Vec<SuspectedOwner>,
    /// Data availability limits encountered during analysis.
    #[serde(default)]
    pub limits: Vec<String>,
    /// Provenance of the analysis pass.
    pub model_trace: ModelTrace,
    /// Stable hashes; absent until finalization.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub packet_hashes: Option<PacketHashes>,
    /// Every evidence reference from the snapshot.
    #[serde(default)]
    pub all_evidence_refs: Vec<EvidenceRef>,
}

impl IncidentPacket {
    /// Validates packet invariants.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] for the first violated invariant.
    pub fn validate(&self) -> Result<(), PacketError> {
        for finding in &self.findings {
            if !(0.0..=1.0).contains(&finding.confidence) {
                return Err(PacketError::ConfidenceOutOfRange {
                    id: finding.id.clone(),
                    confidence: finding.confidence,
                });
            }
            if finding.confidence > EVIDENCE_REQUIRED_ABOVE && finding.evidence_refs.is_empty() {
                return Err(PacketError::MissingEvidence {
                    id: finding.id.clone(),
                    confidence: finding.confidence,
                });
            }
        }
        for owner in &self.suspected_owners {
            if !(0.0..=1.0).contains(&owner.confidence) {
                return Err(PacketError::ConfidenceOutOfRange {
                    id: owner.repo.clone(),
                    confidence: owner.confidence,
                });
            }
        }
        Ok(())
    }

    /// Computes the stable packet hash with `packet_hashes` excluded.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError::Hashing`] when canonical serialization fails.
    pub fn compute_hash(&self) -> Result<String, PacketError> {
        let mut unhashed = self.clone();
        unhashed.packet_hashes = None;
        let (_bytes, sha) = canonical_bytes_and_sha(&unhashed)?;
        Ok(sha)
    }

    /// Validates, computes the stable hash, and stores it in `packet_hashes`.
    ///
    /// # Errors
    ///
    /// Returns [`PacketError`] when validation or hashing fails.
    pub fn finalize(&mut self) -> Result<(), PacketError> {
        self.validate()?;
        let sha256 = self.compute_hash()?;
        self.packet_hashes = Some(PacketHashes {
            sha256,
        });
        Ok(())
    }
}
