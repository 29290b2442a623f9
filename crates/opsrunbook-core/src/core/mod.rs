// crates/opsrunbook-core/src/core/mod.rs
// ============================================================================
// Module: OpsRunbook Core Types
// Description: Canonical contracts and kernel utilities for the pipeline.
// Purpose: Provide stable, serializable types for every durable boundary.
// Dependencies: regex, serde, serde_jcs, sha2, time
// ============================================================================

//! ## Overview
//! Core types define the incident event, evidence, packet, plan, and review
//! contracts plus the kernel utilities every step shares: canonical hashing,
//! redaction, budget enforcement, time windows, and record key derivation.
//! These types are the canonical source of truth for any derived API surface.

// ============================================================================
// SECTION: Submodules
// ============================================================================

pub mod budget;
pub mod event;
pub mod evidence;
pub mod hashing;
pub mod identifiers;
pub mod packet;
pub mod plan;
pub mod records;
pub mod redact;
pub mod resolution;
pub mod review;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use budget::BudgetResult;
pub use budget::apply_budgets;
pub use budget::json_size_bytes;
pub use event::INCIDENT_EVENT_SCHEMA;
pub use event::IncidentEvent;
pub use event::IncidentEventError;
pub use event::IncidentHints;
pub use event::MetricQueryHint;
pub use event::Severity;
pub use evidence::CollectorResult;
pub use evidence::CollectorType;
pub use evidence::EVIDENCE_SCHEMA;
pub use evidence::EvidenceBlob;
pub use evidence::EvidenceKind;
pub use evidence::EvidenceRef;
pub use evidence::FailedExecution;
pub use evidence::FailedExecutionsSection;
pub use evidence::HistoryEvent;
pub use evidence::LogSection;
pub use evidence::LogsEvidence;
pub use evidence::MetricSection;
pub use evidence::MetricSeries;
pub use evidence::MetricsEvidence;
pub use evidence::OrchestratorSection;
pub use evidence::SNAPSHOT_SCHEMA;
pub use evidence::SeriesSummary;
pub use evidence::SnapshotManifest;
pub use evidence::SnapshotRef;
pub use evidence::WorkflowEvidence;
pub use evidence::WorkflowSection;
pub use evidence::evidence_blob_key;
pub use evidence::packet_key;
pub use evidence::snapshot_key;
pub use hashing::HashError;
pub use hashing::canonical_bytes_and_sha;
pub use hashing::canonical_json_bytes;
pub use hashing::sanitize_value;
pub use hashing::sha256_hex;
pub use identifiers::ActionId;
pub use identifiers::CollectorRunId;
pub use identifiers::DeliveryId;
pub use identifiers::IncidentId;
pub use packet::EVIDENCE_REQUIRED_ABOVE;
pub use packet::Finding;
pub use packet::Hypothesis;
pub use packet::IncidentPacket;
pub use packet::ModelTrace;
pub use packet::NextAction;
pub use packet::PACKET_SCHEMA;
pub use packet::PacketError;
pub use packet::PacketHashes;
pub use packet::SuspectedOwner;
pub use plan::ACTION_PLAN_SCHEMA;
pub use plan::ACTION_RESULT_SCHEMA;
pub use plan::ActionPlan;
pub use plan::ActionResult;
pub use plan::ActionStatus;
pub use plan::ActionType;
pub use plan::PlannedAction;
pub use plan::Priority;
pub use plan::clip_summary;
pub use plan::derive_priority;
pub use redact::Redactor;
pub use resolution::CONFIDENCE_HEURISTIC;
pub use resolution::CONFIDENCE_MAPPING;
pub use resolution::CONFIDENCE_NONE;
pub use resolution::CONFIDENCE_VERIFIED;
pub use resolution::MappingRule;
pub use resolution::MappingSignal;
pub use resolution::MatchKind;
pub use resolution::RepoResolution;
pub use resolution::TraceFrame;
pub use resolution::Verification;
pub use review::ChangeType;
pub use review::InlineContext;
pub use review::PR_FIX_PLAN_SCHEMA;
pub use review::PR_REVIEW_EVENT_SCHEMA;
pub use review::PR_REVIEW_PACKET_SCHEMA;
pub use review::PatchResult;
pub use review::PatchStatus;
pub use review::PrFixPlan;
pub use review::PrReviewEvent;
pub use review::ProposedEdit;
pub use review::RiskLevel;
pub use time::TimeWindow;
pub use time::TimeWindowError;
pub use time::format_rfc3339;
pub use time::now_rfc3339;
pub use time::now_utc;
