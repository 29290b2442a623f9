// crates/opsrunbook-core/src/core/evidence.rs
// ============================================================================
// Module: OpsRunbook Evidence Model
// Description: Evidence references, typed collector blobs, and snapshots.
// Purpose: Provide exhaustive, serializable evidence contracts (`evidence.v1`).
// Dependencies: serde, serde_json, crate::core::{identifiers, time}
// ============================================================================

//! ## Overview
//! Collectors write content-addressed evidence blobs to the object store and
//! return an [`EvidenceRef`] pointing at them. The blob body is a tagged sum
//! over the three collector types so the analyzer handles every shape
//! exhaustively, without reflection. The snapshot aggregates one run's
//! collector results plus truncation/error flags.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

use crate::core::identifiers::CollectorRunId;
use crate::core::identifiers::IncidentId;
use crate::core::time::TimeWindow;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema identifier for collector evidence blobs.
pub const EVIDENCE_SCHEMA: &str = "evidence.v1";

/// Schema identifier for the aggregated snapshot manifest.
pub const SNAPSHOT_SCHEMA: &str = "evidence_snapshot.v1";

// ============================================================================
// SECTION: Collector Type
// ============================================================================

/// The three evidence collectors.
///
/// # Invariants
/// - Variants are stable for serialization and key derivation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectorType {
    /// Analytic log query collector.
    Logs,
    /// Metric time-series collector.
    Metrics,
    /// Workflow execution collector.
    Workflow,
}

impl CollectorType {
    /// Returns the stable lowercase name used in object keys.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Logs => "logs",
            Self::Metrics => "metrics",
            Self::Workflow => "workflow",
        }
    }
}

// ============================================================================
// SECTION: Evidence Reference
// ============================================================================

/// Canonical pointer to a written evidence blob.
///
/// # Invariants
/// - Immutable once written; `sha256` matches the canonical blob bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceRef {
    /// Collector that produced the blob.
    pub collector_type: CollectorType,
    /// Object-store bucket.
    pub bucket: String,
    /// Object-store key.
    pub key: String,
    /// Lowercase hex sha256 of the blob bytes.
    pub sha256: String,
    /// Size of the blob in bytes.
    pub byte_size: usize,
    /// Whether budget enforcement trimmed the blob.
    pub truncated: bool,
}

// ============================================================================
// SECTION: Logs Evidence
// ============================================================================

/// One analytic-query section inside a logs blob.
///
/// # Invariants
/// - After budget enforcement only `name` and `note` may remain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogSection {
    /// Section name (`recent_errors` or `top_errors`).
    pub name: String,
    /// Backend query terminal status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Result rows as field/value maps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rows: Option<Vec<Value>>,
    /// Backend query statistics.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<Value>,
    /// Budget note when rows were dropped.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Logs collector blob body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogsEvidence {
    /// Log groups the queries ran over.
    pub log_groups: Vec<String>,
    /// Analytic query sections.
    pub sections: Vec<LogSection>,
}

// ============================================================================
// SECTION: Metrics Evidence
// ============================================================================

/// Summary statistics over the kept points of one series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesSummary {
    /// Minimum kept value.
    pub min: Option<f64>,
    /// Maximum kept value.
    pub max: Option<f64>,
    /// Mean of kept values.
    pub avg: Option<f64>,
    /// Number of kept values.
    pub count: usize,
}

/// One bounded metric time series.
///
/// # Invariants
/// - `timestamps` and `values` have equal length (`point_count`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSeries {
    /// Backend query identifier (`m<idx>`).
    pub query_id: String,
    /// Series label.
    pub label: String,
    /// RFC 3339 timestamps of kept points.
    pub timestamps: Vec<String>,
    /// Kept point values.
    pub values: Vec<f64>,
    /// Statistic the series was fetched with.
    pub stat: String,
    /// Aggregation period in seconds.
    pub period: u32,
    /// Number of kept points.
    pub point_count: usize,
    /// Whether this series lost points to a cap.
    pub truncated: bool,
    /// Summary over the kept points.
    pub summary: SeriesSummary,
}

/// Named series grouping inside a metrics blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSection {
    /// Section name (always `metrics`).
    pub name: String,
    /// Series in the section.
    pub series: Vec<MetricSeries>,
}

/// Metrics collector blob body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsEvidence {
    /// Sectioned series view.
    pub sections: Vec<MetricSection>,
    /// Flat series view (same data as `sections`).
    pub series: Vec<MetricSeries>,
}

// ============================================================================
// SECTION: Workflow Evidence
// ============================================================================

/// One entry of a bounded, newest-first execution history tail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEvent {
    /// Backend event id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Backend event type string.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    /// Error label for failure-typed events (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Cause text for failure-typed events (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

/// Orchestrator execution section of a workflow blob.
///
/// # Invariants
/// - `history_tail` is newest-first and capped.
/// - A `RUNNING` status is expected, never a failure signal by itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorSection {
    /// Orchestrator execution arn.
    pub execution_arn: String,
    /// Owning state-machine arn, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_machine_arn: Option<String>,
    /// Execution status reported by the backend.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Execution start timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Execution stop timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_date: Option<String>,
    /// Execution input (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Execution output (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Execution error label (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution failure cause (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Inferred name of the last failed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_state: Option<String>,
    /// Number of history events retrieved.
    pub history_events_count: usize,
    /// Bounded newest-first history tail.
    pub history_tail: Vec<HistoryEvent>,
    /// History retrieval error, when the tail could not be fetched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub history_error: Option<String>,
}

/// One failed peer execution found inside the incident window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedExecution {
    /// Execution arn.
    pub execution_arn: String,
    /// Owning state-machine arn.
    pub state_machine_arn: String,
    /// Execution name.
    pub name: String,
    /// Terminal status (`FAILED`, `TIMED_OUT`, `ABORTED`).
    pub status: String,
    /// Execution start timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<String>,
    /// Execution stop timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_date: Option<String>,
    /// Execution error label (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Execution failure cause (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
    /// Inferred name of the last failed state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_failed_state: Option<String>,
}

/// Failed-executions section of a workflow blob.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailedExecutionsSection {
    /// Peer state-machine arns that were listed.
    pub state_machine_arns: Vec<String>,
    /// Matches found before the cap was applied.
    pub total_found: usize,
    /// Kept executions, newest-first.
    pub executions: Vec<FailedExecution>,
}

/// Workflow blob sections, discriminated by `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "snake_case")]
pub enum WorkflowSection {
    /// The orchestrator's own execution.
    OrchestratorExecution(OrchestratorSection),
    /// Failed peer executions inside the window.
    FailedExecutions(FailedExecutionsSection),
}

/// Workflow collector blob body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowEvidence {
    /// Collected workflow sections.
    pub sections: Vec<WorkflowSection>,
}

// ============================================================================
// SECTION: Evidence Blob
// ============================================================================

/// Type-specific body of an evidence blob, tagged by collector type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "collector_type", rename_all = "snake_case")]
pub enum EvidenceKind {
    /// Logs collector payload.
    Logs(LogsEvidence),
    /// Metrics collector payload.
    Metrics(MetricsEvidence),
    /// Workflow collector payload.
    Workflow(WorkflowEvidence),
}

impl EvidenceKind {
    /// Returns the collector type of this body.
    #[must_use]
    pub const fn collector_type(&self) -> CollectorType {
        match self {
            Self::Logs(_) => CollectorType::Logs,
            Self::Metrics(_) => CollectorType::Metrics,
            Self::Workflow(_) => CollectorType::Workflow,
        }
    }
}

/// Content-addressed evidence blob (`evidence.v1`).
///
/// # Invariants
/// - `sha256(canonical_serialize(blob))` equals the ref's `sha256`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceBlob {
    /// Schema identifier, always `evidence.v1`.
    pub schema_version: String,
    /// Incident this blob belongs to.
    pub incident_id: IncidentId,
    /// Pipeline instance that produced it.
    pub collector_run_id: CollectorRunId,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Window the evidence covers.
    pub time_window: TimeWindow,
    /// Type-specific body.
    #[serde(flatten)]
    pub kind: EvidenceKind,
}

// ============================================================================
// SECTION: Collector Results
// ============================================================================

/// Structured outcome of one collector step.
///
/// # Invariants
/// - `skipped` without an `error` is not a failure.
/// - `evidence_ref` is present iff a blob was written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectorResult {
    /// Collector that ran.
    pub collector_type: CollectorType,
    /// True when the collector had no backend hints.
    pub skipped: bool,
    /// Pointer to the written blob, when any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence_ref: Option<EvidenceRef>,
    /// Short error label when the collector failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure cause detail when the collector failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cause: Option<String>,
}

impl CollectorResult {
    /// Builds a skipped result for a collector with no hints.
    #[must_use]
    pub const fn skipped(collector_type: CollectorType) -> Self {
        Self {
            collector_type,
            skipped: true,
            evidence_ref: None,
            error: None,
            cause: None,
        }
    }

    /// Returns true when this result must flip the snapshot truncation bit.
    #[must_use]
    pub fn truncated_or_error(&self) -> bool {
        self.error.is_some() || self.evidence_ref.as_ref().is_some_and(|eref| eref.truncated)
    }
}

// ============================================================================
// SECTION: Snapshot
// ============================================================================

/// Aggregated snapshot manifest (`evidence_snapshot.v1`).
///
/// # Invariants
/// - `truncated` is the OR across collectors of truncation-or-error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// Schema identifier, always `evidence_snapshot.v1`.
    pub schema_version: String,
    /// Incident this snapshot belongs to.
    pub incident_id: IncidentId,
    /// Pipeline instance that produced it.
    pub collector_run_id: CollectorRunId,
    /// Creation timestamp (RFC 3339).
    pub created_at: String,
    /// Logical service name.
    pub service: String,
    /// Deployment environment.
    pub environment: String,
    /// Window the evidence covers.
    pub time_window: TimeWindow,
    /// Per-collector outcomes.
    pub collectors: Vec<CollectorResult>,
    /// OR across collector truncation and error flags.
    pub truncated: bool,
}

/// Pointer to a written snapshot manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRef {
    /// Object-store bucket.
    pub bucket: String,
    /// Object-store key.
    pub key: String,
    /// Lowercase hex sha256 of the manifest bytes.
    pub sha256: String,
}

// ============================================================================
// SECTION: Object Keys
// ============================================================================

/// Returns the object key for one collector's evidence blob.
#[must_use]
pub fn evidence_blob_key(
    incident_id: &IncidentId,
    run_id: &CollectorRunId,
    collector_type: CollectorType,
) -> String {
    format!("evidence/{incident_id}/{run_id}/{}.json", collector_type.as_str())
}

/// Returns the object key for the aggregated snapshot manifest.
#[must_use]
pub fn snapshot_key(incident_id: &IncidentId, run_id: &CollectorRunId) -> String {
    format!("evidence/{incident_id}/{run_id}.json")
}

/// Returns the object key for an incident packet.
#[must_use]
pub fn packet_key(incident_id: &IncidentId, run_id: &CollectorRunId) -> String {
    format!("packets/{incident_id}/{run_id}.json")
}
