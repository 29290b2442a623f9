// crates/opsrunbook-core/src/core/event.rs
// ============================================================================
// Module: OpsRunbook Incident Event Contract
// Description: Public `incident_event.v1` input contract with hint validation.
// Purpose: Define what alerting systems send to the ingress endpoint.
// Dependencies: serde, time, crate::core::{identifiers, time}
// ============================================================================

//! ## Overview
//! [`IncidentEvent`] is the public input contract. Callers provide an
//! `event_id` for dedupe, a service/environment pair, a timezone-aware time
//! window, and at least one backend hint (log groups, metric queries, or
//! workflow state-machine arns). The incident id is server-assigned when
//! absent.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;

use crate::core::identifiers::IncidentId;
use crate::core::time::TimeWindow;
use crate::core::time::TimeWindowError;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Schema identifier for the incident event contract.
pub const INCIDENT_EVENT_SCHEMA: &str = "incident_event.v1";

/// Minimum caller-provided event id length.
pub const MIN_EVENT_ID_LENGTH: usize = 8;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Validation errors for inbound incident events.
#[derive(Debug, Error)]
pub enum IncidentEventError {
    /// Event id is shorter than the dedupe minimum.
    #[error("event_id must be at least {MIN_EVENT_ID_LENGTH} characters")]
    EventIdTooShort,
    /// Service name is empty.
    #[error("service must be a non-empty logical service name")]
    EmptyService,
    /// No backend hints were provided.
    #[error("hints must contain at least one of: log_groups, metric_queries, workflow_arns")]
    NoHints,
    /// Time window failed validation.
    #[error("invalid time window: {0}")]
    Window(#[from] TimeWindowError),
}

// ============================================================================
// SECTION: Severity
// ============================================================================

/// Caller-asserted incident severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational signal.
    Info,
    /// Degradation requiring attention.
    Warning,
    /// Active outage or data risk.
    Critical,
}

// ============================================================================
// SECTION: Hints
// ============================================================================

/// Metric query hint pointing at one backend time series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricQueryHint {
    /// Metric namespace.
    pub namespace: String,
    /// Metric name.
    pub metric_name: String,
    /// Dimension name/value pairs.
    #[serde(default)]
    pub dimensions: std::collections::BTreeMap<String, String>,
    /// Aggregation period in seconds; values below 60 trigger auto-selection.
    #[serde(default = "default_metric_period")]
    pub period: u32,
    /// Backend statistic (Average, Sum, p95, ...).
    #[serde(default = "default_metric_stat")]
    pub stat: String,
}

/// Default metric aggregation period.
const fn default_metric_period() -> u32 {
    300
}

/// Default metric statistic.
fn default_metric_stat() -> String {
    "Average".to_string()
}

/// Backend hints describing where evidence may be found.
///
/// # Invariants
/// - At least one hint list is non-empty after validation.
/// - Log group names are trimmed; blank entries are removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IncidentHints {
    /// Log group names for the logs collector.
    #[serde(default)]
    pub log_groups: Vec<String>,
    /// Metric queries for the metrics collector.
    #[serde(default)]
    pub metric_queries: Vec<MetricQueryHint>,
    /// Peer workflow state-machine arns for the workflow collector.
    #[serde(default)]
    pub workflow_arns: Vec<String>,
}

impl IncidentHints {
    /// Removes blank log group entries and trims the rest.
    pub fn normalize(&mut self) {
        self.log_groups = self
            .log_groups
            .iter()
            .map(|group| group.trim().to_string())
            .filter(|group| !group.is_empty())
            .collect();
    }

    /// Returns true when no backend hint is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.log_groups.is_empty() && self.metric_queries.is_empty() && self.workflow_arns.is_empty()
    }
}

// ============================================================================
// SECTION: Incident Event
// ============================================================================

/// Public input contract (`incident_event.v1`).
///
/// # Invariants
/// - `event_id` is caller-provided and at least eight characters.
/// - `time_window` is timezone-aware with `end > start`.
/// - `hints` carries at least one non-empty list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentEvent {
    /// Schema identifier, always `incident_event.v1`.
    #[serde(default = "default_event_schema")]
    pub schema_version: String,
    /// Caller-provided identifier used for dedupe and idempotency.
    pub event_id: String,
    /// Optional incident identifier; server-assigned when absent.
    #[serde(default)]
    pub incident_id: Option<IncidentId>,
    /// Optional tenant identifier.
    #[serde(default)]
    pub tenant_id: Option<String>,
    /// Signal source (cloudwatch, newrelic, datadog, manual, ...).
    #[serde(default = "default_event_source")]
    pub source: String,
    /// Logical service/app name.
    pub service: String,
    /// Deployment environment (dev/stage/prod).
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Optional caller-asserted severity.
    #[serde(default)]
    pub severity: Option<Severity>,
    /// The anomaly window to collect evidence over.
    pub time_window: TimeWindow,
    /// Backend hints for the collectors.
    pub hints: IncidentHints,
}

/// Default schema identifier.
fn default_event_schema() -> String {
    INCIDENT_EVENT_SCHEMA.to_string()
}

/// Default signal source.
fn default_event_source() -> String {
    "manual".to_string()
}

/// Default environment label.
pub(crate) fn default_environment() -> String {
    "dev".to_string()
}

impl IncidentEvent {
    /// Validates the event and normalizes its hints in place.
    ///
    /// # Errors
    ///
    /// Returns [`IncidentEventError`] describing the first failed check.
    pub fn validate(&mut self) -> Result<(), IncidentEventError> {
        if self.event_id.len() < MIN_EVENT_ID_LENGTH {
            return Err(IncidentEventError::EventIdTooShort);
        }
        if self.service.trim().is_empty() {
            return Err(IncidentEventError::EmptyService);
        }
        self.time_window.validate()?;
        self.hints.normalize();
        if self.hints.is_empty() {
            return Err(IncidentEventError::NoHints);
        }
        Ok(())
    }
}
