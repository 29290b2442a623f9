// crates/opsrunbook-collectors/src/backend.rs
// ============================================================================
// Module: Collector Backend Interfaces
// Description: Capability traits for the logs, metrics, and workflow backends.
// Purpose: Keep collectors pure over narrow, fakeable backend surfaces.
// Dependencies: opsrunbook-core, serde_json, time, thiserror
// ============================================================================

//! ## Overview
//! Each collector queries exactly one backend over one time window. The
//! backends are modeled as narrow capability traits so the pipeline can be
//! exercised end-to-end against deterministic fakes; production adapters for
//! the hosted query services live outside this crate's scope.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde_json::Value;
use thiserror::Error;
use time::OffsetDateTime;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Backend call errors surfaced into collector results.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The backend rejected the request.
    #[error("backend rejected request: {0}")]
    Rejected(String),
    /// The backend call failed.
    #[error("backend call failed: {0}")]
    Call(String),
}

// ============================================================================
// SECTION: Logs Backend
// ============================================================================

/// One bounded analytic log query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogQueryRequest {
    /// Log groups the query runs over.
    pub log_groups: Vec<String>,
    /// Analytic query text.
    pub query: String,
    /// Window start as epoch seconds.
    pub start_epoch: i64,
    /// Window end as epoch seconds.
    pub end_epoch: i64,
    /// Backend-side row limit.
    pub limit: usize,
}

/// Polled state of one analytic query.
#[derive(Debug, Clone, PartialEq)]
pub struct LogQueryState {
    /// Backend status string (`Running`, `Complete`, `Failed`, ...).
    pub status: String,
    /// Normalized result rows (field/value maps).
    pub rows: Vec<Value>,
    /// Backend statistics payload.
    pub stats: Value,
}

impl LogQueryState {
    /// Returns true for backend-terminal statuses.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self.status.as_str(), "Complete" | "Failed" | "Cancelled" | "Timeout")
    }
}

/// Analytic log query backend.
pub trait LogsBackend: Send + Sync {
    /// Starts a query and returns its backend identifier.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the query cannot be started.
    fn start_query(&self, request: &LogQueryRequest) -> Result<String, BackendError>;

    /// Fetches the current state of a started query.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the probe fails.
    fn get_query_results(&self, query_id: &str) -> Result<LogQueryState, BackendError>;
}

// ============================================================================
// SECTION: Metrics Backend
// ============================================================================

/// One metric data query in backend form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDataQuery {
    /// Query identifier (`m<idx>`).
    pub id: String,
    /// Metric namespace.
    pub namespace: String,
    /// Metric name.
    pub metric_name: String,
    /// Dimension name/value pairs.
    pub dimensions: BTreeMap<String, String>,
    /// Aggregation period in seconds.
    pub period: u32,
    /// Statistic to fetch.
    pub stat: String,
}

/// One series result from the metrics backend.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDataResult {
    /// Query identifier the series answers.
    pub id: String,
    /// Series label.
    pub label: String,
    /// Point timestamps.
    pub timestamps: Vec<OffsetDateTime>,
    /// Point values.
    pub values: Vec<f64>,
}

/// One page of metric data results.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDataPage {
    /// Series results on this page.
    pub results: Vec<MetricDataResult>,
    /// Continuation token; `None` ends pagination.
    pub next_token: Option<String>,
}

/// Metric time-series backend.
pub trait MetricsBackend: Send + Sync {
    /// Fetches one page of metric data for the queries over the window.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the fetch fails.
    fn get_metric_data(
        &self,
        queries: &[MetricDataQuery],
        start: OffsetDateTime,
        end: OffsetDateTime,
        next_token: Option<&str>,
    ) -> Result<MetricDataPage, BackendError>;
}

// ============================================================================
// SECTION: Workflow Backend
// ============================================================================

/// Description of one workflow execution.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionDescription {
    /// Execution status string.
    pub status: Option<String>,
    /// Execution start time.
    pub start_date: Option<OffsetDateTime>,
    /// Execution stop time.
    pub stop_date: Option<OffsetDateTime>,
    /// Raw execution input.
    pub input: Option<String>,
    /// Raw execution output.
    pub output: Option<String>,
    /// Error label for failed executions.
    pub error: Option<String>,
    /// Failure cause for failed executions.
    pub cause: Option<String>,
}

/// Failure details attached to failure-typed history events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FailureDetails {
    /// Failed state or resource name, when the backend reported one.
    pub name: Option<String>,
    /// Error label.
    pub error: Option<String>,
    /// Cause text.
    pub cause: Option<String>,
}

/// One raw history event from the workflow backend.
#[derive(Debug, Clone, PartialEq)]
pub struct RawHistoryEvent {
    /// Backend event id.
    pub id: i64,
    /// Backend event type string.
    pub event_type: String,
    /// Event timestamp.
    pub timestamp: Option<OffsetDateTime>,
    /// Failure details for failure-typed events.
    pub failure: Option<FailureDetails>,
    /// State name for state-entered events.
    pub entered_state_name: Option<String>,
}

impl RawHistoryEvent {
    /// Returns true for failure-typed events.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.event_type.contains("Failed")
            || self.event_type.contains("TimedOut")
            || self.event_type.contains("Aborted")
    }
}

/// One execution summary from a listing page.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionListItem {
    /// Execution arn.
    pub execution_arn: String,
    /// Execution name.
    pub name: String,
    /// Execution status string.
    pub status: String,
    /// Execution start time.
    pub start_date: Option<OffsetDateTime>,
    /// Execution stop time.
    pub stop_date: Option<OffsetDateTime>,
}

/// One page of execution summaries.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionListPage {
    /// Executions on this page, newest-first.
    pub executions: Vec<ExecutionListItem>,
    /// Continuation token; `None` ends pagination.
    pub next_token: Option<String>,
}

/// Workflow execution backend.
pub trait WorkflowBackend: Send + Sync {
    /// Describes one execution.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the call fails.
    fn describe_execution(&self, execution_arn: &str) -> Result<ExecutionDescription, BackendError>;

    /// Fetches a bounded execution history, newest-first when `reverse`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the call fails.
    fn execution_history(
        &self,
        execution_arn: &str,
        max_results: usize,
        reverse: bool,
    ) -> Result<Vec<RawHistoryEvent>, BackendError>;

    /// Lists executions of one state machine filtered by status.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError`] when the call fails.
    fn list_executions(
        &self,
        state_machine_arn: &str,
        status_filter: &str,
        max_results: usize,
        next_token: Option<&str>,
    ) -> Result<ExecutionListPage, BackendError>;
}
