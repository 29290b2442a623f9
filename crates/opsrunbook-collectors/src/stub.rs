// crates/opsrunbook-collectors/src/stub.rs
// ============================================================================
// Module: Stub Backends
// Description: Deterministic in-process backends for the three collectors.
// Purpose: Back dry-run wiring and tests without hosted query services.
// Dependencies: crate::backend
// ============================================================================

//! ## Overview
//! The hosted log-query, metric, and workflow services are external
//! collaborators. These stubs satisfy the backend capability traits with
//! canned, deterministic data so the pipeline can run end-to-end in dry-run
//! mode and under test. Queries resolve terminally on the first probe, so
//! polling loops never sleep against them.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;

use serde_json::Value;
use time::OffsetDateTime;

use crate::backend::BackendError;
use crate::backend::ExecutionDescription;
use crate::backend::ExecutionListItem;
use crate::backend::ExecutionListPage;
use crate::backend::LogQueryRequest;
use crate::backend::LogQueryState;
use crate::backend::LogsBackend;
use crate::backend::MetricDataPage;
use crate::backend::MetricDataQuery;
use crate::backend::MetricDataResult;
use crate::backend::MetricsBackend;
use crate::backend::RawHistoryEvent;
use crate::backend::WorkflowBackend;

// ============================================================================
// SECTION: Logs Stub
// ============================================================================

/// Deterministic logs backend answering queries from canned rows.
#[derive(Debug, Default)]
pub struct StubLogsBackend {
    /// Canned rows keyed by query text.
    responses: Mutex<BTreeMap<String, Vec<Value>>>,
    /// Started queries keyed by query id.
    started: Mutex<BTreeMap<String, String>>,
}

impl StubLogsBackend {
    /// Creates a stub with no canned rows (every query completes empty).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cans rows for one query text.
    pub fn set_rows(&self, query: &str, rows: Vec<Value>) {
        if let Ok(mut guard) = self.responses.lock() {
            guard.insert(query.to_string(), rows);
        }
    }
}

impl LogsBackend for StubLogsBackend {
    fn start_query(&self, request: &LogQueryRequest) -> Result<String, BackendError> {
        let mut started = self
            .started
            .lock()
            .map_err(|_| BackendError::Call("stub mutex poisoned".to_string()))?;
        let query_id = format!("q{}", started.len());
        started.insert(query_id.clone(), request.query.clone());
        Ok(query_id)
    }

    fn get_query_results(&self, query_id: &str) -> Result<LogQueryState, BackendError> {
        let started = self
            .started
            .lock()
            .map_err(|_| BackendError::Call("stub mutex poisoned".to_string()))?;
        let query = started
            .get(query_id)
            .ok_or_else(|| BackendError::Rejected(format!("unknown query id {query_id}")))?;
        let responses = self
            .responses
            .lock()
            .map_err(|_| BackendError::Call("stub mutex poisoned".to_string()))?;
        let rows = responses.get(query).cloned().unwrap_or_default();
        Ok(LogQueryState {
            status: "Complete".to_string(),
            rows,
            stats: Value::Object(serde_json::Map::new()),
        })
    }
}

// ============================================================================
// SECTION: Metrics Stub
// ============================================================================

/// Deterministic metrics backend answering from canned pages.
#[derive(Debug, Default)]
pub struct StubMetricsBackend {
    /// Canned pages consumed in order.
    pages: Mutex<Vec<MetricDataPage>>,
}

impl StubMetricsBackend {
    /// Creates a stub answering one empty page.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cans one single-page response with the given series.
    #[must_use]
    pub fn with_series(series: Vec<MetricDataResult>) -> Self {
        let stub = Self::default();
        if let Ok(mut guard) = stub.pages.lock() {
            guard.push(MetricDataPage {
                results: series,
                next_token: None,
            });
        }
        stub
    }

    /// Appends a page; every page except the last carries a token.
    pub fn push_page(&self, page: MetricDataPage) {
        if let Ok(mut guard) = self.pages.lock() {
            guard.push(page);
        }
    }
}

impl MetricsBackend for StubMetricsBackend {
    fn get_metric_data(
        &self,
        _queries: &[MetricDataQuery],
        _start: OffsetDateTime,
        _end: OffsetDateTime,
        _next_token: Option<&str>,
    ) -> Result<MetricDataPage, BackendError> {
        let mut pages = self
            .pages
            .lock()
            .map_err(|_| BackendError::Call("stub mutex poisoned".to_string()))?;
        if pages.is_empty() {
            return Ok(MetricDataPage {
                results: Vec::new(),
                next_token: None,
            });
        }
        Ok(pages.remove(0))
    }
}

// ============================================================================
// SECTION: Workflow Stub
// ============================================================================

/// Deterministic workflow backend answering from canned executions.
#[derive(Debug, Default, Clone)]
pub struct StubWorkflowBackend {
    /// Descriptions keyed by execution arn.
    descriptions: Arc<Mutex<BTreeMap<String, ExecutionDescription>>>,
    /// Histories keyed by execution arn (newest-first).
    histories: Arc<Mutex<BTreeMap<String, Vec<RawHistoryEvent>>>>,
    /// Listings keyed by `(state machine arn, status)` (newest-first).
    listings: Arc<Mutex<BTreeMap<(String, String), Vec<ExecutionListItem>>>>,
}

impl StubWorkflowBackend {
    /// Creates an empty workflow stub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Cans one execution description.
    pub fn set_description(&self, execution_arn: &str, description: ExecutionDescription) {
        if let Ok(mut guard) = self.descriptions.lock() {
            guard.insert(execution_arn.to_string(), description);
        }
    }

    /// Cans one newest-first execution history.
    pub fn set_history(&self, execution_arn: &str, events: Vec<RawHistoryEvent>) {
        if let Ok(mut guard) = self.histories.lock() {
            guard.insert(execution_arn.to_string(), events);
        }
    }

    /// Cans one newest-first listing for a (state machine, status) pair.
    pub fn set_listing(&self, state_machine_arn: &str, status: &str, items: Vec<ExecutionListItem>) {
        if let Ok(mut guard) = self.listings.lock() {
            guard.insert((state_machine_arn.to_string(), status.to_string()), items);
        }
    }
}

impl WorkflowBackend for StubWorkflowBackend {
    fn describe_execution(
        &self,
        execution_arn: &str,
    ) -> Result<ExecutionDescription, BackendError> {
        let guard = self
            .descriptions
            .lock()
            .map_err(|_| BackendError::Call("stub mutex poisoned".to_string()))?;
        Ok(guard.get(execution_arn).cloned().unwrap_or_default())
    }

    fn execution_history(
        &self,
        execution_arn: &str,
        max_results: usize,
        _reverse: bool,
    ) -> Result<Vec<RawHistoryEvent>, BackendError> {
        let guard = self
            .histories
            .lock()
            .map_err(|_| BackendError::Call("stub mutex poisoned".to_string()))?;
        let mut events = guard.get(execution_arn).cloned().unwrap_or_default();
        events.truncate(max_results);
        Ok(events)
    }

    fn list_executions(
        &self,
        state_machine_arn: &str,
        status_filter: &str,
        _max_results: usize,
        _next_token: Option<&str>,
    ) -> Result<ExecutionListPage, BackendError> {
        let guard = self
            .listings
            .lock()
            .map_err(|_| BackendError::Call("stub mutex poisoned".to_string()))?;
        let executions = guard
            .get(&(state_machine_arn.to_string(), status_filter.to_string()))
            .cloned()
            .unwrap_or_default();
        Ok(ExecutionListPage {
            executions,
            next_token: None,
        })
    }
}
