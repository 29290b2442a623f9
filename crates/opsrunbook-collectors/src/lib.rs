// crates/opsrunbook-collectors/src/lib.rs
// ============================================================================
// Module: OpsRunbook Collectors Library
// Description: Evidence collectors, backend interfaces, and the snapshot step.
// Purpose: Turn backend hints into bounded, content-addressed evidence.
// Dependencies: opsrunbook-core, serde_json, time
// ============================================================================

//! ## Overview
//! Each collector is a pure step over one backend capability trait: skipped
//! when unhinted, structured-error on failure, and always bounded by row and
//! byte budgets before crossing the durable boundary. The snapshot persister
//! aggregates the three results and emits the event the analyzer reacts to.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod backend;
pub mod context;
pub mod logs;
pub mod metrics;
pub mod snapshot;
pub mod stub;
pub mod workflow;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use backend::BackendError;
pub use backend::ExecutionDescription;
pub use backend::ExecutionListItem;
pub use backend::ExecutionListPage;
pub use backend::FailureDetails;
pub use backend::LogQueryRequest;
pub use backend::LogQueryState;
pub use backend::LogsBackend;
pub use backend::MetricDataPage;
pub use backend::MetricDataQuery;
pub use backend::MetricDataResult;
pub use backend::MetricsBackend;
pub use backend::RawHistoryEvent;
pub use backend::WorkflowBackend;
pub use context::CollectorContext;
pub use logs::collect_logs;
pub use metrics::auto_period;
pub use metrics::collect_metrics;
pub use snapshot::SnapshotError;
pub use snapshot::SnapshotOutcome;
pub use snapshot::persist_snapshot;
pub use stub::StubLogsBackend;
pub use stub::StubMetricsBackend;
pub use stub::StubWorkflowBackend;
pub use workflow::WorkflowTarget;
pub use workflow::collect_workflow;
pub use workflow::infer_last_failed_state;
