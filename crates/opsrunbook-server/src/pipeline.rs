// crates/opsrunbook-server/src/pipeline.rs
// ============================================================================
// Module: Pipeline Runtime
// Description: Local execution of the collect/snapshot/analyze/act chain.
// Purpose: Host the pipeline state machine behind a runtime capability.
// Dependencies: opsrunbook-actions, opsrunbook-analyzer, opsrunbook-collectors, tokio
// ============================================================================

//! ## Overview
//! The hosted workflow runtime is an external collaborator; this module
//! provides the runtime capability plus a local implementation that runs the
//! three collectors on parallel threads and the remaining transitions
//! sequentially on one blocking task. Run status is tracked on the `RUN#`
//! record (`STARTING`, `RUNNING`, `SUCCEEDED`, `FAILED`), and collector refs
//! land on the record at completion for the status endpoint.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use opsrunbook_actions::ActionClients;
use opsrunbook_actions::ActionSettings;
use opsrunbook_actions::run_actions;
use opsrunbook_analyzer::AnalyzeRequest;
use opsrunbook_analyzer::analyze;
use opsrunbook_collectors::CollectorContext;
use opsrunbook_collectors::LogsBackend;
use opsrunbook_collectors::MetricsBackend;
use opsrunbook_collectors::WorkflowBackend;
use opsrunbook_collectors::WorkflowTarget;
use opsrunbook_collectors::collect_logs;
use opsrunbook_collectors::collect_metrics;
use opsrunbook_collectors::collect_workflow;
use opsrunbook_collectors::persist_snapshot;
use opsrunbook_core::CollectorResult;
use opsrunbook_core::EventBus;
use opsrunbook_core::IncidentHints;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use opsrunbook_core::now_rfc3339;
use opsrunbook_core::records::pk_incident;
use opsrunbook_core::records::sk_run;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Pipeline runtime errors.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// No runtime is configured; ingress answers 503.
    #[error("pipeline runtime not configured")]
    NotConfigured,
    /// The execution could not be started.
    #[error("pipeline start failed: {0}")]
    Start(String),
}

// ============================================================================
// SECTION: Runtime Capability
// ============================================================================

/// One pipeline start request.
#[derive(Debug, Clone)]
pub struct StartRequest {
    /// Collector context for the run.
    pub ctx: CollectorContext,
    /// Normalized backend hints.
    pub hints: IncidentHints,
}

/// Workflow runtime capability hosting pipeline instances.
pub trait PipelineRuntime: Send + Sync {
    /// Starts one pipeline instance and returns its execution handle.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError`] when the instance cannot be started.
    fn start(&self, request: StartRequest) -> Result<String, PipelineError>;
}

// ============================================================================
// SECTION: Local Runtime
// ============================================================================

/// Backends the local runtime drives the collectors against.
#[derive(Clone)]
pub struct PipelineBackends {
    /// Analytic log query backend.
    pub logs: Arc<dyn LogsBackend>,
    /// Metric time-series backend.
    pub metrics: Arc<dyn MetricsBackend>,
    /// Workflow execution backend.
    pub workflow: Arc<dyn WorkflowBackend>,
}

/// Local in-process pipeline runtime.
///
/// # Invariants
/// - Collectors run in parallel; snapshot, analyze, and act are sequential.
/// - Every step failure is recorded on the `RUN#` record, never panicked.
#[derive(Clone)]
pub struct LocalPipelineRuntime {
    /// Object store for blobs.
    pub store: Arc<dyn ObjectStore>,
    /// Record store for durable rows.
    pub records: Arc<dyn RecordStore>,
    /// Optional event bus.
    pub bus: Option<Arc<dyn EventBus>>,
    /// Prefix -> repo map for suspected owners.
    pub resource_repo_map: std::collections::BTreeMap<String, String>,
    /// Write-side action settings.
    pub action_settings: ActionSettings,
    /// Provider clients for the action runner.
    pub action_clients: ActionClients,
    /// Collector backends.
    pub backends: PipelineBackends,
}

impl PipelineRuntime for LocalPipelineRuntime {
    fn start(&self, request: StartRequest) -> Result<String, PipelineError> {
        let runtime = self.clone();
        let handle = format!("local:{}", request.ctx.collector_run_id);
        drop(tokio::task::spawn_blocking(move || runtime.execute(&request)));
        Ok(handle)
    }
}

impl LocalPipelineRuntime {
    /// Runs the full chain for one instance, recording the terminal status.
    fn execute(&self, request: &StartRequest) {
        let ctx = &request.ctx;
        self.record_run_status(ctx, "RUNNING", &[], None);

        let results = self.collect_parallel(ctx, &request.hints);

        let bus = self.bus.as_deref();
        let snapshot = match persist_snapshot(ctx, &results, self.store.as_ref(), self.records.as_ref(), bus)
        {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(
                    incident_id = %ctx.incident_id,
                    error = %err,
                    "snapshot persist failed"
                );
                self.record_run_status(ctx, "FAILED", &results, Some(&err.to_string()));
                return;
            }
        };

        let analyze_request = AnalyzeRequest {
            incident_id: ctx.incident_id.clone(),
            collector_run_id: ctx.collector_run_id.clone(),
            snapshot_ref: snapshot.snapshot_ref,
            service: ctx.service.clone(),
            environment: ctx.environment.clone(),
            time_window: ctx.time_window,
        };
        let analyzed = match analyze(
            &analyze_request,
            &self.resource_repo_map,
            self.store.as_ref(),
            self.records.as_ref(),
            bus,
        ) {
            Ok(outcome) => outcome,
            Err(err) => {
                tracing::error!(incident_id = %ctx.incident_id, error = %err, "analysis failed");
                self.record_run_status(ctx, "FAILED", &results, Some(&err.to_string()));
                return;
            }
        };

        if let opsrunbook_analyzer::AnalyzerOutcome::Analyzed {
            packet, ..
        } = analyzed
        {
            let outcome = run_actions(
                &packet,
                &self.action_settings,
                &self.action_clients,
                self.records.as_ref(),
                bus,
            );
            tracing::info!(
                incident_id = %ctx.incident_id,
                automation_disabled =
                    matches!(outcome, opsrunbook_actions::RunOutcome::AutomationDisabled),
                "action runner finished"
            );
        }

        self.record_run_status(ctx, "SUCCEEDED", &results, None);
    }

    /// Runs the three collectors on parallel threads.
    fn collect_parallel(&self, ctx: &CollectorContext, hints: &IncidentHints) -> Vec<CollectorResult> {
        let store = self.store.as_ref();
        let bus = self.bus.as_deref();
        let workflow_target = WorkflowTarget {
            orchestrator_execution_arn: None,
            orchestrator_state_machine_arn: None,
            state_machine_arns: hints.workflow_arns.clone(),
        };

        std::thread::scope(|scope| {
            let logs = scope.spawn(|| {
                collect_logs(ctx, &hints.log_groups, self.backends.logs.as_ref(), store, bus)
            });
            let metrics = scope.spawn(|| {
                collect_metrics(
                    ctx,
                    &hints.metric_queries,
                    self.backends.metrics.as_ref(),
                    store,
                    bus,
                )
            });
            let workflow = scope.spawn(|| {
                collect_workflow(
                    ctx,
                    &workflow_target,
                    self.backends.workflow.as_ref(),
                    store,
                    bus,
                )
            });
            vec![
                join_collector(logs, opsrunbook_core::CollectorType::Logs),
                join_collector(metrics, opsrunbook_core::CollectorType::Metrics),
                join_collector(workflow, opsrunbook_core::CollectorType::Workflow),
            ]
        })
    }

    /// Writes the `RUN#` record for one status transition.
    fn record_run_status(
        &self,
        ctx: &CollectorContext,
        status: &str,
        results: &[CollectorResult],
        error: Option<&str>,
    ) {
        let evidence_refs: Vec<serde_json::Value> = results
            .iter()
            .filter_map(|result| result.evidence_ref.as_ref())
            .filter_map(|eref| serde_json::to_value(eref).ok())
            .collect();
        let mut fields = serde_json::Map::new();
        fields.insert("incident_id".to_string(), json!(ctx.incident_id));
        fields.insert("collector_run_id".to_string(), json!(ctx.collector_run_id));
        fields.insert("created_at".to_string(), json!(now_rfc3339()));
        fields.insert(
            "execution_handle".to_string(),
            json!(format!("local:{}", ctx.collector_run_id)),
        );
        fields.insert("status".to_string(), json!(status));
        fields.insert("evidence_refs".to_string(), json!(evidence_refs));
        if let Some(error) = error {
            fields.insert("error".to_string(), json!(error.chars().take(500).collect::<String>()));
        }
        let record =
            Record::new(pk_incident(&ctx.incident_id), sk_run(&ctx.collector_run_id), fields);
        if let Err(err) = self.records.put(&record) {
            tracing::warn!(error = %err, "run status record write failed");
        }
    }
}

/// Joins one collector thread, degrading a panic into an error result.
fn join_collector(
    handle: std::thread::ScopedJoinHandle<'_, CollectorResult>,
    collector_type: opsrunbook_core::CollectorType,
) -> CollectorResult {
    handle.join().unwrap_or_else(|_| CollectorResult {
        collector_type,
        skipped: false,
        evidence_ref: None,
        error: Some("collector thread panicked".to_string()),
        cause: None,
    })
}
