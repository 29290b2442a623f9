// crates/opsrunbook-collectors/src/workflow.rs
// ============================================================================
// Module: Workflow Collector
// Description: Orchestrator execution and failed-peer evidence collection.
// Purpose: Produce bounded workflow evidence with staged budget enforcement.
// Dependencies: opsrunbook-core, time, crate::{backend, context}
// ============================================================================

//! ## Overview
//! Two sections: the orchestrator's own execution (describe plus a bounded
//! newest-first history tail) and failed peer executions listed per state
//! machine and terminal status, stopped at the first start date before the
//! window. The orchestrator's own arn is removed from the peer list to avoid
//! self-reporting; the orchestrator observing itself as `RUNNING` is
//! expected and never a failure signal.
//!
//! Byte-budget enforcement is staged: drop inputs/outputs and keep five tail
//! events, then drop the tail entirely, then clip every error/cause string.

// ============================================================================
// SECTION: Imports
// ============================================================================

use opsrunbook_core::CollectorResult;
use opsrunbook_core::CollectorType;
use opsrunbook_core::EVIDENCE_SCHEMA;
use opsrunbook_core::EventBus;
use opsrunbook_core::FailedExecution;
use opsrunbook_core::FailedExecutionsSection;
use opsrunbook_core::HistoryEvent;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::OrchestratorSection;
use opsrunbook_core::Redactor;
use opsrunbook_core::WorkflowSection;
use opsrunbook_core::format_rfc3339;
use opsrunbook_core::json_size_bytes;
use opsrunbook_core::now_rfc3339;
use serde_json::Value;
use serde_json::json;
use time::OffsetDateTime;

use crate::backend::RawHistoryEvent;
use crate::backend::WorkflowBackend;
use crate::context::CollectorContext;
use crate::context::emit_collected;
use crate::context::persist_evidence;

// ============================================================================
// SECTION: Caps
// ============================================================================

/// Maximum failed peer executions kept.
pub const MAX_EXECUTIONS: usize = 20;
/// Maximum error/cause length before budget clipping.
pub const MAX_ERROR_LENGTH: usize = 1000;
/// Maximum history tail entries.
pub const MAX_HISTORY_TAIL: usize = 50;
/// Maximum execution input/output length.
pub const MAX_INPUT_OUTPUT_CHARS: usize = 2000;
/// Terminal statuses treated as failures.
pub const FAILED_STATUSES: [&str; 3] = ["FAILED", "TIMED_OUT", "ABORTED"];
/// Listing page size per (state machine, status).
const LIST_PAGE_SIZE: usize = 100;
/// Tail error label cap.
const TAIL_ERROR_CHARS: usize = 200;
/// Tail cause text cap.
const TAIL_CAUSE_CHARS: usize = 300;
/// Error/cause cap applied by the final budget stage.
const BUDGET_ERROR_CHARS: usize = 200;
/// Tail entries kept by the first budget stage.
const STAGE_ONE_TAIL: usize = 5;

// ============================================================================
// SECTION: Targets
// ============================================================================

/// Workflow arns the collector operates over.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkflowTarget {
    /// The orchestrator's own execution arn, when running inside one.
    pub orchestrator_execution_arn: Option<String>,
    /// The orchestrator's state-machine arn.
    pub orchestrator_state_machine_arn: Option<String>,
    /// Peer state-machine arns from the incident hints.
    pub state_machine_arns: Vec<String>,
}

impl WorkflowTarget {
    /// Returns true when there is nothing to collect.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.orchestrator_execution_arn.is_none() && self.state_machine_arns.is_empty()
    }
}

// ============================================================================
// SECTION: Collector
// ============================================================================

/// Collects workflow evidence for one incident window.
///
/// Skips when no arns are targeted. Backend failures degrade into section
/// error fields and never propagate.
#[must_use]
pub fn collect_workflow(
    ctx: &CollectorContext,
    target: &WorkflowTarget,
    backend: &dyn WorkflowBackend,
    store: &dyn ObjectStore,
    bus: Option<&dyn EventBus>,
) -> CollectorResult {
    if target.is_empty() {
        return CollectorResult::skipped(CollectorType::Workflow);
    }

    let redactor = Redactor::new();
    let mut sections: Vec<WorkflowSection> = Vec::new();
    let mut truncated = false;

    if let Some(execution_arn) = &target.orchestrator_execution_arn {
        sections.push(WorkflowSection::OrchestratorExecution(collect_orchestrator(
            backend,
            &redactor,
            execution_arn,
            target.orchestrator_state_machine_arn.clone(),
        )));
    }

    if !target.state_machine_arns.is_empty() {
        let (section, listing_truncated) = collect_failed_executions(
            ctx,
            backend,
            &redactor,
            &target.state_machine_arns,
            target.orchestrator_execution_arn.as_deref(),
        );
        truncated = truncated || listing_truncated;
        sections.push(WorkflowSection::FailedExecutions(section));
    }

    let created_at = now_rfc3339();
    let budget_truncated = enforce_budget(ctx, &created_at, &mut sections);
    truncated = truncated || budget_truncated;

    let payload = make_payload(ctx, &created_at, &sections);
    match persist_evidence(ctx, CollectorType::Workflow, &payload, truncated, store) {
        Ok(evidence_ref) => {
            emit_collected(ctx, &evidence_ref, bus);
            CollectorResult {
                collector_type: CollectorType::Workflow,
                skipped: false,
                evidence_ref: Some(evidence_ref),
                error: None,
                cause: None,
            }
        }
        Err(err) => CollectorResult {
            collector_type: CollectorType::Workflow,
            skipped: false,
            evidence_ref: None,
            error: Some("workflow collection failed".to_string()),
            cause: Some(err.to_string()),
        },
    }
}

// ============================================================================
// SECTION: Orchestrator Section
// ============================================================================

/// Describes the orchestrator execution and its bounded history tail.
fn collect_orchestrator(
    backend: &dyn WorkflowBackend,
    redactor: &Redactor,
    execution_arn: &str,
    state_machine_arn: Option<String>,
) -> OrchestratorSection {
    let mut section = OrchestratorSection {
        execution_arn: execution_arn.to_string(),
        state_machine_arn,
        status: None,
        start_date: None,
        stop_date: None,
        input: None,
        output: None,
        error: None,
        cause: None,
        last_failed_state: None,
        history_events_count: 0,
        history_tail: Vec::new(),
        history_error: None,
    };

    match backend.describe_execution(execution_arn) {
        Ok(desc) => {
            section.status = desc.status;
            section.start_date = desc.start_date.map(format_rfc3339);
            section.stop_date = desc.stop_date.map(format_rfc3339);
            section.error =
                desc.error.map(|text| clip(&redactor.redact_text(&text), MAX_ERROR_LENGTH));
            section.cause =
                desc.cause.map(|text| clip(&redactor.redact_text(&text), MAX_ERROR_LENGTH));
            section.input =
                desc.input.map(|text| clip(&redactor.redact_text(&text), MAX_INPUT_OUTPUT_CHARS));
            section.output =
                desc.output.map(|text| clip(&redactor.redact_text(&text), MAX_INPUT_OUTPUT_CHARS));
        }
        Err(err) => {
            section.error = Some(clip(&err.to_string(), MAX_ERROR_LENGTH));
        }
    }

    match backend.execution_history(execution_arn, MAX_HISTORY_TAIL, true) {
        Ok(events) => {
            section.history_events_count = events.len();
            section.history_tail = events
                .iter()
                .take(MAX_HISTORY_TAIL)
                .map(|event| tail_entry(redactor, event))
                .collect();
            section.last_failed_state = infer_last_failed_state(&events);
        }
        Err(err) => {
            section.history_error = Some(clip(&err.to_string(), 500));
        }
    }

    section
}

/// Builds one bounded history tail entry.
fn tail_entry(redactor: &Redactor, event: &RawHistoryEvent) -> HistoryEvent {
    let failure = event.is_failure().then(|| event.failure.clone().unwrap_or_default());
    HistoryEvent {
        id: Some(event.id),
        event_type: event.event_type.clone(),
        timestamp: event.timestamp.map(format_rfc3339),
        error: failure
            .as_ref()
            .and_then(|details| details.error.as_deref())
            .map(|text| clip(&redactor.redact_text(text), TAIL_ERROR_CHARS)),
        cause: failure
            .as_ref()
            .and_then(|details| details.cause.as_deref())
            .map(|text| clip(&redactor.redact_text(text), TAIL_CAUSE_CHARS)),
    }
}

/// Infers the last failed state from a newest-first event list.
///
/// The first failure-typed event wins. Its detail name is preferred; the
/// fallback is the first `TaskStateEntered` name in the same newest-first
/// scan, then the event type string.
#[must_use]
pub fn infer_last_failed_state(events: &[RawHistoryEvent]) -> Option<String> {
    for event in events {
        if !event.is_failure() {
            continue;
        }
        if let Some(failure) = &event.failure
            && let Some(name) = &failure.name
            && !name.is_empty()
        {
            return Some(name.clone());
        }
        for prev in events {
            if prev.event_type == "TaskStateEntered"
                && let Some(name) = &prev.entered_state_name
                && !name.is_empty()
            {
                return Some(name.clone());
            }
        }
        return Some(event.event_type.clone());
    }
    None
}

// ============================================================================
// SECTION: Failed Executions Section
// ============================================================================

/// Lists, dedupes, sorts, caps, and enriches failed peer executions.
fn collect_failed_executions(
    ctx: &CollectorContext,
    backend: &dyn WorkflowBackend,
    redactor: &Redactor,
    state_machine_arns: &[String],
    orchestrator_execution_arn: Option<&str>,
) -> (FailedExecutionsSection, bool) {
    let mut found: Vec<(Option<OffsetDateTime>, FailedExecution)> = Vec::new();
    for arn in state_machine_arns {
        for status in FAILED_STATUSES {
            found.extend(list_failed_in_window(ctx, backend, arn, status));
        }
    }

    if let Some(own_arn) = orchestrator_execution_arn {
        found.retain(|(_, execution)| execution.execution_arn != own_arn);
    }

    found.sort_by(|left, right| right.0.cmp(&left.0));
    let total_found = found.len();
    let truncated = total_found > MAX_EXECUTIONS;
    found.truncate(MAX_EXECUTIONS);

    let executions = found
        .into_iter()
        .map(|(_, execution)| enrich_failed(backend, redactor, execution))
        .collect();

    (
        FailedExecutionsSection {
            state_machine_arns: state_machine_arns.to_vec(),
            total_found,
            executions,
        },
        truncated,
    )
}

/// Pages one (state machine, status) listing until leaving the window.
///
/// Entries starting after the window end are skipped; the first entry
/// starting before the window start stops the listing (inclusive-exclusive).
fn list_failed_in_window(
    ctx: &CollectorContext,
    backend: &dyn WorkflowBackend,
    state_machine_arn: &str,
    status: &str,
) -> Vec<(Option<OffsetDateTime>, FailedExecution)> {
    let mut out = Vec::new();
    let mut next_token: Option<String> = None;
    loop {
        let page = match backend.list_executions(
            state_machine_arn,
            status,
            LIST_PAGE_SIZE,
            next_token.as_deref(),
        ) {
            Ok(page) => page,
            Err(err) => {
                tracing::warn!(
                    state_machine_arn,
                    status,
                    error = %err,
                    "failed-execution listing aborted"
                );
                return out;
            }
        };
        for item in page.executions {
            if let Some(start) = item.start_date {
                if start < ctx.time_window.start {
                    return out;
                }
                if start > ctx.time_window.end {
                    continue;
                }
            }
            out.push((
                item.start_date,
                FailedExecution {
                    execution_arn: item.execution_arn,
                    state_machine_arn: state_machine_arn.to_string(),
                    name: item.name,
                    status: item.status,
                    start_date: item.start_date.map(format_rfc3339),
                    stop_date: item.stop_date.map(format_rfc3339),
                    error: None,
                    cause: None,
                    last_failed_state: None,
                },
            ));
        }
        next_token = page.next_token;
        if next_token.is_none() {
            return out;
        }
    }
}

/// Enriches one failed execution with error/cause and failed-state details.
fn enrich_failed(
    backend: &dyn WorkflowBackend,
    redactor: &Redactor,
    mut execution: FailedExecution,
) -> FailedExecution {
    if let Ok(desc) = backend.describe_execution(&execution.execution_arn) {
        execution.error =
            desc.error.map(|text| clip(&redactor.redact_text(&text), MAX_ERROR_LENGTH));
        execution.cause =
            desc.cause.map(|text| clip(&redactor.redact_text(&text), MAX_ERROR_LENGTH));
    }
    if let Ok(events) = backend.execution_history(&execution.execution_arn, MAX_HISTORY_TAIL, true)
    {
        execution.last_failed_state = infer_last_failed_state(&events);
    }
    execution
}

// ============================================================================
// SECTION: Budget Enforcement
// ============================================================================

/// Applies the staged byte budget to the sections, returning whether any
/// stage fired.
fn enforce_budget(
    ctx: &CollectorContext,
    created_at: &str,
    sections: &mut Vec<WorkflowSection>,
) -> bool {
    if json_size_bytes(&make_payload(ctx, created_at, sections)) <= ctx.max_total_bytes {
        return false;
    }

    for section in sections.iter_mut() {
        if let WorkflowSection::OrchestratorExecution(orchestrator) = section {
            orchestrator.history_tail.truncate(STAGE_ONE_TAIL);
            orchestrator.input = None;
            orchestrator.output = None;
        }
    }
    if json_size_bytes(&make_payload(ctx, created_at, sections)) <= ctx.max_total_bytes {
        return true;
    }

    for section in sections.iter_mut() {
        if let WorkflowSection::OrchestratorExecution(orchestrator) = section {
            orchestrator.history_tail.clear();
        }
    }
    if json_size_bytes(&make_payload(ctx, created_at, sections)) <= ctx.max_total_bytes {
        return true;
    }

    for section in sections.iter_mut() {
        match section {
            WorkflowSection::OrchestratorExecution(orchestrator) => {
                orchestrator.error =
                    orchestrator.error.take().map(|text| clip(&text, BUDGET_ERROR_CHARS));
                orchestrator.cause =
                    orchestrator.cause.take().map(|text| clip(&text, BUDGET_ERROR_CHARS));
            }
            WorkflowSection::FailedExecutions(failed) => {
                for execution in &mut failed.executions {
                    execution.error =
                        execution.error.take().map(|text| clip(&text, BUDGET_ERROR_CHARS));
                    execution.cause =
                        execution.cause.take().map(|text| clip(&text, BUDGET_ERROR_CHARS));
                }
            }
        }
    }
    true
}

/// Builds the blob payload from the current sections.
fn make_payload(ctx: &CollectorContext, created_at: &str, sections: &[WorkflowSection]) -> Value {
    json!({
        "schema_version": EVIDENCE_SCHEMA,
        "collector_type": CollectorType::Workflow,
        "incident_id": ctx.incident_id,
        "collector_run_id": ctx.collector_run_id,
        "created_at": created_at,
        "time_window": ctx.time_window,
        "sections": sections,
    })
}

// ============================================================================
// SECTION: Clipping
// ============================================================================

/// Clips text to a character budget with a truncation marker.
fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push_str("...[truncated]");
    out
}
