// crates/opsrunbook-actions/src/executor.rs
// ============================================================================
// Module: Action Executor
// Description: Gated, idempotent execution of the ticket/notify/pr sequence.
// Purpose: Realize the plan as recorded, auditable external side effects.
// Dependencies: opsrunbook-analyzer, opsrunbook-core, opsrunbook-resolver
// ============================================================================

//! ## Overview
//! Shared pre-flight for every action: the global kill switch returns without
//! executing anything; an existing successful `ACTION#` record of the same
//! type is reused without a duplicate external call or event. Execution order
//! is fixed: ticket first, notify consumes the ticket refs, and the PR action
//! consumes the ticket key for branch naming behind the repo-confidence gate.
//! Every exception is caught into a failed result; nothing retries in
//! process.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;

use opsrunbook_analyzer::build_notify_body;
use opsrunbook_analyzer::build_pr_body;
use opsrunbook_analyzer::build_pr_notes;
use opsrunbook_analyzer::generate_plan;
use opsrunbook_core::ACTION_RESULT_SCHEMA;
use opsrunbook_core::ActionId;
use opsrunbook_core::ActionPlan;
use opsrunbook_core::ActionResult;
use opsrunbook_core::ActionStatus;
use opsrunbook_core::ActionType;
use opsrunbook_core::DomainEvent;
use opsrunbook_core::EventBus;
use opsrunbook_core::IncidentPacket;
use opsrunbook_core::MappingRule;
use opsrunbook_core::QueryOrder;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use opsrunbook_core::RepoResolution;
use opsrunbook_core::clip_summary;
use opsrunbook_core::now_rfc3339;
use opsrunbook_core::records::SK_ACTION_PREFIX;
use opsrunbook_core::records::SK_ACTIONS_LATEST;
use opsrunbook_core::records::pk_incident;
use opsrunbook_core::records::sk_action;
use opsrunbook_core::records::sk_action_plan;
use opsrunbook_resolver::resolve_repo;
use serde_json::Value;
use serde_json::json;

use crate::providers::CardLink;
use crate::providers::ChatNotifier;
use crate::providers::PrNotesRequest;
use crate::providers::SourceControlClient;
use crate::providers::TicketClient;

// ============================================================================
// SECTION: Settings
// ============================================================================

/// Write-side execution settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSettings {
    /// Global kill switch; nothing executes when false.
    pub automation_enabled: bool,
    /// Whether executors run against fakes.
    pub dry_run: bool,
    /// Whether the PR channel executes at all.
    pub enable_pr_action: bool,
    /// Repo-confidence gate for the PR action.
    pub pr_confidence_threshold: f64,
    /// Source-control owner used to qualify bare repo names.
    pub owner: String,
    /// Priority-ordered mapping rules for the resolver.
    pub mapping_rules: Vec<MappingRule>,
    /// Legacy service -> repo map for the resolver.
    pub legacy_repo_map: BTreeMap<String, String>,
}

/// Provider clients selected at construction (real or dry-run).
#[derive(Clone)]
pub struct ActionClients {
    /// Tracker capability; absent skips the ticket action.
    pub ticket: Option<Arc<dyn TicketClient>>,
    /// Chat capability; absent skips the notify action.
    pub notify: Option<Arc<dyn ChatNotifier>>,
    /// Source-control capability; absent skips the PR action.
    pub github: Option<Arc<dyn SourceControlClient>>,
}

// ============================================================================
// SECTION: Outcome
// ============================================================================

/// Outcome of one action-runner invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The kill switch is engaged; nothing executed.
    AutomationDisabled,
    /// The plan was generated and the actions were driven to results.
    Completed(RunReport),
}

/// The generated plan plus per-action results.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// The deterministic plan.
    pub plan: ActionPlan,
    /// Sort key of the persisted plan record.
    pub plan_sk: String,
    /// Results in execution order.
    pub results: Vec<ActionResult>,
}

// ============================================================================
// SECTION: Runner
// ============================================================================

/// Executes the action plan for one analyzed packet.
#[must_use]
pub fn run_actions(
    packet: &IncidentPacket,
    settings: &ActionSettings,
    clients: &ActionClients,
    records: &dyn RecordStore,
    bus: Option<&dyn EventBus>,
) -> RunOutcome {
    if !settings.automation_enabled {
        tracing::info!(incident_id = %packet.incident_id, "automation disabled; skipping actions");
        return RunOutcome::AutomationDisabled;
    }

    let plan = generate_plan(packet, settings.dry_run);
    let pk = pk_incident(&packet.incident_id);
    let plan_sk = persist_plan(records, &pk, &plan);
    let mut action_sks: Vec<String> = Vec::new();
    let mut results: Vec<ActionResult> = Vec::new();

    let ticket_result = execute_or_reuse(records, bus, &pk, &mut action_sks, ActionType::Ticket, || {
        execute_ticket(packet, &plan, clients)
    });
    let ticket_refs = ticket_external_refs(&ticket_result);
    results.push(ticket_result);

    let notify_result =
        execute_or_reuse(records, bus, &pk, &mut action_sks, ActionType::Notify, || {
            execute_notify(packet, &plan, clients, ticket_refs.as_ref())
        });
    results.push(notify_result);

    if settings.enable_pr_action {
        let pr_result = execute_or_reuse(records, bus, &pk, &mut action_sks, ActionType::Pr, || {
            execute_pr(packet, &plan, settings, clients, ticket_refs.as_ref())
        });
        results.push(pr_result);
    }

    update_latest_pointer(records, &pk, &packet.incident_id.to_string(), &plan_sk, &action_sks);

    RunOutcome::Completed(RunReport {
        plan,
        plan_sk,
        results,
    })
}

/// Runs the idempotency check, executes on miss, persists, and emits.
fn execute_or_reuse(
    records: &dyn RecordStore,
    bus: Option<&dyn EventBus>,
    pk: &str,
    action_sks: &mut Vec<String>,
    action_type: ActionType,
    execute: impl FnOnce() -> ActionResult,
) -> ActionResult {
    if let Some(existing) = find_existing_success(records, pk, action_type) {
        tracing::info!(action_type = action_type.as_str(), "action idempotent reuse");
        return existing;
    }
    let result = execute();
    if let Some(sk) = persist_result(records, pk, &result) {
        action_sks.push(sk);
    }
    emit_completed(bus, &result);
    result
}

/// Finds an existing successful result of one action type.
fn find_existing_success(
    records: &dyn RecordStore,
    pk: &str,
    action_type: ActionType,
) -> Option<ActionResult> {
    let rows = records.query(pk, SK_ACTION_PREFIX, QueryOrder::Ascending, None).ok()?;
    for row in rows {
        if row.field_str("action_type") == Some(action_type.as_str())
            && row.field_str("status") == Some(ActionStatus::Success.as_str())
            && let Ok(result) =
                serde_json::from_value::<ActionResult>(Value::Object(row.fields.clone()))
        {
            return Some(result);
        }
    }
    None
}

// ============================================================================
// SECTION: Ticket Action
// ============================================================================

/// Executes the ticket action.
fn execute_ticket(
    packet: &IncidentPacket,
    plan: &ActionPlan,
    clients: &ActionClients,
) -> ActionResult {
    let Some(action) = plan.action(ActionType::Ticket) else {
        return skipped(packet, ActionType::Ticket, "no ticket action in plan");
    };
    let Some(client) = clients.ticket.as_ref() else {
        return skipped(packet, ActionType::Ticket, "ticket_not_configured");
    };
    match client.create_issue(&action.title, &action.description_md, action.priority) {
        Ok(refs) => {
            let mut result = base_result(packet, ActionType::Ticket, ActionStatus::Success);
            result.request_summary = clip_summary(&format!("Created issue: {}", action.title));
            result.response_summary = clip_summary(&format!("key={}", refs.issue_key));
            result.external_refs.insert("ticket_key".to_string(), json!(refs.issue_key));
            result.external_refs.insert("ticket_url".to_string(), json!(refs.url));
            result.evidence_refs = action.evidence_refs.clone();
            result
        }
        Err(err) => {
            let mut result = base_result(packet, ActionType::Ticket, ActionStatus::Failed);
            result.request_summary = clip_summary(&format!("Attempted: {}", action.title));
            result.error = Some(err.to_string().chars().take(500).collect());
            result.evidence_refs = action.evidence_refs.clone();
            result
        }
    }
}

// ============================================================================
// SECTION: Notify Action
// ============================================================================

/// Executes the notify action, consuming the ticket external refs.
fn execute_notify(
    packet: &IncidentPacket,
    plan: &ActionPlan,
    clients: &ActionClients,
    ticket_refs: Option<&(String, String)>,
) -> ActionResult {
    let Some(action) = plan.action(ActionType::Notify) else {
        return skipped(packet, ActionType::Notify, "no notify action in plan");
    };
    let Some(client) = clients.notify.as_ref() else {
        return skipped(packet, ActionType::Notify, "notify_not_configured");
    };
    let ticket = ticket_refs.map(|(key, url)| (key.as_str(), url.as_str()));
    let body = build_notify_body(packet, ticket);
    let mut links: Vec<CardLink> = Vec::new();
    if let Some((key, url)) = ticket
        && !key.is_empty()
    {
        links.push(CardLink {
            name: format!("Ticket {key}"),
            url: url.to_string(),
        });
    }
    match client.send_card(&action.title, &body, &links) {
        Ok(refs) => {
            let mut result = base_result(packet, ActionType::Notify, ActionStatus::Success);
            result.request_summary =
                clip_summary(&format!("Sent notification: {}", action.title));
            result.response_summary = clip_summary(&format!("status={}", refs.status_code));
            result
                .external_refs
                .insert("notify_message_id".to_string(), json!(refs.message_id));
            result.external_refs.insert("status_code".to_string(), json!(refs.status_code));
            result.evidence_refs = action.evidence_refs.clone();
            result
        }
        Err(err) => {
            let mut result = base_result(packet, ActionType::Notify, ActionStatus::Failed);
            result.request_summary = clip_summary(&format!("Attempted: {}", action.title));
            result.error = Some(err.to_string().chars().take(500).collect());
            result.evidence_refs = action.evidence_refs.clone();
            result
        }
    }
}

// ============================================================================
// SECTION: PR Action
// ============================================================================

/// Executes the PR action behind the repo-confidence gate.
fn execute_pr(
    packet: &IncidentPacket,
    plan: &ActionPlan,
    settings: &ActionSettings,
    clients: &ActionClients,
    ticket_refs: Option<&(String, String)>,
) -> ActionResult {
    let Some(action) = plan.action(ActionType::Pr) else {
        return skipped(packet, ActionType::Pr, "no pr action in plan");
    };
    let Some((ticket_key, ticket_url)) = ticket_refs else {
        let mut result = base_result(packet, ActionType::Pr, ActionStatus::Failed);
        result.request_summary = "No ticket key available for branch naming".to_string();
        result.error = Some("missing ticket key from prior ticket action result".to_string());
        result.evidence_refs = action.evidence_refs.clone();
        return result;
    };
    let Some(client) = clients.github.as_ref() else {
        return skipped(packet, ActionType::Pr, "github_not_configured");
    };

    let resolution = resolve_repo(
        packet,
        &settings.mapping_rules,
        Some(client.as_ref()),
        &settings.owner,
        &settings.legacy_repo_map,
    );
    tracing::info!(
        incident_id = %packet.incident_id,
        repo = %resolution.repo_full_name,
        confidence = resolution.confidence,
        verification = resolution.verification.as_str(),
        "repo resolution"
    );

    if resolution.repo_full_name.is_empty()
        || resolution.confidence < settings.pr_confidence_threshold
    {
        let reason = format!(
            "skipped: repo_confidence={:.2} < threshold={:.2} (repo={}, verification={})",
            resolution.confidence,
            settings.pr_confidence_threshold,
            if resolution.repo_full_name.is_empty() {
                "none"
            } else {
                resolution.repo_full_name.as_str()
            },
            resolution.verification.as_str()
        );
        let mut result = base_result(packet, ActionType::Pr, ActionStatus::Skipped);
        result.request_summary = clip_summary(&reason);
        result.error = Some(reason);
        result
            .external_refs
            .insert("repo_resolution".to_string(), resolution_value(&resolution));
        result.evidence_refs = action.evidence_refs.clone();
        return result;
    }

    let repo = resolution
        .repo_full_name
        .split_once('/')
        .map_or(resolution.repo_full_name.as_str(), |(_, name)| name)
        .to_string();
    let request = PrNotesRequest {
        repo,
        branch_name: format!("opsrunbook/{ticket_key}"),
        pr_title: format!(
            "{ticket_key} [{}] {}: incident {} — initial analysis",
            packet.environment, packet.service, packet.incident_id
        ),
        pr_body: build_pr_body(packet, ticket_key, ticket_url, &resolution),
        file_path: format!(".opsrunbook/pr-notes/{ticket_key}.md"),
        file_content: build_pr_notes(packet, ticket_key, ticket_url),
        commit_message: format!(
            "{ticket_key}: add incident analysis notes for {}",
            packet.incident_id
        ),
    };

    match client.create_pr_with_notes(&request) {
        Ok(refs) => {
            let mut result = base_result(packet, ActionType::Pr, ActionStatus::Success);
            let verb = if refs.reused_pr { "Updated" } else { "Created" };
            result.request_summary =
                clip_summary(&format!("{verb} PR: {}", request.pr_title));
            result.response_summary = clip_summary(&format!(
                "pr={} repo={} verification={}",
                refs.pr_url,
                resolution.repo_full_name,
                resolution.verification.as_str()
            ));
            result.external_refs.insert("github_owner".to_string(), json!(refs.owner));
            result.external_refs.insert("github_repo".to_string(), json!(refs.repo));
            result.external_refs.insert("branch".to_string(), json!(refs.branch));
            result
                .external_refs
                .insert("default_branch".to_string(), json!(refs.default_branch));
            result.external_refs.insert("pr_url".to_string(), json!(refs.pr_url));
            result.external_refs.insert("pr_number".to_string(), json!(refs.pr_number));
            result.external_refs.insert("commit_sha".to_string(), json!(refs.commit_sha));
            result.external_refs.insert("reused_pr".to_string(), json!(refs.reused_pr));
            result
                .external_refs
                .insert("repo_resolution".to_string(), resolution_value(&resolution));
            result.evidence_refs = action.evidence_refs.clone();
            result
        }
        Err(err) => {
            let mut result = base_result(packet, ActionType::Pr, ActionStatus::Failed);
            result.request_summary = clip_summary(&format!("Attempted: {}", request.pr_title));
            result.error = Some(err.to_string().chars().take(500).collect());
            result
                .external_refs
                .insert("repo_resolution".to_string(), resolution_value(&resolution));
            result.evidence_refs = action.evidence_refs.clone();
            result
        }
    }
}

// ============================================================================
// SECTION: Result Helpers
// ============================================================================

/// Builds the empty result shell for one action.
fn base_result(
    packet: &IncidentPacket,
    action_type: ActionType,
    status: ActionStatus,
) -> ActionResult {
    ActionResult {
        schema_version: ACTION_RESULT_SCHEMA.to_string(),
        incident_id: packet.incident_id.clone(),
        action_id: ActionId::generate(),
        action_type,
        status,
        created_at: now_rfc3339(),
        request_summary: String::new(),
        response_summary: String::new(),
        external_refs: serde_json::Map::new(),
        error: None,
        cause: None,
        evidence_refs: Vec::new(),
    }
}

/// Builds a skipped result with a policy reason.
fn skipped(packet: &IncidentPacket, action_type: ActionType, reason: &str) -> ActionResult {
    let mut result = base_result(packet, action_type, ActionStatus::Skipped);
    result.error = Some(reason.to_string());
    result
}

/// Extracts `(ticket_key, ticket_url)` from a ticket result.
fn ticket_external_refs(result: &ActionResult) -> Option<(String, String)> {
    let key = result.external_refs.get("ticket_key").and_then(Value::as_str)?;
    if key.is_empty() {
        return None;
    }
    let url = result
        .external_refs
        .get("ticket_url")
        .and_then(Value::as_str)
        .unwrap_or_default();
    Some((key.to_string(), url.to_string()))
}

/// Serializes a resolution for embedding in external refs.
fn resolution_value(resolution: &RepoResolution) -> Value {
    serde_json::to_value(resolution).unwrap_or(Value::Null)
}

// ============================================================================
// SECTION: Persistence and Events
// ============================================================================

/// Persists the plan record and returns its sort key.
fn persist_plan(records: &dyn RecordStore, pk: &str, plan: &ActionPlan) -> String {
    let sk = sk_action_plan(&plan.created_at);
    let mut fields = serde_json::Map::new();
    fields.insert("incident_id".to_string(), json!(plan.incident_id));
    fields.insert("created_at".to_string(), json!(plan.created_at));
    fields.insert("plan".to_string(), serde_json::to_value(plan).unwrap_or(Value::Null));
    if let Err(err) = records.put(&Record::new(pk, sk.clone(), fields)) {
        tracing::warn!(error = %err, "action plan record write failed");
    }
    sk
}

/// Persists one action result and returns its sort key.
fn persist_result(records: &dyn RecordStore, pk: &str, result: &ActionResult) -> Option<String> {
    let sk = sk_action(&result.created_at, &result.action_id);
    let Ok(Value::Object(fields)) = serde_json::to_value(result) else {
        return None;
    };
    match records.put(&Record::new(pk, sk.clone(), fields)) {
        Ok(()) => Some(sk),
        Err(err) => {
            tracing::warn!(error = %err, "action result record write failed");
            None
        }
    }
}

/// Updates the last-write-wins latest-actions pointer.
fn update_latest_pointer(
    records: &dyn RecordStore,
    pk: &str,
    incident_id: &str,
    plan_sk: &str,
    action_sks: &[String],
) {
    let mut fields = serde_json::Map::new();
    fields.insert("incident_id".to_string(), json!(incident_id));
    fields.insert("latest_actionplan_sk".to_string(), json!(plan_sk));
    fields.insert("latest_action_sks".to_string(), json!(action_sks));
    fields.insert("updated_at".to_string(), json!(now_rfc3339()));
    if let Err(err) = records.put(&Record::new(pk, SK_ACTIONS_LATEST, fields)) {
        tracing::warn!(error = %err, "latest actions pointer write failed");
    }
}

/// Emits `action.completed` best-effort.
fn emit_completed(bus: Option<&dyn EventBus>, result: &ActionResult) {
    let Some(bus) = bus else {
        return;
    };
    let detail = json!({
        "incident_id": result.incident_id,
        "action_type": result.action_type,
        "status": result.status,
        "external_refs": result.external_refs,
        "emitted_at": now_rfc3339(),
    });
    if let Err(err) = bus.emit(&DomainEvent::new("action.completed", detail)) {
        tracing::warn!(error = %err, "action.completed emit failed");
    }
}
