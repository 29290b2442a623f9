// crates/opsrunbook-analyzer/src/plan.rs
// ============================================================================
// Module: Plan Generator
// Description: Deterministic packet-to-plan mapping and markdown templates.
// Purpose: Produce the fixed ticket/notify/pr action sequence from a packet.
// Dependencies: opsrunbook-core, serde_json
// ============================================================================

//! ## Overview
//! `generate_plan` is a pure function: two calls over one packet produce
//! JSON-equal plans modulo the creation timestamp. It always emits three
//! action records in fixed order (ticket, notify, pr); whether the PR record
//! is *executed* is decided later by configuration and the confidence gate.
//! Every artifact committed to external systems is produced by the fixed
//! templates in this module, never by a model.

// ============================================================================
// SECTION: Imports
// ============================================================================

use opsrunbook_core::ACTION_PLAN_SCHEMA;
use opsrunbook_core::ActionPlan;
use opsrunbook_core::ActionType;
use opsrunbook_core::IncidentPacket;
use opsrunbook_core::PlannedAction;
use opsrunbook_core::RepoResolution;
use opsrunbook_core::derive_priority;
use opsrunbook_core::now_rfc3339;
use opsrunbook_core::sha256_hex;
use serde_json::json;

// ============================================================================
// SECTION: Plan Generation
// ============================================================================

/// Generates the deterministic action plan for one packet.
#[must_use]
pub fn generate_plan(packet: &IncidentPacket, dry_run: bool) -> ActionPlan {
    let priority = derive_priority(packet.findings.first().map(|finding| finding.confidence));
    let ticket_title = format!(
        "[{}] {}: incident {} — {} finding(s)",
        packet.environment,
        packet.service,
        packet.incident_id,
        packet.findings.len()
    );

    let ticket = PlannedAction {
        action_type: ActionType::Ticket,
        priority,
        title: ticket_title.clone(),
        description_md: build_ticket_description(packet),
        evidence_refs: packet.all_evidence_refs.clone(),
        links: Vec::new(),
        dry_run,
        context: None,
    };
    let notify = PlannedAction {
        action_type: ActionType::Notify,
        priority,
        title: ticket_title,
        description_md: String::new(),
        evidence_refs: packet.all_evidence_refs.clone(),
        links: Vec::new(),
        dry_run,
        context: None,
    };
    let pr = PlannedAction {
        action_type: ActionType::Pr,
        priority,
        title: format!("Incident {} analysis notes", packet.incident_id),
        description_md: String::new(),
        evidence_refs: packet.all_evidence_refs.clone(),
        links: Vec::new(),
        dry_run,
        context: Some(json!({
            "incident_id": packet.incident_id,
            "service": packet.service,
            "environment": packet.environment,
            "collector_run_id": packet.collector_run_id,
        })),
    };

    ActionPlan {
        schema_version: ACTION_PLAN_SCHEMA.to_string(),
        incident_id: packet.incident_id.clone(),
        created_at: now_rfc3339(),
        environment: packet.environment.clone(),
        service: packet.service.clone(),
        suspected_owners: packet.suspected_owners.clone(),
        actions: vec![ticket, notify, pr],
    }
}

/// Computes a stable plan hash ignoring timestamps.
///
/// Used by the replay endpoint to compare a regenerated plan against the
/// stored one.
#[must_use]
pub fn plan_hash(plan: &ActionPlan) -> String {
    let mut action_types: Vec<&str> =
        plan.actions.iter().map(|action| action.action_type.as_str()).collect();
    action_types.sort_unstable();
    let stable = json!({
        "incident_id": plan.incident_id,
        "service": plan.service,
        "environment": plan.environment,
        "action_types": action_types,
        "action_count": plan.actions.len(),
        "suspected_owners": plan.suspected_owners,
    });
    opsrunbook_core::canonical_json_bytes(&stable).map_or_else(|_| String::new(), |bytes| sha256_hex(&bytes))
}

// ============================================================================
// SECTION: Templates
// ============================================================================

/// Builds the ticket description markdown from the packet.
#[must_use]
pub fn build_ticket_description(packet: &IncidentPacket) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("## Incident `{}`", packet.incident_id));
    lines.push(String::new());
    lines.push(format!("- **Service**: {}", packet.service));
    lines.push(format!("- **Environment**: {}", packet.environment));
    lines.push(format!(
        "- **Time window**: {} → {}",
        opsrunbook_core::format_rfc3339(packet.time_window.start),
        opsrunbook_core::format_rfc3339(packet.time_window.end)
    ));
    lines.push(String::new());

    lines.push(format!("## Findings ({})", packet.findings.len()));
    for finding in packet.findings.iter().take(5) {
        lines.push(format!(
            "- [{:.0}%] **{}**: {}",
            finding.confidence * 100.0,
            finding.id,
            finding.summary
        ));
    }
    if packet.findings.is_empty() {
        lines.push("- No findings.".to_string());
    }
    lines.push(String::new());

    if !packet.hypotheses.is_empty() {
        lines.push("## Hypotheses".to_string());
        for hypothesis in packet.hypotheses.iter().take(3) {
            lines.push(format!(
                "- [{:.0}%] {}",
                hypothesis.confidence * 100.0,
                hypothesis.summary
            ));
        }
        lines.push(String::new());
    }

    if !packet.limits.is_empty() {
        lines.push("## Limits".to_string());
        for limit in &packet.limits {
            lines.push(format!("- {limit}"));
        }
        lines.push(String::new());
    }

    lines.push("---".to_string());
    lines.push("*Auto-generated by opsrunbook-copilot.*".to_string());
    lines.join("\n")
}

/// Builds the chat notification body.
///
/// Contains the incident id, environment, window, top finding, and the
/// ticket link when one exists.
#[must_use]
pub fn build_notify_body(packet: &IncidentPacket, ticket: Option<(&str, &str)>) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!(
        "Incident `{}` analyzed in **{}** ({}).",
        packet.incident_id, packet.environment, packet.service
    ));
    lines.push(format!(
        "Window: {} → {}",
        opsrunbook_core::format_rfc3339(packet.time_window.start),
        opsrunbook_core::format_rfc3339(packet.time_window.end)
    ));
    if let Some(finding) = packet.findings.first() {
        lines.push(format!(
            "Top finding: [{:.0}%] {}",
            finding.confidence * 100.0,
            finding.summary
        ));
    } else {
        lines.push("No findings were produced.".to_string());
    }
    if let Some((key, url)) = ticket {
        lines.push(format!("Ticket: [{key}]({url})"));
    }
    lines.join("\n\n")
}

/// Builds the deterministic PR notes file content.
#[must_use]
pub fn build_pr_notes(packet: &IncidentPacket, ticket_key: &str, ticket_url: &str) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push(format!("# Incident {} analysis notes", packet.incident_id));
    lines.push(String::new());
    lines.push(format!("- **Ticket**: [{ticket_key}]({ticket_url})"));
    lines.push(format!("- **Service**: {}", packet.service));
    lines.push(format!("- **Environment**: {}", packet.environment));
    lines.push(format!(
        "- **Time window**: {} → {}",
        opsrunbook_core::format_rfc3339(packet.time_window.start),
        opsrunbook_core::format_rfc3339(packet.time_window.end)
    ));
    lines.push(String::new());

    lines.push(format!("## Findings ({})", packet.findings.len()));
    for finding in &packet.findings {
        lines.push(format!(
            "- [{:.0}%] **{}**: {} ({} evidence ref(s))",
            finding.confidence * 100.0,
            finding.id,
            finding.summary,
            finding.evidence_refs.len()
        ));
    }
    lines.push(String::new());

    lines.push("## Evidence".to_string());
    for eref in &packet.all_evidence_refs {
        lines.push(format!(
            "- `{}` sha256={} ({} bytes{})",
            eref.key,
            eref.sha256,
            eref.byte_size,
            if eref.truncated { ", truncated" } else { "" }
        ));
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push("*Auto-generated by opsrunbook-copilot. Human review required.*".to_string());
    lines.join("\n")
}

/// Builds the deterministic PR body.
///
/// Opens with the copilot marker the review guardrails look for and ends
/// with the full repo-resolution trace.
#[must_use]
pub fn build_pr_body(
    packet: &IncidentPacket,
    ticket_key: &str,
    ticket_url: &str,
    resolution: &RepoResolution,
) -> String {
    let mut lines: Vec<String> = Vec::new();
    lines.push("<!-- opsrunbook_copilot: true -->".to_string());
    lines.push(format!("## Incident `{}`", packet.incident_id));
    lines.push(String::new());
    lines.push("| Field | Value |".to_string());
    lines.push("|-------|-------|".to_string());
    lines.push(format!("| **Service** | {} |", packet.service));
    lines.push(format!("| **Environment** | {} |", packet.environment));
    lines.push(format!(
        "| **Time Window** | {} → {} |",
        opsrunbook_core::format_rfc3339(packet.time_window.start),
        opsrunbook_core::format_rfc3339(packet.time_window.end)
    ));
    lines.push(format!("| **Ticket** | [{ticket_key}]({ticket_url}) |"));
    lines.push(format!(
        "| **Repo Confidence** | {:.0}% ({}) |",
        resolution.confidence * 100.0,
        resolution.verification.as_str()
    ));
    lines.push(String::new());

    if !packet.findings.is_empty() {
        lines.push(format!("### {} Finding(s)", packet.findings.len()));
        for finding in packet.findings.iter().take(5) {
            let summary: String = finding.summary.chars().take(150).collect();
            lines.push(format!(
                "- [{:.0}%] {} ({} evidence ref(s))",
                finding.confidence * 100.0,
                summary,
                finding.evidence_refs.len()
            ));
        }
        lines.push(String::new());
    }

    if !packet.all_evidence_refs.is_empty() {
        let total_bytes: usize =
            packet.all_evidence_refs.iter().map(|eref| eref.byte_size).sum();
        let mut collector_types: Vec<&str> = packet
            .all_evidence_refs
            .iter()
            .map(|eref| eref.collector_type.as_str())
            .collect();
        collector_types.sort_unstable();
        collector_types.dedup();
        lines.push("### Evidence Summary".to_string());
        lines.push(format!(
            "- **{}** evidence object(s) collected",
            packet.all_evidence_refs.len()
        ));
        lines.push(format!("- Collector types: {}", collector_types.join(", ")));
        lines.push(format!("- Total evidence size: {total_bytes} bytes"));
        lines.push(String::new());
    }

    lines.push("### Repo Resolution".to_string());
    lines.push(format!("- **Repo**: `{}`", resolution.repo_full_name));
    lines.push(format!("- **Confidence**: {:.0}%", resolution.confidence * 100.0));
    lines.push(format!("- **Verification**: {}", resolution.verification.as_str()));
    for reason in &resolution.reasons {
        lines.push(format!("- {reason}"));
    }
    if !resolution.trace_frames.is_empty() {
        lines.push(format!(
            "- **Trace frames**: {} app frame(s)",
            resolution.trace_frames.len()
        ));
        for frame in resolution.trace_frames.iter().take(3) {
            lines.push(format!(
                "  - `{}:{}`",
                frame.normalized_path,
                frame.line.map_or_else(|| "?".to_string(), |line| line.to_string())
            ));
        }
    }
    lines.push(String::new());
    lines.push("---".to_string());
    lines.push(
        "*Auto-generated by opsrunbook-copilot. Human review required before merge.*".to_string(),
    );
    lines.join("\n")
}
