// crates/opsrunbook-analyzer/src/analyzer.rs
// ============================================================================
// Module: Incident Analyzer
// Description: Deterministic snapshot-to-packet analysis with idempotency.
// Purpose: Produce the structured packet the plan generator consumes.
// Dependencies: opsrunbook-core, serde_json, tracing
// ============================================================================

//! ## Overview
//! The analyzer reacts to a persisted snapshot. It refuses to run twice for
//! one collector run (idempotency by `PACKET#` query), loads every available
//! collector blob (missing blobs become limits, never failures), runs the
//! deterministic per-type analysis, computes suspected owners by substring
//! matching resource names against the configured prefix map, finalizes the
//! packet with its canonical hash, persists it, and emits
//! `incident.analyzed`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use opsrunbook_core::CollectorRunId;
use opsrunbook_core::CollectorType;
use opsrunbook_core::DomainEvent;
use opsrunbook_core::EventBus;
use opsrunbook_core::EvidenceBlob;
use opsrunbook_core::EvidenceKind;
use opsrunbook_core::EvidenceRef;
use opsrunbook_core::Finding;
use opsrunbook_core::Hypothesis;
use opsrunbook_core::IncidentId;
use opsrunbook_core::IncidentPacket;
use opsrunbook_core::ModelTrace;
use opsrunbook_core::NextAction;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::PACKET_SCHEMA;
use opsrunbook_core::PacketError;
use opsrunbook_core::QueryOrder;
use opsrunbook_core::Record;
use opsrunbook_core::RecordStore;
use opsrunbook_core::SnapshotManifest;
use opsrunbook_core::SnapshotRef;
use opsrunbook_core::SuspectedOwner;
use opsrunbook_core::TimeWindow;
use opsrunbook_core::WorkflowSection;
use opsrunbook_core::hashing::canonical_bytes_and_sha;
use opsrunbook_core::now_rfc3339;
use opsrunbook_core::packet_key;
use opsrunbook_core::records::SK_PACKET_PREFIX;
use opsrunbook_core::records::pk_incident;
use opsrunbook_core::records::sk_packet;
use serde_json::Value;
use serde_json::json;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Maximum bytes read back per evidence blob.
const MAX_BLOB_READ_BYTES: usize = 1_048_576;

/// Statuses treated as orchestrator failures.
const ORCHESTRATOR_FAILED_STATUSES: [&str; 3] = ["FAILED", "TIMED_OUT", "ABORTED"];

/// Owner confidence floor before reason bonuses.
const OWNER_BASE_CONFIDENCE: f64 = 0.3;
/// Owner confidence bonus per matching reason.
const OWNER_REASON_BONUS: f64 = 0.1;
/// Owner confidence ceiling.
const OWNER_MAX_CONFIDENCE: f64 = 0.8;
/// Confidence of the unknown-owner fallback.
const OWNER_UNKNOWN_CONFIDENCE: f64 = 0.1;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Analyzer errors.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    /// The snapshot manifest could not be loaded.
    #[error("snapshot load failed: {0}")]
    SnapshotLoad(String),
    /// The packet failed validation or hashing.
    #[error("packet finalize failed: {0}")]
    Finalize(#[from] PacketError),
    /// A durable write failed.
    #[error("packet persist failed: {0}")]
    Persist(String),
}

// ============================================================================
// SECTION: Request and Outcome
// ============================================================================

/// Inputs extracted from the `evidence.snapshot.persisted` event.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalyzeRequest {
    /// Incident under analysis.
    pub incident_id: IncidentId,
    /// Pipeline instance the snapshot belongs to.
    pub collector_run_id: CollectorRunId,
    /// Pointer to the snapshot manifest.
    pub snapshot_ref: SnapshotRef,
    /// Logical service name.
    pub service: String,
    /// Deployment environment.
    pub environment: String,
    /// Window the evidence covers.
    pub time_window: TimeWindow,
}

/// Analyzer outcome.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalyzerOutcome {
    /// A packet already exists for this run; nothing was written.
    AlreadyAnalyzed,
    /// A packet was produced and persisted.
    Analyzed {
        /// The finalized packet.
        packet: Box<IncidentPacket>,
        /// Object key the packet was written to.
        packet_key: String,
        /// Stable packet hash.
        packet_sha256: String,
    },
}

// ============================================================================
// SECTION: Analyzer
// ============================================================================

/// Runs the deterministic analysis for one snapshot.
///
/// # Errors
///
/// Returns [`AnalyzerError`] when the snapshot cannot be loaded or the
/// packet cannot be finalized or persisted. Missing collector blobs are
/// tolerated and surface as limits.
pub fn analyze(
    request: &AnalyzeRequest,
    resource_repo_map: &BTreeMap<String, String>,
    store: &dyn ObjectStore,
    records: &dyn RecordStore,
    bus: Option<&dyn EventBus>,
) -> Result<AnalyzerOutcome, AnalyzerError> {
    let pk = pk_incident(&request.incident_id);
    if packet_exists(records, &pk, &request.collector_run_id) {
        tracing::info!(
            incident_id = %request.incident_id,
            collector_run_id = %request.collector_run_id,
            "analyzer idempotent skip"
        );
        return Ok(AnalyzerOutcome::AlreadyAnalyzed);
    }

    let manifest = load_manifest(store, &request.snapshot_ref)?;
    let (blobs, mut limits, all_evidence_refs) = load_evidence(store, &manifest);

    let mut findings: Vec<Finding> = Vec::new();
    let mut hypotheses: Vec<Hypothesis> = Vec::new();
    let mut next_actions: Vec<NextAction> = Vec::new();

    for collector_type in [CollectorType::Logs, CollectorType::Metrics, CollectorType::Workflow] {
        let Some((evidence_ref, blob)) = blobs.get(&collector_type) else {
            limits.push(unavailable_limit(collector_type));
            continue;
        };
        let outcome = match &blob.kind {
            EvidenceKind::Logs(logs) => analyze_logs(logs, evidence_ref),
            EvidenceKind::Metrics(metrics) => analyze_metrics(metrics, evidence_ref),
            EvidenceKind::Workflow(workflow) => analyze_workflow(workflow, evidence_ref),
        };
        findings.extend(outcome.findings);
        hypotheses.extend(outcome.hypotheses);
        next_actions.extend(outcome.next_actions);
        limits.extend(outcome.limits);
    }

    let suspected_owners =
        suspected_owners(&manifest, blobs.values().map(|(_, blob)| blob), resource_repo_map);

    // Pinning the model trace to the snapshot timestamp keeps re-analysis
    // of one snapshot hash-identical.
    let analyzed_at = manifest.created_at.clone();
    let created_at = now_rfc3339();
    let mut packet = IncidentPacket {
        schema_version: PACKET_SCHEMA.to_string(),
        incident_id: request.incident_id.clone(),
        collector_run_id: request.collector_run_id.clone(),
        service: request.service.clone(),
        environment: request.environment.clone(),
        time_window: request.time_window,
        snapshot_ref: request.snapshot_ref.clone(),
        findings,
        hypotheses,
        next_actions,
        suspected_owners,
        limits,
        model_trace: ModelTrace {
            provider: "stub".to_string(),
            model: None,
            prompt_version: "v1".to_string(),
            created_at: analyzed_at,
        },
        packet_hashes: None,
        all_evidence_refs,
    };
    packet.finalize()?;

    let (bytes, _sha) =
        canonical_bytes_and_sha(&packet).map_err(|err| AnalyzerError::Persist(err.to_string()))?;
    let packet_sha256 = packet
        .packet_hashes
        .as_ref()
        .map_or_else(String::new, |hashes| hashes.sha256.clone());
    let byte_size = bytes.len();
    let key = packet_key(&request.incident_id, &request.collector_run_id);
    store
        .put(&request.snapshot_ref.bucket, &key, bytes)
        .map_err(|err| AnalyzerError::Persist(err.to_string()))?;

    persist_packet_record(records, request, &pk, &created_at, &key, &packet_sha256, byte_size)?;
    emit_analyzed(request, &packet, &key, &packet_sha256, byte_size, &created_at, bus);

    Ok(AnalyzerOutcome::Analyzed {
        packet: Box::new(packet),
        packet_key: key,
        packet_sha256,
    })
}

/// Returns true when a packet record already exists for this run.
fn packet_exists(records: &dyn RecordStore, pk: &str, run_id: &CollectorRunId) -> bool {
    records
        .query(pk, SK_PACKET_PREFIX, QueryOrder::Descending, None)
        .map(|rows| {
            rows.iter().any(|row| row.field_str("collector_run_id") == Some(run_id.as_str()))
        })
        .unwrap_or(false)
}

/// Loads and decodes the snapshot manifest.
fn load_manifest(
    store: &dyn ObjectStore,
    snapshot_ref: &SnapshotRef,
) -> Result<SnapshotManifest, AnalyzerError> {
    let bytes = store
        .get(&snapshot_ref.bucket, &snapshot_ref.key, MAX_BLOB_READ_BYTES)
        .map_err(|err| AnalyzerError::SnapshotLoad(err.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|err| AnalyzerError::SnapshotLoad(err.to_string()))
}

/// Loads every non-skipped collector blob; missing blobs become limits.
fn load_evidence(
    store: &dyn ObjectStore,
    manifest: &SnapshotManifest,
) -> (BTreeMap<CollectorType, (EvidenceRef, EvidenceBlob)>, Vec<String>, Vec<EvidenceRef>) {
    let mut blobs = BTreeMap::new();
    let mut limits = Vec::new();
    let mut all_refs = Vec::new();
    for collector in &manifest.collectors {
        let Some(evidence_ref) = &collector.evidence_ref else {
            continue;
        };
        all_refs.push(evidence_ref.clone());
        if collector.skipped {
            continue;
        }
        match store.get(&evidence_ref.bucket, &evidence_ref.key, MAX_BLOB_READ_BYTES) {
            Ok(bytes) => match serde_json::from_slice::<EvidenceBlob>(&bytes) {
                Ok(blob) => {
                    blobs.insert(collector.collector_type, (evidence_ref.clone(), blob));
                }
                Err(err) => {
                    tracing::warn!(
                        collector_type = collector.collector_type.as_str(),
                        error = %err,
                        "evidence blob decode failed"
                    );
                    limits.push(format!(
                        "{} evidence could not be decoded.",
                        collector.collector_type.as_str()
                    ));
                }
            },
            Err(err) => {
                tracing::warn!(
                    collector_type = collector.collector_type.as_str(),
                    error = %err,
                    "evidence blob load failed"
                );
                limits.push(format!(
                    "{} evidence could not be loaded.",
                    collector.collector_type.as_str()
                ));
            }
        }
    }
    (blobs, limits, all_refs)
}

/// Builds the unavailable-collector limit line.
fn unavailable_limit(collector_type: CollectorType) -> String {
    let label = match collector_type {
        CollectorType::Logs => "Logs",
        CollectorType::Metrics => "Metrics",
        CollectorType::Workflow => "Workflow",
    };
    format!("{label} collector evidence not available or skipped.")
}

// ============================================================================
// SECTION: Per-Type Analysis
// ============================================================================

/// Items one per-type pass contributes to the packet.
#[derive(Debug, Default)]
struct AnalysisOutcome {
    /// Contributed findings.
    findings: Vec<Finding>,
    /// Contributed hypotheses.
    hypotheses: Vec<Hypothesis>,
    /// Contributed follow-up actions.
    next_actions: Vec<NextAction>,
    /// Contributed limits.
    limits: Vec<String>,
}

/// Analyzes the logs blob.
fn analyze_logs(logs: &opsrunbook_core::LogsEvidence, eref: &EvidenceRef) -> AnalysisOutcome {
    let mut out = AnalysisOutcome::default();
    let mut error_messages: Vec<String> = Vec::new();
    for section in &logs.sections {
        if section.name != "recent_errors" {
            continue;
        }
        let Some(rows) = &section.rows else {
            continue;
        };
        for row in rows.iter().take(10) {
            if let Some(message) = row.get("@message").and_then(Value::as_str)
                && !message.is_empty()
            {
                error_messages.push(message.chars().take(300).collect());
            }
        }
    }

    if error_messages.is_empty() {
        out.limits
            .push("No errors found in log evidence; logs may be empty or filtered.".to_string());
        return out;
    }

    let top: String = error_messages[0].chars().take(120).collect();
    out.findings.push(Finding {
        id: "logs-errors-found".to_string(),
        summary: format!("Found {} recent error(s) in logs. Top: {top}", error_messages.len()),
        confidence: 0.8,
        evidence_refs: vec![eref.clone()],
        notes: Some(format!("Total errors sampled: {}", error_messages.len())),
    });
    out.hypotheses.push(Hypothesis {
        summary: "Application is throwing runtime errors; check recent deployments or config changes."
            .to_string(),
        confidence: 0.5,
        evidence_refs: vec![eref.clone()],
    });
    out.next_actions.push(NextAction {
        summary: "Inspect full error logs with the analytic follow-up query".to_string(),
        commands: vec![
            "fields @timestamp, @message | filter @message like /ERROR|Exception/ | sort @timestamp desc | limit 50"
                .to_string(),
        ],
        links: Vec::new(),
        evidence_refs: vec![eref.clone()],
    });
    out
}

/// Analyzes the metrics blob.
fn analyze_metrics(
    metrics: &opsrunbook_core::MetricsEvidence,
    eref: &EvidenceRef,
) -> AnalysisOutcome {
    let mut out = AnalysisOutcome::default();
    if metrics.series.is_empty() {
        out.limits.push("Metrics evidence present but no series data found.".to_string());
        return out;
    }
    out.findings.push(Finding {
        id: "metrics-collected".to_string(),
        summary: format!(
            "Collected {} metric series. Stub mode; no anomaly detection.",
            metrics.series.len()
        ),
        confidence: 0.4,
        evidence_refs: vec![eref.clone()],
        notes: None,
    });
    out.next_actions.push(NextAction {
        summary: "Review the collected metric series for anomalies manually".to_string(),
        commands: Vec::new(),
        links: Vec::new(),
        evidence_refs: vec![eref.clone()],
    });
    out
}

/// Analyzes the workflow blob.
///
/// A `RUNNING` orchestrator never produces a failure finding: the collector
/// runs inside the orchestrator and always observes itself as running.
fn analyze_workflow(
    workflow: &opsrunbook_core::WorkflowEvidence,
    eref: &EvidenceRef,
) -> AnalysisOutcome {
    let mut out = AnalysisOutcome::default();
    if workflow.sections.is_empty() {
        out.limits.push("Workflow evidence has no sections.".to_string());
        return out;
    }
    for section in &workflow.sections {
        match section {
            WorkflowSection::OrchestratorExecution(orchestrator) => {
                if let Some(status) = &orchestrator.status
                    && ORCHESTRATOR_FAILED_STATUSES.contains(&status.as_str())
                {
                    let error: String = orchestrator
                        .error
                        .as_deref()
                        .unwrap_or("N/A")
                        .chars()
                        .take(200)
                        .collect();
                    out.findings.push(Finding {
                        id: "stepfn-orchestrator-failed".to_string(),
                        summary: format!("Orchestrator execution status: {status}. Error: {error}"),
                        confidence: 0.9,
                        evidence_refs: vec![eref.clone()],
                        notes: None,
                    });
                }
                if let Some(state) = &orchestrator.last_failed_state {
                    out.hypotheses.push(Hypothesis {
                        summary: format!(
                            "Failure in state '{state}'; check that function's logs and permissions."
                        ),
                        confidence: 0.5,
                        evidence_refs: vec![eref.clone()],
                    });
                }
            }
            WorkflowSection::FailedExecutions(failed) => {
                if let Some(latest) = failed.executions.first() {
                    out.findings.push(Finding {
                        id: "stepfn-failed-executions".to_string(),
                        summary: format!(
                            "Found {} failed execution(s). Latest: {} status={}",
                            failed.executions.len(),
                            latest.name,
                            latest.status
                        ),
                        confidence: 0.8,
                        evidence_refs: vec![eref.clone()],
                        notes: None,
                    });
                    out.next_actions.push(NextAction {
                        summary: "Inspect the latest failed workflow execution".to_string(),
                        commands: Vec::new(),
                        links: vec![latest.execution_arn.clone()],
                        evidence_refs: vec![eref.clone()],
                    });
                }
            }
        }
    }
    out
}

// ============================================================================
// SECTION: Suspected Owners
// ============================================================================

/// Computes suspected owners by substring-matching resource names.
fn suspected_owners<'a>(
    manifest: &SnapshotManifest,
    blobs: impl Iterator<Item = &'a EvidenceBlob>,
    resource_repo_map: &BTreeMap<String, String>,
) -> Vec<SuspectedOwner> {
    let mut resource_names: BTreeSet<String> = BTreeSet::new();
    if !manifest.service.is_empty() {
        resource_names.insert(manifest.service.clone());
    }
    for blob in blobs {
        collect_resource_names(blob, &mut resource_names);
    }

    let mut candidates: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
    for name in &resource_names {
        let lowered = name.to_lowercase();
        for (prefix, repo) in resource_repo_map {
            if lowered.contains(&prefix.to_lowercase()) {
                candidates
                    .entry(repo.clone())
                    .or_default()
                    .insert(format!("resource '{name}' matches prefix '{prefix}'"));
            }
        }
    }

    let mut owners: Vec<SuspectedOwner> = candidates
        .into_iter()
        .map(|(repo, reasons)| {
            #[allow(
                clippy::cast_precision_loss,
                reason = "Reason counts are tiny; precision cannot be lost."
            )]
            let bonus = OWNER_REASON_BONUS * reasons.len() as f64;
            SuspectedOwner {
                repo,
                confidence: (OWNER_BASE_CONFIDENCE + bonus).min(OWNER_MAX_CONFIDENCE),
                reasons: reasons.into_iter().collect(),
            }
        })
        .collect();
    if owners.is_empty() {
        owners.push(SuspectedOwner {
            repo: "unknown".to_string(),
            confidence: OWNER_UNKNOWN_CONFIDENCE,
            reasons: vec!["No resource-to-repo mapping matched".to_string()],
        });
    }
    owners
}

/// Extracts matchable resource names from one evidence blob.
fn collect_resource_names(blob: &EvidenceBlob, names: &mut BTreeSet<String>) {
    match &blob.kind {
        EvidenceKind::Logs(logs) => {
            for group in &logs.log_groups {
                let parts: Vec<&str> = group.trim_matches('/').split('/').collect();
                if parts.len() >= 3
                    && let Some(last) = parts.last()
                    && !last.is_empty()
                {
                    names.insert((*last).to_string());
                }
            }
        }
        EvidenceKind::Metrics(_) => {}
        EvidenceKind::Workflow(workflow) => {
            for section in &workflow.sections {
                match section {
                    WorkflowSection::OrchestratorExecution(orchestrator) => {
                        insert_arn_tail(&orchestrator.execution_arn, names);
                        if let Some(arn) = &orchestrator.state_machine_arn {
                            insert_arn_tail(arn, names);
                        }
                    }
                    WorkflowSection::FailedExecutions(failed) => {
                        for arn in &failed.state_machine_arns {
                            insert_arn_tail(arn, names);
                        }
                        for execution in &failed.executions {
                            insert_arn_tail(&execution.execution_arn, names);
                            insert_arn_tail(&execution.state_machine_arn, names);
                        }
                    }
                }
            }
        }
    }
}

/// Inserts the resource component of an arn tail.
fn insert_arn_tail(arn: &str, names: &mut BTreeSet<String>) {
    if !arn.contains(':') {
        return;
    }
    if let Some(tail) = arn.rsplit(':').next() {
        let component = tail.split('/').next().unwrap_or(tail);
        if !component.is_empty() {
            names.insert(component.to_string());
        }
    }
}

// ============================================================================
// SECTION: Persistence and Events
// ============================================================================

/// Writes the `PACKET#` record.
fn persist_packet_record(
    records: &dyn RecordStore,
    request: &AnalyzeRequest,
    pk: &str,
    created_at: &str,
    key: &str,
    packet_sha256: &str,
    byte_size: usize,
) -> Result<(), AnalyzerError> {
    let mut fields = serde_json::Map::new();
    fields.insert("incident_id".to_string(), json!(request.incident_id));
    fields.insert("collector_run_id".to_string(), json!(request.collector_run_id));
    fields.insert("created_at".to_string(), json!(created_at));
    fields.insert("packet_bucket".to_string(), json!(request.snapshot_ref.bucket));
    fields.insert("packet_key".to_string(), json!(key));
    fields.insert("packet_sha256".to_string(), json!(packet_sha256));
    fields.insert("packet_byte_size".to_string(), json!(byte_size));
    fields.insert("service".to_string(), json!(request.service));
    fields.insert("environment".to_string(), json!(request.environment));
    records
        .put(&Record::new(pk, sk_packet(created_at, &request.collector_run_id), fields))
        .map_err(|err| AnalyzerError::Persist(err.to_string()))
}

/// Emits `incident.analyzed` best-effort.
fn emit_analyzed(
    request: &AnalyzeRequest,
    packet: &IncidentPacket,
    key: &str,
    packet_sha256: &str,
    byte_size: usize,
    created_at: &str,
    bus: Option<&dyn EventBus>,
) {
    let Some(bus) = bus else {
        return;
    };
    let top_findings: Vec<Value> = packet
        .findings
        .iter()
        .take(5)
        .map(|finding| {
            json!({
                "id": finding.id,
                "summary": finding.summary.chars().take(200).collect::<String>(),
                "confidence": finding.confidence,
            })
        })
        .collect();
    let detail = json!({
        "incident_id": request.incident_id,
        "collector_run_id": request.collector_run_id,
        "packet_hash": packet_sha256,
        "packet_ref": {
            "bucket": request.snapshot_ref.bucket,
            "key": key,
            "sha256": packet_sha256,
            "byte_size": byte_size,
        },
        "snapshot_ref": request.snapshot_ref,
        "suspected_owners": packet.suspected_owners,
        "top_findings": top_findings,
        "emitted_at": created_at,
        "created_at": created_at,
        "service": request.service,
        "environment": request.environment,
    });
    if let Err(err) = bus.emit(&DomainEvent::new("incident.analyzed", detail)) {
        tracing::warn!(
            incident_id = %request.incident_id,
            error = %err,
            "incident.analyzed emit failed"
        );
    }
}
