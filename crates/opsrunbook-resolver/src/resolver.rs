// crates/opsrunbook-resolver/src/resolver.rs
// ============================================================================
// Module: Repo Resolver
// Description: Priority-ordered, bounded repository resolution.
// Purpose: Convert incident signals into one confidence-scored repo identity.
// Dependencies: opsrunbook-core, regex, crate::trace
// ============================================================================

//! ## Overview
//! Resolution priority, first success wins:
//! 1. Mapping rules over extracted signals (no network) -> 0.95.
//! 2. Trace-verified paths probed against the source-control host, capped at
//!    two repos by two paths and an absolute budget of four probes -> 0.85.
//! 3. Heuristic fallback to the first candidate -> 0.50.
//! 4. Empty resolution -> 0.0.
//!
//! The result always carries the parsed trace frames (at most five) and a
//! reason list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::OnceLock;

use opsrunbook_core::CONFIDENCE_HEURISTIC;
use opsrunbook_core::CONFIDENCE_MAPPING;
use opsrunbook_core::CONFIDENCE_VERIFIED;
use opsrunbook_core::IncidentPacket;
use opsrunbook_core::MappingRule;
use opsrunbook_core::MappingSignal;
use opsrunbook_core::MatchKind;
use opsrunbook_core::RepoResolution;
use opsrunbook_core::TraceFrame;
use opsrunbook_core::Verification;
use regex::Regex;

use crate::trace::MAX_APP_FRAMES;
use crate::trace::extract_app_frames;

// ============================================================================
// SECTION: Bounds
// ============================================================================

/// Hard budget of `file_exists` probes per resolution.
pub const MAX_VERIFY_CALLS: usize = 4;
/// Candidate repos probed during verification.
const MAX_VERIFY_REPOS: usize = 2;
/// Trace paths probed per candidate repo.
const MAX_VERIFY_PATHS: usize = 2;

// ============================================================================
// SECTION: File Checker
// ============================================================================

/// Bounded source-control existence probe.
pub trait FileChecker {
    /// Returns true when `path` exists in the repository's default branch.
    fn file_exists(&self, repo_full_name: &str, path: &str) -> bool;
}

// ============================================================================
// SECTION: Signal Extraction
// ============================================================================

/// Compiled signal-extraction patterns.
struct SignalPatterns {
    /// Function names inside `/aws/lambda/<name>` references.
    lambda: Regex,
    /// Workflow names inside state-machine arns.
    workflow: Regex,
}

/// Returns the lazily compiled signal patterns.
fn signal_patterns() -> Option<&'static SignalPatterns> {
    static PATTERNS: OnceLock<Option<SignalPatterns>> = OnceLock::new();
    PATTERNS
        .get_or_init(|| {
            Some(SignalPatterns {
                lambda: Regex::new(r"/aws/lambda/([\w-]+)").ok()?,
                workflow: Regex::new(r"arn:aws:states:[^:]+:\d+:stateMachine:([\w-]+)").ok()?,
            })
        })
        .as_ref()
}

/// Matchable signal values extracted from one packet.
type Signals = BTreeMap<MappingSignal, Vec<String>>;

/// Pulls matchable signal values from the packet and its evidence keys.
fn extract_signals(packet: &IncidentPacket) -> Signals {
    let mut signals: Signals = BTreeMap::new();
    if !packet.service.is_empty() {
        push_signal(&mut signals, MappingSignal::ServiceName, packet.service.clone());
    }

    if let Some(compiled) = signal_patterns() {
        let mut scan_text = |text: &str| {
            for capture in compiled.lambda.captures_iter(text) {
                if let Some(name) = capture.get(1) {
                    push_signal(&mut signals, MappingSignal::LambdaName, name.as_str().to_string());
                    push_signal(
                        &mut signals,
                        MappingSignal::LogGroup,
                        format!("/aws/lambda/{}", name.as_str()),
                    );
                }
            }
            for capture in compiled.workflow.captures_iter(text) {
                if let Some(name) = capture.get(1) {
                    push_signal(
                        &mut signals,
                        MappingSignal::WorkflowName,
                        name.as_str().to_string(),
                    );
                }
            }
        };

        for eref in &packet.all_evidence_refs {
            scan_text(&eref.key);
        }
        for finding in &packet.findings {
            scan_text(&finding.summary);
            if let Some(notes) = &finding.notes {
                scan_text(notes);
            }
        }
        for owner in &packet.suspected_owners {
            for reason in &owner.reasons {
                scan_text(reason);
            }
        }
    }

    signals
}

/// Inserts one deduplicated signal value.
fn push_signal(signals: &mut Signals, signal: MappingSignal, value: String) {
    let entry = signals.entry(signal).or_default();
    if !entry.contains(&value) {
        entry.push(value);
    }
}

// ============================================================================
// SECTION: Resolution
// ============================================================================

/// Resolves the owning repository for one packet.
///
/// Steps 1, 3, and 4 perform no network calls; step 2 is bounded by
/// [`MAX_VERIFY_CALLS`] probes against the checker.
#[must_use]
pub fn resolve_repo(
    packet: &IncidentPacket,
    rules: &[MappingRule],
    checker: Option<&dyn FileChecker>,
    owner: &str,
    legacy_map: &BTreeMap<String, String>,
) -> RepoResolution {
    let signals = extract_signals(packet);
    let frames = collect_frames(packet);

    if let Some(resolution) = match_rules(rules, &signals, &frames) {
        return resolution;
    }

    let candidates = heuristic_candidates(packet, owner, legacy_map);
    let trace_paths: Vec<&str> = frames
        .iter()
        .filter(|frame| !frame.normalized_path.is_empty())
        .map(|frame| frame.normalized_path.as_str())
        .collect();

    if let Some(checker) = checker
        && !trace_paths.is_empty()
        && !candidates.is_empty()
        && let Some((repo, reason)) = verify_candidates(checker, &candidates, &trace_paths)
    {
        return RepoResolution {
            repo_full_name: repo,
            confidence: CONFIDENCE_VERIFIED,
            reasons: vec![reason],
            verification: Verification::Verified,
            trace_frames: frames,
        };
    }

    if let Some(best) = candidates.first() {
        return RepoResolution {
            repo_full_name: best.clone(),
            confidence: CONFIDENCE_HEURISTIC,
            reasons: vec![
                "heuristic: best candidate from suspected_owners / legacy map".to_string(),
            ],
            verification: Verification::Unverified,
            trace_frames: frames,
        };
    }

    RepoResolution::unresolved(frames)
}

/// Collects up to five deduplicated application frames from the findings.
fn collect_frames(packet: &IncidentPacket) -> Vec<TraceFrame> {
    let mut frames: Vec<TraceFrame> = Vec::new();
    for finding in &packet.findings {
        let text = match &finding.notes {
            Some(notes) => format!("{}\n{notes}", finding.summary),
            None => finding.summary.clone(),
        };
        for frame in extract_app_frames(&text) {
            let duplicate = frames
                .iter()
                .any(|seen| seen.normalized_path == frame.normalized_path && seen.line == frame.line);
            if !duplicate {
                frames.push(frame);
            }
        }
    }
    frames.truncate(MAX_APP_FRAMES);
    frames
}

/// Checks mapping rules against signals; first (rule, value) match wins.
fn match_rules(
    rules: &[MappingRule],
    signals: &Signals,
    frames: &[TraceFrame],
) -> Option<RepoResolution> {
    for rule in rules {
        let Some(values) = signals.get(&rule.signal) else {
            continue;
        };
        for value in values {
            if rule.matches(value) {
                let kind = match rule.kind {
                    MatchKind::Exact => "exact",
                    MatchKind::Prefix => "prefix",
                };
                return Some(RepoResolution {
                    repo_full_name: rule.repo.clone(),
                    confidence: CONFIDENCE_MAPPING,
                    reasons: vec![format!(
                        "mapping rule: {kind} {}='{}' -> {}",
                        rule.signal.as_str(),
                        rule.pattern,
                        rule.repo
                    )],
                    verification: Verification::Mapping,
                    trace_frames: frames.to_vec(),
                });
            }
        }
    }
    None
}

/// Builds the ordered heuristic candidate list.
///
/// The legacy service map candidate, when present, is inserted at the front.
fn heuristic_candidates(
    packet: &IncidentPacket,
    owner: &str,
    legacy_map: &BTreeMap<String, String>,
) -> Vec<String> {
    let qualify = |repo: &str| -> String {
        if repo.contains('/') || owner.is_empty() {
            repo.to_string()
        } else {
            format!("{owner}/{repo}")
        }
    };

    let mut candidates: Vec<String> = Vec::new();
    for suspected in &packet.suspected_owners {
        if suspected.repo.is_empty() || suspected.repo == "unknown" {
            continue;
        }
        let full = qualify(&suspected.repo);
        if !candidates.contains(&full) {
            candidates.push(full);
        }
    }
    if let Some(mapped) = legacy_map.get(&packet.service) {
        let full = qualify(mapped);
        if let Some(position) = candidates.iter().position(|existing| existing == &full) {
            candidates.remove(position);
        }
        candidates.insert(0, full);
    }
    candidates
}

/// Probes candidate repos against trace paths under the hard call budget.
fn verify_candidates(
    checker: &dyn FileChecker,
    candidates: &[String],
    trace_paths: &[&str],
) -> Option<(String, String)> {
    let mut calls = 0usize;
    for repo in candidates.iter().take(MAX_VERIFY_REPOS) {
        for path in trace_paths.iter().take(MAX_VERIFY_PATHS) {
            if calls >= MAX_VERIFY_CALLS {
                return None;
            }
            calls += 1;
            if checker.file_exists(repo, path) {
                return Some((repo.clone(), format!("verified: {path} exists in {repo}")));
            }
        }
    }
    None
}
