// crates/opsrunbook-config/src/tests.rs
// ============================================================================
// Module: Config Tests
// Description: Parse, default, and validation behavior for the config model.
// Purpose: Ensure configuration fails closed on invalid combinations.
// Dependencies: crate
// ============================================================================
//! ## Overview
//! Validates defaults, TOML parsing, env-style overrides, and the strict
//! validation rules.

#![allow(
    clippy::panic,
    clippy::print_stdout,
    clippy::print_stderr,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::use_debug,
    clippy::dbg_macro,
    clippy::panic_in_result_fn,
    clippy::unwrap_in_result,
    reason = "Test-only output and panic-based assertions are permitted."
)]

use crate::OpsRunbookConfig;
use crate::RecordStoreType;

// ============================================================================
// SECTION: Defaults
// ============================================================================

/// Verifies the empty config parses with documented defaults and validates.
#[test]
fn defaults_validate() {
    let config = OpsRunbookConfig::from_toml("").unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.budgets.max_rows_per_section, 100);
    assert_eq!(config.budgets.max_total_bytes, 200_000);
    assert_eq!(config.budgets.max_window_minutes, 15);
    assert!(config.actions.dry_run);
    assert!(config.actions.automation_enabled);
    assert!(!config.actions.enable_pr_action);
    assert!((config.actions.pr_confidence_threshold - 0.7).abs() < f64::EPSILON);
}

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Verifies a representative config file parses into typed sections.
#[test]
fn parses_full_config() {
    let text = r#"
[object_store]
evidence_bucket = "evidence-dev"

[record_store]
store_type = "sqlite"
path = "/var/lib/opsrunbook/records.db"

[actions]
dry_run = false
enable_pr_action = true

[github]
owner = "example-org"
token = "ghp_test"
webhook_secret = "s3cret"

[[resolver.mapping_rules]]
type = "exact"
signal = "service_name"
pattern = "loggen"
repo = "example-org/loggen-repo"
"#;
    let config = OpsRunbookConfig::from_toml(text).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.record_store.store_type, RecordStoreType::Sqlite);
    assert_eq!(config.resolver.mapping_rules.len(), 1);
    assert_eq!(config.resolver.mapping_rules[0].repo, "example-org/loggen-repo");
}

// ============================================================================
// SECTION: Validation
// ============================================================================

/// Verifies sqlite record store without a path is rejected.
#[test]
fn sqlite_without_path_is_rejected() {
    let config = OpsRunbookConfig::from_toml("[record_store]\nstore_type = \"sqlite\"\n").unwrap();
    assert!(config.validate().is_err());
}

/// Verifies real PR execution without a github section is rejected.
#[test]
fn pr_action_without_github_is_rejected() {
    let text = "[actions]\ndry_run = false\nenable_pr_action = true\n";
    let config = OpsRunbookConfig::from_toml(text).unwrap();
    assert!(config.validate().is_err());
}

/// Verifies an out-of-range confidence threshold is rejected.
#[test]
fn bad_threshold_is_rejected() {
    let text = "[actions]\npr_confidence_threshold = 1.5\n";
    let config = OpsRunbookConfig::from_toml(text).unwrap();
    assert!(config.validate().is_err());
}

/// Verifies an empty evidence bucket is rejected.
#[test]
fn empty_bucket_is_rejected() {
    let text = "[object_store]\nevidence_bucket = \"  \"\n";
    let config = OpsRunbookConfig::from_toml(text).unwrap();
    assert!(config.validate().is_err());
}
