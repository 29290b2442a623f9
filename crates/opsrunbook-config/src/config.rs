// crates/opsrunbook-config/src/config.rs
// ============================================================================
// Module: OpsRunbook Configuration Model
// Description: Canonical config structs, defaults, and strict validation.
// Purpose: Single source of truth for opsrunbook.toml semantics.
// Dependencies: opsrunbook-core, serde, toml
// ============================================================================

//! ## Overview
//! Configuration is read once at task start and passed explicitly; nothing
//! reads the environment after construction. Validation is strict and
//! fail-closed: a config that enables a channel without its credentials is
//! rejected at startup rather than at first use. Deployment-style overrides
//! (bucket, bind address, secrets) may be applied from the process
//! environment before validation.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;

use opsrunbook_core::MappingRule;
use serde::Deserialize;
use thiserror::Error;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Configuration load and validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("config read failed: {0}")]
    Read(String),
    /// The config file failed to parse.
    #[error("config parse failed: {0}")]
    Parse(String),
    /// A validation rule failed.
    #[error("config invalid: {0}")]
    Invalid(String),
}

// ============================================================================
// SECTION: Budgets
// ============================================================================

/// Evidence budgets and window caps.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BudgetConfig {
    /// Maximum rows kept per evidence section.
    pub max_rows_per_section: usize,
    /// Maximum canonical bytes per evidence blob.
    pub max_total_bytes: usize,
    /// Maximum incident window span in minutes.
    pub max_window_minutes: i64,
}

impl Default for BudgetConfig {
    fn default() -> Self {
        Self {
            max_rows_per_section: 100,
            max_total_bytes: 200_000,
            max_window_minutes: 15,
        }
    }
}

// ============================================================================
// SECTION: Stores
// ============================================================================

/// Record store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RecordStoreType {
    /// In-memory store (tests and demos only).
    #[default]
    Memory,
    /// SQLite-backed durable store.
    Sqlite,
}

/// Record store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct RecordStoreConfig {
    /// Backend selection.
    pub store_type: RecordStoreType,
    /// Database path for the SQLite backend.
    pub path: Option<PathBuf>,
}

/// Object store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ObjectStoreType {
    /// In-memory store (tests and demos only).
    #[default]
    Memory,
    /// S3-backed durable store.
    S3,
}

/// Object store configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ObjectStoreConfig {
    /// Backend selection.
    pub store_type: ObjectStoreType,
    /// Evidence bucket every blob is written under.
    pub evidence_bucket: String,
    /// Optional region override for the S3 backend.
    pub region: Option<String>,
}

impl Default for ObjectStoreConfig {
    fn default() -> Self {
        Self {
            store_type: ObjectStoreType::Memory,
            evidence_bucket: "opsrunbook-evidence".to_string(),
            region: None,
        }
    }
}

// ============================================================================
// SECTION: Pipeline
// ============================================================================

/// Pipeline runtime configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Whether the local pipeline runtime is enabled. Ingress returns 503
    /// when disabled.
    pub enabled: bool,
    /// Demo service that receives default metric queries when no metric
    /// hints are supplied.
    pub demo_service: Option<String>,
    /// Event bus name; empty disables emission.
    pub event_bus: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            demo_service: None,
            event_bus: String::new(),
        }
    }
}

// ============================================================================
// SECTION: Actions
// ============================================================================

/// Write-side action flags and gates.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ActionsConfig {
    /// Execute against deterministic fakes instead of providers.
    pub dry_run: bool,
    /// Global kill switch; collect/analyze only when false.
    pub automation_enabled: bool,
    /// Whether the PR channel executes at all.
    pub enable_pr_action: bool,
    /// Confidence gate below which the PR action is skipped.
    pub pr_confidence_threshold: f64,
}

impl Default for ActionsConfig {
    fn default() -> Self {
        Self {
            dry_run: true,
            automation_enabled: true,
            enable_pr_action: false,
            pr_confidence_threshold: 0.7,
        }
    }
}

/// Tracker (ticket) provider credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TicketConfig {
    /// Tracker base URL.
    pub base_url: String,
    /// Account email for basic auth.
    pub email: String,
    /// API token for basic auth.
    pub api_token: String,
    /// Project key issues are created under.
    pub project_key: String,
    /// Issue type name.
    #[serde(default = "default_issue_type")]
    pub issue_type: String,
}

/// Default tracker issue type.
fn default_issue_type() -> String {
    "Bug".to_string()
}

/// Chat notifier credentials.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NotifyConfig {
    /// Incoming webhook URL.
    pub webhook_url: String,
}

// ============================================================================
// SECTION: Source Control
// ============================================================================

/// Source-control host configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct GithubConfig {
    /// Organization or user owning the target repositories.
    pub owner: String,
    /// API token; empty disables the real client.
    #[serde(default)]
    pub token: String,
    /// Fallback default branch.
    #[serde(default = "default_branch")]
    pub default_branch: String,
    /// Bot account slug used for loop prevention.
    #[serde(default = "default_app_slug")]
    pub app_slug: String,
    /// Webhook shared secret for signature verification.
    #[serde(default)]
    pub webhook_secret: String,
    /// Path prefixes the patcher may write under.
    #[serde(default = "default_allowed_paths")]
    pub allowed_paths: Vec<String>,
    /// Maximum files one fix plan may touch.
    #[serde(default = "default_max_files")]
    pub max_files_per_event: usize,
    /// Maximum bytes per patched file.
    #[serde(default = "default_max_bytes")]
    pub max_bytes_per_file: usize,
}

/// Default branch name.
fn default_branch() -> String {
    "main".to_string()
}

/// Default bot slug.
fn default_app_slug() -> String {
    "opsrunbook-copilot-bot".to_string()
}

/// Default patcher path allowlist.
fn default_allowed_paths() -> Vec<String> {
    vec![".opsrunbook/".to_string(), "src/".to_string(), "config/".to_string()]
}

/// Default per-plan file cap.
const fn default_max_files() -> usize {
    5
}

/// Default per-file byte cap.
const fn default_max_bytes() -> usize {
    204_800
}

// ============================================================================
// SECTION: Resolver
// ============================================================================

/// Repo resolver configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Default)]
#[serde(default)]
pub struct ResolverConfig {
    /// Priority-ordered mapping rules.
    pub mapping_rules: Vec<MappingRule>,
    /// Legacy service -> repo map used as a heuristic candidate source.
    pub legacy_repo_map: BTreeMap<String, String>,
    /// Prefix -> repo map for suspected-owner computation.
    pub resource_repo_map: BTreeMap<String, String>,
}

// ============================================================================
// SECTION: Server
// ============================================================================

/// HTTP ingress configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Socket address the ingress binds to.
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
        }
    }
}

// ============================================================================
// SECTION: Root Config
// ============================================================================

/// Root OpsRunbook configuration.
///
/// # Invariants
/// - `validate` has been called before the config reaches any component.
#[derive(Debug, Clone, PartialEq, Deserialize, Default)]
#[serde(default)]
pub struct OpsRunbookConfig {
    /// Object store settings.
    pub object_store: ObjectStoreConfig,
    /// Record store settings.
    pub record_store: RecordStoreConfig,
    /// Evidence budgets and window caps.
    pub budgets: BudgetConfig,
    /// Pipeline runtime settings.
    pub pipeline: PipelineConfig,
    /// Write-side action settings.
    pub actions: ActionsConfig,
    /// Tracker credentials; absent disables the real ticket client.
    pub ticket: Option<TicketConfig>,
    /// Chat notifier credentials; absent disables the real notifier.
    pub notify: Option<NotifyConfig>,
    /// Source-control settings; absent disables PR actions and webhooks.
    pub github: Option<GithubConfig>,
    /// Repo resolver settings.
    pub resolver: ResolverConfig,
    /// HTTP ingress settings.
    pub server: ServerConfig,
}

impl OpsRunbookConfig {
    /// Loads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when the file cannot be read or parsed.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let text =
            std::fs::read_to_string(path).map_err(|err| ConfigError::Read(err.to_string()))?;
        Self::from_toml(&text)
    }

    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when deserialization fails.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Applies deployment overrides from the process environment.
    ///
    /// Recognized variables: `OPSRUNBOOK_EVIDENCE_BUCKET`,
    /// `OPSRUNBOOK_EVENT_BUS`, `OPSRUNBOOK_BIND`,
    /// `OPSRUNBOOK_GITHUB_TOKEN`, `OPSRUNBOOK_WEBHOOK_SECRET`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(bucket) = std::env::var("OPSRUNBOOK_EVIDENCE_BUCKET")
            && !bucket.is_empty()
        {
            self.object_store.evidence_bucket = bucket;
        }
        if let Ok(bus) = std::env::var("OPSRUNBOOK_EVENT_BUS") {
            self.pipeline.event_bus = bus;
        }
        if let Ok(bind) = std::env::var("OPSRUNBOOK_BIND")
            && !bind.is_empty()
        {
            self.server.bind = bind;
        }
        if let Some(github) = self.github.as_mut() {
            if let Ok(token) = std::env::var("OPSRUNBOOK_GITHUB_TOKEN")
                && !token.is_empty()
            {
                github.token = token;
            }
            if let Ok(secret) = std::env::var("OPSRUNBOOK_WEBHOOK_SECRET")
                && !secret.is_empty()
            {
                github.webhook_secret = secret;
            }
        }
    }

    /// Validates cross-field invariants, failing closed.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first failed rule.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.object_store.evidence_bucket.trim().is_empty() {
            return Err(ConfigError::Invalid("object_store.evidence_bucket is required".to_string()));
        }
        if self.record_store.store_type == RecordStoreType::Sqlite
            && self.record_store.path.is_none()
        {
            return Err(ConfigError::Invalid("sqlite record_store requires path".to_string()));
        }
        if self.budgets.max_rows_per_section == 0 {
            return Err(ConfigError::Invalid("budgets.max_rows_per_section must be positive".to_string()));
        }
        if self.budgets.max_total_bytes == 0 {
            return Err(ConfigError::Invalid("budgets.max_total_bytes must be positive".to_string()));
        }
        if self.budgets.max_window_minutes <= 0 {
            return Err(ConfigError::Invalid("budgets.max_window_minutes must be positive".to_string()));
        }
        if !(0.0..=1.0).contains(&self.actions.pr_confidence_threshold) {
            return Err(ConfigError::Invalid(
                "actions.pr_confidence_threshold must be within [0, 1]".to_string(),
            ));
        }
        if self.actions.enable_pr_action && !self.actions.dry_run && self.github.is_none() {
            return Err(ConfigError::Invalid(
                "actions.enable_pr_action requires a [github] section".to_string(),
            ));
        }
        if let Some(github) = &self.github {
            if github.owner.trim().is_empty() {
                return Err(ConfigError::Invalid("github.owner is required".to_string()));
            }
            if github.max_files_per_event == 0 {
                return Err(ConfigError::Invalid(
                    "github.max_files_per_event must be positive".to_string(),
                ));
            }
        }
        for rule in &self.resolver.mapping_rules {
            if rule.repo.trim().is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "mapping rule '{}' has an empty repo",
                    rule.pattern
                )));
            }
        }
        if self.server.bind.trim().is_empty() {
            return Err(ConfigError::Invalid("server.bind is required".to_string()));
        }
        Ok(())
    }
}
