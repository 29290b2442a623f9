// crates/opsrunbook-server/src/wiring.rs
// ============================================================================
// Module: Server Wiring
// Description: Construction of stores, clients, and runtimes from config.
// Purpose: Select real or dry-run implementations once, at startup.
// Dependencies: opsrunbook-actions, opsrunbook-config, opsrunbook-review, opsrunbook-store
// ============================================================================

//! ## Overview
//! Configuration is resolved into concrete capabilities exactly once:
//! object/record stores by backend type, provider clients by the dry-run
//! flag, and the local pipeline runtime over the stub collector backends
//! (the hosted query services are external collaborators). The review
//! dispatcher runs each accepted delivery on its own thread under the
//! deterministic `pr-review-<delivery_id>` execution name.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use opsrunbook_actions::ActionClients;
use opsrunbook_actions::ActionSettings;
use opsrunbook_actions::DryRunNotifier;
use opsrunbook_actions::DryRunSourceControl;
use opsrunbook_actions::DryRunTicketClient;
use opsrunbook_actions::GithubClient;
use opsrunbook_actions::HttpTicketClient;
use opsrunbook_actions::WebhookNotifier;
use opsrunbook_collectors::StubLogsBackend;
use opsrunbook_collectors::StubMetricsBackend;
use opsrunbook_collectors::StubWorkflowBackend;
use opsrunbook_config::ObjectStoreType;
use opsrunbook_config::OpsRunbookConfig;
use opsrunbook_config::RecordStoreType;
use opsrunbook_core::DomainEvent;
use opsrunbook_core::EventBus;
use opsrunbook_core::EventBusError;
use opsrunbook_core::InMemoryObjectStore;
use opsrunbook_core::InMemoryRecordStore;
use opsrunbook_core::ObjectStore;
use opsrunbook_core::PrReviewEvent;
use opsrunbook_core::RecordStore;
use opsrunbook_review::GithubRepoHost;
use opsrunbook_review::InMemoryRepoHost;
use opsrunbook_review::RepoHost;
use opsrunbook_review::ReviewConfig;
use opsrunbook_review::ReviewDeps;
use opsrunbook_review::ReviewDispatcher;
use opsrunbook_review::run_review_cycle;
use opsrunbook_store::S3ObjectStore;
use opsrunbook_store::SqliteRecordStore;
use thiserror::Error;

use crate::pipeline::LocalPipelineRuntime;
use crate::pipeline::PipelineBackends;
use crate::pipeline::PipelineRuntime;
use crate::routes::AppState;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Wiring errors raised at startup.
#[derive(Debug, Error)]
pub enum WiringError {
    /// A store could not be constructed.
    #[error("store init failed: {0}")]
    Store(String),
    /// A provider client could not be constructed.
    #[error("provider init failed: {0}")]
    Provider(String),
}

// ============================================================================
// SECTION: Event Bus
// ============================================================================

/// Event bus that records emissions as structured log lines.
///
/// The hosted bus is an external collaborator; locally every domain event is
/// still observable through tracing.
#[derive(Debug, Clone)]
pub struct TracingEventBus {
    /// Configured bus name, for log correlation.
    bus_name: String,
}

impl TracingEventBus {
    /// Creates a bus with the configured name.
    #[must_use]
    pub fn new(bus_name: &str) -> Self {
        Self {
            bus_name: bus_name.to_string(),
        }
    }
}

impl EventBus for TracingEventBus {
    fn emit(&self, event: &DomainEvent) -> Result<(), EventBusError> {
        tracing::info!(
            bus = %self.bus_name,
            source = %event.source,
            detail_type = %event.detail_type,
            "domain event emitted"
        );
        Ok(())
    }
}

// ============================================================================
// SECTION: Review Dispatcher
// ============================================================================

/// Dispatcher running each review cycle on its own thread.
pub struct ThreadedReviewDispatcher {
    /// Source-control host for the cycle.
    host: Arc<dyn RepoHost>,
    /// Object store for review packets.
    store: Arc<dyn ObjectStore>,
    /// Record store for outcome rows.
    records: Arc<dyn RecordStore>,
    /// Cycle configuration.
    config: ReviewConfig,
}

impl ReviewDispatcher for ThreadedReviewDispatcher {
    fn dispatch(&self, event: &PrReviewEvent) -> Result<(), String> {
        let execution = format!("pr-review-{}", event.delivery_id);
        tracing::info!(execution, "starting review cycle");
        let host = Arc::clone(&self.host);
        let store = Arc::clone(&self.store);
        let records = Arc::clone(&self.records);
        let config = self.config.clone();
        let event = event.clone();
        let _detached = std::thread::Builder::new()
            .name(execution)
            .spawn(move || {
                let deps = ReviewDeps {
                    host: host.as_ref(),
                    store: store.as_ref(),
                    records: records.as_ref(),
                    config: &config,
                };
                let outcome = run_review_cycle(&event, &deps);
                tracing::info!(
                    delivery_id = %event.delivery_id,
                    status = %outcome.status,
                    "review cycle finished"
                );
            })
            .map_err(|err| err.to_string())?;
        Ok(())
    }
}

// ============================================================================
// SECTION: State Construction
// ============================================================================

/// Builds the application state from validated configuration.
///
/// # Errors
///
/// Returns [`WiringError`] when a store or client cannot be constructed.
pub fn build_state(config: OpsRunbookConfig) -> Result<AppState, WiringError> {
    let store: Arc<dyn ObjectStore> = match config.object_store.store_type {
        ObjectStoreType::Memory => Arc::new(InMemoryObjectStore::new()),
        ObjectStoreType::S3 => Arc::new(
            S3ObjectStore::new(config.object_store.region.clone())
                .map_err(|err| WiringError::Store(err.to_string()))?,
        ),
    };
    let records: Arc<dyn RecordStore> = match config.record_store.store_type {
        RecordStoreType::Memory => Arc::new(InMemoryRecordStore::new()),
        RecordStoreType::Sqlite => {
            let path = config
                .record_store
                .path
                .clone()
                .ok_or_else(|| WiringError::Store("sqlite record_store requires path".to_string()))?;
            Arc::new(
                SqliteRecordStore::open(&path)
                    .map_err(|err| WiringError::Store(err.to_string()))?,
            )
        }
    };
    let bus: Option<Arc<dyn EventBus>> = if config.pipeline.event_bus.is_empty() {
        None
    } else {
        Some(Arc::new(TracingEventBus::new(&config.pipeline.event_bus)))
    };

    let owner = config.github.as_ref().map_or_else(String::new, |github| github.owner.clone());
    let action_clients = build_action_clients(&config)?;
    let action_settings = ActionSettings {
        automation_enabled: config.actions.automation_enabled,
        dry_run: config.actions.dry_run,
        enable_pr_action: config.actions.enable_pr_action,
        pr_confidence_threshold: config.actions.pr_confidence_threshold,
        owner,
        mapping_rules: config.resolver.mapping_rules.clone(),
        legacy_repo_map: config.resolver.legacy_repo_map.clone(),
    };

    let runtime: Option<Arc<dyn PipelineRuntime>> = if config.pipeline.enabled {
        Some(Arc::new(LocalPipelineRuntime {
            store: Arc::clone(&store),
            records: Arc::clone(&records),
            bus: bus.clone(),
            resource_repo_map: config.resolver.resource_repo_map.clone(),
            action_settings,
            action_clients,
            backends: PipelineBackends {
                logs: Arc::new(StubLogsBackend::new()),
                metrics: Arc::new(StubMetricsBackend::new()),
                workflow: Arc::new(StubWorkflowBackend::new()),
            },
        }))
    } else {
        None
    };

    let dispatcher = Arc::new(ThreadedReviewDispatcher {
        host: build_review_host(&config)?,
        store: Arc::clone(&store),
        records: Arc::clone(&records),
        config: build_review_config(&config),
    });

    Ok(AppState {
        config: Arc::new(config),
        store,
        records,
        runtime,
        dispatcher,
    })
}

/// Selects provider clients by the dry-run flag and configured credentials.
fn build_action_clients(config: &OpsRunbookConfig) -> Result<ActionClients, WiringError> {
    if config.actions.dry_run {
        let owner = config
            .github
            .as_ref()
            .map_or("dry-run-owner", |github| github.owner.as_str());
        return Ok(ActionClients {
            ticket: Some(Arc::new(DryRunTicketClient::new())),
            notify: Some(Arc::new(DryRunNotifier::new())),
            github: Some(Arc::new(DryRunSourceControl::new(owner))),
        });
    }

    let ticket = match &config.ticket {
        Some(ticket) => Some(Arc::new(
            HttpTicketClient::new(
                &ticket.base_url,
                &ticket.email,
                &ticket.api_token,
                &ticket.project_key,
                &ticket.issue_type,
            )
            .map_err(|err| WiringError::Provider(err.to_string()))?,
        ) as Arc<dyn opsrunbook_actions::TicketClient>),
        None => None,
    };
    let notify = match &config.notify {
        Some(notify) => Some(Arc::new(
            WebhookNotifier::new(&notify.webhook_url)
                .map_err(|err| WiringError::Provider(err.to_string()))?,
        ) as Arc<dyn opsrunbook_actions::ChatNotifier>),
        None => None,
    };
    let github = match &config.github {
        Some(github) if !github.token.is_empty() => Some(Arc::new(
            GithubClient::new(&github.owner, &github.token, &github.default_branch)
                .map_err(|err| WiringError::Provider(err.to_string()))?,
        )
            as Arc<dyn opsrunbook_actions::SourceControlClient>),
        _ => None,
    };
    Ok(ActionClients {
        ticket,
        notify,
        github,
    })
}

/// Selects the review host by the dry-run flag and configured credentials.
fn build_review_host(config: &OpsRunbookConfig) -> Result<Arc<dyn RepoHost>, WiringError> {
    match &config.github {
        Some(github) if !github.token.is_empty() && !config.actions.dry_run => Ok(Arc::new(
            GithubRepoHost::new(&github.token)
                .map_err(|err| WiringError::Provider(err.to_string()))?,
        )),
        _ => Ok(Arc::new(InMemoryRepoHost::new())),
    }
}

/// Builds the review cycle configuration.
fn build_review_config(config: &OpsRunbookConfig) -> ReviewConfig {
    let github = config.github.as_ref();
    ReviewConfig {
        bot_slug: github
            .map_or_else(|| "opsrunbook-copilot-bot".to_string(), |g| g.app_slug.clone()),
        allowed_paths: github.map(|g| g.allowed_paths.clone()).unwrap_or_else(|| {
            vec![".opsrunbook/".to_string(), "src/".to_string(), "config/".to_string()]
        }),
        max_files: github.map_or(5, |g| g.max_files_per_event),
        max_bytes: github.map_or(204_800, |g| g.max_bytes_per_file),
        evidence_bucket: config.object_store.evidence_bucket.clone(),
    }
}
