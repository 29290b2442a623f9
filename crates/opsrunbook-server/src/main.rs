// crates/opsrunbook-server/src/main.rs
// ============================================================================
// Module: OpsRunbook Server Binary
// Description: Startup entry point for the HTTP ingress.
// Purpose: Load config, wire the state, and serve the /v1 surface.
// Dependencies: axum, opsrunbook-config, opsrunbook-server, tokio, tracing-subscriber
// ============================================================================

//! ## Overview
//! Configuration is read once from `OPSRUNBOOK_CONFIG` (default
//! `opsrunbook.toml`, falling back to built-in defaults when the file is
//! absent), overridden from the environment, validated fail-closed, and
//! passed explicitly into the wiring. The process serves until the socket
//! closes.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::net::SocketAddr;
use std::path::Path;
use std::process::ExitCode;

use opsrunbook_config::OpsRunbookConfig;
use opsrunbook_server::build_router;
use opsrunbook_server::build_state;
use tracing_subscriber::EnvFilter;

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// Starts the ingress server.
fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            tracing::error!(error = %message, "server startup failed");
            ExitCode::FAILURE
        }
    }
}

/// Loads config, builds state, and serves until shutdown.
fn run() -> Result<(), String> {
    let config_path =
        std::env::var("OPSRUNBOOK_CONFIG").unwrap_or_else(|_| "opsrunbook.toml".to_string());
    let mut config = if Path::new(&config_path).exists() {
        OpsRunbookConfig::from_path(Path::new(&config_path)).map_err(|err| err.to_string())?
    } else {
        OpsRunbookConfig::default()
    };
    config.apply_env_overrides();
    config.validate().map_err(|err| err.to_string())?;

    let bind: SocketAddr =
        config.server.bind.parse().map_err(|_| "invalid bind address".to_string())?;
    let state = build_state(config).map_err(|err| err.to_string())?;
    let app = build_router(state);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| err.to_string())?;
    runtime.block_on(async move {
        let listener =
            tokio::net::TcpListener::bind(bind).await.map_err(|err| err.to_string())?;
        tracing::info!(%bind, "opsrunbook server listening");
        axum::serve(listener, app).await.map_err(|err| err.to_string())
    })
}
