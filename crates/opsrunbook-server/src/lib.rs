// crates/opsrunbook-server/src/lib.rs
// ============================================================================
// Module: OpsRunbook Server Library
// Description: HTTP ingress, pipeline runtime, and startup wiring.
// Purpose: Expose the incident pipeline and webhook path over HTTP.
// Dependencies: axum, opsrunbook-config, opsrunbook-core, tokio
// ============================================================================

//! ## Overview
//! The server crate ties the pipeline together: configuration resolves into
//! stores, provider clients, and the local pipeline runtime once at startup,
//! and the axum router exposes the `/v1` surface over that state.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod pipeline;
pub mod routes;
pub mod wiring;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use pipeline::LocalPipelineRuntime;
pub use pipeline::PipelineBackends;
pub use pipeline::PipelineError;
pub use pipeline::PipelineRuntime;
pub use pipeline::StartRequest;
pub use routes::ApiError;
pub use routes::AppState;
pub use routes::build_router;
pub use routes::create_incident_inner;
pub use routes::load_latest_actions;
pub use routes::replay_incident_inner;
pub use wiring::ThreadedReviewDispatcher;
pub use wiring::TracingEventBus;
pub use wiring::WiringError;
pub use wiring::build_state;
