//! HTTP router construction.
//!
//! Assembles all Axum routes and middleware into a single `Router`.

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tracing::warn;

use crate::api;
use crate::state::AppState;

fn cors_layer(origin: &str) -> CorsLayer {
    if origin == "*" {
        return CorsLayer::permissive();
    }
    match origin.parse::<HeaderValue>() {
        Ok(value) => CorsLayer::permissive().allow_origin(value),
        Err(e) => {
            warn!(origin, error = %e, "invalid CORS_ORIGIN; allowing any origin");
            CorsLayer::permissive()
        }
    }
}

/// Build the complete application router with all routes and middleware.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(api::health))
        // Jobs: fixed paths MUST precede /{id} to avoid capture
        .route("/jobs", get(api::jobs_list).post(api::jobs_create))
        .route("/jobs/stats", get(api::jobs_stats))
        .route("/jobs/stuck", get(api::jobs_stuck))
        .route("/jobs/reset-stuck", post(api::jobs_reset_stuck))
        .route("/jobs/{id}", get(api::jobs_get))
        .route("/jobs/{id}/pause", post(api::jobs_pause))
        .route("/jobs/{id}/resume", post(api::jobs_resume))
        .route("/jobs/{id}/cancel", post(api::jobs_cancel))
        // Registry policy
        .route("/policy/sources/{id}", get(api::policy_source))
        .route("/policy/pipes/{pipe}/sources", get(api::policy_pipe_sources))
        .route("/policy/summary", get(api::policy_summary))
        .route("/registry/lint", get(api::registry_lint))
        .route("/release-gate", get(api::release_gate))
        // Evidence gate
        .route("/evidence/gate", post(api::evidence_gate))
        .route("/evidence/quick-verify", post(api::evidence_quick_verify))
        .route("/evidence/report", post(api::evidence_report))
        .route("/evidence/tickets", get(api::evidence_tickets))
        .route("/evidence/publications", get(api::evidence_publications))
        .route("/tribunal/stats", get(api::tribunal_stats))
        // Reliability
        .route("/reliability/latest", get(api::reliability_latest))
        .route("/reliability/deploy-gate", get(api::reliability_deploy_gate))
        .layer(cors_layer(&state.config.server.cors_origin))
        .with_state(state)
}
