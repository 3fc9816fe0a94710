//! Registry policy, lint and release gate endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use evgate_registry::{run_registry_lint, PipeType, RegistryError};

use super::{error_response, internal, to_json, ApiError, ApiResult};
use crate::gates;
use crate::state::AppState;

fn registry_error(e: RegistryError) -> ApiError {
    error_response(e.status_code(), e)
}

/// GET /policy/sources/{id}: which pipes this source may feed.
pub async fn policy_source(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> ApiResult {
    let decision = state.enforcer.decide(&id).await.map_err(registry_error)?;
    to_json(&decision)
}

/// GET /policy/pipes/{pipe}/sources: ACTIVE sources eligible for a pipe.
pub async fn policy_pipe_sources(State(state): State<Arc<AppState>>, Path(pipe): Path<String>) -> ApiResult {
    let pipe_type = PipeType::parse(&pipe).ok_or_else(|| registry_error(RegistryError::UnknownPipe(pipe.clone())))?;
    let sources = state.enforcer.sources_for_pipe(pipe_type).await.map_err(registry_error)?;
    Ok(Json(json!({
        "pipe": pipe_type,
        "count": sources.len(),
        "sources": sources,
    })))
}

pub async fn policy_summary(State(state): State<Arc<AppState>>) -> ApiResult {
    let summary = state.enforcer.summary().await.map_err(registry_error)?;
    to_json(&summary)
}

/// GET /registry/lint: findings never fail the request; `passed` carries the verdict.
pub async fn registry_lint(State(state): State<Arc<AppState>>) -> ApiResult {
    let sources = state.enforcer.sources().list().await.map_err(registry_error)?;
    to_json(&run_registry_lint(&sources))
}

pub async fn release_gate(State(state): State<Arc<AppState>>) -> ApiResult {
    let report = gates::release_gate_report(&state).await.map_err(internal)?;
    to_json(&report)
}
