use std::sync::Arc;

use axum::extract::State;

use super::{error_response, internal, to_json, ApiResult};
use crate::gates;
use crate::state::AppState;

/// GET /reliability/latest: 404 until a run has completed.
pub async fn reliability_latest(State(state): State<Arc<AppState>>) -> ApiResult {
    let latest = state
        .runs
        .latest()
        .map_err(|e| error_response(e.status_code(), e))?;
    match latest {
        Some(run) => to_json(&run),
        None => Err(error_response(404, "no reliability run recorded")),
    }
}

/// GET /reliability/deploy-gate: a blocked decision is still a 200.
pub async fn reliability_deploy_gate(State(state): State<Arc<AppState>>) -> ApiResult {
    let decision = gates::deploy_decision(&state).map_err(internal)?;
    to_json(&decision)
}
