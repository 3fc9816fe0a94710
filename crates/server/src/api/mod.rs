//! Domain-focused API endpoint modules.
//!
//! Each sub-module owns a single responsibility area.
//! The shared error shape lives here in mod.rs.

mod evidence;
mod health;
mod jobs;
mod policy;
mod reliability;

use std::fmt::Display;

use axum::http::StatusCode;
use axum::Json;
use serde_json::{json, Value};

// ── Shared error shape ───────────────────────────────────────────

pub(crate) type ApiError = (StatusCode, Json<Value>);
pub(crate) type ApiResult = Result<Json<Value>, ApiError>;

/// `{"error": ...}` with the given status; unknown codes become 500.
pub(crate) fn error_response(status: u16, message: impl Display) -> ApiError {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": message.to_string() })))
}

pub(crate) fn internal(e: anyhow::Error) -> ApiError {
    tracing::error!(error = %format!("{:#}", e), "request failed");
    error_response(500, format!("{:#}", e))
}

pub(crate) fn to_json<T: serde::Serialize>(value: &T) -> ApiResult {
    serde_json::to_value(value)
        .map(Json)
        .map_err(|e| error_response(500, e))
}

// ── Re-exports ───────────────────────────────────────────────────
// Flat `api::foo` paths used by router.rs.

pub use evidence::{
    evidence_gate, evidence_publications, evidence_quick_verify, evidence_report, evidence_tickets, tribunal_stats,
};
pub use health::health;
pub use jobs::{
    jobs_cancel, jobs_create, jobs_get, jobs_list, jobs_pause, jobs_reset_stuck, jobs_resume, jobs_stats, jobs_stuck,
};
pub use policy::{policy_pipe_sources, policy_source, policy_summary, registry_lint, release_gate};
pub use reliability::{reliability_deploy_gate, reliability_latest};
