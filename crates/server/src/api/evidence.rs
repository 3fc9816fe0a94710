//! Evidence gate endpoints.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use serde::Deserialize;
use serde_json::json;

use evgate_tribunal::{Claim, EvidenceItem, PublicationStore, ReportSection, TicketStore, TribunalError};

use super::{error_response, to_json, ApiError, ApiResult};
use crate::state::AppState;

fn tribunal_error(e: TribunalError) -> ApiError {
    error_response(e.status_code(), e)
}

#[derive(Debug, Deserialize)]
pub struct GateRequest {
    pub claim: Claim,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

#[derive(Debug, Deserialize)]
pub struct ReportRequest {
    pub sections: Vec<ReportSection>,
}

#[derive(Debug, Deserialize)]
pub struct TicketQuery {
    /// Only tickets still open.
    #[serde(default)]
    pub open: bool,
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_recent")]
    pub recent: usize,
}

fn default_recent() -> usize {
    20
}

/// POST /evidence/gate: adjudicate one claim and decide publication.
pub async fn evidence_gate(State(state): State<Arc<AppState>>, Json(req): Json<GateRequest>) -> ApiResult {
    let result = state.gate.check(&req.claim, &req.evidence).await.map_err(tribunal_error)?;
    to_json(&result)
}

/// POST /evidence/quick-verify: publishability from a verdict under a day
/// old, running the tribunal only when none exists.
pub async fn evidence_quick_verify(State(state): State<Arc<AppState>>, Json(req): Json<GateRequest>) -> ApiResult {
    let verdict = state
        .gate
        .tribunal()
        .quick_verify(&req.claim, &req.evidence)
        .await
        .map_err(tribunal_error)?;
    Ok(Json(json!({
        "can_publish": verdict.verdict.is_publishable(),
        "verdict": verdict.verdict,
        "verdict_id": verdict.verdict_id,
        "created_at": verdict.created_at,
        "warnings": verdict.warnings,
    })))
}

/// POST /evidence/report: gate every section of a multi-section report.
pub async fn evidence_report(State(state): State<Arc<AppState>>, Json(req): Json<ReportRequest>) -> ApiResult {
    let verification = state
        .gate
        .verify_report_evidence(&req.sections)
        .await
        .map_err(tribunal_error)?;
    to_json(&verification)
}

pub async fn evidence_tickets(State(state): State<Arc<AppState>>, Query(q): Query<TicketQuery>) -> ApiResult {
    let tickets = if q.open {
        state.gate.tickets().open_tickets()
    } else {
        state.gate.tickets().list()
    }
    .map_err(tribunal_error)?;
    Ok(Json(json!({ "count": tickets.len(), "tickets": tickets })))
}

pub async fn evidence_publications(State(state): State<Arc<AppState>>) -> ApiResult {
    let publications = state.gate.publications().list().map_err(tribunal_error)?;
    to_json(&publications)
}

pub async fn tribunal_stats(State(state): State<Arc<AppState>>, Query(q): Query<StatsQuery>) -> ApiResult {
    let stats = state.gate.tribunal().stats(q.recent).map_err(tribunal_error)?;
    to_json(&stats)
}
