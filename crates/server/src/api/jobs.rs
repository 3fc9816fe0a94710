//! Work queue endpoints: enqueue, inspect, control and recover jobs.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use evgate_queue::{Job, JobFilter, JobRefs, JobType, NewJob, QueueError};

use super::{error_response, to_json, ApiError, ApiResult};
use crate::state::AppState;

fn queue_error(e: QueueError) -> ApiError {
    error_response(e.status_code(), e)
}

#[derive(Debug, Deserialize)]
pub struct CreateJobRequest {
    pub job_type: JobType,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub endpoint_id: Option<String>,
    #[serde(default)]
    pub product_id: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
}

impl From<CreateJobRequest> for NewJob {
    fn from(req: CreateJobRequest) -> Self {
        let mut job = NewJob::new(req.job_type).refs(JobRefs {
            source_id: req.source_id,
            endpoint_id: req.endpoint_id,
            product_id: req.product_id,
        });
        if let Some(p) = req.priority {
            job = job.priority(p);
        }
        if let Some(m) = req.max_attempts {
            job = job.max_attempts(m);
        }
        job
    }
}

/// POST /jobs: enqueue a job in PENDING.
pub async fn jobs_create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<Job>), ApiError> {
    let job = state.queue.enqueue(req.into()).await.map_err(queue_error)?;
    Ok((StatusCode::CREATED, Json(job)))
}

/// GET /jobs?state=&job_type=&source_id=&limit=
pub async fn jobs_list(State(state): State<Arc<AppState>>, Query(filter): Query<JobFilter>) -> ApiResult {
    let jobs = state.queue.list(&filter).await.map_err(queue_error)?;
    to_json(&jobs)
}

pub async fn jobs_stats(State(state): State<Arc<AppState>>) -> ApiResult {
    let stats = state.queue.stats().await.map_err(queue_error)?;
    to_json(&stats)
}

/// GET /jobs/stuck: RUNNING jobs whose attempt started before the stale window.
pub async fn jobs_stuck(State(state): State<Arc<AppState>>) -> ApiResult {
    let stale_after = state.queue.stale_after();
    let jobs = state.queue.stuck_running_jobs(stale_after).await.map_err(queue_error)?;
    Ok(Json(json!({
        "stale_after_secs": stale_after.num_seconds(),
        "jobs": jobs,
    })))
}

pub async fn jobs_get(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
    let job = state.queue.get(id).await.map_err(queue_error)?;
    to_json(&job)
}

pub async fn jobs_pause(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
    let job = state.queue.pause(id).await.map_err(queue_error)?;
    to_json(&job)
}

pub async fn jobs_resume(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
    let job = state.queue.resume(id).await.map_err(queue_error)?;
    to_json(&job)
}

pub async fn jobs_cancel(State(state): State<Arc<AppState>>, Path(id): Path<Uuid>) -> ApiResult {
    let job = state.queue.cancel(id).await.map_err(queue_error)?;
    to_json(&job)
}

/// POST /jobs/reset-stuck: return stale RUNNING jobs to PENDING.
pub async fn jobs_reset_stuck(State(state): State<Arc<AppState>>) -> ApiResult {
    let reset = state.queue.reset_stuck_jobs().await.map_err(queue_error)?;
    Ok(Json(json!({ "reset": reset })))
}
