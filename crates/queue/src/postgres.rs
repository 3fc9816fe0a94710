//! PostgreSQL job repository backed by the `ingestion_jobs` table.
//!
//! Compare-and-swap is a single `UPDATE ... WHERE id = $1 AND version = $2`,
//! so concurrent workers in separate processes never double-claim a job.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobFilter, JobProgress, JobRefs, JobState};
use crate::repository::JobRepository;

const JOB_COLUMNS: &str = "id, job_type, source_id, endpoint_id, product_id, state, priority,
     attempt_count, max_attempts, progress, last_error, created_at, started_at,
     completed_at, updated_at, version";

/// Row from the `ingestion_jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    job_type: String,
    source_id: Option<String>,
    endpoint_id: Option<String>,
    product_id: Option<String>,
    state: String,
    priority: i32,
    attempt_count: i32,
    max_attempts: i32,
    progress: serde_json::Value,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    updated_at: DateTime<Utc>,
    version: i64,
}

impl TryFrom<JobRow> for Job {
    type Error = QueueError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let progress: JobProgress = serde_json::from_value(row.progress)
            .map_err(|e| QueueError::Storage(format!("job {} progress: {}", row.id, e)))?;
        Ok(Job {
            id: row.id,
            job_type: row.job_type.parse().map_err(QueueError::Storage)?,
            refs: JobRefs {
                source_id: row.source_id,
                endpoint_id: row.endpoint_id,
                product_id: row.product_id,
            },
            state: row.state.parse().map_err(QueueError::Storage)?,
            priority: row.priority,
            attempt_count: row.attempt_count,
            max_attempts: row.max_attempts,
            progress,
            last_error: row.last_error,
            created_at: row.created_at,
            started_at: row.started_at,
            completed_at: row.completed_at,
            updated_at: row.updated_at,
            version: row.version,
        })
    }
}

fn progress_json(job: &Job) -> Result<serde_json::Value, QueueError> {
    serde_json::to_value(&job.progress).map_err(|e| QueueError::Invalid(e.to_string()))
}

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl JobRepository for PgJobStore {
    async fn insert(&self, job: &Job) -> Result<(), QueueError> {
        sqlx::query(
            "INSERT INTO ingestion_jobs
                (id, job_type, source_id, endpoint_id, product_id, state, priority,
                 attempt_count, max_attempts, progress, last_error, created_at,
                 started_at, completed_at, updated_at, version)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16)",
        )
        .bind(job.id)
        .bind(job.job_type.as_str())
        .bind(&job.refs.source_id)
        .bind(&job.refs.endpoint_id)
        .bind(&job.refs.product_id)
        .bind(job.state.as_str())
        .bind(job.priority)
        .bind(job.attempt_count)
        .bind(job.max_attempts)
        .bind(progress_json(job)?)
        .bind(&job.last_error)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.updated_at)
        .bind(job.version)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let sql = format!("SELECT {} FROM ingestion_jobs WHERE id = $1", JOB_COLUMNS);
        let row = sqlx::query_as::<_, JobRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(Job::try_from).transpose()
    }

    async fn compare_and_swap(&self, expected_version: i64, next: &Job) -> Result<bool, QueueError> {
        let result = sqlx::query(
            "UPDATE ingestion_jobs
                SET state = $3, priority = $4, attempt_count = $5, max_attempts = $6,
                    progress = $7, last_error = $8, started_at = $9, completed_at = $10,
                    updated_at = $11, version = $12
              WHERE id = $1 AND version = $2",
        )
        .bind(next.id)
        .bind(expected_version)
        .bind(next.state.as_str())
        .bind(next.priority)
        .bind(next.attempt_count)
        .bind(next.max_attempts)
        .bind(progress_json(next)?)
        .bind(&next.last_error)
        .bind(next.started_at)
        .bind(next.completed_at)
        .bind(next.updated_at)
        .bind(next.version)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(true);
        }
        // Distinguish a lost race from a missing row.
        match self.load(next.id).await? {
            Some(_) => Ok(false),
            None => Err(QueueError::NotFound(next.id)),
        }
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        let sql = format!(
            "SELECT {} FROM ingestion_jobs
              WHERE ($1::text IS NULL OR state = $1)
                AND ($2::text IS NULL OR job_type = $2)
                AND ($3::text IS NULL OR source_id = $3)
              ORDER BY created_at ASC
              LIMIT $4",
            JOB_COLUMNS
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(filter.state.map(|s| s.as_str()))
            .bind(filter.job_type.map(|t| t.as_str()))
            .bind(&filter.source_id)
            .bind(filter.limit.map(|l| l as i64).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn pending_candidates(&self, limit: usize) -> Result<Vec<Job>, QueueError> {
        let sql = format!(
            "SELECT {} FROM ingestion_jobs
              WHERE state = 'pending' AND attempt_count < max_attempts
              ORDER BY priority DESC, created_at ASC, id ASC
              LIMIT $1",
            JOB_COLUMNS
        );
        let rows = sqlx::query_as::<_, JobRow>(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter().map(Job::try_from).collect()
    }

    async fn count_by_state(&self) -> Result<Vec<(JobState, u64)>, QueueError> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT state, COUNT(*) FROM ingestion_jobs GROUP BY state")
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter()
            .map(|(state, n)| Ok((state.parse().map_err(QueueError::Storage)?, n as u64)))
            .collect()
    }
}
