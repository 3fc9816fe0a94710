//! Job state machine on top of a [`JobRepository`].
//!
//! Every mutation follows load → decide → compare-and-swap. A lost race is
//! retried against the fresh row, so the decision is always re-validated
//! against the state another worker left behind.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobFilter, JobProgress, JobState, NewJob, QueueStats};
use crate::repository::JobRepository;

/// How many times a transition is retried after losing a CAS race.
const MAX_CAS_RETRIES: usize = 8;

/// Candidates fetched per claim round.
const CLAIM_BATCH: usize = 16;

/// Default age after which a RUNNING job counts as stuck.
pub fn default_stale_after() -> Duration {
    Duration::hours(1)
}

#[derive(Clone)]
pub struct WorkQueue {
    repo: Arc<dyn JobRepository>,
    default_max_attempts: i32,
    stale_after: Duration,
}

impl WorkQueue {
    pub fn new(repo: Arc<dyn JobRepository>) -> Self {
        Self {
            repo,
            default_max_attempts: 3,
            stale_after: default_stale_after(),
        }
    }

    pub fn from_config(repo: Arc<dyn JobRepository>, cfg: &evgate_core::config::QueueConfig) -> Self {
        Self {
            repo,
            default_max_attempts: cfg.default_max_attempts.max(1),
            stale_after: Duration::seconds(cfg.stale_after_secs as i64),
        }
    }

    pub fn with_stale_after(mut self, stale_after: Duration) -> Self {
        self.stale_after = stale_after;
        self
    }

    pub fn stale_after(&self) -> Duration {
        self.stale_after
    }

    pub fn repository(&self) -> &Arc<dyn JobRepository> {
        &self.repo
    }

    // ── Creation and queries ────────────────────────────────────────

    pub async fn enqueue(&self, new: NewJob) -> Result<Job, QueueError> {
        self.enqueue_at(new, Utc::now()).await
    }

    pub async fn enqueue_at(&self, new: NewJob, now: DateTime<Utc>) -> Result<Job, QueueError> {
        let max_attempts = new.max_attempts.unwrap_or(self.default_max_attempts);
        if max_attempts < 1 {
            return Err(QueueError::Invalid(format!(
                "max_attempts must be at least 1, got {}",
                max_attempts
            )));
        }
        let job = Job {
            id: Uuid::new_v4(),
            job_type: new.job_type,
            refs: new.refs,
            state: JobState::Pending,
            priority: new.priority.unwrap_or(0),
            attempt_count: 0,
            max_attempts,
            progress: JobProgress::default(),
            last_error: None,
            created_at: now,
            started_at: None,
            completed_at: None,
            updated_at: now,
            version: 0,
        };
        self.repo.insert(&job).await?;
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = job.priority,
            max_attempts = job.max_attempts,
            "job enqueued"
        );
        Ok(job)
    }

    pub async fn get(&self, id: Uuid) -> Result<Job, QueueError> {
        self.repo.load(id).await?.ok_or(QueueError::NotFound(id))
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        self.repo.list(filter).await
    }

    /// Highest-priority PENDING job with attempts left, oldest first within
    /// a priority. Does not claim it.
    pub async fn next_pending(&self) -> Result<Option<Job>, QueueError> {
        Ok(self.repo.pending_candidates(1).await?.into_iter().next())
    }

    pub async fn stats(&self) -> Result<QueueStats, QueueError> {
        Ok(QueueStats::from_counts(self.repo.count_by_state().await?))
    }

    // ── Transitions ─────────────────────────────────────────────────

    pub async fn mark_running(&self, id: Uuid) -> Result<Job, QueueError> {
        self.mark_running_at(id, Utc::now()).await
    }

    /// PENDING → RUNNING. The attempt is counted here, on entry.
    pub async fn mark_running_at(&self, id: Uuid, now: DateTime<Utc>) -> Result<Job, QueueError> {
        let job = self.transition(id, "start", now, |job| start_attempt(job, now)).await?;
        info!(job_id = %id, attempt = job.attempt_count, max_attempts = job.max_attempts, "job running");
        Ok(job)
    }

    /// Select and claim the next job in one step. Losing a race on one
    /// candidate moves on to the next.
    pub async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        self.claim_next_at(Utc::now()).await
    }

    pub async fn claim_next_at(&self, now: DateTime<Utc>) -> Result<Option<Job>, QueueError> {
        for _ in 0..MAX_CAS_RETRIES {
            let candidates = self.repo.pending_candidates(CLAIM_BATCH).await?;
            if candidates.is_empty() {
                return Ok(None);
            }
            for candidate in candidates {
                let next = match start_attempt(&candidate, now) {
                    Ok(next) => next,
                    Err(_) => continue,
                };
                let next = stamp(next, &candidate, now);
                if self.repo.compare_and_swap(candidate.version, &next).await? {
                    info!(
                        job_id = %next.id,
                        job_type = %next.job_type,
                        attempt = next.attempt_count,
                        "job claimed"
                    );
                    return Ok(Some(next));
                }
                debug!(job_id = %candidate.id, "claim lost to another worker");
            }
        }
        Ok(None)
    }

    /// Overwrite the checkpoint. No state change.
    pub async fn update_progress(&self, id: Uuid, progress: JobProgress) -> Result<Job, QueueError> {
        self.transition(id, "checkpoint", Utc::now(), |job| {
            if job.state.is_terminal() {
                return Err(invalid(job, "checkpoint"));
            }
            let mut next = job.clone();
            next.progress = progress.clone();
            Ok(next)
        })
        .await
    }

    /// RUNNING → COMPLETED.
    pub async fn mark_completed(&self, id: Uuid) -> Result<Job, QueueError> {
        let now = Utc::now();
        let job = self
            .transition(id, "complete", now, |job| {
                require(job, &[JobState::Running], "complete")?;
                let mut next = job.clone();
                next.state = JobState::Completed;
                next.completed_at = Some(now);
                Ok(next)
            })
            .await?;
        info!(job_id = %id, attempts = job.attempt_count, "job completed");
        Ok(job)
    }

    /// RUNNING → PENDING when attempts remain, otherwise RUNNING → FAILED.
    pub async fn mark_failed(&self, id: Uuid, error: &str) -> Result<Job, QueueError> {
        let now = Utc::now();
        let job = self
            .transition(id, "fail", now, |job| {
                require(job, &[JobState::Running], "fail")?;
                let mut next = job.clone();
                next.last_error = Some(error.to_string());
                if job.has_attempts_left() {
                    next.state = JobState::Pending;
                } else {
                    next.state = JobState::Failed;
                    next.completed_at = Some(now);
                }
                Ok(next)
            })
            .await?;
        match job.state {
            JobState::Failed => warn!(
                job_id = %id,
                attempts = job.attempt_count,
                error = %error,
                "job failed permanently"
            ),
            _ => warn!(
                job_id = %id,
                attempt = job.attempt_count,
                max_attempts = job.max_attempts,
                error = %error,
                "job attempt failed, will retry"
            ),
        }
        Ok(job)
    }

    /// RUNNING → PAUSED. The handler notices at its next checkpoint.
    pub async fn pause(&self, id: Uuid) -> Result<Job, QueueError> {
        let job = self
            .transition(id, "pause", Utc::now(), |job| {
                require(job, &[JobState::Running], "pause")?;
                let mut next = job.clone();
                next.state = JobState::Paused;
                Ok(next)
            })
            .await?;
        info!(job_id = %id, "job paused");
        Ok(job)
    }

    /// PAUSED → PENDING. Keeps the checkpoint so the next attempt resumes.
    pub async fn resume(&self, id: Uuid) -> Result<Job, QueueError> {
        let job = self
            .transition(id, "resume", Utc::now(), |job| {
                require(job, &[JobState::Paused], "resume")?;
                let mut next = job.clone();
                next.state = JobState::Pending;
                Ok(next)
            })
            .await?;
        info!(job_id = %id, "job resumed");
        Ok(job)
    }

    pub async fn cancel(&self, id: Uuid) -> Result<Job, QueueError> {
        let now = Utc::now();
        let job = self
            .transition(id, "cancel", now, |job| {
                require(
                    job,
                    &[JobState::Pending, JobState::Running, JobState::Paused],
                    "cancel",
                )?;
                let mut next = job.clone();
                next.state = JobState::Cancelled;
                next.completed_at = Some(now);
                Ok(next)
            })
            .await?;
        info!(job_id = %id, "job cancelled");
        Ok(job)
    }

    // ── Crash recovery ──────────────────────────────────────────────

    pub async fn stuck_running_jobs(&self, stale_after: Duration) -> Result<Vec<Job>, QueueError> {
        self.stuck_running_jobs_at(stale_after, Utc::now()).await
    }

    /// RUNNING jobs whose current attempt started more than `stale_after` ago.
    pub async fn stuck_running_jobs_at(
        &self,
        stale_after: Duration,
        now: DateTime<Utc>,
    ) -> Result<Vec<Job>, QueueError> {
        let cutoff = now - stale_after;
        let running = self.repo.list(&JobFilter::state(JobState::Running)).await?;
        Ok(running
            .into_iter()
            .filter(|j| j.started_at.map_or(true, |s| s < cutoff))
            .collect())
    }

    pub async fn reset_stuck_jobs(&self) -> Result<usize, QueueError> {
        self.reset_stuck_jobs_at(Utc::now()).await
    }

    /// Return stuck jobs with attempts left to PENDING. Stuck jobs that have
    /// used every attempt stay RUNNING for an operator to inspect.
    pub async fn reset_stuck_jobs_at(&self, now: DateTime<Utc>) -> Result<usize, QueueError> {
        let stuck = self.stuck_running_jobs_at(self.stale_after, now).await?;
        let mut reset = 0;
        for job in stuck {
            if !job.has_attempts_left() {
                warn!(
                    job_id = %job.id,
                    attempts = job.attempt_count,
                    "stuck job has no attempts left, leaving as running"
                );
                continue;
            }
            let started_at = job.started_at;
            let result = self
                .transition(job.id, "reset", now, |current| {
                    require(current, &[JobState::Running], "reset")?;
                    if current.started_at != started_at || !current.has_attempts_left() {
                        return Err(invalid(current, "reset"));
                    }
                    let mut next = current.clone();
                    next.state = JobState::Pending;
                    next.last_error = Some("reset after stalled attempt".into());
                    Ok(next)
                })
                .await;
            match result {
                Ok(_) => {
                    reset += 1;
                    info!(job_id = %job.id, attempt = job.attempt_count, "stuck job reset to pending");
                }
                // The job moved on since it was listed.
                Err(QueueError::InvalidTransition { .. }) | Err(QueueError::Conflict(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(reset)
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn transition<F>(
        &self,
        id: Uuid,
        op: &'static str,
        now: DateTime<Utc>,
        decide: F,
    ) -> Result<Job, QueueError>
    where
        F: Fn(&Job) -> Result<Job, QueueError> + Send + Sync,
    {
        for _ in 0..MAX_CAS_RETRIES {
            let current = self.get(id).await?;
            let next = stamp(decide(&current)?, &current, now);
            if self.repo.compare_and_swap(current.version, &next).await? {
                return Ok(next);
            }
            debug!(job_id = %id, op, "compare-and-swap lost, retrying");
        }
        Err(QueueError::Conflict(id))
    }
}

fn stamp(mut next: Job, current: &Job, now: DateTime<Utc>) -> Job {
    next.version = current.version + 1;
    next.updated_at = now;
    next
}

fn start_attempt(job: &Job, now: DateTime<Utc>) -> Result<Job, QueueError> {
    require(job, &[JobState::Pending], "start")?;
    if !job.has_attempts_left() {
        return Err(QueueError::Invalid(format!(
            "job {} has used all {} attempts",
            job.id, job.max_attempts
        )));
    }
    let mut next = job.clone();
    next.state = JobState::Running;
    next.attempt_count += 1;
    next.started_at = Some(now);
    Ok(next)
}

fn require(job: &Job, allowed: &[JobState], op: &'static str) -> Result<(), QueueError> {
    if allowed.contains(&job.state) {
        Ok(())
    } else {
        Err(invalid(job, op))
    }
}

fn invalid(job: &Job, op: &'static str) -> QueueError {
    QueueError::InvalidTransition {
        id: job.id,
        from: job.state,
        op,
    }
}
