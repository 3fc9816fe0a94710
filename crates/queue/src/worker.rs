//! Worker loop: claim a job, run its handler, record the outcome.
//!
//! Handlers receive a [`JobContext`] holding the stored checkpoint. They
//! should call [`JobContext::checkpoint`] between units of work; a pause or
//! cancel requested in the meantime is reported there and the handler
//! returns [`JobOutcome::Yielded`].

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobProgress, JobState, JobType};
use crate::work_queue::WorkQueue;

// ── Shutdown signal ──────────────────────────────────────────────────

/// Cooperative shutdown shared by the worker and maintenance loops.
#[derive(Debug, Default)]
pub struct Shutdown {
    triggered: AtomicBool,
    notify: Notify,
}

impl Shutdown {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn trigger(&self) {
        self.triggered.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    pub fn is_triggered(&self) -> bool {
        self.triggered.load(Ordering::SeqCst)
    }

    /// Sleep for `period` or until shutdown, whichever comes first.
    /// Returns `true` when shutdown was requested.
    pub async fn sleep(&self, period: Duration) -> bool {
        let notified = self.notify.notified();
        tokio::pin!(notified);
        // Register before checking the flag so a trigger in between is not lost.
        notified.as_mut().enable();
        if self.is_triggered() {
            return true;
        }
        tokio::select! {
            _ = tokio::time::sleep(period) => self.is_triggered(),
            _ = notified => true,
        }
    }
}

// ── Handler API ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    /// All work done; the job is marked COMPLETED.
    Completed,
    /// The handler stopped at a checkpoint because the job left RUNNING.
    Yielded,
}

/// Result of writing a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    /// The job was paused or cancelled; stop work now.
    Stop(JobState),
}

pub struct JobContext {
    queue: WorkQueue,
    job_id: Uuid,
    resumed_from: JobProgress,
}

impl JobContext {
    pub fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Checkpoint left by a previous attempt, default when starting fresh.
    pub fn resumed_from(&self) -> &JobProgress {
        &self.resumed_from
    }

    pub async fn checkpoint(&self, progress: JobProgress) -> Result<Checkpoint, QueueError> {
        let job = self.queue.update_progress(self.job_id, progress).await?;
        Ok(match job.state {
            JobState::Running => Checkpoint::Continue,
            other => Checkpoint::Stop(other),
        })
    }
}

#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Job types routed to this handler.
    fn job_types(&self) -> &[JobType];

    async fn run(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<JobOutcome>;
}

// ── Worker ───────────────────────────────────────────────────────────

pub struct Worker {
    name: String,
    queue: WorkQueue,
    handlers: HashMap<JobType, Arc<dyn JobHandler>>,
    poll_interval: Duration,
}

impl Worker {
    pub fn new(name: impl Into<String>, queue: WorkQueue) -> Self {
        Self {
            name: name.into(),
            queue,
            handlers: HashMap::new(),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn register(mut self, handler: Arc<dyn JobHandler>) -> Self {
        for job_type in handler.job_types() {
            self.handlers.insert(*job_type, handler.clone());
        }
        self
    }

    /// Claim and run a single job. Returns the job as it was left, or
    /// `None` when nothing was pending.
    pub async fn run_once(&self) -> Result<Option<Job>, QueueError> {
        let Some(job) = self.queue.claim_next().await? else {
            return Ok(None);
        };

        let Some(handler) = self.handlers.get(&job.job_type) else {
            warn!(worker = %self.name, job_id = %job.id, job_type = %job.job_type, "no handler registered");
            let failed = self
                .queue
                .mark_failed(job.id, &format!("no handler for job type {}", job.job_type))
                .await?;
            return Ok(Some(failed));
        };

        let ctx = JobContext {
            queue: self.queue.clone(),
            job_id: job.id,
            resumed_from: job.progress.clone(),
        };
        let started = std::time::Instant::now();
        let outcome = handler.run(&job, &ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let settled = match outcome {
            Ok(JobOutcome::Completed) => self.queue.mark_completed(job.id).await,
            Ok(JobOutcome::Yielded) => self.queue.get(job.id).await,
            Err(e) => self.queue.mark_failed(job.id, &format!("{:#}", e)).await,
        };

        match settled {
            Ok(after) => {
                info!(
                    worker = %self.name,
                    job_id = %job.id,
                    state = %after.state,
                    elapsed_ms,
                    "job settled"
                );
                Ok(Some(after))
            }
            // Paused or cancelled while the handler was finishing up.
            Err(QueueError::InvalidTransition { from, .. }) => {
                info!(worker = %self.name, job_id = %job.id, state = %from, "job left running before settling");
                self.queue.get(job.id).await.map(Some)
            }
            Err(e) => Err(e),
        }
    }

    /// Loop until shutdown. Sleeps for the poll interval when idle.
    pub async fn run(&self, shutdown: Arc<Shutdown>) {
        info!(worker = %self.name, handlers = self.handlers.len(), "worker started");
        while !shutdown.is_triggered() {
            match self.run_once().await {
                Ok(Some(_)) => continue,
                Ok(None) => {}
                Err(e) => error!(worker = %self.name, error = %e, "worker: queue error"),
            }
            if shutdown.sleep(self.poll_interval).await {
                break;
            }
        }
        info!(worker = %self.name, "worker stopped");
    }
}
