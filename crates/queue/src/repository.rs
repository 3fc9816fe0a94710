//! Storage interface for jobs.
//!
//! Implementations only persist rows. Every state transition is decided in
//! [`crate::WorkQueue`] and written back through [`JobRepository::compare_and_swap`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobFilter, JobState};

#[async_trait]
pub trait JobRepository: Send + Sync {
    /// Persist a freshly created job.
    async fn insert(&self, job: &Job) -> Result<(), QueueError>;

    async fn load(&self, id: Uuid) -> Result<Option<Job>, QueueError>;

    /// Replace the stored row with `next` only if the stored row still has
    /// version `expected_version`. Returns `false` when another writer won.
    ///
    /// Implementations store `next` as given; callers bump `next.version`.
    async fn compare_and_swap(&self, expected_version: i64, next: &Job) -> Result<bool, QueueError>;

    /// Jobs matching `filter`, oldest first.
    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError>;

    /// PENDING jobs with attempts left, in dispatch order: priority
    /// descending, then `created_at` ascending.
    async fn pending_candidates(&self, limit: usize) -> Result<Vec<Job>, QueueError>;

    async fn count_by_state(&self) -> Result<Vec<(JobState, u64)>, QueueError>;
}

/// Dispatch order shared by every implementation.
pub fn dispatch_order(a: &Job, b: &Job) -> std::cmp::Ordering {
    b.priority
        .cmp(&a.priority)
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}
