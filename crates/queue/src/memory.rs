//! In-memory job repository.
//!
//! Uses `IndexMap` to keep insertion order (oldest first) with O(1) lookup
//! by job id. Suitable for tests and single-process embedding.

use std::sync::RwLock;

use async_trait::async_trait;
use indexmap::IndexMap;
use uuid::Uuid;

use crate::error::QueueError;
use crate::job::{Job, JobFilter, JobState};
use crate::repository::{dispatch_order, JobRepository};

#[derive(Debug, Default)]
pub struct MemoryJobStore {
    jobs: RwLock<IndexMap<Uuid, Job>>,
}

fn poisoned<T>(_: T) -> QueueError {
    QueueError::Storage("job store lock poisoned".into())
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.jobs.read().map(|j| j.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl JobRepository for MemoryJobStore {
    async fn insert(&self, job: &Job) -> Result<(), QueueError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        if jobs.contains_key(&job.id) {
            return Err(QueueError::Invalid(format!("duplicate job id {}", job.id)));
        }
        jobs.insert(job.id, job.clone());
        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<Option<Job>, QueueError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        Ok(jobs.get(&id).cloned())
    }

    async fn compare_and_swap(&self, expected_version: i64, next: &Job) -> Result<bool, QueueError> {
        let mut jobs = self.jobs.write().map_err(poisoned)?;
        match jobs.get_mut(&next.id) {
            None => Err(QueueError::NotFound(next.id)),
            Some(current) if current.version != expected_version => Ok(false),
            Some(current) => {
                *current = next.clone();
                Ok(true)
            }
        }
    }

    async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>, QueueError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut out: Vec<Job> = jobs.values().filter(|j| filter.matches(j)).cloned().collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        if let Some(limit) = filter.limit {
            out.truncate(limit);
        }
        Ok(out)
    }

    async fn pending_candidates(&self, limit: usize) -> Result<Vec<Job>, QueueError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut out: Vec<Job> = jobs
            .values()
            .filter(|j| j.state == JobState::Pending && j.has_attempts_left())
            .cloned()
            .collect();
        out.sort_by(dispatch_order);
        out.truncate(limit);
        Ok(out)
    }

    async fn count_by_state(&self) -> Result<Vec<(JobState, u64)>, QueueError> {
        let jobs = self.jobs.read().map_err(poisoned)?;
        let mut counts: IndexMap<JobState, u64> = IndexMap::new();
        for job in jobs.values() {
            *counts.entry(job.state).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}
