//! Policy-gated ingestion job handler.
//!
//! A job names a source. The source must be ACTIVE and pass the registry
//! lint. The handler asks the policy enforcer which pipes
//! the source may feed, fetches the raw payload once and hands it to every
//! registered pipe that is both eligible and not yet done. Finished pipes
//! are recorded in the job checkpoint so a resumed or retried job skips them.

use std::collections::BTreeSet;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info};

use evgate_queue::{Checkpoint, Job, JobContext, JobHandler, JobOutcome, JobProgress, JobType};
use evgate_registry::{PipeType, PolicyEnforcer, Source};

/// Pulls the raw payload for a source.
#[async_trait]
pub trait SourceFetcher: Send + Sync {
    async fn fetch(&self, source: &Source) -> anyhow::Result<Vec<u8>>;
}

/// A downstream processing path. Returns the number of artifacts produced.
#[async_trait]
pub trait IngestionPipe: Send + Sync {
    fn pipe(&self) -> PipeType;

    async fn ingest(&self, source: &Source, raw: &[u8]) -> anyhow::Result<u64>;
}

pub struct PolicyGatedIngestion {
    enforcer: PolicyEnforcer,
    fetcher: Arc<dyn SourceFetcher>,
    pipes: Vec<Arc<dyn IngestionPipe>>,
}

const JOB_TYPES: &[JobType] = &[JobType::IngestSource, JobType::Refresh, JobType::Backfill];

impl PolicyGatedIngestion {
    pub fn new(enforcer: PolicyEnforcer, fetcher: Arc<dyn SourceFetcher>) -> Self {
        Self {
            enforcer,
            fetcher,
            pipes: Vec::new(),
        }
    }

    pub fn with_pipe(mut self, pipe: Arc<dyn IngestionPipe>) -> Self {
        self.pipes.push(pipe);
        self
    }

    pub fn has_pipes(&self) -> bool {
        !self.pipes.is_empty()
    }
}

fn completed_pipes(progress: &JobProgress) -> BTreeSet<String> {
    progress
        .cursor
        .as_ref()
        .and_then(|c| c.get("completed_pipes"))
        .and_then(|v| v.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

#[async_trait]
impl JobHandler for PolicyGatedIngestion {
    fn job_types(&self) -> &[JobType] {
        JOB_TYPES
    }

    async fn run(&self, job: &Job, ctx: &JobContext) -> anyhow::Result<JobOutcome> {
        let source_id = job
            .refs
            .source_id
            .as_deref()
            .ok_or_else(|| anyhow!("job {} has no source_id", job.id))?;
        // Inactive and lint-rejected entries fail the attempt with the reason.
        let source = self.enforcer.admit(source_id).await?;

        let decision = self.enforcer.decide(source_id).await?;
        let targets: Vec<&Arc<dyn IngestionPipe>> = self.pipes.iter().filter(|p| decision.allows(p.pipe())).collect();
        if targets.is_empty() {
            return Err(anyhow!(
                "source {} is not eligible for any registered pipe (eligible: {:?})",
                source_id,
                decision.eligible_pipes
            ));
        }

        let mut done = completed_pipes(ctx.resumed_from());
        let mut processed = ctx.resumed_from().processed;
        let total = Some(targets.len() as u64);
        let mut raw: Option<Vec<u8>> = None;

        for pipe in targets {
            let name = pipe.pipe().as_str();
            if done.contains(name) {
                debug!(job_id = %job.id, pipe = name, "pipe already done; skipping");
                continue;
            }

            let step = JobProgress {
                step: Some(format!("ingest:{}", name)),
                processed,
                total,
                cursor: Some(json!({ "completed_pipes": done })),
            };
            if let Checkpoint::Stop(state) = ctx.checkpoint(step).await? {
                info!(job_id = %job.id, state = %state, "ingestion stopped at checkpoint");
                return Ok(JobOutcome::Yielded);
            }

            if raw.is_none() {
                raw = Some(
                    self.fetcher
                        .fetch(&source)
                        .await
                        .with_context(|| format!("fetching {}", source_id))?,
                );
            }
            let payload = raw.as_deref().unwrap_or_default();
            let artifacts = pipe
                .ingest(&source, payload)
                .await
                .with_context(|| format!("{} pipe failed for {}", name, source_id))?;

            processed += artifacts;
            done.insert(name.to_string());
            let after = JobProgress {
                step: Some(format!("done:{}", name)),
                processed,
                total,
                cursor: Some(json!({ "completed_pipes": done })),
            };
            if let Checkpoint::Stop(state) = ctx.checkpoint(after).await? {
                info!(job_id = %job.id, state = %state, "ingestion stopped at checkpoint");
                return Ok(JobOutcome::Yielded);
            }
        }

        info!(job_id = %job.id, source_id, artifacts = processed, "source ingested");
        Ok(JobOutcome::Completed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use evgate_queue::{JobRefs, JobState, MemoryJobStore, NewJob, WorkQueue, Worker};
    use evgate_registry::MemorySourceStore;

    fn source(id: &str, status: &str, tags: &[&str]) -> Source {
        Source {
            source_id: id.to_string(),
            name: Some(format!("Source {}", id)),
            status: status.into(),
            tier: "T1".into(),
            access_type: "API".into(),
            update_frequency: "DAILY".into(),
            allowed_use: tags.iter().map(|t| t.to_string()).collect(),
            endpoint_count: 1,
            needs_partnership: false,
            partnership_contact: None,
        }
    }

    struct Bytes(AtomicUsize);

    #[async_trait]
    impl SourceFetcher for Bytes {
        async fn fetch(&self, _: &Source) -> anyhow::Result<Vec<u8>> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(b"payload".to_vec())
        }
    }

    struct Recording {
        pipe: PipeType,
        fail: bool,
        seen: Mutex<Vec<String>>,
    }

    impl Recording {
        fn new(pipe: PipeType) -> Arc<Self> {
            Arc::new(Self {
                pipe,
                fail: false,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing(pipe: PipeType) -> Arc<Self> {
            Arc::new(Self {
                pipe,
                fail: true,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl IngestionPipe for Recording {
        fn pipe(&self) -> PipeType {
            self.pipe
        }

        async fn ingest(&self, source: &Source, raw: &[u8]) -> anyhow::Result<u64> {
            if self.fail {
                return Err(anyhow!("parser crashed"));
            }
            self.seen.lock().unwrap().push(source.source_id.clone());
            Ok(raw.len() as u64)
        }
    }

    fn setup(sources: Vec<Source>) -> (WorkQueue, PolicyEnforcer) {
        let queue = WorkQueue::new(Arc::new(MemoryJobStore::new()));
        let enforcer = PolicyEnforcer::new(Arc::new(MemorySourceStore::new(sources)));
        (queue, enforcer)
    }

    #[tokio::test]
    async fn only_eligible_pipes_receive_material() {
        let (queue, enforcer) = setup(vec![source("ofac", "ACTIVE", &["sanctions_list"])]);
        let sanctions = Recording::new(PipeType::SanctionsCompliance);
        let vault = Recording::new(PipeType::DocumentVault);
        let fetcher = Arc::new(Bytes(AtomicUsize::new(0)));
        let handler = PolicyGatedIngestion::new(enforcer, fetcher.clone())
            .with_pipe(sanctions.clone())
            .with_pipe(vault.clone());
        let worker = Worker::new("w1", queue.clone()).register(Arc::new(handler));

        let job = queue
            .enqueue(NewJob::new(JobType::IngestSource).refs(JobRefs::source("ofac")))
            .await
            .unwrap();
        let after = worker.run_once().await.unwrap().unwrap();

        assert_eq!(after.id, job.id);
        assert_eq!(after.state, JobState::Completed);
        assert_eq!(after.progress.processed, 7);
        assert_eq!(*sanctions.seen.lock().unwrap(), vec!["ofac"]);
        assert!(vault.seen.lock().unwrap().is_empty());
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn ineligible_or_inactive_source_fails_the_attempt() {
        let (queue, enforcer) = setup(vec![
            source("reuters", "ACTIVE", &["news_media"]),
            source("draft", "PENDING_REVIEW", &["sanctions_list"]),
        ]);
        let handler = PolicyGatedIngestion::new(enforcer, Arc::new(Bytes(AtomicUsize::new(0))))
            .with_pipe(Recording::new(PipeType::SanctionsCompliance));
        let worker = Worker::new("w1", queue.clone()).register(Arc::new(handler));

        for id in ["reuters", "draft"] {
            queue
                .enqueue(NewJob::new(JobType::IngestSource).refs(JobRefs::source(id)).max_attempts(1))
                .await
                .unwrap();
            let after = worker.run_once().await.unwrap().unwrap();
            assert_eq!(after.state, JobState::Failed, "{}", id);
            assert!(after.last_error.unwrap().contains(id));
        }
    }

    #[tokio::test]
    async fn lint_rejected_source_fails_with_rule_code() {
        let mut bare = source("bare", "ACTIVE", &["data_numeric"]);
        bare.endpoint_count = 0;
        let (queue, enforcer) = setup(vec![bare]);
        let numeric = Recording::new(PipeType::NumericTimeseries);
        let fetcher = Arc::new(Bytes(AtomicUsize::new(0)));
        let handler = PolicyGatedIngestion::new(enforcer, fetcher.clone()).with_pipe(numeric.clone());
        let worker = Worker::new("w1", queue.clone()).register(Arc::new(handler));

        queue
            .enqueue(NewJob::new(JobType::IngestSource).refs(JobRefs::source("bare")).max_attempts(1))
            .await
            .unwrap();
        let after = worker.run_once().await.unwrap().unwrap();

        assert_eq!(after.state, JobState::Failed);
        assert!(after.last_error.unwrap().contains("ACTIVE_NO_ENDPOINT"));
        assert!(numeric.seen.lock().unwrap().is_empty());
        assert_eq!(fetcher.0.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn retry_skips_pipes_already_done() {
        let (queue, enforcer) = setup(vec![source("wb", "ACTIVE", &["data_numeric", "doc_pdf"])]);
        let numeric = Recording::new(PipeType::NumericTimeseries);
        let handler = PolicyGatedIngestion::new(enforcer.clone(), Arc::new(Bytes(AtomicUsize::new(0))))
            .with_pipe(numeric.clone())
            .with_pipe(Recording::failing(PipeType::DocumentVault));
        let worker = Worker::new("w1", queue.clone()).register(Arc::new(handler));

        queue
            .enqueue(NewJob::new(JobType::IngestSource).refs(JobRefs::source("wb")).max_attempts(2))
            .await
            .unwrap();
        let first = worker.run_once().await.unwrap().unwrap();
        assert_eq!(first.state, JobState::Pending);
        assert_eq!(completed_pipes(&first.progress).into_iter().collect::<Vec<_>>(), vec!["numeric_timeseries"]);

        let vault = Recording::new(PipeType::DocumentVault);
        let handler = PolicyGatedIngestion::new(enforcer, Arc::new(Bytes(AtomicUsize::new(0))))
            .with_pipe(numeric.clone())
            .with_pipe(vault.clone());
        let worker = Worker::new("w2", queue.clone()).register(Arc::new(handler));
        let second = worker.run_once().await.unwrap().unwrap();

        assert_eq!(second.state, JobState::Completed);
        assert_eq!(second.attempt_count, 2);
        assert_eq!(numeric.seen.lock().unwrap().len(), 1);
        assert_eq!(vault.seen.lock().unwrap().len(), 1);
    }
}
