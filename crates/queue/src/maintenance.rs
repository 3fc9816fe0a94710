//! Periodic crash-recovery task.

use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use crate::work_queue::WorkQueue;
use crate::worker::Shutdown;

/// Run `reset_stuck_jobs` every `interval` until shutdown.
///
/// The first sweep runs immediately so a restarted process recovers jobs
/// orphaned by its previous incarnation without waiting a full interval.
pub async fn run_maintenance(queue: WorkQueue, interval: Duration, shutdown: Arc<Shutdown>) {
    info!(
        interval_secs = interval.as_secs(),
        stale_after_secs = queue.stale_after().num_seconds(),
        "queue maintenance started"
    );
    loop {
        match queue.reset_stuck_jobs().await {
            Ok(0) => {}
            Ok(n) => info!(reset = n, "maintenance: reset stuck jobs"),
            Err(e) => warn!(error = %e, "maintenance: failed to reset stuck jobs"),
        }
        if shutdown.sleep(interval).await {
            break;
        }
    }
    info!("queue maintenance stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobState, JobType, NewJob};
    use crate::memory::MemoryJobStore;

    #[tokio::test]
    async fn first_sweep_recovers_orphaned_job() {
        let queue = WorkQueue::new(Arc::new(MemoryJobStore::new()))
            .with_stale_after(chrono::Duration::zero());
        let job = queue.enqueue(NewJob::new(JobType::IngestSource)).await.unwrap();
        queue
            .mark_running_at(job.id, chrono::Utc::now() - chrono::Duration::minutes(5))
            .await
            .unwrap();

        let shutdown = Shutdown::new();
        let task = tokio::spawn(run_maintenance(
            queue.clone(),
            Duration::from_secs(3600),
            shutdown.clone(),
        ));
        // Wait for the first sweep.
        for _ in 0..100 {
            if queue.get(job.id).await.unwrap().state == JobState::Pending {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(queue.get(job.id).await.unwrap().state, JobState::Pending);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
