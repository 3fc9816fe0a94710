//! Nightly re-certification loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use evgate_core::config::ReliabilityConfig;
use evgate_queue::Shutdown;
use tracing::{info, warn};

use crate::corpus::Corpus;
use crate::deploy::deployment_gate;
use crate::error::ReliabilityError;
use crate::harness::{ReliabilityHarness, ReliabilityRun, RunType};
use crate::store::RunStore;

/// Run the whole corpus once and retain the result.
pub async fn run_and_store(
    harness: &ReliabilityHarness,
    corpus: &Corpus,
    store: &dyn RunStore,
    run_type: RunType,
) -> Result<ReliabilityRun, ReliabilityError> {
    let run = harness.run(&corpus.cases, run_type).await;
    store.save(&run)?;
    Ok(run)
}

/// Run nightly until shutdown. Runs immediately when the retained
/// certificate is missing or stale.
pub async fn run_scheduled(
    harness: Arc<ReliabilityHarness>,
    corpus: Arc<Corpus>,
    store: Arc<dyn RunStore>,
    cfg: ReliabilityConfig,
    shutdown: Arc<Shutdown>,
) {
    let interval = Duration::from_secs(cfg.run_interval_hours.max(1) * 3600);
    info!(
        interval_hours = cfg.run_interval_hours,
        cases = corpus.len(),
        "reliability schedule started"
    );

    let needs_run = match store.latest() {
        Ok(latest) => !deployment_gate(latest.as_ref(), Utc::now(), &cfg).allowed,
        Err(e) => {
            warn!(error = %e, "reliability schedule: could not read latest run");
            true
        }
    };
    if !needs_run && shutdown.sleep(interval).await {
        info!("reliability schedule stopped");
        return;
    }

    loop {
        match run_and_store(&harness, &corpus, store.as_ref(), RunType::Nightly).await {
            Ok(run) if run.meets_threshold() => {}
            Ok(run) => warn!(
                run_id = %run.run_id,
                score = run.reliability_score,
                threshold = run.score_threshold,
                "reliability below threshold; deployments are blocked"
            ),
            Err(e) => warn!(error = %e, "reliability schedule: failed to store run"),
        }
        if shutdown.sleep(interval).await {
            break;
        }
    }
    info!("reliability schedule stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::responder::FixtureResponder;
    use crate::store::MemoryRunStore;
    use evgate_core::config::TribunalConfig;

    #[tokio::test]
    async fn missing_certificate_triggers_immediate_run() {
        let cfg = ReliabilityConfig::default();
        let harness = Arc::new(ReliabilityHarness::isolated(
            &TribunalConfig::default(),
            Arc::new(FixtureResponder::new()),
            &cfg,
        ));
        let mut corpus = Corpus::builtin();
        corpus.cases.truncate(3);
        let store = Arc::new(MemoryRunStore::new());
        let shutdown = Shutdown::new();

        let task = tokio::spawn(run_scheduled(
            harness,
            Arc::new(corpus),
            store.clone(),
            cfg,
            shutdown.clone(),
        ));
        for _ in 0..100 {
            if store.latest().unwrap().is_some() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        let run = store.latest().unwrap().unwrap();
        assert_eq!(run.run_type, RunType::Nightly);
        assert_eq!(run.total_cases, 3);
        assert_eq!(run.passed, 0);

        shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(1), task).await.unwrap().unwrap();
    }
}
