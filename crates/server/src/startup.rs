//! Server startup: shared state initialization and background task spawning.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use evgate_core::{Config, KnowledgeBase};
use evgate_llm::LlmProvider;
use evgate_queue::{run_maintenance, JobRepository, MemoryJobStore, PgJobStore, Shutdown, WorkQueue, Worker};
use evgate_registry::{MemorySourceStore, PgSourceStore, PolicyEnforcer, SourceRepository};
use evgate_reliability::{run_scheduled, Corpus, JsonlRunStore, LlmResponder, ReliabilityHarness, Responder};
use evgate_tribunal::{EvidenceGate, JsonlPublicationLog, JsonlTicketStore, JsonlVerdictLog, MemoryVerdictLog, Tribunal};

use crate::db;
use crate::ingest::PolicyGatedIngestion;
use crate::state::AppState;

/// Model collaborators shared by the tribunal and the reliability responder.
#[derive(Clone, Default)]
pub struct ModelContext {
    pub provider: Option<Arc<dyn LlmProvider>>,
    pub knowledge: Option<Arc<KnowledgeBase>>,
}

impl ModelContext {
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let provider = match evgate_llm::create_provider(&config.llm, &config.ollama) {
            Ok(Some(p)) => {
                let p: Arc<dyn LlmProvider> = Arc::from(p);
                info!(provider = %p.label(), "LLM provider ready");
                Some(p)
            }
            Ok(None) => {
                info!("no LLM provider configured; tribunal runs deterministic stages only");
                None
            }
            Err(e) => {
                warn!(error = %e, "LLM provider not available; tribunal runs deterministic stages only");
                None
            }
        };

        let knowledge = match &config.tribunal.knowledge_base_file {
            Some(path) => {
                let kb = KnowledgeBase::load(path)
                    .with_context(|| format!("loading knowledge base {}", path.display()))?;
                Some(Arc::new(kb))
            }
            None => None,
        };

        Ok(Self { provider, knowledge })
    }
}

/// Build `AppState` over Postgres when reachable, in-memory stores otherwise.
pub async fn build_app_state(config: Config, models: &ModelContext) -> anyhow::Result<Arc<AppState>> {
    let pool = db::init_pg_pool(&config.postgres).await;
    let durable = pool.is_some();

    let (jobs, sources): (Arc<dyn JobRepository>, Arc<dyn SourceRepository>) = match pool {
        Some(pool) => (Arc::new(PgJobStore::new(pool.clone())), Arc::new(PgSourceStore::new(pool))),
        None => {
            let sources = match &config.storage.registry_file {
                Some(path) => MemorySourceStore::from_yaml_file(path)?,
                None => {
                    warn!("no registry configured; the source registry is empty");
                    MemorySourceStore::default()
                }
            };
            (Arc::new(MemoryJobStore::new()), Arc::new(sources))
        }
    };

    let verdict_log = JsonlVerdictLog::open(config.storage.verdict_log_path())?;
    let tribunal = Tribunal::from_config(
        &config.tribunal,
        &config.llm,
        models.provider.clone(),
        models.knowledge.clone(),
        Arc::new(verdict_log),
    );
    let gate = EvidenceGate::new(Arc::new(tribunal)).with_stores(
        Arc::new(JsonlTicketStore::open(config.storage.gap_tickets_path())?),
        Arc::new(JsonlPublicationLog::open(config.storage.publications_path())?),
    );
    let runs = JsonlRunStore::open(config.storage.reliability_runs_path())?;

    info!(
        durable,
        data_dir = %config.storage.data_dir.display(),
        "application state ready"
    );

    Ok(Arc::new(AppState {
        queue: WorkQueue::from_config(jobs, &config.queue),
        enforcer: PolicyEnforcer::new(sources),
        gate: Arc::new(gate),
        runs: Arc::new(runs),
        durable,
        config,
    }))
}

/// Harness over its own tribunal so corpus runs never touch production
/// verdicts, tickets or publications.
pub fn build_harness(config: &Config, models: &ModelContext, responder: Arc<dyn Responder>) -> ReliabilityHarness {
    let tribunal = Tribunal::from_config(
        &config.tribunal,
        &config.llm,
        models.provider.clone(),
        models.knowledge.clone(),
        Arc::new(MemoryVerdictLog::new()),
    );
    ReliabilityHarness::new(
        Arc::new(EvidenceGate::new(Arc::new(tribunal))),
        responder,
        &config.reliability,
    )
}

/// The model-backed responder, when a provider is configured.
pub fn model_responder(config: &Config, models: &ModelContext) -> Option<Arc<dyn Responder>> {
    let provider = models.provider.clone()?;
    Some(Arc::new(
        LlmResponder::new(provider)
            .with_knowledge(models.knowledge.clone())
            .with_sampling(config.llm.temperature, config.llm.max_tokens),
    ))
}

/// Spawn maintenance, workers and the nightly reliability schedule.
pub fn spawn_background(
    state: &Arc<AppState>,
    models: &ModelContext,
    ingestion: Option<PolicyGatedIngestion>,
    shutdown: Arc<Shutdown>,
) -> Vec<JoinHandle<()>> {
    let config = &state.config;
    let mut handles = Vec::new();

    handles.push(tokio::spawn(run_maintenance(
        state.queue.clone(),
        Duration::from_secs(config.queue.maintenance_interval_secs),
        shutdown.clone(),
    )));

    match ingestion {
        Some(handler) if handler.has_pipes() => {
            let handler = Arc::new(handler);
            for n in 0..config.queue.worker_count.max(1) {
                let worker = Worker::new(format!("worker-{}", n), state.queue.clone())
                    .poll_interval(Duration::from_millis(config.queue.worker_poll_ms))
                    .register(handler.clone());
                let shutdown = shutdown.clone();
                handles.push(tokio::spawn(async move { worker.run(shutdown).await }));
            }
            info!(workers = config.queue.worker_count.max(1), "ingestion workers started");
        }
        _ => info!("no ingestion pipes registered; jobs are queued but not worked"),
    }

    match model_responder(config, models) {
        Some(responder) => match Corpus::load_or_builtin(config.reliability.corpus_file.as_deref()) {
            Ok(corpus) => {
                let harness = Arc::new(build_harness(config, models, responder));
                handles.push(tokio::spawn(run_scheduled(
                    harness,
                    Arc::new(corpus),
                    state.runs.clone(),
                    config.reliability.clone(),
                    shutdown,
                )));
            }
            Err(e) => warn!(error = %e, "reliability corpus unavailable; nightly runs disabled"),
        },
        None => warn!("no LLM provider; nightly reliability runs disabled"),
    }

    handles
}

/// Serve HTTP until ctrl-c, then stop background tasks.
pub async fn serve(state: Arc<AppState>, models: ModelContext, ingestion: Option<PolicyGatedIngestion>) -> anyhow::Result<()> {
    let shutdown = Shutdown::new();
    let background = spawn_background(&state, &models, ingestion, shutdown.clone());

    let addr = format!("{}:{}", state.config.server.host, state.config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {}", addr))?;
    info!(addr = %addr, "listening");

    let app = crate::router::build_router(state);
    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl-c; serving until killed");
                std::future::pending::<()>().await;
            }
            info!("shutdown requested");
            signal.trigger();
        })
        .await?;

    shutdown.trigger();
    futures::future::join_all(background).await;
    info!("server stopped");
    Ok(())
}
