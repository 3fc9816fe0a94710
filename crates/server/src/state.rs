use std::sync::Arc;

use evgate_core::Config;
use evgate_queue::WorkQueue;
use evgate_registry::PolicyEnforcer;
use evgate_reliability::RunStore;
use evgate_tribunal::EvidenceGate;

/// Shared handles for handlers, CLI commands and background tasks.
pub struct AppState {
    pub config: Config,
    pub queue: WorkQueue,
    pub enforcer: PolicyEnforcer,
    pub gate: Arc<EvidenceGate>,
    pub runs: Arc<dyn RunStore>,
    /// `true` when jobs and sources live in Postgres.
    pub durable: bool,
}
