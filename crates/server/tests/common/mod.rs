#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::Request;
use serde_json::Value;

use evgate_core::config::{QueueConfig, ReleaseGateConfig, ReliabilityConfig, TribunalConfig};
use evgate_core::Config;
use evgate_queue::{MemoryJobStore, WorkQueue};
use evgate_registry::{MemorySourceStore, PolicyEnforcer, Source};
use evgate_reliability::MemoryRunStore;
use evgate_server::AppState;
use evgate_tribunal::{EvidenceGate, MemoryVerdictLog, Tribunal};

/// Environment-independent config rooted at `data_dir`.
pub fn test_config(data_dir: &Path) -> Config {
    let mut config = Config::for_profile("EVGATE_IT");
    config.postgres.username = None;
    config.llm.provider = "none".into();
    config.storage.data_dir = data_dir.to_path_buf();
    config.storage.registry_file = None;
    config.server.cors_origin = "*".into();
    config.queue = QueueConfig::default();
    config.tribunal = TribunalConfig::default();
    config.reliability = ReliabilityConfig::default();
    config.release_gate = ReleaseGateConfig::default();
    config
}

pub fn source(id: &str, tags: &[&str]) -> Source {
    Source {
        source_id: id.to_string(),
        name: Some(format!("{} source", id)),
        status: "ACTIVE".into(),
        tier: "T1".into(),
        access_type: "API".into(),
        update_frequency: "DAILY".into(),
        allowed_use: tags.iter().map(|t| t.to_string()).collect(),
        endpoint_count: 1,
        needs_partnership: false,
        partnership_contact: None,
    }
}

/// In-memory state with a fresh tribunal and no retained runs.
pub fn memory_state(data_dir: &Path, sources: Vec<Source>) -> Arc<AppState> {
    let config = test_config(data_dir);
    let tribunal = Tribunal::new(&config.tribunal, Arc::new(MemoryVerdictLog::new()));
    Arc::new(AppState {
        queue: WorkQueue::from_config(Arc::new(MemoryJobStore::new()), &config.queue),
        enforcer: PolicyEnforcer::new(Arc::new(MemorySourceStore::new(sources))),
        gate: Arc::new(EvidenceGate::new(Arc::new(tribunal))),
        runs: Arc::new(MemoryRunStore::new()),
        durable: false,
        config,
    })
}

/// `cited` sentences carrying `[E1]`, then `uncited` sentences with no marker
/// and no overlap with the evidence excerpt.
pub fn narrative(cited: usize, uncited: usize) -> String {
    let mut text = String::new();
    for i in 0..cited {
        text.push_str(&format!("Imports fell in quarter {} [E1]. ", i + 1));
    }
    for i in 0..uncited {
        text.push_str(&format!("Speculative aside {}. ", i + 1));
    }
    text
}

pub fn request(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub async fn body_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
