use std::env;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Load .env file (silently ignores if missing).
pub fn load_dotenv() {
    dotenvy::dotenv().ok();
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// Read a profiled env var: tries {PROFILE}_{KEY} first, falls back to {KEY}.
fn profiled_env_opt(profile: &str, key: &str) -> Option<String> {
    if !profile.is_empty() {
        let prefixed = format!("{}_{}", profile, key);
        if let Some(v) = env_opt(&prefixed) {
            return Some(v);
        }
    }
    env_opt(key)
}

fn profiled_env_or(profile: &str, key: &str, default: &str) -> String {
    profiled_env_opt(profile, key).unwrap_or_else(|| default.to_string())
}

fn profiled_env_parse<T: std::str::FromStr>(profile: &str, key: &str, default: T) -> T {
    profiled_env_opt(profile, key)
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

// ── Top-level config ──────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Active profile name (empty = default).
    pub profile: String,
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub postgres: PostgresConfig,
    pub llm: LlmConfig,
    pub ollama: OllamaConfig,
    pub queue: QueueConfig,
    pub tribunal: TribunalConfig,
    pub reliability: ReliabilityConfig,
    pub release_gate: ReleaseGateConfig,
}

impl Config {
    /// Build config from environment variables (call `load_dotenv()` first).
    /// Profile is read from `EVGATE_PROFILE`. When set (e.g. `PROD`), every
    /// key is first looked up as `{PROFILE}_{KEY}`, falling back to `{KEY}`.
    pub fn from_env() -> Self {
        let profile = env_or("EVGATE_PROFILE", "").to_uppercase();
        Self::for_profile(&profile)
    }

    /// Build config for a specific named profile (empty string = default).
    pub fn for_profile(profile: &str) -> Self {
        let p = profile.to_uppercase();
        let p = p.as_str();
        Self {
            profile: p.to_string(),
            server: ServerConfig::from_env_profiled(p),
            storage: StorageConfig::from_env_profiled(p),
            postgres: PostgresConfig::from_env_profiled(p),
            llm: LlmConfig::from_env_profiled(p),
            ollama: OllamaConfig::from_env_profiled(p),
            queue: QueueConfig::from_env_profiled(p),
            tribunal: TribunalConfig::from_env_profiled(p),
            reliability: ReliabilityConfig::from_env_profiled(p),
            release_gate: ReleaseGateConfig::from_env_profiled(p),
        }
    }

    pub fn profile_label(&self) -> &str {
        if self.profile.is_empty() { "default" } else { &self.profile }
    }

    /// Print a redacted summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Config loaded (profile: {}):", self.profile_label());
        tracing::info!("  server:      {}:{}", self.server.host, self.server.port);
        tracing::info!("  storage:     data_dir={}", self.storage.data_dir.display());
        tracing::info!(
            "  postgres:    host={}, db={}, configured={}",
            self.postgres.host,
            self.postgres.database,
            self.postgres.is_configured()
        );
        tracing::info!("  llm:         provider={}", self.llm.provider);
        tracing::info!(
            "  queue:       stale_after={}s, maintenance_every={}s, max_attempts={}",
            self.queue.stale_after_secs,
            self.queue.maintenance_interval_secs,
            self.queue.default_max_attempts
        );
        tracing::info!(
            "  tribunal:    pass>={}, warn>={}, tolerance={}%",
            self.tribunal.pass_threshold,
            self.tribunal.warn_threshold,
            self.tribunal.contradiction_tolerance_pct
        );
        tracing::info!(
            "  reliability: threshold={}, freshness={}h",
            self.reliability.score_threshold,
            self.reliability.freshness_hours
        );
    }

    /// Return a redacted view safe for API responses (no secrets).
    pub fn redacted_summary(&self) -> serde_json::Value {
        serde_json::json!({
            "profile": self.profile_label(),
            "server": { "host": self.server.host, "port": self.server.port },
            "storage": { "data_dir": self.storage.data_dir },
            "postgres": {
                "host": self.postgres.host,
                "port": self.postgres.port,
                "database": self.postgres.database,
                "configured": self.postgres.is_configured(),
            },
            "llm": {
                "provider": self.llm.provider,
                "configured": self.llm.is_configured(),
            },
            "ollama": { "url": self.ollama.url, "model": self.ollama.model },
            "queue": self.queue,
            "tribunal": self.tribunal,
            "reliability": self.reliability,
            "release_gate": self.release_gate,
        })
    }
}

// ── Server ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_origin: String,
}

impl ServerConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "HOST", "0.0.0.0"),
            port: profiled_env_parse(p, "PORT", 3001),
            cors_origin: profiled_env_or(p, "CORS_ORIGIN", "*"),
        }
    }
}

// ── Storage ───────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    /// Optional YAML registry snapshot used when Postgres is not configured.
    pub registry_file: Option<PathBuf>,
}

impl StorageConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            data_dir: PathBuf::from(profiled_env_or(p, "DATA_DIR", "data")),
            registry_file: profiled_env_opt(p, "REGISTRY_FILE").map(PathBuf::from),
        }
    }

    /// Append-only JSONL file holding tribunal verdicts.
    pub fn verdict_log_path(&self) -> PathBuf {
        self.data_dir.join("verdicts.jsonl")
    }

    /// Append-only JSONL file holding gap tickets and their resolutions.
    pub fn gap_tickets_path(&self) -> PathBuf {
        self.data_dir.join("gap_tickets.jsonl")
    }

    pub fn publications_path(&self) -> PathBuf {
        self.data_dir.join("publications.jsonl")
    }

    /// Append-only JSONL file holding reliability runs.
    pub fn reliability_runs_path(&self) -> PathBuf {
        self.data_dir.join("reliability_runs.jsonl")
    }
}

// ── PostgreSQL ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PostgresConfig {
    pub host: String,
    pub port: u16,
    pub database: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub ssl_mode: String,
    pub max_connections: u32,
}

impl PostgresConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            host: profiled_env_or(p, "PG_HOST", "localhost"),
            port: profiled_env_parse(p, "PG_PORT", 5432),
            database: profiled_env_or(p, "PG_DATABASE", "evgate"),
            username: profiled_env_opt(p, "PG_USERNAME"),
            password: profiled_env_opt(p, "PG_PASSWORD"),
            ssl_mode: profiled_env_or(p, "PG_SSL_MODE", "prefer"),
            max_connections: profiled_env_parse(p, "PG_MAX_CONNECTIONS", 10),
        }
    }

    pub fn connection_string(&self) -> String {
        let user = self.username.as_deref().unwrap_or("postgres");
        let pass = self.password.as_deref().unwrap_or("");
        format!(
            "postgres://{}:{}@{}:{}/{}?sslmode={}",
            user, pass, self.host, self.port, self.database, self.ssl_mode
        )
    }

    pub fn is_configured(&self) -> bool {
        self.username.is_some()
    }
}

// ── LLM (OpenAI / Anthropic) ─────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// "openai", "anthropic", "ollama", or "none" for deterministic stages only.
    pub provider: String,
    pub openai_api_key: Option<String>,
    pub openai_model: String,
    pub openai_base_url: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub anthropic_model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl LlmConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            provider: profiled_env_or(p, "LLM_PROVIDER", "none"),
            openai_api_key: profiled_env_opt(p, "OPENAI_API_KEY"),
            openai_model: profiled_env_or(p, "OPENAI_MODEL", "gpt-4o"),
            openai_base_url: profiled_env_opt(p, "OPENAI_BASE_URL"),
            anthropic_api_key: profiled_env_opt(p, "ANTHROPIC_API_KEY"),
            anthropic_model: profiled_env_or(p, "ANTHROPIC_MODEL", "claude-sonnet-4-5-20250929"),
            temperature: profiled_env_parse(p, "LLM_TEMPERATURE", 0.1),
            max_tokens: profiled_env_parse(p, "LLM_MAX_TOKENS", 2048),
        }
    }

    pub fn is_configured(&self) -> bool {
        match self.provider.as_str() {
            "openai" => self.openai_api_key.is_some(),
            "anthropic" | "claude" => self.anthropic_api_key.is_some(),
            "ollama" => true,
            _ => false,
        }
    }
}

// ── Ollama (local models) ─────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OllamaConfig {
    pub url: String,
    pub model: String,
}

impl OllamaConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            url: profiled_env_or(p, "OLLAMA_URL", "http://localhost:11434"),
            model: profiled_env_or(p, "OLLAMA_MODEL", "llama3.2"),
        }
    }
}

// ── Work queue ────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// RUNNING jobs older than this are considered stuck.
    pub stale_after_secs: u64,
    pub maintenance_interval_secs: u64,
    pub default_max_attempts: i32,
    pub worker_count: usize,
    pub worker_poll_ms: u64,
}

impl QueueConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            stale_after_secs: profiled_env_parse(p, "QUEUE_STALE_AFTER_SECS", 3600),
            maintenance_interval_secs: profiled_env_parse(p, "QUEUE_MAINTENANCE_INTERVAL_SECS", 300),
            default_max_attempts: profiled_env_parse(p, "QUEUE_MAX_ATTEMPTS", 3),
            worker_count: profiled_env_parse(p, "QUEUE_WORKERS", 2),
            worker_poll_ms: profiled_env_parse(p, "QUEUE_POLL_MS", 1000),
        }
    }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: 3600,
            maintenance_interval_secs: 300,
            default_max_attempts: 3,
            worker_count: 2,
            worker_poll_ms: 1000,
        }
    }
}

// ── Tribunal ──────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TribunalConfig {
    /// Coverage (0-100) at or above which a claim passes outright.
    pub pass_threshold: f64,
    /// Coverage at or above which a claim passes with a warning.
    pub warn_threshold: f64,
    /// Relative disagreement (percent) between two admissible values that
    /// makes a claim contested.
    pub contradiction_tolerance_pct: f64,
    /// Share of a sentence's key terms that must appear in one excerpt for
    /// the sentence to count as cited without an explicit marker.
    pub term_overlap_ratio: f64,
    /// Use LLM-backed analyst/skeptic/methodologist stages when an LLM is configured.
    pub use_llm_stages: bool,
    pub knowledge_base_file: Option<PathBuf>,
}

impl TribunalConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            pass_threshold: profiled_env_parse(p, "TRIBUNAL_PASS_THRESHOLD", 95.0),
            warn_threshold: profiled_env_parse(p, "TRIBUNAL_WARN_THRESHOLD", 85.0),
            contradiction_tolerance_pct: profiled_env_parse(p, "TRIBUNAL_CONTRADICTION_TOLERANCE_PCT", 10.0),
            term_overlap_ratio: profiled_env_parse(p, "TRIBUNAL_TERM_OVERLAP_RATIO", 0.5),
            use_llm_stages: profiled_env_or(p, "TRIBUNAL_USE_LLM", "false") == "true",
            knowledge_base_file: profiled_env_opt(p, "KNOWLEDGE_BASE_FILE").map(PathBuf::from),
        }
    }
}

impl Default for TribunalConfig {
    fn default() -> Self {
        Self {
            pass_threshold: 95.0,
            warn_threshold: 85.0,
            contradiction_tolerance_pct: 10.0,
            term_overlap_ratio: 0.5,
            use_llm_stages: false,
            knowledge_base_file: None,
        }
    }
}

// ── Reliability harness ───────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReliabilityConfig {
    pub score_threshold: f64,
    /// The latest completed run must be younger than this for deploys.
    pub freshness_hours: i64,
    /// Minimum per-case citation coverage for a case to pass.
    pub case_min_coverage: f64,
    pub run_interval_hours: u64,
    pub corpus_file: Option<PathBuf>,
}

impl ReliabilityConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            score_threshold: profiled_env_parse(p, "RELIABILITY_SCORE_THRESHOLD", 85.0),
            freshness_hours: profiled_env_parse(p, "RELIABILITY_FRESHNESS_HOURS", 24),
            case_min_coverage: profiled_env_parse(p, "RELIABILITY_CASE_MIN_COVERAGE", 85.0),
            run_interval_hours: profiled_env_parse(p, "RELIABILITY_RUN_INTERVAL_HOURS", 24),
            corpus_file: profiled_env_opt(p, "RELIABILITY_CORPUS_FILE").map(PathBuf::from),
        }
    }
}

impl Default for ReliabilityConfig {
    fn default() -> Self {
        Self {
            score_threshold: 85.0,
            freshness_hours: 24,
            case_min_coverage: 85.0,
            run_interval_hours: 24,
            corpus_file: None,
        }
    }
}

// ── Release gate ──────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseGateConfig {
    pub min_sources: usize,
    pub min_active_sources: usize,
    /// Maximum share (0-1) of sources whose tier is UNKNOWN.
    pub max_unknown_tier_ratio: f64,
    /// Minimum share (0-1) of sources whose status is ACTIVE.
    pub min_active_ratio: f64,
    /// YAML manifest of figures published outside the evidence gate.
    pub published_manifest_file: Option<PathBuf>,
}

impl ReleaseGateConfig {
    fn from_env_profiled(p: &str) -> Self {
        Self {
            min_sources: profiled_env_parse(p, "RELEASE_MIN_SOURCES", 50),
            min_active_sources: profiled_env_parse(p, "RELEASE_MIN_ACTIVE_SOURCES", 20),
            max_unknown_tier_ratio: profiled_env_parse(p, "RELEASE_MAX_UNKNOWN_TIER_RATIO", 0.2),
            min_active_ratio: profiled_env_parse(p, "RELEASE_MIN_ACTIVE_RATIO", 0.3),
            published_manifest_file: profiled_env_opt(p, "RELEASE_PUBLISHED_MANIFEST").map(PathBuf::from),
        }
    }
}

impl Default for ReleaseGateConfig {
    fn default() -> Self {
        Self {
            min_sources: 50,
            min_active_sources: 20,
            max_unknown_tier_ratio: 0.2,
            min_active_ratio: 0.3,
            published_manifest_file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profiled_lookup_prefers_prefixed_key() {
        env::set_var("EVGT_QUEUE_MAX_ATTEMPTS", "7");
        env::set_var("QUEUE_MAX_ATTEMPTS", "4");
        let cfg = Config::for_profile("evgt");
        assert_eq!(cfg.profile, "EVGT");
        assert_eq!(cfg.queue.default_max_attempts, 7);
        env::remove_var("EVGT_QUEUE_MAX_ATTEMPTS");
        env::remove_var("QUEUE_MAX_ATTEMPTS");
    }

    #[test]
    fn unparsable_values_fall_back_to_default() {
        env::set_var("CFGTEST_TRIBUNAL_PASS_THRESHOLD", "not-a-number");
        let cfg = Config::for_profile("cfgtest");
        assert_eq!(cfg.tribunal.pass_threshold, 95.0);
        env::remove_var("CFGTEST_TRIBUNAL_PASS_THRESHOLD");
    }

    #[test]
    fn postgres_needs_username_to_be_configured() {
        let mut pg = PostgresConfig::from_env_profiled("PGTEST_UNSET");
        pg.username = None;
        assert!(!pg.is_configured());
        pg.username = Some("evgate".into());
        assert!(pg.is_configured());
        assert!(pg.connection_string().starts_with("postgres://evgate:@"));
    }

    #[test]
    fn redacted_summary_has_no_secrets() {
        let mut cfg = Config::for_profile("REDACT");
        cfg.llm.openai_api_key = Some("sk-secret".into());
        let summary = cfg.redacted_summary().to_string();
        assert!(!summary.contains("sk-secret"));
        assert_eq!(cfg.profile_label(), "REDACT");
    }
}
