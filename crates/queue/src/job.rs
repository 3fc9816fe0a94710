//! Job model for the ingestion work queue.
//!
//! A job is one unit of ingestion work. Rows are never deleted; a finished
//! job stays in its terminal state for audit.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Job type ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    ImportRegistry,
    IngestSource,
    IngestEndpoint,
    IngestProduct,
    Backfill,
    Refresh,
}

impl JobType {
    pub const ALL: [JobType; 6] = [
        JobType::ImportRegistry,
        JobType::IngestSource,
        JobType::IngestEndpoint,
        JobType::IngestProduct,
        JobType::Backfill,
        JobType::Refresh,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobType::ImportRegistry => "import_registry",
            JobType::IngestSource => "ingest_source",
            JobType::IngestEndpoint => "ingest_endpoint",
            JobType::IngestProduct => "ingest_product",
            JobType::Backfill => "backfill",
            JobType::Refresh => "refresh",
        }
    }
}

impl fmt::Display for JobType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        JobType::ALL
            .into_iter()
            .find(|t| t.as_str() == normalized)
            .ok_or_else(|| format!("unknown job type '{}'", s))
    }
}

// ── Job state ────────────────────────────────────────────────────────

/// Lifecycle state of a job.
///
/// `Completed`, `Failed` and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Pending,
    Running,
    Paused,
    Completed,
    Failed,
    Cancelled,
}

impl JobState {
    pub const ALL: [JobState; 6] = [
        JobState::Pending,
        JobState::Running,
        JobState::Paused,
        JobState::Completed,
        JobState::Failed,
        JobState::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::Running => "running",
            JobState::Paused => "paused",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
            JobState::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed | JobState::Cancelled)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        JobState::ALL
            .into_iter()
            .find(|st| st.as_str() == normalized)
            .ok_or_else(|| format!("unknown job state '{}'", s))
    }
}

// ── References and progress ──────────────────────────────────────────

/// Optional links from a job to the registry entity it works on.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobRefs {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_id: Option<String>,
}

impl JobRefs {
    pub fn source(id: impl Into<String>) -> Self {
        Self {
            source_id: Some(id.into()),
            ..Default::default()
        }
    }
}

/// Resumable checkpoint. Written by the handler, opaque to the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default)]
    pub processed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Arbitrary resume position (page token, offset, last id, ...).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cursor: Option<serde_json::Value>,
}

impl JobProgress {
    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(100.0),
            Some(total) => Some((self.processed as f64 / total as f64 * 100.0).min(100.0)),
            None => None,
        }
    }
}

// ── Job ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub job_type: JobType,
    #[serde(flatten)]
    pub refs: JobRefs,
    pub state: JobState,
    /// Higher runs first.
    pub priority: i32,
    pub attempt_count: i32,
    pub max_attempts: i32,
    pub progress: JobProgress,
    pub last_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
    /// Bumped on every write; used for compare-and-swap.
    pub version: i64,
}

impl Job {
    pub fn has_attempts_left(&self) -> bool {
        self.attempt_count < self.max_attempts
    }
}

/// Parameters for [`crate::WorkQueue::enqueue`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewJob {
    pub job_type: JobType,
    #[serde(default, flatten)]
    pub refs: JobRefs,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub max_attempts: Option<i32>,
}

impl NewJob {
    pub fn new(job_type: JobType) -> Self {
        Self {
            job_type,
            refs: JobRefs::default(),
            priority: None,
            max_attempts: None,
        }
    }

    pub fn refs(mut self, refs: JobRefs) -> Self {
        self.refs = refs;
        self
    }

    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }
}

/// Count of jobs per state. Every state is present, zero when empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub by_state: BTreeMap<String, u64>,
    pub total: u64,
}

impl QueueStats {
    pub fn from_counts(counts: impl IntoIterator<Item = (JobState, u64)>) -> Self {
        let mut by_state: BTreeMap<String, u64> =
            JobState::ALL.iter().map(|s| (s.as_str().to_string(), 0)).collect();
        let mut total = 0;
        for (state, n) in counts {
            *by_state.entry(state.as_str().to_string()).or_default() += n;
            total += n;
        }
        Self { by_state, total }
    }

    pub fn count(&self, state: JobState) -> u64 {
        self.by_state.get(state.as_str()).copied().unwrap_or(0)
    }
}

/// Selection criteria for listing jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobFilter {
    #[serde(default)]
    pub state: Option<JobState>,
    #[serde(default)]
    pub job_type: Option<JobType>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl JobFilter {
    pub fn state(state: JobState) -> Self {
        Self {
            state: Some(state),
            ..Default::default()
        }
    }

    pub fn matches(&self, job: &Job) -> bool {
        self.state.map_or(true, |s| job.state == s)
            && self.job_type.map_or(true, |t| job.job_type == t)
            && self
                .source_id
                .as_deref()
                .map_or(true, |s| job.refs.source_id.as_deref() == Some(s))
    }
}

// ── Tests ────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_state_serde() {
        for state in JobState::ALL {
            let json = serde_json::to_string(&state).unwrap();
            assert_eq!(json, format!("\"{}\"", state.as_str()));
            let parsed: JobState = serde_json::from_str(&json).unwrap();
            assert_eq!(parsed, state);
        }
    }

    #[test]
    fn test_job_type_parse_accepts_kebab() {
        assert_eq!("ingest-source".parse::<JobType>().unwrap(), JobType::IngestSource);
        assert_eq!("BACKFILL".parse::<JobType>().unwrap(), JobType::Backfill);
        assert!("scrape".parse::<JobType>().is_err());
    }

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = JobState::ALL.into_iter().filter(|s| s.is_terminal()).collect();
        assert_eq!(
            terminal,
            vec![JobState::Completed, JobState::Failed, JobState::Cancelled]
        );
    }

    #[test]
    fn test_progress_percent() {
        let mut p = JobProgress::default();
        assert_eq!(p.percent(), None);
        p.total = Some(8);
        p.processed = 2;
        assert_eq!(p.percent(), Some(25.0));
        p.total = Some(0);
        assert_eq!(p.percent(), Some(100.0));
    }

    #[test]
    fn test_stats_include_every_state() {
        let stats = QueueStats::from_counts([(JobState::Pending, 2), (JobState::Failed, 1)]);
        assert_eq!(stats.by_state.len(), 6);
        assert_eq!(stats.count(JobState::Pending), 2);
        assert_eq!(stats.count(JobState::Paused), 0);
        assert_eq!(stats.total, 3);
    }

    #[test]
    fn test_new_job_deserializes_flat_refs() {
        let new: NewJob =
            serde_json::from_str(r#"{"job_type":"ingest_source","source_id":"src-1","priority":5}"#)
                .unwrap();
        assert_eq!(new.refs.source_id.as_deref(), Some("src-1"));
        assert_eq!(new.priority, Some(5));
        assert_eq!(new.max_attempts, None);
    }
}
