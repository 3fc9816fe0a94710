//! Append-only verdict audit log.
//!
//! Records are written once and never rewritten. The in-memory log keeps the
//! most recent entries with FIFO eviction; the JSONL log keeps everything.

use std::collections::{BTreeMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::TribunalError;
use crate::records::JsonlFile;
use crate::types::{Claim, EvidenceItem, TribunalVerdict, Verdict};

/// A verdict together with the inputs it was reached on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerdictRecord {
    pub verdict: TribunalVerdict,
    pub claim: Claim,
    pub evidence: Vec<EvidenceItem>,
}

pub trait VerdictLog: Send + Sync {
    fn append(&self, record: &VerdictRecord) -> Result<(), TribunalError>;

    /// Up to `limit` records, newest first.
    fn recent(&self, limit: usize) -> Result<Vec<VerdictRecord>, TribunalError>;
}

// ── In-memory ring ───────────────────────────────────────────────────

pub struct MemoryVerdictLog {
    entries: RwLock<VecDeque<VerdictRecord>>,
    max_entries: usize,
}

impl MemoryVerdictLog {
    pub fn new() -> Self {
        Self::with_max_entries(1000)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max.max(1),
        }
    }
}

impl Default for MemoryVerdictLog {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> TribunalError {
    TribunalError::Log("verdict log lock poisoned".into())
}

impl VerdictLog for MemoryVerdictLog {
    fn append(&self, record: &VerdictRecord) -> Result<(), TribunalError> {
        let mut guard = self.entries.write().map_err(|_| poisoned())?;
        guard.push_back(record.clone());
        while guard.len() > self.max_entries {
            guard.pop_front();
        }
        Ok(())
    }

    fn recent(&self, limit: usize) -> Result<Vec<VerdictRecord>, TribunalError> {
        let guard = self.entries.read().map_err(|_| poisoned())?;
        Ok(guard.iter().rev().take(limit).cloned().collect())
    }
}

// ── JSONL file ───────────────────────────────────────────────────────

pub struct JsonlVerdictLog {
    file: JsonlFile,
}

impl JsonlVerdictLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TribunalError> {
        Ok(Self {
            file: JsonlFile::open(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl VerdictLog for JsonlVerdictLog {
    fn append(&self, record: &VerdictRecord) -> Result<(), TribunalError> {
        self.file.append(record)
    }

    fn recent(&self, limit: usize) -> Result<Vec<VerdictRecord>, TribunalError> {
        let mut records = self.file.read_all::<VerdictRecord>()?;
        records.reverse();
        records.truncate(limit);
        Ok(records)
    }
}

// ── Statistics ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecentVerdict {
    pub claim_id: String,
    pub verdict: Verdict,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TribunalStats {
    pub total_runs: usize,
    /// 0-100; PASS counts fully, PASS_WARN half.
    pub pass_rate: f64,
    pub avg_citation_coverage: f64,
    pub by_verdict: BTreeMap<Verdict, usize>,
    pub recent: Vec<RecentVerdict>,
}

impl TribunalStats {
    /// `records` newest first, as returned by [`VerdictLog::recent`].
    pub fn from_records(records: &[VerdictRecord], recent_limit: usize) -> Self {
        let total = records.len();
        let mut by_verdict = BTreeMap::new();
        let mut weight = 0.0;
        let mut coverage = 0.0;
        for r in records {
            *by_verdict.entry(r.verdict.verdict).or_default() += 1;
            weight += r.verdict.verdict.pass_weight();
            coverage += r.verdict.citation_coverage;
        }
        let mean = |sum: f64| if total == 0 { 0.0 } else { sum / total as f64 };
        Self {
            total_runs: total,
            pass_rate: mean(weight) * 100.0,
            avg_citation_coverage: mean(coverage),
            by_verdict,
            recent: records
                .iter()
                .take(recent_limit)
                .map(|r| RecentVerdict {
                    claim_id: r.verdict.claim_id.clone(),
                    verdict: r.verdict.verdict,
                    created_at: r.verdict.created_at,
                })
                .collect(),
        }
    }
}
