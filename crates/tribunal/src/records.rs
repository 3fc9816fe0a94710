//! Gap tickets and publications written by the evidence gate.
//!
//! Both stores come in two flavours, like the verdict log: a bounded
//! in-memory ring and an append-only JSONL file that survives restarts.
//! A resolved ticket is appended again; on replay the last line for a
//! ticket id wins.

use std::collections::{HashMap, VecDeque};
use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::TribunalError;
use crate::types::Verdict;

const DEFAULT_MAX_ENTRIES: usize = 1000;

// ── Records ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketPriority {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    Open,
    Resolved,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GapTicket {
    pub ticket_id: Uuid,
    pub subject_id: String,
    pub missing_field: String,
    pub suggested_action: String,
    pub verdict_id: Uuid,
    pub verdict: Verdict,
    pub claim_id: String,
    pub priority: TicketPriority,
    pub status: TicketStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedEvidence {
    pub id: String,
    pub source_id: String,
    pub source_org: String,
}

/// A claim that cleared the gate, with the evidence it was cleared on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Publication {
    pub claim_id: String,
    pub subject: String,
    pub verdict_id: Uuid,
    pub verdict: Verdict,
    pub evidence: Vec<PublishedEvidence>,
    pub published_at: DateTime<Utc>,
}

// ── Store traits ─────────────────────────────────────────────────────

pub trait TicketStore: Send + Sync {
    fn insert(&self, ticket: &GapTicket) -> Result<(), TribunalError>;

    /// Every retained ticket, oldest first.
    fn list(&self) -> Result<Vec<GapTicket>, TribunalError>;

    /// Mark a ticket resolved. Returns false for unknown ids.
    fn resolve(&self, ticket_id: Uuid) -> Result<bool, TribunalError>;

    fn open_tickets(&self) -> Result<Vec<GapTicket>, TribunalError> {
        Ok(self
            .list()?
            .into_iter()
            .filter(|t| t.status == TicketStatus::Open)
            .collect())
    }
}

pub trait PublicationStore: Send + Sync {
    fn record(&self, publication: &Publication) -> Result<(), TribunalError>;

    /// Every retained publication, oldest first.
    fn list(&self) -> Result<Vec<Publication>, TribunalError>;
}

fn poisoned(what: &str) -> TribunalError {
    TribunalError::Log(format!("{} lock poisoned", what))
}

// ── In-memory rings ──────────────────────────────────────────────────

/// Bounded FIFO store; the oldest entry is evicted once full.
pub struct MemoryRing<T> {
    entries: RwLock<VecDeque<T>>,
    max_entries: usize,
}

impl<T: Clone> MemoryRing<T> {
    pub fn new() -> Self {
        Self::with_max_entries(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_max_entries(max: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            max_entries: max.max(1),
        }
    }

    fn push(&self, item: T) -> Result<(), TribunalError> {
        let mut guard = self.entries.write().map_err(|_| poisoned("ring"))?;
        guard.push_back(item);
        while guard.len() > self.max_entries {
            guard.pop_front();
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<T>, TribunalError> {
        Ok(self.entries.read().map_err(|_| poisoned("ring"))?.iter().cloned().collect())
    }
}

impl<T: Clone> Default for MemoryRing<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type MemoryTicketStore = MemoryRing<GapTicket>;
pub type MemoryPublicationLog = MemoryRing<Publication>;

impl TicketStore for MemoryRing<GapTicket> {
    fn insert(&self, ticket: &GapTicket) -> Result<(), TribunalError> {
        self.push(ticket.clone())
    }

    fn list(&self) -> Result<Vec<GapTicket>, TribunalError> {
        self.snapshot()
    }

    fn resolve(&self, ticket_id: Uuid) -> Result<bool, TribunalError> {
        let mut guard = self.entries.write().map_err(|_| poisoned("ticket store"))?;
        match guard.iter_mut().find(|t| t.ticket_id == ticket_id) {
            Some(t) => {
                t.status = TicketStatus::Resolved;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

impl PublicationStore for MemoryRing<Publication> {
    fn record(&self, publication: &Publication) -> Result<(), TribunalError> {
        self.push(publication.clone())
    }

    fn list(&self) -> Result<Vec<Publication>, TribunalError> {
        self.snapshot()
    }
}

// ── JSONL files ──────────────────────────────────────────────────────

/// Append-only JSON-lines file with serialized writes.
pub(crate) struct JsonlFile {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlFile {
    pub(crate) fn open(path: impl Into<PathBuf>) -> Result<Self, TribunalError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn append<T: Serialize>(&self, record: &T) -> Result<(), TribunalError> {
        let mut line = serde_json::to_string(record)?;
        line.push('\n');
        let _guard = self.write_lock.lock().map_err(|_| poisoned("jsonl writer"))?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Every readable record in file order. Unreadable lines are skipped.
    pub(crate) fn read_all<T: DeserializeOwned>(&self) -> Result<Vec<T>, TribunalError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut records = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<T>(&line) {
                Ok(r) => records.push(r),
                Err(e) => warn!(path = %self.path.display(), line = n + 1, error = %e, "skipping unreadable record"),
            }
        }
        Ok(records)
    }
}

pub struct JsonlTicketStore {
    file: JsonlFile,
}

impl JsonlTicketStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TribunalError> {
        Ok(Self {
            file: JsonlFile::open(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl TicketStore for JsonlTicketStore {
    fn insert(&self, ticket: &GapTicket) -> Result<(), TribunalError> {
        self.file.append(ticket)
    }

    fn list(&self) -> Result<Vec<GapTicket>, TribunalError> {
        let mut order: Vec<Uuid> = Vec::new();
        let mut latest: HashMap<Uuid, GapTicket> = HashMap::new();
        for ticket in self.file.read_all::<GapTicket>()? {
            if !latest.contains_key(&ticket.ticket_id) {
                order.push(ticket.ticket_id);
            }
            latest.insert(ticket.ticket_id, ticket);
        }
        Ok(order.into_iter().filter_map(|id| latest.remove(&id)).collect())
    }

    fn resolve(&self, ticket_id: Uuid) -> Result<bool, TribunalError> {
        let Some(mut ticket) = self.list()?.into_iter().find(|t| t.ticket_id == ticket_id) else {
            return Ok(false);
        };
        if ticket.status != TicketStatus::Resolved {
            ticket.status = TicketStatus::Resolved;
            self.file.append(&ticket)?;
        }
        Ok(true)
    }
}

pub struct JsonlPublicationLog {
    file: JsonlFile,
}

impl JsonlPublicationLog {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, TribunalError> {
        Ok(Self {
            file: JsonlFile::open(path)?,
        })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

impl PublicationStore for JsonlPublicationLog {
    fn record(&self, publication: &Publication) -> Result<(), TribunalError> {
        self.file.append(publication)
    }

    fn list(&self) -> Result<Vec<Publication>, TribunalError> {
        self.file.read_all()
    }
}
