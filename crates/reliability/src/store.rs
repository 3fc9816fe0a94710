//! Retained reliability runs.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use tracing::warn;

use crate::error::ReliabilityError;
use crate::harness::ReliabilityRun;

pub trait RunStore: Send + Sync {
    fn save(&self, run: &ReliabilityRun) -> Result<(), ReliabilityError>;

    /// Up to `limit` runs, most recently completed first.
    fn list(&self, limit: usize) -> Result<Vec<ReliabilityRun>, ReliabilityError>;

    fn latest(&self) -> Result<Option<ReliabilityRun>, ReliabilityError> {
        Ok(self.list(1)?.into_iter().next())
    }
}

fn newest_first(runs: &mut Vec<ReliabilityRun>, limit: usize) {
    runs.sort_by(|a, b| b.completed_at.cmp(&a.completed_at));
    runs.truncate(limit);
}

fn poisoned() -> ReliabilityError {
    ReliabilityError::Store("run store lock poisoned".into())
}

#[derive(Default)]
pub struct MemoryRunStore {
    runs: RwLock<Vec<ReliabilityRun>>,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunStore for MemoryRunStore {
    fn save(&self, run: &ReliabilityRun) -> Result<(), ReliabilityError> {
        self.runs.write().map_err(|_| poisoned())?.push(run.clone());
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<ReliabilityRun>, ReliabilityError> {
        let mut runs = self.runs.read().map_err(|_| poisoned())?.clone();
        newest_first(&mut runs, limit);
        Ok(runs)
    }
}

/// One run per line, appended.
pub struct JsonlRunStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonlRunStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, ReliabilityError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RunStore for JsonlRunStore {
    fn save(&self, run: &ReliabilityRun) -> Result<(), ReliabilityError> {
        let mut line = serde_json::to_string(run)?;
        line.push('\n');
        let _guard = self.write_lock.lock().map_err(|_| poisoned())?;
        let mut file = OpenOptions::new().create(true).append(true).open(&self.path)?;
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    fn list(&self, limit: usize) -> Result<Vec<ReliabilityRun>, ReliabilityError> {
        let file = match std::fs::File::open(&self.path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut runs = Vec::new();
        for (n, line) in BufReader::new(file).lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<ReliabilityRun>(&line) {
                Ok(r) => runs.push(r),
                Err(e) => warn!(path = %self.path.display(), line = n + 1, error = %e, "skipping unreadable reliability run"),
            }
        }
        newest_first(&mut runs, limit);
        Ok(runs)
    }
}
