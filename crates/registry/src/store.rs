//! Read access to the source registry.

use std::path::Path;
use std::sync::RwLock;

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::RegistryError;
use crate::source::Source;

#[async_trait]
pub trait SourceRepository: Send + Sync {
    async fn get(&self, source_id: &str) -> Result<Option<Source>, RegistryError>;

    /// Every entry, in registry order, whatever its status.
    async fn list(&self) -> Result<Vec<Source>, RegistryError>;

    /// Columns present in the backing schema, for the release gate.
    async fn schema_columns(&self) -> Result<Vec<String>, RegistryError>;
}

/// Columns every registry backend must expose.
pub const REQUIRED_COLUMNS: &[&str] = &[
    "source_id",
    "name",
    "status",
    "tier",
    "access_type",
    "update_frequency",
    "allowed_use",
    "needs_partnership",
    "partnership_contact",
];

/// In-memory registry, optionally loaded from a YAML snapshot.
#[derive(Debug, Default)]
pub struct MemorySourceStore {
    sources: RwLock<Vec<Source>>,
}

#[derive(Deserialize)]
struct RegistryFile {
    sources: Vec<Source>,
}

impl MemorySourceStore {
    pub fn new(sources: Vec<Source>) -> Self {
        Self {
            sources: RwLock::new(sources),
        }
    }

    /// Load `sources:` from a YAML file.
    pub fn from_yaml_file(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::File(format!("{}: {}", path.display(), e)))?;
        let file: RegistryFile = serde_yaml::from_str(&raw)
            .map_err(|e| RegistryError::File(format!("{}: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), sources = file.sources.len(), "registry snapshot loaded");
        Ok(Self::new(file.sources))
    }

    /// Insert or replace by `source_id`.
    pub fn upsert(&self, source: Source) -> Result<(), RegistryError> {
        let mut sources = self
            .sources
            .write()
            .map_err(|_| RegistryError::File("registry lock poisoned".into()))?;
        match sources.iter_mut().find(|s| s.source_id == source.source_id) {
            Some(existing) => *existing = source,
            None => sources.push(source),
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<Vec<Source>, RegistryError> {
        self.sources
            .read()
            .map(|s| s.clone())
            .map_err(|_| RegistryError::File("registry lock poisoned".into()))
    }
}

#[async_trait]
impl SourceRepository for MemorySourceStore {
    async fn get(&self, source_id: &str) -> Result<Option<Source>, RegistryError> {
        Ok(self.snapshot()?.into_iter().find(|s| s.source_id == source_id))
    }

    async fn list(&self) -> Result<Vec<Source>, RegistryError> {
        self.snapshot()
    }

    async fn schema_columns(&self) -> Result<Vec<String>, RegistryError> {
        Ok(REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::source;

    #[tokio::test]
    async fn upsert_replaces_by_id() {
        let store = MemorySourceStore::new(vec![source("a", &[])]);
        let mut updated = source("a", &["forecast"]);
        updated.tier = "T0".into();
        store.upsert(updated).unwrap();
        store.upsert(source("b", &[])).unwrap();
        let all = store.list().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(store.get("a").await.unwrap().unwrap().tier, "T0");
        assert!(store.get("zzz").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn loads_yaml_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("registry.yaml");
        std::fs::write(
            &path,
            r#"
sources:
  - source_id: cby-aden
    name: Central Bank of Yemen (Aden)
    status: ACTIVE
    tier: T0
    access_type: PDF
    update_frequency: MONTHLY
    allowed_use: [DOC_PDF, DATA_NUMERIC]
    endpoint_count: 2
"#,
        )
        .unwrap();
        let store = MemorySourceStore::from_yaml_file(&path).unwrap();
        let s = store.get("cby-aden").await.unwrap().unwrap();
        assert_eq!(s.allowed_use.len(), 2);
        assert!(!s.needs_partnership);
    }

    #[test]
    fn missing_file_is_an_error() {
        let err = MemorySourceStore::from_yaml_file(Path::new("/nonexistent/registry.yaml")).unwrap_err();
        assert!(matches!(err, RegistryError::File(_)));
    }
}
