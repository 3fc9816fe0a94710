//! Registry-backed policy queries.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::RegistryError;
use crate::lint::lint_source;
use crate::policy::{self, PipeType, PolicyDecision, PolicySummary};
use crate::source::Source;
use crate::store::SourceRepository;

/// A source eligible for a pipe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipeSource {
    pub source_id: String,
    pub name: String,
    pub tier: String,
}

#[derive(Clone)]
pub struct PolicyEnforcer {
    sources: Arc<dyn SourceRepository>,
}

impl PolicyEnforcer {
    pub fn new(sources: Arc<dyn SourceRepository>) -> Self {
        Self { sources }
    }

    pub fn sources(&self) -> &Arc<dyn SourceRepository> {
        &self.sources
    }

    pub async fn decide(&self, source_id: &str) -> Result<PolicyDecision, RegistryError> {
        let source = self
            .sources
            .get(source_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(source_id.to_string()))?;
        let decision = policy::decide(&source);
        debug!(
            source_id,
            eligible = decision.eligible_pipes.len(),
            blocked = decision.blocked_pipes.len(),
            "policy decision"
        );
        Ok(decision)
    }

    /// Whether the source's tags permit `pipe`. Unknown sources feed nothing.
    pub async fn can_feed(&self, source_id: &str, pipe: PipeType) -> Result<bool, RegistryError> {
        match self.decide(source_id).await {
            Ok(d) => Ok(d.allows(pipe)),
            Err(RegistryError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// The registry entry, if it may be ingested now: ACTIVE and free of
    /// lint ERRORs.
    pub async fn admit(&self, source_id: &str) -> Result<Source, RegistryError> {
        let source = self
            .sources
            .get(source_id)
            .await?
            .ok_or_else(|| RegistryError::NotFound(source_id.to_string()))?;
        if !source.is_active() {
            return Err(RegistryError::NotActive {
                source_id: source.source_id,
                status: source.status,
            });
        }
        let rules = lint_source(&source).error_rules();
        if !rules.is_empty() {
            let rules = rules.iter().map(|r| r.as_str()).collect::<Vec<_>>().join(", ");
            warn!(source_id, rules = %rules, "source excluded by registry lint");
            return Err(RegistryError::LintRejected {
                source_id: source.source_id,
                rules,
            });
        }
        Ok(source)
    }

    /// ACTIVE, lint-clean sources eligible for `pipe`, in registry order.
    pub async fn sources_for_pipe(&self, pipe: PipeType) -> Result<Vec<PipeSource>, RegistryError> {
        Ok(self
            .sources
            .list()
            .await?
            .into_iter()
            .filter(|s| s.is_active())
            .filter(|s| lint_source(s).passed)
            .filter(|s| s.usage_tags().iter().any(|t| t.pipes().contains(&pipe)))
            .map(|s| PipeSource {
                name: s.display_name().to_string(),
                source_id: s.source_id,
                tier: s.tier,
            })
            .collect())
    }

    pub async fn summary(&self) -> Result<PolicySummary, RegistryError> {
        let sources = self.sources.list().await?;
        Ok(policy::summarize(&sources))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::source;
    use crate::store::MemorySourceStore;

    fn enforcer() -> PolicyEnforcer {
        let mut pending = source("pending-news", &["news_media"]);
        pending.status = "PENDING_REVIEW".into();
        PolicyEnforcer::new(Arc::new(MemorySourceStore::new(vec![
            source("wb", &["data_numeric", "doc_pdf"]),
            source("reuters", &["news_media"]),
            source("ofac", &["sanctions_list"]),
            pending,
        ])))
    }

    #[tokio::test]
    async fn decide_unknown_source_is_not_found() {
        let err = enforcer().decide("nope").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotFound(_)));
        assert_eq!(err.status_code(), 404);
    }

    #[tokio::test]
    async fn can_feed_follows_decision() {
        let e = enforcer();
        assert!(e.can_feed("wb", PipeType::DocumentVault).await.unwrap());
        assert!(!e.can_feed("ofac", PipeType::DocumentVault).await.unwrap());
        assert!(!e.can_feed("nope", PipeType::DocumentVault).await.unwrap());
    }

    #[tokio::test]
    async fn sources_for_pipe_skips_inactive() {
        let ids: Vec<_> = enforcer()
            .sources_for_pipe(PipeType::DocumentVault)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.source_id)
            .collect();
        assert_eq!(ids, vec!["wb", "reuters"]);
    }

    #[tokio::test]
    async fn summary_over_registry() {
        let s = enforcer().summary().await.unwrap();
        assert_eq!(s.total_sources, 3);
        assert_eq!(s.by_pipe[&PipeType::DocumentVault], 2);
    }

    #[tokio::test]
    async fn admit_requires_active_and_lint_clean_source() {
        let mut bare = source("bare", &["data_numeric"]);
        bare.endpoint_count = 0;
        bare.name = None;
        let store = MemorySourceStore::new(vec![source("wb", &["data_numeric"]), bare]);
        let mut pending = source("pending", &["data_numeric"]);
        pending.status = "PENDING_REVIEW".into();
        store.upsert(pending).unwrap();
        let e = PolicyEnforcer::new(Arc::new(store));

        assert_eq!(e.admit("wb").await.unwrap().source_id, "wb");
        match e.admit("bare").await.unwrap_err() {
            RegistryError::LintRejected { source_id, rules } => {
                assert_eq!(source_id, "bare");
                assert_eq!(rules, "MISSING_NAME, ACTIVE_NO_ENDPOINT");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        let err = e.admit("pending").await.unwrap_err();
        assert!(matches!(err, RegistryError::NotActive { .. }));
        assert_eq!(err.status_code(), 409);
        assert!(matches!(e.admit("nope").await.unwrap_err(), RegistryError::NotFound(_)));
    }

    #[tokio::test]
    async fn lint_rejected_sources_are_not_pipe_members() {
        let mut bare = source("bare", &["data_numeric"]);
        bare.endpoint_count = 0;
        let e = PolicyEnforcer::new(Arc::new(MemorySourceStore::new(vec![
            bare,
            source("wb", &["data_numeric"]),
        ])));
        let ids: Vec<_> = e
            .sources_for_pipe(PipeType::NumericTimeseries)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.source_id)
            .collect();
        assert_eq!(ids, vec!["wb"]);
        // The tag policy itself is unchanged.
        assert!(e.can_feed("bare", PipeType::NumericTimeseries).await.unwrap());
    }

    #[tokio::test]
    async fn decisions_follow_tag_changes_without_caching() {
        let store = Arc::new(MemorySourceStore::new(vec![source("wb", &["data_numeric"])]));
        let e = PolicyEnforcer::new(store.clone());

        let before = e.decide("wb").await.unwrap();
        assert_eq!(before.eligible_pipes, vec![PipeType::NumericTimeseries]);
        assert_eq!(e.sources_for_pipe(PipeType::DocumentVault).await.unwrap().len(), 0);

        store.upsert(source("wb", &["doc_pdf"])).unwrap();

        let after = e.decide("wb").await.unwrap();
        assert_eq!(after.eligible_pipes, vec![PipeType::DocumentVault]);
        assert!(!after.can_ingest_numeric);
        assert!(after.can_ingest_documents);
        assert_eq!(e.sources_for_pipe(PipeType::DocumentVault).await.unwrap().len(), 1);
        assert!(e.sources_for_pipe(PipeType::NumericTimeseries).await.unwrap().is_empty());
    }
}
