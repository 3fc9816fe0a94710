//! Ordered adjudication: analyst, skeptic, methodologist, citation
//! auditor, judge.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use evgate_core::config::{LlmConfig, TribunalConfig};
use evgate_core::KnowledgeBase;
use evgate_llm::LlmProvider;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::TribunalError;
use crate::judge::Judge;
use crate::llm_stage::LlmStage;
use crate::log::{TribunalStats, VerdictLog, VerdictRecord};
use crate::stages::{AnalystStage, CitationAuditor, MethodologistStage, SkepticStage, TribunalStage};
use crate::types::{AgentRole, Claim, EvidenceItem, TribunalVerdict};

/// How long a logged verdict stands in for a fresh run in [`Tribunal::quick_verify`].
pub const QUICK_VERIFY_MAX_AGE: Duration = Duration::hours(24);

/// One slot per role. The auditor and judge are fixed.
pub struct Tribunal {
    analyst: Box<dyn TribunalStage>,
    skeptic: Box<dyn TribunalStage>,
    methodologist: Box<dyn TribunalStage>,
    auditor: CitationAuditor,
    judge: Judge,
    log: Arc<dyn VerdictLog>,
}

impl Tribunal {
    /// Tribunal with the deterministic stage for every role.
    pub fn new(cfg: &TribunalConfig, log: Arc<dyn VerdictLog>) -> Self {
        Self {
            analyst: Box::new(AnalystStage),
            skeptic: Box::new(SkepticStage {
                tolerance_pct: cfg.contradiction_tolerance_pct,
            }),
            methodologist: Box::new(MethodologistStage),
            auditor: CitationAuditor {
                term_overlap_ratio: cfg.term_overlap_ratio,
            },
            judge: Judge::from_config(cfg),
            log,
        }
    }

    /// Deterministic tribunal, upgraded to model-backed analyst, skeptic and
    /// methodologist when a provider is given and `use_llm_stages` is set.
    pub fn from_config(
        cfg: &TribunalConfig,
        llm: &LlmConfig,
        provider: Option<Arc<dyn LlmProvider>>,
        knowledge: Option<Arc<KnowledgeBase>>,
        log: Arc<dyn VerdictLog>,
    ) -> Self {
        let tribunal = Self::new(cfg, log);
        match provider {
            Some(provider) if cfg.use_llm_stages => {
                info!(provider = %provider.label(), "tribunal using model-backed stages");
                tribunal.with_model(provider, knowledge, llm.temperature, llm.max_tokens)
            }
            _ => tribunal,
        }
    }

    /// Wrap the analyst, skeptic and methodologist slots in model stages.
    pub fn with_model(
        mut self,
        provider: Arc<dyn LlmProvider>,
        knowledge: Option<Arc<KnowledgeBase>>,
        temperature: f32,
        max_tokens: u32,
    ) -> Self {
        let wrap = |base: Box<dyn TribunalStage>| -> Box<dyn TribunalStage> {
            Box::new(
                LlmStage::new(base, provider.clone())
                    .with_knowledge(knowledge.clone())
                    .with_sampling(temperature, max_tokens),
            )
        };
        self.analyst = wrap(self.analyst);
        self.skeptic = wrap(self.skeptic);
        self.methodologist = wrap(self.methodologist);
        self
    }

    /// Replace the stage in the slot matching its role.
    pub fn with_stage(mut self, stage: Box<dyn TribunalStage>) -> Result<Self, TribunalError> {
        match stage.role() {
            AgentRole::Analyst => self.analyst = stage,
            AgentRole::Skeptic => self.skeptic = stage,
            AgentRole::Methodologist => self.methodologist = stage,
            role => {
                return Err(TribunalError::InvalidClaim(format!(
                    "the {} slot cannot be replaced",
                    role
                )))
            }
        }
        Ok(self)
    }

    pub fn log(&self) -> &Arc<dyn VerdictLog> {
        &self.log
    }

    pub fn stats(&self, recent_limit: usize) -> Result<TribunalStats, TribunalError> {
        let records = self.log.recent(usize::MAX)?;
        Ok(TribunalStats::from_records(&records, recent_limit))
    }

    /// Newest logged verdict for `claim_id` no older than `max_age`.
    pub fn recent_verdict(
        &self,
        claim_id: &str,
        max_age: Duration,
        now: DateTime<Utc>,
    ) -> Result<Option<TribunalVerdict>, TribunalError> {
        let cutoff = now - max_age;
        Ok(self
            .log
            .recent(usize::MAX)?
            .into_iter()
            .map(|r| r.verdict)
            .find(|v| v.claim_id == claim_id && v.created_at >= cutoff && v.created_at <= now))
    }

    /// Reuse a verdict from the last 24 hours, otherwise run the full tribunal.
    pub async fn quick_verify(&self, claim: &Claim, evidence: &[EvidenceItem]) -> Result<TribunalVerdict, TribunalError> {
        self.quick_verify_at(claim, evidence, Utc::now()).await
    }

    pub async fn quick_verify_at(
        &self,
        claim: &Claim,
        evidence: &[EvidenceItem],
        now: DateTime<Utc>,
    ) -> Result<TribunalVerdict, TribunalError> {
        if let Some(verdict) = self.recent_verdict(&claim.claim_id, QUICK_VERIFY_MAX_AGE, now)? {
            debug!(claim_id = %claim.claim_id, verdict_id = %verdict.verdict_id, "reusing recent verdict");
            return Ok(verdict);
        }
        self.adjudicate_at(claim, evidence, now).await
    }

    pub async fn adjudicate(&self, claim: &Claim, evidence: &[EvidenceItem]) -> Result<TribunalVerdict, TribunalError> {
        self.adjudicate_at(claim, evidence, Utc::now()).await
    }

    pub async fn adjudicate_at(
        &self,
        claim: &Claim,
        evidence: &[EvidenceItem],
        now: DateTime<Utc>,
    ) -> Result<TribunalVerdict, TribunalError> {
        if claim.claim_id.trim().is_empty() {
            return Err(TribunalError::InvalidClaim("claim_id is empty".into()));
        }
        if claim.subject.trim().is_empty() {
            return Err(TribunalError::InvalidClaim("subject is empty".into()));
        }
        let started = Instant::now();

        let mut analyses = Vec::with_capacity(5);
        for stage in [&self.analyst, &self.skeptic, &self.methodologist] {
            let analysis = stage.analyse(claim, evidence, &analyses).await;
            analyses.push(analysis);
        }
        analyses.push(self.auditor.analysis(&self.auditor.audit(claim, evidence)));

        let judgement = self.judge.rule(&analyses);
        analyses.push(judgement.analysis());

        let verdict = TribunalVerdict {
            verdict_id: Uuid::new_v4(),
            claim_id: claim.claim_id.clone(),
            subject: claim.subject.clone(),
            verdict: judgement.verdict,
            citation_coverage: judgement.citation_coverage,
            cited_sentences: judgement.cited_sentences,
            total_sentences: judgement.total_sentences,
            analyses,
            uncited_sentences: judgement.uncited_sentences,
            contradictions: judgement.contradictions,
            warnings: judgement.warnings,
            reasons: judgement.reasons,
            created_at: now,
        };

        let record = VerdictRecord {
            verdict: verdict.clone(),
            claim: claim.clone(),
            evidence: evidence.to_vec(),
        };
        if let Err(e) = self.log.append(&record) {
            warn!(claim_id = %claim.claim_id, error = %e, "failed to record verdict");
            return Err(e);
        }

        info!(
            claim_id = %verdict.claim_id,
            verdict_id = %verdict.verdict_id,
            verdict = %verdict.verdict,
            coverage = verdict.citation_coverage,
            evidence = evidence.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "tribunal verdict"
        );
        Ok(verdict)
    }
}
