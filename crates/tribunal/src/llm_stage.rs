//! Model-backed tribunal roles.
//!
//! A model stage wraps the deterministic stage for the same role: the
//! deterministic signals always stand, the model adds narrative findings and
//! concerns. Unusable model output is recorded as a stage error.

use std::sync::Arc;

use async_trait::async_trait;
use evgate_core::KnowledgeBase;
use evgate_llm::{complete_json, LlmProvider, Message};
use serde::Deserialize;
use tracing::{debug, warn};

use crate::stages::TribunalStage;
use crate::types::{AgentRole, Claim, EvidenceItem, PartialAnalysis, Signal};

const SYSTEM_PROMPT: &str =
    "You are a member of an evidence tribunal reviewing economic claims before publication. Always respond with valid JSON.";

const REPLY_FORMAT: &str = r#"Respond with a JSON object: {"summary": string, "findings": [string], "concerns": [string]}"#;

fn role_brief(role: AgentRole) -> &'static str {
    match role {
        AgentRole::Analyst => {
            "As the Analyst, state what the evidence says, which items support the claim (cite them by id) \
             and which parts of the claim lack evidence."
        }
        AgentRole::Skeptic => {
            "As the Skeptic, look for contradictions between evidence items, overstatement, weak inferences \
             and one-sided sourcing. List each problem as a concern."
        }
        AgentRole::Methodologist => {
            "As the Methodologist, check time period, units, currency, authority (Aden, Sanaa or both) and \
             whether the evidence's collection method supports the precision of the claim."
        }
        AgentRole::CitationAuditor | AgentRole::Judge => "Review the claim against the evidence.",
    }
}

#[derive(Debug, Deserialize)]
struct StageReply {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    findings: Vec<String>,
    #[serde(default)]
    concerns: Vec<String>,
}

pub struct LlmStage {
    base: Box<dyn TribunalStage>,
    provider: Arc<dyn LlmProvider>,
    knowledge: Option<Arc<KnowledgeBase>>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmStage {
    pub fn new(base: Box<dyn TribunalStage>, provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            base,
            provider,
            knowledge: None,
            temperature: 0.1,
            max_tokens: 2048,
        }
    }

    pub fn with_knowledge(mut self, knowledge: Option<Arc<KnowledgeBase>>) -> Self {
        self.knowledge = knowledge;
        self
    }

    pub fn with_sampling(mut self, temperature: f32, max_tokens: u32) -> Self {
        self.temperature = temperature;
        self.max_tokens = max_tokens;
        self
    }

    fn prompt(&self, claim: &Claim, evidence: &[EvidenceItem], prior: &[PartialAnalysis]) -> String {
        let mut out = String::new();
        out.push_str(role_brief(self.base.role()));
        out.push_str("\n\nClaim (");
        out.push_str(&claim.claim_type);
        out.push_str(", subject ");
        out.push_str(&claim.subject);
        out.push_str("):\n");
        out.push_str(&claim.text);

        let ctx = &claim.context;
        out.push_str(&format!(
            "\n\nContext: year {}, authority {}, page {}",
            ctx.year.map_or("unknown".to_string(), |y| y.to_string()),
            ctx.regime.as_deref().unwrap_or("both"),
            ctx.page.as_deref().unwrap_or("general"),
        ));

        if let Some(kb) = &self.knowledge {
            let background = kb.context_for(&claim.text);
            if !background.is_empty() {
                out.push_str("\n\nBackground:\n");
                for line in background {
                    out.push_str("- ");
                    out.push_str(&line);
                    out.push('\n');
                }
            }
        }

        out.push_str("\n\nEvidence:\n");
        if evidence.is_empty() {
            out.push_str("No evidence items found. This claim lacks supporting evidence.\n");
        }
        for e in evidence {
            out.push_str(&format!(
                "[{}] {} ({}; grade {}{}): {}",
                e.id,
                if e.source_org.is_empty() { &e.source_id } else { &e.source_org },
                e.source_id,
                e.confidence_grade.as_str(),
                if e.admissible { "" } else { "; inadmissible" },
                e.excerpt
            ));
            if let Some(v) = e.value {
                out.push_str(&format!(" [value {} {}]", v, e.unit.as_deref().unwrap_or("")));
            }
            out.push('\n');
        }

        if !prior.is_empty() {
            out.push_str("\nEarlier reviews:\n");
            for p in prior {
                out.push_str(&format!("- {}: {}\n", p.role, p.summary));
            }
        }

        out.push('\n');
        out.push_str(REPLY_FORMAT);
        out
    }
}

#[async_trait]
impl TribunalStage for LlmStage {
    fn role(&self) -> AgentRole {
        self.base.role()
    }

    async fn analyse(&self, claim: &Claim, evidence: &[EvidenceItem], prior: &[PartialAnalysis]) -> PartialAnalysis {
        let mut analysis = self.base.analyse(claim, evidence, prior).await;
        let messages = vec![
            Message::system(SYSTEM_PROMPT),
            Message::user(self.prompt(claim, evidence, prior)),
        ];

        debug!(role = %self.role(), claim_id = %claim.claim_id, provider = %self.provider.label(), "running model stage");
        match complete_json::<StageReply>(self.provider.as_ref(), messages, self.temperature, self.max_tokens).await {
            Ok(reply) => {
                if !reply.summary.trim().is_empty() {
                    analysis.summary = format!("{} | {}", analysis.summary, reply.summary.trim());
                }
                analysis.findings.extend(reply.findings);
                for detail in reply.concerns {
                    analysis.findings.push(detail.clone());
                    analysis.signals.push(Signal::MethodConcern { detail });
                }
            }
            Err(e) => {
                warn!(role = %self.role(), claim_id = %claim.claim_id, error = %e, "model stage output unusable");
                let detail = format!("{} model review unavailable: {}", self.role(), e);
                analysis.findings.push(detail.clone());
                analysis.signals.push(Signal::StageError { detail });
            }
        }
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stages::{AnalystStage, SkepticStage};
    use evgate_llm::LlmError;
    use std::sync::Mutex;

    struct Scripted {
        reply: Result<String, ()>,
        seen: Mutex<Vec<String>>,
    }

    impl Scripted {
        fn ok(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: Ok(reply.to_string()),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: Err(()),
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl LlmProvider for Scripted {
        async fn complete(&self, messages: Vec<Message>, _: f32, _: u32) -> Result<String, LlmError> {
            self.seen.lock().unwrap().push(messages[1].content.clone());
            match &self.reply {
                Ok(r) => Ok(r.clone()),
                Err(()) => Err(LlmError::NotConfigured("offline".into())),
            }
        }

        fn label(&self) -> String {
            "scripted".into()
        }
    }

    fn claim() -> Claim {
        let mut c = Claim::new("c1", "fx_rate_aden", "In 2024 the rial fell against the dollar [E1].");
        c.context.year = Some(2024);
        c
    }

    #[tokio::test]
    async fn model_findings_extend_deterministic_analysis() {
        let provider = Scripted::ok(r#"{"summary":"supported","findings":["E1 supports the fall"],"concerns":["single month only"]}"#);
        let kb = KnowledgeBase::from_yaml(
            "version: '1'\ntimeline:\n  - key: split\n    period: '2024'\n    events:\n      - year: 2024\n        event: Banking dispute\n",
        )
        .unwrap();
        let stage = LlmStage::new(Box::new(AnalystStage), provider.clone()).with_knowledge(Some(Arc::new(kb)));
        let evidence = vec![EvidenceItem::new("E1", "cby-aden", "rial fell").with_org("CBY Aden")];
        let a = stage.analyse(&claim(), &evidence, &[]).await;

        assert_eq!(a.role, AgentRole::Analyst);
        assert!(a.summary.ends_with("| supported"));
        assert!(a.findings.contains(&"E1 supports the fall".to_string()));
        assert!(a.signals.contains(&Signal::MethodConcern {
            detail: "single month only".into()
        }));

        let prompt = provider.seen.lock().unwrap()[0].clone();
        assert!(prompt.contains("Banking dispute"));
        assert!(prompt.contains("[E1] CBY Aden"));
        assert!(prompt.contains("year 2024"));
    }

    #[tokio::test]
    async fn unusable_output_becomes_stage_error() {
        let stage = LlmStage::new(Box::new(SkepticStage { tolerance_pct: 10.0 }), Scripted::ok("I refuse"));
        let a = stage.analyse(&claim(), &[], &[]).await;
        assert!(matches!(a.signals.last(), Some(Signal::StageError { .. })));

        let stage = LlmStage::new(Box::new(AnalystStage), Scripted::failing());
        let a = stage.analyse(&claim(), &[], &[]).await;
        // Deterministic gap signal survives the model failure.
        assert!(a.signals.iter().any(|s| matches!(s, Signal::EvidenceGap { .. })));
        assert!(a.signals.iter().any(|s| matches!(s, Signal::StageError { .. })));
    }
}
