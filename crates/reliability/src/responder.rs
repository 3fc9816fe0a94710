//! Candidate-answer sources for reliability cases.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{anyhow, Context};
use async_trait::async_trait;
use evgate_core::KnowledgeBase;
use evgate_llm::{complete_json, LlmProvider, Message};
use evgate_tribunal::{Claim, ClaimContext, EvidenceItem};
use serde::{Deserialize, Serialize};

use crate::corpus::ReliabilityCase;

/// A claim to adjudicate plus the evidence offered for it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateAnswer {
    pub claim: Claim,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

impl CandidateAnswer {
    /// Answer `text` to `case`, claimed under the case's subject and year.
    pub fn for_case(case: &ReliabilityCase, text: impl Into<String>, evidence: Vec<EvidenceItem>) -> Self {
        Self {
            claim: Claim {
                claim_id: case.case_id.clone(),
                claim_type: "reliability_case".to_string(),
                subject: case.subject.clone(),
                text: text.into(),
                context: ClaimContext {
                    year: case.year,
                    regime: None,
                    page: None,
                },
            },
            evidence,
        }
    }
}

#[async_trait]
pub trait Responder: Send + Sync {
    async fn respond(&self, case: &ReliabilityCase) -> anyhow::Result<CandidateAnswer>;
}

// ── Model-backed ─────────────────────────────────────────────────────

const SYSTEM_PROMPT: &str = "You answer questions about Yemen's economy for a publication that only \
prints statements traced to evidence. Answer in two to four sentences. End every sentence with the \
id of the evidence it relies on, like [E1]. List only evidence you can attribute to a named source. \
If you have no evidence, say so and return an empty evidence list.";

#[derive(Debug, Deserialize)]
struct ModelAnswer {
    answer: String,
    #[serde(default)]
    evidence: Vec<EvidenceItem>,
}

/// Asks the configured model for an answer and its evidence.
pub struct LlmResponder {
    provider: Arc<dyn LlmProvider>,
    knowledge: Option<Arc<KnowledgeBase>>,
    temperature: f32,
    max_tokens: u32,
}

impl LlmResponder {
    pub fn new(provider: Arc<dyn LlmProvider>) -> Self {
        Self {
            provider,
            knowledge: None,
            temperature: 0.1,
            max_tokens: 1200,
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

    fn prompt(&self, case: &ReliabilityCase) -> String {
        let mut prompt = format!("Question: {}\n", case.question);
        if !case.expected_sources.is_empty() {
            prompt.push_str(&format!("Preferred sources: {}\n", case.expected_sources.join(", ")));
        }
        if let Some(kb) = &self.knowledge {
            let background = kb.context_for(&case.question);
            if !background.is_empty() {
                prompt.push_str("\nBackground:\n");
                for line in background {
                    prompt.push_str(&format!("- {}\n", line));
                }
            }
        }
        prompt.push_str(
            "\nReply with JSON only:\n\
             {\"answer\": \"...\", \"evidence\": [{\"id\": \"E1\", \"source_id\": \"...\", \"source_org\": \"...\", \
             \"excerpt\": \"...\", \"value\": null, \"unit\": null}]}\n",
        );
        prompt
    }
}

#[async_trait]
impl Responder for LlmResponder {
    async fn respond(&self, case: &ReliabilityCase) -> anyhow::Result<CandidateAnswer> {
        let messages = vec![Message::system(SYSTEM_PROMPT), Message::user(self.prompt(case))];
        let reply: ModelAnswer = complete_json(self.provider.as_ref(), messages, self.temperature, self.max_tokens)
            .await
            .with_context(|| format!("{} failed on {}", self.provider.label(), case.case_id))?;
        Ok(CandidateAnswer::for_case(case, reply.answer, reply.evidence))
    }
}

// ── Fixture-backed ───────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
struct FixtureEntry {
    answer: String,
    #[serde(default)]
    evidence: Vec<EvidenceItem>,
}

/// Replays recorded answers keyed by case id.
#[derive(Debug, Clone, Default)]
pub struct FixtureResponder {
    answers: HashMap<String, FixtureEntry>,
}

impl FixtureResponder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_answer(mut self, case_id: impl Into<String>, answer: impl Into<String>, evidence: Vec<EvidenceItem>) -> Self {
        self.answers.insert(
            case_id.into(),
            FixtureEntry {
                answer: answer.into(),
                evidence,
            },
        );
        self
    }

    /// YAML map of `case_id -> {answer, evidence}`.
    pub fn from_yaml(raw: &str) -> anyhow::Result<Self> {
        let answers: HashMap<String, FixtureEntry> = serde_yaml::from_str(raw).context("invalid fixture answers")?;
        Ok(Self { answers })
    }

    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml(&raw)
    }

    pub fn len(&self) -> usize {
        self.answers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.answers.is_empty()
    }
}

#[async_trait]
impl Responder for FixtureResponder {
    async fn respond(&self, case: &ReliabilityCase) -> anyhow::Result<CandidateAnswer> {
        let entry = self
            .answers
            .get(&case.case_id)
            .ok_or_else(|| anyhow!("no recorded answer for {}", case.case_id))?;
        Ok(CandidateAnswer::for_case(case, entry.answer.clone(), entry.evidence.clone()))
    }
}
