use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::contradiction::Contradiction;

// ── Claims and evidence ──────────────────────────────────────────────

/// Where and when a claim is meant to hold.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    /// Authority the claim is scoped to, e.g. "aden", "sanaa" or "both".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub regime: Option<String>,
    /// Page or report section the claim appears on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub claim_id: String,
    #[serde(default = "default_claim_type")]
    pub claim_type: String,
    pub subject: String,
    /// Narrative text. Sentences may carry `[E12]` markers.
    pub text: String,
    #[serde(default)]
    pub context: ClaimContext,
}

fn default_claim_type() -> String {
    "narrative".to_string()
}

impl Claim {
    pub fn new(claim_id: impl Into<String>, subject: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            claim_id: claim_id.into(),
            claim_type: default_claim_type(),
            subject: subject.into(),
            text: text.into(),
            context: ClaimContext::default(),
        }
    }
}

/// Source reliability grade, A (best) to D.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ConfidenceGrade {
    A,
    B,
    #[default]
    C,
    D,
}

impl ConfidenceGrade {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConfidenceGrade::A => "A",
            ConfidenceGrade::B => "B",
            ConfidenceGrade::C => "C",
            ConfidenceGrade::D => "D",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    pub id: String,
    pub source_id: String,
    #[serde(default)]
    pub source_org: String,
    pub excerpt: String,
    /// Subject the excerpt reports on. Absent means "the claim's subject".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default)]
    pub confidence_grade: ConfidenceGrade,
    #[serde(default = "default_admissible")]
    pub admissible: bool,
}

fn default_admissible() -> bool {
    true
}

impl EvidenceItem {
    pub fn new(id: impl Into<String>, source_id: impl Into<String>, excerpt: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            source_id: source_id.into(),
            source_org: String::new(),
            excerpt: excerpt.into(),
            subject: None,
            value: None,
            unit: None,
            confidence_grade: ConfidenceGrade::default(),
            admissible: true,
        }
    }

    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    pub fn with_value(mut self, value: f64, unit: impl Into<String>) -> Self {
        self.value = Some(value);
        self.unit = Some(unit.into());
        self
    }

    pub fn with_org(mut self, org: impl Into<String>) -> Self {
        self.source_org = org.into();
        self
    }

    pub fn with_grade(mut self, grade: ConfidenceGrade) -> Self {
        self.confidence_grade = grade;
        self
    }

    pub fn inadmissible(mut self) -> Self {
        self.admissible = false;
        self
    }

    /// Subject this item speaks to, falling back to `claim_subject`.
    pub fn subject_or<'a>(&'a self, claim_subject: &'a str) -> &'a str {
        self.subject.as_deref().unwrap_or(claim_subject)
    }

    /// Admissible and about `subject` (case-insensitive).
    pub fn is_relevant_to(&self, subject: &str) -> bool {
        self.admissible && same_subject(self.subject_or(subject), subject)
    }

    /// Whether a citation marker such as `E12` refers to this item.
    pub fn answers_marker(&self, marker: &str) -> bool {
        self.id.eq_ignore_ascii_case(marker) || marker.get(1..).map_or(false, |digits| self.id == digits)
    }
}

fn same_subject(a: &str, b: &str) -> bool {
    a.trim().eq_ignore_ascii_case(b.trim())
}

// ── Verdicts ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    PassWarn,
    Fail,
    DataGap,
    Contested,
}

impl Verdict {
    pub const ALL: [Verdict; 5] = [
        Verdict::Pass,
        Verdict::PassWarn,
        Verdict::Fail,
        Verdict::DataGap,
        Verdict::Contested,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::PassWarn => "PASS_WARN",
            Verdict::Fail => "FAIL",
            Verdict::DataGap => "DATA_GAP",
            Verdict::Contested => "CONTESTED",
        }
    }

    pub fn is_publishable(&self) -> bool {
        matches!(self, Verdict::Pass | Verdict::PassWarn)
    }

    /// Verdicts that open a gap ticket.
    pub fn opens_gap(&self) -> bool {
        matches!(self, Verdict::Fail | Verdict::DataGap)
    }

    /// Weight in the tribunal pass rate.
    pub fn pass_weight(&self) -> f64 {
        match self {
            Verdict::Pass => 1.0,
            Verdict::PassWarn => 0.5,
            _ => 0.0,
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    Analyst,
    Skeptic,
    Methodologist,
    CitationAuditor,
    Judge,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::Analyst => "analyst",
            AgentRole::Skeptic => "skeptic",
            AgentRole::Methodologist => "methodologist",
            AgentRole::CitationAuditor => "citation_auditor",
            AgentRole::Judge => "judge",
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine-readable observations a stage hands to the judge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Signal {
    /// No usable evidence for a subject.
    EvidenceGap { subject: String, detail: String },
    Contradiction(Contradiction),
    /// Sentence-level citation audit result.
    Coverage {
        cited: usize,
        total: usize,
        coverage: f64,
        uncited: Vec<String>,
    },
    MethodConcern { detail: String },
    /// The evidence cannot support the claim as framed.
    MethodologyInvalid { detail: String },
    /// The stage could not complete its own analysis.
    StageError { detail: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartialAnalysis {
    pub role: AgentRole,
    pub summary: String,
    #[serde(default)]
    pub findings: Vec<String>,
    #[serde(default)]
    pub signals: Vec<Signal>,
}

impl PartialAnalysis {
    pub fn new(role: AgentRole, summary: impl Into<String>) -> Self {
        Self {
            role,
            summary: summary.into(),
            findings: Vec::new(),
            signals: Vec::new(),
        }
    }
}

/// Outcome of one adjudication. Never mutated after it is logged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TribunalVerdict {
    pub verdict_id: Uuid,
    pub claim_id: String,
    pub subject: String,
    pub verdict: Verdict,
    pub citation_coverage: f64,
    pub cited_sentences: usize,
    pub total_sentences: usize,
    pub analyses: Vec<PartialAnalysis>,
    pub uncited_sentences: Vec<String>,
    pub contradictions: Vec<Contradiction>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub reasons: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl TribunalVerdict {
    pub fn analysis(&self, role: AgentRole) -> Option<&PartialAnalysis> {
        self.analyses.iter().find(|a| a.role == role)
    }
}
