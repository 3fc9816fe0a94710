//! Tribunal roles that run without a model.
//!
//! Each stage sees the claim, the evidence set and every analysis produced
//! before it. None of them decides the verdict; they hand signals to the
//! judge.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;

use crate::citation::{self, CitationAudit, CitedBy};
use crate::contradiction::find_contradictions;
use crate::types::{AgentRole, Claim, ConfidenceGrade, EvidenceItem, PartialAnalysis, Signal};

/// Wording the skeptic treats as overstatement.
const ABSOLUTE_TERMS: &[&str] = &[
    "always",
    "never",
    "certainly",
    "undoubtedly",
    "guaranteed",
    "definitely",
    "proves",
    "entirely",
];

#[async_trait]
pub trait TribunalStage: Send + Sync {
    fn role(&self) -> AgentRole;

    /// Analyse the claim. Failures are recorded in the returned analysis.
    async fn analyse(&self, claim: &Claim, evidence: &[EvidenceItem], prior: &[PartialAnalysis]) -> PartialAnalysis;
}

// ── Analyst ──────────────────────────────────────────────────────────

pub struct AnalystStage;

#[async_trait]
impl TribunalStage for AnalystStage {
    fn role(&self) -> AgentRole {
        AgentRole::Analyst
    }

    async fn analyse(&self, claim: &Claim, evidence: &[EvidenceItem], _prior: &[PartialAnalysis]) -> PartialAnalysis {
        let relevant: Vec<&EvidenceItem> = evidence.iter().filter(|e| e.is_relevant_to(&claim.subject)).collect();
        let inadmissible = evidence.iter().filter(|e| !e.admissible).count();

        let mut analysis = if relevant.is_empty() {
            PartialAnalysis::new(
                AgentRole::Analyst,
                format!("No admissible evidence concerns '{}'", claim.subject),
            )
        } else {
            PartialAnalysis::new(
                AgentRole::Analyst,
                format!(
                    "{} admissible item(s) concern '{}'",
                    relevant.len(),
                    claim.subject
                ),
            )
        };

        if evidence.is_empty() {
            analysis.signals.push(Signal::EvidenceGap {
                subject: claim.subject.clone(),
                detail: "evidence set is empty".into(),
            });
        } else if relevant.is_empty() {
            analysis.signals.push(Signal::EvidenceGap {
                subject: claim.subject.clone(),
                detail: format!("none of {} evidence item(s) is admissible for this subject", evidence.len()),
            });
        }

        if inadmissible > 0 {
            analysis
                .findings
                .push(format!("{} item(s) are marked inadmissible and were set aside", inadmissible));
        }
        let mut grades: BTreeMap<ConfidenceGrade, usize> = BTreeMap::new();
        for item in &relevant {
            *grades.entry(item.confidence_grade).or_default() += 1;
        }
        if !grades.is_empty() {
            let spread: Vec<String> = grades.iter().map(|(g, n)| format!("{}={}", g.as_str(), n)).collect();
            analysis.findings.push(format!("Confidence grades: {}", spread.join(", ")));
        }
        let sources: BTreeSet<&str> = relevant.iter().map(|e| e.source_id.as_str()).collect();
        if sources.len() == 1 {
            analysis.findings.push("Claim rests on a single source".into());
        }
        analysis
    }
}

// ── Skeptic ──────────────────────────────────────────────────────────

pub struct SkepticStage {
    pub tolerance_pct: f64,
}

#[async_trait]
impl TribunalStage for SkepticStage {
    fn role(&self) -> AgentRole {
        AgentRole::Skeptic
    }

    async fn analyse(&self, claim: &Claim, evidence: &[EvidenceItem], _prior: &[PartialAnalysis]) -> PartialAnalysis {
        let contradictions = find_contradictions(evidence, &claim.subject, self.tolerance_pct);
        let mut analysis = PartialAnalysis::new(
            AgentRole::Skeptic,
            match contradictions.len() {
                0 => "No material disagreement between sources".to_string(),
                n => format!("{} material disagreement(s) between sources", n),
            },
        );

        for c in contradictions {
            analysis.findings.push(c.describe());
            analysis.signals.push(Signal::Contradiction(c));
        }

        for sentence in citation::split_sentences(&claim.text) {
            let lowered = sentence.to_lowercase();
            let words: BTreeSet<&str> = lowered.split(|c: char| !c.is_alphanumeric()).collect();
            if let Some(term) = ABSOLUTE_TERMS.iter().find(|t| words.contains(*t)) {
                analysis
                    .findings
                    .push(format!("Absolute wording '{}' in: {}", term, sentence));
            }
            for marker in citation::markers(&sentence) {
                if let Some(item) = evidence.iter().find(|e| e.answers_marker(&marker) && !e.admissible) {
                    analysis
                        .findings
                        .push(format!("Sentence leans on inadmissible evidence {}: {}", item.id, sentence));
                }
            }
        }
        analysis
    }
}

// ── Methodologist ────────────────────────────────────────────────────

pub struct MethodologistStage;

fn years_in(text: &str) -> BTreeSet<i32> {
    text.split(|c: char| !c.is_ascii_digit())
        .filter(|t| t.len() == 4)
        .filter_map(|t| t.parse().ok())
        .filter(|y| (1990..=2100).contains(y))
        .collect()
}

#[async_trait]
impl TribunalStage for MethodologistStage {
    fn role(&self) -> AgentRole {
        AgentRole::Methodologist
    }

    async fn analyse(&self, claim: &Claim, evidence: &[EvidenceItem], _prior: &[PartialAnalysis]) -> PartialAnalysis {
        let mut concerns = Vec::new();
        let relevant: Vec<&EvidenceItem> = evidence.iter().filter(|e| e.is_relevant_to(&claim.subject)).collect();

        for item in relevant.iter().filter(|e| e.confidence_grade == ConfidenceGrade::D) {
            concerns.push(format!("{} carries confidence grade D", item.id));
        }

        let units: BTreeSet<String> = relevant
            .iter()
            .filter(|e| e.value.is_some())
            .filter_map(|e| e.unit.as_deref())
            .map(|u| u.trim().to_lowercase())
            .collect();
        if units.len() > 1 {
            let units: Vec<String> = units.into_iter().collect();
            concerns.push(format!("Values reported in mixed units: {}", units.join(", ")));
        }

        let mut invalid = Vec::new();
        if !relevant.is_empty() && relevant.iter().all(|e| e.confidence_grade == ConfidenceGrade::D) {
            invalid.push("every relevant evidence item carries confidence grade D".to_string());
        }

        if let Some(year) = claim.context.year {
            let mut off_period = 0;
            for item in &relevant {
                let years = years_in(&item.excerpt);
                if !years.is_empty() && !years.contains(&year) {
                    concerns.push(format!("{} describes a different period than {}", item.id, year));
                    off_period += 1;
                }
            }
            if off_period > 0 && off_period == relevant.len() {
                invalid.push(format!("no relevant evidence covers {}", year));
            }
        }

        let summary = if !invalid.is_empty() {
            "Methodology invalid".to_string()
        } else if concerns.is_empty() {
            "No methodological concerns".to_string()
        } else {
            format!("{} methodological concern(s)", concerns.len())
        };
        let mut analysis = PartialAnalysis::new(AgentRole::Methodologist, summary);
        for detail in concerns {
            analysis.findings.push(detail.clone());
            analysis.signals.push(Signal::MethodConcern { detail });
        }
        for detail in invalid {
            analysis.findings.push(detail.clone());
            analysis.signals.push(Signal::MethodologyInvalid { detail });
        }
        analysis
    }
}

// ── Citation auditor ─────────────────────────────────────────────────

/// Deterministic sentence-by-sentence citation check. Not swappable.
#[derive(Debug, Clone)]
pub struct CitationAuditor {
    pub term_overlap_ratio: f64,
}

impl CitationAuditor {
    pub fn audit(&self, claim: &Claim, evidence: &[EvidenceItem]) -> CitationAudit {
        citation::audit(&claim.text, evidence, self.term_overlap_ratio)
    }

    pub fn analysis(&self, audit: &CitationAudit) -> PartialAnalysis {
        let mut analysis = PartialAnalysis::new(
            AgentRole::CitationAuditor,
            format!(
                "{} of {} sentence(s) cited ({:.1}%)",
                audit.cited_sentences, audit.total_sentences, audit.coverage
            ),
        );
        for s in &audit.sentences {
            match &s.cited_by {
                Some(CitedBy::Marker(_)) => {}
                Some(CitedBy::Excerpt(id)) => analysis.findings.push(format!("Matched to {} by wording: {}", id, s.text)),
                None => analysis.findings.push(format!("Uncited: {}", s.text)),
            }
        }
        for marker in &audit.unresolved_markers {
            analysis
                .findings
                .push(format!("Marker {} does not resolve to any evidence item", marker));
        }
        for marker in &audit.inadmissible_markers {
            analysis
                .findings
                .push(format!("Marker {} cites inadmissible evidence", marker));
        }
        analysis.signals.push(Signal::Coverage {
            cited: audit.cited_sentences,
            total: audit.total_sentences,
            coverage: audit.coverage,
            uncited: audit.uncited(),
        });
        analysis
    }
}

#[async_trait]
impl TribunalStage for CitationAuditor {
    fn role(&self) -> AgentRole {
        AgentRole::CitationAuditor
    }

    async fn analyse(&self, claim: &Claim, evidence: &[EvidenceItem], _prior: &[PartialAnalysis]) -> PartialAnalysis {
        self.analysis(&self.audit(claim, evidence))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn claim(text: &str) -> Claim {
        Claim::new("c1", "fx_rate_aden", text)
    }

    fn has_gap(a: &PartialAnalysis) -> bool {
        a.signals.iter().any(|s| matches!(s, Signal::EvidenceGap { .. }))
    }

    #[tokio::test]
    async fn analyst_flags_empty_and_irrelevant_evidence() {
        let c = claim("The rial fell.");
        assert!(has_gap(&AnalystStage.analyse(&c, &[], &[]).await));

        let other = vec![EvidenceItem::new("E1", "imf", "x").with_subject("inflation")];
        assert!(has_gap(&AnalystStage.analyse(&c, &other, &[]).await));

        let ok = vec![EvidenceItem::new("E1", "cby", "x")];
        let a = AnalystStage.analyse(&c, &ok, &[]).await;
        assert!(!has_gap(&a));
        assert!(a.findings.iter().any(|f| f.contains("single source")));
    }

    #[tokio::test]
    async fn skeptic_emits_contradictions_and_overstatement() {
        let evidence = vec![
            EvidenceItem::new("E1", "cby-aden", "x").with_value(1600.0, "YER/USD"),
            EvidenceItem::new("E2", "cby-sanaa", "y").with_value(530.0, "YER/USD"),
        ];
        let a = SkepticStage { tolerance_pct: 10.0 }
            .analyse(&claim("The rate will always rise [E1]."), &evidence, &[])
            .await;
        assert_eq!(
            a.signals.iter().filter(|s| matches!(s, Signal::Contradiction(_))).count(),
            1
        );
        assert!(a.findings.iter().any(|f| f.contains("'always'")));
    }

    #[tokio::test]
    async fn skeptic_notes_inadmissible_citations() {
        let evidence = vec![EvidenceItem::new("E3", "blog", "x").inadmissible()];
        let a = SkepticStage { tolerance_pct: 10.0 }
            .analyse(&claim("Reserves collapsed [E3]."), &evidence, &[])
            .await;
        assert!(a.signals.is_empty());
        assert!(a.findings[0].contains("inadmissible evidence E3"));
    }

    #[tokio::test]
    async fn methodologist_raises_concerns() {
        let mut c = claim("Rates rose in 2023.");
        c.context.year = Some(2023);
        let evidence = vec![
            EvidenceItem::new("E1", "a", "rates in 2019").with_grade(ConfidenceGrade::D),
            EvidenceItem::new("E2", "b", "rates").with_value(1.0, "percent"),
            EvidenceItem::new("E3", "c", "rates").with_value(2.0, "YER/USD"),
        ];
        let a = MethodologistStage.analyse(&c, &evidence, &[]).await;
        let concerns: Vec<_> = a
            .signals
            .iter()
            .filter_map(|s| match s {
                Signal::MethodConcern { detail } => Some(detail.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(concerns.len(), 3);
        assert!(concerns[0].contains("grade D"));
        assert!(concerns[1].contains("mixed units"));
        assert!(concerns[2].contains("E1"));
    }

    #[tokio::test]
    async fn methodologist_rejects_evidence_from_the_wrong_period() {
        let mut c = claim("Reserves fell in 2023 [E1].");
        c.context.year = Some(2023);
        let stale = vec![
            EvidenceItem::new("E1", "a", "reserves at end of 2019"),
            EvidenceItem::new("E2", "b", "reserves, 2020 bulletin"),
        ];
        let a = MethodologistStage.analyse(&c, &stale, &[]).await;
        assert_eq!(a.summary, "Methodology invalid");
        assert!(a.signals.contains(&Signal::MethodologyInvalid {
            detail: "no relevant evidence covers 2023".into()
        }));

        // One item on the right period keeps the method sound.
        let mut mixed = stale.clone();
        mixed.push(EvidenceItem::new("E3", "c", "reserves in 2023"));
        let a = MethodologistStage.analyse(&c, &mixed, &[]).await;
        assert!(!a.signals.iter().any(|s| matches!(s, Signal::MethodologyInvalid { .. })));

        let graded = vec![EvidenceItem::new("E1", "a", "reserves").with_grade(ConfidenceGrade::D)];
        let a = MethodologistStage.analyse(&c, &graded, &[]).await;
        assert!(a.signals.iter().any(|s| matches!(s, Signal::MethodologyInvalid { .. })));
    }

    #[tokio::test]
    async fn auditor_reports_coverage_signal() {
        let evidence = vec![EvidenceItem::new("E1", "cby", "x")];
        let auditor = CitationAuditor { term_overlap_ratio: 0.5 };
        let a = auditor
            .analyse(&claim("Reserves fell [E1]. Nobody knows why."), &evidence, &[])
            .await;
        match &a.signals[0] {
            Signal::Coverage { cited, total, coverage, uncited } => {
                assert_eq!((*cited, *total), (1, 2));
                assert_eq!(*coverage, 50.0);
                assert_eq!(uncited, &vec!["Nobody knows why.".to_string()]);
            }
            other => panic!("unexpected signal {:?}", other),
        }
    }
}
