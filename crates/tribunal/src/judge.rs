//! The judge: the only role that sets a verdict.

use evgate_core::config::TribunalConfig;
use serde::{Deserialize, Serialize};

use crate::contradiction::Contradiction;
use crate::types::{AgentRole, PartialAnalysis, Signal, Verdict};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Judgement {
    pub verdict: Verdict,
    pub citation_coverage: f64,
    pub cited_sentences: usize,
    pub total_sentences: usize,
    pub uncited_sentences: Vec<String>,
    pub contradictions: Vec<Contradiction>,
    pub reasons: Vec<String>,
    pub warnings: Vec<String>,
}

impl Judgement {
    pub fn analysis(&self) -> PartialAnalysis {
        let mut a = PartialAnalysis::new(AgentRole::Judge, format!("Verdict: {}", self.verdict));
        a.findings = self.reasons.clone();
        a
    }
}

#[derive(Debug, Clone)]
pub struct Judge {
    pub pass_threshold: f64,
    pub warn_threshold: f64,
}

impl Judge {
    pub fn from_config(cfg: &TribunalConfig) -> Self {
        Self {
            pass_threshold: cfg.pass_threshold,
            warn_threshold: cfg.warn_threshold,
        }
    }

    /// Rule on the prior analyses. Evidence gaps outrank contradictions,
    /// then invalid methodology, then coverage.
    pub fn rule(&self, prior: &[PartialAnalysis]) -> Judgement {
        let mut gaps = Vec::new();
        let mut contradictions = Vec::new();
        let mut warnings = Vec::new();
        let mut invalid = Vec::new();
        let mut coverage = None;

        for analysis in prior {
            for signal in &analysis.signals {
                match signal {
                    Signal::EvidenceGap { subject, detail } => gaps.push(format!("{}: {}", subject, detail)),
                    Signal::Contradiction(c) => contradictions.push(c.clone()),
                    Signal::Coverage {
                        cited,
                        total,
                        coverage: pct,
                        uncited,
                    } => coverage = Some((*cited, *total, *pct, uncited.clone())),
                    Signal::MethodConcern { detail } => warnings.push(detail.clone()),
                    Signal::MethodologyInvalid { detail } => invalid.push(detail.clone()),
                    Signal::StageError { detail } => warnings.push(detail.clone()),
                }
            }
        }

        let (cited, total, pct, uncited) = coverage.unwrap_or((0, 0, 0.0, Vec::new()));
        let mut reasons = Vec::new();
        let verdict = if !gaps.is_empty() {
            reasons.extend(gaps.iter().map(|g| format!("Data gap: {}", g)));
            Verdict::DataGap
        } else if !contradictions.is_empty() {
            reasons.extend(contradictions.iter().map(|c| format!("Contested: {}", c.describe())));
            Verdict::Contested
        } else if !invalid.is_empty() {
            reasons.extend(invalid.iter().map(|d| format!("Methodology invalid: {}", d)));
            Verdict::Fail
        } else if pct >= self.pass_threshold {
            reasons.push(format!("Citation coverage {:.1}% meets {:.0}%", pct, self.pass_threshold));
            Verdict::Pass
        } else if pct >= self.warn_threshold {
            reasons.push(format!(
                "Citation coverage {:.1}% is below {:.0}% but meets {:.0}%",
                pct, self.pass_threshold, self.warn_threshold
            ));
            Verdict::PassWarn
        } else {
            reasons.push(format!("Citation coverage {:.1}% is below {:.0}%", pct, self.warn_threshold));
            Verdict::Fail
        };

        Judgement {
            verdict,
            citation_coverage: pct,
            cited_sentences: cited,
            total_sentences: total,
            uncited_sentences: uncited,
            contradictions,
            reasons,
            warnings,
        }
    }
}

impl Default for Judge {
    fn default() -> Self {
        Self::from_config(&TribunalConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contradiction::ObservedValue;

    fn coverage(pct: f64) -> PartialAnalysis {
        let mut a = PartialAnalysis::new(AgentRole::CitationAuditor, "");
        a.signals.push(Signal::Coverage {
            cited: 0,
            total: 0,
            coverage: pct,
            uncited: vec![],
        });
        a
    }

    fn contested() -> PartialAnalysis {
        let mut a = PartialAnalysis::new(AgentRole::Skeptic, "");
        a.signals.push(Signal::Contradiction(Contradiction {
            subject: "fx".into(),
            unit: "YER/USD".into(),
            left: ObservedValue {
                evidence_id: "E1".into(),
                source_id: "a".into(),
                value: 1.0,
            },
            right: ObservedValue {
                evidence_id: "E2".into(),
                source_id: "b".into(),
                value: 2.0,
            },
            divergence_pct: Some(100.0),
        }));
        a
    }

    fn gap() -> PartialAnalysis {
        let mut a = PartialAnalysis::new(AgentRole::Analyst, "");
        a.signals.push(Signal::EvidenceGap {
            subject: "fx".into(),
            detail: "evidence set is empty".into(),
        });
        a
    }

    #[test]
    fn coverage_bands() {
        let judge = Judge::default();
        assert_eq!(judge.rule(&[coverage(100.0)]).verdict, Verdict::Pass);
        assert_eq!(judge.rule(&[coverage(95.0)]).verdict, Verdict::Pass);
        assert_eq!(judge.rule(&[coverage(94.9)]).verdict, Verdict::PassWarn);
        assert_eq!(judge.rule(&[coverage(85.0)]).verdict, Verdict::PassWarn);
        assert_eq!(judge.rule(&[coverage(84.9)]).verdict, Verdict::Fail);
        assert_eq!(judge.rule(&[]).verdict, Verdict::Fail);
    }

    #[test]
    fn contradiction_overrides_full_coverage() {
        let j = Judge::default().rule(&[contested(), coverage(100.0)]);
        assert_eq!(j.verdict, Verdict::Contested);
        assert_eq!(j.contradictions.len(), 1);
    }

    #[test]
    fn data_gap_outranks_everything() {
        let j = Judge::default().rule(&[gap(), contested(), coverage(100.0)]);
        assert_eq!(j.verdict, Verdict::DataGap);
        assert!(j.reasons[0].starts_with("Data gap: fx"));
    }

    #[test]
    fn invalid_methodology_fails_full_coverage() {
        let mut m = PartialAnalysis::new(AgentRole::Methodologist, "");
        m.signals.push(Signal::MethodologyInvalid {
            detail: "no relevant evidence covers 2023".into(),
        });
        let j = Judge::default().rule(&[m.clone(), coverage(100.0)]);
        assert_eq!(j.verdict, Verdict::Fail);
        assert_eq!(j.reasons, vec!["Methodology invalid: no relevant evidence covers 2023"]);
        assert_eq!(j.citation_coverage, 100.0);

        // Gaps and contradictions still take precedence.
        assert_eq!(Judge::default().rule(&[gap(), m.clone(), coverage(100.0)]).verdict, Verdict::DataGap);
        assert_eq!(Judge::default().rule(&[contested(), m, coverage(100.0)]).verdict, Verdict::Contested);
    }

    #[test]
    fn concerns_become_warnings_without_changing_verdict() {
        let mut m = PartialAnalysis::new(AgentRole::Methodologist, "");
        m.signals.push(Signal::MethodConcern {
            detail: "mixed units".into(),
        });
        let j = Judge::default().rule(&[m, coverage(96.0)]);
        assert_eq!(j.verdict, Verdict::Pass);
        assert_eq!(j.warnings, vec!["mixed units"]);
        assert_eq!(j.analysis().role, AgentRole::Judge);
    }
}
