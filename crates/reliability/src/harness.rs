//! Runs the corpus through the evidence gate and scores the result.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use evgate_core::config::{ReliabilityConfig, TribunalConfig};
use evgate_tribunal::{EvidenceGate, MemoryVerdictLog, Tribunal, Verdict};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::corpus::{Category, Difficulty, ReliabilityCase};
use crate::responder::Responder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunType {
    Nightly,
    Release,
    Manual,
}

impl RunType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunType::Nightly => "nightly",
            RunType::Release => "release",
            RunType::Manual => "manual",
        }
    }
}

impl fmt::Display for RunType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseResult {
    pub case_id: String,
    pub category: Category,
    pub difficulty: Difficulty,
    pub passed: bool,
    /// None when no verdict was reached (responder or tribunal error).
    pub verdict: Option<Verdict>,
    pub citation_coverage: f64,
    pub contradiction_resolved: bool,
    pub hallucination: bool,
    pub latency_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryBreakdown {
    pub total: usize,
    pub passed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityRun {
    pub run_id: Uuid,
    pub run_type: RunType,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub total_cases: usize,
    pub passed: usize,
    pub failed: usize,
    /// Rates are 0-1; coverage is 0-100 like the tribunal reports it.
    pub pass_rate: f64,
    pub avg_citation_coverage: f64,
    pub contradiction_resolution_rate: f64,
    pub hallucination_rate: f64,
    pub avg_latency_ms: f64,
    pub reliability_score: f64,
    pub score_threshold: f64,
    pub by_category: BTreeMap<Category, CategoryBreakdown>,
    pub results: Vec<CaseResult>,
}

impl ReliabilityRun {
    pub fn meets_threshold(&self) -> bool {
        self.reliability_score >= self.score_threshold
    }

    /// Aggregate case results. An empty run scores 0.
    pub fn from_results(
        run_type: RunType,
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
        score_threshold: f64,
        results: Vec<CaseResult>,
    ) -> Self {
        let total = results.len();
        let count = |f: fn(&CaseResult) -> bool| results.iter().filter(|r| f(r)).count();
        let passed = count(|r| r.passed);
        let resolved = count(|r| r.contradiction_resolved);
        let hallucinated = count(|r| r.hallucination);
        let ratio = |n: f64| if total == 0 { 0.0 } else { n / total as f64 };

        let pass_rate = ratio(passed as f64);
        let avg_citation_coverage = ratio(results.iter().map(|r| r.citation_coverage).sum());
        let contradiction_resolution_rate = ratio(resolved as f64);
        let hallucination_rate = ratio(hallucinated as f64);
        let avg_latency_ms = ratio(results.iter().map(|r| r.latency_ms as f64).sum());

        let reliability_score = if total == 0 {
            0.0
        } else {
            reliability_score(
                pass_rate,
                avg_citation_coverage / 100.0,
                contradiction_resolution_rate,
                hallucination_rate,
            )
        };

        let mut by_category: BTreeMap<Category, CategoryBreakdown> = BTreeMap::new();
        for r in &results {
            let entry = by_category.entry(r.category).or_default();
            entry.total += 1;
            if r.passed {
                entry.passed += 1;
            }
        }

        Self {
            run_id: Uuid::new_v4(),
            run_type,
            started_at,
            completed_at,
            total_cases: total,
            passed,
            failed: total - passed,
            pass_rate,
            avg_citation_coverage,
            contradiction_resolution_rate,
            hallucination_rate,
            avg_latency_ms,
            reliability_score,
            score_threshold,
            by_category,
            results,
        }
    }
}

/// Weighted 0-100 score. All inputs are rates in 0-1.
pub fn reliability_score(pass_rate: f64, citation_coverage: f64, contradiction_resolution: f64, hallucination_rate: f64) -> f64 {
    pass_rate * 40.0 + citation_coverage * 30.0 + contradiction_resolution * 20.0 + (1.0 - hallucination_rate) * 10.0
}

pub struct ReliabilityHarness {
    gate: Arc<EvidenceGate>,
    responder: Arc<dyn Responder>,
    case_min_coverage: f64,
    score_threshold: f64,
}

impl ReliabilityHarness {
    pub fn new(gate: Arc<EvidenceGate>, responder: Arc<dyn Responder>, cfg: &ReliabilityConfig) -> Self {
        Self {
            gate,
            responder,
            case_min_coverage: cfg.case_min_coverage,
            score_threshold: cfg.score_threshold,
        }
    }

    /// Harness over a private gate, so test verdicts, tickets and
    /// publications stay out of the production logs.
    pub fn isolated(tribunal: &TribunalConfig, responder: Arc<dyn Responder>, cfg: &ReliabilityConfig) -> Self {
        let tribunal = Tribunal::new(tribunal, Arc::new(MemoryVerdictLog::new()));
        Self::new(Arc::new(EvidenceGate::new(Arc::new(tribunal))), responder, cfg)
    }

    pub fn gate(&self) -> &Arc<EvidenceGate> {
        &self.gate
    }

    pub async fn run(&self, cases: &[ReliabilityCase], run_type: RunType) -> ReliabilityRun {
        self.run_at(cases, run_type, Utc::now()).await
    }

    pub async fn run_at(&self, cases: &[ReliabilityCase], run_type: RunType, now: DateTime<Utc>) -> ReliabilityRun {
        info!(run_type = %run_type, cases = cases.len(), "reliability run started");
        let started = Instant::now();

        let mut results = Vec::with_capacity(cases.len());
        for case in cases {
            results.push(self.run_case(case, now).await);
        }

        let completed_at = now + chrono::Duration::milliseconds(started.elapsed().as_millis() as i64);
        let run = ReliabilityRun::from_results(run_type, now, completed_at, self.score_threshold, results);
        info!(
            run_id = %run.run_id,
            run_type = %run_type,
            passed = run.passed,
            failed = run.failed,
            score = run.reliability_score,
            threshold = run.score_threshold,
            "reliability run completed"
        );
        run
    }

    async fn run_case(&self, case: &ReliabilityCase, now: DateTime<Utc>) -> CaseResult {
        let started = Instant::now();
        let outcome = match self.responder.respond(case).await {
            Ok(answer) => {
                let checked = self.gate.check_at(&answer.claim, &answer.evidence, now).await;
                checked.map(|result| (answer, result)).map_err(anyhow::Error::from)
            }
            Err(e) => Err(e),
        };
        let latency_ms = started.elapsed().as_millis() as u64;

        match outcome {
            Ok((answer, result)) => {
                let hallucination = result.verdict == Verdict::Pass && !case.expected.matches(&answer.claim.text);
                let passed = result.can_publish && result.citation_coverage >= self.case_min_coverage && !hallucination;
                debug!(
                    case_id = %case.case_id,
                    verdict = %result.verdict,
                    coverage = result.citation_coverage,
                    passed,
                    hallucination,
                    "reliability case"
                );
                CaseResult {
                    case_id: case.case_id.clone(),
                    category: case.category,
                    difficulty: case.difficulty,
                    passed,
                    verdict: Some(result.verdict),
                    citation_coverage: result.citation_coverage,
                    contradiction_resolved: result.verdict != Verdict::Contested,
                    hallucination,
                    latency_ms,
                    error: None,
                }
            }
            Err(e) => {
                warn!(case_id = %case.case_id, error = %e, "reliability case errored");
                CaseResult {
                    case_id: case.case_id.clone(),
                    category: case.category,
                    difficulty: case.difficulty,
                    passed: false,
                    verdict: None,
                    citation_coverage: 0.0,
                    contradiction_resolved: false,
                    hallucination: false,
                    latency_ms,
                    error: Some(format!("{:#}", e)),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::{Corpus, ExpectedPattern};
    use crate::responder::FixtureResponder;
    use evgate_tribunal::{EvidenceItem, VerdictLog};

    fn cases() -> Vec<ReliabilityCase> {
        Corpus::builtin()
            .cases
            .into_iter()
            .filter(|c| c.case_id.starts_with("fx-rate-aden-"))
            .collect()
    }

    fn harness(responder: FixtureResponder) -> ReliabilityHarness {
        ReliabilityHarness::isolated(&TribunalConfig::default(), Arc::new(responder), &ReliabilityConfig::default())
    }

    fn rate(id: &str) -> EvidenceItem {
        EvidenceItem::new(id, "cby-aden", "average exchange rate bulletin").with_value(1400.0, "YER/USD")
    }

    #[test]
    fn score_weights() {
        let score = reliability_score(0.9, 0.95, 0.85, 0.0);
        assert!((score - 91.5).abs() < 1e-9);
        assert_eq!(reliability_score(1.0, 1.0, 1.0, 0.0), 100.0);
        assert_eq!(reliability_score(0.0, 0.0, 0.0, 1.0), 0.0);
    }

    #[tokio::test]
    async fn grounded_answer_passes_and_missing_answer_fails() {
        let cases = cases();
        let responder = FixtureResponder::new().with_answer(
            "fx-rate-aden-2020",
            "The Aden rate averaged 1,400 rials per dollar [E1].",
            vec![rate("E1")],
        );
        let run = harness(responder).run(&cases[..2], RunType::Manual).await;

        assert_eq!(run.total_cases, 2);
        assert_eq!(run.passed, 1);
        assert_eq!(run.failed, 1);
        assert_eq!(run.pass_rate, 0.5);
        assert_eq!(run.avg_citation_coverage, 50.0);

        let ok = &run.results[0];
        assert!(ok.passed);
        assert_eq!(ok.verdict, Some(Verdict::Pass));

        let errored = &run.results[1];
        assert!(!errored.passed);
        assert_eq!(errored.verdict, None);
        assert_eq!(errored.citation_coverage, 0.0);
        assert!(errored.error.as_deref().unwrap().contains("fx-rate-aden-2021"));
        assert_eq!(run.by_category[&Category::FxGap].total, 2);
    }

    #[tokio::test]
    async fn pass_missing_expected_pattern_is_a_hallucination() {
        let cases = cases();
        assert_eq!(cases[0].expected, ExpectedPattern::NumberInRange { min: 500.0, max: 3000.0 });
        let responder = FixtureResponder::new().with_answer(
            "fx-rate-aden-2020",
            "The Aden rate averaged 90 rials per dollar [E1].",
            vec![rate("E1")],
        );
        let run = harness(responder).run(&cases[..1], RunType::Manual).await;
        let result = &run.results[0];
        assert_eq!(result.verdict, Some(Verdict::Pass));
        assert!(result.hallucination);
        assert!(!result.passed);
        assert_eq!(run.hallucination_rate, 1.0);
    }

    #[tokio::test]
    async fn contested_answer_is_unresolved() {
        let cases = cases();
        let responder = FixtureResponder::new().with_answer(
            "fx-rate-aden-2020",
            "The Aden rate averaged 1,400 rials per dollar [E1].",
            vec![
                rate("E1"),
                EvidenceItem::new("E2", "cby-sanaa", "official rate").with_value(530.0, "YER/USD"),
            ],
        );
        let run = harness(responder).run(&cases[..1], RunType::Manual).await;
        assert_eq!(run.results[0].verdict, Some(Verdict::Contested));
        assert!(!run.results[0].contradiction_resolved);
        assert_eq!(run.contradiction_resolution_rate, 0.0);
    }

    #[tokio::test]
    async fn isolated_harness_does_not_touch_shared_gate() {
        let shared = Arc::new(MemoryVerdictLog::new());
        let _prod = Tribunal::new(&TribunalConfig::default(), shared.clone());
        let run = harness(FixtureResponder::new()).run(&cases()[..1], RunType::Nightly).await;
        assert_eq!(run.failed, 1);
        assert!(shared.recent(10).unwrap().is_empty());
    }

    #[test]
    fn empty_run_scores_zero() {
        let now = Utc::now();
        let run = ReliabilityRun::from_results(RunType::Manual, now, now, 85.0, vec![]);
        assert_eq!(run.reliability_score, 0.0);
        assert!(!run.meets_threshold());
    }
}
