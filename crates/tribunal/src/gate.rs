//! Publish-time enforcement on top of the tribunal.
//!
//! A claim is publishable only on PASS or PASS_WARN. FAIL and DATA_GAP open
//! one gap ticket per missing subject and publish an explicit
//! insufficient-evidence notice instead of the claim.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::citation;
use crate::error::TribunalError;
use crate::records::{
    GapTicket, MemoryPublicationLog, MemoryTicketStore, Publication, PublicationStore, PublishedEvidence, TicketPriority,
    TicketStatus, TicketStore,
};
use crate::tribunal::Tribunal;
use crate::types::{Claim, EvidenceItem, Signal, TribunalVerdict, Verdict};

// ── Gate ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub can_publish: bool,
    pub verdict: Verdict,
    pub verdict_id: Uuid,
    pub citation_coverage: f64,
    pub publishable_text: String,
    pub warnings: Vec<String>,
    pub uncited_sentences: Vec<String>,
    pub tickets: Vec<GapTicket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportSection {
    pub section_id: String,
    pub claim: Claim,
    #[serde(default)]
    pub evidence: Vec<EvidenceItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SectionResult {
    pub section_id: String,
    pub result: GateResult,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportVerification {
    pub sections: Vec<SectionResult>,
    /// Mean of per-section coverage.
    pub aggregate_coverage: f64,
    /// Every section publishable. False for an empty report.
    pub all_sections_verified: bool,
}

pub struct EvidenceGate {
    tribunal: Arc<Tribunal>,
    tickets: Arc<dyn TicketStore>,
    publications: Arc<dyn PublicationStore>,
}

impl EvidenceGate {
    /// Gate backed by bounded in-memory stores.
    pub fn new(tribunal: Arc<Tribunal>) -> Self {
        Self {
            tribunal,
            tickets: Arc::new(MemoryTicketStore::new()),
            publications: Arc::new(MemoryPublicationLog::new()),
        }
    }

    pub fn with_stores(mut self, tickets: Arc<dyn TicketStore>, publications: Arc<dyn PublicationStore>) -> Self {
        self.tickets = tickets;
        self.publications = publications;
        self
    }

    pub fn tribunal(&self) -> &Arc<Tribunal> {
        &self.tribunal
    }

    pub fn tickets(&self) -> &Arc<dyn TicketStore> {
        &self.tickets
    }

    pub fn publications(&self) -> &Arc<dyn PublicationStore> {
        &self.publications
    }

    pub async fn check(&self, claim: &Claim, evidence: &[EvidenceItem]) -> Result<GateResult, TribunalError> {
        self.check_at(claim, evidence, Utc::now()).await
    }

    pub async fn check_at(
        &self,
        claim: &Claim,
        evidence: &[EvidenceItem],
        now: DateTime<Utc>,
    ) -> Result<GateResult, TribunalError> {
        let verdict = self.tribunal.adjudicate_at(claim, evidence, now).await?;
        let can_publish = verdict.verdict.is_publishable();

        // One ticket for the claim subject.
        let mut tickets = Vec::new();
        if verdict.verdict.opens_gap() {
            let ticket = gap_ticket(&claim.subject, claim, &verdict, now);
            self.tickets.insert(&ticket)?;
            info!(
                ticket_id = %ticket.ticket_id,
                subject = %ticket.subject_id,
                missing = %ticket.missing_field,
                priority = ?ticket.priority,
                "gap ticket opened"
            );
            tickets.push(ticket);
        }

        if can_publish {
            self.publications.record(&Publication {
                claim_id: claim.claim_id.clone(),
                subject: claim.subject.clone(),
                verdict_id: verdict.verdict_id,
                verdict: verdict.verdict,
                evidence: evidence
                    .iter()
                    .filter(|e| e.admissible)
                    .map(|e| PublishedEvidence {
                        id: e.id.clone(),
                        source_id: e.source_id.clone(),
                        source_org: e.source_org.clone(),
                    })
                    .collect(),
                published_at: now,
            })?;
        } else {
            warn!(
                claim_id = %claim.claim_id,
                verdict = %verdict.verdict,
                coverage = verdict.citation_coverage,
                tickets = tickets.len(),
                "claim blocked at evidence gate"
            );
        }

        Ok(GateResult {
            can_publish,
            verdict: verdict.verdict,
            verdict_id: verdict.verdict_id,
            citation_coverage: verdict.citation_coverage,
            publishable_text: publishable_text(claim, &verdict, &tickets),
            warnings: verdict.warnings.clone(),
            uncited_sentences: verdict.uncited_sentences.clone(),
            tickets,
        })
    }

    /// Check every section of a multi-section document.
    pub async fn verify_report_evidence(&self, sections: &[ReportSection]) -> Result<ReportVerification, TribunalError> {
        let mut results = Vec::with_capacity(sections.len());
        for section in sections {
            let result = self.check(&section.claim, &section.evidence).await?;
            results.push(SectionResult {
                section_id: section.section_id.clone(),
                result,
            });
        }
        let aggregate_coverage = if results.is_empty() {
            0.0
        } else {
            results.iter().map(|s| s.result.citation_coverage).sum::<f64>() / results.len() as f64
        };
        let all_sections_verified = !results.is_empty() && results.iter().all(|s| s.result.can_publish);
        info!(
            sections = results.len(),
            aggregate_coverage,
            all_sections_verified,
            "report evidence verified"
        );
        Ok(ReportVerification {
            sections: results,
            aggregate_coverage,
            all_sections_verified,
        })
    }
}

fn gap_ticket(subject: &str, claim: &Claim, verdict: &TribunalVerdict, now: DateTime<Utc>) -> GapTicket {
    let invalid_method: Vec<&str> = verdict
        .analyses
        .iter()
        .flat_map(|a| &a.signals)
        .filter_map(|s| match s {
            Signal::MethodologyInvalid { detail } => Some(detail.as_str()),
            _ => None,
        })
        .collect();
    let (missing_field, suggested_action, priority) = match verdict.verdict {
        Verdict::DataGap => (
            "evidence".to_string(),
            format!("Locate an admissible source reporting '{}'", subject),
            TicketPriority::High,
        ),
        Verdict::Fail if !invalid_method.is_empty() => (
            "methodology".to_string(),
            format!("Replace evidence for '{}': {}", subject, invalid_method.join("; ")),
            TicketPriority::Medium,
        ),
        _ => {
            let uncited = verdict.uncited_sentences.len();
            (
                "citations".to_string(),
                format!(
                    "Cite evidence for {} uncited sentence(s); coverage is {:.1}%",
                    uncited, verdict.citation_coverage
                ),
                if verdict.citation_coverage < 50.0 {
                    TicketPriority::Medium
                } else {
                    TicketPriority::Low
                },
            )
        }
    };
    GapTicket {
        ticket_id: Uuid::new_v4(),
        subject_id: subject.to_string(),
        missing_field,
        suggested_action,
        verdict_id: verdict.verdict_id,
        verdict: verdict.verdict,
        claim_id: claim.claim_id.clone(),
        priority,
        status: TicketStatus::Open,
        created_at: now,
    }
}

fn publishable_text(claim: &Claim, verdict: &TribunalVerdict, tickets: &[GapTicket]) -> String {
    match verdict.verdict {
        Verdict::Pass => claim.text.clone(),
        Verdict::PassWarn => format!(
            "{}\n\nData quality notice: {:.0}% of statements are traced to cited evidence.",
            claim.text.trim_end(),
            verdict.citation_coverage
        ),
        Verdict::Contested => {
            let disputes: Vec<String> = verdict.contradictions.iter().map(|c| c.describe()).collect();
            format!(
                "Insufficient evidence to publish this statement on '{}': sources disagree. {}",
                claim.subject,
                disputes.join("; ")
            )
        }
        Verdict::Fail | Verdict::DataGap => {
            let gaps: Vec<String> = tickets
                .iter()
                .map(|t| format!("{} for '{}' ({})", t.missing_field, t.subject_id, t.suggested_action))
                .collect();
            format!(
                "Insufficient evidence to publish this statement on '{}'. Missing: {}",
                claim.subject,
                gaps.join("; ")
            )
        }
    }
}

// ── Footnotes ────────────────────────────────────────────────────────

/// Replace `[E12]` markers with numbered footnotes and append a source list.
/// Markers that resolve to nothing are left as written.
pub fn add_citation_footnotes(text: &str, evidence: &[EvidenceItem]) -> String {
    let mut numbers: HashMap<String, usize> = HashMap::new();
    let mut order: Vec<&EvidenceItem> = Vec::new();
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(open) = rest.find('[') {
        let Some(close) = rest[open..].find(']').map(|i| i + open) else {
            break;
        };
        out.push_str(&rest[..open]);
        let group = &rest[open..=close];
        let items: Option<Vec<&EvidenceItem>> = citation::markers(group)
            .iter()
            .map(|m| evidence.iter().find(|e| e.answers_marker(m)))
            .collect();
        match items {
            Some(items) if !items.is_empty() => {
                let refs: Vec<String> = items
                    .into_iter()
                    .map(|item| {
                        let next = numbers.len() + 1;
                        let n = *numbers.entry(item.id.clone()).or_insert_with(|| {
                            order.push(item);
                            next
                        });
                        n.to_string()
                    })
                    .collect();
                out.push_str(&format!("[{}]", refs.join(", ")));
            }
            _ => out.push_str(group),
        }
        rest = &rest[close + 1..];
    }
    out.push_str(rest);

    if !order.is_empty() {
        out.push_str("\n\nSources:\n");
        for (i, item) in order.iter().enumerate() {
            let org = if item.source_org.is_empty() {
                item.source_id.as_str()
            } else {
                item.source_org.as_str()
            };
            out.push_str(&format!("[{}] {}: {}\n", i + 1, org, item.excerpt));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::log::MemoryVerdictLog;
    use crate::records::{JsonlPublicationLog, JsonlTicketStore, PublicationStore, TicketStore};
    use evgate_core::config::TribunalConfig;

    fn gate() -> EvidenceGate {
        let tribunal = Tribunal::new(&TribunalConfig::default(), Arc::new(MemoryVerdictLog::new()));
        EvidenceGate::new(Arc::new(tribunal))
    }

    fn narrative(cited: usize, uncited: usize) -> String {
        let mut text = String::new();
        for i in 0..cited {
            text.push_str(&format!("Imports fell in quarter {} [E1]. ", i + 1));
        }
        for i in 0..uncited {
            text.push_str(&format!("Speculative aside {}. ", i + 1));
        }
        text
    }

    fn evidence() -> Vec<EvidenceItem> {
        vec![EvidenceItem::new("E1", "customs-aden", "customs import statistics").with_org("Aden Customs")]
    }

    #[tokio::test]
    async fn pass_publishes_original_text() {
        let g = gate();
        let claim = Claim::new("c1", "imports", narrative(3, 0));
        let r = g.check(&claim, &evidence()).await.unwrap();
        assert!(r.can_publish);
        assert_eq!(r.verdict, Verdict::Pass);
        assert_eq!(r.publishable_text, claim.text);
        assert!(r.tickets.is_empty());
        let published = g.publications().list().unwrap();
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].evidence[0].source_id, "customs-aden");
    }

    #[tokio::test]
    async fn pass_warn_publishes_with_notice() {
        let r = gate()
            .check(&Claim::new("c1", "imports", narrative(9, 1)), &evidence())
            .await
            .unwrap();
        assert!(r.can_publish);
        assert_eq!(r.verdict, Verdict::PassWarn);
        assert!(r.publishable_text.contains("Data quality notice: 90%"));
        assert!(r.tickets.is_empty());
    }

    #[tokio::test]
    async fn fail_opens_one_ticket_and_blocks() {
        let g = gate();
        let r = g
            .check(&Claim::new("c1", "imports", narrative(6, 4)), &evidence())
            .await
            .unwrap();
        assert!(!r.can_publish);
        assert_eq!(r.verdict, Verdict::Fail);
        assert_eq!(r.tickets.len(), 1);
        assert_eq!(r.tickets[0].subject_id, "imports");
        assert_eq!(r.tickets[0].missing_field, "citations");
        assert_eq!(r.tickets[0].priority, TicketPriority::Low);
        assert!(r.publishable_text.starts_with("Insufficient evidence"));
        assert_eq!(g.tickets().open_tickets().unwrap().len(), 1);
        assert!(g.publications().list().unwrap().is_empty());
    }

    #[tokio::test]
    async fn data_gap_opens_high_priority_ticket() {
        let g = gate();
        let r = g
            .check(&Claim::new("c1", "imports", narrative(2, 0)), &[])
            .await
            .unwrap();
        assert_eq!(r.verdict, Verdict::DataGap);
        assert_eq!(r.tickets.len(), 1);
        assert_eq!(r.tickets[0].priority, TicketPriority::High);
        assert!(g.tickets().resolve(r.tickets[0].ticket_id).unwrap());
        assert!(g.tickets().open_tickets().unwrap().is_empty());
        assert!(!g.tickets().resolve(Uuid::new_v4()).unwrap());
    }

    #[tokio::test]
    async fn file_backed_stores_outlive_the_gate() {
        let dir = tempfile::tempdir().unwrap();
        let tickets_path = dir.path().join("gap_tickets.jsonl");
        let publications_path = dir.path().join("publications.jsonl");
        let file_gate = || {
            gate().with_stores(
                Arc::new(JsonlTicketStore::open(&tickets_path).unwrap()),
                Arc::new(JsonlPublicationLog::open(&publications_path).unwrap()),
            )
        };

        let g = file_gate();
        g.check(&Claim::new("c1", "imports", narrative(2, 0)), &evidence()).await.unwrap();
        let gap = g.check(&Claim::new("c2", "imports", narrative(1, 0)), &[]).await.unwrap();
        drop(g);

        let reopened = file_gate();
        assert_eq!(reopened.publications().list().unwrap()[0].claim_id, "c1");
        let open = reopened.tickets().open_tickets().unwrap();
        assert_eq!(open.len(), 1);
        assert_eq!(open[0].ticket_id, gap.tickets[0].ticket_id);
    }

    #[tokio::test]
    async fn out_of_period_evidence_opens_methodology_ticket() {
        let g = gate();
        let mut claim = Claim::new("c1", "imports", "Imports fell in 2023 [E1].");
        claim.context.year = Some(2023);
        let evidence = vec![EvidenceItem::new("E1", "customs-aden", "customs import statistics for 2019")];
        let r = g.check(&claim, &evidence).await.unwrap();
        assert!(!r.can_publish);
        assert_eq!(r.verdict, Verdict::Fail);
        assert_eq!(r.citation_coverage, 100.0);
        assert_eq!(r.tickets[0].missing_field, "methodology");
        assert!(r.tickets[0].suggested_action.contains("no relevant evidence covers 2023"));
    }

    #[tokio::test]
    async fn contested_blocks_without_ticket() {
        let evidence = vec![
            EvidenceItem::new("E1", "a", "x").with_value(10.0, "percent"),
            EvidenceItem::new("E2", "b", "y").with_value(30.0, "percent"),
        ];
        let r = gate()
            .check(&Claim::new("c1", "inflation", "Inflation was 10 percent [E1]."), &evidence)
            .await
            .unwrap();
        assert!(!r.can_publish);
        assert_eq!(r.verdict, Verdict::Contested);
        assert!(r.tickets.is_empty());
        assert!(r.publishable_text.contains("sources disagree"));
    }

    #[tokio::test]
    async fn report_verification_aggregates_sections() {
        let sections = vec![
            ReportSection {
                section_id: "summary".into(),
                claim: Claim::new("s1", "imports", narrative(2, 0)),
                evidence: evidence(),
            },
            ReportSection {
                section_id: "outlook".into(),
                claim: Claim::new("s2", "imports", narrative(1, 1)),
                evidence: evidence(),
            },
        ];
        let report = gate().verify_report_evidence(&sections).await.unwrap();
        assert_eq!(report.sections.len(), 2);
        assert_eq!(report.aggregate_coverage, 75.0);
        assert!(!report.all_sections_verified);
        assert_eq!(report.sections[1].result.verdict, Verdict::Fail);

        let empty = gate().verify_report_evidence(&[]).await.unwrap();
        assert_eq!(empty.aggregate_coverage, 0.0);
        assert!(!empty.all_sections_verified);
    }

    #[test]
    fn footnotes_number_sources_in_order_of_use() {
        let evidence = vec![
            EvidenceItem::new("E1", "cby", "reserves bulletin").with_org("CBY Aden"),
            EvidenceItem::new("E2", "wfp", "food basket survey"),
        ];
        let text = "Reserves fell [E2]. Prices rose [E1, E2]. See [E9] and [note].";
        let out = add_citation_footnotes(text, &evidence);
        assert!(out.starts_with("Reserves fell [1]. Prices rose [2, 1]. See [E9] and [note]."));
        assert!(out.contains("[1] wfp: food basket survey\n"));
        assert!(out.contains("[2] CBY Aden: reserves bulletin\n"));
        assert_eq!(add_citation_footnotes("No markers.", &evidence), "No markers.");
    }
}
