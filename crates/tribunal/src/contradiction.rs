//! Numeric disagreement between admissible sources.

use serde::{Deserialize, Serialize};

use crate::types::EvidenceItem;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservedValue {
    pub evidence_id: String,
    pub source_id: String,
    pub value: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contradiction {
    pub subject: String,
    pub unit: String,
    pub left: ObservedValue,
    pub right: ObservedValue,
    /// Gap relative to the smaller magnitude, in percent. `None` when one
    /// side is zero and the other is not.
    pub divergence_pct: Option<f64>,
}

impl Contradiction {
    pub fn describe(&self) -> String {
        let gap = match self.divergence_pct {
            Some(pct) => format!("{:.1}%", pct),
            None => "unbounded".to_string(),
        };
        format!(
            "{} reports {} {} for '{}' but {} reports {} {} ({} apart)",
            self.left.source_id,
            self.left.value,
            self.unit,
            self.subject,
            self.right.source_id,
            self.right.value,
            self.unit,
            gap
        )
    }
}

/// Relative divergence between two values, in percent of the smaller magnitude.
pub fn divergence_pct(a: f64, b: f64) -> Option<f64> {
    let smaller = a.abs().min(b.abs());
    let diff = (a - b).abs();
    if diff == 0.0 {
        Some(0.0)
    } else if smaller == 0.0 {
        None
    } else {
        Some(diff / smaller * 100.0)
    }
}

/// Every pair of admissible items on the claim's subject, from different
/// sources and in the same unit, with values further apart than `tolerance_pct`.
pub fn find_contradictions(
    evidence: &[EvidenceItem],
    claim_subject: &str,
    tolerance_pct: f64,
) -> Vec<Contradiction> {
    let observed: Vec<(&EvidenceItem, String, String, f64)> = evidence
        .iter()
        .filter(|e| e.is_relevant_to(claim_subject))
        .filter_map(|e| {
            let value = e.value?;
            let unit = e.unit.as_deref().unwrap_or("").trim().to_lowercase();
            let subject = e.subject_or(claim_subject).trim().to_lowercase();
            Some((e, subject, unit, value))
        })
        .collect();

    let mut found = Vec::new();
    for (i, (a, subject_a, unit_a, va)) in observed.iter().enumerate() {
        for (b, subject_b, unit_b, vb) in &observed[i + 1..] {
            if subject_a != subject_b || unit_a != unit_b || a.source_id == b.source_id {
                continue;
            }
            let divergence = divergence_pct(*va, *vb);
            if divergence.map_or(true, |pct| pct > tolerance_pct) {
                found.push(Contradiction {
                    subject: a.subject_or(claim_subject).to_string(),
                    unit: a.unit.clone().unwrap_or_default(),
                    left: ObservedValue {
                        evidence_id: a.id.clone(),
                        source_id: a.source_id.clone(),
                        value: *va,
                    },
                    right: ObservedValue {
                        evidence_id: b.id.clone(),
                        source_id: b.source_id.clone(),
                        value: *vb,
                    },
                    divergence_pct: divergence,
                });
            }
        }
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fx(id: &str, source: &str, value: f64) -> EvidenceItem {
        EvidenceItem::new(id, source, "exchange rate").with_value(value, "YER/USD")
    }

    #[test]
    fn divergence_is_relative_to_smaller_value() {
        assert_eq!(divergence_pct(100.0, 110.0), Some(10.0));
        assert_eq!(divergence_pct(110.0, 100.0), Some(10.0));
        assert_eq!(divergence_pct(0.0, 0.0), Some(0.0));
        assert_eq!(divergence_pct(0.0, 5.0), None);
    }

    #[test]
    fn within_tolerance_is_not_a_contradiction() {
        let evidence = vec![fx("E1", "cby-aden", 1600.0), fx("E2", "imf", 1700.0)];
        assert!(find_contradictions(&evidence, "fx", 10.0).is_empty());
    }

    #[test]
    fn exactly_at_tolerance_is_not_a_contradiction() {
        let evidence = vec![fx("E1", "cby-aden", 100.0), fx("E2", "imf", 110.0)];
        assert!(find_contradictions(&evidence, "fx", 10.0).is_empty());
    }

    #[test]
    fn split_rates_contradict() {
        let evidence = vec![fx("E1", "cby-aden", 1600.0), fx("E2", "cby-sanaa", 530.0)];
        let found = find_contradictions(&evidence, "fx", 10.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].left.evidence_id, "E1");
        assert!(found[0].divergence_pct.unwrap() > 200.0);
        assert!(found[0].describe().contains("cby-sanaa"));
    }

    #[test]
    fn zero_against_nonzero_contradicts() {
        let evidence = vec![fx("E1", "a", 0.0), fx("E2", "b", 3.0)];
        let found = find_contradictions(&evidence, "fx", 10.0);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].divergence_pct, None);
    }

    #[test]
    fn ignores_same_source_other_units_and_inadmissible() {
        let evidence = vec![
            fx("E1", "a", 100.0),
            fx("E2", "a", 300.0),
            EvidenceItem::new("E3", "b", "x").with_value(300.0, "percent"),
            fx("E4", "c", 900.0).inadmissible(),
            fx("E5", "d", 900.0).with_subject("inflation"),
        ];
        assert!(find_contradictions(&evidence, "fx", 10.0).is_empty());
    }

    #[test]
    fn disagreement_on_another_subject_is_ignored() {
        let evidence = vec![
            fx("E1", "cby-aden", 1600.0),
            EvidenceItem::new("E2", "cso", "inflation").with_subject("inflation").with_value(10.0, "percent"),
            EvidenceItem::new("E3", "wfp", "inflation").with_subject("inflation").with_value(30.0, "percent"),
        ];
        assert!(find_contradictions(&evidence, "fx", 10.0).is_empty());
        assert_eq!(find_contradictions(&evidence, "inflation", 10.0).len(), 1);
    }
}
