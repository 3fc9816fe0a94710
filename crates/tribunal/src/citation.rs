//! Sentence-level citation audit.
//!
//! A sentence counts as cited when it carries a `[E12]` marker that resolves
//! to an admissible item in the evidence set, or when enough of its key terms
//! occur in one admissible excerpt.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::EvidenceItem;

const STOPWORDS: &[&str] = &[
    "about", "after", "also", "and", "are", "been", "before", "between", "but", "can", "could", "during", "for",
    "from", "had", "has", "have", "into", "its", "may", "might", "more", "most", "not", "over", "per", "should",
    "such", "than", "that", "the", "their", "there", "these", "this", "those", "was", "were", "when", "where",
    "which", "while", "will", "with", "would",
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "by", content = "evidence_id", rename_all = "snake_case")]
pub enum CitedBy {
    Marker(String),
    Excerpt(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentenceAudit {
    pub text: String,
    pub cited_by: Option<CitedBy>,
}

impl SentenceAudit {
    pub fn is_cited(&self) -> bool {
        self.cited_by.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CitationAudit {
    pub sentences: Vec<SentenceAudit>,
    pub cited_sentences: usize,
    pub total_sentences: usize,
    /// 0-100. Zero sentences give zero coverage.
    pub coverage: f64,
    /// Markers that name no item in the evidence set.
    pub unresolved_markers: Vec<String>,
    /// Markers that name only inadmissible items.
    #[serde(default)]
    pub inadmissible_markers: Vec<String>,
}

impl CitationAudit {
    pub fn uncited(&self) -> Vec<String> {
        self.sentences
            .iter()
            .filter(|s| !s.is_cited())
            .map(|s| s.text.clone())
            .collect()
    }
}

pub fn coverage(cited: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        cited as f64 * 100.0 / total as f64
    }
}

// ── Audit ────────────────────────────────────────────────────────────

pub fn audit(text: &str, evidence: &[EvidenceItem], term_overlap_ratio: f64) -> CitationAudit {
    let excerpts: Vec<(&EvidenceItem, HashSet<String>)> = evidence
        .iter()
        .filter(|e| e.admissible)
        .map(|e| (e, tokens(&e.excerpt).collect()))
        .collect();

    let mut unresolved = Vec::new();
    let mut inadmissible = Vec::new();
    let sentences: Vec<SentenceAudit> = split_sentences(text)
        .into_iter()
        .map(|sentence| {
            let mut cited_by = None;
            for marker in markers(&sentence) {
                let named: Vec<&EvidenceItem> = evidence.iter().filter(|e| e.answers_marker(&marker)).collect();
                match named.iter().find(|e| e.admissible) {
                    Some(item) if cited_by.is_none() => cited_by = Some(CitedBy::Marker(item.id.clone())),
                    Some(_) => {}
                    None if named.is_empty() => unresolved.push(marker),
                    None => inadmissible.push(marker),
                }
            }
            if cited_by.is_none() {
                cited_by = best_excerpt(&sentence, &excerpts, term_overlap_ratio).map(CitedBy::Excerpt);
            }
            SentenceAudit { text: sentence, cited_by }
        })
        .collect();

    let total = sentences.len();
    let cited = sentences.iter().filter(|s| s.is_cited()).count();
    unresolved.sort();
    unresolved.dedup();
    inadmissible.sort();
    inadmissible.dedup();
    CitationAudit {
        sentences,
        cited_sentences: cited,
        total_sentences: total,
        coverage: coverage(cited, total),
        unresolved_markers: unresolved,
        inadmissible_markers: inadmissible,
    }
}

fn best_excerpt(sentence: &str, excerpts: &[(&EvidenceItem, HashSet<String>)], ratio: f64) -> Option<String> {
    let terms = key_terms(sentence);
    if terms.is_empty() {
        return None;
    }
    excerpts
        .iter()
        .map(|(item, vocab)| {
            let hits = terms.iter().filter(|t| vocab.contains(*t)).count();
            (item, hits as f64 / terms.len() as f64)
        })
        .filter(|(_, share)| *share >= ratio)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(item, _)| item.id.clone())
}

// ── Text handling ────────────────────────────────────────────────────

/// Split narrative text into sentences. A marker group trailing a full stop
/// stays with the sentence before it.
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\n' {
            flush(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        if matches!(c, '.' | '!' | '?') && chars.peek().map_or(true, |n| n.is_whitespace()) {
            flush(&mut sentences, &mut current);
        }
    }
    flush(&mut sentences, &mut current);
    sentences
}

fn flush(sentences: &mut Vec<String>, current: &mut String) {
    let sentence = current.trim();
    if !sentence.is_empty() {
        if strip_markers(sentence).chars().any(char::is_alphanumeric) {
            sentences.push(sentence.to_string());
        } else if let Some(last) = sentences.last_mut() {
            last.push(' ');
            last.push_str(sentence);
        }
    }
    current.clear();
}

/// Citation markers in `sentence`, normalized to `E<n>`. Accepts `[E3]`
/// and grouped forms like `[E3, E4]`.
pub fn markers(sentence: &str) -> Vec<String> {
    bracket_groups(sentence)
        .into_iter()
        .filter_map(|(_, _, ids)| ids)
        .flatten()
        .collect()
}

fn strip_markers(sentence: &str) -> String {
    let mut out = String::with_capacity(sentence.len());
    let mut last = 0;
    for (start, end, ids) in bracket_groups(sentence) {
        if ids.is_some() {
            out.push_str(&sentence[last..start]);
            last = end;
        }
    }
    out.push_str(&sentence[last..]);
    out
}

/// Byte ranges of `[...]` groups, with their marker ids when every entry in
/// the group is a marker.
fn bracket_groups(s: &str) -> Vec<(usize, usize, Option<Vec<String>>)> {
    let mut groups = Vec::new();
    let mut from = 0;
    while let Some(open) = s[from..].find('[').map(|i| i + from) {
        let Some(close) = s[open..].find(']').map(|i| i + open) else {
            break;
        };
        let ids: Option<Vec<String>> = s[open + 1..close]
            .split([',', ';'])
            .map(|t| parse_marker(t.trim()))
            .collect();
        groups.push((open, close + 1, ids));
        from = close + 1;
    }
    groups
}

fn parse_marker(token: &str) -> Option<String> {
    let digits = token.strip_prefix('E').or_else(|| token.strip_prefix('e'))?;
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some(format!("E{}", digits))
}

fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !(c.is_alphanumeric() || c == '.'))
        .map(|t| t.trim_matches('.').to_lowercase())
        .filter(|t| !t.is_empty())
}

/// Content-bearing terms of a sentence, markers removed, in first-seen order.
pub fn key_terms(sentence: &str) -> Vec<String> {
    let stripped = strip_markers(sentence);
    let mut seen = HashSet::new();
    let terms: Vec<String> = tokens(&stripped)
        .filter(|t| t.chars().any(|c| c.is_ascii_digit()) || t.chars().count() >= 3)
        .filter(|t| !STOPWORDS.contains(&t.as_str()))
        .filter(|t| seen.insert(t.clone()))
        .collect();
    terms
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation_not_decimals() {
        let s = split_sentences("Inflation hit 3.5% in 2023. Prices rose! Did wages follow?\nYes");
        assert_eq!(
            s,
            vec!["Inflation hit 3.5% in 2023.", "Prices rose!", "Did wages follow?", "Yes"]
        );
    }

    #[test]
    fn trailing_marker_attaches_to_previous_sentence() {
        let s = split_sentences("Rates doubled. [E1]\nAid fell.");
        assert_eq!(s, vec!["Rates doubled. [E1]", "Aid fell."]);
        assert_eq!(split_sentences("  "), Vec::<String>::new());
    }

    #[test]
    fn parses_single_and_grouped_markers() {
        assert_eq!(markers("Rates doubled [E1]."), vec!["E1"]);
        assert_eq!(markers("Rates doubled [E1, e22; E3]."), vec!["E1", "E22", "E3"]);
        assert!(markers("See [note 4] and [Ex]").is_empty());
    }

    #[test]
    fn key_terms_drop_markers_and_stopwords() {
        assert_eq!(
            key_terms("The rial traded at 1620 per dollar [E4]."),
            vec!["rial", "traded", "1620", "dollar"]
        );
    }

    #[test]
    fn coverage_is_cited_over_total() {
        assert_eq!(coverage(9, 10), 90.0);
        assert_eq!(coverage(19, 20), 95.0);
        assert_eq!(coverage(0, 0), 0.0);
    }

    #[test]
    fn marker_must_resolve_in_evidence_set() {
        let evidence = vec![EvidenceItem::new("E1", "cby", "unrelated text")];
        let report = audit("Reserves fell [E1]. Reserves rose [E9].", &evidence, 0.5);
        assert_eq!(report.cited_sentences, 1);
        assert_eq!(report.coverage, 50.0);
        assert_eq!(report.unresolved_markers, vec!["E9"]);
        assert_eq!(report.uncited(), vec!["Reserves rose [E9]."]);
    }

    #[test]
    fn excerpt_overlap_cites_without_marker() {
        let evidence = vec![EvidenceItem::new(
            "E4",
            "cby-aden",
            "In March 2024 the rial traded at 1620 YER per USD in Aden.",
        )];
        let report = audit("The Aden rial traded at 1620 per dollar in March 2024.", &evidence, 0.5);
        assert_eq!(report.sentences[0].cited_by, Some(CitedBy::Excerpt("E4".into())));
        assert_eq!(report.coverage, 100.0);
    }

    #[test]
    fn inadmissible_excerpts_do_not_cite() {
        let evidence = vec![EvidenceItem::new("E4", "blog", "the rial traded at 1620 in aden").inadmissible()];
        let report = audit("The rial traded at 1620 in Aden.", &evidence, 0.5);
        assert_eq!(report.cited_sentences, 0);
    }

    #[test]
    fn markers_naming_inadmissible_items_do_not_cite() {
        let evidence = vec![
            EvidenceItem::new("E1", "cby", "unrelated text"),
            EvidenceItem::new("E2", "forum", "unrelated text").inadmissible(),
        ];
        let report = audit(
            "Reserves fell [E1]. Reserves were looted [E2]. Governors resigned [E2]. Banks closed [E2].",
            &evidence,
            0.5,
        );
        assert_eq!(report.cited_sentences, 1);
        assert_eq!(report.coverage, 25.0);
        assert_eq!(report.inadmissible_markers, vec!["E2"]);
        assert!(report.unresolved_markers.is_empty());

        // An admissible item named alongside still cites the sentence.
        let report = audit("Banks closed [E2][E1].", &evidence, 0.5);
        assert_eq!(report.sentences[0].cited_by, Some(CitedBy::Marker("E1".into())));
    }

    #[test]
    fn empty_text_has_zero_coverage() {
        let report = audit("", &[], 0.5);
        assert_eq!(report.total_sentences, 0);
        assert_eq!(report.coverage, 0.0);
    }
}
