//! Usage-tag → ingestion-pipe policy.
//!
//! The table is a closed mapping in both directions: adding a tag or a pipe
//! fails to compile until [`UsageTag::pipes`] covers it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::source::Source;

// ── Vocabularies ─────────────────────────────────────────────────────

/// Declared permission on a registry entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageTag {
    DataNumeric,
    DataGeospatial,
    Registry,
    DocPdf,
    DocNarrative,
    DocExcel,
    NewsMedia,
    SanctionsList,
    EventData,
    PriceData,
    Forecast,
}

/// A downstream ingestion pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipeType {
    NumericTimeseries,
    GeospatialData,
    DocumentVault,
    NewsAggregator,
    SanctionsCompliance,
    EventTracker,
    PriceMonitor,
}

impl UsageTag {
    pub const ALL: [UsageTag; 11] = [
        UsageTag::DataNumeric,
        UsageTag::DataGeospatial,
        UsageTag::Registry,
        UsageTag::DocPdf,
        UsageTag::DocNarrative,
        UsageTag::DocExcel,
        UsageTag::NewsMedia,
        UsageTag::SanctionsList,
        UsageTag::EventData,
        UsageTag::PriceData,
        UsageTag::Forecast,
    ];

    /// Pipes this tag permits.
    pub fn pipes(&self) -> &'static [PipeType] {
        use PipeType::*;
        match self {
            UsageTag::DataNumeric => &[NumericTimeseries],
            UsageTag::DataGeospatial => &[GeospatialData],
            UsageTag::Registry => &[NumericTimeseries, GeospatialData],
            UsageTag::DocPdf | UsageTag::DocNarrative | UsageTag::DocExcel => &[DocumentVault],
            UsageTag::NewsMedia => &[NewsAggregator, DocumentVault],
            // Descriptive compliance only; never advisory or narrative pipes.
            UsageTag::SanctionsList => &[SanctionsCompliance],
            UsageTag::EventData => &[EventTracker],
            UsageTag::PriceData => &[PriceMonitor],
            UsageTag::Forecast => &[NumericTimeseries],
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageTag::DataNumeric => "data_numeric",
            UsageTag::DataGeospatial => "data_geospatial",
            UsageTag::Registry => "registry",
            UsageTag::DocPdf => "doc_pdf",
            UsageTag::DocNarrative => "doc_narrative",
            UsageTag::DocExcel => "doc_excel",
            UsageTag::NewsMedia => "news_media",
            UsageTag::SanctionsList => "sanctions_list",
            UsageTag::EventData => "event_data",
            UsageTag::PriceData => "price_data",
            UsageTag::Forecast => "forecast",
        }
    }

    /// Parse a stored tag. Case, `-`/`_` and the descriptive spellings
    /// (`numeric-data`, `document-pdf`, `narrative-document`, ...) are accepted.
    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let tag = match key.as_str() {
            "data_numeric" | "numeric_data" | "numeric" => UsageTag::DataNumeric,
            "data_geospatial" | "geospatial_data" | "geospatial" => UsageTag::DataGeospatial,
            "registry" => UsageTag::Registry,
            "doc_pdf" | "document_pdf" | "pdf_document" => UsageTag::DocPdf,
            "doc_narrative" | "narrative_document" | "document_narrative" => UsageTag::DocNarrative,
            "doc_excel" | "document_spreadsheet" | "document_excel" | "spreadsheet" => UsageTag::DocExcel,
            "news_media" | "news" => UsageTag::NewsMedia,
            "sanctions_list" | "sanctions" => UsageTag::SanctionsList,
            "event_data" | "events" => UsageTag::EventData,
            "price_data" | "prices" => UsageTag::PriceData,
            "forecast" | "forecasts" => UsageTag::Forecast,
            _ => return None,
        };
        Some(tag)
    }
}

impl PipeType {
    pub const ALL: [PipeType; 7] = [
        PipeType::NumericTimeseries,
        PipeType::GeospatialData,
        PipeType::DocumentVault,
        PipeType::NewsAggregator,
        PipeType::SanctionsCompliance,
        PipeType::EventTracker,
        PipeType::PriceMonitor,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipeType::NumericTimeseries => "numeric_timeseries",
            PipeType::GeospatialData => "geospatial_data",
            PipeType::DocumentVault => "document_vault",
            PipeType::NewsAggregator => "news_aggregator",
            PipeType::SanctionsCompliance => "sanctions_compliance",
            PipeType::EventTracker => "event_tracker",
            PipeType::PriceMonitor => "price_monitor",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        let key = raw.trim().to_ascii_lowercase().replace('-', "_");
        let key = match key.as_str() {
            "geospatial" => "geospatial_data",
            other => other,
        };
        PipeType::ALL.into_iter().find(|p| p.as_str() == key)
    }

    /// Tags that grant this pipe.
    pub fn granted_by(&self) -> Vec<UsageTag> {
        UsageTag::ALL
            .into_iter()
            .filter(|t| t.pipes().contains(self))
            .collect()
    }
}

impl std::fmt::Display for UsageTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::fmt::Display for PipeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Decision ─────────────────────────────────────────────────────────

/// Derived per-source eligibility. Recomputed on every request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub source_id: String,
    pub allowed_use: Vec<UsageTag>,
    pub eligible_pipes: Vec<PipeType>,
    pub blocked_pipes: Vec<PipeType>,
    pub can_ingest_numeric: bool,
    pub can_ingest_documents: bool,
    pub can_ingest_news: bool,
    pub can_ingest_sanctions: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl PolicyDecision {
    pub fn allows(&self, pipe: PipeType) -> bool {
        self.eligible_pipes.contains(&pipe)
    }
}

/// Compute the decision for one source. Pure.
pub fn decide(source: &Source) -> PolicyDecision {
    let allowed_use = source.usage_tags();
    let mut eligible: Vec<PipeType> = allowed_use.iter().flat_map(|t| t.pipes().iter().copied()).collect();
    eligible.sort();
    eligible.dedup();
    let blocked: Vec<PipeType> = PipeType::ALL
        .into_iter()
        .filter(|p| !eligible.contains(p))
        .collect();

    let reason = if source.is_active() {
        None
    } else {
        Some(format!("Source status: {}", source.status))
    };

    PolicyDecision {
        source_id: source.source_id.clone(),
        can_ingest_numeric: eligible.contains(&PipeType::NumericTimeseries),
        can_ingest_documents: eligible.contains(&PipeType::DocumentVault),
        can_ingest_news: eligible.contains(&PipeType::NewsAggregator),
        can_ingest_sanctions: eligible.contains(&PipeType::SanctionsCompliance),
        allowed_use,
        eligible_pipes: eligible,
        blocked_pipes: blocked,
        reason,
    }
}

// ── Summary ──────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicySummary {
    /// ACTIVE sources considered.
    pub total_sources: usize,
    /// Number of ACTIVE sources eligible for each pipe.
    pub by_pipe: BTreeMap<PipeType, usize>,
    /// Number of ACTIVE sources carrying each tag.
    pub by_allowed_use: BTreeMap<UsageTag, usize>,
    /// ACTIVE sources with no recognized tag.
    pub sources_without_policy: usize,
}

pub fn summarize<'a>(sources: impl IntoIterator<Item = &'a Source>) -> PolicySummary {
    let mut summary = PolicySummary {
        total_sources: 0,
        by_pipe: BTreeMap::new(),
        by_allowed_use: BTreeMap::new(),
        sources_without_policy: 0,
    };
    for source in sources.into_iter().filter(|s| s.is_active()) {
        summary.total_sources += 1;
        let d = decide(source);
        if d.allowed_use.is_empty() {
            summary.sources_without_policy += 1;
            continue;
        }
        for tag in &d.allowed_use {
            *summary.by_allowed_use.entry(*tag).or_default() += 1;
        }
        for pipe in &d.eligible_pipes {
            *summary.by_pipe.entry(*pipe).or_default() += 1;
        }
    }
    summary
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::fixtures::source;

    #[test]
    fn every_tag_maps_to_at_least_one_pipe() {
        for tag in UsageTag::ALL {
            assert!(!tag.pipes().is_empty(), "{} grants nothing", tag);
        }
    }

    #[test]
    fn every_pipe_is_reachable() {
        for pipe in PipeType::ALL {
            assert!(!pipe.granted_by().is_empty(), "{} is unreachable", pipe);
        }
    }

    #[test]
    fn sanctions_list_only_feeds_compliance() {
        let d = decide(&source("ofac", &["sanctions_list"]));
        assert_eq!(d.eligible_pipes, vec![PipeType::SanctionsCompliance]);
        assert!(d.can_ingest_sanctions);
        assert!(!d.can_ingest_documents);
        assert!(!d.can_ingest_news);
        assert!(d.blocked_pipes.contains(&PipeType::DocumentVault));
        assert!(d.blocked_pipes.contains(&PipeType::NewsAggregator));
        assert_eq!(d.reason, None);
    }

    #[test]
    fn eligible_and_blocked_partition_the_catalog() {
        let d = decide(&source("mix", &["news-media", "registry", "forecast"]));
        assert_eq!(
            d.eligible_pipes,
            vec![
                PipeType::NumericTimeseries,
                PipeType::GeospatialData,
                PipeType::DocumentVault,
                PipeType::NewsAggregator
            ]
        );
        let mut all: Vec<_> = d.eligible_pipes.iter().chain(&d.blocked_pipes).copied().collect();
        all.sort();
        assert_eq!(all, PipeType::ALL.to_vec());
        for p in &d.eligible_pipes {
            assert!(!d.blocked_pipes.contains(p));
        }
    }

    #[test]
    fn inactive_source_carries_reason() {
        let mut s = source("old", &["price_data"]);
        s.status = "DEPRECATED".into();
        let d = decide(&s);
        assert_eq!(d.reason.as_deref(), Some("Source status: DEPRECATED"));
        assert!(d.allows(PipeType::PriceMonitor));
    }

    #[test]
    fn no_tags_means_everything_blocked() {
        let d = decide(&source("bare", &[]));
        assert!(d.eligible_pipes.is_empty());
        assert_eq!(d.blocked_pipes.len(), 7);
    }

    #[test]
    fn tag_spellings() {
        assert_eq!(UsageTag::parse("DOC_EXCEL"), Some(UsageTag::DocExcel));
        assert_eq!(UsageTag::parse("document-spreadsheet"), Some(UsageTag::DocExcel));
        assert_eq!(UsageTag::parse("narrative-document"), Some(UsageTag::DocNarrative));
        assert_eq!(UsageTag::parse("numeric-data"), Some(UsageTag::DataNumeric));
        assert_eq!(UsageTag::parse("advice"), None);
        assert_eq!(PipeType::parse("geospatial"), Some(PipeType::GeospatialData));
        assert_eq!(PipeType::parse("document-vault"), Some(PipeType::DocumentVault));
    }

    #[test]
    fn decision_serializes_snake_case() {
        let d = decide(&source("ofac", &["SANCTIONS_LIST"]));
        let json = serde_json::to_value(&d).unwrap();
        assert_eq!(json["eligible_pipes"], serde_json::json!(["sanctions_compliance"]));
        assert_eq!(json["allowed_use"], serde_json::json!(["sanctions_list"]));
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn summary_counts_active_sources_only() {
        let mut inactive = source("c", &["price_data"]);
        inactive.status = "INACTIVE".into();
        let sources = vec![
            source("a", &["data_numeric", "forecast"]),
            source("b", &["news_media"]),
            source("d", &[]),
            inactive,
        ];
        let s = summarize(&sources);
        assert_eq!(s.total_sources, 3);
        assert_eq!(s.sources_without_policy, 1);
        assert_eq!(s.by_pipe[&PipeType::NumericTimeseries], 1);
        assert_eq!(s.by_pipe[&PipeType::DocumentVault], 1);
        assert!(!s.by_pipe.contains_key(&PipeType::PriceMonitor));
        assert_eq!(s.by_allowed_use[&UsageTag::Forecast], 1);
    }
}
