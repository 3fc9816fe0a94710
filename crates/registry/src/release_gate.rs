//! Pre-release checks over the registry and published content.
//!
//! Each check reports what it measured next to its threshold so operators
//! can see how far off a failing gate is.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use chrono::{DateTime, Utc};
use evgate_core::config::ReleaseGateConfig;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::RegistryError;
use crate::lint::LintReport;
use crate::source::{Source, Tier};
use crate::store::REQUIRED_COLUMNS;

/// Origins that mark evidence as stand-in data rather than a real source.
const MOCK_ORIGIN_MARKERS: &[&str] = &["mock", "placeholder", "synthetic", "fallback", "dummy", "lorem"];

// ── Inputs ───────────────────────────────────────────────────────────

/// A figure shown publicly, with the evidence it was published from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedMetric {
    pub key: String,
    #[serde(default)]
    pub evidence_refs: Vec<String>,
}

/// Provenance of one evidence item behind published content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRecord {
    pub id: String,
    pub origin: String,
}

impl EvidenceRecord {
    pub fn is_mock(&self) -> bool {
        let origin = self.origin.to_ascii_lowercase();
        MOCK_ORIGIN_MARKERS.iter().any(|m| origin.contains(m))
    }
}

/// Figures published outside the evidence gate (dashboards, KPI feeds),
/// declared together with their evidence.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PublishedManifest {
    #[serde(default)]
    pub metrics: Vec<PublishedMetric>,
    #[serde(default)]
    pub evidence: Vec<EvidenceRecord>,
}

impl PublishedManifest {
    pub fn load(path: &Path) -> Result<Self, RegistryError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| RegistryError::File(format!("{}: {}", path.display(), e)))?;
        let manifest: Self = serde_yaml::from_str(&raw)
            .map_err(|e| RegistryError::File(format!("{}: {}", path.display(), e)))?;
        tracing::info!(
            path = %path.display(),
            metrics = manifest.metrics.len(),
            evidence = manifest.evidence.len(),
            "published manifest loaded"
        );
        Ok(manifest)
    }
}

pub struct ReleaseGateInput<'a> {
    pub sources: &'a [Source],
    pub schema_columns: &'a [String],
    pub lint: &'a LintReport,
    pub published_metrics: &'a [PublishedMetric],
    pub evidence: &'a [EvidenceRecord],
}

// ── Report ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateCheck {
    pub name: String,
    pub passed: bool,
    pub measured: Value,
    pub threshold: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReleaseGateReport {
    pub passed: bool,
    pub checks: Vec<GateCheck>,
    pub tier_distribution: BTreeMap<String, usize>,
    pub status_distribution: BTreeMap<String, usize>,
    pub generated_at: DateTime<Utc>,
}

impl ReleaseGateReport {
    pub fn failed_checks(&self) -> impl Iterator<Item = &GateCheck> {
        self.checks.iter().filter(|c| !c.passed)
    }

    pub fn check(&self, name: &str) -> Option<&GateCheck> {
        self.checks.iter().find(|c| c.name == name)
    }
}

fn check(name: &str, passed: bool, measured: Value, threshold: Value) -> GateCheck {
    GateCheck {
        name: name.to_string(),
        passed,
        measured,
        threshold,
    }
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

// ── Evaluation ───────────────────────────────────────────────────────

pub fn evaluate_release_gate(input: &ReleaseGateInput<'_>, cfg: &ReleaseGateConfig) -> ReleaseGateReport {
    let sources = input.sources;
    let total = sources.len();

    let mut tier_distribution: BTreeMap<String, usize> = BTreeMap::new();
    let mut status_distribution: BTreeMap<String, usize> = BTreeMap::new();
    for s in sources {
        *tier_distribution.entry(s.tier.clone()).or_default() += 1;
        *status_distribution.entry(s.status.clone()).or_default() += 1;
    }
    let active = sources.iter().filter(|s| s.is_active()).count();
    let unknown_tier = sources
        .iter()
        .filter(|s| s.tier().map_or(true, |t| t == Tier::Unknown))
        .count();

    let mut seen = HashSet::new();
    let mut duplicates: Vec<&str> = sources
        .iter()
        .filter(|s| !seen.insert(s.source_id.as_str()))
        .map(|s| s.source_id.as_str())
        .collect();
    duplicates.sort_unstable();
    duplicates.dedup();

    let present: HashSet<&str> = input.schema_columns.iter().map(String::as_str).collect();
    let missing_columns: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| !present.contains(c))
        .collect();

    // A metric is fabricated when it cites nothing or cites evidence nobody recorded.
    let known_evidence: HashSet<&str> = input.evidence.iter().map(|e| e.id.as_str()).collect();
    let fabricated: Vec<&str> = input
        .published_metrics
        .iter()
        .filter(|m| {
            m.evidence_refs.is_empty() || m.evidence_refs.iter().any(|r| !known_evidence.contains(r.as_str()))
        })
        .map(|m| m.key.as_str())
        .collect();
    let mock: Vec<&str> = input
        .evidence
        .iter()
        .filter(|e| e.is_mock())
        .map(|e| e.id.as_str())
        .collect();

    let unknown_ratio = ratio(unknown_tier, total);
    let active_ratio = ratio(active, total);

    let checks = vec![
        check(
            "registry_size",
            total >= cfg.min_sources,
            json!(total),
            json!({ "min": cfg.min_sources }),
        ),
        check(
            "active_sources",
            active >= cfg.min_active_sources,
            json!(active),
            json!({ "min": cfg.min_active_sources }),
        ),
        check(
            "tier_distribution",
            total > 0 && unknown_ratio <= cfg.max_unknown_tier_ratio,
            json!({ "unknown_tier_ratio": unknown_ratio }),
            json!({ "max_unknown_tier_ratio": cfg.max_unknown_tier_ratio }),
        ),
        check(
            "status_distribution",
            active_ratio >= cfg.min_active_ratio,
            json!({ "active_ratio": active_ratio }),
            json!({ "min_active_ratio": cfg.min_active_ratio }),
        ),
        check(
            "no_duplicate_source_ids",
            duplicates.is_empty(),
            json!(duplicates),
            json!([]),
        ),
        check(
            "schema_columns_present",
            missing_columns.is_empty(),
            json!({ "missing": missing_columns }),
            json!(REQUIRED_COLUMNS),
        ),
        check(
            "registry_lint",
            input.lint.passed,
            json!({ "errors": input.lint.error_count(), "warnings": input.lint.warning_count() }),
            json!({ "errors": 0 }),
        ),
        check(
            "no_fabricated_public_metrics",
            fabricated.is_empty(),
            json!(fabricated),
            json!([]),
        ),
        check(
            "no_mock_evidence_fallback",
            mock.is_empty(),
            json!(mock),
            json!([]),
        ),
    ];

    let passed = checks.iter().all(|c| c.passed);
    for c in checks.iter().filter(|c| !c.passed) {
        tracing::warn!(check = %c.name, measured = %c.measured, "release gate check failed");
    }
    tracing::info!(passed, checks = checks.len(), "release gate evaluated");

    ReleaseGateReport {
        passed,
        checks,
        tier_distribution,
        status_distribution,
        generated_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lint::run_registry_lint;
    use crate::source::fixtures::source;

    fn cfg() -> ReleaseGateConfig {
        ReleaseGateConfig {
            min_sources: 3,
            min_active_sources: 2,
            max_unknown_tier_ratio: 0.34,
            min_active_ratio: 0.5,
            published_manifest_file: None,
        }
    }

    fn columns() -> Vec<String> {
        REQUIRED_COLUMNS.iter().map(|c| c.to_string()).collect()
    }

    fn registry() -> Vec<Source> {
        vec![
            source("a", &["data_numeric"]),
            source("b", &["doc_pdf"]),
            source("c", &["news_media"]),
        ]
    }

    #[test]
    fn healthy_release_passes() {
        let sources = registry();
        let lint = run_registry_lint(&sources);
        let metrics = vec![PublishedMetric {
            key: "fx.aden".into(),
            evidence_refs: vec!["E1".into()],
        }];
        let evidence = vec![EvidenceRecord {
            id: "E1".into(),
            origin: "cby-aden".into(),
        }];
        let report = evaluate_release_gate(
            &ReleaseGateInput {
                sources: &sources,
                schema_columns: &columns(),
                lint: &lint,
                published_metrics: &metrics,
                evidence: &evidence,
            },
            &cfg(),
        );
        assert!(report.passed, "{:?}", report.failed_checks().collect::<Vec<_>>());
        assert_eq!(report.checks.len(), 9);
        assert_eq!(report.tier_distribution["T1"], 3);
    }

    #[test]
    fn duplicates_and_missing_columns_fail() {
        let mut sources = registry();
        sources.push(source("a", &["forecast"]));
        let lint = run_registry_lint(&sources);
        let cols: Vec<String> = columns().into_iter().filter(|c| c != "tier").collect();
        let report = evaluate_release_gate(
            &ReleaseGateInput {
                sources: &sources,
                schema_columns: &cols,
                lint: &lint,
                published_metrics: &[],
                evidence: &[],
            },
            &cfg(),
        );
        assert!(!report.passed);
        let dup = report.check("no_duplicate_source_ids").unwrap();
        assert!(!dup.passed);
        assert_eq!(dup.measured, json!(["a"]));
        let schema = report.check("schema_columns_present").unwrap();
        assert_eq!(schema.measured["missing"], json!(["tier"]));
    }

    #[test]
    fn fabricated_metrics_and_mock_evidence_fail() {
        let sources = registry();
        let lint = run_registry_lint(&sources);
        let metrics = vec![PublishedMetric {
            key: "inflation.sanaa".into(),
            evidence_refs: vec![],
        }];
        let evidence = vec![EvidenceRecord {
            id: "E9".into(),
            origin: "Mock-Fallback-Provider".into(),
        }];
        let report = evaluate_release_gate(
            &ReleaseGateInput {
                sources: &sources,
                schema_columns: &columns(),
                lint: &lint,
                published_metrics: &metrics,
                evidence: &evidence,
            },
            &cfg(),
        );
        let failed: Vec<_> = report.failed_checks().map(|c| c.name.as_str()).collect();
        assert_eq!(failed, vec!["no_fabricated_public_metrics", "no_mock_evidence_fallback"]);
    }

    #[test]
    fn metrics_citing_unrecorded_evidence_are_fabricated() {
        let sources = registry();
        let lint = run_registry_lint(&sources);
        let metrics = vec![
            PublishedMetric {
                key: "fx.aden".into(),
                evidence_refs: vec!["E1".into()],
            },
            PublishedMetric {
                key: "gdp.2023".into(),
                evidence_refs: vec!["E1".into(), "E404".into()],
            },
        ];
        let evidence = vec![EvidenceRecord {
            id: "E1".into(),
            origin: "cby-aden".into(),
        }];
        let report = evaluate_release_gate(
            &ReleaseGateInput {
                sources: &sources,
                schema_columns: &columns(),
                lint: &lint,
                published_metrics: &metrics,
                evidence: &evidence,
            },
            &cfg(),
        );
        let fabricated = report.check("no_fabricated_public_metrics").unwrap();
        assert!(!fabricated.passed);
        assert_eq!(fabricated.measured, json!(["gdp.2023"]));
    }

    #[test]
    fn manifest_loads_metrics_and_evidence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("published.yaml");
        std::fs::write(
            &path,
            r#"
metrics:
  - key: dashboard.fx_parallel
    evidence_refs: [dash-1]
  - key: dashboard.food_basket
evidence:
  - id: dash-1
    origin: cby-aden
"#,
        )
        .unwrap();
        let manifest = PublishedManifest::load(&path).unwrap();
        assert_eq!(manifest.metrics.len(), 2);
        assert!(manifest.metrics[1].evidence_refs.is_empty());
        assert_eq!(manifest.evidence[0].origin, "cby-aden");

        assert!(matches!(
            PublishedManifest::load(&dir.path().join("missing.yaml")).unwrap_err(),
            RegistryError::File(_)
        ));
    }

    #[test]
    fn lint_errors_and_small_registry_block_release() {
        let mut bad = source("bad", &["forecast"]);
        bad.name = None;
        bad.tier = "UNKNOWN".into();
        let sources = vec![bad];
        let lint = run_registry_lint(&sources);
        let report = evaluate_release_gate(
            &ReleaseGateInput {
                sources: &sources,
                schema_columns: &columns(),
                lint: &lint,
                published_metrics: &[],
                evidence: &[],
            },
            &cfg(),
        );
        let failed: Vec<_> = report.failed_checks().map(|c| c.name.as_str()).collect();
        assert_eq!(
            failed,
            vec!["registry_size", "active_sources", "tier_distribution", "registry_lint"]
        );
    }
}
