//! Registry lint: structural checks over every source entry.
//!
//! The lint never stops at the first problem. It returns every finding;
//! any ERROR makes the report fail, WARNINGs are advisory.

mod fuzzy;

use serde::{Deserialize, Serialize};

use crate::source::{AccessType, Source, SourceStatus, Tier, UpdateFrequency};

// ── Result types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LintRule {
    MissingName,
    InvalidEnum,
    ActiveNoEndpoint,
    PartnershipNoContact,
    MissingAllowedUse,
    UnknownAllowedUse,
}

impl LintRule {
    pub fn severity(&self) -> Severity {
        match self {
            LintRule::MissingName | LintRule::InvalidEnum | LintRule::ActiveNoEndpoint => Severity::Error,
            LintRule::PartnershipNoContact
            | LintRule::MissingAllowedUse
            | LintRule::UnknownAllowedUse => Severity::Warning,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintFinding {
    pub source_id: String,
    pub rule: LintRule,
    pub severity: Severity,
    pub message: String,
    /// Optional "did you mean" hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LintReport {
    pub passed: bool,
    pub sources_checked: usize,
    pub errors: Vec<LintFinding>,
}

impl LintReport {
    fn new() -> Self {
        Self {
            passed: true,
            sources_checked: 0,
            errors: Vec::new(),
        }
    }

    fn push(&mut self, source: &Source, rule: LintRule, message: impl Into<String>, suggestion: Option<&str>) {
        if rule.severity() == Severity::Error {
            self.passed = false;
        }
        self.errors.push(LintFinding {
            source_id: source.source_id.clone(),
            rule,
            severity: rule.severity(),
            message: message.into(),
            suggestion: suggestion.map(|s| format!("did you mean '{}'?", s)),
        });
    }

    pub fn error_count(&self) -> usize {
        self.errors.iter().filter(|f| f.severity == Severity::Error).count()
    }

    pub fn warning_count(&self) -> usize {
        self.errors.iter().filter(|f| f.severity == Severity::Warning).count()
    }

    /// Sources with at least one ERROR. These must not be imported.
    pub fn rejected_sources(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self
            .errors
            .iter()
            .filter(|f| f.severity == Severity::Error)
            .map(|f| f.source_id.as_str())
            .collect();
        ids.dedup();
        ids
    }

    pub fn findings_for(&self, source_id: &str) -> impl Iterator<Item = &LintFinding> {
        let source_id = source_id.to_string();
        self.errors.iter().filter(move |f| f.source_id == source_id)
    }

    /// Distinct ERROR rules, in the order they were found.
    pub fn error_rules(&self) -> Vec<LintRule> {
        let mut rules = Vec::new();
        for f in self.errors.iter().filter(|f| f.severity == Severity::Error) {
            if !rules.contains(&f.rule) {
                rules.push(f.rule);
            }
        }
        rules
    }
}

impl LintRule {
    pub fn as_str(&self) -> &'static str {
        match self {
            LintRule::MissingName => "MISSING_NAME",
            LintRule::InvalidEnum => "INVALID_ENUM",
            LintRule::ActiveNoEndpoint => "ACTIVE_NO_ENDPOINT",
            LintRule::PartnershipNoContact => "PARTNERSHIP_NO_CONTACT",
            LintRule::MissingAllowedUse => "MISSING_ALLOWED_USE",
            LintRule::UnknownAllowedUse => "UNKNOWN_ALLOWED_USE",
        }
    }
}

impl std::fmt::Display for LintRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Public API ──────────────────────────────────────────────────────

/// Lint every source. Findings are grouped per source, in registry order.
pub fn run_registry_lint(sources: &[Source]) -> LintReport {
    let mut report = LintReport::new();
    for source in sources {
        check_source(source, &mut report);
    }
    tracing::info!(
        sources = report.sources_checked,
        errors = report.error_count(),
        warnings = report.warning_count(),
        passed = report.passed,
        "registry lint finished"
    );
    report
}

/// Lint a single entry. A source with any ERROR finding is excluded from
/// ingestion until the entry is fixed.
pub fn lint_source(source: &Source) -> LintReport {
    let mut report = LintReport::new();
    check_source(source, &mut report);
    report
}

// ── Checks ──────────────────────────────────────────────────────────

fn check_source(source: &Source, report: &mut LintReport) {
    report.sources_checked += 1;
    check_name(source, report);
    check_enums(source, report);
    check_endpoints(source, report);
    check_partnership(source, report);
    check_allowed_use(source, report);
}

fn check_name(source: &Source, report: &mut LintReport) {
    if source.name.as_deref().map_or(true, |n| n.trim().is_empty()) {
        report.push(source, LintRule::MissingName, "Source has no name", None);
    }
}

fn check_enums(source: &Source, report: &mut LintReport) {
    let fields: [(&str, &str, bool, &[&str]); 4] = [
        ("status", source.status.as_str(), source.status().is_some(), SourceStatus::VALUES),
        ("tier", source.tier.as_str(), source.tier().is_some(), Tier::VALUES),
        ("access_type", source.access_type.as_str(), source.access_type().is_some(), AccessType::VALUES),
        (
            "update_frequency",
            source.update_frequency.as_str(),
            source.update_frequency().is_some(),
            UpdateFrequency::VALUES,
        ),
    ];
    for (field, value, valid, allowed) in fields {
        if valid {
            continue;
        }
        report.push(
            source,
            LintRule::InvalidEnum,
            format!("Invalid {} '{}': must be one of {}", field, value, allowed.join(", ")),
            fuzzy::suggest(value, allowed),
        );
    }
}

fn check_endpoints(source: &Source, report: &mut LintReport) {
    let offline = source.access_type().map_or(false, |a| a.is_offline());
    if source.is_active() && !offline && source.endpoint_count == 0 {
        report.push(
            source,
            LintRule::ActiveNoEndpoint,
            format!(
                "ACTIVE source with access_type={} must have at least one endpoint",
                source.access_type
            ),
            None,
        );
    }
}

fn check_partnership(source: &Source, report: &mut LintReport) {
    let has_contact = source
        .partnership_contact
        .as_deref()
        .map_or(false, |c| !c.trim().is_empty());
    if source.needs_partnership && !has_contact {
        report.push(
            source,
            LintRule::PartnershipNoContact,
            "needs_partnership=true but no partnership_contact provided",
            None,
        );
    }
}

fn check_allowed_use(source: &Source, report: &mut LintReport) {
    if source.allowed_use.iter().all(|t| t.trim().is_empty()) {
        report.push(
            source,
            LintRule::MissingAllowedUse,
            "allowed_use is empty - source will not feed any ingestion pipes",
            None,
        );
        return;
    }
    for tag in source.unknown_usage_tags() {
        report.push(
            source,
            LintRule::UnknownAllowedUse,
            format!("Unrecognized allowed_use tag '{}' is ignored", tag),
            None,
        );
    }
}
