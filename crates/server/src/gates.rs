//! Release and deployment gate assembly from live state.

use chrono::Utc;
use anyhow::Context;
use evgate_registry::{
    evaluate_release_gate, run_registry_lint, EvidenceRecord, PublishedManifest, PublishedMetric, ReleaseGateInput,
    ReleaseGateReport,
};
use evgate_reliability::{deployment_gate, DeploymentDecision};
use evgate_tribunal::{Publication, PublicationStore};

use crate::state::AppState;

/// Map gate publications onto the release gate's provenance inputs.
/// Evidence ids are only unique within a claim, so both sides are keyed
/// `claim_id#evidence_id`.
pub fn publication_provenance(publications: &[Publication]) -> (Vec<PublishedMetric>, Vec<EvidenceRecord>) {
    let mut metrics = Vec::with_capacity(publications.len());
    let mut evidence = Vec::new();
    for p in publications {
        metrics.push(PublishedMetric {
            key: p.claim_id.clone(),
            evidence_refs: p.evidence.iter().map(|e| format!("{}#{}", p.claim_id, e.id)).collect(),
        });
        for e in &p.evidence {
            let origin = if e.source_org.is_empty() {
                e.source_id.clone()
            } else {
                format!("{} ({})", e.source_id, e.source_org)
            };
            evidence.push(EvidenceRecord {
                id: format!("{}#{}", p.claim_id, e.id),
                origin,
            });
        }
    }
    (metrics, evidence)
}

pub async fn release_gate_report(state: &AppState) -> anyhow::Result<ReleaseGateReport> {
    let repo = state.enforcer.sources();
    let sources = repo.list().await?;
    let columns = repo.schema_columns().await?;
    let lint = run_registry_lint(&sources);
    let publications = state.gate.publications().list()?;
    let (mut metrics, mut evidence) = publication_provenance(&publications);
    if let Some(path) = &state.config.release_gate.published_manifest_file {
        let manifest = PublishedManifest::load(path).with_context(|| format!("loading {}", path.display()))?;
        metrics.extend(manifest.metrics);
        evidence.extend(manifest.evidence);
    }

    let report = evaluate_release_gate(
        &ReleaseGateInput {
            sources: &sources,
            schema_columns: &columns,
            lint: &lint,
            published_metrics: &metrics,
            evidence: &evidence,
        },
        &state.config.release_gate,
    );
    tracing::info!(
        passed = report.passed,
        failed_checks = report.failed_checks().count(),
        publications = publications.len(),
        metrics = metrics.len(),
        "release gate evaluated"
    );
    Ok(report)
}

pub fn deploy_decision(state: &AppState) -> anyhow::Result<DeploymentDecision> {
    let latest = state.runs.latest()?;
    Ok(deployment_gate(latest.as_ref(), Utc::now(), &state.config.reliability))
}
