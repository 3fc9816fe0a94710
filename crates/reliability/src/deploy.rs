//! Deployment gate over the latest reliability run.

use chrono::{DateTime, Utc};
use evgate_core::config::ReliabilityConfig;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::harness::ReliabilityRun;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentDecision {
    pub allowed: bool,
    pub reason: String,
    pub reliability_score: Option<f64>,
    pub score_threshold: f64,
    pub run_id: Option<Uuid>,
    pub age_hours: Option<f64>,
}

/// A stale run counts as no run. Exactly `freshness_hours` old is still fresh.
pub fn deployment_gate(latest: Option<&ReliabilityRun>, now: DateTime<Utc>, cfg: &ReliabilityConfig) -> DeploymentDecision {
    let Some(run) = latest else {
        return DeploymentDecision {
            allowed: false,
            reason: "no completed reliability run".to_string(),
            reliability_score: None,
            score_threshold: cfg.score_threshold,
            run_id: None,
            age_hours: None,
        };
    };

    let age = now - run.completed_at;
    let age_hours = age.num_seconds() as f64 / 3600.0;
    let (allowed, reason) = if age > chrono::Duration::hours(cfg.freshness_hours) {
        (
            false,
            format!(
                "latest reliability run is {:.1}h old (limit {}h); re-certify before deploying",
                age_hours, cfg.freshness_hours
            ),
        )
    } else if run.reliability_score < cfg.score_threshold {
        (
            false,
            format!(
                "reliability score {:.1} is below {:.1}",
                run.reliability_score, cfg.score_threshold
            ),
        )
    } else {
        (
            true,
            format!(
                "reliability score {:.1} meets {:.1}",
                run.reliability_score, cfg.score_threshold
            ),
        )
    };

    DeploymentDecision {
        allowed,
        reason,
        reliability_score: Some(run.reliability_score),
        score_threshold: cfg.score_threshold,
        run_id: Some(run.run_id),
        age_hours: Some(age_hours),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::RunType;
    use chrono::Duration;

    fn run_scoring(score: f64, completed_at: DateTime<Utc>) -> ReliabilityRun {
        let mut run = ReliabilityRun::from_results(RunType::Nightly, completed_at, completed_at, 85.0, vec![]);
        run.reliability_score = score;
        run
    }

    #[test]
    fn no_run_blocks() {
        let d = deployment_gate(None, Utc::now(), &ReliabilityConfig::default());
        assert!(!d.allowed);
        assert_eq!(d.run_id, None);
    }

    #[test]
    fn fresh_good_run_allows_and_stale_one_blocks() {
        let now = Utc::now();
        let cfg = ReliabilityConfig::default();

        let fresh = run_scoring(91.5, now - Duration::hours(2));
        let d = deployment_gate(Some(&fresh), now, &cfg);
        assert!(d.allowed, "{}", d.reason);

        let stale = run_scoring(91.5, now - Duration::hours(30));
        let d = deployment_gate(Some(&stale), now, &cfg);
        assert!(!d.allowed);
        assert!(d.reason.contains("30.0h old"));
    }

    #[test]
    fn low_score_blocks() {
        let now = Utc::now();
        let d = deployment_gate(Some(&run_scoring(84.9, now)), now, &ReliabilityConfig::default());
        assert!(!d.allowed);
        assert_eq!(d.reliability_score, Some(84.9));
    }

    #[test]
    fn freshness_boundary_is_inclusive() {
        let now = Utc::now();
        let cfg = ReliabilityConfig::default();
        assert!(deployment_gate(Some(&run_scoring(90.0, now - Duration::hours(24))), now, &cfg).allowed);
        assert!(!deployment_gate(Some(&run_scoring(90.0, now - Duration::hours(24) - Duration::seconds(1))), now, &cfg).allowed);
    }
}
