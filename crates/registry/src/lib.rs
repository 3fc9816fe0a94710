//! Source registry: usage-tag policy, lint and release gate.

pub mod enforcer;
pub mod error;
pub mod lint;
pub mod policy;
pub mod postgres;
pub mod release_gate;
pub mod source;
pub mod store;

pub use enforcer::{PipeSource, PolicyEnforcer};
pub use error::RegistryError;
pub use lint::{lint_source, run_registry_lint, LintFinding, LintReport, LintRule, Severity};
pub use policy::{decide, PipeType, PolicyDecision, PolicySummary, UsageTag};
pub use postgres::PgSourceStore;
pub use release_gate::{
    evaluate_release_gate, EvidenceRecord, GateCheck, PublishedManifest, PublishedMetric, ReleaseGateInput,
    ReleaseGateReport,
};
pub use source::{AccessType, Source, SourceStatus, Tier, UpdateFrequency};
pub use store::{MemorySourceStore, SourceRepository};
