//! Reliability harness and deployment gate.
//!
//! A fixed corpus of questions is answered by a [`Responder`], pushed
//! through the evidence gate and scored. [`deployment_gate`] refuses
//! deployment when the latest run scores low or is stale.

pub mod corpus;
pub mod deploy;
pub mod error;
pub mod harness;
pub mod responder;
pub mod schedule;
pub mod store;

pub use corpus::{Category, Corpus, Difficulty, ExpectedPattern, ReliabilityCase};
pub use deploy::{deployment_gate, DeploymentDecision};
pub use error::ReliabilityError;
pub use harness::{reliability_score, CaseResult, ReliabilityHarness, ReliabilityRun, RunType};
pub use responder::{CandidateAnswer, FixtureResponder, LlmResponder, Responder};
pub use schedule::{run_and_store, run_scheduled};
pub use store::{JsonlRunStore, MemoryRunStore, RunStore};
