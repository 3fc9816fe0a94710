//! Evidence tribunal and publication gate.
//!
//! Claims pass through five ordered roles before publication. Only the
//! judge sets a verdict; the gate turns verdicts into publish decisions and
//! gap tickets.

pub mod citation;
pub mod contradiction;
pub mod error;
pub mod gate;
pub mod judge;
pub mod llm_stage;
pub mod log;
pub mod records;
pub mod stages;
pub mod tribunal;
pub mod types;

pub use citation::{CitationAudit, CitedBy};
pub use contradiction::Contradiction;
pub use error::TribunalError;
pub use gate::{add_citation_footnotes, EvidenceGate, GateResult, ReportSection, ReportVerification};
pub use judge::Judge;
pub use llm_stage::LlmStage;
pub use log::{JsonlVerdictLog, MemoryVerdictLog, TribunalStats, VerdictLog, VerdictRecord};
pub use records::{
    GapTicket, JsonlPublicationLog, JsonlTicketStore, MemoryPublicationLog, MemoryTicketStore, Publication, PublicationStore,
    PublishedEvidence, TicketPriority, TicketStatus, TicketStore,
};
pub use stages::TribunalStage;
pub use tribunal::{Tribunal, QUICK_VERIFY_MAX_AGE};
pub use types::{AgentRole, Claim, ClaimContext, ConfidenceGrade, EvidenceItem, PartialAnalysis, Signal, TribunalVerdict, Verdict};
