//! HTTP surface, CLI and process wiring for the publication pipeline.
//!
//! [`startup::build_app_state`] picks Postgres or in-memory stores,
//! [`router::build_router`] exposes the engines over HTTP and
//! [`ingest::PolicyGatedIngestion`] connects the work queue to the policy
//! enforcer.

pub mod api;
pub mod cli;
pub mod db;
pub mod gates;
pub mod ingest;
pub mod router;
pub mod startup;
pub mod state;

pub use ingest::{IngestionPipe, PolicyGatedIngestion, SourceFetcher};
pub use router::build_router;
pub use startup::{build_app_state, build_harness, ModelContext};
pub use state::AppState;
