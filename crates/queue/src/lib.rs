//! Crash-safe ingestion work queue.
//!
//! [`WorkQueue`] owns the job state machine; [`JobRepository`] owns storage.
//! Workers pull jobs through [`Worker`], and [`run_maintenance`] returns
//! jobs orphaned by a crashed worker to the queue.

pub mod error;
pub mod job;
pub mod maintenance;
pub mod memory;
pub mod postgres;
pub mod repository;
pub mod work_queue;
pub mod worker;

pub use error::QueueError;
pub use job::{Job, JobFilter, JobProgress, JobRefs, JobState, JobType, NewJob, QueueStats};
pub use maintenance::run_maintenance;
pub use memory::MemoryJobStore;
pub use postgres::PgJobStore;
pub use repository::JobRepository;
pub use work_queue::WorkQueue;
pub use worker::{Checkpoint, JobContext, JobHandler, JobOutcome, Shutdown, Worker};
