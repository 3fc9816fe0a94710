//! Queue error types.

use thiserror::Error;
use uuid::Uuid;

use crate::job::JobState;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("job not found: {0}")]
    NotFound(Uuid),

    #[error("cannot {op} job {id} in state {from}")]
    InvalidTransition {
        id: Uuid,
        from: JobState,
        op: &'static str,
    },

    /// Another writer changed the row between load and write.
    #[error("concurrent update on job {0}")]
    Conflict(Uuid),

    #[error("invalid job: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl QueueError {
    /// HTTP-ish status code for API layers.
    pub fn status_code(&self) -> u16 {
        match self {
            QueueError::NotFound(_) => 404,
            QueueError::InvalidTransition { .. } | QueueError::Conflict(_) => 409,
            QueueError::Invalid(_) => 400,
            QueueError::Storage(_) => 500,
        }
    }
}

impl From<sqlx::Error> for QueueError {
    fn from(e: sqlx::Error) -> Self {
        QueueError::Storage(e.to_string())
    }
}
