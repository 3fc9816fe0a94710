use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("source not found: {0}")]
    NotFound(String),

    #[error("source {source_id} is {status}, not ACTIVE")]
    NotActive { source_id: String, status: String },

    #[error("source {source_id} rejected by registry lint: {rules}")]
    LintRejected { source_id: String, rules: String },

    #[error("unknown pipe '{0}'")]
    UnknownPipe(String),

    #[error("registry file error: {0}")]
    File(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl RegistryError {
    /// Map to an HTTP status code for API responses.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::NotFound(_) => 404,
            Self::UnknownPipe(_) => 400,
            Self::NotActive { .. } | Self::LintRejected { .. } => 409,
            Self::File(_) | Self::Database(_) => 500,
        }
    }
}
