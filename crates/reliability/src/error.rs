use evgate_tribunal::TribunalError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReliabilityError {
    #[error("invalid corpus: {0}")]
    Corpus(String),

    #[error("YAML error in {path}: {message}")]
    Yaml { path: String, message: String },

    #[error("run store: {0}")]
    Store(String),

    #[error(transparent)]
    Tribunal(#[from] TribunalError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ReliabilityError {
    pub fn status_code(&self) -> u16 {
        match self {
            ReliabilityError::Corpus(_) | ReliabilityError::Yaml { .. } => 400,
            ReliabilityError::Tribunal(e) => e.status_code(),
            ReliabilityError::Store(_) | ReliabilityError::Io(_) | ReliabilityError::Serialization(_) => 500,
        }
    }
}
