use thiserror::Error;

#[derive(Debug, Error)]
pub enum TribunalError {
    #[error("invalid claim: {0}")]
    InvalidClaim(String),

    #[error("verdict log: {0}")]
    Log(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl TribunalError {
    pub fn status_code(&self) -> u16 {
        match self {
            TribunalError::InvalidClaim(_) => 400,
            TribunalError::Log(_) | TribunalError::Io(_) | TribunalError::Serialization(_) => 500,
        }
    }
}
