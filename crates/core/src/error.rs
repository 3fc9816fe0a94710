use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error in {path}: {message}")]
    Yaml { path: String, message: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
