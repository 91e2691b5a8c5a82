use thiserror::Error;

#[derive(Error, Debug)]
pub enum GridGaError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("State error: {0}")]
    State(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Submission error: {0}")]
    Submission(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, GridGaError>;
