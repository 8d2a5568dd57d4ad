//! Error types for coinlake

use thiserror::Error;

/// Result type alias for coinlake operations
pub type Result<T> = std::result::Result<T, LakeError>;

/// Main error type shared by the workspace crates
#[derive(Error, Debug)]
pub enum LakeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Unknown dataset: {0}")]
    UnknownDataset(String),

    #[error("Invalid date '{0}', expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("Invalid object key component: {0}")]
    InvalidKey(String),
}

impl LakeError {
    pub fn config(msg: impl Into<String>) -> Self {
        LakeError::Config(msg.into())
    }
}
