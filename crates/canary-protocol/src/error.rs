//! Error types for the codec canary.
//!
//! Classification findings are not errors; these variants cover the
//! operational failures around them.

use thiserror::Error;

/// Operational failures that can occur around classification and storage.
#[derive(Debug, Error)]
pub enum CanaryError {
    #[error("codec error: {0}")]
    Codec(String),
    #[error("store error: {0}")]
    Store(String),
    #[error("io error: {0}")]
    Io(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<std::io::Error> for CanaryError {
    fn from(error: std::io::Error) -> Self {
        Self::Io(error.to_string())
    }
}

impl From<serde_json::Error> for CanaryError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Convenience result type for canary operations.
pub type CanaryResult<T> = Result<T, CanaryError>;
