//! Error types for nestset

use crate::model::Fingerprint;
use std::sync::Arc;
use thiserror::Error;

/// Result type alias for nestset operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in nestset operations
///
/// `Error` is `Clone` because write and fetch outcomes are fanned out to every
/// waiter of a shared future.
#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(Arc<std::io::Error>),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Fingerprint not found: {0}")]
    NotFound(Fingerprint),

    #[error("Fingerprint mismatch: expected {expected}, computed {actual}")]
    FingerprintMismatch {
        expected: Fingerprint,
        actual: Fingerprint,
    },

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Invalid store file: {0}")]
    InvalidFile(String),

    #[error("Version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },

    #[error("Storage endpoint error: {0}")]
    Endpoint(String),

    #[error("Runtime error: {0}")]
    Runtime(String),

    #[error("Config error: {0}")]
    Config(String),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(Arc::new(err))
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::Codec(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Codec(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        Error::Runtime(err.to_string())
    }
}

impl Error {
    /// Whether this error means the backend has no record of a fingerprint
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}
