//! Error types for toolgate-state

use thiserror::Error;

/// Errors that can occur in a collaborator storage backend
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend could not be reached
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Backend rejected or failed an operation
    #[error("storage operation '{operation}' failed: {message}")]
    Operation { operation: String, message: String },

    /// Value could not be encoded or decoded
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// Counter name is not valid for this budget
    #[error("invalid budget counter: {name}")]
    InvalidCounter { name: String },
}

impl StorageError {
    /// Convenience constructor for backend operation failures.
    pub fn operation(operation: impl Into<String>, message: impl Into<String>) -> Self {
        StorageError::Operation {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}
