//! Error types for checkpoint operations

use thiserror::Error;

/// Result type for checkpoint operations
pub type Result<T> = std::result::Result<T, CheckpointError>;

/// Errors that can occur during checkpoint operations
#[derive(Error, Debug)]
pub enum CheckpointError {
    /// Checkpoint not found
    #[error("Checkpoint not found: {0}")]
    NotFound(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Storage backend failure that is not a database driver error
    #[error("Storage error: {0}")]
    Storage(String),

    /// Invalid checkpoint or argument
    #[error("Invalid checkpoint: {0}")]
    Invalid(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// SQLite driver error
    #[cfg(feature = "sqlite")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl CheckpointError {
    /// Whether the error comes from the storage medium rather than from the caller's input
    pub fn is_storage_failure(&self) -> bool {
        match self {
            CheckpointError::Storage(_) | CheckpointError::Io(_) => true,
            #[cfg(feature = "sqlite")]
            CheckpointError::Database(_) => true,
            _ => false,
        }
    }
}
