//! Error types for tabkeep-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using tabkeep-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in tabkeep-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Local store unavailable or a store operation failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Entity not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Remote store gateway error
    #[error(transparent)]
    Remote(#[from] RemoteError),
}
