use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tabkeep_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Record ID cannot be empty")]
    EmptyRecordId,
    #[error("Search query cannot be empty")]
    EmptySearchQuery,
    #[error("Record not found for id/prefix/code: {0}")]
    RecordNotFound(String),
    #[error("{0}")]
    AmbiguousRecordId(String),
    #[error("Invalid value for {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Remote store is not configured. Run `tabkeep config init` or set TABKEEP_SUPABASE_URL and TABKEEP_SUPABASE_ANON_KEY."
    )]
    RemoteNotConfigured,
    #[error("Sync pass failed: {0}")]
    SyncFailed(String),
}
