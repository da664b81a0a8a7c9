//! Sync pass history model

use serde::{Deserialize, Serialize};

/// One finished reconciliation pass as recorded in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRun {
    /// Row identifier
    pub id: i64,
    /// Pass start (Unix ms)
    pub started_at: i64,
    /// Pass end (Unix ms)
    pub finished_at: i64,
    /// `success` or `error`
    pub outcome: String,
    pub pulled: i64,
    pub pushed: i64,
    pub drained: i64,
    pub failures: i64,
    /// Pass-level error message, if the pass failed
    pub error: Option<String>,
}
