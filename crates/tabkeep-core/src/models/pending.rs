//! Pending operation log entries

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{RecordId, RemoteRecord};

/// Identifier of a pending operation (UUID v7, creation ordered)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OperationId(Uuid);

impl OperationId {
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for OperationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for OperationId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Kind of remote mutation a pending operation intends
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    Insert,
    Update,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
        })
    }
}

/// An intent to mutate the remote store, replayed until confirmed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingOperation {
    pub id: OperationId,
    pub kind: OperationKind,
    pub record_id: RecordId,
    /// Snapshot of the record when the operation was appended
    pub payload: Option<RemoteRecord>,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Whether the remote store confirmed this operation
    #[serde(default)]
    pub synced: bool,
}

impl PendingOperation {
    #[must_use]
    pub fn new(
        kind: OperationKind,
        record_id: RecordId,
        payload: Option<RemoteRecord>,
        created_at: i64,
    ) -> Self {
        Self {
            id: OperationId::new(),
            kind,
            record_id,
            payload,
            created_at,
            synced: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_in_upper_case() {
        let json = serde_json::to_string(&OperationKind::Delete).unwrap();
        assert_eq!(json, "\"DELETE\"");
    }

    #[test]
    fn new_operation_is_unsynced() {
        let op = PendingOperation::new(OperationKind::Insert, RecordId::new(), None, 10);
        assert!(!op.synced);
        assert_eq!(op.created_at, 10);
    }

    #[test]
    fn operation_id_parse() {
        let id = OperationId::new();
        let parsed: OperationId = id.as_str().parse().unwrap();
        assert_eq!(id, parsed);
    }
}
