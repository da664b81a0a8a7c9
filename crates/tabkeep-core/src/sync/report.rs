//! Results of a sync pass.

use std::fmt;

use crate::models::RecordId;

/// Phase of a pass in which a per-record failure occurred
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Pull,
    Push,
    Drain,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pull => "pull",
            Self::Push => "push",
            Self::Drain => "drain",
        })
    }
}

/// One record that could not be reconciled during a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncFailure {
    /// `None` when a whole phase step failed rather than a single record
    pub record_id: Option<RecordId>,
    pub phase: SyncPhase,
    pub message: String,
}

/// Counters and per-record failures accumulated by one pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Remote records written into the local store
    pub pulled: usize,
    /// Remote records not applied because the local copy has unpushed edits
    pub skipped_unsynced: usize,
    /// Local records confirmed by the remote store
    pub pushed: usize,
    /// Pushed records whose id changed to a remote twin's id
    pub remapped: usize,
    /// Pending operations marked synced
    pub drained: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    pub(crate) fn fail(
        &mut self,
        record_id: Option<RecordId>,
        phase: SyncPhase,
        message: impl fmt::Display,
    ) {
        self.failures.push(SyncFailure {
            record_id,
            phase,
            message: message.to_string(),
        });
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Why a requested pass did not run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyRunning,
    Offline,
}

/// What happened to a pass request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PassOutcome {
    /// Every phase ran; per-record failures are listed in the report
    Completed(SyncReport),
    /// The remote store became unreachable; the report holds partial progress
    Failed { report: SyncReport, error: String },
    Skipped(SkipReason),
}

impl PassOutcome {
    pub const fn report(&self) -> Option<&SyncReport> {
        match self {
            Self::Completed(report) | Self::Failed { report, .. } => Some(report),
            Self::Skipped(_) => None,
        }
    }

    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped(_))
    }
}
