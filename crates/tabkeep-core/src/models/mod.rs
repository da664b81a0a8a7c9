//! Data models for Tabkeep

mod pending;
mod profile;
mod record;
mod sync_run;

pub use pending::{OperationId, OperationKind, PendingOperation};
pub use profile::{Profile, Role};
pub use record::{Condition, Record, RecordId, RemoteRecord, LOW_BATTERY_THRESHOLD};
pub use sync_run::SyncRun;
