//! Database layer for Tabkeep

mod collection;
mod connection;
mod entry_repository;
mod migrations;
mod sync_run_repository;

pub use collection::{Collection, Entity, CURRENT_PROFILE_KEY};
pub use connection::Database;
pub use entry_repository::{EntryRepository, LibSqlEntryRepository};
pub use sync_run_repository::{LibSqlSyncRunRepository, SyncRunRepository};
