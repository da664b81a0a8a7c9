//! tabkeep-core - Core library for Tabkeep
//!
//! This crate contains the device records, the durable local store, and the
//! reconciliation machinery that keeps the local store in agreement with the
//! shared remote store while connectivity comes and goes.

pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod services;
pub mod state;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{
    Condition, OperationId, OperationKind, PendingOperation, Profile, Record, RecordId,
    RemoteRecord, Role, SyncRun,
};
pub use services::{LocalStore, RecordStats};
pub use state::SyncState;
