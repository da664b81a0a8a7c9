//! Service layer shared by every client of the local store

mod local_store;

pub use local_store::{Adoption, LocalStore, PulledCopy, RecordStats};
