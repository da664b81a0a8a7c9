pub mod add;
pub mod common;
pub mod config;
pub mod delete;
pub mod edit;
pub mod list;
pub mod pending;
pub mod profile;
pub mod search;
pub mod stats;
pub mod sync;
pub mod watch;
