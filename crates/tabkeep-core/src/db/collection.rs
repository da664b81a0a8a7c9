//! Key-value collections held by the local store

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::models::{PendingOperation, Profile, Record};

/// Key under which the single active profile is stored
pub const CURRENT_PROFILE_KEY: &str = "current";

/// Named collection inside the `store_entries` table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Records,
    PendingOperations,
    Profile,
}

impl Collection {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Records => "records",
            Self::PendingOperations => "pending_operations",
            Self::Profile => "profile",
        }
    }
}

/// A value that lives in exactly one collection under a string key
pub trait Entity: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn key(&self) -> String;
}

impl Entity for Record {
    const COLLECTION: Collection = Collection::Records;

    fn key(&self) -> String {
        self.id.as_str()
    }
}

impl Entity for PendingOperation {
    const COLLECTION: Collection = Collection::PendingOperations;

    fn key(&self) -> String {
        self.id.as_str()
    }
}

impl Entity for Profile {
    const COLLECTION: Collection = Collection::Profile;

    fn key(&self) -> String {
        CURRENT_PROFILE_KEY.to_string()
    }
}
