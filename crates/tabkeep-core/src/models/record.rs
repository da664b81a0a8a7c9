//! Device record model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use crate::error::{Error, Result};

/// Battery level below which a device is reported as low.
pub const LOW_BATTERY_THRESHOLD: u8 = 20;

/// A unique identifier for a record, using UUID v7 (time-sortable)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(Uuid);

impl RecordId {
    /// Create a new unique record ID using UUID v7
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> String {
        self.0.to_string()
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RecordId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Physical condition of a device part
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    #[default]
    Good,
    Fair,
    Damaged,
    Broken,
}

impl Condition {
    pub const ALL: [Self; 4] = [Self::Good, Self::Fair, Self::Damaged, Self::Broken];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Good => "good",
            Self::Fair => "fair",
            Self::Damaged => "damaged",
            Self::Broken => "broken",
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Condition {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|condition| condition.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| Error::InvalidInput(format!("unknown condition '{s}'")))
    }
}

/// A device inventory entry as kept in the local store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// Client-generated identifier; replaced only when push matches a remote twin
    pub id: RecordId,
    /// Human-assigned business key
    pub unique_code: String,
    pub serial_number: Option<String>,
    pub model: Option<String>,
    pub product_name: Option<String>,
    /// Site the device came from
    pub origin_site: Option<String>,
    pub screen_condition: Condition,
    pub body_condition: Condition,
    /// Battery charge in percent (0-100)
    pub battery_level: Option<u8>,
    pub has_charger: bool,
    pub has_case: bool,
    pub notes: Option<String>,
    pub maintenance_date: Option<NaiveDate>,
    /// Creation timestamp (Unix ms), assigned by the local store
    pub created_at: Option<i64>,
    /// Last update timestamp (Unix ms), assigned by the local store
    pub updated_at: Option<i64>,
    /// Whether this copy is known to match the remote copy
    #[serde(default)]
    pub synced: bool,
    /// When the remote store last confirmed this copy (Unix ms)
    #[serde(default)]
    pub last_synced_at: Option<i64>,
}

impl Record {
    /// Create a new unsynced record for the given business key
    #[must_use]
    pub fn new(unique_code: impl Into<String>) -> Self {
        Self {
            id: RecordId::new(),
            unique_code: unique_code.into(),
            serial_number: None,
            model: None,
            product_name: None,
            origin_site: None,
            screen_condition: Condition::default(),
            body_condition: Condition::default(),
            battery_level: None,
            has_charger: false,
            has_case: false,
            notes: None,
            maintenance_date: None,
            created_at: None,
            updated_at: None,
            synced: false,
            last_synced_at: None,
        }
    }

    /// Check the business invariants a form submission must satisfy
    pub fn validate(&self) -> Result<()> {
        if self.unique_code.trim().is_empty() {
            return Err(Error::InvalidInput("unique code cannot be empty".into()));
        }
        if let Some(level) = self.battery_level {
            if level > 100 {
                return Err(Error::InvalidInput(format!(
                    "battery level must be between 0 and 100, got {level}"
                )));
            }
        }
        Ok(())
    }

    pub fn is_low_battery(&self) -> bool {
        self.battery_level
            .is_some_and(|level| level < LOW_BATTERY_THRESHOLD)
    }

    /// Project the fields that are transmitted to the remote store.
    ///
    /// Sync bookkeeping (`synced`, `last_synced_at`) never leaves the device.
    #[must_use]
    pub fn to_remote_payload(&self) -> RemoteRecord {
        RemoteRecord {
            id: self.id,
            unique_code: self.unique_code.clone(),
            serial_number: self.serial_number.clone(),
            model: self.model.clone(),
            product_name: self.product_name.clone(),
            origin_site: self.origin_site.clone(),
            screen_condition: self.screen_condition,
            body_condition: self.body_condition,
            battery_level: self.battery_level,
            has_charger: self.has_charger,
            has_case: self.has_case,
            notes: self.notes.clone(),
            maintenance_date: self.maintenance_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    /// Whether the transmitted fields equal the given remote copy
    pub fn matches_remote(&self, remote: &RemoteRecord) -> bool {
        self.to_remote_payload() == *remote
    }

    /// Lowercased text used for substring search
    pub(crate) fn search_haystack(&self) -> String {
        [
            Some(self.unique_code.as_str()),
            self.serial_number.as_deref(),
            self.model.as_deref(),
            self.product_name.as_deref(),
            self.origin_site.as_deref(),
            self.notes.as_deref(),
        ]
        .into_iter()
        .flatten()
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase()
    }
}

/// The record shape exchanged with the remote store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: RecordId,
    pub unique_code: String,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub product_name: Option<String>,
    #[serde(default)]
    pub origin_site: Option<String>,
    #[serde(default)]
    pub screen_condition: Condition,
    #[serde(default)]
    pub body_condition: Condition,
    #[serde(default)]
    pub battery_level: Option<u8>,
    #[serde(default)]
    pub has_charger: bool,
    #[serde(default)]
    pub has_case: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub maintenance_date: Option<NaiveDate>,
    #[serde(default)]
    pub created_at: Option<i64>,
    #[serde(default)]
    pub updated_at: Option<i64>,
}

impl RemoteRecord {
    /// Convert an authoritative remote copy into a synced local record
    #[must_use]
    pub fn into_local(self, synced_at: i64) -> Record {
        Record {
            id: self.id,
            unique_code: self.unique_code,
            serial_number: self.serial_number,
            model: self.model,
            product_name: self.product_name,
            origin_site: self.origin_site,
            screen_condition: self.screen_condition,
            body_condition: self.body_condition,
            battery_level: self.battery_level,
            has_charger: self.has_charger,
            has_case: self.has_case,
            notes: self.notes,
            maintenance_date: self.maintenance_date,
            created_at: self.created_at,
            updated_at: self.updated_at,
            synced: true,
            last_synced_at: Some(synced_at),
        }
    }
}
