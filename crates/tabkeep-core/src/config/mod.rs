//! Runtime configuration for the remote store and the sync scheduler.
//!
//! Values are resolved from explicit arguments, then environment variables,
//! then the CLI's profile file. Missing remote configuration means the
//! application runs local-only.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

pub const ENV_SUPABASE_URL: &str = "TABKEEP_SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "TABKEEP_SUPABASE_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "TABKEEP_ACCESS_TOKEN";
pub const ENV_TABLE: &str = "TABKEEP_TABLE";
pub const ENV_SYNC_INTERVAL_SECS: &str = "TABKEEP_SYNC_INTERVAL_SECS";
pub const ENV_DB_PATH: &str = "TABKEEP_DB_PATH";

pub const DEFAULT_TABLE: &str = "tablets";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;
const DEFAULT_CHANGE_POLL_SECS: u64 = 5;
const DEFAULT_SYNC_INTERVAL_SECS: u64 = 30;
const DEFAULT_PROBE_INTERVAL_SECS: u64 = 15;

/// Connection settings for the Supabase (PostgREST) remote store.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct RemoteConfig {
    pub supabase_url: String,
    pub anon_key: String,
    /// User JWT; the anon key is used as bearer when absent
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default = "default_table")]
    pub table: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    #[serde(default = "default_change_poll_secs")]
    pub change_poll_secs: u64,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

const fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

const fn default_change_poll_secs() -> u64 {
    DEFAULT_CHANGE_POLL_SECS
}

impl RemoteConfig {
    pub fn new(supabase_url: impl Into<String>, anon_key: impl Into<String>) -> Self {
        Self {
            supabase_url: supabase_url.into(),
            anon_key: anon_key.into(),
            access_token: None,
            table: default_table(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            change_poll_secs: DEFAULT_CHANGE_POLL_SECS,
        }
    }

    /// Build from a key lookup (environment or test map).
    ///
    /// Returns `Ok(None)` when neither URL nor key is set and an error when
    /// only one of them is.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Option<Self>, String> {
        let url = normalize_text_option(lookup(ENV_SUPABASE_URL));
        let anon_key = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY));

        let (url, anon_key) = match (url, anon_key) {
            (None, None) => return Ok(None),
            (Some(url), Some(anon_key)) => (url, anon_key),
            (Some(_), None) => return Err(format!("{ENV_SUPABASE_ANON_KEY} is required")),
            (None, Some(_)) => return Err(format!("{ENV_SUPABASE_URL} is required")),
        };

        let mut config = Self::new(url, anon_key);
        config.access_token = normalize_text_option(lookup(ENV_ACCESS_TOKEN));
        if let Some(table) = normalize_text_option(lookup(ENV_TABLE)) {
            config.table = table;
        }
        config.validate()?;
        Ok(Some(config))
    }

    pub fn from_env() -> Result<Option<Self>, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn validate(&self) -> Result<(), String> {
        let url = self.supabase_url.trim();
        if url.is_empty() {
            return Err("supabase_url must not be empty".to_string());
        }
        if !is_http_url(url) {
            return Err("supabase_url must include http:// or https://".to_string());
        }
        if self.anon_key.trim().is_empty() {
            return Err("anon_key must not be empty".to_string());
        }
        if self.table.trim().is_empty() {
            return Err("table must not be empty".to_string());
        }
        if self.request_timeout_secs == 0 {
            return Err("request_timeout_secs must be positive".to_string());
        }
        if self.change_poll_secs == 0 {
            return Err("change_poll_secs must be positive".to_string());
        }
        Ok(())
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn change_poll_interval(&self) -> Duration {
        Duration::from_secs(self.change_poll_secs)
    }
}

impl fmt::Debug for RemoteConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RemoteConfig")
            .field("supabase_url", &self.supabase_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .field("table", &self.table)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("change_poll_secs", &self.change_poll_secs)
            .finish()
    }
}

/// Scheduling knobs for the connectivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Periodic pass interval while online
    pub sync_interval: Duration,
    /// How often the connectivity probe pings the remote store
    pub probe_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            sync_interval: Duration::from_secs(DEFAULT_SYNC_INTERVAL_SECS),
            probe_interval: Duration::from_secs(DEFAULT_PROBE_INTERVAL_SECS),
        }
    }
}

impl SyncSettings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let mut settings = Self::default();
        if let Some(raw) = normalize_text_option(lookup(ENV_SYNC_INTERVAL_SECS)) {
            let secs = raw
                .parse::<u64>()
                .map_err(|_| format!("{ENV_SYNC_INTERVAL_SECS} must be a whole number of seconds"))?;
            if secs == 0 {
                return Err(format!("{ENV_SYNC_INTERVAL_SECS} must be positive"));
            }
            settings.sync_interval = Duration::from_secs(secs);
        }
        Ok(settings)
    }

    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }
}
