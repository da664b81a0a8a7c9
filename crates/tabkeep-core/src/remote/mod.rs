//! Gateway to the authoritative remote store.
//!
//! The reconciler only talks to the remote store through [`RemoteGateway`].
//! [`SupabaseGateway`] is the production implementation over PostgREST.

mod supabase;

#[cfg(test)]
pub(crate) mod memory;

use std::future::Future;

use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::{RecordId, RemoteRecord};

pub use supabase::SupabaseGateway;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Remote store unavailable: {0}")]
    Unavailable(String),
    #[error("Unique code '{unique_code}' already exists remotely")]
    Conflict { unique_code: String },
    #[error("Remote record not found: {0}")]
    NotFound(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Remote API error: {message} ({status})")]
    Api { status: u16, message: String },
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
}

impl RemoteError {
    /// Whether the failure means the remote store cannot be reached at all.
    ///
    /// Such failures end the current pass; everything else is scoped to the
    /// record being processed.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Unavailable(_) => true,
            Self::Http(error) => error.is_connect() || error.is_timeout(),
            Self::Api { status, .. } => *status >= 500,
            _ => false,
        }
    }

    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// Optional server-side filter for [`RemoteGateway::list_records`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordFilter {
    pub unique_code: Option<String>,
    pub origin_site: Option<String>,
    pub model: Option<String>,
    /// Only records updated strictly after this timestamp (Unix ms)
    pub updated_since: Option<i64>,
}

impl RecordFilter {
    /// Filter matching every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn by_unique_code(unique_code: impl Into<String>) -> Self {
        Self {
            unique_code: Some(unique_code.into()),
            ..Self::default()
        }
    }

    pub fn matches(&self, record: &RemoteRecord) -> bool {
        self.unique_code
            .as_ref()
            .is_none_or(|code| *code == record.unique_code)
            && self
                .origin_site
                .as_ref()
                .is_none_or(|site| record.origin_site.as_ref() == Some(site))
            && self
                .model
                .as_ref()
                .is_none_or(|model| record.model.as_ref() == Some(model))
            && self
                .updated_since
                .is_none_or(|since| record.updated_at.is_some_and(|at| at > since))
    }
}

/// One change observed on the remote store outside of a pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeEvent {
    Insert(RemoteRecord),
    Update(RemoteRecord),
    Delete(RecordId),
}

/// Handle returned by [`RemoteGateway::subscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle(pub u64);

/// Operations the reconciler needs from the remote store.
///
/// Timeouts are the gateway's responsibility.
pub trait RemoteGateway: Send + Sync + 'static {
    fn list_records(
        &self,
        filter: &RecordFilter,
    ) -> impl Future<Output = RemoteResult<Vec<RemoteRecord>>> + Send;

    /// `Ok(None)` when no record has this id
    fn get_record(
        &self,
        id: &RecordId,
    ) -> impl Future<Output = RemoteResult<Option<RemoteRecord>>> + Send;

    /// Fails with [`RemoteError::Conflict`] when the business key is taken
    fn create_record(
        &self,
        payload: &RemoteRecord,
    ) -> impl Future<Output = RemoteResult<RemoteRecord>> + Send;

    fn update_record(
        &self,
        id: &RecordId,
        payload: &RemoteRecord,
    ) -> impl Future<Output = RemoteResult<RemoteRecord>> + Send;

    /// Fails with [`RemoteError::NotFound`] when nothing was deleted
    fn delete_record(&self, id: &RecordId) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Start delivering change events into `sink` until unsubscribed
    fn subscribe(
        &self,
        sink: mpsc::UnboundedSender<ChangeEvent>,
    ) -> impl Future<Output = RemoteResult<SubscriptionHandle>> + Send;

    fn unsubscribe(
        &self,
        handle: SubscriptionHandle,
    ) -> impl Future<Output = RemoteResult<()>> + Send;

    /// Cheap reachability check used by the connectivity probe
    fn ping(&self) -> impl Future<Output = RemoteResult<()>> + Send;
}
