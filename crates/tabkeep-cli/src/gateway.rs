//! Remote store selection for CLI sessions.

use tabkeep_core::config::RemoteConfig;
use tabkeep_core::remote::{
    ChangeEvent, RecordFilter, RemoteError, RemoteGateway, RemoteResult, SubscriptionHandle,
    SupabaseGateway,
};
use tabkeep_core::{RecordId, RemoteRecord};
use tokio::sync::mpsc;

const DETACHED_MESSAGE: &str = "remote store is not configured";

/// The configured remote store, or none when running local-only.
///
/// A detached session reports every remote call as unavailable, so the
/// reconciler treats it exactly like a device without connectivity.
pub enum CliGateway {
    Remote(SupabaseGateway),
    Detached,
}

impl CliGateway {
    pub fn from_config(config: Option<&RemoteConfig>) -> RemoteResult<Self> {
        match config {
            Some(config) => Ok(Self::Remote(SupabaseGateway::new(config)?)),
            None => Ok(Self::Detached),
        }
    }

    pub const fn is_configured(&self) -> bool {
        matches!(self, Self::Remote(_))
    }

    fn detached() -> RemoteError {
        RemoteError::Unavailable(DETACHED_MESSAGE.to_string())
    }
}

impl RemoteGateway for CliGateway {
    async fn list_records(&self, filter: &RecordFilter) -> RemoteResult<Vec<RemoteRecord>> {
        match self {
            Self::Remote(gateway) => gateway.list_records(filter).await,
            Self::Detached => Err(Self::detached()),
        }
    }

    async fn get_record(&self, id: &RecordId) -> RemoteResult<Option<RemoteRecord>> {
        match self {
            Self::Remote(gateway) => gateway.get_record(id).await,
            Self::Detached => Err(Self::detached()),
        }
    }

    async fn create_record(&self, payload: &RemoteRecord) -> RemoteResult<RemoteRecord> {
        match self {
            Self::Remote(gateway) => gateway.create_record(payload).await,
            Self::Detached => Err(Self::detached()),
        }
    }

    async fn update_record(
        &self,
        id: &RecordId,
        payload: &RemoteRecord,
    ) -> RemoteResult<RemoteRecord> {
        match self {
            Self::Remote(gateway) => gateway.update_record(id, payload).await,
            Self::Detached => Err(Self::detached()),
        }
    }

    async fn delete_record(&self, id: &RecordId) -> RemoteResult<()> {
        match self {
            Self::Remote(gateway) => gateway.delete_record(id).await,
            Self::Detached => Err(Self::detached()),
        }
    }

    async fn subscribe(
        &self,
        sink: mpsc::UnboundedSender<ChangeEvent>,
    ) -> RemoteResult<SubscriptionHandle> {
        match self {
            Self::Remote(gateway) => gateway.subscribe(sink).await,
            Self::Detached => Err(Self::detached()),
        }
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> RemoteResult<()> {
        match self {
            Self::Remote(gateway) => gateway.unsubscribe(handle).await,
            Self::Detached => Ok(()),
        }
    }

    async fn ping(&self) -> RemoteResult<()> {
        match self {
            Self::Remote(gateway) => gateway.ping().await,
            Self::Detached => Err(Self::detached()),
        }
    }
}
