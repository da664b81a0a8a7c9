//! Applies remote change events to the local store between passes.

use std::sync::Arc;

use super::reconciler::{Reconciler, StoreChange};
use crate::remote::{ChangeEvent, RemoteGateway};
use crate::util::now_millis;
use crate::Result;

/// Best-effort freshness path for records changed by other devices.
///
/// Unlike the pull phase, an event overwrites the local copy even when it
/// holds unpushed edits.
pub struct ChangeNotifier<G: RemoteGateway> {
    reconciler: Arc<Reconciler<G>>,
}

impl<G: RemoteGateway> ChangeNotifier<G> {
    pub const fn new(reconciler: Arc<Reconciler<G>>) -> Self {
        Self { reconciler }
    }

    pub async fn apply(&self, event: ChangeEvent) -> Result<()> {
        let store = self.reconciler.store();
        match event {
            ChangeEvent::Insert(remote) | ChangeEvent::Update(remote) => {
                let id = remote.id;
                let record = remote.into_local(now_millis());
                store.save_record(&record).await?;
                tracing::debug!("Applied remote change to {id}");
                self.reconciler.notify(StoreChange::RecordUpdated(id));
            }
            ChangeEvent::Delete(id) => {
                store.delete_record(&id).await?;
                tracing::debug!("Applied remote delete of {id}");
                self.reconciler.notify(StoreChange::RecordDeleted(id));
            }
        }
        Ok(())
    }
}
