//! In-memory remote store used by reconciler, notifier and monitor tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, Notify};

use super::{ChangeEvent, RecordFilter, RemoteError, RemoteGateway, RemoteResult, SubscriptionHandle};
use crate::models::{RecordId, RemoteRecord};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    List,
    Get(RecordId),
    Create(String),
    Update(RecordId),
    Delete(RecordId),
    Subscribe,
    Unsubscribe,
    Ping,
}

/// Blocks one gateway call until released, so a pass can be held in flight.
pub struct Hold {
    pub entered: Notify,
    pub release: Notify,
}

#[derive(Default)]
pub struct MemoryGateway {
    records: Mutex<BTreeMap<RecordId, RemoteRecord>>,
    calls: Mutex<Vec<Call>>,
    subscribers: Mutex<HashMap<u64, mpsc::UnboundedSender<ChangeEvent>>>,
    failing: Mutex<HashSet<RecordId>>,
    next_subscription: AtomicU64,
    unavailable: AtomicBool,
    assign_ids: AtomicBool,
    listing_fails: AtomicBool,
    listing_hold: Mutex<Option<Arc<Hold>>>,
    creating_hold: Mutex<Option<Arc<Hold>>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn arm(slot: &Mutex<Option<Arc<Hold>>>) -> Arc<Hold> {
    let hold = Arc::new(Hold {
        entered: Notify::new(),
        release: Notify::new(),
    });
    *lock(slot) = Some(Arc::clone(&hold));
    hold
}

async fn pause(slot: &Mutex<Option<Arc<Hold>>>) {
    let hold = lock(slot).take();
    if let Some(hold) = hold {
        hold.entered.notify_one();
        hold.release.notified().await;
    }
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a record as if another device had written it.
    pub fn insert(&self, record: RemoteRecord) {
        lock(&self.records).insert(record.id, record);
    }

    pub fn record(&self, id: &RecordId) -> Option<RemoteRecord> {
        lock(&self.records).get(id).cloned()
    }

    pub fn records(&self) -> Vec<RemoteRecord> {
        lock(&self.records).values().cloned().collect()
    }

    pub fn calls(&self) -> Vec<Call> {
        lock(&self.calls).clone()
    }

    /// Calls that mutate remote state
    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|call| matches!(call, Call::Create(_) | Call::Update(_) | Call::Delete(_)))
            .collect()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Have `create_record` ignore the client id and mint its own.
    pub fn assign_ids(&self) {
        self.assign_ids.store(true, Ordering::SeqCst);
    }

    /// Make every write against `id` fail with a non-transport error.
    pub fn fail_writes_for(&self, id: RecordId) {
        lock(&self.failing).insert(id);
    }

    pub fn clear_failures(&self) {
        lock(&self.failing).clear();
    }

    /// Make `list_records` fail with a non-transport error.
    pub fn fail_listing(&self) {
        self.listing_fails.store(true, Ordering::SeqCst);
    }

    /// Pause the next `list_records` call.
    pub fn hold_listing(&self) -> Arc<Hold> {
        arm(&self.listing_hold)
    }

    /// Pause the next `create_record` call before it touches any row.
    pub fn hold_creating(&self) -> Arc<Hold> {
        arm(&self.creating_hold)
    }

    pub fn subscriber_count(&self) -> usize {
        lock(&self.subscribers).len()
    }

    /// Deliver an event to every live subscriber.
    pub fn emit(&self, event: &ChangeEvent) {
        lock(&self.subscribers).retain(|_, sink| sink.send(event.clone()).is_ok());
    }

    fn enter(&self, call: Call) -> RemoteResult<()> {
        lock(&self.calls).push(call);
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(RemoteError::Unavailable("network is down".to_string()));
        }
        Ok(())
    }

    fn check_writable(&self, id: &RecordId) -> RemoteResult<()> {
        if lock(&self.failing).contains(id) {
            return Err(RemoteError::Api {
                status: 400,
                message: format!("row {id} rejected"),
            });
        }
        Ok(())
    }
}

impl RemoteGateway for MemoryGateway {
    async fn list_records(&self, filter: &RecordFilter) -> RemoteResult<Vec<RemoteRecord>> {
        self.enter(Call::List)?;
        pause(&self.listing_hold).await;
        if self.listing_fails.load(Ordering::SeqCst) {
            return Err(RemoteError::Api {
                status: 400,
                message: "listing rejected".to_string(),
            });
        }
        Ok(lock(&self.records)
            .values()
            .filter(|record| filter.matches(record))
            .cloned()
            .collect())
    }

    async fn get_record(&self, id: &RecordId) -> RemoteResult<Option<RemoteRecord>> {
        self.enter(Call::Get(*id))?;
        Ok(self.record(id))
    }

    async fn create_record(&self, payload: &RemoteRecord) -> RemoteResult<RemoteRecord> {
        self.enter(Call::Create(payload.unique_code.clone()))?;
        pause(&self.creating_hold).await;
        self.check_writable(&payload.id)?;

        let mut records = lock(&self.records);
        if records
            .values()
            .any(|record| record.unique_code == payload.unique_code)
        {
            return Err(RemoteError::Conflict {
                unique_code: payload.unique_code.clone(),
            });
        }

        let mut created = payload.clone();
        if self.assign_ids.load(Ordering::SeqCst) {
            created.id = RecordId::new();
        }
        records.insert(created.id, created.clone());
        Ok(created)
    }

    async fn update_record(
        &self,
        id: &RecordId,
        payload: &RemoteRecord,
    ) -> RemoteResult<RemoteRecord> {
        self.enter(Call::Update(*id))?;
        self.check_writable(id)?;

        let mut records = lock(&self.records);
        if !records.contains_key(id) {
            return Err(RemoteError::NotFound(id.to_string()));
        }
        let mut updated = payload.clone();
        updated.id = *id;
        records.insert(*id, updated.clone());
        Ok(updated)
    }

    async fn delete_record(&self, id: &RecordId) -> RemoteResult<()> {
        self.enter(Call::Delete(*id))?;
        self.check_writable(id)?;

        lock(&self.records)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn subscribe(
        &self,
        sink: mpsc::UnboundedSender<ChangeEvent>,
    ) -> RemoteResult<SubscriptionHandle> {
        self.enter(Call::Subscribe)?;
        let id = self.next_subscription.fetch_add(1, Ordering::SeqCst);
        lock(&self.subscribers).insert(id, sink);
        Ok(SubscriptionHandle(id))
    }

    async fn unsubscribe(&self, handle: SubscriptionHandle) -> RemoteResult<()> {
        lock(&self.calls).push(Call::Unsubscribe);
        lock(&self.subscribers).remove(&handle.0);
        Ok(())
    }

    async fn ping(&self) -> RemoteResult<()> {
        self.enter(Call::Ping)
    }
}
