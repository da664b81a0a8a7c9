//! The reconciler: one pass pulls remote records, pushes local edits and
//! drains the pending-operation log.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

use super::gate::SyncGate;
use super::report::{PassOutcome, SkipReason, SyncPhase, SyncReport};
use crate::models::{OperationKind, PendingOperation, Record, RecordId, RemoteRecord, SyncRun};
use crate::remote::{RecordFilter, RemoteError, RemoteGateway, RemoteResult};
use crate::services::{Adoption, LocalStore, PulledCopy};
use crate::state::SyncState;
use crate::util::now_millis;
use crate::Result;

const CHANGE_CHANNEL_CAPACITY: usize = 64;

/// Presentation refresh signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    /// A pass ended, successfully or not
    PassFinished,
    /// A pushed change event rewrote one record
    RecordUpdated(RecordId),
    RecordDeleted(RecordId),
}

/// A user-authored change to record
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalMutation {
    Insert(Record),
    Update(Record),
    Delete(RecordId),
}

/// What [`Reconciler::record_local_mutation`] did
#[derive(Debug)]
pub struct MutationReceipt {
    /// The stored record, for inserts and updates
    pub record: Option<Record>,
    pub operation: PendingOperation,
    /// Instant pass started because the device was online and idle
    pub sync: Option<JoinHandle<PassOutcome>>,
}

pub struct Reconciler<G: RemoteGateway> {
    store: LocalStore,
    gateway: Arc<G>,
    gate: SyncGate,
    connectivity: watch::Receiver<bool>,
    status: watch::Sender<SyncState>,
    changes: broadcast::Sender<StoreChange>,
}

impl<G: RemoteGateway> Reconciler<G> {
    pub fn new(store: LocalStore, gateway: Arc<G>, connectivity: watch::Receiver<bool>) -> Self {
        Self::with_gate(store, gateway, connectivity, SyncGate::new())
    }

    /// Build with an externally owned gate.
    pub fn with_gate(
        store: LocalStore,
        gateway: Arc<G>,
        connectivity: watch::Receiver<bool>,
        gate: SyncGate,
    ) -> Self {
        let initial = if *connectivity.borrow() {
            SyncState::Online
        } else {
            SyncState::Offline
        };
        let (status, _) = watch::channel(initial);
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Self {
            store,
            gateway,
            gate,
            connectivity,
            status,
            changes,
        }
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    pub const fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn is_online(&self) -> bool {
        *self.connectivity.borrow()
    }

    pub fn is_syncing(&self) -> bool {
        self.gate.is_busy()
    }

    pub fn status(&self) -> SyncState {
        *self.status.borrow()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<SyncState> {
        self.status.subscribe()
    }

    pub fn subscribe_changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }

    pub(crate) fn set_status(&self, state: SyncState) {
        self.status.send_replace(state);
    }

    /// Connectivity lost during a pass wins over the pass result.
    fn settled_status(&self, state: SyncState) -> SyncState {
        if self.is_online() {
            state
        } else {
            SyncState::Offline
        }
    }

    pub(crate) fn notify(&self, change: StoreChange) {
        // No receivers is fine; refresh is fire-and-forget.
        let _ = self.changes.send(change);
    }

    /// Run one pass unless offline or another pass holds the gate.
    ///
    /// Errors never escape; they end up in the outcome, the status channel
    /// and the sync history.
    pub async fn trigger_sync(&self, verbose: bool) -> PassOutcome {
        if !self.is_online() {
            tracing::debug!("Sync requested while offline; skipping");
            return PassOutcome::Skipped(SkipReason::Offline);
        }
        let Some(_guard) = self.gate.try_acquire() else {
            tracing::debug!("Sync requested while a pass is running; skipping");
            return PassOutcome::Skipped(SkipReason::AlreadyRunning);
        };

        self.set_status(SyncState::Syncing);
        let started_at = now_millis();
        let mut report = SyncReport::default();

        let outcome = match self.run_pass(&mut report).await {
            Ok(()) => {
                self.set_status(self.settled_status(SyncState::Online));
                if verbose {
                    tracing::info!(
                        "Sync pass finished: pulled={}, pushed={}, drained={}, failures={}",
                        report.pulled,
                        report.pushed,
                        report.drained,
                        report.failures.len()
                    );
                } else {
                    tracing::debug!(
                        "Sync pass finished: pulled={}, pushed={}, drained={}, failures={}",
                        report.pulled,
                        report.pushed,
                        report.drained,
                        report.failures.len()
                    );
                }
                PassOutcome::Completed(report)
            }
            Err(error) => {
                self.set_status(self.settled_status(SyncState::Error));
                tracing::error!("Sync pass failed: {error}");
                PassOutcome::Failed {
                    report,
                    error: error.to_string(),
                }
            }
        };

        self.record_history(started_at, &outcome).await;
        self.notify(StoreChange::PassFinished);
        outcome
    }

    /// Apply a user edit locally, log it, and start an instant pass if possible.
    ///
    /// The operation and the record are written together, so an unsynced
    /// record never exists without its operation.
    pub async fn record_local_mutation(
        self: &Arc<Self>,
        mutation: LocalMutation,
    ) -> Result<MutationReceipt> {
        let (operation, record) = match mutation {
            LocalMutation::Insert(record) => self.stage(OperationKind::Insert, record).await?,
            LocalMutation::Update(record) => self.stage(OperationKind::Update, record).await?,
            LocalMutation::Delete(id) => (self.store.stage_delete(id).await?, None),
        };
        tracing::debug!(
            "Recorded {} for {} as operation {}",
            operation.kind,
            operation.record_id,
            operation.id
        );

        let sync = (self.is_online() && !self.is_syncing()).then(|| {
            let reconciler = Arc::clone(self);
            tokio::spawn(async move { reconciler.trigger_sync(false).await })
        });

        Ok(MutationReceipt {
            record,
            operation,
            sync,
        })
    }

    async fn stage(
        &self,
        kind: OperationKind,
        mut record: Record,
    ) -> Result<(PendingOperation, Option<Record>)> {
        record.validate()?;
        record.synced = false;
        let (operation, record) = self.store.stage_record(kind, &record).await?;
        Ok((operation, Some(record)))
    }

    async fn run_pass(&self, report: &mut SyncReport) -> Result<()> {
        self.pull(report).await?;
        self.push(report).await?;
        self.drain(report).await
    }

    async fn pull(&self, report: &mut SyncReport) -> Result<()> {
        let remote_records = match self.gateway.list_records(&RecordFilter::all()).await {
            Ok(records) => records,
            Err(error) if error.is_unavailable() => return Err(error.into()),
            Err(error) => {
                tracing::warn!("Pull failed: {error}");
                report.fail(None, SyncPhase::Pull, error);
                return Ok(());
            }
        };

        for remote in remote_records {
            let id = remote.id;
            match self.store.apply_pulled_copy(remote).await? {
                PulledCopy::Stored => report.pulled += 1,
                PulledCopy::Unchanged => {}
                PulledCopy::KeptLocalEdits => {
                    tracing::debug!("Keeping unpushed local edits for {id}");
                    report.skipped_unsynced += 1;
                }
                PulledCopy::DeletePending => {
                    tracing::debug!("Not restoring {id} while its delete is pending");
                    report.skipped_unsynced += 1;
                }
            }
        }
        Ok(())
    }

    async fn push(&self, report: &mut SyncReport) -> Result<()> {
        for record in self.store.unsynced_records().await? {
            match self.push_record(&record).await {
                Ok(remote) => self.adopt(&record, remote, report).await?,
                Err(error) if error.is_unavailable() => return Err(error.into()),
                Err(error) => {
                    tracing::warn!("Failed to push {} ({}): {error}", record.id, record.unique_code);
                    report.fail(Some(record.id), SyncPhase::Push, error);
                }
            }
        }
        Ok(())
    }

    async fn push_record(&self, record: &Record) -> RemoteResult<RemoteRecord> {
        let payload = record.to_remote_payload();
        if self.gateway.get_record(&record.id).await?.is_some() {
            return self.gateway.update_record(&record.id, &payload).await;
        }

        match self.gateway.create_record(&payload).await {
            Err(RemoteError::Conflict { unique_code }) => {
                let twin = self
                    .gateway
                    .list_records(&RecordFilter::by_unique_code(unique_code.as_str()))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or(RemoteError::Conflict { unique_code })?;
                tracing::debug!(
                    "Unique code {} already belongs to remote {}; updating it instead of {}",
                    twin.unique_code,
                    twin.id,
                    record.id
                );
                let mut payload = payload;
                payload.id = twin.id;
                self.gateway.update_record(&twin.id, &payload).await
            }
            result => result,
        }
    }

    /// Store the confirmed remote copy, moving the record to the remote id if needed.
    async fn adopt(&self, pushed: &Record, remote: RemoteRecord, report: &mut SyncReport) -> Result<()> {
        report.pushed += 1;
        let remote_id = remote.id;
        let adoption = self.store.adopt_remote_copy(pushed, remote).await?;
        match adoption {
            Adoption::DeletedMeanwhile => {
                tracing::debug!("{} was deleted locally during push", pushed.id);
            }
            Adoption::EditedMeanwhile => {
                tracing::debug!("{} was edited locally during push", pushed.id);
            }
            Adoption::Stored | Adoption::Remapped => {}
        }
        if remote_id != pushed.id {
            report.remapped += 1;
        }
        Ok(())
    }

    async fn drain(&self, report: &mut SyncReport) -> Result<()> {
        // A record whose earlier operation is still open keeps later ones waiting.
        let mut blocked: HashSet<RecordId> = HashSet::new();

        for operation in self.store.unsynced_operations().await? {
            if blocked.contains(&operation.record_id) {
                continue;
            }

            let applied = match operation.kind {
                OperationKind::Insert | OperationKind::Update => self
                    .store
                    .get_record(&operation.record_id)
                    .await?
                    .is_none_or(|record| record.synced),
                OperationKind::Delete => {
                    match self.gateway.delete_record(&operation.record_id).await {
                        Ok(()) => {
                            // A pulled twin may still hold the retargeted id
                            self.store.delete_record(&operation.record_id).await?;
                            true
                        }
                        Err(error) if error.is_not_found() => true,
                        Err(error) if error.is_unavailable() => return Err(error.into()),
                        Err(error) => {
                            tracing::warn!(
                                "Failed to delete {} remotely: {error}",
                                operation.record_id
                            );
                            report.fail(Some(operation.record_id), SyncPhase::Drain, error);
                            false
                        }
                    }
                }
            };

            if applied {
                self.store
                    .mark_pending_operation_synced(&operation.id)
                    .await?;
                report.drained += 1;
            } else {
                blocked.insert(operation.record_id);
            }
        }
        Ok(())
    }

    async fn record_history(&self, started_at: i64, outcome: &PassOutcome) {
        let Some(report) = outcome.report() else {
            return;
        };
        let error = match outcome {
            PassOutcome::Failed { error, .. } => Some(error.clone()),
            _ => None,
        };
        let run = SyncRun {
            id: 0,
            started_at,
            finished_at: now_millis(),
            outcome: if error.is_some() { "error" } else { "success" }.to_string(),
            pulled: count(report.pulled),
            pushed: count(report.pushed),
            drained: count(report.drained),
            failures: count(report.failures.len()),
            error,
        };
        if let Err(error) = self.store.record_sync_run(&run).await {
            tracing::warn!("Failed to record sync history: {error}");
        }
    }
}

fn count(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}
