//! Durable local store shared by the reconciler and the presentation layer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{
    Database, Entity, EntryRepository, LibSqlEntryRepository, LibSqlSyncRunRepository,
    SyncRunRepository, CURRENT_PROFILE_KEY,
};
use crate::models::{
    Condition, OperationId, OperationKind, PendingOperation, Profile, Record, RecordId,
    RemoteRecord, SyncRun,
};
use crate::util::now_millis;
use crate::{Error, Result};

/// Aggregate counters over the record collection
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecordStats {
    pub total: usize,
    pub unsynced: usize,
    pub low_battery: usize,
    pub pending_operations: usize,
    pub by_screen_condition: BTreeMap<Condition, usize>,
    pub by_body_condition: BTreeMap<Condition, usize>,
}

/// Thread-safe handle to the local store.
///
/// Every read and write goes through this type; the reconciler never
/// touches the database connection directly.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open the store at the given filesystem path, creating parent directories.
    ///
    /// Failure here leaves the application without offline capability, so it
    /// is reported with the offending path instead of being retried.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                Error::Storage(format!(
                    "cannot create store directory {}: {error}",
                    parent.display()
                ))
            })?;
        }

        let db = Database::open(&db_path).await.map_err(|error| {
            Error::Storage(format!(
                "cannot open local store at {}: {error}",
                db_path.display()
            ))
        })?;
        tracing::debug!("Opened local store at {}", db_path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem path backing this store, if any.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    // Generic collection access

    /// Upsert an entity under its key.
    pub async fn put<E: Entity>(&self, entity: &E) -> Result<()> {
        let db = self.db.lock().await;
        Entries::new(&db).put(entity).await
    }

    /// Fetch an entity by key; absence is `Ok(None)`.
    pub async fn get<E: Entity>(&self, key: &str) -> Result<Option<E>> {
        let db = self.db.lock().await;
        Entries::new(&db).get(key).await
    }

    /// All entities of a collection in first-insertion order.
    pub async fn list<E: Entity>(&self) -> Result<Vec<E>> {
        let db = self.db.lock().await;
        Entries::new(&db).list().await
    }

    /// Remove an entity by key. Deleting an absent key is not an error.
    pub async fn delete<E: Entity>(&self, key: &str) -> Result<()> {
        let db = self.db.lock().await;
        Entries::new(&db).delete::<E>(key).await
    }

    // Records

    /// Persist a record, stamping its timestamps.
    pub async fn save_record(&self, record: &Record) -> Result<Record> {
        let record = stamped(record);
        self.put(&record).await?;
        Ok(record)
    }

    /// Store a remote copy verbatim as the synced local copy.
    pub async fn store_remote_copy(&self, remote: RemoteRecord) -> Result<Record> {
        let record = remote.into_local(now_millis());
        self.put(&record).await?;
        Ok(record)
    }

    /// Log an insert or update and write the record in one step.
    ///
    /// An update for a record that is not stored fails with `NotFound` and
    /// logs nothing.
    pub async fn stage_record(
        &self,
        kind: OperationKind,
        record: &Record,
    ) -> Result<(PendingOperation, Record)> {
        let db = self.db.lock().await;
        let entries = Entries::new(&db);
        if kind == OperationKind::Update
            && entries.get::<Record>(&record.id.as_str()).await?.is_none()
        {
            return Err(Error::NotFound(format!("record {}", record.id)));
        }

        let operation = PendingOperation::new(
            kind,
            record.id,
            Some(record.to_remote_payload()),
            now_millis(),
        );
        entries.put(&operation).await?;
        let record = stamped(record);
        entries.put(&record).await?;
        Ok((operation, record))
    }

    /// Log a delete and remove the record in one step.
    pub async fn stage_delete(&self, id: RecordId) -> Result<PendingOperation> {
        let db = self.db.lock().await;
        let entries = Entries::new(&db);
        let operation = PendingOperation::new(OperationKind::Delete, id, None, now_millis());
        entries.put(&operation).await?;
        entries.delete::<Record>(&id.as_str()).await?;
        Ok(operation)
    }

    /// Overwrite the local copy with a pulled one unless local intent would be lost.
    ///
    /// The checks and the write happen under one lock, so a local edit can
    /// never land between them.
    pub async fn apply_pulled_copy(&self, remote: RemoteRecord) -> Result<PulledCopy> {
        let db = self.db.lock().await;
        let entries = Entries::new(&db);
        match entries.get::<Record>(&remote.id.as_str()).await? {
            Some(local) if !local.synced => return Ok(PulledCopy::KeptLocalEdits),
            Some(local) if local.matches_remote(&remote) => return Ok(PulledCopy::Unchanged),
            Some(_) => {}
            None => {
                let delete_pending = entries
                    .list::<PendingOperation>()
                    .await?
                    .iter()
                    .any(|operation| {
                        !operation.synced
                            && operation.kind == OperationKind::Delete
                            && operation.record_id == remote.id
                    });
                if delete_pending {
                    return Ok(PulledCopy::DeletePending);
                }
            }
        }
        entries.put(&remote.into_local(now_millis())).await?;
        Ok(PulledCopy::Stored)
    }

    /// Take the remote copy returned for a pushed record.
    ///
    /// When the remote store assigned a different id, the local record and
    /// every open operation for it move to that id, including a delete made
    /// while the push was in flight. A record edited meanwhile keeps its
    /// edits and stays unsynced.
    pub async fn adopt_remote_copy(
        &self,
        pushed: &Record,
        remote: RemoteRecord,
    ) -> Result<Adoption> {
        let db = self.db.lock().await;
        let entries = Entries::new(&db);
        let remote_id = remote.id;
        let local_key = pushed.id.as_str();
        let moved = remote_id != pushed.id;

        let adoption = match entries.get::<Record>(&local_key).await? {
            None => Adoption::DeletedMeanwhile,
            Some(mut current) if current != *pushed => {
                if moved {
                    current.id = remote_id;
                    entries.put(&current).await?;
                    entries.delete::<Record>(&local_key).await?;
                }
                Adoption::EditedMeanwhile
            }
            Some(_) => {
                entries.put(&remote.into_local(now_millis())).await?;
                if moved {
                    entries.delete::<Record>(&local_key).await?;
                    Adoption::Remapped
                } else {
                    Adoption::Stored
                }
            }
        };

        if moved {
            let retargeted = entries.retarget(&pushed.id, &remote_id).await?;
            tracing::debug!(
                "Moved {} to remote id {remote_id} with {retargeted} open operation(s)",
                pushed.id
            );
        }
        Ok(adoption)
    }

    pub async fn get_record(&self, id: &RecordId) -> Result<Option<Record>> {
        self.get(&id.as_str()).await
    }

    pub async fn list_records(&self) -> Result<Vec<Record>> {
        self.list().await
    }

    pub async fn delete_record(&self, id: &RecordId) -> Result<()> {
        self.delete::<Record>(&id.as_str()).await
    }

    /// Records whose local copy is not confirmed remotely.
    pub async fn unsynced_records(&self) -> Result<Vec<Record>> {
        let records = self.list_records().await?;
        Ok(records.into_iter().filter(|record| !record.synced).collect())
    }

    /// Look up a record by its business key.
    pub async fn find_by_unique_code(&self, unique_code: &str) -> Result<Option<Record>> {
        let unique_code = unique_code.trim();
        let records = self.list_records().await?;
        Ok(records
            .into_iter()
            .find(|record| record.unique_code == unique_code))
    }

    /// Case-insensitive substring search over the descriptive fields.
    pub async fn search_records(&self, query: &str) -> Result<Vec<Record>> {
        let needle = query.trim().to_lowercase();
        let records = self.list_records().await?;
        if needle.is_empty() {
            return Ok(records);
        }
        Ok(records
            .into_iter()
            .filter(|record| record.search_haystack().contains(&needle))
            .collect())
    }

    pub async fn record_stats(&self) -> Result<RecordStats> {
        let records = self.list_records().await?;
        let pending = self.unsynced_operations().await?;

        let mut stats = RecordStats {
            total: records.len(),
            pending_operations: pending.len(),
            ..RecordStats::default()
        };
        for record in &records {
            if !record.synced {
                stats.unsynced += 1;
            }
            if record.is_low_battery() {
                stats.low_battery += 1;
            }
            *stats
                .by_screen_condition
                .entry(record.screen_condition)
                .or_default() += 1;
            *stats
                .by_body_condition
                .entry(record.body_condition)
                .or_default() += 1;
        }
        Ok(stats)
    }

    // Pending operations

    /// Append a new unsynced operation at the end of the log.
    pub async fn append_pending_operation(
        &self,
        kind: OperationKind,
        record_id: RecordId,
        payload: Option<RemoteRecord>,
    ) -> Result<PendingOperation> {
        let operation = PendingOperation::new(kind, record_id, payload, now_millis());
        self.put(&operation).await?;
        Ok(operation)
    }

    /// Flip an operation to synced. Missing operations are ignored.
    pub async fn mark_pending_operation_synced(&self, id: &OperationId) -> Result<()> {
        let Some(mut operation) = self.get::<PendingOperation>(&id.as_str()).await? else {
            tracing::debug!("Pending operation {id} vanished before it was marked synced");
            return Ok(());
        };
        if operation.synced {
            return Ok(());
        }
        operation.synced = true;
        self.put(&operation).await
    }

    /// The full operation log in creation order.
    pub async fn pending_operations(&self) -> Result<Vec<PendingOperation>> {
        self.list().await
    }

    /// Operations not yet confirmed remotely, in creation order.
    pub async fn unsynced_operations(&self) -> Result<Vec<PendingOperation>> {
        let operations = self.pending_operations().await?;
        Ok(operations
            .into_iter()
            .filter(|operation| !operation.synced)
            .collect())
    }

    /// Remove operations already confirmed remotely. Returns how many were removed.
    pub async fn purge_synced_operations(&self) -> Result<usize> {
        let operations = self.pending_operations().await?;
        let mut purged = 0;
        for operation in operations.iter().filter(|operation| operation.synced) {
            self.delete::<PendingOperation>(&operation.id.as_str())
                .await?;
            purged += 1;
        }
        Ok(purged)
    }

    /// Point unsynced operations for `from` at `to` after an id remap.
    pub async fn retarget_pending_operations(&self, from: &RecordId, to: &RecordId) -> Result<usize> {
        let db = self.db.lock().await;
        Entries::new(&db).retarget(from, to).await
    }

    // Profile

    pub async fn save_profile(&self, profile: &Profile) -> Result<()> {
        self.put(profile).await
    }

    pub async fn load_profile(&self) -> Result<Option<Profile>> {
        self.get(CURRENT_PROFILE_KEY).await
    }

    pub async fn clear_profile(&self) -> Result<()> {
        self.delete::<Profile>(CURRENT_PROFILE_KEY).await
    }

    // Sync history

    pub async fn record_sync_run(&self, run: &SyncRun) -> Result<i64> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncRunRepository::new(db.connection());
        repo.record(run).await
    }

    /// Most recent passes first.
    pub async fn list_sync_runs(&self, limit: usize) -> Result<Vec<SyncRun>> {
        let db = self.db.lock().await;
        let repo = LibSqlSyncRunRepository::new(db.connection());
        repo.list(limit).await
    }
}

/// Result of applying a pulled remote copy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulledCopy {
    Stored,
    Unchanged,
    /// The local copy holds edits that have not been pushed yet.
    KeptLocalEdits,
    /// The record was deleted locally and the delete is still open.
    DeletePending,
}

/// What happened to a pushed record when its remote copy was adopted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adoption {
    Stored,
    /// Stored under the id the remote store assigned.
    Remapped,
    DeletedMeanwhile,
    EditedMeanwhile,
}

fn stamped(record: &Record) -> Record {
    let now = now_millis();
    let mut record = record.clone();
    record.updated_at = Some(now);
    if record.created_at.is_none() {
        record.created_at = Some(now);
    }
    record
}

/// Typed entity access over a connection whose lock is already held
struct Entries<'a> {
    repo: LibSqlEntryRepository<'a>,
}

impl<'a> Entries<'a> {
    fn new(db: &'a Database) -> Self {
        Self {
            repo: LibSqlEntryRepository::new(db.connection()),
        }
    }

    async fn put<E: Entity>(&self, entity: &E) -> Result<()> {
        let value = serde_json::to_string(entity)?;
        self.repo.put(E::COLLECTION, &entity.key(), &value).await
    }

    async fn get<E: Entity>(&self, key: &str) -> Result<Option<E>> {
        self.repo
            .get(E::COLLECTION, key)
            .await?
            .map(|value| serde_json::from_str(&value).map_err(Error::from))
            .transpose()
    }

    async fn list<E: Entity>(&self) -> Result<Vec<E>> {
        self.repo
            .list(E::COLLECTION)
            .await?
            .iter()
            .map(|value| serde_json::from_str(value).map_err(Error::from))
            .collect()
    }

    async fn delete<E: Entity>(&self, key: &str) -> Result<()> {
        self.repo.delete(E::COLLECTION, key).await
    }

    async fn retarget(&self, from: &RecordId, to: &RecordId) -> Result<usize> {
        let mut retargeted = 0;
        for mut operation in self.list::<PendingOperation>().await? {
            if operation.synced || operation.record_id != *from {
                continue;
            }
            operation.record_id = *to;
            if let Some(payload) = operation.payload.as_mut() {
                payload.id = *to;
            }
            self.put(&operation).await?;
            retargeted += 1;
        }
        Ok(retargeted)
    }
}
