//! Sync run history repository

#![allow(clippy::cast_possible_wrap)] // SQLite uses i64 for LIMIT

use crate::error::Result;
use crate::models::SyncRun;
use libsql::{Connection, Value};

/// Trait for sync history storage operations (async)
#[allow(async_fn_in_trait)]
pub trait SyncRunRepository {
    /// Append a finished pass; the `id` of `run` is ignored
    async fn record(&self, run: &SyncRun) -> Result<i64>;

    /// Most recent passes first
    async fn list(&self, limit: usize) -> Result<Vec<SyncRun>>;
}

/// libSQL implementation of `SyncRunRepository`
pub struct LibSqlSyncRunRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSyncRunRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_run(row: &libsql::Row) -> Result<SyncRun> {
        let error = match row.get_value(8)? {
            Value::Text(text) => Some(text),
            _ => None,
        };
        Ok(SyncRun {
            id: row.get(0)?,
            started_at: row.get(1)?,
            finished_at: row.get(2)?,
            outcome: row.get(3)?,
            pulled: row.get(4)?,
            pushed: row.get(5)?,
            drained: row.get(6)?,
            failures: row.get(7)?,
            error,
        })
    }
}

impl SyncRunRepository for LibSqlSyncRunRepository<'_> {
    async fn record(&self, run: &SyncRun) -> Result<i64> {
        let error = run.error.clone().map_or(Value::Null, Value::Text);
        self.conn
            .execute(
                "INSERT INTO sync_runs
                    (started_at, finished_at, outcome, pulled, pushed, drained, failures, error)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                libsql::params![
                    run.started_at,
                    run.finished_at,
                    run.outcome.as_str(),
                    run.pulled,
                    run.pushed,
                    run.drained,
                    run.failures,
                    error
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn list(&self, limit: usize) -> Result<Vec<SyncRun>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, started_at, finished_at, outcome, pulled, pushed, drained, failures, error
                 FROM sync_runs
                 ORDER BY finished_at DESC, id DESC
                 LIMIT ?",
                [limit as i64],
            )
            .await?;

        let mut runs = Vec::new();
        while let Some(row) = rows.next().await? {
            runs.push(Self::parse_run(&row)?);
        }
        Ok(runs)
    }
}
