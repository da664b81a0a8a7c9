//! Entry repository implementation

use crate::error::Result;
use crate::util::now_millis;
use libsql::Connection;

use super::Collection;

/// Trait for raw key-value storage operations (async)
#[allow(async_fn_in_trait)]
pub trait EntryRepository {
    /// Insert or replace the value stored under `key`
    async fn put(&self, collection: Collection, key: &str, value: &str) -> Result<()>;

    /// Fetch the value stored under `key`
    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>>;

    /// All values in first-insertion order
    async fn list(&self, collection: Collection) -> Result<Vec<String>>;

    /// Remove the value stored under `key`; absent keys are ignored
    async fn delete(&self, collection: Collection, key: &str) -> Result<()>;
}

/// libSQL implementation of `EntryRepository`
pub struct LibSqlEntryRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlEntryRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl EntryRepository for LibSqlEntryRepository<'_> {
    async fn put(&self, collection: Collection, key: &str, value: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO store_entries (collection, key, value, updated_at)
                 VALUES (?1, ?2, ?3, ?4)
                 ON CONFLICT(collection, key)
                 DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                libsql::params![collection.as_str(), key, value, now_millis()],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, collection: Collection, key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM store_entries WHERE collection = ? AND key = ?",
                [collection.as_str(), key],
            )
            .await?;

        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, collection: Collection) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT value FROM store_entries WHERE collection = ? ORDER BY seq ASC",
                [collection.as_str()],
            )
            .await?;

        let mut values = Vec::new();
        while let Some(row) = rows.next().await? {
            values.push(row.get::<String>(0)?);
        }
        Ok(values)
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM store_entries WHERE collection = ? AND key = ?",
                [collection.as_str(), key],
            )
            .await?;
        Ok(())
    }
}
