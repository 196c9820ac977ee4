//! Sync queue repository

use crate::error::{Error, Result};
use crate::models::{QueueEntry, QueueEntryId, QueueStatus, SyncAction};
use crate::util::now_millis;
use libsql::{params, Connection, Row};

const ENTRY_COLUMNS: &str =
    "id, payload, depends_on, status, retry_count, last_error, created_at, updated_at";

/// Trait for sync queue storage operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append a new entry
    async fn insert(&self, entry: &QueueEntry) -> Result<()>;

    /// Get an entry by ID
    async fn get(&self, id: &QueueEntryId) -> Result<Option<QueueEntry>>;

    /// All entries in drain order (oldest first, insertion order breaks ties)
    async fn list(&self) -> Result<Vec<QueueEntry>>;

    /// Entries not yet confirmed by the remote system, in drain order
    async fn list_unsynced(&self) -> Result<Vec<QueueEntry>>;

    /// Persist status, retry count and last error of an entry
    async fn update_state(&self, entry: &QueueEntry) -> Result<()>;

    /// Remove entries by ID, returning how many were removed
    async fn delete(&self, ids: &[QueueEntryId]) -> Result<usize>;

    /// Remove every synced entry
    async fn purge_synced(&self) -> Result<usize>;

    /// Number of entries not yet synced
    async fn count_unsynced(&self) -> Result<usize>;

    /// Number of entries that exhausted `retry_budget`
    async fn count_stuck(&self, retry_budget: u32) -> Result<usize>;

    /// Not-yet-synced entries whose target is `local_id`
    async fn list_open_for_target(&self, local_id: &str) -> Result<Vec<QueueEntry>>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &Row) -> Result<QueueEntry> {
        let id: String = row.get(0)?;
        let payload: String = row.get(1)?;
        let depends_on: String = row.get(2)?;
        let status: String = row.get(3)?;
        let retry_count: i64 = row.get(4)?;

        Ok(QueueEntry {
            id: id
                .parse()
                .map_err(|_| Error::Database(format!("Invalid queue entry id: {id}")))?,
            action: serde_json::from_str::<SyncAction>(&payload)?,
            depends_on: serde_json::from_str(&depends_on)?,
            status: status.parse()?,
            retry_count: u32::try_from(retry_count).unwrap_or(u32::MAX),
            last_error: row.get(5)?,
            created_at: row.get(6)?,
            updated_at: row.get(7)?,
        })
    }

    async fn query_entries(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<QueueEntry>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn count(&self, sql: &str, params: impl libsql::params::IntoParams) -> Result<usize> {
        let mut rows = self.conn.query(sql, params).await?;
        let count: i64 = match rows.next().await? {
            Some(row) => row.get(0)?,
            None => 0,
        };
        Ok(usize::try_from(count).unwrap_or(0))
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn insert(&self, entry: &QueueEntry) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO sync_queue (id, action, payload, depends_on, target_local_id, status, retry_count, last_error, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    entry.id.as_str(),
                    entry.action.name(),
                    serde_json::to_string(&entry.action)?,
                    serde_json::to_string(&entry.depends_on)?,
                    entry.action.target_id(),
                    entry.status.as_str(),
                    i64::from(entry.retry_count),
                    entry.last_error.clone(),
                    entry.created_at,
                    entry.updated_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, id: &QueueEntryId) -> Result<Option<QueueEntry>> {
        let entries = self
            .query_entries(
                &format!("SELECT {ENTRY_COLUMNS} FROM sync_queue WHERE id = ?"),
                [id.as_str()],
            )
            .await?;
        Ok(entries.into_iter().next())
    }

    async fn list(&self) -> Result<Vec<QueueEntry>> {
        self.query_entries(
            &format!("SELECT {ENTRY_COLUMNS} FROM sync_queue ORDER BY created_at ASC, rowid ASC"),
            (),
        )
        .await
    }

    async fn list_unsynced(&self) -> Result<Vec<QueueEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM sync_queue
                 WHERE status != 'synced'
                 ORDER BY created_at ASC, rowid ASC"
            ),
            (),
        )
        .await
    }

    async fn update_state(&self, entry: &QueueEntry) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE sync_queue SET status = ?, retry_count = ?, last_error = ?, updated_at = ? WHERE id = ?",
                params![
                    entry.status.as_str(),
                    i64::from(entry.retry_count),
                    entry.last_error.clone(),
                    now_millis(),
                    entry.id.as_str()
                ],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(entry.id.to_string()));
        }
        Ok(())
    }

    async fn delete(&self, ids: &[QueueEntryId]) -> Result<usize> {
        let mut removed = 0;
        for id in ids {
            let rows = self
                .conn
                .execute("DELETE FROM sync_queue WHERE id = ?", [id.as_str()])
                .await?;
            removed += usize::try_from(rows).unwrap_or(0);
        }
        Ok(removed)
    }

    async fn purge_synced(&self) -> Result<usize> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM sync_queue WHERE status = ?",
                [QueueStatus::Synced.as_str()],
            )
            .await?;
        Ok(usize::try_from(rows).unwrap_or(0))
    }

    async fn count_unsynced(&self) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM sync_queue WHERE status != 'synced'",
            (),
        )
        .await
    }

    async fn count_stuck(&self, retry_budget: u32) -> Result<usize> {
        self.count(
            "SELECT COUNT(*) FROM sync_queue WHERE status IN ('pending', 'failed') AND retry_count >= ?",
            params![i64::from(retry_budget)],
        )
        .await
    }

    async fn list_open_for_target(&self, local_id: &str) -> Result<Vec<QueueEntry>> {
        self.query_entries(
            &format!(
                "SELECT {ENTRY_COLUMNS} FROM sync_queue
                 WHERE target_local_id = ? AND status != 'synced'
                 ORDER BY created_at ASC, rowid ASC"
            ),
            [local_id],
        )
        .await
    }
}
