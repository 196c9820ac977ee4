//! Local domain record repository

use crate::error::{Error, Result};
use crate::models::{LocalId, LocalRecord, RecordData, RecordKind, SyncStatus};
use crate::util::now_millis;
use libsql::{params, Connection, Row};

const RECORD_COLUMNS: &str =
    "local_id, parent_id, scope_id, sync_status, data, created_at, updated_at";

/// Trait for local record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository {
    /// Insert or replace a record
    async fn upsert(&self, record: &LocalRecord) -> Result<()>;

    /// Get a record by local ID
    async fn get(&self, local_id: &str) -> Result<Option<LocalRecord>>;

    /// Unsynced records of a kind, optionally within a scope, oldest first
    async fn list_unsynced(&self, kind: RecordKind, scope_id: Option<&str>)
        -> Result<Vec<LocalRecord>>;

    /// Unsynced records whose parent is `parent_id`, oldest first
    async fn list_children(&self, parent_id: &str) -> Result<Vec<LocalRecord>>;

    /// Replace the kind-specific data of a record
    async fn update_data(&self, local_id: &str, data: &RecordData) -> Result<()>;

    /// Set the sync status of a record; missing records are ignored
    async fn set_status(&self, local_id: &str, status: SyncStatus) -> Result<()>;

    /// Delete a record
    async fn delete(&self, local_id: &str) -> Result<()>;

    /// Delete every synced record, returning the removed IDs
    async fn purge_synced(&self) -> Result<Vec<String>>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlRecordRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_record(row: &Row) -> Result<LocalRecord> {
        let local_id: String = row.get(0)?;
        let status: String = row.get(3)?;
        let data: String = row.get(4)?;

        Ok(LocalRecord {
            local_id: local_id
                .parse::<LocalId>()
                .map_err(|_| Error::Database(format!("Invalid local id: {local_id}")))?,
            parent_id: row.get(1)?,
            scope_id: row.get(2)?,
            sync_status: status.parse()?,
            data: serde_json::from_str(&data)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    async fn query_records(
        &self,
        sql: &str,
        params: impl libsql::params::IntoParams,
    ) -> Result<Vec<LocalRecord>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }
}

impl RecordRepository for LibSqlRecordRepository<'_> {
    async fn upsert(&self, record: &LocalRecord) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO local_records (local_id, kind, parent_id, scope_id, sync_status, data, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
                params![
                    record.local_id.as_str(),
                    record.kind().as_str(),
                    record.parent_id.clone(),
                    record.scope_id.clone(),
                    record.sync_status.as_str(),
                    serde_json::to_string(&record.data)?,
                    record.created_at,
                    record.updated_at
                ],
            )
            .await?;
        Ok(())
    }

    async fn get(&self, local_id: &str) -> Result<Option<LocalRecord>> {
        let records = self
            .query_records(
                &format!("SELECT {RECORD_COLUMNS} FROM local_records WHERE local_id = ?"),
                [local_id],
            )
            .await?;
        Ok(records.into_iter().next())
    }

    async fn list_unsynced(
        &self,
        kind: RecordKind,
        scope_id: Option<&str>,
    ) -> Result<Vec<LocalRecord>> {
        match scope_id {
            Some(scope_id) => {
                self.query_records(
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM local_records
                         WHERE kind = ? AND scope_id = ? AND sync_status != 'synced'
                         ORDER BY created_at ASC, rowid ASC"
                    ),
                    [kind.as_str(), scope_id],
                )
                .await
            }
            None => {
                self.query_records(
                    &format!(
                        "SELECT {RECORD_COLUMNS} FROM local_records
                         WHERE kind = ? AND sync_status != 'synced'
                         ORDER BY created_at ASC, rowid ASC"
                    ),
                    [kind.as_str()],
                )
                .await
            }
        }
    }

    async fn list_children(&self, parent_id: &str) -> Result<Vec<LocalRecord>> {
        self.query_records(
            &format!(
                "SELECT {RECORD_COLUMNS} FROM local_records
                 WHERE parent_id = ? AND sync_status != 'synced'
                 ORDER BY created_at ASC, rowid ASC"
            ),
            [parent_id],
        )
        .await
    }

    async fn update_data(&self, local_id: &str, data: &RecordData) -> Result<()> {
        let rows = self
            .conn
            .execute(
                "UPDATE local_records SET data = ?, updated_at = ? WHERE local_id = ?",
                params![serde_json::to_string(data)?, now_millis(), local_id],
            )
            .await?;

        if rows == 0 {
            return Err(Error::NotFound(local_id.to_string()));
        }
        Ok(())
    }

    async fn set_status(&self, local_id: &str, status: SyncStatus) -> Result<()> {
        self.conn
            .execute(
                "UPDATE local_records SET sync_status = ?, updated_at = ? WHERE local_id = ?",
                params![status.as_str(), now_millis(), local_id],
            )
            .await?;
        Ok(())
    }

    async fn delete(&self, local_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM local_records WHERE local_id = ?", [local_id])
            .await?;
        Ok(())
    }

    async fn purge_synced(&self) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT local_id FROM local_records WHERE sync_status = 'synced'",
                (),
            )
            .await?;
        let mut ids = Vec::new();
        while let Some(row) = rows.next().await? {
            ids.push(row.get::<String>(0)?);
        }

        self.conn
            .execute("DELETE FROM local_records WHERE sync_status = 'synced'", ())
            .await?;
        Ok(ids)
    }
}
