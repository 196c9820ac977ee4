//! Page snapshot repository

use crate::error::Result;
use crate::models::PageSnapshot;
use libsql::{params, Connection};

/// libSQL access to the `page_snapshots` table
pub struct LibSqlSnapshotRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlSnapshotRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn get(&self, page_id: &str) -> Result<Option<PageSnapshot>> {
        let mut rows = self
            .conn
            .query(
                "SELECT page_id, page_type, data, data_version, snapshot_at, schema_version
                 FROM page_snapshots WHERE page_id = ?",
                [page_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let data: String = row.get(2)?;
        Ok(Some(PageSnapshot {
            page_id: row.get(0)?,
            page_type: row.get(1)?,
            data: serde_json::from_str(&data)?,
            data_version: row.get(3)?,
            snapshot_at: row.get(4)?,
            schema_version: row.get(5)?,
        }))
    }

    /// Insert or replace the snapshot for its page
    pub async fn upsert(&self, snapshot: &PageSnapshot) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO page_snapshots (page_id, page_type, data, data_version, snapshot_at, schema_version)
                 VALUES (?, ?, ?, ?, ?, ?)",
                params![
                    snapshot.page_id.as_str(),
                    snapshot.page_type.as_str(),
                    serde_json::to_string(&snapshot.data)?,
                    snapshot.data_version.as_str(),
                    snapshot.snapshot_at,
                    snapshot.schema_version
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn delete(&self, page_id: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM page_snapshots WHERE page_id = ?", [page_id])
            .await?;
        Ok(())
    }

    /// Delete every snapshot whose page id contains `token`
    pub async fn delete_containing(&self, token: &str) -> Result<usize> {
        let rows = self
            .conn
            .execute(
                "DELETE FROM page_snapshots WHERE instr(page_id, ?) > 0",
                [token],
            )
            .await?;
        Ok(usize::try_from(rows).unwrap_or(0))
    }
}
