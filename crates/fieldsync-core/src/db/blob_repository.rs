//! Media blob storage for captures awaiting upload

use crate::error::Result;
use crate::util::now_millis;
use libsql::{params, Connection};

/// Binary media persisted locally until its upload entry syncs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub blob_id: String,
    /// Capture record owning this blob
    pub record_local_id: String,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
    pub created_at: i64,
}

impl MediaBlob {
    pub fn new(
        blob_id: impl Into<String>,
        record_local_id: impl Into<String>,
        filename: impl Into<String>,
        mime_type: impl Into<String>,
        bytes: Vec<u8>,
    ) -> Self {
        Self {
            blob_id: blob_id.into(),
            record_local_id: record_local_id.into(),
            filename: filename.into(),
            mime_type: mime_type.into(),
            bytes,
            created_at: now_millis(),
        }
    }
}

/// libSQL access to the `media_blobs` table
pub struct LibSqlBlobRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlBlobRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    pub async fn put(&self, blob: &MediaBlob) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR REPLACE INTO media_blobs (blob_id, record_local_id, filename, mime_type, size_bytes, bytes, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?)",
                params![
                    blob.blob_id.as_str(),
                    blob.record_local_id.as_str(),
                    blob.filename.as_str(),
                    blob.mime_type.as_str(),
                    i64::try_from(blob.bytes.len()).unwrap_or(i64::MAX),
                    blob.bytes.clone(),
                    blob.created_at
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, blob_id: &str) -> Result<Option<MediaBlob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT blob_id, record_local_id, filename, mime_type, bytes, created_at
                 FROM media_blobs WHERE blob_id = ?",
                [blob_id],
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        Ok(Some(MediaBlob {
            blob_id: row.get(0)?,
            record_local_id: row.get(1)?,
            filename: row.get(2)?,
            mime_type: row.get(3)?,
            bytes: row.get(4)?,
            created_at: row.get(5)?,
        }))
    }

    /// Look up the blob owned by a capture record
    pub async fn get_for_record(&self, record_local_id: &str) -> Result<Option<MediaBlob>> {
        let mut rows = self
            .conn
            .query(
                "SELECT blob_id FROM media_blobs WHERE record_local_id = ? LIMIT 1",
                [record_local_id],
            )
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(None);
        };
        let blob_id: String = row.get(0)?;
        self.get(&blob_id).await
    }

    pub async fn delete_for_records(&self, record_local_ids: &[String]) -> Result<usize> {
        let mut removed = 0;
        for id in record_local_ids {
            let rows = self
                .conn
                .execute(
                    "DELETE FROM media_blobs WHERE record_local_id = ?",
                    [id.as_str()],
                )
                .await?;
            removed += usize::try_from(rows).unwrap_or(0);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_put_get_delete() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlBlobRepository::new(db.connection());

        let blob = MediaBlob::new("b1", "rec-1", "photo.jpg", "image/jpeg", vec![1, 2, 3]);
        repo.put(&blob).await.unwrap();

        assert_eq!(repo.get("b1").await.unwrap(), Some(blob.clone()));
        assert_eq!(repo.get_for_record("rec-1").await.unwrap(), Some(blob));

        let removed = repo
            .delete_for_records(&["rec-1".to_string()])
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(repo.get("b1").await.unwrap().is_none());
    }
}
