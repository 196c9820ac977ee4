//! Persisted local-id to remote-id translations

use crate::error::Result;
use crate::util::now_millis;
use libsql::{params, Connection};

/// libSQL access to the `id_mappings` table
pub struct LibSqlIdMappingRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlIdMappingRepository<'a> {
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Record a translation; an existing mapping for the key is kept
    pub async fn put(&self, local_key: &str, remote_id: &str) -> Result<()> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO id_mappings (local_key, remote_id, created_at) VALUES (?, ?, ?)",
                params![local_key, remote_id, now_millis()],
            )
            .await?;
        Ok(())
    }

    pub async fn get(&self, local_key: &str) -> Result<Option<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT remote_id FROM id_mappings WHERE local_key = ?",
                [local_key],
            )
            .await?;
        match rows.next().await? {
            Some(row) => Ok(Some(row.get::<String>(0)?)),
            None => Ok(None),
        }
    }

    /// Every local key translated to `remote_id`
    pub async fn local_keys_for(&self, remote_id: &str) -> Result<Vec<String>> {
        let mut rows = self
            .conn
            .query(
                "SELECT local_key FROM id_mappings WHERE remote_id = ? ORDER BY local_key",
                [remote_id],
            )
            .await?;
        let mut keys = Vec::new();
        while let Some(row) = rows.next().await? {
            keys.push(row.get::<String>(0)?);
        }
        Ok(keys)
    }

    /// Drop mappings created before `cutoff_ms` that no local record and no
    /// unsynced queue entry still refers to. Returns the number removed.
    pub async fn prune_unreferenced(&self, cutoff_ms: i64) -> Result<usize> {
        let removed = self
            .conn
            .execute(
                "DELETE FROM id_mappings
                 WHERE created_at < ?1
                   AND NOT EXISTS (
                       SELECT 1 FROM local_records r
                       WHERE r.local_id = id_mappings.local_key
                          OR r.parent_id = id_mappings.local_key
                   )
                   AND NOT EXISTS (
                       SELECT 1 FROM sync_queue q
                       WHERE q.status != 'synced'
                         AND (q.target_local_id = id_mappings.local_key
                              OR instr(q.payload, id_mappings.local_key) > 0
                              OR instr(q.depends_on, id_mappings.local_key) > 0)
                   )",
                params![cutoff_ms],
            )
            .await?;
        Ok(usize::try_from(removed).unwrap_or(usize::MAX))
    }

    pub async fn load_all(&self) -> Result<Vec<(String, String)>> {
        let mut rows = self
            .conn
            .query("SELECT local_key, remote_id FROM id_mappings", ())
            .await?;
        let mut mappings = Vec::new();
        while let Some(row) = rows.next().await? {
            mappings.push((row.get::<String>(0)?, row.get::<String>(1)?));
        }
        Ok(mappings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use pretty_assertions::assert_eq;

    #[tokio::test(flavor = "multi_thread")]
    async fn test_first_mapping_wins() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlIdMappingRepository::new(db.connection());

        repo.put("f1", "srv-42").await.unwrap();
        repo.put("f1", "srv-99").await.unwrap();

        assert_eq!(repo.get("f1").await.unwrap().as_deref(), Some("srv-42"));
        assert_eq!(repo.get("missing").await.unwrap(), None);
        assert_eq!(
            repo.load_all().await.unwrap(),
            vec![("f1".to_string(), "srv-42".to_string())]
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_local_keys_for_remote_id() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlIdMappingRepository::new(db.connection());

        repo.put("entry-1", "srv-42").await.unwrap();
        repo.put("f1", "srv-42").await.unwrap();
        repo.put("f2", "srv-43").await.unwrap();

        assert_eq!(
            repo.local_keys_for("srv-42").await.unwrap(),
            vec!["entry-1".to_string(), "f1".to_string()]
        );
        assert!(repo.local_keys_for("srv-99").await.unwrap().is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_prune_keeps_recent_and_referenced_mappings() {
        let db = Database::open_in_memory().await.unwrap();
        let conn = db.connection();
        let repo = LibSqlIdMappingRepository::new(conn);

        repo.put("old-free", "srv-1").await.unwrap();
        repo.put("old-parent", "srv-2").await.unwrap();
        repo.put("old-queued", "srv-3").await.unwrap();
        repo.put("fresh", "srv-4").await.unwrap();
        conn.execute(
            "UPDATE id_mappings SET created_at = 0 WHERE local_key LIKE 'old-%'",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO local_records (local_id, kind, parent_id, scope_id, sync_status, data, created_at, updated_at)
             VALUES ('c1', 'capture', 'old-parent', 'insp-1', 'pending', '{}', 0, 0)",
            (),
        )
        .await
        .unwrap();
        conn.execute(
            "INSERT INTO sync_queue (id, action, payload, depends_on, target_local_id, status, created_at, updated_at)
             VALUES ('e1', 'create_note', '{\"subject_id\":\"old-queued\"}', '[]', 'n1', 'failed', 0, 0)",
            (),
        )
        .await
        .unwrap();

        let removed = repo.prune_unreferenced(1_000).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(repo.get("old-free").await.unwrap(), None);
        for kept in ["old-parent", "old-queued", "fresh"] {
            assert!(repo.get(kept).await.unwrap().is_some(), "{kept} was pruned");
        }
    }
}
