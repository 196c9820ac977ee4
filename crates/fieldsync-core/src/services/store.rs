//! Shared local store service used by the write path, sync manager, and read bridge.

use std::path::PathBuf;
use std::sync::Arc;

use libsql::Transaction;
use tokio::sync::Mutex;

use crate::db::{
    Database, LibSqlBlobRepository, LibSqlIdMappingRepository, LibSqlQueueRepository,
    LibSqlRecordRepository, LibSqlSnapshotRepository, MediaBlob, QueueRepository,
    RecordRepository,
};
use crate::models::{
    LocalRecord, PageSnapshot, QueueEntry, QueueEntryId, RecordData, RecordKind, SyncStatus,
};
use crate::Result;

/// Thread-safe handle to the device-local store.
///
/// Every operation takes the store lock for its whole duration; operations
/// touching more than one table run in a single transaction.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

/// Rows removed by [`LocalStore::purge_synced`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeCounts {
    pub entries: usize,
    pub records: usize,
    pub blobs: usize,
}

impl LocalStore {
    /// Open the store at the given filesystem path, creating parent directories.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = Database::open(&db_path).await?;
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

    /// Path of the backing file, if any.
    pub const fn path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    // -----------------------------------------------------------------------
    // Records
    // -----------------------------------------------------------------------

    pub async fn get_record(&self, local_id: &str) -> Result<Option<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .get(local_id)
            .await
    }

    pub async fn list_unsynced_records(
        &self,
        kind: RecordKind,
        scope_id: Option<&str>,
    ) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list_unsynced(kind, scope_id)
            .await
    }

    pub async fn list_children(&self, parent_id: &str) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::new(db.connection())
            .list_children(parent_id)
            .await
    }

    /// Unsynced children of `parent_id` and of every local key that maps to it,
    /// oldest first.
    pub async fn list_children_by_any_id(&self, parent_id: &str) -> Result<Vec<LocalRecord>> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let mut parents = vec![parent_id.to_string()];
        parents.extend(
            LibSqlIdMappingRepository::new(conn)
                .local_keys_for(parent_id)
                .await?,
        );

        let records = LibSqlRecordRepository::new(conn);
        let mut children = Vec::new();
        for parent in &parents {
            children.extend(records.list_children(parent).await?);
        }
        children.sort_by_key(|record| record.created_at);
        Ok(children)
    }

    // -----------------------------------------------------------------------
    // Queue
    // -----------------------------------------------------------------------

    pub async fn list_queue(&self) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).list().await
    }

    pub async fn list_unsynced_entries(&self) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list_unsynced()
            .await
    }

    pub async fn get_entry(&self, id: &QueueEntryId) -> Result<Option<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).get(id).await
    }

    pub async fn list_open_entries_for(&self, local_id: &str) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .list_open_for_target(local_id)
            .await
    }

    pub async fn count_unsynced_entries(&self) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .count_unsynced()
            .await
    }

    pub async fn count_stuck_entries(&self, retry_budget: u32) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .count_stuck(retry_budget)
            .await
    }

    /// Persist the state of one entry.
    pub async fn update_entry(&self, entry: &QueueEntry) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .update_state(entry)
            .await
    }

    /// Persist the state of several entries atomically.
    pub async fn update_entries(&self, entries: &[QueueEntry]) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.connection().transaction().await?;
        let result: Result<()> = async {
            let queue = LibSqlQueueRepository::new(&tx);
            for entry in entries {
                queue.update_state(entry).await?;
            }
            Ok(())
        }
        .await;
        finish(tx, result).await
    }

    pub async fn delete_entries(&self, ids: &[QueueEntryId]) -> Result<usize> {
        let db = self.db.lock().await;
        let tx = db.connection().transaction().await?;
        let result = LibSqlQueueRepository::new(&tx).delete(ids).await;
        finish(tx, result).await
    }

    // -----------------------------------------------------------------------
    // Atomic multi-table operations
    // -----------------------------------------------------------------------

    /// Append a queue entry together with the record and blob it introduces.
    pub async fn append(
        &self,
        record: Option<&LocalRecord>,
        blob: Option<&MediaBlob>,
        entry: &QueueEntry,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.connection().transaction().await?;
        let result: Result<()> = async {
            if let Some(record) = record {
                LibSqlRecordRepository::new(&tx).upsert(record).await?;
            }
            if let Some(blob) = blob {
                LibSqlBlobRepository::new(&tx).put(blob).await?;
            }
            LibSqlQueueRepository::new(&tx).insert(entry).await
        }
        .await;
        finish(tx, result).await
    }

    /// Replace a local record's data and append the entry describing the change.
    pub async fn patch_and_append(
        &self,
        local_id: &str,
        data: &RecordData,
        entry: &QueueEntry,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.connection().transaction().await?;
        let result: Result<()> = async {
            LibSqlRecordRepository::new(&tx)
                .update_data(local_id, data)
                .await?;
            LibSqlQueueRepository::new(&tx).insert(entry).await
        }
        .await;
        finish(tx, result).await
    }

    /// Mark an entry synced, record the id translations it produced, and retire
    /// the local record it created.
    pub async fn complete_entry(
        &self,
        entry: &QueueEntry,
        mappings: &[(String, String)],
        created_record: Option<&str>,
    ) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.connection().transaction().await?;
        let result: Result<()> = async {
            LibSqlQueueRepository::new(&tx).update_state(entry).await?;
            let id_mappings = LibSqlIdMappingRepository::new(&tx);
            for (local_key, remote_id) in mappings {
                id_mappings.put(local_key, remote_id).await?;
            }
            if let Some(local_id) = created_record {
                LibSqlRecordRepository::new(&tx)
                    .set_status(local_id, SyncStatus::Synced)
                    .await?;
            }
            Ok(())
        }
        .await;
        finish(tx, result).await
    }

    /// Remove synced entries, synced records, and the blobs those records owned.
    pub async fn purge_synced(&self) -> Result<PurgeCounts> {
        let db = self.db.lock().await;
        let tx = db.connection().transaction().await?;
        let result: Result<PurgeCounts> = async {
            let entries = LibSqlQueueRepository::new(&tx).purge_synced().await?;
            let records = LibSqlRecordRepository::new(&tx).purge_synced().await?;
            let blobs = LibSqlBlobRepository::new(&tx)
                .delete_for_records(&records)
                .await?;
            Ok(PurgeCounts {
                entries,
                records: records.len(),
                blobs,
            })
        }
        .await;
        finish(tx, result).await
    }

    /// Delete never-synced records, their blobs, and the queue entries for them.
    pub async fn discard(&self, record_ids: &[String], entry_ids: &[QueueEntryId]) -> Result<()> {
        let db = self.db.lock().await;
        let tx = db.connection().transaction().await?;
        let result: Result<()> = async {
            LibSqlQueueRepository::new(&tx).delete(entry_ids).await?;
            let records = LibSqlRecordRepository::new(&tx);
            for local_id in record_ids {
                records.delete(local_id).await?;
            }
            LibSqlBlobRepository::new(&tx)
                .delete_for_records(record_ids)
                .await?;
            Ok(())
        }
        .await;
        finish(tx, result).await
    }

    // -----------------------------------------------------------------------
    // Blobs and id mappings
    // -----------------------------------------------------------------------

    pub async fn get_blob(&self, blob_id: &str) -> Result<Option<MediaBlob>> {
        let db = self.db.lock().await;
        LibSqlBlobRepository::new(db.connection())
            .get(blob_id)
            .await
    }

    pub async fn get_blob_for_record(&self, record_local_id: &str) -> Result<Option<MediaBlob>> {
        let db = self.db.lock().await;
        LibSqlBlobRepository::new(db.connection())
            .get_for_record(record_local_id)
            .await
    }

    pub async fn load_id_mappings(&self) -> Result<Vec<(String, String)>> {
        let db = self.db.lock().await;
        LibSqlIdMappingRepository::new(db.connection())
            .load_all()
            .await
    }

    /// Forget translations older than `cutoff_ms` that nothing local refers to.
    pub async fn prune_id_mappings(&self, cutoff_ms: i64) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlIdMappingRepository::new(db.connection())
            .prune_unreferenced(cutoff_ms)
            .await
    }

    pub async fn get_id_mapping(&self, local_key: &str) -> Result<Option<String>> {
        let db = self.db.lock().await;
        LibSqlIdMappingRepository::new(db.connection())
            .get(local_key)
            .await
    }

    // -----------------------------------------------------------------------
    // Page snapshots
    // -----------------------------------------------------------------------

    pub async fn get_snapshot(&self, page_id: &str) -> Result<Option<PageSnapshot>> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection())
            .get(page_id)
            .await
    }

    pub async fn put_snapshot(&self, snapshot: &PageSnapshot) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection())
            .upsert(snapshot)
            .await
    }

    pub async fn delete_snapshot(&self, page_id: &str) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection())
            .delete(page_id)
            .await
    }

    pub async fn delete_snapshots_containing(&self, token: &str) -> Result<usize> {
        let db = self.db.lock().await;
        LibSqlSnapshotRepository::new(db.connection())
            .delete_containing(token)
            .await
    }
}

/// Commit on success, roll back on failure
async fn finish<T>(tx: Transaction, result: Result<T>) -> Result<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(error) => {
            if let Err(rollback_error) = tx.rollback().await {
                tracing::warn!("Rollback failed after {error}: {rollback_error}");
            }
            Err(error)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateNote, LocalId, NoteData, QueueStatus, SyncAction};

    fn note_parts() -> (LocalRecord, QueueEntry) {
        let local_id = LocalId::new();
        let data = NoteData {
            body: "Gate code 4411".to_string(),
        };
        let record = LocalRecord::new(
            local_id,
            Some("unit-9".to_string()),
            Some("proj-1".to_string()),
            RecordData::Note(data.clone()),
        );
        let entry = QueueEntry::new(
            SyncAction::CreateNote(CreateNote {
                local_id,
                subject_id: "unit-9".to_string(),
                note: data,
            }),
            Vec::new(),
        );
        (record, entry)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn append_writes_record_and_entry_together() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let (record, entry) = note_parts();

        store.append(Some(&record), None, &entry).await.unwrap();

        assert!(store
            .get_record(&record.local_id.as_str())
            .await
            .unwrap()
            .is_some());
        assert_eq!(store.count_unsynced_entries().await.unwrap(), 1);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn append_rolls_back_record_when_entry_insert_fails() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let (record, entry) = note_parts();
        store.append(None, None, &entry).await.unwrap();

        // Same entry id again violates the primary key
        let err = store.append(Some(&record), None, &entry).await;
        assert!(err.is_err());
        assert!(store
            .get_record(&record.local_id.as_str())
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn complete_and_purge_retires_record() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let (record, mut entry) = note_parts();
        let local_id = record.local_id.as_str();
        store.append(Some(&record), None, &entry).await.unwrap();

        entry.status = QueueStatus::Synced;
        store
            .complete_entry(
                &entry,
                &[(local_id.clone(), "srv-7".to_string())],
                Some(&local_id),
            )
            .await
            .unwrap();

        assert_eq!(
            store.get_id_mapping(&local_id).await.unwrap().as_deref(),
            Some("srv-7")
        );

        let purged = store.purge_synced().await.unwrap();
        assert_eq!(purged.entries, 1);
        assert_eq!(purged.records, 1);
        assert!(store.list_queue().await.unwrap().is_empty());
        assert!(store.get_record(&local_id).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reopening_path_keeps_queue() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("nested").join("fieldsync.db");
        let (record, entry) = note_parts();

        {
            let store = LocalStore::open_path(&path).await.unwrap();
            store.append(Some(&record), None, &entry).await.unwrap();
        }

        let store = LocalStore::open_path(&path).await.unwrap();
        let queue = store.list_queue().await.unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(queue[0].id, entry.id);
    }
}
