use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::Result;
use crate::services::LocalStore;

/// Displayable media loaded from the local store.
#[derive(Debug, PartialEq, Eq)]
pub struct MediaHandle {
    pub record_id: String,
    pub blob_id: String,
    pub filename: String,
    pub mime_type: String,
    pub bytes: Arc<[u8]>,
}

struct Slot {
    handle: Arc<MediaHandle>,
    leases: usize,
}

type Slots = Arc<Mutex<HashMap<String, Slot>>>;

/// Reference-counted registry of media handles, keyed by record id.
///
/// A handle is loaded on first acquire and released when its last lease is
/// dropped.
#[derive(Clone)]
pub struct MediaLeases {
    store: LocalStore,
    slots: Slots,
}

/// Keeps a media handle alive while a view displays it.
pub struct MediaLease {
    handle: Arc<MediaHandle>,
    slots: Slots,
}

impl MediaLeases {
    pub fn new(store: LocalStore) -> Self {
        Self {
            store,
            slots: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Lease the media of a capture record, or `None` if it has no blob.
    pub async fn acquire(&self, record_id: &str) -> Result<Option<MediaLease>> {
        if let Some(lease) = self.lease_existing(record_id) {
            return Ok(Some(lease));
        }

        let Some(blob) = self.store.get_blob_for_record(record_id).await? else {
            return Ok(None);
        };
        let loaded = Arc::new(MediaHandle {
            record_id: record_id.to_string(),
            blob_id: blob.blob_id,
            filename: blob.filename,
            mime_type: blob.mime_type,
            bytes: Arc::from(blob.bytes),
        });

        let mut slots = lock(&self.slots);
        // Another task may have loaded it while the store was read
        let slot = slots.entry(record_id.to_string()).or_insert_with(|| Slot {
            handle: loaded,
            leases: 0,
        });
        slot.leases += 1;
        Ok(Some(MediaLease {
            handle: Arc::clone(&slot.handle),
            slots: Arc::clone(&self.slots),
        }))
    }

    /// Drop handles for records that are no longer displayed.
    ///
    /// Outstanding leases for dropped records stay readable but are no longer
    /// tracked. Returns the number of handles released.
    pub fn retain_only<'a>(&self, record_ids: impl IntoIterator<Item = &'a str>) -> usize {
        let keep: HashSet<&str> = record_ids.into_iter().collect();
        let mut slots = lock(&self.slots);
        let before = slots.len();
        slots.retain(|record_id, _| keep.contains(record_id.as_str()));
        let released = before - slots.len();
        if released > 0 {
            tracing::debug!("Released {released} media handles");
        }
        released
    }

    /// Number of records with a live handle.
    pub fn active(&self) -> usize {
        lock(&self.slots).len()
    }

    pub fn is_active(&self, record_id: &str) -> bool {
        lock(&self.slots).contains_key(record_id)
    }

    fn lease_existing(&self, record_id: &str) -> Option<MediaLease> {
        let mut slots = lock(&self.slots);
        let slot = slots.get_mut(record_id)?;
        slot.leases += 1;
        Some(MediaLease {
            handle: Arc::clone(&slot.handle),
            slots: Arc::clone(&self.slots),
        })
    }
}

impl MediaLease {
    pub fn handle(&self) -> &MediaHandle {
        &self.handle
    }
}

impl std::ops::Deref for MediaLease {
    type Target = MediaHandle;

    fn deref(&self) -> &MediaHandle {
        &self.handle
    }
}

impl Drop for MediaLease {
    fn drop(&mut self) {
        let mut slots = lock(&self.slots);
        let record_id = self.handle.record_id.as_str();
        let Some(slot) = slots.get_mut(record_id) else {
            return;
        };
        // A slot replaced after retain_only belongs to newer leases
        if !Arc::ptr_eq(&slot.handle, &self.handle) {
            return;
        }
        slot.leases = slot.leases.saturating_sub(1);
        if slot.leases == 0 {
            slots.remove(record_id);
        }
    }
}

fn lock(slots: &Mutex<HashMap<String, Slot>>) -> MutexGuard<'_, HashMap<String, Slot>> {
    slots.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MediaBlob;
    use crate::models::{
        CaptureData, LocalId, LocalRecord, QueueEntry, RecordData, SyncAction, UploadCapture,
    };

    async fn store_with_capture() -> (LocalStore, String) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let local_id = LocalId::new();
        let capture = CaptureData {
            blob_id: "blob-1".to_string(),
            filename: "porch.jpg".to_string(),
            mime_type: "image/jpeg".to_string(),
            caption: None,
        };
        let record = LocalRecord::new(
            local_id,
            Some("srv-42".to_string()),
            None,
            RecordData::Capture(capture.clone()),
        );
        let blob = MediaBlob::new(
            "blob-1",
            local_id.as_str(),
            "porch.jpg",
            "image/jpeg",
            vec![1, 2, 3],
        );
        let entry = QueueEntry::new(
            SyncAction::UploadCapture(UploadCapture {
                local_id,
                finding_id: "srv-42".to_string(),
                capture,
            }),
            Vec::new(),
        );
        store.append(Some(&record), Some(&blob), &entry).await.unwrap();
        (store, local_id.as_str())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_handle_released_with_last_lease() {
        let (store, record_id) = store_with_capture().await;
        let leases = MediaLeases::new(store);

        let first = leases.acquire(&record_id).await.unwrap().unwrap();
        let second = leases.acquire(&record_id).await.unwrap().unwrap();
        assert_eq!(&*first.bytes, &[1, 2, 3]);
        assert_eq!(second.filename, "porch.jpg");
        assert_eq!(leases.active(), 1);

        drop(first);
        assert!(leases.is_active(&record_id));
        drop(second);
        assert!(!leases.is_active(&record_id));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_release_on_error_path() {
        let (store, record_id) = store_with_capture().await;
        let leases = MediaLeases::new(store);

        let result: std::result::Result<(), &str> = async {
            let _lease = leases.acquire(&record_id).await.unwrap().unwrap();
            Err("render failed")
        }
        .await;
        assert!(result.is_err());
        assert_eq!(leases.active(), 0);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_missing_blob_yields_none() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let leases = MediaLeases::new(store);
        assert!(leases.acquire("nope").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_retain_only_drops_undisplayed_records() {
        let (store, record_id) = store_with_capture().await;
        let leases = MediaLeases::new(store);
        let lease = leases.acquire(&record_id).await.unwrap().unwrap();

        assert_eq!(leases.retain_only([record_id.as_str()]), 0);
        assert_eq!(leases.retain_only(std::iter::empty()), 1);
        assert_eq!(leases.active(), 0);

        // Still readable after release
        assert_eq!(lease.handle().blob_id, "blob-1");
        drop(lease);
        assert_eq!(leases.active(), 0);
    }
}
