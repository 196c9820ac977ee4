//! Best-effort read cache of whole-page payloads for offline rendering.

use crate::error::{Error, Result};
use crate::models::PageSnapshot;
use crate::util::now_millis;

use super::LocalStore;

/// Layout version of cached page payloads.
pub const SNAPSHOT_SCHEMA_VERSION: i64 = 1;

/// Page snapshot cache over the local store.
#[derive(Clone)]
pub struct PageSnapshotCache {
    store: LocalStore,
    schema_version: i64,
}

impl PageSnapshotCache {
    pub const fn new(store: LocalStore) -> Self {
        Self::with_schema_version(store, SNAPSHOT_SCHEMA_VERSION)
    }

    pub const fn with_schema_version(store: LocalStore, schema_version: i64) -> Self {
        Self {
            store,
            schema_version,
        }
    }

    /// Store a page payload unless an identical version is already cached.
    ///
    /// Returns whether anything was written.
    pub async fn save(
        &self,
        page_id: &str,
        page_type: &str,
        data: serde_json::Value,
        data_version: &str,
    ) -> Result<bool> {
        if let Some(existing) = self.store.get_snapshot(page_id).await? {
            if existing.data_version == data_version && existing.schema_version == self.schema_version
            {
                return Ok(false);
            }
        }

        let snapshot = PageSnapshot {
            page_id: page_id.to_string(),
            page_type: page_type.to_string(),
            data,
            data_version: data_version.to_string(),
            snapshot_at: now_millis(),
            schema_version: self.schema_version,
        };
        self.store.put_snapshot(&snapshot).await?;
        tracing::debug!("Cached {page_type} snapshot for {page_id} at version {data_version}");
        Ok(true)
    }

    /// The cached snapshot for a page, if one exists in the current layout.
    ///
    /// Snapshots written under a different schema version are deleted.
    pub async fn get(&self, page_id: &str) -> Result<Option<PageSnapshot>> {
        let Some(snapshot) = self.store.get_snapshot(page_id).await? else {
            return Ok(None);
        };
        if snapshot.schema_version != self.schema_version {
            tracing::warn!(
                "Discarding snapshot for {} with schema version {} (expected {})",
                page_id,
                snapshot.schema_version,
                self.schema_version
            );
            self.store.delete_snapshot(page_id).await?;
            return Ok(None);
        }
        Ok(Some(snapshot))
    }

    /// Remove every snapshot whose page id contains `scope`.
    pub async fn clear_for_scope(&self, scope: &str) -> Result<usize> {
        let scope = scope.trim();
        if scope.is_empty() {
            return Err(Error::InvalidInput(
                "Snapshot scope cannot be empty".to_string(),
            ));
        }
        let removed = self.store.delete_snapshots_containing(scope).await?;
        tracing::info!("Cleared {removed} page snapshots for scope {scope}");
        Ok(removed)
    }
}

/// Fingerprint of the inputs a page payload was built from.
pub fn data_version<I, S>(parts: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parts
        .into_iter()
        .map(|part| part.as_ref().to_string())
        .collect::<Vec<_>>()
        .join("|")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    async fn cache() -> PageSnapshotCache {
        PageSnapshotCache::new(LocalStore::open_in_memory().await.unwrap())
    }

    #[test]
    fn data_version_joins_parts() {
        assert_eq!(data_version(["12", "f1,f2", "3"]), "12|f1,f2|3");
        assert_eq!(data_version(Vec::<String>::new()), "");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_save_is_idempotent_for_same_version() {
        let cache = cache().await;
        assert!(cache
            .save("acct-1:inspection:7", "inspection", json!({ "findings": 2 }), "v1")
            .await
            .unwrap());
        let first = cache.get("acct-1:inspection:7").await.unwrap().unwrap();

        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(!cache
            .save("acct-1:inspection:7", "inspection", json!({ "findings": 3 }), "v1")
            .await
            .unwrap());

        let second = cache.get("acct-1:inspection:7").await.unwrap().unwrap();
        assert_eq!(second.snapshot_at, first.snapshot_at);
        assert_eq!(second.data, json!({ "findings": 2 }));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_new_version_overwrites() {
        let cache = cache().await;
        cache
            .save("acct-1:project:2", "project", json!({ "units": 1 }), "v1")
            .await
            .unwrap();
        assert!(cache
            .save("acct-1:project:2", "project", json!({ "units": 4 }), "v2")
            .await
            .unwrap());

        let snapshot = cache.get("acct-1:project:2").await.unwrap().unwrap();
        assert_eq!(snapshot.data_version, "v2");
        assert_eq!(snapshot.data, json!({ "units": 4 }));
        assert_eq!(snapshot.page_type, "project");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_get_missing_page() {
        let cache = cache().await;
        assert_eq!(cache.get("nope").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_schema_mismatch_is_discarded() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let old = PageSnapshotCache::with_schema_version(store.clone(), 0);
        old.save("acct-1:home", "home", json!([]), "v1").await.unwrap();

        let current = PageSnapshotCache::new(store.clone());
        assert_eq!(current.get("acct-1:home").await.unwrap(), None);
        assert_eq!(store.get_snapshot("acct-1:home").await.unwrap(), None);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_clear_for_scope_only_touches_matching_pages() {
        let cache = cache().await;
        for page in ["acct-1:home", "acct-1:inspection:7", "acct-2:home"] {
            cache.save(page, "page", json!({}), "v1").await.unwrap();
        }

        assert_eq!(cache.clear_for_scope("acct-1").await.unwrap(), 2);
        assert_eq!(cache.get("acct-1:home").await.unwrap(), None);
        assert!(cache.get("acct-2:home").await.unwrap().is_some());
        assert!(cache.clear_for_scope("  ").await.is_err());
    }
}
