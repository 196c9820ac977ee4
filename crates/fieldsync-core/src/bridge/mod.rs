//! Read bridge: merges remote-confirmed data with records that only exist
//! locally, without ever showing one record twice.

mod leases;
mod revision;

pub use leases::{MediaHandle, MediaLease, MediaLeases};
pub use revision::Revision;

use std::collections::HashSet;

use tokio::sync::watch;

use crate::error::Result;
use crate::models::{LocalRecord, RecordKind};
use crate::services::LocalStore;
use crate::sync::IdResolver;

/// One item of a merged list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Merged<T> {
    /// Fetched from the remote system
    Remote(T),
    /// Created on this device and not yet synced
    Local(LocalRecord),
}

impl<T> Merged<T> {
    pub const fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }
}

/// Query side of the local store for UI consumers.
#[derive(Clone)]
pub struct ReadBridge {
    store: LocalStore,
    revision: Revision,
}

impl ReadBridge {
    pub const fn new(store: LocalStore, revision: Revision) -> Self {
        Self { store, revision }
    }

    /// Receiver that changes whenever local data or sync state changes.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        self.revision.current()
    }

    /// Unsynced records of `kind`, optionally limited to one scope, oldest first.
    pub async fn local_records(
        &self,
        kind: RecordKind,
        scope_id: Option<&str>,
    ) -> Result<Vec<LocalRecord>> {
        let records = self.store.list_unsynced_records(kind, scope_id).await?;
        self.without_mapped(records).await
    }

    /// Unsynced records attached to `parent_id`, oldest first.
    ///
    /// `parent_id` may be a local id or the remote id its parent synced to;
    /// children keep pointing at the parent's local id until they sync.
    pub async fn local_children(&self, parent_id: &str) -> Result<Vec<LocalRecord>> {
        let records = self.store.list_children_by_any_id(parent_id).await?;
        self.without_mapped(records).await
    }

    /// Resolver over every persisted local-to-remote mapping.
    pub async fn resolver(&self) -> Result<IdResolver> {
        Ok(IdResolver::from_mappings(self.store.load_id_mappings().await?))
    }

    // A record with a remote mapping is already represented by its remote copy
    async fn without_mapped(&self, records: Vec<LocalRecord>) -> Result<Vec<LocalRecord>> {
        if records.is_empty() {
            return Ok(records);
        }
        let mapped: HashSet<String> = self
            .store
            .load_id_mappings()
            .await?
            .into_iter()
            .map(|(local_key, _)| local_key)
            .collect();
        Ok(records
            .into_iter()
            .filter(|record| !mapped.contains(&record.local_id.as_str()))
            .collect())
    }
}

/// Remote items first in their given order, then local records that no remote
/// item already represents.
///
/// A local record is shadowed when a remote item carries its local id, or the
/// remote id `resolver` maps it to.
pub fn merge_records<T>(
    remote: Vec<T>,
    local: Vec<LocalRecord>,
    remote_id: impl Fn(&T) -> &str,
    resolver: &IdResolver,
) -> Vec<Merged<T>> {
    let remote_ids: HashSet<String> = remote
        .iter()
        .map(|item| remote_id(item).to_string())
        .collect();

    let locals: Vec<LocalRecord> = local
        .into_iter()
        .filter(|record| {
            let local_id = record.local_id.as_str();
            let shadowed = remote_ids.contains(&local_id)
                || resolver
                    .resolve(&local_id)
                    .is_some_and(|mapped| remote_ids.contains(mapped));
            !shadowed
        })
        .collect();

    remote
        .into_iter()
        .map(Merged::Remote)
        .chain(locals.into_iter().map(Merged::Local))
        .collect()
}
