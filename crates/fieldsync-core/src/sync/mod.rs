//! Sync manager: drains the offline queue against the remote system.

mod resolver;

pub use resolver::IdResolver;

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Mutex;

use crate::bridge::Revision;
use crate::config::SyncOptions;
use crate::db::MediaBlob;
use crate::error::{Error, Result};
use crate::models::{QueueEntry, QueueStatus, SyncAction};
use crate::remote::{RemoteAck, RemoteApi, RemoteError};
use crate::services::LocalStore;
use crate::util::now_millis;

const INTERRUPTED_MESSAGE: &str = "interrupted while syncing";

/// Progress reported after each entry that reaches `synced`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncProgress {
    pub synced: usize,
    /// Entries eligible at the start of the pass
    pub total: usize,
}

/// Outcome of one drain pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub synced: usize,
    pub failed: usize,
    /// Entries left for a later pass because a dependency is unresolved
    pub skipped: usize,
}

/// Drives queue entries through `pending -> syncing -> synced | failed`.
pub struct SyncManager<R: RemoteApi> {
    store: LocalStore,
    remote: R,
    options: SyncOptions,
    revision: Revision,
    session: Mutex<Option<IdResolver>>,
    running: AtomicBool,
}

impl<R: RemoteApi> SyncManager<R> {
    pub fn new(store: LocalStore, remote: R, options: SyncOptions, revision: Revision) -> Self {
        Self {
            store,
            remote,
            options,
            revision,
            session: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    /// Whether a drain pass is currently running.
    pub fn is_syncing(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub const fn remote(&self) -> &R {
        &self.remote
    }

    /// Run a pass with the session resolver.
    ///
    /// The session resolver is seeded from persisted id mappings the first time
    /// it is needed. Returns an empty report when a pass is already running.
    pub async fn start_sync(&self, progress: impl FnMut(SyncProgress)) -> Result<SyncReport> {
        let Some(_pass) = PassGuard::acquire(&self.running) else {
            tracing::debug!("Sync already in progress; ignoring trigger");
            return Ok(SyncReport::default());
        };

        let mut session = self.session.lock().await;
        if session.is_none() {
            let mappings = self.store.load_id_mappings().await?;
            *session = Some(IdResolver::from_mappings(mappings));
        }
        let resolver = session.get_or_insert_with(IdResolver::default);
        self.run_pass(resolver, progress).await
    }

    /// Run a pass with a caller-owned resolver and return the number of
    /// entries synced.
    pub async fn drain(
        &self,
        resolver: &mut IdResolver,
        progress: impl FnMut(SyncProgress),
    ) -> Result<usize> {
        let Some(_pass) = PassGuard::acquire(&self.running) else {
            tracing::debug!("Sync already in progress; ignoring drain");
            return Ok(0);
        };
        Ok(self.run_pass(resolver, progress).await?.synced)
    }

    async fn run_pass(
        &self,
        resolver: &mut IdResolver,
        mut progress: impl FnMut(SyncProgress),
    ) -> Result<SyncReport> {
        let recovered = self.recover_stale().await?;

        let unsynced = self.store.list_unsynced_entries().await?;
        let mut outstanding: HashSet<String> = unsynced
            .iter()
            .flat_map(|entry| {
                std::iter::once(entry.id.as_str())
                    .chain(entry.action.created_local_id().map(|id| id.as_str()))
            })
            .collect();
        let candidates: Vec<QueueEntry> = unsynced
            .into_iter()
            .filter(|entry| entry.is_drainable(self.options.retry_budget))
            .collect();

        let total = candidates.len();
        let mut report = SyncReport::default();
        tracing::info!("Starting sync pass over {total} queued entries");

        for mut entry in candidates {
            let ready = entry.depends_on.iter().all(|dependency| {
                resolver.contains(dependency) || !outstanding.contains(dependency)
            });
            if !ready {
                tracing::debug!(
                    "Deferring {} ({}): dependencies unresolved",
                    entry.id,
                    entry.action.name()
                );
                report.skipped += 1;
                continue;
            }

            entry.status = QueueStatus::Syncing;
            entry.updated_at = now_millis();
            self.store.update_entry(&entry).await?;

            let mut action = entry.action.clone();
            action.resolve_refs(resolver);

            match self.dispatch(&action).await {
                Ok(ack) => {
                    let mappings = completion_mappings(&entry, &ack);
                    let created = entry.action.created_local_id().map(|id| id.as_str());
                    entry.status = QueueStatus::Synced;
                    entry.last_error = None;
                    self.store
                        .complete_entry(&entry, &mappings, created.as_deref())
                        .await?;

                    for (local_key, remote_id) in mappings {
                        resolver.insert(local_key, remote_id);
                    }
                    outstanding.remove(&entry.id.as_str());
                    if let Some(local_id) = created {
                        outstanding.remove(&local_id);
                    }

                    report.synced += 1;
                    progress(SyncProgress {
                        synced: report.synced,
                        total,
                    });
                }
                Err(error) => {
                    self.record_failure(&mut entry, &error).await?;
                    report.failed += 1;
                }
            }
        }

        let purged = self.store.purge_synced().await?;
        let retention = i64::try_from(self.options.mapping_retention().as_millis())
            .unwrap_or(i64::MAX);
        let forgotten = self
            .store
            .prune_id_mappings(now_millis().saturating_sub(retention))
            .await?;
        if forgotten > 0 {
            tracing::debug!("Pruned {forgotten} expired id mappings");
        }
        if report.synced > 0 || report.failed > 0 || recovered > 0 {
            self.revision.bump();
        }

        tracing::info!(
            "Sync pass finished: {} synced, {} failed, {} deferred, {} entries purged",
            report.synced,
            report.failed,
            report.skipped,
            purged.entries
        );
        Ok(report)
    }

    async fn dispatch(&self, action: &SyncAction) -> Result<RemoteAck> {
        let ack = match action {
            SyncAction::CreateFinding(request) => self.remote.create_finding(request).await?,
            SyncAction::UpdateFindingField(request) => {
                self.remote.update_finding_field(request).await?
            }
            SyncAction::DeleteFinding(request) => self.remote.delete_finding(request).await?,
            SyncAction::UploadCapture(request) => {
                let media = self.load_blob(&request.capture.blob_id).await?;
                self.remote.upload_capture(request, &media).await?
            }
            SyncAction::CreateUnit(request) => self.remote.create_unit(request).await?,
            SyncAction::UpdateUnitField(request) => self.remote.update_unit_field(request).await?,
            SyncAction::SaveUnitCheck(request) => self.remote.save_unit_check(request).await?,
            SyncAction::SaveUnitGrade(request) => self.remote.save_unit_grade(request).await?,
            SyncAction::CreateNote(request) => self.remote.create_note(request).await?,
            SyncAction::UploadNotePhoto(request) => {
                let media = self.load_blob(&request.capture.blob_id).await?;
                self.remote.upload_note_photo(request, &media).await?
            }
        };
        Ok(ack)
    }

    async fn load_blob(&self, blob_id: &str) -> Result<MediaBlob> {
        self.store
            .get_blob(blob_id)
            .await?
            .ok_or_else(|| Error::Remote(RemoteError::MissingBlob(blob_id.to_string())))
    }

    async fn record_failure(&self, entry: &mut QueueEntry, error: &Error) -> Result<()> {
        let budget = self.options.retry_budget;
        let retryable = match error {
            Error::Remote(remote) => remote.is_retryable(),
            _ => true,
        };
        entry.retry_count = if retryable {
            entry.retry_count.saturating_add(1)
        } else {
            entry.retry_count.saturating_add(1).max(budget)
        };
        entry.status = QueueStatus::Failed;
        entry.last_error = Some(error.to_string());
        entry.updated_at = now_millis();

        if entry.retry_count >= budget {
            tracing::warn!(
                "Queue entry {} ({}) is stuck after {} attempts: {}",
                entry.id,
                entry.action.name(),
                entry.retry_count,
                error
            );
        } else {
            tracing::warn!(
                "Queue entry {} ({}) failed, attempt {}/{}: {}",
                entry.id,
                entry.action.name(),
                entry.retry_count,
                budget,
                error
            );
        }
        self.store.update_entry(entry).await
    }

    /// Move entries left `syncing` by an interrupted pass back to `failed`.
    async fn recover_stale(&self) -> Result<usize> {
        let threshold = i64::try_from(self.options.stale_syncing_after().as_millis())
            .unwrap_or(i64::MAX);
        let now = now_millis();
        let stale: Vec<QueueEntry> = self
            .store
            .list_unsynced_entries()
            .await?
            .into_iter()
            .filter(|entry| {
                entry.status == QueueStatus::Syncing
                    && now.saturating_sub(entry.updated_at) >= threshold
            })
            .map(|mut entry| {
                entry.status = QueueStatus::Failed;
                entry.retry_count = entry.retry_count.saturating_add(1);
                entry.last_error = Some(INTERRUPTED_MESSAGE.to_string());
                entry.updated_at = now;
                entry
            })
            .collect();

        if !stale.is_empty() {
            tracing::warn!("Recovered {} queue entries stuck in syncing", stale.len());
            self.store.update_entries(&stale).await?;
        }
        Ok(stale.len())
    }
}

/// Id translations produced by a successful entry.
fn completion_mappings(entry: &QueueEntry, ack: &RemoteAck) -> Vec<(String, String)> {
    let Some(remote_id) = &ack.remote_id else {
        return Vec::new();
    };
    let mut mappings = vec![(entry.id.as_str(), remote_id.clone())];
    if let Some(local_id) = entry.action.created_local_id() {
        mappings.push((local_id.as_str(), remote_id.clone()));
    }
    mappings
}

/// Holds the single-pass flag for the lifetime of a drain.
struct PassGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> PassGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
    }
}
