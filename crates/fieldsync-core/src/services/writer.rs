//! Write path: the only sanctioned entry point for offline mutations.
//!
//! Every operation persists its local record (if any) and its queue entry in
//! one store transaction, then bumps the shared revision so read views
//! refresh.

use std::collections::HashSet;

use serde_json::Value;

use crate::bridge::Revision;
use crate::config::{CompressionOptions, EngineConfig};
use crate::db::MediaBlob;
use crate::error::{Error, Result};
use crate::media::{compress_capture, jpeg_filename};
use crate::models::{
    CaptureData, CreateFinding, CreateNote, CreateUnit, DeleteFinding, FindingData, LocalId,
    LocalRecord, NoteData, QueueEntry, QueueEntryId, QueueStatus, RecordData, RecordKind,
    SaveUnitCheck, SaveUnitGrade, SyncAction, UnitCheckData, UnitData, UnitGradeData,
    UpdateFindingField, UpdateUnitField, UploadCapture, UploadNotePhoto,
};
use crate::util::{normalize_text_option, now_millis};

use super::LocalStore;

/// Records and queues offline mutations.
#[derive(Clone)]
pub struct OfflineWriter {
    store: LocalStore,
    revision: Revision,
    retry_budget: u32,
    compression: CompressionOptions,
}

impl OfflineWriter {
    pub fn new(store: LocalStore, revision: Revision, config: &EngineConfig) -> Self {
        Self {
            store,
            revision,
            retry_budget: config.sync.retry_budget,
            compression: config.compression,
        }
    }

    /// A fresh identifier, usable immediately as a parent reference by other
    /// records created in the same user action.
    #[must_use]
    pub fn allocate_local_id() -> LocalId {
        LocalId::new()
    }

    pub const fn store(&self) -> &LocalStore {
        &self.store
    }

    // -----------------------------------------------------------------------
    // Queue primitives
    // -----------------------------------------------------------------------

    /// Durably append a pending entry.
    pub async fn enqueue(&self, action: SyncAction, depends_on: Vec<String>) -> Result<QueueEntryId> {
        let entry = QueueEntry::new(action, depends_on);
        self.store.append(None, None, &entry).await?;
        self.committed(&entry);
        Ok(entry.id)
    }

    /// Append an entry together with the local record it introduces.
    pub async fn enqueue_with_record(
        &self,
        record: &LocalRecord,
        action: SyncAction,
        depends_on: Vec<String>,
    ) -> Result<QueueEntryId> {
        let entry = QueueEntry::new(action, depends_on);
        self.store.append(Some(record), None, &entry).await?;
        self.committed(&entry);
        Ok(entry.id)
    }

    /// Entries not yet synced, stuck ones included.
    pub async fn pending_count(&self) -> Result<usize> {
        self.store.count_unsynced_entries().await
    }

    /// Entries that exhausted the retry budget and wait for a manual reset.
    pub async fn stuck_count(&self) -> Result<usize> {
        self.store.count_stuck_entries(self.retry_budget).await
    }

    pub async fn list_queue(&self) -> Result<Vec<QueueEntry>> {
        self.store.list_queue().await
    }

    /// Give stuck entries a fresh retry budget, along with every pending or
    /// failed entry that transitively depends on one of them.
    ///
    /// Returns the number of entries reset.
    pub async fn reset_stuck_items(&self) -> Result<usize> {
        let entries = self.store.list_unsynced_entries().await?;
        let mut revived: Vec<QueueEntry> = Vec::new();
        let mut rest: Vec<QueueEntry> = Vec::new();
        for entry in entries {
            if entry.is_stuck(self.retry_budget) {
                revived.push(entry);
            } else if matches!(entry.status, QueueStatus::Pending | QueueStatus::Failed) {
                rest.push(entry);
            }
        }
        if revived.is_empty() {
            return Ok(0);
        }

        let mut blocked_keys: HashSet<String> = revived.iter().flat_map(dependency_keys).collect();
        loop {
            let (dependents, remaining): (Vec<_>, Vec<_>) = rest.into_iter().partition(|entry| {
                entry
                    .depends_on
                    .iter()
                    .any(|dependency| blocked_keys.contains(dependency))
            });
            rest = remaining;
            if dependents.is_empty() {
                break;
            }
            blocked_keys.extend(dependents.iter().flat_map(dependency_keys));
            revived.extend(dependents);
        }

        for entry in &mut revived {
            entry.status = QueueStatus::Pending;
            entry.retry_count = 0;
            entry.last_error = None;
            entry.updated_at = now_millis();
        }
        self.store.update_entries(&revived).await?;
        self.revision.bump();
        tracing::info!("Reset {} stuck queue entries", revived.len());
        Ok(revived.len())
    }

    /// Remove not-yet-synced entries matching `predicate`.
    ///
    /// Entries already `syncing` are in flight and are never removed.
    pub async fn prune_queue(&self, predicate: impl Fn(&QueueEntry) -> bool) -> Result<usize> {
        let ids: Vec<QueueEntryId> = self
            .store
            .list_unsynced_entries()
            .await?
            .into_iter()
            .filter(|entry| entry.status != QueueStatus::Syncing && predicate(entry))
            .map(|entry| entry.id)
            .collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let removed = self.store.delete_entries(&ids).await?;
        self.revision.bump();
        tracing::debug!("Pruned {removed} queue entries");
        Ok(removed)
    }

    /// Cancel a record created offline before it ever reached the remote
    /// system: its entries, its local children, and their blobs are removed
    /// together. Returns the number of queue entries cancelled.
    pub async fn discard_local_record(&self, local_id: &str) -> Result<usize> {
        let record = self
            .store
            .get_record(local_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Local record not found: {local_id}")))?;
        if record.is_synced() {
            return Err(Error::InvalidInput(format!(
                "Record {local_id} has already synced"
            )));
        }

        let mut record_ids = vec![local_id.to_string()];
        let mut index = 0;
        while index < record_ids.len() {
            let children = self.store.list_children(&record_ids[index]).await?;
            for child in children {
                let child_id = child.local_id.as_str();
                if !record_ids.contains(&child_id) {
                    record_ids.push(child_id);
                }
            }
            index += 1;
        }

        let entries: Vec<QueueEntry> = self
            .store
            .list_unsynced_entries()
            .await?
            .into_iter()
            .filter(|entry| record_ids.iter().any(|id| entry.action.references(id)))
            .collect();
        if let Some(in_flight) = entries
            .iter()
            .find(|entry| entry.status == QueueStatus::Syncing)
        {
            return Err(Error::InvalidInput(format!(
                "Cannot discard {local_id}: entry {} is syncing",
                in_flight.id
            )));
        }

        let entry_ids: Vec<QueueEntryId> = entries.iter().map(|entry| entry.id).collect();
        self.store.discard(&record_ids, &entry_ids).await?;
        self.revision.bump();
        tracing::info!(
            "Discarded local {} {local_id} ({} records, {} queue entries)",
            record.kind(),
            record_ids.len(),
            entry_ids.len()
        );
        Ok(entry_ids.len())
    }

    // -----------------------------------------------------------------------
    // Findings and captures
    // -----------------------------------------------------------------------

    pub async fn create_finding(&self, inspection_id: &str, finding: FindingData) -> Result<LocalId> {
        let inspection_id = require_id("inspection_id", inspection_id)?;
        let local_id = Self::allocate_local_id();
        let record = LocalRecord::new(
            local_id,
            Some(inspection_id.clone()),
            Some(inspection_id.clone()),
            RecordData::Finding(finding.clone()),
        );
        let depends_on = self.creator_dependencies(&inspection_id).await?;
        let action = SyncAction::CreateFinding(CreateFinding {
            local_id,
            inspection_id,
            finding,
        });
        self.enqueue_with_record(&record, action, depends_on).await?;
        Ok(local_id)
    }

    pub async fn update_finding_field(
        &self,
        finding_id: &str,
        field: &str,
        value: Value,
    ) -> Result<QueueEntryId> {
        let finding_id = require_id("finding_id", finding_id)?;
        let action = SyncAction::UpdateFindingField(UpdateFindingField {
            finding_id: finding_id.clone(),
            field: field.to_string(),
            value: value.clone(),
        });
        self.update_field(&finding_id, RecordKind::Finding, field, &value, action)
            .await
    }

    /// Delete a finding.
    ///
    /// A finding that only exists locally is discarded instead, so nothing is
    /// ever sent for it; `None` is returned in that case.
    pub async fn delete_finding(&self, finding_id: &str) -> Result<Option<QueueEntryId>> {
        let finding_id = require_id("finding_id", finding_id)?;
        if let Some(record) = self.store.get_record(&finding_id).await? {
            if !record.is_synced() && !self.creator_dependencies(&finding_id).await?.is_empty() {
                self.discard_local_record(&finding_id).await?;
                return Ok(None);
            }
        }

        self.prune_queue(|entry| {
            matches!(&entry.action, SyncAction::UpdateFindingField(update) if update.finding_id == finding_id)
        })
        .await?;
        let action = SyncAction::DeleteFinding(DeleteFinding {
            finding_id: finding_id.clone(),
        });
        self.enqueue(action, Vec::new()).await.map(Some)
    }

    /// Compress a captured file and queue its upload against a finding.
    pub async fn add_capture(
        &self,
        finding_id: &str,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
        caption: Option<String>,
    ) -> Result<LocalId> {
        let finding_id = require_id("finding_id", finding_id)?;
        let (local_id, capture, blob) = self.prepare_capture(filename, mime_type, bytes, caption)?;
        let record = LocalRecord::new(
            local_id,
            Some(finding_id.clone()),
            self.parent_scope(&finding_id).await?,
            RecordData::Capture(capture.clone()),
        );
        let depends_on = self.creator_dependencies(&finding_id).await?;
        let action = SyncAction::UploadCapture(UploadCapture {
            local_id,
            finding_id,
            capture,
        });
        self.append_media(&record, &blob, action, depends_on).await?;
        Ok(local_id)
    }

    // -----------------------------------------------------------------------
    // Units
    // -----------------------------------------------------------------------

    pub async fn create_unit(&self, project_id: &str, unit: UnitData) -> Result<LocalId> {
        let project_id = require_id("project_id", project_id)?;
        let local_id = Self::allocate_local_id();
        let record = LocalRecord::new(
            local_id,
            Some(project_id.clone()),
            Some(project_id.clone()),
            RecordData::Unit(unit.clone()),
        );
        let depends_on = self.creator_dependencies(&project_id).await?;
        let action = SyncAction::CreateUnit(CreateUnit {
            local_id,
            project_id,
            unit,
        });
        self.enqueue_with_record(&record, action, depends_on).await?;
        Ok(local_id)
    }

    pub async fn update_unit_field(
        &self,
        unit_id: &str,
        field: &str,
        value: Value,
    ) -> Result<QueueEntryId> {
        let unit_id = require_id("unit_id", unit_id)?;
        let action = SyncAction::UpdateUnitField(UpdateUnitField {
            unit_id: unit_id.clone(),
            field: field.to_string(),
            value: value.clone(),
        });
        self.update_field(&unit_id, RecordKind::Unit, field, &value, action)
            .await
    }

    pub async fn save_unit_check(&self, unit_id: &str, check: UnitCheckData) -> Result<LocalId> {
        let unit_id = require_id("unit_id", unit_id)?;
        let local_id = Self::allocate_local_id();
        let record = LocalRecord::new(
            local_id,
            Some(unit_id.clone()),
            self.parent_scope(&unit_id).await?,
            RecordData::UnitCheck(check.clone()),
        );
        let depends_on = self.creator_dependencies(&unit_id).await?;
        let action = SyncAction::SaveUnitCheck(SaveUnitCheck {
            local_id,
            unit_id,
            check,
        });
        self.enqueue_with_record(&record, action, depends_on).await?;
        Ok(local_id)
    }

    pub async fn save_unit_grade(&self, unit_id: &str, grade: UnitGradeData) -> Result<LocalId> {
        let unit_id = require_id("unit_id", unit_id)?;
        let local_id = Self::allocate_local_id();
        let record = LocalRecord::new(
            local_id,
            Some(unit_id.clone()),
            self.parent_scope(&unit_id).await?,
            RecordData::UnitGrade(grade.clone()),
        );
        let depends_on = self.creator_dependencies(&unit_id).await?;
        let action = SyncAction::SaveUnitGrade(SaveUnitGrade {
            local_id,
            unit_id,
            grade,
        });
        self.enqueue_with_record(&record, action, depends_on).await?;
        Ok(local_id)
    }

    // -----------------------------------------------------------------------
    // Notes
    // -----------------------------------------------------------------------

    pub async fn create_note(&self, subject_id: &str, note: NoteData) -> Result<LocalId> {
        let subject_id = require_id("subject_id", subject_id)?;
        if note.body.trim().is_empty() {
            return Err(Error::InvalidInput("Note body cannot be empty".to_string()));
        }
        let local_id = Self::allocate_local_id();
        let record = LocalRecord::new(
            local_id,
            Some(subject_id.clone()),
            self.parent_scope(&subject_id).await?,
            RecordData::Note(note.clone()),
        );
        let depends_on = self.creator_dependencies(&subject_id).await?;
        let action = SyncAction::CreateNote(CreateNote {
            local_id,
            subject_id,
            note,
        });
        self.enqueue_with_record(&record, action, depends_on).await?;
        Ok(local_id)
    }

    pub async fn add_note_photo(
        &self,
        note_id: &str,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
    ) -> Result<LocalId> {
        let note_id = require_id("note_id", note_id)?;
        let (local_id, capture, blob) = self.prepare_capture(filename, mime_type, bytes, None)?;
        let record = LocalRecord::new(
            local_id,
            Some(note_id.clone()),
            self.parent_scope(&note_id).await?,
            RecordData::Capture(capture.clone()),
        );
        let depends_on = self.creator_dependencies(&note_id).await?;
        let action = SyncAction::UploadNotePhoto(UploadNotePhoto {
            local_id,
            note_id,
            capture,
        });
        self.append_media(&record, &blob, action, depends_on).await?;
        Ok(local_id)
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    fn committed(&self, entry: &QueueEntry) {
        self.revision.bump();
        tracing::debug!("Queued {} as {}", entry.action.name(), entry.id);
    }

    /// Ids of open entries that create `parent_id`, which a child must wait for.
    async fn creator_dependencies(&self, parent_id: &str) -> Result<Vec<String>> {
        Ok(self
            .store
            .list_open_entries_for(parent_id)
            .await?
            .into_iter()
            .filter(|entry| {
                entry
                    .action
                    .created_local_id()
                    .is_some_and(|id| id.as_str() == parent_id)
            })
            .map(|entry| entry.id.as_str())
            .collect())
    }

    /// Children of a local parent share its scope.
    async fn parent_scope(&self, parent_id: &str) -> Result<Option<String>> {
        Ok(self
            .store
            .get_record(parent_id)
            .await?
            .and_then(|record| record.scope_id))
    }

    async fn update_field(
        &self,
        target_id: &str,
        kind: RecordKind,
        field: &str,
        value: &Value,
        action: SyncAction,
    ) -> Result<QueueEntryId> {
        let depends_on = self.creator_dependencies(target_id).await?;
        let entry = QueueEntry::new(action, depends_on);

        match self.store.get_record(target_id).await? {
            Some(mut record) if !record.is_synced() => {
                if record.kind() != kind {
                    return Err(Error::InvalidInput(format!(
                        "Record {target_id} is a {}, not a {kind}",
                        record.kind()
                    )));
                }
                record.data.apply_field(field, value)?;
                self.store
                    .patch_and_append(target_id, &record.data, &entry)
                    .await?;
            }
            _ => self.store.append(None, None, &entry).await?,
        }
        self.committed(&entry);
        Ok(entry.id)
    }

    fn prepare_capture(
        &self,
        filename: &str,
        mime_type: &str,
        bytes: &[u8],
        caption: Option<String>,
    ) -> Result<(LocalId, CaptureData, MediaBlob)> {
        let compressed = compress_capture(bytes, mime_type, self.compression)?;
        let filename = if compressed.compressed {
            jpeg_filename(filename)
        } else {
            filename.trim().to_string()
        };

        let local_id = Self::allocate_local_id();
        let blob_id = LocalId::new().as_str();
        let capture = CaptureData {
            blob_id: blob_id.clone(),
            filename: filename.clone(),
            mime_type: compressed.mime_type.clone(),
            caption: normalize_text_option(caption),
        };
        let blob = MediaBlob::new(
            blob_id,
            local_id.as_str(),
            filename,
            compressed.mime_type,
            compressed.bytes,
        );
        Ok((local_id, capture, blob))
    }

    async fn append_media(
        &self,
        record: &LocalRecord,
        blob: &MediaBlob,
        action: SyncAction,
        depends_on: Vec<String>,
    ) -> Result<QueueEntryId> {
        let entry = QueueEntry::new(action, depends_on);
        self.store.append(Some(record), Some(blob), &entry).await?;
        self.committed(&entry);
        Ok(entry.id)
    }
}

/// Keys other entries may list in `depends_on` to wait for `entry`.
fn dependency_keys(entry: &QueueEntry) -> Vec<String> {
    let mut keys = vec![entry.id.as_str()];
    if let Some(local_id) = entry.action.created_local_id() {
        keys.push(local_id.as_str());
    }
    keys
}

fn require_id(name: &str, value: &str) -> Result<String> {
    let value = value.trim();
    if value.is_empty() {
        return Err(Error::InvalidInput(format!("{name} cannot be empty")));
    }
    Ok(value.to_string())
}
