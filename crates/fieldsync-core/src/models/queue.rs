//! Sync queue entries and the closed set of remote actions they describe

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::sync::IdResolver;
use crate::util::now_millis;

use super::ids::{LocalId, QueueEntryId};
use super::record::{
    CaptureData, FindingData, NoteData, UnitCheckData, UnitData, UnitGradeData,
};

/// Lifecycle state of a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Syncing,
    Failed,
    Synced,
}

impl QueueStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Syncing => "syncing",
            Self::Failed => "failed",
            Self::Synced => "synced",
        }
    }
}

impl FromStr for QueueStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "pending" => Ok(Self::Pending),
            "syncing" => Ok(Self::Syncing),
            "failed" => Ok(Self::Failed),
            "synced" => Ok(Self::Synced),
            other => Err(Error::InvalidInput(format!("Unknown queue status: {other}"))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateFinding {
    pub local_id: LocalId,
    pub inspection_id: String,
    pub finding: FindingData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateFindingField {
    pub finding_id: String,
    pub field: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteFinding {
    pub finding_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadCapture {
    pub local_id: LocalId,
    pub finding_id: String,
    pub capture: CaptureData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateUnit {
    pub local_id: LocalId,
    pub project_id: String,
    pub unit: UnitData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateUnitField {
    pub unit_id: String,
    pub field: String,
    pub value: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveUnitCheck {
    pub local_id: LocalId,
    pub unit_id: String,
    pub check: UnitCheckData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveUnitGrade {
    pub local_id: LocalId,
    pub unit_id: String,
    pub grade: UnitGradeData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNote {
    pub local_id: LocalId,
    /// Finding, unit, or project the note is written against
    pub subject_id: String,
    pub note: NoteData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadNotePhoto {
    pub local_id: LocalId,
    pub note_id: String,
    pub capture: CaptureData,
}

/// A remote mutation, one variant per remote operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", content = "payload", rename_all = "snake_case")]
pub enum SyncAction {
    CreateFinding(CreateFinding),
    UpdateFindingField(UpdateFindingField),
    DeleteFinding(DeleteFinding),
    UploadCapture(UploadCapture),
    CreateUnit(CreateUnit),
    UpdateUnitField(UpdateUnitField),
    SaveUnitCheck(SaveUnitCheck),
    SaveUnitGrade(SaveUnitGrade),
    CreateNote(CreateNote),
    UploadNotePhoto(UploadNotePhoto),
}

impl SyncAction {
    /// Stable tag stored alongside the payload.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::CreateFinding(_) => "create_finding",
            Self::UpdateFindingField(_) => "update_finding_field",
            Self::DeleteFinding(_) => "delete_finding",
            Self::UploadCapture(_) => "upload_capture",
            Self::CreateUnit(_) => "create_unit",
            Self::UpdateUnitField(_) => "update_unit_field",
            Self::SaveUnitCheck(_) => "save_unit_check",
            Self::SaveUnitGrade(_) => "save_unit_grade",
            Self::CreateNote(_) => "create_note",
            Self::UploadNotePhoto(_) => "upload_note_photo",
        }
    }

    /// Local id of the record this action creates remotely, if it is create-style.
    pub const fn created_local_id(&self) -> Option<LocalId> {
        match self {
            Self::CreateFinding(action) => Some(action.local_id),
            Self::UploadCapture(action) => Some(action.local_id),
            Self::CreateUnit(action) => Some(action.local_id),
            Self::SaveUnitCheck(action) => Some(action.local_id),
            Self::SaveUnitGrade(action) => Some(action.local_id),
            Self::CreateNote(action) => Some(action.local_id),
            Self::UploadNotePhoto(action) => Some(action.local_id),
            Self::UpdateFindingField(_) | Self::DeleteFinding(_) | Self::UpdateUnitField(_) => {
                None
            }
        }
    }

    /// The record id this action acts on: the created record, or the updated/deleted one.
    pub fn target_id(&self) -> String {
        match self {
            Self::UpdateFindingField(action) => action.finding_id.clone(),
            Self::DeleteFinding(action) => action.finding_id.clone(),
            Self::UpdateUnitField(action) => action.unit_id.clone(),
            other => other
                .created_local_id()
                .map(|id| id.as_str())
                .unwrap_or_default(),
        }
    }

    /// Ids of other records this action points at (parents that may still be local).
    pub fn parent_refs(&self) -> Vec<&str> {
        match self {
            Self::CreateFinding(action) => vec![action.inspection_id.as_str()],
            Self::UpdateFindingField(action) => vec![action.finding_id.as_str()],
            Self::DeleteFinding(action) => vec![action.finding_id.as_str()],
            Self::UploadCapture(action) => vec![action.finding_id.as_str()],
            Self::CreateUnit(action) => vec![action.project_id.as_str()],
            Self::UpdateUnitField(action) => vec![action.unit_id.as_str()],
            Self::SaveUnitCheck(action) => vec![action.unit_id.as_str()],
            Self::SaveUnitGrade(action) => vec![action.unit_id.as_str()],
            Self::CreateNote(action) => vec![action.subject_id.as_str()],
            Self::UploadNotePhoto(action) => vec![action.note_id.as_str()],
        }
    }

    /// Whether this action creates, targets, or points at `id`.
    pub fn references(&self, id: &str) -> bool {
        self.target_id() == id || self.parent_refs().contains(&id)
    }

    /// Blob that must be uploaded with this action, if any.
    pub fn blob_id(&self) -> Option<&str> {
        match self {
            Self::UploadCapture(action) => Some(action.capture.blob_id.as_str()),
            Self::UploadNotePhoto(action) => Some(action.capture.blob_id.as_str()),
            _ => None,
        }
    }

    /// Replace parent references that have a known remote id.
    pub fn resolve_refs(&mut self, resolver: &IdResolver) {
        let parent = match self {
            Self::CreateFinding(action) => &mut action.inspection_id,
            Self::UpdateFindingField(action) => &mut action.finding_id,
            Self::DeleteFinding(action) => &mut action.finding_id,
            Self::UploadCapture(action) => &mut action.finding_id,
            Self::CreateUnit(action) => &mut action.project_id,
            Self::UpdateUnitField(action) => &mut action.unit_id,
            Self::SaveUnitCheck(action) => &mut action.unit_id,
            Self::SaveUnitGrade(action) => &mut action.unit_id,
            Self::CreateNote(action) => &mut action.subject_id,
            Self::UploadNotePhoto(action) => &mut action.note_id,
        };
        if let Some(remote_id) = resolver.resolve(parent) {
            *parent = remote_id.to_string();
        }
    }
}

/// A durable description of one intended remote mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    pub id: QueueEntryId,
    pub action: SyncAction,
    /// Queue-entry ids or local ids that must resolve before this entry may run
    pub depends_on: Vec<String>,
    pub status: QueueStatus,
    pub retry_count: u32,
    pub last_error: Option<String>,
    /// Client clock (Unix ms)
    pub created_at: i64,
    pub updated_at: i64,
}

impl QueueEntry {
    /// Create a new pending entry with a zero retry count.
    #[must_use]
    pub fn new(action: SyncAction, depends_on: Vec<String>) -> Self {
        let now = now_millis();
        Self {
            id: QueueEntryId::new(),
            action,
            depends_on,
            status: QueueStatus::Pending,
            retry_count: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the entry has exhausted `retry_budget` and is excluded from draining.
    pub fn is_stuck(&self, retry_budget: u32) -> bool {
        self.retry_count >= retry_budget
            && matches!(self.status, QueueStatus::Failed | QueueStatus::Pending)
    }

    /// Whether a drain pass may pick this entry up.
    pub fn is_drainable(&self, retry_budget: u32) -> bool {
        matches!(self.status, QueueStatus::Pending | QueueStatus::Failed)
            && self.retry_count < retry_budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_finding(local_id: LocalId) -> SyncAction {
        SyncAction::CreateFinding(CreateFinding {
            local_id,
            inspection_id: "insp-7".to_string(),
            finding: FindingData {
                area: "Bath".to_string(),
                item: "Vanity".to_string(),
                status: "open".to_string(),
                severity: None,
                notes: None,
            },
        })
    }

    fn upload_capture(finding_id: &str) -> SyncAction {
        SyncAction::UploadCapture(UploadCapture {
            local_id: LocalId::new(),
            finding_id: finding_id.to_string(),
            capture: CaptureData {
                blob_id: "blob-1".to_string(),
                filename: "photo.jpg".to_string(),
                mime_type: "image/jpeg".to_string(),
                caption: None,
            },
        })
    }

    #[test]
    fn test_serialized_form_is_tagged() {
        let action = create_finding(LocalId::new());
        let json = serde_json::to_value(&action).unwrap();
        assert_eq!(json["action"], "create_finding");
        assert_eq!(json["payload"]["inspection_id"], "insp-7");

        let parsed: SyncAction = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, action);
    }

    #[test]
    fn test_created_local_id_only_for_create_actions() {
        let local_id = LocalId::new();
        assert_eq!(create_finding(local_id).created_local_id(), Some(local_id));

        let update = SyncAction::UpdateFindingField(UpdateFindingField {
            finding_id: local_id.as_str(),
            field: "status".to_string(),
            value: serde_json::json!("closed"),
        });
        assert_eq!(update.created_local_id(), None);
        assert_eq!(update.target_id(), local_id.as_str());
    }

    #[test]
    fn test_resolve_refs_substitutes_known_parent() {
        let finding_local = LocalId::new();
        let mut resolver = IdResolver::default();
        resolver.insert(finding_local.as_str(), "srv-42");

        let mut action = upload_capture(&finding_local.as_str());
        action.resolve_refs(&resolver);

        let SyncAction::UploadCapture(upload) = action else {
            panic!("variant changed");
        };
        assert_eq!(upload.finding_id, "srv-42");
    }

    #[test]
    fn test_resolve_refs_keeps_unknown_parent() {
        let mut action = upload_capture("srv-9");
        action.resolve_refs(&IdResolver::default());
        assert!(action.references("srv-9"));
    }

    #[test]
    fn test_entry_stuck_and_drainable() {
        let mut entry = QueueEntry::new(create_finding(LocalId::new()), Vec::new());
        assert!(entry.is_drainable(3));
        assert!(!entry.is_stuck(3));

        entry.status = QueueStatus::Failed;
        entry.retry_count = 3;
        assert!(!entry.is_drainable(3));
        assert!(entry.is_stuck(3));
    }
}
