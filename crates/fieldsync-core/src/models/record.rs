//! Locally created domain records

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};
use crate::util::now_millis;

use super::ids::LocalId;

/// Entity kind of a local domain record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    Finding,
    Unit,
    Capture,
    Note,
    UnitCheck,
    UnitGrade,
}

impl RecordKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Finding => "finding",
            Self::Unit => "unit",
            Self::Capture => "capture",
            Self::Note => "note",
            Self::UnitCheck => "unit_check",
            Self::UnitGrade => "unit_grade",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RecordKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "finding" => Ok(Self::Finding),
            "unit" => Ok(Self::Unit),
            "capture" => Ok(Self::Capture),
            "note" => Ok(Self::Note),
            "unit_check" => Ok(Self::UnitCheck),
            "unit_grade" => Ok(Self::UnitGrade),
            other => Err(Error::InvalidInput(format!("Unknown record kind: {other}"))),
        }
    }
}

/// Local sync state of a domain record.
///
/// `Synced` records are invisible to the read bridge; the remote copy takes over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Local,
    Pending,
    Synced,
}

impl SyncStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Pending => "pending",
            Self::Synced => "synced",
        }
    }
}

impl FromStr for SyncStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "local" => Ok(Self::Local),
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            other => Err(Error::InvalidInput(format!("Unknown sync status: {other}"))),
        }
    }
}

/// An inspection finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingData {
    pub area: String,
    pub item: String,
    pub status: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// A unit record in a unit-turn project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitData {
    pub unit_number: String,
    #[serde(default)]
    pub occupancy: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Media attached to a finding or a note. The bytes live in the blob table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureData {
    pub blob_id: String,
    pub filename: String,
    pub mime_type: String,
    #[serde(default)]
    pub caption: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteData {
    pub body: String,
}

/// Answer to one checklist item on a unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitCheckData {
    pub checklist_item_id: String,
    pub answer: String,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitGradeData {
    pub category: String,
    pub grade: String,
}

/// Kind-specific fields of a local record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "fields", rename_all = "snake_case")]
pub enum RecordData {
    Finding(FindingData),
    Unit(UnitData),
    Capture(CaptureData),
    Note(NoteData),
    UnitCheck(UnitCheckData),
    UnitGrade(UnitGradeData),
}

impl RecordData {
    pub const fn kind(&self) -> RecordKind {
        match self {
            Self::Finding(_) => RecordKind::Finding,
            Self::Unit(_) => RecordKind::Unit,
            Self::Capture(_) => RecordKind::Capture,
            Self::Note(_) => RecordKind::Note,
            Self::UnitCheck(_) => RecordKind::UnitCheck,
            Self::UnitGrade(_) => RecordKind::UnitGrade,
        }
    }

    /// Overwrite a single named field, rejecting unknown fields and type mismatches.
    pub fn apply_field(&mut self, field: &str, value: &serde_json::Value) -> Result<()> {
        let mut encoded = serde_json::to_value(&*self)?;
        let fields = encoded
            .get_mut("fields")
            .and_then(serde_json::Value::as_object_mut)
            .ok_or_else(|| Error::Database("Record data is not an object".to_string()))?;

        if !fields.contains_key(field) {
            return Err(Error::InvalidInput(format!(
                "Unknown {} field: {field}",
                self.kind()
            )));
        }
        fields.insert(field.to_string(), value.clone());

        *self = serde_json::from_value(encoded)
            .map_err(|error| Error::InvalidInput(format!("Invalid value for {field}: {error}")))?;
        Ok(())
    }
}

/// A domain record created on this device and not yet superseded by its remote copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalRecord {
    /// Client-generated identifier, never changes
    pub local_id: LocalId,
    /// Parent reference: a remote id or another record's local id
    pub parent_id: Option<String>,
    /// Page-level scope (inspection, project) used for listing
    pub scope_id: Option<String>,
    pub sync_status: SyncStatus,
    pub data: RecordData,
    /// Client clock (Unix ms), for ordering only
    pub created_at: i64,
    pub updated_at: i64,
}

impl LocalRecord {
    /// Create a new pending record.
    #[must_use]
    pub fn new(
        local_id: LocalId,
        parent_id: Option<String>,
        scope_id: Option<String>,
        data: RecordData,
    ) -> Self {
        let now = now_millis();
        Self {
            local_id,
            parent_id,
            scope_id,
            sync_status: SyncStatus::Pending,
            data,
            created_at: now,
            updated_at: now,
        }
    }

    pub const fn kind(&self) -> RecordKind {
        self.data.kind()
    }

    pub fn is_synced(&self) -> bool {
        self.sync_status == SyncStatus::Synced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finding() -> RecordData {
        RecordData::Finding(FindingData {
            area: "Kitchen".to_string(),
            item: "Sink".to_string(),
            status: "open".to_string(),
            severity: None,
            notes: None,
        })
    }

    #[test]
    fn test_kind_roundtrips_through_str() {
        for kind in [
            RecordKind::Finding,
            RecordKind::Unit,
            RecordKind::Capture,
            RecordKind::Note,
            RecordKind::UnitCheck,
            RecordKind::UnitGrade,
        ] {
            assert_eq!(kind.as_str().parse::<RecordKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = LocalRecord::new(LocalId::new(), Some("insp-1".into()), None, finding());
        assert_eq!(record.sync_status, SyncStatus::Pending);
        assert_eq!(record.kind(), RecordKind::Finding);
        assert_eq!(record.created_at, record.updated_at);
    }

    #[test]
    fn test_apply_field_updates_value() {
        let mut data = finding();
        data.apply_field("status", &serde_json::json!("resolved"))
            .unwrap();
        data.apply_field("severity", &serde_json::json!("high"))
            .unwrap();

        let RecordData::Finding(finding) = data else {
            panic!("kind changed");
        };
        assert_eq!(finding.status, "resolved");
        assert_eq!(finding.severity.as_deref(), Some("high"));
    }

    #[test]
    fn test_apply_field_rejects_unknown_field() {
        let mut data = finding();
        let err = data
            .apply_field("color", &serde_json::json!("red"))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
        assert_eq!(data, finding());
    }

    #[test]
    fn test_apply_field_rejects_wrong_type() {
        let mut data = finding();
        assert!(data.apply_field("status", &serde_json::json!(5)).is_err());
    }
}
