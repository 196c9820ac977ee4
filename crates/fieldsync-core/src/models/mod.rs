//! Data models for fieldsync

mod ids;
mod queue;
mod record;
mod snapshot;

pub use ids::{LocalId, QueueEntryId};
pub use queue::{
    CreateFinding, CreateNote, CreateUnit, DeleteFinding, QueueEntry, QueueStatus,
    SaveUnitCheck, SaveUnitGrade, SyncAction, UpdateFindingField, UpdateUnitField,
    UploadCapture, UploadNotePhoto,
};
pub use record::{
    CaptureData, FindingData, LocalRecord, NoteData, RecordData, RecordKind, SyncStatus,
    UnitCheckData, UnitData, UnitGradeData,
};
pub use snapshot::PageSnapshot;
