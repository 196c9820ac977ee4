//! Remote system of record, as seen by the sync manager.

mod http;

pub use http::HttpRemoteApi;

use thiserror::Error;

use crate::db::MediaBlob;
use crate::models::{
    CreateFinding, CreateNote, CreateUnit, DeleteFinding, SaveUnitCheck, SaveUnitGrade,
    UpdateFindingField, UpdateUnitField, UploadCapture, UploadNotePhoto,
};

/// Successful remote response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteAck {
    /// Identifier assigned by the remote system (create-style actions)
    pub remote_id: Option<String>,
}

impl RemoteAck {
    pub fn created(remote_id: impl Into<String>) -> Self {
        Self {
            remote_id: Some(remote_id.into()),
        }
    }

    pub const fn empty() -> Self {
        Self { remote_id: None }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Transport failure or timeout
    #[error("Network error: {0}")]
    Network(String),
    /// 5xx, 408, and 429 responses
    #[error("Remote server error (HTTP {status}): {message}")]
    Server { status: u16, message: String },
    /// Validation failures, conflicts, and other 4xx responses
    #[error("Remote rejected request (HTTP {status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("Invalid remote response: {0}")]
    InvalidResponse(String),
    /// Upload entry whose blob is no longer in the local store
    #[error("Media blob missing for upload: {0}")]
    MissingBlob(String),
}

impl RemoteError {
    /// Classify a non-success HTTP status.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        if status >= 500 || status == 408 || status == 429 {
            Self::Server { status, message }
        } else {
            Self::Rejected { status, message }
        }
    }

    /// Whether retrying the same request later could succeed.
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Server { .. } | Self::InvalidResponse(_) => true,
            Self::Rejected { .. } | Self::MissingBlob(_) => false,
        }
    }
}

impl From<reqwest::Error> for RemoteError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            Self::InvalidResponse(error.to_string())
        } else if let Some(status) = error.status() {
            Self::from_status(status.as_u16(), error.to_string())
        } else {
            Self::Network(error.to_string())
        }
    }
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// One request-style operation per queue action.
///
/// Payload references are already translated to remote ids when a method is
/// called. Create-style requests carry their local id, which implementations
/// should forward as an idempotency key.
#[allow(async_fn_in_trait)]
pub trait RemoteApi {
    async fn create_finding(&self, request: &CreateFinding) -> RemoteResult<RemoteAck>;

    async fn update_finding_field(&self, request: &UpdateFindingField)
        -> RemoteResult<RemoteAck>;

    async fn delete_finding(&self, request: &DeleteFinding) -> RemoteResult<RemoteAck>;

    async fn upload_capture(
        &self,
        request: &UploadCapture,
        media: &MediaBlob,
    ) -> RemoteResult<RemoteAck>;

    async fn create_unit(&self, request: &CreateUnit) -> RemoteResult<RemoteAck>;

    async fn update_unit_field(&self, request: &UpdateUnitField) -> RemoteResult<RemoteAck>;

    async fn save_unit_check(&self, request: &SaveUnitCheck) -> RemoteResult<RemoteAck>;

    async fn save_unit_grade(&self, request: &SaveUnitGrade) -> RemoteResult<RemoteAck>;

    async fn create_note(&self, request: &CreateNote) -> RemoteResult<RemoteAck>;

    async fn upload_note_photo(
        &self,
        request: &UploadNotePhoto,
        media: &MediaBlob,
    ) -> RemoteResult<RemoteAck>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert!(RemoteError::from_status(503, "busy").is_retryable());
        assert!(RemoteError::from_status(429, "slow down").is_retryable());
        assert!(RemoteError::from_status(408, "timeout").is_retryable());
        assert!(!RemoteError::from_status(422, "invalid").is_retryable());
        assert!(!RemoteError::from_status(409, "conflict").is_retryable());
        assert!(RemoteError::Network("reset".into()).is_retryable());
        assert!(!RemoteError::MissingBlob("b1".into()).is_retryable());
        assert!(RemoteError::InvalidResponse("eof".into()).is_retryable());
    }
}
