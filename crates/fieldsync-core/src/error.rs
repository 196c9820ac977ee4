//! Error types for fieldsync-core

use thiserror::Error;

use crate::remote::RemoteError;

/// Result type alias using fieldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Record or queue entry not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Capture could not be decoded or re-encoded
    #[error("Media error: {0}")]
    Media(String),

    /// Stored data was written by a newer schema than this build understands
    #[error("Incompatible local store schema version {found} (supported up to {supported})")]
    IncompatibleSchema { found: i64, supported: i64 },

    /// Remote system error
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}
