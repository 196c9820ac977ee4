use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Capture file is empty: {0}")]
    EmptyCapture(String),
    #[error(
        "Sync is not configured. Set FIELDSYNC_API_URL or `api_base_url` in the config file."
    )]
    SyncNotConfigured,
}
