//! fieldsync-core - Offline-first sync engine for field inspections
//!
//! This crate contains the local store, the offline write path, the sync
//! manager that drains queued mutations to the remote system, and the read
//! bridge that merges local and remote data for display.

pub mod bridge;
pub mod config;
pub mod db;
pub mod error;
pub mod media;
pub mod models;
pub mod remote;
pub mod services;
pub mod sync;
pub mod util;

pub use bridge::{merge_records, MediaLeases, Merged, ReadBridge, Revision};
pub use config::{CompressionOptions, EngineConfig, SyncOptions};
pub use error::{Error, Result};
pub use models::{LocalId, LocalRecord, QueueEntry, QueueEntryId, QueueStatus, SyncAction};
pub use remote::{HttpRemoteApi, RemoteAck, RemoteApi, RemoteError};
pub use services::{LocalStore, OfflineWriter, PageSnapshotCache};
pub use sync::{IdResolver, SyncManager, SyncProgress, SyncReport};
