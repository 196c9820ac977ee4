//! Local store for fieldsync

mod blob_repository;
mod connection;
mod id_mapping_repository;
mod migrations;
mod queue_repository;
mod record_repository;
mod snapshot_repository;

pub use blob_repository::{LibSqlBlobRepository, MediaBlob};
pub use connection::Database;
pub use id_mapping_repository::LibSqlIdMappingRepository;
pub use migrations::CURRENT_VERSION as SCHEMA_VERSION;
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use record_repository::{LibSqlRecordRepository, RecordRepository};
pub use snapshot_repository::LibSqlSnapshotRepository;
