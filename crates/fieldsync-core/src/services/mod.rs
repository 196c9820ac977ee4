//! Shared services built on the local store

mod snapshot_cache;
mod store;
mod writer;

pub use snapshot_cache::{data_version, PageSnapshotCache, SNAPSHOT_SCHEMA_VERSION};
pub use store::{LocalStore, PurgeCounts};
pub use writer::OfflineWriter;
