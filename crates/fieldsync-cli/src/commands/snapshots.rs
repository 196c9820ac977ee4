use std::path::Path;

use fieldsync_core::PageSnapshotCache;

use crate::commands::common::open_store;
use crate::error::CliError;

pub async fn run_snapshots_clear(scope: &str, db_path: &Path) -> Result<(), CliError> {
    let cache = PageSnapshotCache::new(open_store(db_path).await?);
    let removed = cache.clear_for_scope(scope).await?;
    println!("Removed {removed} cached pages");
    Ok(())
}
