use std::path::Path;

use fieldsync_core::EngineConfig;

use crate::commands::common::open_writer;
use crate::error::CliError;

pub async fn run_discard(local_id: &str, db_path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    let writer = open_writer(db_path, config).await?;
    let cancelled = writer.discard_local_record(local_id.trim()).await?;
    println!("Discarded {local_id} ({cancelled} queued changes cancelled)");
    Ok(())
}
