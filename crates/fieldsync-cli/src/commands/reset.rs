use std::path::Path;

use fieldsync_core::EngineConfig;

use crate::commands::common::open_writer;
use crate::error::CliError;

pub async fn run_reset_stuck(db_path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    let writer = open_writer(db_path, config).await?;
    let reset = writer.reset_stuck_items().await?;
    if reset == 0 {
        println!("No stuck entries.");
    } else {
        println!("Reset {reset} entries; run `fieldsync sync` to retry.");
    }
    Ok(())
}
