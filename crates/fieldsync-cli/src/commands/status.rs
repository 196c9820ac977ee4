use std::path::Path;

use fieldsync_core::EngineConfig;

use crate::commands::common::{format_status_lines, open_store, summarize_queue};
use crate::error::CliError;

pub async fn run_status(as_json: bool, db_path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let entries = store.list_queue().await?;
    let summary = summarize_queue(&entries, config.sync.retry_budget);

    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in format_status_lines(&summary) {
            println!("{line}");
        }
    }
    Ok(())
}
