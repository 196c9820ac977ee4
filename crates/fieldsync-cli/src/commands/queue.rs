use std::path::Path;

use chrono::Utc;
use fieldsync_core::EngineConfig;

use crate::commands::common::{format_queue_lines, open_store, queue_entry_to_item, QueueItem};
use crate::error::CliError;

pub async fn run_queue(as_json: bool, db_path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    let store = open_store(db_path).await?;
    let entries = store.list_queue().await?;
    let budget = config.sync.retry_budget;
    let now_ms = Utc::now().timestamp_millis();

    if as_json {
        let json_items = entries
            .iter()
            .map(|entry| queue_entry_to_item(entry, budget, now_ms))
            .collect::<Vec<QueueItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
        return Ok(());
    }

    if entries.is_empty() {
        println!("Queue is empty.");
        return Ok(());
    }

    for line in format_queue_lines(&entries, budget, now_ms) {
        println!("{line}");
    }
    Ok(())
}
