use std::io::{self, Write};
use std::path::Path;

use fieldsync_core::{EngineConfig, HttpRemoteApi, Revision, SyncManager};

use crate::commands::common::{api_token_from_env, open_store};
use crate::error::CliError;

pub async fn run_sync(db_path: &Path, config: &EngineConfig) -> Result<(), CliError> {
    let Some(api_base_url) = config.api_base_url.as_deref() else {
        return Err(CliError::SyncNotConfigured);
    };

    let store = open_store(db_path).await?;
    let remote = HttpRemoteApi::new(api_base_url, api_token_from_env())?;
    let manager = SyncManager::new(store, remote, config.sync, Revision::new());

    let report = manager
        .start_sync(|progress| {
            print!("\rSynced {}/{}", progress.synced, progress.total);
            io::stdout().flush().ok();
        })
        .await?;
    if report.synced > 0 {
        println!();
    }

    println!(
        "Sync completed: {} synced, {} failed, {} waiting on dependencies",
        report.synced, report.failed, report.skipped
    );
    Ok(())
}
