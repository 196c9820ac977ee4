//! fieldsync CLI - Inspect and drain the offline sync queue
//!
//! Works against the same local store the field app writes to, so queued
//! changes can be checked, retried, or synced from a terminal.

mod cli;
mod commands;
mod error;

use clap::Parser;

use crate::cli::{Cli, Commands, SnapshotCommands};
use crate::commands::capture::run_capture;
use crate::commands::common::{
    api_url_from_env, load_engine_config, resolve_config_path, resolve_db_path,
};
use crate::commands::completions::run_completions;
use crate::commands::discard::run_discard;
use crate::commands::queue::run_queue;
use crate::commands::reset::run_reset_stuck;
use crate::commands::snapshots::run_snapshots_clear;
use crate::commands::status::run_status;
use crate::commands::sync::run_sync;
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "fieldsync=info"
        .parse::<tracing_subscriber::filter::Directive>()
        .map_err(|error| CliError::Config(format!("Invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let db_path = resolve_db_path(cli.db_path);
    let config_path = resolve_config_path(cli.config);
    let config = load_engine_config(config_path.as_deref(), api_url_from_env())?;

    match cli.command {
        Commands::Status { json } => run_status(json, &db_path, &config).await?,
        Commands::Queue { json } => run_queue(json, &db_path, &config).await?,
        Commands::Sync => run_sync(&db_path, &config).await?,
        Commands::ResetStuck => run_reset_stuck(&db_path, &config).await?,
        Commands::Capture {
            finding,
            caption,
            mime_type,
            file,
        } => {
            run_capture(
                &finding,
                caption,
                mime_type.as_deref(),
                &file,
                &db_path,
                &config,
            )
            .await?;
        }
        Commands::Discard { local_id } => run_discard(&local_id, &db_path, &config).await?,
        Commands::Snapshots { command } => match command {
            SnapshotCommands::Clear { scope } => run_snapshots_clear(&scope, &db_path).await?,
        },
        Commands::Completions { shell, output } => {
            run_completions(shell, output.as_deref())?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests;
