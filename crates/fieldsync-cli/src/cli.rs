use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clap_complete::Shell;

#[derive(Parser)]
#[command(name = "fieldsync")]
#[command(about = "Inspect and drain the offline sync queue from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// Optional path to an engine config file (JSON)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show pending, syncing, and stuck counts
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// List queue entries in drain order
    Queue {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Drain the queue against the remote API
    Sync,
    /// Give stuck entries and their dependents a fresh retry budget
    ResetStuck,
    /// Compress a photo and queue its upload for a finding
    Capture {
        /// Finding id (remote id or local id)
        #[arg(long, value_name = "ID")]
        finding: String,
        /// Optional caption
        #[arg(long)]
        caption: Option<String>,
        /// MIME type override (guessed from the extension when omitted)
        #[arg(long, value_name = "TYPE")]
        mime_type: Option<String>,
        /// File to capture
        file: PathBuf,
    },
    /// Cancel a record created offline before it synced
    Discard {
        /// Local id of the record
        local_id: String,
    },
    /// Manage cached page snapshots
    Snapshots {
        #[command(subcommand)]
        command: SnapshotCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: Shell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Subcommand)]
pub enum SnapshotCommands {
    /// Remove every snapshot whose page id contains the scope token
    Clear {
        /// Scope token, e.g. an account id
        #[arg(long, value_name = "TOKEN")]
        scope: String,
    },
}
