use std::path::{Path, PathBuf};

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use fieldsync_core::models::{DeleteFinding, FindingData};
use fieldsync_core::{EngineConfig, QueueEntry, QueueStatus, SyncAction};
use pretty_assertions::assert_eq;

use crate::cli::{Cli, Commands, SnapshotCommands};
use crate::commands::common::{
    default_db_path, format_queue_lines, format_relative_time, format_status_lines,
    guess_mime_type, load_engine_config, open_writer, queue_entry_to_item, resolve_db_path,
    short_id, summarize_queue, StatusSummary,
};
use crate::commands::completions::run_completions;
use crate::error::CliError;

fn delete_entry(finding_id: &str) -> QueueEntry {
    QueueEntry::new(
        SyncAction::DeleteFinding(DeleteFinding {
            finding_id: finding_id.to_string(),
        }),
        Vec::new(),
    )
}

fn entry_with(status: QueueStatus, retry_count: u32) -> QueueEntry {
    let mut entry = delete_entry("srv-1");
    entry.status = status;
    entry.retry_count = retry_count;
    entry
}

#[test]
fn cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn capture_arguments_parse() {
    let cli = Cli::parse_from([
        "fieldsync",
        "--db-path",
        "/tmp/field.db",
        "capture",
        "--finding",
        "srv-42",
        "--caption",
        "Leak under sink",
        "photo.jpg",
    ]);
    assert_eq!(cli.db_path, Some(PathBuf::from("/tmp/field.db")));
    match cli.command {
        Commands::Capture {
            finding,
            caption,
            mime_type,
            file,
        } => {
            assert_eq!(finding, "srv-42");
            assert_eq!(caption.as_deref(), Some("Leak under sink"));
            assert_eq!(mime_type, None);
            assert_eq!(file, PathBuf::from("photo.jpg"));
        }
        _ => panic!("expected capture command"),
    }
}

#[test]
fn snapshots_clear_requires_scope() {
    assert!(Cli::try_parse_from(["fieldsync", "snapshots", "clear"]).is_err());
    let cli = Cli::parse_from(["fieldsync", "snapshots", "clear", "--scope", "acct-1"]);
    assert!(matches!(
        cli.command,
        Commands::Snapshots {
            command: SnapshotCommands::Clear { ref scope }
        } if scope == "acct-1"
    ));
}

#[test]
fn completions_are_written_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("fieldsync.bash");
    run_completions(Shell::Bash, Some(path.as_path())).unwrap();

    let script = std::fs::read_to_string(&path).unwrap();
    assert!(script.contains("fieldsync"));
    assert!(script.contains("reset-stuck"));
}

#[test]
fn resolve_db_path_prefers_cli_value() {
    let path = PathBuf::from("/tmp/custom.db");
    assert_eq!(resolve_db_path(Some(path.clone())), path);
}

#[test]
fn default_db_path_lives_under_fieldsync_dir() {
    let path = default_db_path();
    assert!(path.ends_with(Path::new("fieldsync").join("fieldsync.db")));
}

#[test]
fn load_engine_config_defaults_without_file() {
    let config = load_engine_config(None, None).unwrap();
    assert_eq!(config, EngineConfig::default());
}

#[test]
fn load_engine_config_reads_file_and_applies_override() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    std::fs::write(
        &path,
        r#"{ "api_base_url": "https://old.example.com", "sync": { "retry_budget": 5 } }"#,
    )
    .unwrap();

    let config = load_engine_config(Some(path.as_path()), None).unwrap();
    assert_eq!(config.api_base_url.as_deref(), Some("https://old.example.com"));
    assert_eq!(config.sync.retry_budget, 5);

    let overridden =
        load_engine_config(Some(path.as_path()), Some(" https://api.example.com/ ".to_string())).unwrap();
    assert_eq!(
        overridden.api_base_url.as_deref(),
        Some("https://api.example.com")
    );
    assert_eq!(overridden.sync.retry_budget, 5);
}

#[test]
fn load_engine_config_blank_override_is_ignored() {
    let config = load_engine_config(None, Some("   ".to_string())).unwrap();
    assert_eq!(config.api_base_url, None);
}

#[test]
fn load_engine_config_rejects_non_http_override() {
    let result = load_engine_config(None, Some("ftp://example.com".to_string()));
    assert!(matches!(result, Err(CliError::Core(_))));
}

#[test]
fn load_engine_config_reports_missing_file() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("missing.json");
    let result = load_engine_config(Some(missing.as_path()), None);
    assert!(matches!(result, Err(CliError::Config(_))));
}

#[test]
fn format_relative_time_units() {
    let now = 100_000_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
    assert_eq!(format_relative_time(now - 3 * 24 * 60 * 60_000, now), "3d ago");
    assert_eq!(format_relative_time(now - 14 * 24 * 60 * 60_000, now), "2w ago");
    assert_eq!(format_relative_time(now + 5_000, now), "just now");
}

#[test]
fn short_id_truncates_long_ids() {
    assert_eq!(
        short_id("0192f3a4-1111-7111-8111-111111111111"),
        "0192f3a4-1111"
    );
    assert_eq!(short_id("srv-42"), "srv-42");
}

#[test]
fn guess_mime_type_matches_extension_case_insensitively() {
    assert_eq!(guess_mime_type(Path::new("site/IMG_0001.JPG")), "image/jpeg");
    assert_eq!(guess_mime_type(Path::new("plan.png")), "image/png");
    assert_eq!(guess_mime_type(Path::new("walkthrough.mov")), "video/quicktime");
    assert_eq!(
        guess_mime_type(Path::new("no_extension")),
        "application/octet-stream"
    );
}

#[test]
fn summarize_queue_counts_stuck_separately_and_skips_synced() {
    let entries = vec![
        entry_with(QueueStatus::Pending, 0),
        entry_with(QueueStatus::Syncing, 0),
        entry_with(QueueStatus::Failed, 1),
        entry_with(QueueStatus::Failed, 3),
        entry_with(QueueStatus::Synced, 0),
    ];

    let summary = summarize_queue(&entries, 3);
    assert_eq!(
        summary,
        StatusSummary {
            pending: 4,
            syncing: 1,
            failed: 1,
            stuck: 1,
        }
    );
}

#[test]
fn format_status_lines_only_mention_nonzero_states() {
    let idle = format_status_lines(&StatusSummary::default());
    assert_eq!(idle, vec!["0 pending".to_string()]);

    let busy = format_status_lines(&StatusSummary {
        pending: 3,
        syncing: 0,
        failed: 1,
        stuck: 2,
    });
    assert_eq!(busy.len(), 3);
    assert_eq!(busy[0], "3 pending");
    assert_eq!(busy[1], "1 failed, will retry");
    assert!(busy[2].contains("reset-stuck"));
}

#[test]
fn format_queue_lines_show_retries_and_errors() {
    let mut entry = entry_with(QueueStatus::Failed, 3);
    entry.last_error = Some("Server error 503".to_string());

    let lines = format_queue_lines(&[entry.clone()], 3, entry.created_at);
    assert_eq!(lines.len(), 1);
    assert!(lines[0].contains("delete_finding"));
    assert!(lines[0].contains("stuck"));
    assert!(lines[0].contains("retries 3/3"));
    assert!(lines[0].contains("(Server error 503)"));
    assert!(lines[0].contains("just now"));
}

#[test]
fn queue_entry_to_item_reports_target_and_stuck_flag() {
    let entry = entry_with(QueueStatus::Failed, 2);
    let item = queue_entry_to_item(&entry, 3, entry.created_at + 120_000);

    assert_eq!(item.id, entry.id.to_string());
    assert_eq!(item.action, "delete_finding");
    assert_eq!(item.target, "srv-1");
    assert_eq!(item.status, "failed");
    assert!(!item.stuck);
    assert_eq!(item.relative_time, "2m ago");

    let json = serde_json::to_value(&item).unwrap();
    assert_eq!(json["retry_count"], 2);
    assert_eq!(json["stuck"], false);
}

#[tokio::test(flavor = "multi_thread")]
async fn open_writer_queues_into_file_store() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("fieldsync.db");
    let config = EngineConfig::default();

    {
        let writer = open_writer(&db_path, &config).await.unwrap();
        writer
            .create_finding(
                "insp-7",
                FindingData {
                    area: "Kitchen".to_string(),
                    item: "Sink".to_string(),
                    status: "open".to_string(),
                    severity: None,
                    notes: None,
                },
            )
            .await
            .unwrap();
    }

    let writer = open_writer(&db_path, &config).await.unwrap();
    let entries = writer.list_queue().await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action.name(), "create_finding");

    let summary = summarize_queue(&entries, config.sync.retry_budget);
    assert_eq!(summary.pending, 1);
    assert_eq!(summary.stuck, 0);
}
