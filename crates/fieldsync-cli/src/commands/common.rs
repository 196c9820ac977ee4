use std::env;
use std::path::{Path, PathBuf};

use fieldsync_core::{EngineConfig, LocalStore, OfflineWriter, QueueEntry, QueueStatus, Revision};
use serde::Serialize;

use crate::error::CliError;

pub const DB_PATH_ENV: &str = "FIELDSYNC_DB_PATH";
pub const CONFIG_ENV: &str = "FIELDSYNC_CONFIG";
pub const API_URL_ENV: &str = "FIELDSYNC_API_URL";
pub const API_TOKEN_ENV: &str = "FIELDSYNC_API_TOKEN";

#[derive(Debug, Serialize)]
pub struct QueueItem {
    pub id: String,
    pub action: String,
    pub target: String,
    pub status: String,
    pub retry_count: u32,
    pub stuck: bool,
    pub depends_on: Vec<String>,
    pub last_error: Option<String>,
    pub created_at: i64,
    pub relative_time: String,
}

#[derive(Debug, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub pending: usize,
    pub syncing: usize,
    pub failed: usize,
    pub stuck: usize,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> PathBuf {
    cli_db_path
        .or_else(|| env::var_os(DB_PATH_ENV).map(PathBuf::from))
        .unwrap_or_else(default_db_path)
}

pub fn default_db_path() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fieldsync")
        .join("fieldsync.db")
}

pub fn resolve_config_path(cli_config: Option<PathBuf>) -> Option<PathBuf> {
    cli_config.or_else(|| env::var_os(CONFIG_ENV).map(PathBuf::from))
}

/// Load the engine config file (if any) and apply the API URL override.
pub fn load_engine_config(
    config_path: Option<&Path>,
    api_url_override: Option<String>,
) -> Result<EngineConfig, CliError> {
    let mut config = match config_path {
        Some(path) => {
            let payload = std::fs::read_to_string(path).map_err(|error| {
                CliError::Config(format!("Failed to read {}: {error}", path.display()))
            })?;
            EngineConfig::from_json(&payload)?
        }
        None => EngineConfig::default(),
    };

    if let Some(api_url) = normalize_env_value(api_url_override) {
        config.api_base_url = Some(api_url);
        config = config.validated()?;
    }
    Ok(config)
}

pub fn api_url_from_env() -> Option<String> {
    normalize_env_value(env::var(API_URL_ENV).ok())
}

pub fn api_token_from_env() -> Option<String> {
    normalize_env_value(env::var(API_TOKEN_ENV).ok())
}

fn normalize_env_value(value: Option<String>) -> Option<String> {
    let value = value?;
    let value = value.trim();
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

pub async fn open_store(db_path: &Path) -> Result<LocalStore, CliError> {
    Ok(LocalStore::open_path(db_path).await?)
}

pub async fn open_writer(
    db_path: &Path,
    config: &EngineConfig,
) -> Result<OfflineWriter, CliError> {
    let store = open_store(db_path).await?;
    Ok(OfflineWriter::new(store, Revision::new(), config))
}

pub fn summarize_queue(entries: &[QueueEntry], retry_budget: u32) -> StatusSummary {
    let mut summary = StatusSummary::default();
    for entry in entries {
        if entry.status == QueueStatus::Synced {
            continue;
        }
        summary.pending += 1;
        if entry.is_stuck(retry_budget) {
            summary.stuck += 1;
        } else if entry.status == QueueStatus::Syncing {
            summary.syncing += 1;
        } else if entry.status == QueueStatus::Failed {
            summary.failed += 1;
        }
    }
    summary
}

pub fn queue_entry_to_item(entry: &QueueEntry, retry_budget: u32, now_ms: i64) -> QueueItem {
    QueueItem {
        id: entry.id.to_string(),
        action: entry.action.name().to_string(),
        target: entry.action.target_id(),
        status: entry.status.as_str().to_string(),
        retry_count: entry.retry_count,
        stuck: entry.is_stuck(retry_budget),
        depends_on: entry.depends_on.clone(),
        last_error: entry.last_error.clone(),
        created_at: entry.created_at,
        relative_time: format_relative_time(entry.created_at, now_ms),
    }
}

pub fn format_queue_lines(entries: &[QueueEntry], retry_budget: u32, now_ms: i64) -> Vec<String> {
    entries
        .iter()
        .map(|entry| {
            let status = if entry.is_stuck(retry_budget) {
                "stuck".to_string()
            } else {
                entry.status.as_str().to_string()
            };
            let mut line = format!(
                "{}  {:<20} {:<8} {:<14} {}",
                short_id(&entry.id.to_string()),
                entry.action.name(),
                status,
                short_id(&entry.action.target_id()),
                format_relative_time(entry.created_at, now_ms)
            );
            if entry.retry_count > 0 {
                line.push_str(&format!("  retries {}/{retry_budget}", entry.retry_count));
            }
            if let Some(error) = &entry.last_error {
                line.push_str(&format!("  ({error})"));
            }
            line
        })
        .collect()
}

pub fn format_status_lines(summary: &StatusSummary) -> Vec<String> {
    let mut lines = vec![format!("{} pending", summary.pending)];
    if summary.syncing > 0 {
        lines.push(format!("{} syncing", summary.syncing));
    }
    if summary.failed > 0 {
        lines.push(format!("{} failed, will retry", summary.failed));
    }
    if summary.stuck > 0 {
        lines.push(format!(
            "{} stuck, run `fieldsync reset-stuck` to retry",
            summary.stuck
        ));
    }
    lines
}

pub fn short_id(id: &str) -> String {
    id.chars().take(13).collect()
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

/// MIME type for a capture file, from its extension.
pub fn guess_mime_type(path: &Path) -> &'static str {
    let extension = path
        .extension()
        .and_then(|value| value.to_str())
        .map(str::to_ascii_lowercase);
    match extension.as_deref() {
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tif" | "tiff") => "image/tiff",
        Some("heic") => "image/heic",
        Some("mp4") => "video/mp4",
        Some("mov") => "video/quicktime",
        _ => "application/octet-stream",
    }
}
