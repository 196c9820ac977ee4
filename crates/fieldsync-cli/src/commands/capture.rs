use std::path::Path;

use fieldsync_core::EngineConfig;

use crate::commands::common::{guess_mime_type, open_writer};
use crate::error::CliError;

pub async fn run_capture(
    finding_id: &str,
    caption: Option<String>,
    mime_type: Option<&str>,
    file: &Path,
    db_path: &Path,
    config: &EngineConfig,
) -> Result<(), CliError> {
    let bytes = std::fs::read(file)?;
    if bytes.is_empty() {
        return Err(CliError::EmptyCapture(file.display().to_string()));
    }
    let filename = file
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("capture");
    let mime_type = mime_type.unwrap_or_else(|| guess_mime_type(file));

    let writer = open_writer(db_path, config).await?;
    let local_id = writer
        .add_capture(finding_id, filename, mime_type, &bytes, caption)
        .await?;
    println!("{local_id}");
    Ok(())
}
