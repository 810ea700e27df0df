use anyhow::{Context, Result};
use std::path::Path;

use crate::cli::OutputFormat;
use crate::transcribe::TranscriptionResult;

/// Render the transcript in the requested format
pub fn render(result: &TranscriptionResult, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Text => Ok(format!("{}\n", result.text.trim())),
        OutputFormat::Json => {
            serde_json::to_string_pretty(result).context("Failed to serialize transcription")
        }
    }
}

/// Save transcription result to file
pub async fn save_to_file(result: &TranscriptionResult, path: &Path, format: OutputFormat) -> Result<()> {
    let content = render(result, format)?;

    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs_err::create_dir_all(parent)?;
    }

    fs_err::write(path, content)?;
    Ok(())
}

/// Print transcription result to console
pub fn print_to_console(result: &TranscriptionResult, format: OutputFormat) -> Result<()> {
    let content = render(result, format)?;
    print!("{}", content);
    if !content.ends_with('\n') {
        println!();
    }
    Ok(())
}
