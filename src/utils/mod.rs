use std::process::Stdio;
use url::Url;

use crate::config::Config;

/// Format file size in human-readable format
pub fn format_file_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    const THRESHOLD: f64 = 1024.0;

    if bytes == 0 {
        return "0 B".to_string();
    }

    let bytes_f = bytes as f64;
    let unit_index = (bytes_f.log10() / THRESHOLD.log10()).floor() as usize;
    let unit_index = unit_index.min(UNITS.len() - 1);

    let size = bytes_f / THRESHOLD.powi(unit_index as i32);

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS[unit_index])
    } else {
        format!("{:.1} {}", size, UNITS[unit_index])
    }
}

/// Format duration in human-readable format
pub fn format_duration(seconds: f64) -> String {
    let total_seconds = seconds as u64;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, secs)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, secs)
    } else {
        format!("{}s", secs)
    }
}

/// Sanitize filename for safe filesystem usage
pub fn sanitize_filename(filename: &str) -> String {
    filename
        .chars()
        .map(|c| match c {
            // Keep alphanumeric characters, spaces, hyphens, underscores, and dots
            c if c.is_alphanumeric() || c == ' ' || c == '-' || c == '_' || c == '.' => c,
            _ => '_',
        })
        .collect::<String>()
        .trim()
        .to_string()
}

/// Extract domain from URL for display purposes
pub fn extract_domain(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(|host| {
        // Remove 'www.' prefix if present
        host.strip_prefix("www.").unwrap_or(host).to_string()
    })
}

/// Check if the current environment has the external tools we shell out to
pub async fn check_dependencies(config: &Config) -> Vec<String> {
    let mut missing = Vec::new();

    if !check_command_available(&config.extractor.yt_dlp_path, "--version").await {
        missing.push(format!(
            "{} - required for the fallback extractor",
            config.extractor.yt_dlp_path
        ));
    }

    // yt-dlp needs ffmpeg to convert audio
    if !check_command_available("ffmpeg", "-version").await {
        missing.push("ffmpeg - required to convert downloaded audio".to_string());
    }

    if !check_command_available(&config.whisper.binary_path, "--help").await {
        missing.push(format!(
            "{} - required for transcription (pip install openai-whisper)",
            config.whisper.binary_path
        ));
    }

    missing
}

/// Check if a command is available in PATH
pub async fn check_command_available(command: &str, probe_arg: &str) -> bool {
    use tokio::process::Command;

    Command::new(command)
        .arg(probe_arg)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|status| status.success())
        .unwrap_or(false)
}
