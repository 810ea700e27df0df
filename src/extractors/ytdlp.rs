use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::{AudioExtractor, AudioFormat, ExtractedAudio};
use crate::config::ExtractorConfig;
use crate::cookies::CookieSet;
use crate::utils::format_duration;
use crate::{Result, TranscriptorError, UnavailableReason};

/// Base name of every file this extractor writes
const OUTPUT_BASE: &str = "fallback_audio";

/// Leftovers of an interrupted yt-dlp run
const INCOMPLETE_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp"];

/// General-purpose audio extractor using yt-dlp
pub struct YtDlpExtractor {
    yt_dlp_path: String,
    socket_timeout_secs: u64,
    audio_format: AudioFormat,
    audio_quality: String,
}

/// What the metadata probe tells us about a URL
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeInfo {
    pub title: Option<String>,
    pub duration: Option<f64>,
}

impl YtDlpExtractor {
    pub fn new(settings: &ExtractorConfig) -> Self {
        Self {
            yt_dlp_path: settings.yt_dlp_path.clone(),
            socket_timeout_secs: settings.socket_timeout_secs,
            audio_format: settings.audio_format,
            audio_quality: settings.audio_quality.clone(),
        }
    }

    /// Check if yt-dlp is available
    pub async fn check_availability(&self) -> bool {
        Command::new(&self.yt_dlp_path)
            .arg("--version")
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map(|output| output.status.success())
            .unwrap_or(false)
    }

    fn base_args(&self, cookie_file: Option<&Path>) -> Vec<String> {
        let mut args = vec![
            "--no-warnings".to_string(),
            "--socket-timeout".to_string(),
            self.socket_timeout_secs.to_string(),
        ];

        if let Some(path) = cookie_file {
            args.push("--cookies".to_string());
            args.push(path.to_string_lossy().into_owned());
        }

        args
    }

    /// Run yt-dlp, killing it if the request is cancelled
    async fn run(&self, args: Vec<String>, cancel: &CancellationToken) -> Result<Output> {
        let child = Command::new(&self.yt_dlp_path)
            .args(&args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                TranscriptorError::ExtractionFailed(format!(
                    "yt-dlp is not available ({}). Please install it: https://github.com/yt-dlp/yt-dlp",
                    e
                ))
            })?;

        tokio::select! {
            _ = cancel.cancelled() => Err(TranscriptorError::Cancelled),
            output = child.wait_with_output() => output.map_err(|e| {
                TranscriptorError::ExtractionFailed(format!("yt-dlp did not finish: {}", e))
            }),
        }
    }

    /// Get media information without downloading anything
    async fn probe(&self, url: &str, cookie_file: Option<&Path>, cancel: &CancellationToken) -> Result<ProbeInfo> {
        tracing::debug!("Probing media info for: {}", url);

        let mut args = self.base_args(cookie_file);
        args.extend(["--dump-single-json", "--no-playlist", "--flat-playlist"].map(String::from));
        args.push(url.to_string());

        let output = self.run(args, cancel).await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let info: Value = serde_json::from_slice(&output.stdout).map_err(|e| {
            TranscriptorError::ExtractionFailed(format!("yt-dlp returned malformed metadata: {}", e))
        })?;

        check_probe(&info)
    }

    /// Download and transcode the audio track into `temp_dir`
    async fn download_audio(
        &self,
        url: &str,
        temp_dir: &Path,
        cookie_file: Option<&Path>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        tracing::debug!("Downloading audio with yt-dlp for: {}", url);

        let template = temp_dir.join(format!("{}.%(ext)s", OUTPUT_BASE));
        let mut args = self.base_args(cookie_file);
        args.extend(
            [
                "--format",
                "bestaudio/best",
                "--extract-audio",
                "--audio-format",
                self.audio_format.as_str(),
                "--audio-quality",
                self.audio_quality.as_str(),
                "--no-playlist",
                "--newline",
                "--output",
            ]
            .map(String::from),
        );
        args.push(template.to_string_lossy().into_owned());
        args.push(url.to_string());

        let output = self.run(args, cancel).await?;
        if !output.status.success() {
            return Err(classify_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        Ok(())
    }

    /// Find the downloaded file: expected name first, then any file with our prefix
    fn locate_output(&self, temp_dir: &Path) -> Result<PathBuf> {
        let expected = temp_dir.join(format!("{}.{}", OUTPUT_BASE, self.audio_format.as_str()));
        if expected.is_file() {
            return Ok(expected);
        }

        let prefix = format!("{}.", OUTPUT_BASE);
        let mut candidates: Vec<PathBuf> = std::fs::read_dir(temp_dir)?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| path.is_file())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .map(|name| {
                        name.starts_with(&prefix)
                            && !INCOMPLETE_SUFFIXES.iter().any(|suffix| name.ends_with(suffix))
                    })
                    .unwrap_or(false)
            })
            .collect();
        candidates.sort();

        candidates.into_iter().next().ok_or_else(|| {
            TranscriptorError::ExtractionFailed(format!(
                "yt-dlp finished but no audio file was found in {}",
                temp_dir.display()
            ))
        })
    }
}

#[async_trait]
impl AudioExtractor for YtDlpExtractor {
    fn name(&self) -> &'static str {
        "yt-dlp"
    }

    async fn extract(
        &self,
        url: &str,
        temp_dir: &Path,
        cookies: Option<&CookieSet>,
        cancel: &CancellationToken,
    ) -> Result<ExtractedAudio> {
        // Lives until the end of this call, whatever the outcome.
        let cookie_file = match cookies {
            Some(set) if !set.is_empty() => Some(set.write_temp_file(temp_dir)?),
            _ => None,
        };
        let cookie_path = cookie_file.as_ref().map(|file| file.path());

        let info = self.probe(url, cookie_path, cancel).await?;
        tracing::info!(
            "Media: {} ({})",
            info.title.as_deref().unwrap_or("untitled"),
            info.duration
                .map(format_duration)
                .unwrap_or_else(|| "unknown duration".to_string())
        );

        self.download_audio(url, temp_dir, cookie_path, cancel).await?;
        let path = self.locate_output(temp_dir)?;

        tracing::info!("Downloaded audio to {}", path.display());

        Ok(ExtractedAudio {
            path,
            title: info.title,
        })
    }
}

/// Reject playlists and live content, keep title and duration for logging
pub fn check_probe(info: &Value) -> Result<ProbeInfo> {
    let is_playlist = info["_type"].as_str() == Some("playlist")
        || info["entries"].as_array().map_or(false, |entries| !entries.is_empty());
    if is_playlist {
        return Err(TranscriptorError::UnavailableContent(UnavailableReason::Playlist));
    }

    let is_live = info["is_live"].as_bool().unwrap_or(false)
        || matches!(info["live_status"].as_str(), Some("is_live") | Some("is_upcoming"));
    if is_live {
        return Err(TranscriptorError::UnavailableContent(UnavailableReason::Live));
    }

    Ok(ProbeInfo {
        title: info["title"].as_str().map(|s| s.to_string()),
        duration: info["duration"].as_f64(),
    })
}

/// Map yt-dlp's stderr onto a typed error
pub fn classify_failure(stderr: &str) -> TranscriptorError {
    let lower = stderr.to_lowercase();

    let reason = if lower.contains("private video") || lower.contains("video is private") {
        Some(UnavailableReason::Private)
    } else if lower.contains("members-only") || lower.contains("members only") || lower.contains("join this channel") {
        Some(UnavailableReason::MembersOnly)
    } else if lower.contains("not made this video available in your country")
        || lower.contains("not available in your country")
        || lower.contains("geo restrict")
        || lower.contains("geo-restrict")
    {
        Some(UnavailableReason::RegionBlocked)
    } else if lower.contains("sign in to confirm your age")
        || lower.contains("age-restricted")
        || lower.contains("age restricted")
        || lower.contains("inappropriate for some users")
    {
        Some(UnavailableReason::AgeRestricted)
    } else {
        None
    };

    match reason {
        Some(reason) => TranscriptorError::UnavailableContent(reason),
        None => {
            let message = stderr
                .lines()
                .rev()
                .find(|line| line.contains("ERROR"))
                .unwrap_or_else(|| stderr.trim())
                .trim();
            TranscriptorError::ExtractionFailed(format!("yt-dlp failed: {}", message))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn extractor() -> YtDlpExtractor {
        YtDlpExtractor::new(&ExtractorConfig::default())
    }

    #[test]
    fn test_classify_known_failures() {
        let cases = [
            ("ERROR: [youtube] abc: Private video. Sign in if you've been granted access", UnavailableReason::Private),
            ("ERROR: [youtube] abc: Join this channel to get access to members-only content", UnavailableReason::MembersOnly),
            ("ERROR: [youtube] abc: The uploader has not made this video available in your country", UnavailableReason::RegionBlocked),
            ("ERROR: [youtube] abc: Sign in to confirm your age. This video may be inappropriate for some users.", UnavailableReason::AgeRestricted),
        ];

        for (stderr, expected) in cases {
            match classify_failure(stderr) {
                TranscriptorError::UnavailableContent(actual) => assert_eq!(actual, expected),
                other => panic!("unexpected error for {}: {}", stderr, other),
            }
        }
    }

    #[test]
    fn test_unknown_failure_is_generic() {
        let stderr = "WARNING: something odd\nERROR: Unable to download webpage: HTTP Error 500\n";
        match classify_failure(stderr) {
            TranscriptorError::ExtractionFailed(message) => {
                assert!(message.contains("HTTP Error 500"));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_probe_rejects_playlists_and_live() {
        let playlist = json!({ "_type": "playlist", "title": "Mix", "entries": [{ "id": "a" }] });
        assert!(matches!(
            check_probe(&playlist),
            Err(TranscriptorError::UnavailableContent(UnavailableReason::Playlist))
        ));

        let live = json!({ "title": "Live", "live_status": "is_live" });
        assert!(matches!(
            check_probe(&live),
            Err(TranscriptorError::UnavailableContent(UnavailableReason::Live))
        ));

        let video = json!({ "title": "Talk", "duration": 61.0, "live_status": "was_live" });
        let info = check_probe(&video).unwrap();
        assert_eq!(info.title.as_deref(), Some("Talk"));
        assert_eq!(info.duration, Some(61.0));
    }

    #[test]
    fn test_locate_output_prefers_expected_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("fallback_audio.webm"), b"x").unwrap();
        std::fs::write(dir.path().join("fallback_audio.mp3"), b"x").unwrap();

        let found = extractor().locate_output(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("fallback_audio.mp3"));
    }

    #[test]
    fn test_locate_output_ignores_foreign_and_partial_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("primary_audio.m4a"), b"stale").unwrap();
        std::fs::write(dir.path().join("fallback_audio.webm.part"), b"x").unwrap();
        assert!(extractor().locate_output(dir.path()).is_err());

        std::fs::write(dir.path().join("fallback_audio.opus"), b"x").unwrap();
        let found = extractor().locate_output(dir.path()).unwrap();
        assert_eq!(found, dir.path().join("fallback_audio.opus"));
    }
}
