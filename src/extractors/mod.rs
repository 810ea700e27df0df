use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

pub mod classify;
pub mod youtube;
pub mod ytdlp;

pub use classify::{classify_url, extract_video_id, is_valid_url, ClassifiedUrl, UrlKind};
pub use youtube::YoutubeExtractor;
pub use ytdlp::YtDlpExtractor;

use crate::cookies::CookieSet;
use crate::{Result, TranscriptorError};

/// Supported audio formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioFormat {
    Mp3,
    M4a,
    Wav,
    Flac,
    Ogg,
    Opus,
    Webm,
}

impl AudioFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            AudioFormat::Mp3 => "mp3",
            AudioFormat::M4a => "m4a",
            AudioFormat::Wav => "wav",
            AudioFormat::Flac => "flac",
            AudioFormat::Ogg => "ogg",
            AudioFormat::Opus => "opus",
            AudioFormat::Webm => "webm",
        }
    }

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "mp3" => Some(AudioFormat::Mp3),
            "m4a" | "aac" | "mp4" => Some(AudioFormat::M4a),
            "wav" => Some(AudioFormat::Wav),
            "flac" => Some(AudioFormat::Flac),
            "ogg" => Some(AudioFormat::Ogg),
            "opus" => Some(AudioFormat::Opus),
            "webm" => Some(AudioFormat::Webm),
            _ => None,
        }
    }

    /// Map a stream MIME type such as `audio/mp4; codecs="mp4a.40.2"` to a file format
    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or("").trim().to_lowercase();
        match essence.as_str() {
            "audio/mp4" | "audio/m4a" | "audio/aac" => Some(AudioFormat::M4a),
            "audio/webm" => Some(AudioFormat::Webm),
            "audio/mpeg" | "audio/mp3" => Some(AudioFormat::Mp3),
            "audio/ogg" => Some(AudioFormat::Ogg),
            "audio/opus" => Some(AudioFormat::Opus),
            "audio/wav" | "audio/x-wav" => Some(AudioFormat::Wav),
            "audio/flac" => Some(AudioFormat::Flac),
            _ => None,
        }
    }
}

impl std::fmt::Display for AudioFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Audio file produced by an extractor inside the request's temporary directory
#[derive(Debug, Clone)]
pub struct ExtractedAudio {
    pub path: PathBuf,
    pub title: Option<String>,
}

/// Trait for downloading the audio track of a video
#[async_trait]
pub trait AudioExtractor: Send + Sync {
    /// Name used in logs and results
    fn name(&self) -> &'static str;

    /// Download the best available audio of `url` into `temp_dir`
    async fn extract(
        &self,
        url: &str,
        temp_dir: &Path,
        cookies: Option<&CookieSet>,
        cancel: &CancellationToken,
    ) -> Result<ExtractedAudio>;
}

/// Downloaded audio together with the temporary directory that owns it.
///
/// Dropping the value deletes the directory and everything in it.
#[derive(Debug)]
pub struct DownloadResult {
    audio: ExtractedAudio,
    temp_dir: TempDir,
    extractor: &'static str,
}

impl DownloadResult {
    pub fn new(audio: ExtractedAudio, temp_dir: TempDir, extractor: &'static str) -> Self {
        Self {
            audio,
            temp_dir,
            extractor,
        }
    }

    pub fn local_audio_path(&self) -> &Path {
        &self.audio.path
    }

    pub fn owning_temp_directory(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn title(&self) -> Option<&str> {
        self.audio.title.as_deref()
    }

    /// Which extractor produced the audio
    pub fn extractor(&self) -> &'static str {
        self.extractor
    }

    /// Delete the audio file and its temporary directory
    pub fn release(self) -> Result<()> {
        let dir = self.temp_dir.path().to_path_buf();
        self.temp_dir.close().map_err(|e| {
            TranscriptorError::FileError(format!("failed to remove {}: {}", dir.display(), e))
        })
    }
}

/// Remove every file in `dir` whose name starts with `prefix`
pub(crate) fn remove_files_with_prefix(dir: &Path, prefix: &str) {
    let Ok(entries) = std::fs::read_dir(dir) else {
        return;
    };

    for entry in entries.filter_map(|entry| entry.ok()) {
        let matches = entry
            .file_name()
            .to_str()
            .map(|name| name.starts_with(prefix))
            .unwrap_or(false);
        if matches {
            if let Err(e) = std::fs::remove_file(entry.path()) {
                tracing::debug!("Could not remove {}: {}", entry.path().display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_type_mapping() {
        assert_eq!(
            AudioFormat::from_mime_type("audio/mp4; codecs=\"mp4a.40.2\""),
            Some(AudioFormat::M4a)
        );
        assert_eq!(AudioFormat::from_mime_type("audio/webm; codecs=\"opus\""), Some(AudioFormat::Webm));
        assert_eq!(AudioFormat::from_mime_type("video/mp4"), None);
    }

    #[test]
    fn test_release_removes_directory() {
        let temp_dir = tempfile::tempdir().unwrap();
        let audio_path = temp_dir.path().join("audio.mp3");
        std::fs::write(&audio_path, b"id3").unwrap();
        let dir = temp_dir.path().to_path_buf();

        let result = DownloadResult::new(
            ExtractedAudio {
                path: audio_path,
                title: None,
            },
            temp_dir,
            "test",
        );
        assert!(result.local_audio_path().exists());

        result.release().unwrap();
        assert!(!dir.exists());
    }
}
