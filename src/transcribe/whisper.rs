use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use super::model::{RawTranscript, SpeechBackend, SpeechModel};
use crate::config::WhisperConfig;
use crate::request::ModelSize;
use crate::{Result, TranscriptorError};

/// Runs OpenAI Whisper through its command-line interface
pub struct WhisperCliBackend {
    binary_path: String,
    device: Option<String>,
}

/// A model size bound to the whisper executable
pub struct WhisperCliModel {
    binary_path: String,
    device: Option<String>,
    size: ModelSize,
}

/// The parts of whisper's JSON output we use
#[derive(Debug, Deserialize)]
struct WhisperOutput {
    text: String,
    language: Option<String>,
}

impl WhisperCliBackend {
    pub fn new(settings: &WhisperConfig) -> Self {
        Self {
            binary_path: settings.binary_path.clone(),
            device: settings.device.clone(),
        }
    }
}

#[async_trait]
impl SpeechBackend for WhisperCliBackend {
    async fn load(&self, size: ModelSize) -> Result<Arc<dyn SpeechModel>> {
        let status = Command::new(&self.binary_path)
            .arg("--help")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| {
                TranscriptorError::TranscriptionFailed(format!(
                    "whisper is not available ({}). Install it with: pip install openai-whisper",
                    e
                ))
            })?;

        if !status.success() {
            return Err(TranscriptorError::TranscriptionFailed(format!(
                "{} --help exited with {}",
                self.binary_path, status
            )));
        }

        Ok(Arc::new(WhisperCliModel {
            binary_path: self.binary_path.clone(),
            device: self.device.clone(),
            size,
        }))
    }
}

impl WhisperCliModel {
    fn args(&self, audio: &Path, output_dir: &Path, language: Option<&str>) -> Vec<String> {
        let mut args = vec![
            audio.to_string_lossy().into_owned(),
            "--model".to_string(),
            self.size.as_str().to_string(),
            "--output_format".to_string(),
            "json".to_string(),
            "--output_dir".to_string(),
            output_dir.to_string_lossy().into_owned(),
            "--verbose".to_string(),
            "False".to_string(),
        ];

        if let Some(language) = language {
            args.push("--language".to_string());
            args.push(language.to_string());
        }

        if let Some(device) = &self.device {
            args.push("--device".to_string());
            args.push(device.clone());
        }

        args
    }
}

#[async_trait]
impl SpeechModel for WhisperCliModel {
    fn size(&self) -> ModelSize {
        self.size
    }

    async fn transcribe(
        &self,
        audio: &Path,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<RawTranscript> {
        let output_dir = tempfile::Builder::new()
            .prefix("whisper-")
            .tempdir()
            .map_err(|e| TranscriptorError::FileError(format!("failed to create whisper output directory: {}", e)))?;

        tracing::debug!(
            "Running {} on {} (model {}, language {})",
            self.binary_path,
            audio.display(),
            self.size,
            language.unwrap_or("auto")
        );

        let child = Command::new(&self.binary_path)
            .args(self.args(audio, output_dir.path(), language))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TranscriptorError::TranscriptionFailed(format!("failed to start whisper: {}", e)))?;

        let output = tokio::select! {
            _ = cancel.cancelled() => return Err(TranscriptorError::Cancelled),
            output = child.wait_with_output() => output.map_err(|e| {
                TranscriptorError::TranscriptionFailed(format!("whisper did not finish: {}", e))
            })?,
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let last_line = stderr.lines().rev().find(|line| !line.trim().is_empty()).unwrap_or("");
            return Err(TranscriptorError::TranscriptionFailed(format!(
                "whisper exited with {}: {}",
                output.status,
                last_line.trim()
            )));
        }

        let json_path = output_path(audio, output_dir.path());
        let content = fs_err::read_to_string(&json_path).map_err(|e| {
            TranscriptorError::TranscriptionFailed(format!("whisper produced no transcript: {}", e))
        })?;

        parse_output(&content)
    }
}

/// whisper names its output after the audio file's stem
fn output_path(audio: &Path, output_dir: &Path) -> PathBuf {
    let stem = audio
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());
    output_dir.join(format!("{}.json", stem))
}

fn parse_output(content: &str) -> Result<RawTranscript> {
    let output: WhisperOutput = serde_json::from_str(content)
        .map_err(|e| TranscriptorError::TranscriptionFailed(format!("unreadable whisper output: {}", e)))?;

    Ok(RawTranscript {
        text: output.text.trim().to_string(),
        language: output.language.filter(|language| !language.trim().is_empty()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_output_path_uses_audio_stem() {
        let path = output_path(Path::new("/tmp/x/fallback_audio.mp3"), Path::new("/tmp/out"));
        assert_eq!(path, PathBuf::from("/tmp/out/fallback_audio.json"));
    }

    #[test]
    fn test_parse_output() {
        let raw = parse_output(r#"{"text": "  Bonjour tout le monde. ", "segments": [], "language": "fr"}"#).unwrap();
        assert_eq!(raw.text, "Bonjour tout le monde.");
        assert_eq!(raw.language.as_deref(), Some("fr"));

        let raw = parse_output(r#"{"text": "hi", "language": ""}"#).unwrap();
        assert_eq!(raw.language, None);

        assert!(parse_output("not json").is_err());
    }

    #[test]
    fn test_language_and_device_flags() {
        let model = WhisperCliModel {
            binary_path: "whisper".to_string(),
            device: Some("cuda".to_string()),
            size: ModelSize::Medium,
        };

        let args = model.args(Path::new("a.mp3"), Path::new("out"), Some("ro"));
        let joined = args.join(" ");
        assert!(joined.starts_with("a.mp3 --model medium --output_format json"));
        assert!(joined.contains("--language ro"));
        assert!(joined.contains("--device cuda"));

        let args = model.args(Path::new("a.mp3"), Path::new("out"), None);
        assert!(!args.contains(&"--language".to_string()));
    }
}
