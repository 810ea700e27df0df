use indicatif::ProgressBar;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;
use uuid::Uuid;

use crate::config::Config;
use crate::cookies::{resolve_cookies, BrowserCookieProvider, CookieProvider};
use crate::download::DownloadOrchestrator;
use crate::extractors::{classify_url, DownloadResult};
use crate::request::{ModelSize, VideoRequest};
use crate::utils::sanitize_filename;
use crate::{Result, TranscriptorError};

pub mod model;
pub mod whisper;

pub use model::{LoadedModel, ModelCache, RawTranscript, SpeechBackend, SpeechModel};
pub use whisper::WhisperCliBackend;

/// Transcription result with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionResult {
    /// The transcribed text
    pub text: String,

    /// Language detected by the model (only when no language was requested)
    pub detected_language: Option<String>,

    /// Transcription metadata
    pub metadata: TranscriptionMetadata,
}

/// Metadata about the transcription process
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionMetadata {
    /// URL the audio was downloaded from
    pub source_url: String,

    /// Video title, when the extractor knew it
    pub title: Option<String>,

    /// Extractor that produced the audio
    pub extractor: String,

    /// Model size used
    pub model_size: ModelSize,

    /// Processing time in seconds
    pub processing_duration: f64,

    /// Timestamp when transcription completed
    pub completed_at: chrono::DateTime<chrono::Utc>,

    /// Path to the downloaded audio file (if preserved)
    pub audio_path: Option<PathBuf>,
}

/// Output of the transcription adapter for one downloaded file
#[derive(Debug, Clone)]
pub struct TranscribedAudio {
    pub text: String,
    pub detected_language: Option<String>,
    pub preserved_audio: Option<PathBuf>,
}

/// Runs a speech model over a downloaded file and releases the download afterwards
pub struct TranscriptionAdapter {
    cache: Arc<ModelCache>,
    keep_audio_in: Option<PathBuf>,
}

impl TranscriptionAdapter {
    pub fn new(cache: Arc<ModelCache>) -> Self {
        Self {
            cache,
            keep_audio_in: None,
        }
    }

    /// Copy the audio into `dir` before it is deleted
    pub fn keep_audio_in(mut self, dir: Option<PathBuf>) -> Self {
        self.keep_audio_in = dir;
        self
    }

    /// Transcribe `download`, consuming it.
    ///
    /// The audio file and its temporary directory are gone when this returns,
    /// whatever the outcome.
    pub async fn transcribe(
        &self,
        download: DownloadResult,
        size: ModelSize,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<TranscribedAudio> {
        let outcome = self.run(&download, size, language, cancel).await;

        let preserved = match (&outcome, &self.keep_audio_in) {
            (Ok(_), Some(dir)) => match preserve_audio(&download, dir) {
                Ok(path) => Some(path),
                Err(e) => {
                    tracing::warn!("Could not keep audio file: {}", e);
                    None
                }
            },
            _ => None,
        };

        let temp_dir = download.owning_temp_directory().to_path_buf();
        match download.release() {
            Ok(()) => tracing::debug!("Removed temporary directory: {}", temp_dir.display()),
            Err(e) => tracing::warn!("{}", e),
        }

        outcome.map(|(text, detected_language)| TranscribedAudio {
            text,
            detected_language,
            preserved_audio: preserved,
        })
    }

    async fn run(
        &self,
        download: &DownloadResult,
        size: ModelSize,
        language: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<(String, Option<String>)> {
        let model = self.cache.acquire(size).await?;
        let raw = model.transcribe(download.local_audio_path(), language, cancel).await?;

        let detected_language = match language {
            Some(_) => None,
            None => match raw.language {
                Some(detected) => {
                    tracing::info!("Detected language: {}", detected);
                    Some(detected)
                }
                None => {
                    return Err(TranscriptorError::TranscriptionFailed(
                        "the model did not report a language".to_string(),
                    ))
                }
            },
        };

        Ok((raw.text, detected_language))
    }
}

/// Copy the audio next to the transcript, named after the video title
fn preserve_audio(download: &DownloadResult, dir: &Path) -> Result<PathBuf> {
    let source = download.local_audio_path();
    let extension = source
        .extension()
        .map(|ext| ext.to_string_lossy().into_owned())
        .unwrap_or_else(|| "audio".to_string());

    let stem = download
        .title()
        .map(sanitize_filename)
        .filter(|title| !title.is_empty())
        .unwrap_or_else(|| format!("audio_{}", chrono::Utc::now().format("%Y%m%d_%H%M%S")));

    let target = unused_path(dir, &stem, &extension);
    fs_err::copy(source, &target)?;
    tracing::info!("Kept audio file: {}", target.display());

    Ok(target)
}

/// `<stem>.<ext>` in `dir`, or a timestamped variant when that name is taken
fn unused_path(dir: &Path, stem: &str, extension: &str) -> PathBuf {
    let plain = dir.join(format!("{}.{}", stem, extension));
    if !plain.exists() {
        return plain;
    }

    let stamped = format!("{}_{}", stem, chrono::Utc::now().format("%Y%m%d_%H%M%S"));
    let mut candidate = dir.join(format!("{}.{}", stamped, extension));
    let mut counter = 1;
    while candidate.exists() {
        candidate = dir.join(format!("{}_{}.{}", stamped, counter, extension));
        counter += 1;
    }
    tracing::debug!("{} exists, keeping audio as {}", plain.display(), candidate.display());
    candidate
}

/// Main transcription pipeline: cookies, download, transcription
pub struct TranscriptionPipeline {
    config: Config,
    orchestrator: DownloadOrchestrator,
    cookie_provider: Arc<dyn CookieProvider>,
    adapter: TranscriptionAdapter,
    progress: Option<ProgressBar>,
}

impl TranscriptionPipeline {
    /// Create a pipeline with the default extractors, browser cookies and whisper
    pub fn new(config: Config) -> Result<Self> {
        let orchestrator = DownloadOrchestrator::from_config(&config)?;
        let backend = WhisperCliBackend::new(&config.whisper);
        let cache = Arc::new(ModelCache::new(Arc::new(backend)));

        Ok(Self::from_parts(
            config,
            orchestrator,
            Arc::new(BrowserCookieProvider::new()),
            cache,
        ))
    }

    pub fn from_parts(
        config: Config,
        orchestrator: DownloadOrchestrator,
        cookie_provider: Arc<dyn CookieProvider>,
        cache: Arc<ModelCache>,
    ) -> Self {
        let keep_audio_in = if config.app.keep_audio {
            std::env::current_dir().ok()
        } else {
            None
        };

        Self {
            adapter: TranscriptionAdapter::new(cache).keep_audio_in(keep_audio_in),
            config,
            orchestrator,
            cookie_provider,
            progress: None,
        }
    }

    /// Report stage changes on `progress`
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    fn stage(&self, message: impl Into<std::borrow::Cow<'static, str>>) {
        if let Some(progress) = &self.progress {
            progress.set_message(message);
        }
    }

    /// Transcribe the video at the request's URL
    pub async fn run(&self, request: &VideoRequest, cancel: &CancellationToken) -> Result<TranscriptionResult> {
        if classify_url(request.url()).is_none() {
            return Err(TranscriptorError::InvalidUrl(request.url().to_string()));
        }

        let request_id = Uuid::new_v4();
        let span = tracing::info_span!("request", request_id = %request_id);

        self.execute(request, cancel).instrument(span).await
    }

    async fn execute(&self, request: &VideoRequest, cancel: &CancellationToken) -> Result<TranscriptionResult> {
        let started = Instant::now();
        tracing::info!("Transcribing {}", request.url());

        self.stage("Loading cookies...");
        let cookies = resolve_cookies(
            request.cookie_policy(),
            self.cookie_provider.as_ref(),
            &self.config.cookies,
        )
        .await;

        self.stage("Downloading audio...");
        let download = self.orchestrator.download(request, cookies.as_ref(), cancel).await?;
        let extractor = download.extractor().to_string();
        let title = download.title().map(|title| title.to_string());

        let size = request.model_size();
        self.stage(format!("Transcribing with the {} model...", size));
        let transcribed = self
            .adapter
            .transcribe(download, size, request.language_hint(), cancel)
            .await?;

        let elapsed = started.elapsed().as_secs_f64();
        tracing::info!("Finished in {:.2}s", elapsed);

        Ok(TranscriptionResult {
            text: transcribed.text,
            detected_language: transcribed.detected_language,
            metadata: TranscriptionMetadata {
                source_url: request.url().to_string(),
                title,
                extractor,
                model_size: size,
                processing_duration: elapsed,
                completed_at: chrono::Utc::now(),
                audio_path: transcribed.preserved_audio,
            },
        })
    }
}
