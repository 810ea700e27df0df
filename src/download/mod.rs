use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::cookies::CookieSet;
use crate::extractors::{classify_url, AudioExtractor, DownloadResult, UrlKind, YoutubeExtractor, YtDlpExtractor};
use crate::request::VideoRequest;
use crate::{Result, TranscriptorError};

/// Which URLs a stage is willing to handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageScope {
    /// Only URLs of a recognized video platform
    RecognizedPlatform,
    /// Any valid URL
    Any,
}

impl StageScope {
    fn accepts(&self, kind: &UrlKind) -> bool {
        match self {
            StageScope::RecognizedPlatform => kind.is_recognized_platform(),
            StageScope::Any => true,
        }
    }
}

/// One entry of the extraction strategy list
#[derive(Clone)]
pub struct Stage {
    extractor: Arc<dyn AudioExtractor>,
    scope: StageScope,
}

impl Stage {
    pub fn new(extractor: Arc<dyn AudioExtractor>, scope: StageScope) -> Self {
        Self { extractor, scope }
    }
}

/// Downloads the audio of a request, trying each applicable stage once, in order
pub struct DownloadOrchestrator {
    stages: Vec<Stage>,
    temp_root: Option<PathBuf>,
}

impl DownloadOrchestrator {
    /// Primary extractor for recognized platforms, fallback for everything
    pub fn new(primary: Arc<dyn AudioExtractor>, fallback: Arc<dyn AudioExtractor>) -> Self {
        Self {
            stages: vec![
                Stage::new(primary, StageScope::RecognizedPlatform),
                Stage::new(fallback, StageScope::Any),
            ],
            temp_root: None,
        }
    }

    /// Build the default YouTube then yt-dlp chain
    pub fn from_config(config: &Config) -> Result<Self> {
        let primary = YoutubeExtractor::new(&config.extractor)?;
        let fallback = YtDlpExtractor::new(&config.extractor);

        Ok(Self::new(Arc::new(primary), Arc::new(fallback)).with_temp_root(config.temp_root().map(PathBuf::from)))
    }

    /// Create per-request directories under `root` instead of the OS default
    pub fn with_temp_root(mut self, root: Option<PathBuf>) -> Self {
        self.temp_root = root;
        self
    }

    /// Download the audio of `request`.
    ///
    /// On success the returned [`DownloadResult`] owns the request's temporary
    /// directory. On failure the directory has already been removed.
    pub async fn download(
        &self,
        request: &VideoRequest,
        cookies: Option<&CookieSet>,
        cancel: &CancellationToken,
    ) -> Result<DownloadResult> {
        let classified = classify_url(request.url())
            .ok_or_else(|| TranscriptorError::InvalidUrl(request.url().to_string()))?;
        let url = classified.url.as_str();

        let temp_dir = self.create_temp_dir()?;
        tracing::debug!("Created temporary directory: {}", temp_dir.path().display());

        let mut errors: Vec<(&'static str, TranscriptorError)> = Vec::new();

        for stage in self.stages.iter().filter(|stage| stage.scope.accepts(&classified.kind)) {
            let name = stage.extractor.name();

            if cancel.is_cancelled() {
                errors.push((name, TranscriptorError::Cancelled));
                break;
            }

            tracing::info!("Extracting audio with {}", name);
            match stage.extractor.extract(url, temp_dir.path(), cookies, cancel).await {
                Ok(audio) => {
                    return Ok(DownloadResult::new(audio, temp_dir, name));
                }
                Err(TranscriptorError::Cancelled) => {
                    errors.push((name, TranscriptorError::Cancelled));
                    break;
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}", name, e);
                    errors.push((name, e));
                }
            }
        }

        if let Err(e) = temp_dir.close() {
            tracing::warn!("Failed to remove temporary directory: {}", e);
        }

        Err(terminal_error(errors))
    }

    fn create_temp_dir(&self) -> Result<TempDir> {
        let prefix = format!("transcriptor-{}-", &uuid::Uuid::new_v4().simple().to_string()[..8]);
        let mut builder = tempfile::Builder::new();
        builder.prefix(&prefix);

        let dir = match &self.temp_root {
            Some(root) => {
                fs_err::create_dir_all(root)?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };

        dir.map_err(|e| TranscriptorError::FileError(format!("failed to create temporary directory: {}", e)))
    }
}

/// The last stage's error, unless it is generic and an earlier stage knew why the video is unavailable
fn terminal_error(mut errors: Vec<(&'static str, TranscriptorError)>) -> TranscriptorError {
    if matches!(errors.last(), Some((_, TranscriptorError::ExtractionFailed(_)))) {
        if let Some(index) = errors.iter().position(|(_, e)| e.is_unavailable()) {
            let (name, e) = errors.swap_remove(index);
            tracing::debug!("Reporting the {} error instead of the generic one", name);
            return e;
        }
    }

    match errors.pop() {
        Some((_, e)) => e,
        None => TranscriptorError::ExtractionFailed("no extractor accepts this URL".to_string()),
    }
}
