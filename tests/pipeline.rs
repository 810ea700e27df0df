#![cfg(unix)]

mod support;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use video_transcriptor::cookies::BrowserCookieProvider;
use video_transcriptor::extractors::{YoutubeExtractor, YtDlpExtractor};
use video_transcriptor::transcribe::{ModelCache, WhisperCliBackend};
use video_transcriptor::{
    Config, CookiePolicy, DownloadOrchestrator, ModelSize, TranscriptionPipeline, TranscriptorError, VideoRequest,
};

use support::*;

struct Harness {
    _bin: tempfile::TempDir,
    temp_root: tempfile::TempDir,
    pipeline: TranscriptionPipeline,
    cache: Arc<ModelCache>,
}

async fn harness() -> Harness {
    let bin = tempfile::tempdir().unwrap();
    let yt_dlp = write_script(bin.path(), "yt-dlp", YT_DLP_STUB);
    let whisper = write_script(bin.path(), "whisper", WHISPER_STUB);
    let temp_root = tempfile::tempdir().unwrap();

    let mut config = Config::default();
    config.extractor = extractor_config(&yt_dlp, &dead_endpoint().await);
    config.whisper.binary_path = whisper.to_string_lossy().into_owned();
    config.app.temp_dir = Some(temp_root.path().to_path_buf());

    let orchestrator = DownloadOrchestrator::new(
        Arc::new(YoutubeExtractor::new(&config.extractor).unwrap()),
        Arc::new(YtDlpExtractor::new(&config.extractor)),
    )
    .with_temp_root(Some(temp_root.path().to_path_buf()));
    let cache = Arc::new(ModelCache::new(Arc::new(WhisperCliBackend::new(&config.whisper))));

    let pipeline = TranscriptionPipeline::from_parts(
        config,
        orchestrator,
        Arc::new(BrowserCookieProvider::new()),
        cache.clone(),
    );

    Harness {
        _bin: bin,
        temp_root,
        pipeline,
        cache,
    }
}

fn request(language: &str) -> VideoRequest {
    VideoRequest::new("https://youtu.be/dQw4w9WgXcQ")
        .with_cookie_policy(CookiePolicy::None)
        .with_language(Some(language))
        .with_model_size(ModelSize::Tiny)
}

#[tokio::test]
async fn auto_language_is_detected_and_temp_dir_removed() {
    let harness = harness().await;

    let result = harness
        .pipeline
        .run(&request("auto"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.text, "Buna ziua si bine ati venit.");
    assert_eq!(result.detected_language.as_deref(), Some("ro"));
    assert_eq!(result.metadata.extractor, "yt-dlp");
    assert_eq!(result.metadata.title.as_deref(), Some("Stub video"));
    assert_eq!(result.metadata.model_size, ModelSize::Tiny);
    assert_eq!(entries(harness.temp_root.path()), 0);
}

#[tokio::test]
async fn language_hint_constrains_decoding() {
    let harness = harness().await;

    let result = harness
        .pipeline
        .run(&request("en"), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(result.detected_language, None);
    assert_eq!(entries(harness.temp_root.path()), 0);
}

#[tokio::test]
async fn model_stays_resident_between_requests() {
    let harness = harness().await;

    for language in ["auto", "en"] {
        harness
            .pipeline
            .run(&request(language), &CancellationToken::new())
            .await
            .unwrap();
    }

    assert_eq!(harness.cache.resident().await, Some(ModelSize::Tiny));
}

#[tokio::test]
async fn malformed_url_fails_before_any_work() {
    let harness = harness().await;

    let err = harness
        .pipeline
        .run(&VideoRequest::new("not a url"), &CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(err, TranscriptorError::InvalidUrl(_)));
    assert_eq!(entries(harness.temp_root.path()), 0);
    assert_eq!(harness.cache.resident().await, None);
}

#[tokio::test]
async fn cancelled_request_cleans_up() {
    let harness = harness().await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = harness.pipeline.run(&request("auto"), &cancel).await.unwrap_err();

    assert!(matches!(err, TranscriptorError::Cancelled));
    assert_eq!(entries(harness.temp_root.path()), 0);
}
