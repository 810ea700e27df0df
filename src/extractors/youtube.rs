use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::header::{COOKIE, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::classify::extract_video_id;
use super::{remove_files_with_prefix, AudioExtractor, AudioFormat, ExtractedAudio};
use crate::config::ExtractorConfig;
use crate::cookies::CookieSet;
use crate::utils::format_file_size;
use crate::{Result, TranscriptorError, UnavailableReason};

/// Base name of every file this extractor writes
const OUTPUT_BASE: &str = "primary_audio";

const COOKIE_DOMAIN: &str = "youtube.com";

/// Lightweight YouTube audio extractor talking to the InnerTube player API
pub struct YoutubeExtractor {
    client: Client,
    endpoint: String,
    client_version: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlayerResponse {
    playability_status: Option<PlayabilityStatus>,
    video_details: Option<VideoDetails>,
    streaming_data: Option<StreamingData>,
}

#[derive(Debug, Deserialize)]
struct PlayabilityStatus {
    status: String,
    reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VideoDetails {
    title: Option<String>,
    length_seconds: Option<String>,
    #[serde(default)]
    is_live: bool,
    #[serde(default)]
    is_live_content: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamingData {
    #[serde(default)]
    adaptive_formats: Vec<AdaptiveFormat>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AdaptiveFormat {
    itag: u32,
    url: Option<String>,
    mime_type: String,
    bitrate: Option<u64>,
}

impl YoutubeExtractor {
    pub fn new(settings: &ExtractorConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.socket_timeout_secs))
            .build()
            .map_err(|e| TranscriptorError::ExtractionFailed(format!("HTTP client setup failed: {}", e)))?;

        Ok(Self {
            client,
            endpoint: settings.innertube_endpoint.clone(),
            client_version: settings.innertube_client_version.clone(),
        })
    }

    fn user_agent(&self) -> String {
        format!(
            "com.google.android.youtube/{} (Linux; U; Android 11) gzip",
            self.client_version
        )
    }

    /// Resolve video metadata and stream URLs
    async fn fetch_player(&self, video_id: &str, cookies: Option<&CookieSet>) -> Result<PlayerResponse> {
        tracing::debug!("Requesting player response for: {}", video_id);

        let body = json!({
            "context": {
                "client": {
                    "clientName": "ANDROID",
                    "clientVersion": self.client_version,
                    "androidSdkVersion": 30,
                    "hl": "en",
                    "gl": "US",
                }
            },
            "videoId": video_id,
            "contentCheckOk": true,
            "racyCheckOk": true,
        });

        let mut request = self
            .client
            .post(&self.endpoint)
            .header(USER_AGENT, self.user_agent())
            .header("X-YouTube-Client-Name", "3")
            .header("X-YouTube-Client-Version", &self.client_version)
            .json(&body);

        if let Some(header) = cookies.and_then(|set| set.scoped_to(COOKIE_DOMAIN).header_value()) {
            request = request.header(COOKIE, header);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TranscriptorError::ExtractionFailed(format!("player request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TranscriptorError::ExtractionFailed(format!(
                "player request failed: HTTP {}",
                response.status()
            )));
        }

        response
            .json::<PlayerResponse>()
            .await
            .map_err(|e| TranscriptorError::ExtractionFailed(format!("malformed player response: {}", e)))
    }

    /// Stream `url` into `path`, returning the number of bytes written
    async fn stream_to_file(&self, url: &str, path: &Path, cancel: &CancellationToken) -> Result<u64> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, self.user_agent())
            .send()
            .await
            .map_err(|e| TranscriptorError::ExtractionFailed(format!("audio request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(TranscriptorError::ExtractionFailed(format!(
                "Failed to download audio: HTTP {}",
                response.status()
            )));
        }

        let mut file = fs_err::File::create(path)?;
        let mut written = 0u64;
        let mut stream = response.bytes_stream();

        loop {
            let next = tokio::select! {
                _ = cancel.cancelled() => return Err(TranscriptorError::Cancelled),
                next = stream.next() => next,
            };

            match next {
                Some(chunk) => {
                    let chunk = chunk.map_err(|e| {
                        TranscriptorError::ExtractionFailed(format!("audio stream interrupted: {}", e))
                    })?;
                    file.write_all(&chunk)?;
                    written += chunk.len() as u64;
                }
                None => break,
            }
        }

        file.flush()?;
        Ok(written)
    }

    async fn download(
        &self,
        url: &str,
        temp_dir: &Path,
        cookies: Option<&CookieSet>,
        cancel: &CancellationToken,
    ) -> Result<ExtractedAudio> {
        let video_id = extract_video_id(url).ok_or_else(|| {
            TranscriptorError::ExtractionFailed(format!("not a YouTube video URL: {}", url))
        })?;

        let player = self.fetch_player(&video_id, cookies).await?;
        check_playability(&player)?;

        let stream = select_audio_stream(&player)?;
        let format = AudioFormat::from_mime_type(&stream.mime_type).unwrap_or(AudioFormat::M4a);
        let stream_url = stream.url.as_deref().ok_or_else(|| {
            TranscriptorError::ExtractionFailed("selected audio stream has no URL".to_string())
        })?;

        tracing::debug!(
            "Selected itag {} ({}, {} bps)",
            stream.itag,
            stream.mime_type,
            stream.bitrate.unwrap_or(0)
        );

        let partial = temp_dir.join(format!("{}.part", OUTPUT_BASE));
        let written = self.stream_to_file(stream_url, &partial, cancel).await?;
        if written == 0 {
            return Err(TranscriptorError::ExtractionFailed(
                "downloaded audio file is empty".to_string(),
            ));
        }

        let final_path = normalize_extension(&partial, format)?;
        tracing::info!(
            "Downloaded {} of audio to {}",
            format_file_size(written),
            final_path.display()
        );

        Ok(ExtractedAudio {
            path: final_path,
            title: player.video_details.and_then(|details| details.title),
        })
    }
}

#[async_trait]
impl AudioExtractor for YoutubeExtractor {
    fn name(&self) -> &'static str {
        "youtube"
    }

    async fn extract(
        &self,
        url: &str,
        temp_dir: &Path,
        cookies: Option<&CookieSet>,
        cancel: &CancellationToken,
    ) -> Result<ExtractedAudio> {
        let result = self.download(url, temp_dir, cookies, cancel).await;

        if result.is_err() {
            // Never leave half-written files behind for the next extractor.
            remove_files_with_prefix(temp_dir, OUTPUT_BASE);
        }

        result
    }
}

/// Reject videos the player API marks as unplayable or live
fn check_playability(player: &PlayerResponse) -> Result<()> {
    if let Some(status) = &player.playability_status {
        if status.status != "OK" {
            return Err(classify_playability(&status.status, status.reason.as_deref()));
        }
    }

    if let Some(details) = &player.video_details {
        let still_streaming = details.is_live_content
            && details
                .length_seconds
                .as_deref()
                .map_or(true, |length| length == "0");
        if details.is_live || still_streaming {
            return Err(TranscriptorError::UnavailableContent(UnavailableReason::Live));
        }
    }

    Ok(())
}

fn classify_playability(status: &str, reason: Option<&str>) -> TranscriptorError {
    let reason_text = reason.unwrap_or(status);
    let lower = reason_text.to_lowercase();

    let unavailable = if status == "AGE_CHECK_REQUIRED" || lower.contains("confirm your age") || lower.contains("age-restricted") {
        UnavailableReason::AgeRestricted
    } else if lower.contains("private") {
        UnavailableReason::Private
    } else if lower.contains("members") {
        UnavailableReason::MembersOnly
    } else if lower.contains("country") || lower.contains("region") {
        UnavailableReason::RegionBlocked
    } else if status == "LIVE_STREAM_OFFLINE" || lower.contains("live stream") || lower.contains("premiere") {
        UnavailableReason::Live
    } else {
        UnavailableReason::Restricted(reason_text.to_string())
    };

    TranscriptorError::UnavailableContent(unavailable)
}

/// Pick the highest-bitrate audio-only stream with a direct URL
fn select_audio_stream(player: &PlayerResponse) -> Result<&AdaptiveFormat> {
    player
        .streaming_data
        .as_ref()
        .map(|data| data.adaptive_formats.as_slice())
        .unwrap_or_default()
        .iter()
        .filter(|format| format.mime_type.starts_with("audio/"))
        .filter(|format| format.url.is_some())
        .max_by_key(|format| format.bitrate.unwrap_or(0))
        .ok_or_else(|| TranscriptorError::ExtractionFailed("no audio stream available".to_string()))
}

/// Rename the partial download to its final extension
fn normalize_extension(partial: &Path, format: AudioFormat) -> Result<PathBuf> {
    let final_path = partial.with_extension(format.as_str());
    if final_path != partial {
        fs_err::rename(partial, &final_path)?;
    }

    if !final_path.is_file() {
        return Err(TranscriptorError::ExtractionFailed(format!(
            "expected output file missing: {}",
            final_path.display()
        )));
    }

    Ok(final_path)
}
