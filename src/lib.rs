//! Video Transcriptor - A Rust CLI tool for transcribing the audio of online videos
//!
//! This library downloads the audio track of a video (YouTube first, anything `yt-dlp`
//! understands as a fallback), optionally authenticating with browser cookies, and
//! transcribes it locally with a Whisper model.

pub mod cli;
pub mod config;
pub mod cookies;
pub mod download;
pub mod extractors;
pub mod output;
pub mod request;
pub mod transcribe;
pub mod utils;

pub use cli::{Cli, Commands, OutputFormat};
pub use config::Config;
pub use cookies::{Cookie, CookieProvider, CookieSet};
pub use download::DownloadOrchestrator;
pub use extractors::{AudioExtractor, DownloadResult, UrlKind};
pub use request::{CookiePolicy, ModelSize, VideoRequest};
pub use transcribe::{TranscriptionPipeline, TranscriptionResult};

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TranscriptorError>;

/// Error types specific to the transcriptor
#[derive(thiserror::Error, Debug)]
pub enum TranscriptorError {
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Content unavailable: {0}")]
    UnavailableContent(UnavailableReason),

    #[error("Audio extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Transcription failed: {0}")]
    TranscriptionFailed(String),

    #[error("Cookies unavailable: {0}")]
    CookieUnavailable(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("File operation failed: {0}")]
    FileError(String),
}

impl TranscriptorError {
    /// Whether the error is one of the content-availability conditions
    pub fn is_unavailable(&self) -> bool {
        matches!(self, TranscriptorError::UnavailableContent(_))
    }
}

impl From<std::io::Error> for TranscriptorError {
    fn from(err: std::io::Error) -> Self {
        TranscriptorError::FileError(err.to_string())
    }
}

/// Why a video cannot be downloaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnavailableReason {
    Private,
    MembersOnly,
    RegionBlocked,
    AgeRestricted,
    Live,
    Playlist,
    Restricted(String),
}

impl std::fmt::Display for UnavailableReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UnavailableReason::Private => write!(f, "video is private"),
            UnavailableReason::MembersOnly => write!(f, "video is for channel members only"),
            UnavailableReason::RegionBlocked => write!(f, "video is not available in your region"),
            UnavailableReason::AgeRestricted => write!(f, "video is age-restricted (try browser cookies)"),
            UnavailableReason::Live => write!(f, "live streams cannot be transcribed"),
            UnavailableReason::Playlist => write!(f, "playlists are not supported, pass a single video URL"),
            UnavailableReason::Restricted(reason) => write!(f, "{}", reason),
        }
    }
}
