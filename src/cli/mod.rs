use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use crate::request::{CookiePolicy, ModelSize};

/// Cookie file read when `--cookies cookie-file` is given without a path
pub const DEFAULT_COOKIE_FILE: &str = "cookies.txt";

#[derive(Parser)]
#[command(
    name = "transcriptor",
    about = "Video Transcriptor - Transcribe YouTube and other online videos locally with Whisper",
    version,
    long_about = "Downloads the audio track of a video (YouTube first, any site yt-dlp supports as a fallback), optionally using your browser cookies for age-restricted or members-only content, and transcribes it with a local Whisper model."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable progress indicators
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Transcribe the audio of a video URL
    Transcribe {
        /// Video URL (YouTube or any site supported by yt-dlp)
        #[arg(value_name = "URL")]
        url: String,

        /// Whisper model size (small for English, medium otherwise if not specified)
        #[arg(short, long, value_enum)]
        model: Option<ModelSize>,

        /// Language code, or "auto" to let the model detect it
        #[arg(short, long, value_name = "LANG", default_value = "auto")]
        language: String,

        /// Output file path ("-" prints to the console)
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Output format
        #[arg(short, long, value_enum)]
        format: Option<OutputFormat>,

        /// Where authentication cookies come from
        #[arg(long, value_enum, value_name = "POLICY")]
        cookies: Option<CookieMode>,

        /// Netscape cookie file (implies --cookies cookie-file)
        #[arg(long, value_name = "FILE")]
        cookie_file: Option<PathBuf>,

        /// Browser to read cookies from (auto-detect if not specified)
        #[arg(long, value_name = "NAME")]
        browser: Option<String>,

        /// Only use cookies for this domain
        #[arg(long, value_name = "DOMAIN")]
        cookie_domain: Option<String>,

        /// Never send cookies
        #[arg(long, conflicts_with_all = ["cookies", "cookie_file"])]
        no_cookies: bool,

        /// Keep the downloaded audio file in the current directory
        #[arg(long)]
        save_audio: bool,
    },

    /// Create the config file if missing, validate it and print its path
    Config {
        /// Show current configuration
        #[arg(short, long)]
        show: bool,
    },

    /// List supported platforms
    Platforms,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text
    Text,
    /// JSON with metadata
    Json,
}

impl OutputFormat {
    /// Parse the configured default, ignoring case
    pub fn from_config(value: &str) -> Option<Self> {
        <Self as ValueEnum>::from_str(value, true).ok()
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

/// `--cookies` values
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CookieMode {
    /// No cookies
    None,
    /// Read cookies from an installed browser
    BrowserAuto,
    /// Read cookies from a Netscape cookie file
    CookieFile,
}

/// Turn the cookie flags into a request policy.
///
/// Without flags the browser is tried. A cookie file path alone selects the
/// file policy. `--cookies cookie-file` without a path uses the configured
/// file, then `cookies.txt` in the working directory.
pub fn resolve_cookie_policy(
    mode: Option<CookieMode>,
    cookie_file: Option<PathBuf>,
    no_cookies: bool,
    configured_file: Option<&Path>,
) -> Result<CookiePolicy> {
    if no_cookies {
        return Ok(CookiePolicy::None);
    }

    let policy = match (mode, cookie_file) {
        (Some(CookieMode::None), Some(_)) => {
            anyhow::bail!("--cookie-file cannot be combined with --cookies none")
        }
        (Some(CookieMode::BrowserAuto), Some(_)) => {
            anyhow::bail!("--cookie-file cannot be combined with --cookies browser-auto")
        }
        (Some(CookieMode::None), None) => CookiePolicy::None,
        (Some(CookieMode::BrowserAuto), None) => CookiePolicy::BrowserAuto,
        (Some(CookieMode::CookieFile), Some(path)) | (None, Some(path)) => CookiePolicy::CookieFile(path),
        (Some(CookieMode::CookieFile), None) => CookiePolicy::CookieFile(
            configured_file
                .map(Path::to_path_buf)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_COOKIE_FILE)),
        ),
        (None, None) => CookiePolicy::BrowserAuto,
    };

    Ok(policy)
}
