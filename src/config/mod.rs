use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cookies::BrowserCookieProvider;
use crate::extractors::AudioFormat;
use crate::request::ModelSize;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Extractor settings
    pub extractor: ExtractorConfig,

    /// Cookie settings
    pub cookies: CookieConfig,

    /// Whisper settings
    pub whisper: WhisperConfig,

    /// Application settings
    pub app: AppConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Path or name of the yt-dlp executable
    pub yt_dlp_path: String,

    /// Socket connect timeout in seconds
    pub socket_timeout_secs: u64,

    /// Audio codec yt-dlp transcodes to
    pub audio_format: AudioFormat,

    /// Audio bitrate passed to yt-dlp
    pub audio_quality: String,

    /// InnerTube ANDROID client version used by the YouTube extractor
    pub innertube_client_version: String,

    /// InnerTube API endpoint
    pub innertube_endpoint: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Browser to read cookies from (auto-detect if not specified)
    pub browser: Option<String>,

    /// Only use cookies for this domain
    pub domain: Option<String>,

    /// Default Netscape cookie file for the cookie-file policy
    pub cookie_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WhisperConfig {
    /// Path or name of the whisper executable
    pub binary_path: String,

    /// Torch device passed to whisper (cpu, cuda)
    pub device: Option<String>,

    /// Model size used when none is requested (chosen from the language otherwise)
    pub default_model: Option<ModelSize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Root for per-request temporary directories
    pub temp_dir: Option<PathBuf>,

    /// Keep audio files after transcription
    pub keep_audio: bool,

    /// Transcript file written when no output path is given
    pub default_output: PathBuf,

    /// Default output format
    pub default_output_format: String,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            yt_dlp_path: "yt-dlp".to_string(),
            socket_timeout_secs: 10,
            audio_format: AudioFormat::Mp3,
            audio_quality: "192K".to_string(),
            innertube_client_version: "19.09.37".to_string(),
            innertube_endpoint: "https://www.youtube.com/youtubei/v1/player?prettyPrint=false".to_string(),
        }
    }
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            binary_path: "whisper".to_string(),
            device: None,
            default_model: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            temp_dir: None,
            keep_audio: false,
            default_output: PathBuf::from("transcription.txt"),
            default_output_format: "text".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from file or create default
    pub async fn load() -> Result<Self> {
        let (config, _) = Self::ensure_at(&Self::config_path()?)?;
        Ok(config)
    }

    /// Load the file at `path`, writing the defaults there first if it is missing.
    /// The flag is true when the file was created.
    pub fn ensure_at(path: &Path) -> Result<(Self, bool)> {
        if path.exists() {
            return Ok((Self::load_from(path)?, false));
        }

        let config = Self::default();
        config.save_to(path)?;
        tracing::info!("Wrote default configuration to {}", path.display());
        Ok((config, true))
    }

    /// Load and validate a specific configuration file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs_err::read_to_string(path)
            .context("Failed to read config file")?;

        let config: Config = serde_yaml::from_str(&content)
            .context("Failed to parse config file")?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    fn save_to(&self, config_path: &Path) -> Result<()> {
        if let Some(parent) = config_path.parent() {
            fs_err::create_dir_all(parent)?;
        }

        let content = serde_yaml::to_string(self)
            .context("Failed to serialize config")?;

        fs_err::write(config_path, content)
            .context("Failed to write config file")?;

        Ok(())
    }

    /// Get configuration file path
    pub fn config_path() -> Result<PathBuf> {
        // First try current directory for easy testing
        let local_config = PathBuf::from("config.yaml");
        if local_config.exists() {
            return Ok(local_config);
        }

        let config_dir = dirs::config_dir()
            .context("Could not determine config directory")?;

        Ok(config_dir.join("video-transcriptor").join("config.yaml"))
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.extractor.yt_dlp_path.trim().is_empty() {
            anyhow::bail!("extractor.yt_dlp_path must not be empty");
        }

        if self.extractor.socket_timeout_secs == 0 {
            anyhow::bail!("extractor.socket_timeout_secs must be greater than zero");
        }

        url::Url::parse(&self.extractor.innertube_endpoint)
            .context("extractor.innertube_endpoint is not a valid URL")?;

        if self.whisper.binary_path.trim().is_empty() {
            anyhow::bail!("whisper.binary_path must not be empty");
        }

        if let Some(browser) = &self.cookies.browser {
            if !BrowserCookieProvider::supports(browser) {
                anyhow::bail!("Unsupported cookie browser: {}", browser);
            }
        }

        if !matches!(self.app.default_output_format.as_str(), "text" | "json") {
            anyhow::bail!(
                "app.default_output_format must be 'text' or 'json', got '{}'",
                self.app.default_output_format
            );
        }

        Ok(())
    }

    /// Display current configuration
    pub fn display(&self) {
        println!("Current Configuration:");
        println!("  yt-dlp: {}", self.extractor.yt_dlp_path);
        println!("  Audio: {} @ {}", self.extractor.audio_format, self.extractor.audio_quality);
        println!("  Socket Timeout: {}s", self.extractor.socket_timeout_secs);
        println!("  Whisper: {}", self.whisper.binary_path);
        if let Some(device) = &self.whisper.device {
            println!("  Whisper Device: {}", device);
        }
        if let Some(model) = self.whisper.default_model {
            println!("  Default Model: {}", model);
        }
        println!(
            "  Cookie Browser: {}",
            self.cookies.browser.as_deref().unwrap_or("auto-detect")
        );
        if let Some(domain) = &self.cookies.domain {
            println!("  Cookie Domain: {}", domain);
        }
        if let Some(path) = &self.cookies.cookie_file {
            println!("  Cookie File: {}", path.display());
        }
        println!("  Keep Audio: {}", self.app.keep_audio);
        println!("  Default Output: {}", self.app.default_output.display());
        println!("  Default Format: {}", self.app.default_output_format);
    }

    /// Per-request temporary directories are created here (OS default if unset)
    pub fn temp_root(&self) -> Option<&Path> {
        self.app.temp_dir.as_deref()
    }
}
