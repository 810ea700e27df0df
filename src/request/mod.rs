use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Whisper model tier, trading inference speed for accuracy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ModelSize {
    Tiny,
    Base,
    Small,
    Medium,
    Large,
}

impl ModelSize {
    pub fn as_str(&self) -> &'static str {
        match self {
            ModelSize::Tiny => "tiny",
            ModelSize::Base => "base",
            ModelSize::Small => "small",
            ModelSize::Medium => "medium",
            ModelSize::Large => "large",
        }
    }

    /// English audio transcribes well on `small`; everything else gets `medium`.
    pub fn default_for_language(language: Option<&str>) -> Self {
        match language {
            Some(lang) if lang.eq_ignore_ascii_case("en") => ModelSize::Small,
            _ => ModelSize::Medium,
        }
    }
}

impl std::fmt::Display for ModelSize {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ModelSize {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "tiny" => Ok(ModelSize::Tiny),
            "base" => Ok(ModelSize::Base),
            "small" => Ok(ModelSize::Small),
            "medium" => Ok(ModelSize::Medium),
            "large" => Ok(ModelSize::Large),
            other => Err(format!("unknown model size: {}", other)),
        }
    }
}

/// How authentication cookies are supplied to the extractors
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CookiePolicy {
    /// Never send cookies
    None,
    /// Read cookies from a locally installed browser
    #[default]
    BrowserAuto,
    /// Load cookies from a Netscape-format cookie file
    CookieFile(PathBuf),
}

impl CookiePolicy {
    pub fn cookie_file(&self) -> Option<&Path> {
        match self {
            CookiePolicy::CookieFile(path) => Some(path),
            _ => None,
        }
    }
}

/// A single transcription request.
///
/// Built once through `new` and the `with_*` methods, then only read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoRequest {
    url: String,
    cookie_policy: CookiePolicy,
    language_hint: Option<String>,
    model_size: ModelSize,
}

impl VideoRequest {
    pub fn new(url: impl Into<String>) -> Self {
        let url = url.into().trim().to_string();
        Self {
            url,
            cookie_policy: CookiePolicy::default(),
            language_hint: None,
            model_size: ModelSize::default_for_language(None),
        }
    }

    pub fn with_cookie_policy(mut self, policy: CookiePolicy) -> Self {
        self.cookie_policy = policy;
        self
    }

    /// Set the language hint; `auto` or an empty string means auto-detect.
    pub fn with_language(mut self, language: Option<&str>) -> Self {
        self.language_hint = language.and_then(normalize_language);
        self
    }

    pub fn with_model_size(mut self, size: ModelSize) -> Self {
        self.model_size = size;
        self
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn cookie_policy(&self) -> &CookiePolicy {
        &self.cookie_policy
    }

    pub fn language_hint(&self) -> Option<&str> {
        self.language_hint.as_deref()
    }

    pub fn model_size(&self) -> ModelSize {
        self.model_size
    }
}

/// Normalize a user supplied language code, mapping `auto` to `None`
pub fn normalize_language(language: &str) -> Option<String> {
    let trimmed = language.trim();
    if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("auto") {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_language_is_no_hint() {
        assert_eq!(normalize_language("auto"), None);
        assert_eq!(normalize_language("AUTO"), None);
        assert_eq!(normalize_language("  "), None);
        assert_eq!(normalize_language("RO"), Some("ro".to_string()));
    }

    #[test]
    fn test_default_model_follows_language() {
        assert_eq!(ModelSize::default_for_language(Some("en")), ModelSize::Small);
        assert_eq!(ModelSize::default_for_language(Some("fr")), ModelSize::Medium);
        assert_eq!(ModelSize::default_for_language(None), ModelSize::Medium);
    }

    #[test]
    fn test_request_builder() {
        let request = VideoRequest::new("  https://youtu.be/dQw4w9WgXcQ ")
            .with_language(Some("auto"))
            .with_model_size(ModelSize::Tiny)
            .with_cookie_policy(CookiePolicy::None);

        assert_eq!(request.url(), "https://youtu.be/dQw4w9WgXcQ");
        assert_eq!(request.language_hint(), None);
        assert_eq!(request.model_size(), ModelSize::Tiny);
        assert_eq!(request.cookie_policy(), &CookiePolicy::None);
    }

    #[test]
    fn test_model_size_parse() {
        assert_eq!("Large".parse::<ModelSize>(), Ok(ModelSize::Large));
        assert!("huge".parse::<ModelSize>().is_err());
    }
}
