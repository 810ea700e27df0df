use url::Url;

/// Hostnames served by the primary (YouTube) extractor
const PLATFORM_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtube-nocookie.com",
    "www.youtube-nocookie.com",
    "youtu.be",
];

const VIDEO_ID_LEN: usize = 11;

/// What kind of URL the user handed us
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlKind {
    /// A watch/short link on a recognized video platform
    RecognizedPlatform { video_id: String },
    /// Any other well-formed http(s) URL
    Generic,
}

impl UrlKind {
    pub fn is_recognized_platform(&self) -> bool {
        matches!(self, UrlKind::RecognizedPlatform { .. })
    }
}

/// A validated URL together with its classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedUrl {
    pub url: Url,
    pub kind: UrlKind,
}

/// Classify a URL, returning `None` for anything that is not a usable download URL
pub fn classify_url(input: &str) -> Option<ClassifiedUrl> {
    let input = input.trim();
    if input.is_empty() || !input.chars().all(is_url_char) {
        return None;
    }

    let url = Url::parse(&with_default_scheme(input)).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();

    if PLATFORM_HOSTS.contains(&host.as_str()) {
        if let Some(video_id) = platform_video_id(&url, &host) {
            return Some(ClassifiedUrl {
                url,
                kind: UrlKind::RecognizedPlatform { video_id },
            });
        }
    }

    if host.contains('.') || host == "localhost" {
        Some(ClassifiedUrl {
            url,
            kind: UrlKind::Generic,
        })
    } else {
        None
    }
}

/// Check if the input is either a recognized-platform URL or a generic download URL
pub fn is_valid_url(input: &str) -> bool {
    classify_url(input).is_some()
}

/// Extract the video id from a recognized-platform URL
pub fn extract_video_id(input: &str) -> Option<String> {
    match classify_url(input)?.kind {
        UrlKind::RecognizedPlatform { video_id } => Some(video_id),
        UrlKind::Generic => None,
    }
}

/// Check the 11-character video identifier alphabet
pub fn is_video_id(candidate: &str) -> bool {
    candidate.len() == VIDEO_ID_LEN
        && candidate
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

fn is_url_char(c: char) -> bool {
    c.is_ascii_graphic()
}

// "youtube.com/watch?v=..." without a scheme is accepted for platform hosts only.
fn with_default_scheme(input: &str) -> String {
    if input.contains("://") {
        return input.to_string();
    }

    let lower = input.to_ascii_lowercase();
    let platform_prefix = PLATFORM_HOSTS
        .iter()
        .any(|host| lower.starts_with(&format!("{}/", host)));

    if platform_prefix {
        format!("https://{}", input)
    } else {
        input.to_string()
    }
}

fn platform_video_id(url: &Url, host: &str) -> Option<String> {
    let mut segments = url.path_segments()?.filter(|segment| !segment.is_empty());

    let candidate = if host == "youtu.be" {
        segments.next().map(str::to_string)
    } else {
        match segments.next() {
            Some("watch") => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            Some("shorts") | Some("embed") | Some("live") | Some("v") => {
                segments.next().map(str::to_string)
            }
            _ => None,
        }
    }?;

    is_video_id(&candidate).then_some(candidate)
}
