use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub mod browser;

pub use browser::BrowserCookieProvider;

use crate::config::CookieConfig;
use crate::request::CookiePolicy;
use crate::{Result, TranscriptorError};

const NETSCAPE_HEADER: &str = "# Netscape HTTP Cookie File";
const HTTP_ONLY_PREFIX: &str = "#HttpOnly_";

/// Browsers tried, in order, when no browser is configured
pub const AUTO_DETECT_BROWSERS: &[&str] = &["firefox", "chrome", "chromium", "brave", "edge", "vivaldi"];

/// A single browser cookie
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cookie {
    pub domain: String,
    pub path: String,
    pub secure: bool,
    /// Expiry as unix epoch seconds, 0 for session cookies
    pub expires: i64,
    pub name: String,
    pub value: String,
}

impl Cookie {
    /// A leading dot on the domain means the cookie applies to subdomains too
    pub fn include_subdomains(&self) -> bool {
        self.domain.starts_with('.')
    }

    /// Check if the cookie belongs to `domain` or one of its subdomains
    pub fn matches_domain(&self, domain: &str) -> bool {
        let own = self.domain.trim_start_matches('.').to_ascii_lowercase();
        let wanted = domain.trim_start_matches('.').to_ascii_lowercase();
        own == wanted || own.ends_with(&format!(".{}", wanted))
    }

    /// Fields holding a line break or tab cannot be written as a single record
    fn fits_netscape_line(&self) -> bool {
        [&self.domain, &self.path, &self.name, &self.value]
            .iter()
            .all(|field| !field.contains(['\n', '\r', '\t']))
    }

    fn to_netscape_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}\t{}\t{}\t{}",
            self.domain,
            netscape_bool(self.include_subdomains()),
            self.path,
            netscape_bool(self.secure),
            self.expires,
            self.name,
            self.value,
        )
    }

    fn from_netscape_line(line: &str) -> Option<Self> {
        let line = line.strip_prefix(HTTP_ONLY_PREFIX).unwrap_or(line);
        let fields: Vec<&str> = line.split('\t').collect();
        if fields.len() < 7 {
            return None;
        }

        Some(Self {
            domain: fields[0].to_string(),
            path: fields[2].to_string(),
            secure: fields[3].eq_ignore_ascii_case("TRUE"),
            expires: fields[4].trim().parse().ok()?,
            name: fields[5].to_string(),
            // values may legitimately contain tabs
            value: fields[6..].join("\t"),
        })
    }
}

fn netscape_bool(flag: bool) -> &'static str {
    if flag {
        "TRUE"
    } else {
        "FALSE"
    }
}

/// Ordered, read-only collection of cookies
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CookieSet {
    cookies: Vec<Cookie>,
}

impl CookieSet {
    pub fn new(cookies: Vec<Cookie>) -> Self {
        Self { cookies }
    }

    pub fn is_empty(&self) -> bool {
        self.cookies.is_empty()
    }

    pub fn len(&self) -> usize {
        self.cookies.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Cookie> {
        self.cookies.iter()
    }

    /// Copy of the set restricted to one domain and its subdomains
    pub fn scoped_to(&self, domain: &str) -> CookieSet {
        self.cookies
            .iter()
            .filter(|cookie| cookie.matches_domain(domain))
            .cloned()
            .collect()
    }

    /// Value for an HTTP `Cookie` request header, `None` when the set is empty
    pub fn header_value(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        Some(
            self.cookies
                .iter()
                .map(|cookie| format!("{}={}", cookie.name, cookie.value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }

    /// Render the set in the Netscape cookie-file format understood by yt-dlp and curl
    pub fn to_netscape(&self) -> String {
        let mut content = String::from(NETSCAPE_HEADER);
        content.push('\n');
        for cookie in &self.cookies {
            if !cookie.fits_netscape_line() {
                tracing::debug!("Skipping cookie {:?} for {}: control characters in a field", cookie.name, cookie.domain);
                continue;
            }
            content.push_str(&cookie.to_netscape_line());
            content.push('\n');
        }
        content
    }

    /// Parse a Netscape cookie file, skipping comments and malformed lines
    pub fn from_netscape(content: &str) -> CookieSet {
        content
            .lines()
            .map(str::trim_end)
            .filter(|line| !line.is_empty())
            .filter(|line| !line.starts_with('#') || line.starts_with(HTTP_ONLY_PREFIX))
            .filter_map(Cookie::from_netscape_line)
            .collect()
    }

    /// Load a Netscape cookie file from disk
    pub async fn from_netscape_file(path: &Path) -> Result<CookieSet> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            TranscriptorError::CookieUnavailable(format!(
                "cannot read cookie file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self::from_netscape(&content))
    }

    /// Write the set to a transient cookie file that is deleted when dropped
    pub fn write_temp_file(&self, dir: &Path) -> Result<CookieFile> {
        let mut file = tempfile::Builder::new()
            .prefix("cookies-")
            .suffix(".txt")
            .tempfile_in(dir)?;

        file.write_all(self.to_netscape().as_bytes())?;
        file.flush()?;

        tracing::debug!(
            "Wrote {} cookies to {}",
            self.cookies.len(),
            file.path().display()
        );

        Ok(CookieFile { file })
    }
}

impl FromIterator<Cookie> for CookieSet {
    fn from_iter<I: IntoIterator<Item = Cookie>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

/// A cookie file on disk, removed when this value goes out of scope
#[derive(Debug)]
pub struct CookieFile {
    file: NamedTempFile,
}

impl CookieFile {
    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Source of browser cookies
#[async_trait]
pub trait CookieProvider: Send + Sync {
    /// Read the cookies of `browser`, optionally restricted to one domain.
    ///
    /// Every failure is reported as [`TranscriptorError::CookieUnavailable`].
    async fn load(&self, browser: &str, domain: Option<&str>) -> Result<CookieSet>;
}

/// Resolve the cookies for a request according to its policy.
///
/// Cookie problems never abort a request: they are logged and the request
/// continues without authentication.
pub async fn resolve_cookies(
    policy: &CookiePolicy,
    provider: &dyn CookieProvider,
    settings: &CookieConfig,
) -> Option<CookieSet> {
    let domain = settings.domain.as_deref();

    let loaded = match policy {
        CookiePolicy::None => return None,
        CookiePolicy::CookieFile(path) => CookieSet::from_netscape_file(path)
            .await
            .map(|set| match domain {
                Some(domain) => set.scoped_to(domain),
                None => set,
            }),
        CookiePolicy::BrowserAuto => match settings.browser.as_deref() {
            Some(browser) => provider.load(browser, domain).await,
            None => load_first_available(provider, domain).await,
        },
    };

    match loaded {
        Ok(set) if set.is_empty() => {
            tracing::warn!("No cookies found, continuing without authentication");
            None
        }
        Ok(set) => {
            tracing::info!("Loaded {} cookies", set.len());
            Some(set)
        }
        Err(e) => {
            tracing::warn!("{}; continuing without authentication", e);
            None
        }
    }
}

async fn load_first_available(provider: &dyn CookieProvider, domain: Option<&str>) -> Result<CookieSet> {
    for browser in AUTO_DETECT_BROWSERS {
        match provider.load(browser, domain).await {
            Ok(set) if !set.is_empty() => {
                tracing::debug!("Using cookies from {}", browser);
                return Ok(set);
            }
            Ok(_) => tracing::debug!("{} has no matching cookies", browser),
            Err(e) => tracing::debug!("Skipping {}: {}", browser, e),
        }
    }

    Err(TranscriptorError::CookieUnavailable(
        "no supported browser with cookies was found".to_string(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn cookie(domain: &str, name: &str, value: &str) -> Cookie {
        Cookie {
            domain: domain.to_string(),
            path: "/".to_string(),
            secure: true,
            expires: 1_900_000_000,
            name: name.to_string(),
            value: value.to_string(),
        }
    }

    #[test]
    fn test_netscape_line_layout() {
        let set = CookieSet::new(vec![
            cookie(".youtube.com", "SID", "abc"),
            Cookie {
                secure: false,
                expires: 0,
                ..cookie("accounts.google.com", "NID", "x=y")
            },
        ]);

        let rendered = set.to_netscape();
        let lines: Vec<&str> = rendered.lines().collect();

        assert_eq!(lines[0], NETSCAPE_HEADER);
        assert_eq!(lines[1], ".youtube.com\tTRUE\t/\tTRUE\t1900000000\tSID\tabc");
        assert_eq!(lines[2], "accounts.google.com\tFALSE\t/\tFALSE\t0\tNID\tx=y");
    }

    #[test]
    fn test_netscape_skips_cookies_that_would_break_lines() {
        let set = CookieSet::new(vec![
            cookie(".youtube.com", "SID", "abc"),
            cookie(".youtube.com", "EVIL", "x\n.youtube.com\tTRUE\t/\tTRUE\t0\tPREF\tinjected"),
            cookie(".youtube.com", "CR\rNAME", "1"),
            cookie(".youtube.com", "TABBED", "a\tb"),
        ]);

        let rendered = set.to_netscape();
        let reloaded = CookieSet::from_netscape(&rendered);

        assert_eq!(rendered.lines().count(), 2);
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.header_value().as_deref(), Some("SID=abc"));
    }

    #[test]
    fn test_parse_skips_comments_and_keeps_http_only() {
        let content = "# Netscape HTTP Cookie File\n\
                       # a comment\n\
                       \n\
                       #HttpOnly_.youtube.com\tTRUE\t/\tTRUE\t1900000000\tHSID\tsecret\n\
                       broken line\n\
                       .youtube.com\tTRUE\t/\tFALSE\t0\tPREF\tf6=40000000\n";

        let set = CookieSet::from_netscape(content);

        assert_eq!(set.len(), 2);
        let names: Vec<&str> = set.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["HSID", "PREF"]);
        assert!(set.iter().all(|c| c.include_subdomains()));
    }

    #[test]
    fn test_scoped_to_domain() {
        let set = CookieSet::new(vec![
            cookie(".youtube.com", "SID", "1"),
            cookie("www.youtube.com", "VISITOR", "2"),
            cookie(".notyoutube.com", "X", "3"),
            cookie(".google.com", "G", "4"),
        ]);

        let scoped = set.scoped_to("youtube.com");
        let names: Vec<&str> = scoped.iter().map(|c| c.name.as_str()).collect();

        assert_eq!(names, vec!["SID", "VISITOR"]);
    }

    #[test]
    fn test_header_value() {
        assert_eq!(CookieSet::default().header_value(), None);

        let set = CookieSet::new(vec![cookie(".youtube.com", "A", "1"), cookie(".youtube.com", "B", "2")]);
        assert_eq!(set.header_value().as_deref(), Some("A=1; B=2"));
    }

    #[test]
    fn test_temp_file_removed_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let set = CookieSet::new(vec![cookie(".youtube.com", "SID", "abc")]);

        let file = set.write_temp_file(dir.path()).unwrap();
        let path = file.path().to_path_buf();
        let written = std::fs::read_to_string(&path).unwrap();
        assert_eq!(CookieSet::from_netscape(&written), set);

        drop(file);
        assert!(!path.exists());
    }

    struct RecordingProvider {
        calls: Mutex<Vec<String>>,
        with_cookies: &'static str,
    }

    #[async_trait]
    impl CookieProvider for RecordingProvider {
        async fn load(&self, browser: &str, _domain: Option<&str>) -> Result<CookieSet> {
            self.calls.lock().unwrap().push(browser.to_string());
            if browser == self.with_cookies {
                Ok(CookieSet::new(vec![cookie(".youtube.com", "SID", browser)]))
            } else if browser == "firefox" {
                Err(TranscriptorError::CookieUnavailable("not installed".to_string()))
            } else {
                Ok(CookieSet::default())
            }
        }
    }

    #[tokio::test]
    async fn test_browser_auto_detection_order() {
        let provider = RecordingProvider {
            calls: Mutex::new(Vec::new()),
            with_cookies: "chromium",
        };

        let set = resolve_cookies(&CookiePolicy::BrowserAuto, &provider, &CookieConfig::default())
            .await
            .unwrap();

        assert_eq!(set.iter().next().unwrap().value, "chromium");
        assert_eq!(*provider.calls.lock().unwrap(), vec!["firefox", "chrome", "chromium"]);
    }

    #[tokio::test]
    async fn test_cookie_failures_degrade_to_none() {
        let provider = RecordingProvider {
            calls: Mutex::new(Vec::new()),
            with_cookies: "none-of-them",
        };
        let settings = CookieConfig {
            browser: Some("firefox".to_string()),
            ..CookieConfig::default()
        };

        assert!(resolve_cookies(&CookiePolicy::BrowserAuto, &provider, &settings).await.is_none());
        assert!(resolve_cookies(&CookiePolicy::None, &provider, &settings).await.is_none());

        let missing = CookiePolicy::CookieFile("/definitely/not/here/cookies.txt".into());
        assert!(resolve_cookies(&missing, &provider, &settings).await.is_none());
        assert_eq!(provider.calls.lock().unwrap().len(), 1);
    }
}
