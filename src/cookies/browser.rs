use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Row};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::{Cookie, CookieProvider, CookieSet};
use crate::{Result, TranscriptorError};

/// Seconds between 1601-01-01 (Chromium's epoch) and 1970-01-01
const CHROMIUM_EPOCH_OFFSET_SECS: i64 = 11_644_473_600;

/// Firefox switched `expiry` to milliseconds; anything above this is not seconds
const MAX_EXPIRY_SECS: i64 = 100_000_000_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StoreKind {
    Firefox,
    Chromium,
}

/// Reads cookies straight from a browser's local SQLite cookie store
#[derive(Debug, Default)]
pub struct BrowserCookieProvider {
    store_overrides: HashMap<String, PathBuf>,
}

impl BrowserCookieProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `path` as the cookie store of `browser` instead of searching the profile directories
    pub fn with_store_path(mut self, browser: &str, path: impl Into<PathBuf>) -> Self {
        self.store_overrides
            .insert(browser.to_lowercase(), path.into());
        self
    }

    /// Browser names this provider understands
    pub fn supports(browser: &str) -> bool {
        store_kind(browser).is_some()
    }

    fn locate_store(&self, browser: &str, kind: StoreKind) -> Option<PathBuf> {
        if let Some(path) = self.store_overrides.get(browser) {
            return Some(path.clone());
        }

        match kind {
            StoreKind::Firefox => firefox_profile_roots()
                .into_iter()
                .filter_map(|root| newest_firefox_store(&root))
                .max_by_key(|(modified, _)| *modified)
                .map(|(_, path)| path),
            StoreKind::Chromium => chromium_user_data_dirs(browser)
                .into_iter()
                .flat_map(|dir| {
                    [
                        dir.join("Default").join("Network").join("Cookies"),
                        dir.join("Default").join("Cookies"),
                    ]
                })
                .find(|path| path.is_file()),
        }
    }
}

#[async_trait]
impl CookieProvider for BrowserCookieProvider {
    async fn load(&self, browser: &str, domain: Option<&str>) -> Result<CookieSet> {
        let browser = browser.to_lowercase();
        let kind = store_kind(&browser).ok_or_else(|| {
            TranscriptorError::CookieUnavailable(format!("unsupported browser: {}", browser))
        })?;

        let store = self.locate_store(&browser, kind).ok_or_else(|| {
            TranscriptorError::CookieUnavailable(format!("{} does not appear to be installed", browser))
        })?;

        tracing::debug!("Reading {} cookies from {}", browser, store.display());

        // The live database is locked while the browser runs, so read a private copy.
        let scratch = tempfile::Builder::new()
            .prefix("cookie-store-")
            .tempdir()
            .map_err(unavailable)?;
        let copy = copy_store(&store, scratch.path()).await?;

        let cookies = read_store(&copy, kind).await?;
        let set = match domain {
            Some(domain) => cookies.scoped_to(domain),
            None => cookies,
        };

        tracing::debug!("Read {} cookies from {}", set.len(), browser);
        Ok(set)
    }
}

fn store_kind(browser: &str) -> Option<StoreKind> {
    match browser.to_lowercase().as_str() {
        "firefox" => Some(StoreKind::Firefox),
        "chrome" | "chromium" | "brave" | "edge" | "vivaldi" => Some(StoreKind::Chromium),
        _ => None,
    }
}

fn unavailable(err: impl std::fmt::Display) -> TranscriptorError {
    TranscriptorError::CookieUnavailable(err.to_string())
}

async fn copy_store(store: &Path, scratch: &Path) -> Result<PathBuf> {
    let target = scratch.join("cookies.sqlite");
    tokio::fs::copy(store, &target).await.map_err(|e| {
        TranscriptorError::CookieUnavailable(format!("cannot read {}: {}", store.display(), e))
    })?;

    // Recent writes may still live in the write-ahead log.
    let wal = append_suffix(store, "-wal");
    if wal.is_file() {
        if let Err(e) = tokio::fs::copy(&wal, append_suffix(&target, "-wal")).await {
            tracing::debug!("Ignoring unreadable WAL {}: {}", wal.display(), e);
        }
    }

    Ok(target)
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

async fn read_store(path: &Path, kind: StoreKind) -> Result<CookieSet> {
    let options = SqliteConnectOptions::new().filename(path);
    let mut conn = SqliteConnection::connect_with(&options)
        .await
        .map_err(unavailable)?;

    let cookies = match kind {
        StoreKind::Firefox => read_firefox(&mut conn).await,
        StoreKind::Chromium => read_chromium(&mut conn).await,
    };

    if let Err(e) = conn.close().await {
        tracing::debug!("Error closing cookie store: {}", e);
    }

    cookies
}

async fn read_firefox(conn: &mut SqliteConnection) -> Result<CookieSet> {
    let rows = sqlx::query(
        "SELECT host, path, isSecure, expiry, name, value FROM moz_cookies ORDER BY id",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(unavailable)?;

    rows.iter()
        .map(|row| -> std::result::Result<Cookie, sqlx::Error> {
            let expiry: i64 = row.try_get("expiry")?;
            let secure: i64 = row.try_get("isSecure")?;
            Ok(Cookie {
                domain: row.try_get("host")?,
                path: row.try_get("path")?,
                secure: secure != 0,
                expires: if expiry > MAX_EXPIRY_SECS { expiry / 1000 } else { expiry },
                name: row.try_get("name")?,
                value: row.try_get("value")?,
            })
        })
        .collect::<std::result::Result<CookieSet, sqlx::Error>>()
        .map_err(unavailable)
}

async fn read_chromium(conn: &mut SqliteConnection) -> Result<CookieSet> {
    let rows = sqlx::query(
        "SELECT host_key, path, is_secure, expires_utc, name, value, \
         COALESCE(length(encrypted_value), 0) AS encrypted_len \
         FROM cookies ORDER BY creation_utc",
    )
    .fetch_all(&mut *conn)
    .await
    .map_err(unavailable)?;

    let mut cookies = Vec::with_capacity(rows.len());
    let mut encrypted = 0usize;

    for row in &rows {
        let value: String = row.try_get("value").map_err(unavailable)?;
        let encrypted_len: i64 = row.try_get("encrypted_len").map_err(unavailable)?;
        if value.is_empty() && encrypted_len > 0 {
            encrypted += 1;
            continue;
        }

        let expires_utc: i64 = row.try_get("expires_utc").map_err(unavailable)?;
        let secure: i64 = row.try_get("is_secure").map_err(unavailable)?;
        cookies.push(Cookie {
            domain: row.try_get("host_key").map_err(unavailable)?,
            path: row.try_get("path").map_err(unavailable)?,
            secure: secure != 0,
            expires: chromium_to_unix(expires_utc),
            name: row.try_get("name").map_err(unavailable)?,
            value,
        });
    }

    if encrypted > 0 {
        tracing::warn!(
            "Skipped {} encrypted cookies; export a cookies.txt file to use them",
            encrypted
        );
    }

    Ok(CookieSet::new(cookies))
}

/// Chromium stores expiry as microseconds since 1601-01-01
fn chromium_to_unix(expires_utc: i64) -> i64 {
    if expires_utc <= 0 {
        0
    } else {
        (expires_utc / 1_000_000 - CHROMIUM_EPOCH_OFFSET_SECS).max(0)
    }
}

fn newest_firefox_store(root: &Path) -> Option<(SystemTime, PathBuf)> {
    std::fs::read_dir(root)
        .ok()?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path().join("cookies.sqlite"))
        .filter_map(|path| {
            let modified = std::fs::metadata(&path).ok()?.modified().ok()?;
            Some((modified, path))
        })
        .max_by_key(|(modified, _)| *modified)
}

fn firefox_profile_roots() -> Vec<PathBuf> {
    let mut roots = Vec::new();

    #[cfg(target_os = "linux")]
    {
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join(".mozilla").join("firefox"));
            roots.push(home.join("snap").join("firefox").join("common").join(".mozilla").join("firefox"));
            roots.push(home.join(".var").join("app").join("org.mozilla.firefox").join(".mozilla").join("firefox"));
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            roots.push(home.join("Library").join("Application Support").join("Firefox").join("Profiles"));
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Some(roaming) = dirs::data_dir() {
            roots.push(roaming.join("Mozilla").join("Firefox").join("Profiles"));
        }
    }

    roots
}

fn chromium_user_data_dirs(browser: &str) -> Vec<PathBuf> {
    let mut dirs_found = Vec::new();

    #[cfg(target_os = "linux")]
    {
        if let Some(config) = dirs::config_dir() {
            let relative: &[&str] = match browser {
                "chrome" => &["google-chrome"],
                "chromium" => &["chromium"],
                "brave" => &["BraveSoftware", "Brave-Browser"],
                "edge" => &["microsoft-edge"],
                "vivaldi" => &["vivaldi"],
                _ => &[],
            };
            if !relative.is_empty() {
                dirs_found.push(relative.iter().fold(config, |path, part| path.join(part)));
            }
        }
    }

    #[cfg(target_os = "macos")]
    {
        if let Some(home) = dirs::home_dir() {
            let support = home.join("Library").join("Application Support");
            let relative: &[&str] = match browser {
                "chrome" => &["Google", "Chrome"],
                "chromium" => &["Chromium"],
                "brave" => &["BraveSoftware", "Brave-Browser"],
                "edge" => &["Microsoft Edge"],
                "vivaldi" => &["Vivaldi"],
                _ => &[],
            };
            if !relative.is_empty() {
                dirs_found.push(relative.iter().fold(support, |path, part| path.join(part)));
            }
        }
    }

    #[cfg(target_os = "windows")]
    {
        if let Some(local) = dirs::data_local_dir() {
            let relative: &[&str] = match browser {
                "chrome" => &["Google", "Chrome", "User Data"],
                "chromium" => &["Chromium", "User Data"],
                "brave" => &["BraveSoftware", "Brave-Browser", "User Data"],
                "edge" => &["Microsoft", "Edge", "User Data"],
                "vivaldi" => &["Vivaldi", "User Data"],
                _ => &[],
            };
            if !relative.is_empty() {
                dirs_found.push(relative.iter().fold(local, |path, part| path.join(part)));
            }
        }
    }

    dirs_found
}
