#![allow(dead_code)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use video_transcriptor::config::ExtractorConfig;
use video_transcriptor::{Cookie, CookieSet};

/// Stand-in for yt-dlp: probes succeed, downloads write the received cookie
/// file (or "no cookies") into the requested output.
pub const YT_DLP_STUB: &str = r#"#!/bin/sh
cookies=""
output=""
mode="download"
while [ $# -gt 0 ]; do
  case "$1" in
    --version) echo "2024.01.01"; exit 0 ;;
    --dump-single-json) mode="probe" ;;
    --cookies) cookies="$2"; shift ;;
    --output) output="$2"; shift ;;
  esac
  shift
done
if [ "$mode" = "probe" ]; then
  echo '{"title": "Stub video", "duration": 42.0, "live_status": "not_live"}'
  exit 0
fi
target=$(printf '%s' "$output" | sed 's/%(ext)s/mp3/')
if [ -n "$cookies" ]; then
  cat "$cookies" > "$target"
else
  echo "no cookies" > "$target"
fi
"#;

/// Like [`YT_DLP_STUB`], but the metadata dump of a URL with a `list=` parameter
/// resolves to the whole playlist unless `--no-playlist` is passed.
/// A `/playlist?` URL is always a playlist, as with the real tool.
pub const YT_DLP_PLAYLIST_AWARE_STUB: &str = r#"#!/bin/sh
output=""
mode="download"
single=""
url=""
for arg in "$@"; do url="$arg"; done
while [ $# -gt 0 ]; do
  case "$1" in
    --version) echo "2024.01.01"; exit 0 ;;
    --dump-single-json) mode="info" ;;
    --no-playlist) single="yes" ;;
    --output) output="$2"; shift ;;
  esac
  shift
done
case "$url" in
  */playlist\?*) listed="yes"; single="" ;;
  *list=*) listed="yes" ;;
  *) listed="" ;;
esac
if [ "$mode" = "info" ]; then
  if [ -n "$listed" ] && [ -z "$single" ]; then
    echo '{"_type": "playlist", "title": "Stub list", "entries": [{"id": "dQw4w9WgXcQ"}, {"id": "aaaaaaaaaaa"}]}'
  else
    echo '{"title": "Listed video", "duration": 42.0, "live_status": "not_live"}'
  fi
  exit 0
fi
if [ -n "$listed" ] && [ -z "$single" ]; then
  echo "ERROR: refusing to download a whole playlist" >&2
  exit 1
fi
target=$(printf '%s' "$output" | sed 's/%(ext)s/mp3/')
echo "single video" > "$target"
"#;

/// yt-dlp failing the way it does for a private video
pub const YT_DLP_PRIVATE_STUB: &str = r#"#!/bin/sh
echo "ERROR: [youtube] dQw4w9WgXcQ: Private video. Sign in if you've been granted access to this video" >&2
exit 1
"#;

/// Stand-in for whisper: writes `<stem>.json`, reporting "ro" unless a language is forced
pub const WHISPER_STUB: &str = r#"#!/bin/sh
if [ "$1" = "--help" ]; then
  echo "usage: whisper audio"
  exit 0
fi
audio="$1"
shift
language=""
outdir="."
while [ $# -gt 0 ]; do
  case "$1" in
    --language) language="$2"; shift ;;
    --output_dir) outdir="$2"; shift ;;
  esac
  shift
done
stem=$(basename "$audio" | sed 's/\.[^.]*$//')
reported="${language:-ro}"
printf '{"text": " Buna ziua si bine ati venit. ", "segments": [], "language": "%s"}' "$reported" > "$outdir/$stem.json"
"#;

pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, body).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

pub fn youtube_cookies() -> CookieSet {
    CookieSet::new(vec![
        Cookie {
            domain: ".youtube.com".to_string(),
            path: "/".to_string(),
            secure: true,
            expires: 1_900_000_000,
            name: "SID".to_string(),
            value: "secret".to_string(),
        },
        Cookie {
            domain: "example.org".to_string(),
            path: "/".to_string(),
            secure: false,
            expires: 0,
            name: "other".to_string(),
            value: "1".to_string(),
        },
    ])
}

/// An endpoint nothing listens on, so the primary extractor fails fast
pub async fn dead_endpoint() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/player", port)
}

pub fn extractor_config(yt_dlp: &Path, endpoint: &str) -> ExtractorConfig {
    ExtractorConfig {
        yt_dlp_path: yt_dlp.to_string_lossy().into_owned(),
        innertube_endpoint: endpoint.to_string(),
        ..ExtractorConfig::default()
    }
}

/// A request as seen by the fake player API
#[derive(Debug, Clone)]
pub struct SeenRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
}

impl SeenRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Minimal HTTP server answering `POST /player` with `player_json` (where
/// `{base}` is replaced by the server's own URL) and `GET /audio` with `audio`.
pub async fn spawn_player_server(player_json: &str, audio: &'static [u8]) -> (String, Arc<Mutex<Vec<SeenRequest>>>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let player = player_json.replace("{base}", &base);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let recorded = seen.clone();
    tokio::spawn(async move {
        loop {
            let Ok((socket, _)) = listener.accept().await else {
                return;
            };
            let player = player.clone();
            let recorded = recorded.clone();
            tokio::spawn(async move {
                let _ = handle(socket, &player, audio, recorded).await;
            });
        }
    });

    (base, seen)
}

async fn handle(
    mut socket: TcpStream,
    player: &str,
    audio: &[u8],
    recorded: Arc<Mutex<Vec<SeenRequest>>>,
) -> std::io::Result<()> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 4096];

    let header_end = loop {
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            return Ok(());
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(pos) = buffer.windows(4).position(|window| window == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let mut lines = head.split("\r\n");
    let mut request_line = lines.next().unwrap_or("").split_whitespace();
    let method = request_line.next().unwrap_or("").to_string();
    let path = request_line.next().unwrap_or("").to_string();
    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(key, value)| (key.trim().to_string(), value.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(key, _)| key.eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.parse::<usize>().ok())
        .unwrap_or(0);
    while buffer.len() - header_end < content_length {
        let read = socket.read(&mut chunk).await?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    recorded.lock().unwrap().push(SeenRequest {
        method: method.clone(),
        path: path.clone(),
        headers,
    });

    let (status, content_type, body): (&str, &str, &[u8]) = if path.starts_with("/player") {
        ("200 OK", "application/json", player.as_bytes())
    } else if path.starts_with("/audio") {
        ("200 OK", "audio/webm", audio)
    } else {
        ("404 Not Found", "text/plain", b"not found")
    };

    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        content_type,
        body.len()
    );
    socket.write_all(head.as_bytes()).await?;
    socket.write_all(body).await?;
    socket.shutdown().await?;
    Ok(())
}

pub fn entries(dir: &Path) -> usize {
    std::fs::read_dir(dir).map(|entries| entries.count()).unwrap_or(0)
}
