//! URL resolution through the `yt-dlp` executable.

use std::future::Future;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use serde::Deserialize;
use tokio::process::Command;

use super::error::ResolveError;
use super::types::{MediaKind, MediaQueue, ResolvedTrack};
use crate::player::Track;

/// Query parameters whose values never reach the log.
const SENSITIVE_PARAMS: &[&str] = &["api_key", "key", "sig", "signature", "lsig", "token"];

/// Turns remote URLs into playable tracks.
pub trait MediaResolver: Send + Sync + 'static {
  /// Resolve a single track to its stream address and metadata.
  fn resolve(&self, url: &str) -> impl Future<Output = Result<ResolvedTrack, ResolveError>> + Send;

  /// Expand a video or playlist URL into a queue.
  fn extract_queue(&self, url: &str)
    -> impl Future<Output = Result<MediaQueue, ResolveError>> + Send;
}

/// Rewrite YouTube Music links to plain YouTube ones.
pub fn normalize_url(url: &str) -> String {
  url.trim().replace("music.youtube.com", "www.youtube.com")
}

/// Mask credential-like query values before logging a URL.
pub fn redact_url(url: &str) -> String {
  let Some((base, query)) = url.split_once('?') else {
    return url.to_string();
  };
  let query: Vec<String> = query
    .split('&')
    .map(|pair| match pair.split_once('=') {
      Some((key, _)) if SENSITIVE_PARAMS.contains(&key) => format!("{}=[REDACTED]", key),
      _ => pair.to_string(),
    })
    .collect();
  format!("{}?{}", base, query.join("&"))
}

/// Subset of yt-dlp's `--dump-single-json` output.
#[derive(Debug, Deserialize)]
struct InfoJson {
  #[serde(rename = "_type")]
  kind: Option<String>,
  title: Option<String>,
  duration: Option<f64>,
  url: Option<String>,
  thumbnail: Option<String>,
  #[serde(default)]
  entries: Option<Vec<Option<EntryJson>>>,
}

#[derive(Debug, Deserialize)]
struct EntryJson {
  title: Option<String>,
  url: Option<String>,
  webpage_url: Option<String>,
}

/// [`MediaResolver`] backed by a `yt-dlp` subprocess.
pub struct YtDlpResolver {
  binary: Option<PathBuf>,
  timeout: Duration,
}

impl YtDlpResolver {
  /// Create a resolver. `binary` overrides the `PATH` lookup.
  pub fn new(binary: Option<PathBuf>, timeout: Duration) -> Self {
    Self { binary, timeout }
  }

  fn binary(&self) -> Result<PathBuf, ResolveError> {
    self
      .binary
      .clone()
      .or_else(|| which::which("yt-dlp").ok())
      .ok_or(ResolveError::ResolverNotFound)
  }

  async fn dump_json(&self, args: &[&str], url: &str) -> Result<InfoJson, ResolveError> {
    let binary = self.binary()?;
    log::info!("Resolving {} with {:?} {:?}", redact_url(url), binary, args);

    let output = Command::new(&binary)
      .args(["--dump-single-json", "--no-warnings"])
      .args(args)
      .arg("--")
      .arg(url)
      .stdin(Stdio::null())
      .kill_on_drop(true)
      .output();

    let output = tokio::time::timeout(self.timeout, output)
      .await
      .map_err(|_| ResolveError::Timeout)??;

    if !output.status.success() {
      let stderr = String::from_utf8_lossy(&output.stderr);
      let reason = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("unknown error")
        .trim()
        .to_string();
      return Err(ResolveError::Failed(reason));
    }

    Ok(serde_json::from_slice(&output.stdout)?)
  }
}

impl MediaResolver for YtDlpResolver {
  async fn resolve(&self, url: &str) -> Result<ResolvedTrack, ResolveError> {
    let url = normalize_url(url);
    let info = self
      .dump_json(&["--no-playlist", "-f", "bestaudio/best"], &url)
      .await?;
    Ok(track_from_info(info))
  }

  async fn extract_queue(&self, url: &str) -> Result<MediaQueue, ResolveError> {
    let url = normalize_url(url);
    let info = self.dump_json(&["--flat-playlist"], &url).await?;
    let queue = queue_from_info(info, &url)?;
    log::info!(
      "Extracted {:?} '{}' with {} tracks",
      queue.kind,
      queue.title.as_deref().unwrap_or("untitled"),
      queue.tracks.len()
    );
    Ok(queue)
  }
}

fn track_from_info(info: InfoJson) -> ResolvedTrack {
  ResolvedTrack {
    title: info.title.unwrap_or_else(|| "Unknown".to_string()),
    duration: info.duration,
    stream_url: info.url,
    thumbnail: info.thumbnail,
  }
}

fn queue_from_info(info: InfoJson, url: &str) -> Result<MediaQueue, ResolveError> {
  let is_playlist = info.kind.as_deref() == Some("playlist")
    || info.entries.as_ref().is_some_and(|e| !e.is_empty());

  let queue = if is_playlist {
    let tracks = info
      .entries
      .unwrap_or_default()
      .into_iter()
      .flatten()
      .filter_map(|entry| {
        let source = entry.url.or(entry.webpage_url)?;
        Some(Track::new(
          entry.title.unwrap_or_else(|| "Unknown".to_string()),
          source,
        ))
      })
      .collect();
    MediaQueue {
      kind: MediaKind::Playlist,
      title: info.title,
      tracks,
    }
  } else {
    let title = info.title.clone().unwrap_or_else(|| "Unknown".to_string());
    MediaQueue {
      kind: MediaKind::Video,
      title: info.title,
      tracks: vec![Track::new(title, url)],
    }
  };

  if queue.tracks.is_empty() {
    return Err(ResolveError::NoTracks);
  }
  Ok(queue)
}
