//! Media collaborator error types.

use thiserror::Error;

/// Errors that can occur while resolving a URL into tracks.
#[derive(Debug, Error)]
pub enum ResolveError {
  #[error("yt-dlp executable not found")]
  ResolverNotFound,

  #[error("failed to run yt-dlp: {0}")]
  Io(#[from] std::io::Error),

  #[error("yt-dlp failed: {0}")]
  Failed(String),

  #[error("yt-dlp timed out")]
  Timeout,

  #[error("unexpected yt-dlp output: {0}")]
  Json(#[from] serde_json::Error),

  #[error("no playable tracks found")]
  NoTracks,
}

/// Errors that can occur while fetching or decoding cover art.
#[derive(Debug, Error)]
pub enum ThumbnailError {
  #[error("could not resolve thumbnail: {0}")]
  Resolve(#[from] ResolveError),

  #[error("media has no thumbnail")]
  NoThumbnail,

  #[error("HTTP request failed: {0}")]
  Http(#[from] reqwest::Error),

  #[error("HTTP error: {0}")]
  HttpStatus(u16),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("image decode failed: {0}")]
  Image(#[from] image::ImageError),
}
