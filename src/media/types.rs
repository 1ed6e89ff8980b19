//! Media collaborator data types.

use crate::player::Track;

/// Whether a URL named a single video or a playlist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Video,
  Playlist,
}

/// Result of expanding a URL into a queue.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaQueue {
  pub kind: MediaKind,
  pub title: Option<String>,
  pub tracks: Vec<Track>,
}

/// A single resolved track with its direct stream address.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
  pub title: String,
  pub duration: Option<f64>,
  pub stream_url: Option<String>,
  pub thumbnail: Option<String>,
}

/// Square RGB pixel matrix of cover art.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtMatrix {
  /// Row-major pixels, `width * height` entries.
  pub pixels: Vec<[u8; 3]>,
  pub width: u32,
  pub height: u32,
  pub dominant: [u8; 3],
}
