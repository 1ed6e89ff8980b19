//! Background cover-art fetching.
//!
//! The control loop calls [`ArtFetcher::trigger`] on every track start. The
//! shared [`ArtState`] is cleared before the fetch task is spawned; the task
//! writes its result back under the same lock only if no newer fetch has
//! started since.

use std::path::PathBuf;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::media::{ArtMatrix, ThumbnailError, ThumbnailSource};

/// Cover art as seen by the dashboard.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArtState {
  pub pixels: Option<Vec<[u8; 3]>>,
  pub width: u32,
  pub height: u32,
  pub dominant: Option<[u8; 3]>,
  pub loading: bool,
  pub(crate) generation: u64,
}

/// Cover art shared between the fetch task (writer) and the renderer.
pub type SharedArt = Arc<Mutex<ArtState>>;

/// Notified by the control loop whenever a track starts.
pub trait ArtTrigger {
  /// Start fetching art for the media at `source`, discarding any older fetch.
  fn trigger(&mut self, source: &str);

  /// Cancel the running fetch, if any.
  fn cancel(&mut self) {}
}

/// No cover art.
impl ArtTrigger for () {
  fn trigger(&mut self, _source: &str) {}
}

impl<T: ArtTrigger> ArtTrigger for Option<T> {
  fn trigger(&mut self, source: &str) {
    if let Some(inner) = self {
      inner.trigger(source);
    }
  }

  fn cancel(&mut self) {
    if let Some(inner) = self {
      inner.cancel();
    }
  }
}

/// Spawns at most one live art fetch at a time.
pub struct ArtFetcher<T> {
  art: SharedArt,
  source: Arc<T>,
  size: u32,
  work_dir: PathBuf,
  generation: u64,
  cancel: Option<CancellationToken>,
}

impl<T: ThumbnailSource> ArtFetcher<T> {
  pub fn new(source: Arc<T>, size: u32, work_dir: PathBuf) -> Self {
    Self {
      art: SharedArt::default(),
      source,
      size,
      work_dir,
      generation: 0,
      cancel: None,
    }
  }

  /// Handle for readers of the art state.
  pub fn art(&self) -> SharedArt {
    self.art.clone()
  }
}

impl<T: ThumbnailSource> ArtTrigger for ArtFetcher<T> {
  fn trigger(&mut self, url: &str) {
    self.generation += 1;
    let generation = self.generation;

    {
      let mut art = self.art.lock();
      *art = ArtState {
        loading: true,
        generation,
        ..ArtState::default()
      };
    }

    if let Some(previous) = self.cancel.replace(CancellationToken::new()) {
      previous.cancel();
    }
    let Some(token) = self.cancel.clone() else {
      return;
    };

    let art = self.art.clone();
    let source = self.source.clone();
    let size = self.size;
    let url = url.to_string();
    let path = self.work_dir.join(format!(
      "musicalterm-cover-{}-{}.img",
      std::process::id(),
      generation
    ));

    tokio::spawn(async move {
      let result = tokio::select! {
        _ = token.cancelled() => {
          log::debug!("Art fetch {} cancelled", generation);
          let _ = tokio::fs::remove_file(&path).await;
          return;
        }
        result = fetch(source, &url, path.clone(), size) => result,
      };
      let _ = tokio::fs::remove_file(&path).await;

      let mut art = art.lock();
      if art.generation != generation {
        return;
      }
      match result {
        Ok(matrix) => {
          art.width = matrix.width;
          art.height = matrix.height;
          art.dominant = Some(matrix.dominant);
          art.pixels = Some(matrix.pixels);
        }
        Err(e) => log::debug!("No cover art: {}", e),
      }
      art.loading = false;
    });
  }

  fn cancel(&mut self) {
    if let Some(token) = self.cancel.take() {
      token.cancel();
    }
  }
}

async fn fetch<T: ThumbnailSource>(
  source: Arc<T>,
  url: &str,
  path: PathBuf,
  size: u32,
) -> Result<ArtMatrix, ThumbnailError> {
  source.download_thumbnail(url, &path).await?;
  tokio::task::spawn_blocking(move || source.decode_image_matrix(&path, size))
    .await
    .map_err(|e| ThumbnailError::Io(std::io::Error::other(e)))?
}
