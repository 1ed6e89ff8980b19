//! Cover art download and pixel-matrix extraction.

use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use image::imageops::{self, FilterType};
use image::RgbImage;
use reqwest::Client;
use tokio::io::AsyncWriteExt;

use super::error::ThumbnailError;
use super::resolver::{redact_url, MediaResolver};
use super::types::ArtMatrix;

/// Colour used when no pixel qualifies as dominant.
const FALLBACK_DOMINANT: [u8; 3] = [214, 214, 214];
/// Side length of the downsample used for the dominant colour.
const DOMINANT_SAMPLE: u32 = 50;

/// Source of cover art for a track.
pub trait ThumbnailSource: Send + Sync + 'static {
  /// Fetch the thumbnail of the media at `url` into `path`.
  fn download_thumbnail(
    &self,
    url: &str,
    path: &Path,
  ) -> impl Future<Output = Result<(), ThumbnailError>> + Send;

  /// Decode an image file into a `size x size` matrix. Blocking.
  fn decode_image_matrix(&self, path: &Path, size: u32) -> Result<ArtMatrix, ThumbnailError> {
    decode_image_matrix(path, size)
  }
}

/// [`ThumbnailSource`] that looks the thumbnail up through a resolver and
/// downloads it over HTTP.
pub struct HttpThumbnails<R> {
  http: Client,
  resolver: Arc<R>,
}

impl<R: MediaResolver> HttpThumbnails<R> {
  pub fn new(resolver: Arc<R>) -> Result<Self, ThumbnailError> {
    let http = Client::builder().timeout(Duration::from_secs(10)).build()?;
    Ok(Self { http, resolver })
  }
}

impl<R: MediaResolver> ThumbnailSource for HttpThumbnails<R> {
  async fn download_thumbnail(&self, url: &str, path: &Path) -> Result<(), ThumbnailError> {
    let resolved = self.resolver.resolve(url).await?;
    let thumbnail = resolved.thumbnail.ok_or(ThumbnailError::NoThumbnail)?;
    log::debug!("Downloading thumbnail {}", redact_url(&thumbnail));

    let response = self.http.get(&thumbnail).send().await?;
    if !response.status().is_success() {
      return Err(ThumbnailError::HttpStatus(response.status().as_u16()));
    }

    let mut file = tokio::fs::File::create(path).await?;
    let mut body = response.bytes_stream();
    while let Some(chunk) = body.next().await {
      file.write_all(&chunk?).await?;
    }
    file.flush().await?;
    Ok(())
  }
}

/// Decode `path` into an RGB matrix resized to `size x size`.
pub fn decode_image_matrix(path: &Path, size: u32) -> Result<ArtMatrix, ThumbnailError> {
  let size = size.max(1);
  let bytes = std::fs::read(path)?;
  let image = image::load_from_memory(&bytes)?.to_rgb8();
  let dominant = dominant_color(&image);
  let resized = imageops::resize(&image, size, size, FilterType::Lanczos3);

  Ok(ArtMatrix {
    pixels: resized.pixels().map(|p| p.0).collect(),
    width: resized.width(),
    height: resized.height(),
    dominant,
  })
}

/// Most frequent colour of a small downsample, skipping near-black and
/// near-white pixels.
fn dominant_color(image: &RgbImage) -> [u8; 3] {
  let sample = imageops::resize(image, DOMINANT_SAMPLE, DOMINANT_SAMPLE, FilterType::Triangle);
  let mut counts: HashMap<[u8; 3], usize> = HashMap::new();

  for pixel in sample.pixels() {
    let [r, g, b] = pixel.0;
    let sum = r as u32 + g as u32 + b as u32;
    if sum > 30 && sum < 700 {
      *counts.entry(pixel.0).or_default() += 1;
    }
  }

  counts
    .into_iter()
    .max_by_key(|(rgb, count)| (*count, *rgb))
    .map(|(rgb, _)| rgb)
    .unwrap_or(FALLBACK_DOMINANT)
}
