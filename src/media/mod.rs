//! Media collaborators: URL resolution through yt-dlp and cover art.

mod error;
mod resolver;
mod thumbnail;
mod types;

pub use error::{ResolveError, ThumbnailError};
pub use resolver::{normalize_url, redact_url, MediaResolver, YtDlpResolver};
pub use thumbnail::{decode_image_matrix, HttpThumbnails, ThumbnailSource};
pub use types::{ArtMatrix, MediaKind, MediaQueue, ResolvedTrack};
