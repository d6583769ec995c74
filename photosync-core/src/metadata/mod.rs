//! Image validation and structural metadata extraction.
//!
//! Extraction fully decodes the image: a file that only has a valid header
//! (for example one truncated mid-upload) is rejected as invalid rather than
//! admitted with bogus dimensions.

mod capture;

use std::io;
use std::path::Path;

use image::{ImageError, ImageReader};
use photosync_model::PhotoMetadata;
use tokio::task::spawn_blocking;
use tracing::trace;

use crate::error::{Result, SyncError};

pub use self::capture::read_capture_metadata;

#[derive(Debug, Clone, Default)]
pub struct MetadataExtractor;

impl MetadataExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Decode the image at `path` and read its dimensions, orientation and
    /// optional EXIF capture metadata.
    ///
    /// Fails with [`SyncError::InvalidImage`] when the bytes do not decode as
    /// a supported format and with [`SyncError::UnreadableFile`] when the file
    /// cannot be read.
    pub async fn extract(&self, path: &Path) -> Result<PhotoMetadata> {
        let path = path.to_path_buf();
        spawn_blocking(move || extract_blocking(&path))
            .await
            .map_err(|e| {
                SyncError::Internal(format!("metadata extraction task failed: {e}"))
            })?
    }
}

fn extract_blocking(path: &Path) -> Result<PhotoMetadata> {
    let reader = ImageReader::open(path)
        .map_err(|e| SyncError::unreadable(path, e))?
        .with_guessed_format()
        .map_err(|e| SyncError::unreadable(path, e))?;

    let format = reader
        .format()
        .ok_or_else(|| SyncError::invalid_image(path, "unrecognized image format"))?;

    let decoded = reader.decode().map_err(|e| decode_error(path, e))?;
    let (width, height) = (decoded.width(), decoded.height());
    if width == 0 || height == 0 {
        return Err(SyncError::invalid_image(path, "image has no pixels"));
    }

    let (orientation, capture) = read_capture_metadata(path);
    trace!(path = %path.display(), width, height, orientation, "extracted metadata");

    Ok(PhotoMetadata {
        width,
        height,
        orientation,
        format: format
            .extensions_str()
            .first()
            .copied()
            .unwrap_or("unknown")
            .to_string(),
        capture,
    })
}

/// A decoder hitting end-of-file means the content is truncated, which is a
/// property of the bytes rather than of the filesystem.
fn decode_error(path: &Path, err: ImageError) -> SyncError {
    match err {
        ImageError::IoError(io_err)
            if io_err.kind() != io::ErrorKind::UnexpectedEof =>
        {
            SyncError::unreadable(path, io_err)
        }
        other => SyncError::invalid_image(path, other),
    }
}
