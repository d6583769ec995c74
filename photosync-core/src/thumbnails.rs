//! Downscaled JPEG renditions written to the derived-asset store.

use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageReader, RgbImage};
use photosync_model::{PhotoIdentity, ThumbnailSize};
use tokio::task::spawn_blocking;
use tracing::debug;

use crate::assets::{DerivedAssetKey, DerivedAssetStore};
use crate::error::{Result, SyncError};
use crate::metadata::read_capture_metadata;

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Clone)]
pub struct ThumbnailGenerator {
    store: Arc<dyn DerivedAssetStore>,
    quality: u8,
}

impl std::fmt::Debug for ThumbnailGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThumbnailGenerator")
            .field("quality", &self.quality)
            .finish_non_exhaustive()
    }
}

impl ThumbnailGenerator {
    pub fn new(store: Arc<dyn DerivedAssetStore>) -> Self {
        Self {
            store,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }

    pub fn with_quality(mut self, quality: u8) -> Self {
        self.quality = quality.clamp(1, 100);
        self
    }

    pub fn store(&self) -> &Arc<dyn DerivedAssetStore> {
        &self.store
    }

    /// Render every requested size for `identity` from `source` and store
    /// them. Re-running for the same identity overwrites in place.
    pub async fn generate(
        &self,
        identity: &PhotoIdentity,
        source: &Path,
        sizes: &[ThumbnailSize],
    ) -> Result<Vec<DerivedAssetKey>> {
        if sizes.is_empty() {
            return Ok(Vec::new());
        }

        let source_path = source.to_path_buf();
        let wanted = sizes.to_vec();
        let quality = self.quality;
        let rendered = spawn_blocking(move || {
            render_thumbnails(&source_path, &wanted, quality)
        })
        .await
        .map_err(|e| SyncError::Internal(format!("thumbnail task failed: {e}")))??;

        let mut keys = Vec::with_capacity(rendered.len());
        for (size, bytes) in rendered {
            keys.push(self.store.put(identity, size, bytes).await?);
        }
        debug!(
            identity = %identity.short(),
            variants = keys.len(),
            "generated thumbnails"
        );
        Ok(keys)
    }
}

fn render_thumbnails(
    source: &Path,
    sizes: &[ThumbnailSize],
    quality: u8,
) -> Result<Vec<(ThumbnailSize, Vec<u8>)>> {
    let decoded = ImageReader::open(source)
        .map_err(|e| SyncError::unreadable(source, e))?
        .with_guessed_format()
        .map_err(|e| SyncError::unreadable(source, e))?
        .decode()
        .map_err(|e| SyncError::invalid_image(source, e))?;

    let (orientation, _) = read_capture_metadata(source);
    let upright = apply_orientation(decoded, orientation).to_rgb8();

    sizes
        .iter()
        .map(|size| {
            encode_jpeg(&upright, size.max_edge(), quality).map(|bytes| (*size, bytes))
        })
        .collect()
}

/// Rotate/flip so the stored rendition displays upright.
pub fn apply_orientation(img: DynamicImage, orientation: u16) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.fliph().rotate270(),
        6 => img.rotate90(),
        7 => img.fliph().rotate90(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Dimensions that fit within `max_edge` on the long side, preserving aspect
/// ratio. Never upscales.
pub fn fit_within(width: u32, height: u32, max_edge: u32) -> (u32, u32) {
    let long = width.max(height);
    if long <= max_edge || long == 0 {
        return (width, height);
    }
    let scale = max_edge as f64 / long as f64;
    let w = ((width as f64) * scale).round().max(1.0) as u32;
    let h = ((height as f64) * scale).round().max(1.0) as u32;
    (w.min(max_edge), h.min(max_edge))
}

fn encode_jpeg(src: &RgbImage, max_edge: u32, quality: u8) -> Result<Vec<u8>> {
    let (target_w, target_h) = fit_within(src.width(), src.height(), max_edge);
    let resized;
    let pixels = if (target_w, target_h) == src.dimensions() {
        src
    } else {
        resized = image::imageops::resize(src, target_w, target_h, FilterType::Lanczos3);
        &resized
    };

    let mut out = Cursor::new(Vec::new());
    let mut encoder = JpegEncoder::new_with_quality(&mut out, quality);
    encoder
        .encode(pixels.as_raw(), target_w, target_h, ExtendedColorType::Rgb8)
        .map_err(|e| SyncError::Internal(format!("failed to encode thumbnail JPEG: {e}")))?;

    Ok(out.into_inner())
}
