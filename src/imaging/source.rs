//! Read-only snapshot of a source image.
//!
//! A [`SourceImage`] is taken once at the start of a conversion request and
//! dropped when the request ends. Its `modified_at` is the cache-validity
//! token every derivative is stamped with.

use crate::types::{SkipReason, SourceFormat};
use image::ImageReader;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceImage {
    pub path: PathBuf,
    pub byte_size: u64,
    /// `None` when the filesystem could not report a modification time.
    pub modified_at: Option<SystemTime>,
    pub width: u32,
    pub height: u32,
    pub format: SourceFormat,
}

impl SourceImage {
    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Snapshot `path`, checking in the order a caller can act on:
/// format, existence, emptiness, then pixel dimensions.
///
/// Dimensions come from the image header only; pixels are not decoded here.
pub fn inspect(path: &Path) -> Result<SourceImage, SkipReason> {
    let format = SourceFormat::from_path(path).ok_or(SkipReason::UnsupportedFormat)?;

    let meta = match std::fs::metadata(path) {
        Ok(meta) if meta.is_file() => meta,
        _ => return Err(SkipReason::MissingSource),
    };
    if meta.len() == 0 {
        return Err(SkipReason::EmptySource);
    }

    // Content sniffing, same as the decoder.
    let (width, height) = ImageReader::open(path)
        .and_then(|reader| reader.with_guessed_format())
        .map_err(|e| SkipReason::EncodeFailure(format!("failed to open: {e}")))?
        .into_dimensions()
        .map_err(|e| SkipReason::EncodeFailure(format!("failed to read dimensions: {e}")))?;

    Ok(SourceImage {
        path: path.to_path_buf(),
        byte_size: meta.len(),
        modified_at: meta.modified().ok(),
        width,
        height,
        format,
    })
}
