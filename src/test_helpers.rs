//! Shared test utilities.
//!
//! Fixture writers produce real PNG/JPEG files on disk so inspection and
//! decoding run against genuine headers, and timestamp helpers let tests set
//! up the mtime contract without sleeping.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = TempDir::new().unwrap();
//! let path = tmp.path().join("photo.png");
//! create_test_png(&path, 120, 80);
//! set_mtime(&path, SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
//! ```

use crate::imaging::SourceImage;
use crate::types::SourceFormat;
use filetime::FileTime;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, RgbImage};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;
use std::time::SystemTime;

// =========================================================================
// Fixture images
// =========================================================================

/// Deterministic gradient with mild per-pixel noise.
///
/// Flat colours compress to almost nothing in every format; the noise keeps
/// encoded sizes realistic so the quality ladder has something to do.
pub fn noisy_rgb(width: u32, height: u32) -> RgbImage {
    let mut state: u32 = 0x9E37_79B9;
    RgbImage::from_fn(width, height, |x, y| {
        // xorshift32
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let noise = (state % 48) as u8;
        let r = ((x * 255) / width.max(1)) as u8;
        let g = ((y * 255) / height.max(1)) as u8;
        let b = (((x + y) * 127) / (width + height).max(1)) as u8;
        image::Rgb([
            r.saturating_add(noise),
            g.saturating_add(noise / 2),
            b.saturating_add(noise),
        ])
    })
}

/// Write a noisy RGB PNG of the given size.
pub fn create_test_png(path: &Path, width: u32, height: u32) {
    let img = noisy_rgb(width, height);
    let writer = BufWriter::new(File::create(path).unwrap());
    PngEncoder::new(writer)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
}

/// Write a noisy RGB JPEG (quality 90) of the given size.
pub fn create_test_jpeg(path: &Path, width: u32, height: u32) {
    let img = noisy_rgb(width, height);
    let writer = BufWriter::new(File::create(path).unwrap());
    JpegEncoder::new_with_quality(writer, 90)
        .write_image(img.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
}

// =========================================================================
// Timestamps
// =========================================================================

pub fn set_mtime(path: &Path, time: SystemTime) {
    filetime::set_file_mtime(path, FileTime::from_system_time(time)).unwrap();
}

pub fn mtime_of(path: &Path) -> SystemTime {
    std::fs::metadata(path).unwrap().modified().unwrap()
}

// =========================================================================
// Snapshots
// =========================================================================

/// A [`SourceImage`] that never touched the filesystem. Override
/// `byte_size` and `modified_at` with struct update syntax.
pub fn source_snapshot(path: &Path, width: u32, height: u32, format: SourceFormat) -> SourceImage {
    SourceImage {
        path: path.to_path_buf(),
        byte_size: 0,
        modified_at: None,
        width,
        height,
        format,
    }
}
