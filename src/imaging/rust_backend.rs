//! Production encoders and pixel preparation.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (PNG, JPEG) | `image` crate (pure Rust decoders) |
//! | Alpha normalisation | `DynamicImage::to_rgba8` / `to_rgb8` |
//! | Resample | `DynamicImage::resize_exact` with `Triangle` (bilinear) filter |
//! | Encode → WebP | `webp` crate (libwebp, lossy at the requested quality) |
//! | Encode → AVIF | `image::codecs::avif::AvifEncoder` (rav1e, speed 6), `avif` feature |
//!
//! The `image` crate's own WebP encoder is lossless only, which would make a
//! quality ladder meaningless; libwebp is used for that reason.

use super::backend::{BackendError, Encoder};
use super::params::{Quality, ResizeTarget};
use crate::types::TargetFormat;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::path::Path;
use std::sync::{Arc, OnceLock};

/// rav1e speed preset. 6 keeps AVIF encodes tolerable; the ladder may run
/// several of them per derivative.
const AVIF_SPEED: u8 = 6;

/// Load and decode a source image from disk.
pub fn load_image(path: &Path) -> Result<DynamicImage, BackendError> {
    ImageReader::open(path)
        .map_err(BackendError::Io)?
        .with_guessed_format()
        .map_err(BackendError::Io)?
        .decode()
        .map_err(|e| {
            BackendError::ProcessingFailed(format!("Failed to decode {}: {}", path.display(), e))
        })
}

/// Convert any decoded layout to 8-bit RGB or RGBA.
///
/// Images carrying alpha (including palette PNGs with a `tRNS` chunk, which
/// the decoder expands) become RGBA8 so transparency survives the encode;
/// everything else becomes RGB8.
pub fn normalize(image: DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
        other if other.color().has_alpha() => DynamicImage::ImageRgba8(other.to_rgba8()),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Resample into a new buffer of exactly `target` pixels.
pub fn resample(image: &DynamicImage, target: ResizeTarget) -> DynamicImage {
    image.resize_exact(target.width, target.height, FilterType::Triangle)
}

/// Trial-encode a tiny image once and remember whether it worked.
fn probe_once(cell: &OnceLock<bool>, encoder: &dyn Encoder) -> bool {
    *cell.get_or_init(|| {
        let probe = DynamicImage::new_rgba8(2, 2);
        match encoder.encode(&probe, Quality::new(50)) {
            Ok(bytes) => !bytes.is_empty(),
            Err(e) => {
                tracing::warn!(format = %encoder.format(), error = %e, "encoder probe failed");
                false
            }
        }
    })
}

/// Lossy WebP through libwebp.
#[derive(Default)]
pub struct WebpEncoder {
    probed: OnceLock<bool>,
}

impl WebpEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for WebpEncoder {
    fn format(&self) -> TargetFormat {
        TargetFormat::Webp
    }

    fn is_available(&self) -> bool {
        probe_once(&self.probed, self)
    }

    fn encode(&self, image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
        let (width, height) = (image.width(), image.height());
        let memory = match image {
            DynamicImage::ImageRgba8(rgba) => {
                webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                    .encode_simple(false, quality.value() as f32)
            }
            DynamicImage::ImageRgb8(rgb) => {
                webp::Encoder::from_rgb(rgb.as_raw(), width, height)
                    .encode_simple(false, quality.value() as f32)
            }
            other => {
                let rgba = other.to_rgba8();
                webp::Encoder::from_rgba(rgba.as_raw(), width, height)
                    .encode_simple(false, quality.value() as f32)
            }
        }
        .map_err(|e| BackendError::ProcessingFailed(format!("WebP encode failed: {e:?}")))?;
        Ok(memory.to_vec())
    }
}

/// AVIF through rav1e (via the `image` crate).
#[derive(Default)]
pub struct AvifEncoder {
    probed: OnceLock<bool>,
}

impl AvifEncoder {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Encoder for AvifEncoder {
    fn format(&self) -> TargetFormat {
        TargetFormat::Avif
    }

    fn is_available(&self) -> bool {
        cfg!(feature = "avif") && probe_once(&self.probed, self)
    }

    #[cfg(feature = "avif")]
    fn encode(&self, image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
        let mut buf = Vec::new();
        let encoder = image::codecs::avif::AvifEncoder::new_with_speed_quality(
            &mut buf,
            AVIF_SPEED,
            quality.value() as u8,
        );
        image
            .write_with_encoder(encoder)
            .map_err(|e| BackendError::ProcessingFailed(format!("AVIF encode failed: {}", e)))?;
        Ok(buf)
    }

    #[cfg(not(feature = "avif"))]
    fn encode(&self, _image: &DynamicImage, _quality: Quality) -> Result<Vec<u8>, BackendError> {
        let _ = AVIF_SPEED;
        Err(BackendError::ProcessingFailed(
            "AVIF support not compiled in (enable the `avif` feature)".into(),
        ))
    }
}

/// Every encoder this build knows about, before probing.
pub fn builtin_encoders() -> Vec<Arc<dyn Encoder>> {
    vec![Arc::new(WebpEncoder::new()), Arc::new(AvifEncoder::new())]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{create_test_jpeg, noisy_rgb};
    use image::{GenericImageView, Rgba, RgbaImage};

    #[test]
    fn load_image_decodes_jpeg() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("test.jpg");
        create_test_jpeg(&path, 200, 150);

        let img = load_image(&path).unwrap();
        assert_eq!(img.dimensions(), (200, 150));
    }

    #[test]
    fn load_image_nonexistent_file_errors() {
        let result = load_image(Path::new("/nonexistent/image.jpg"));
        assert!(matches!(result, Err(BackendError::Io(_))));
    }

    #[test]
    fn load_image_corrupt_file_errors() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("bad.png");
        std::fs::write(&path, b"\x89PNG\r\n\x1a\nnot really").unwrap();
        assert!(matches!(
            load_image(&path),
            Err(BackendError::ProcessingFailed(_))
        ));
    }

    #[test]
    fn normalize_promotes_alpha_layouts_to_rgba8() {
        let mut la = image::GrayAlphaImage::new(2, 1);
        la.put_pixel(1, 0, image::LumaA([200, 255]));
        let img = normalize(DynamicImage::ImageLumaA8(la));
        let DynamicImage::ImageRgba8(rgba) = &img else {
            panic!("expected RGBA8, got {:?}", img.color());
        };
        assert_eq!(rgba.get_pixel(0, 0)[3], 0);
        assert_eq!(rgba.get_pixel(1, 0).0, [200, 200, 200, 255]);
    }

    #[test]
    fn normalize_drops_16_bit_to_8_bit() {
        let img = DynamicImage::new_rgb16(4, 4);
        assert!(matches!(normalize(img), DynamicImage::ImageRgb8(_)));
        let img = DynamicImage::new_luma_a8(4, 4);
        assert!(matches!(normalize(img), DynamicImage::ImageRgba8(_)));
    }

    #[test]
    fn resample_produces_exact_dimensions() {
        let img = DynamicImage::ImageRgb8(noisy_rgb(1000, 700));
        let out = resample(
            &img,
            ResizeTarget {
                width: 500,
                height: 350,
            },
        );
        assert_eq!(out.dimensions(), (500, 350));
    }

    #[test]
    fn webp_lower_quality_is_smaller() {
        let img = DynamicImage::ImageRgb8(noisy_rgb(128, 96));
        let encoder = WebpEncoder::new();
        let high = encoder.encode(&img, Quality::new(100)).unwrap();
        let low = encoder.encode(&img, Quality::new(70)).unwrap();
        assert!(low.len() < high.len());
        assert_eq!(&high[..4], b"RIFF");
        assert_eq!(&high[8..12], b"WEBP");
    }

    #[test]
    fn webp_preserves_transparency() {
        let mut rgba = RgbaImage::new(16, 16);
        rgba.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let encoder = WebpEncoder::new();
        let bytes = encoder
            .encode(&DynamicImage::ImageRgba8(rgba), Quality::new(90))
            .unwrap();

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert!(decoded.color().has_alpha());
        assert_eq!(decoded.to_rgba8().get_pixel(15, 15)[3], 0);
    }

    #[test]
    fn webp_encoder_is_available() {
        assert!(WebpEncoder::new().is_available());
    }

    #[cfg(feature = "avif")]
    #[test]
    fn avif_encode_small_image() {
        let img = DynamicImage::ImageRgb8(noisy_rgb(32, 24));
        let encoder = AvifEncoder::new();
        assert!(encoder.is_available());
        let bytes = encoder.encode(&img, Quality::new(80)).unwrap();
        assert_eq!(&bytes[4..8], b"ftyp");
    }

    #[cfg(not(feature = "avif"))]
    #[test]
    fn avif_unavailable_without_feature() {
        assert!(!AvifEncoder::new().is_available());
    }
}
