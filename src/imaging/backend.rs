//! Encoder capability trait and startup probing.
//!
//! The [`Encoder`] trait is the one seam between the conversion pipeline and
//! a concrete codec: encode a pixel buffer at a quality, report whether the
//! codec works in this runtime. [`EncoderSet`] is built once (usually via
//! [`EncoderSet::probe`]) and keeps only encoders that passed their
//! availability check, so a missing codec is a lookup miss at call time
//! rather than a failure halfway through an encode.
//!
//! The production implementations live in
//! [`rust_backend`](super::rust_backend).

use super::params::Quality;
use crate::types::TargetFormat;
use image::DynamicImage;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

/// A codec that can write one [`TargetFormat`].
pub trait Encoder: Send + Sync {
    /// Format this encoder produces.
    fn format(&self) -> TargetFormat;

    /// Whether the codec can run in this build/runtime.
    fn is_available(&self) -> bool;

    /// Encode `image` at `quality`, returning the encoded file bytes.
    fn encode(&self, image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError>;
}

/// Encoders that passed capability probing, at most one per format.
#[derive(Clone, Default)]
pub struct EncoderSet {
    encoders: Vec<Arc<dyn Encoder>>,
}

impl EncoderSet {
    /// Keep the available encoders from `candidates`. For duplicate formats
    /// the first available one wins.
    pub fn from_encoders(candidates: Vec<Arc<dyn Encoder>>) -> Self {
        let mut encoders: Vec<Arc<dyn Encoder>> = Vec::new();
        for candidate in candidates {
            if !candidate.is_available() {
                tracing::debug!(format = %candidate.format(), "encoder unavailable");
                continue;
            }
            if encoders.iter().all(|e| e.format() != candidate.format()) {
                encoders.push(candidate);
            }
        }
        Self { encoders }
    }

    /// Probe the built-in WebP and AVIF encoders.
    pub fn probe() -> Self {
        Self::from_encoders(super::rust_backend::builtin_encoders())
    }

    pub fn get(&self, format: TargetFormat) -> Option<&dyn Encoder> {
        self.encoders
            .iter()
            .find(|e| e.format() == format)
            .map(|e| e.as_ref())
    }

    pub fn available_formats(&self) -> Vec<TargetFormat> {
        self.encoders.iter().map(|e| e.format()).collect()
    }
}

impl std::fmt::Debug for EncoderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncoderSet")
            .field("formats", &self.available_formats())
            .finish()
    }
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Scripted encoder that records every call without touching a codec.
    /// Uses Mutex (not RefCell) so it is Sync and works with rayon's par_iter.
    ///
    /// The encoded length is `bytes_per_quality × quality`, which makes the
    /// quality ladder's stopping point easy to predict in tests.
    pub struct MockEncoder {
        pub format: TargetFormat,
        pub available: bool,
        pub bytes_per_quality: usize,
        pub fail: bool,
        pub calls: Mutex<Vec<RecordedEncode>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub struct RecordedEncode {
        pub width: u32,
        pub height: u32,
        pub quality: u32,
    }

    impl MockEncoder {
        pub fn new(format: TargetFormat, bytes_per_quality: usize) -> Self {
            Self {
                format,
                available: true,
                bytes_per_quality,
                fail: false,
                calls: Mutex::new(Vec::new()),
            }
        }

        pub fn unavailable(format: TargetFormat) -> Self {
            Self {
                available: false,
                ..Self::new(format, 1)
            }
        }

        pub fn failing(format: TargetFormat) -> Self {
            Self {
                fail: true,
                ..Self::new(format, 1)
            }
        }

        pub fn qualities(&self) -> Vec<u32> {
            self.calls.lock().unwrap().iter().map(|c| c.quality).collect()
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl Encoder for MockEncoder {
        fn format(&self) -> TargetFormat {
            self.format
        }

        fn is_available(&self) -> bool {
            self.available
        }

        fn encode(&self, image: &DynamicImage, quality: Quality) -> Result<Vec<u8>, BackendError> {
            self.calls.lock().unwrap().push(RecordedEncode {
                width: image.width(),
                height: image.height(),
                quality: quality.value(),
            });
            if self.fail {
                return Err(BackendError::ProcessingFailed("mock failure".into()));
            }
            Ok(vec![0u8; self.bytes_per_quality * quality.value() as usize])
        }
    }

    #[test]
    fn encoder_set_drops_unavailable_encoders() {
        let candidates: Vec<Arc<dyn Encoder>> = vec![
            Arc::new(MockEncoder::new(TargetFormat::Webp, 1)),
            Arc::new(MockEncoder::unavailable(TargetFormat::Avif)),
        ];
        let set = EncoderSet::from_encoders(candidates);
        assert!(set.get(TargetFormat::Webp).is_some());
        assert!(set.get(TargetFormat::Avif).is_none());
        assert_eq!(set.available_formats(), vec![TargetFormat::Webp]);
    }

    #[test]
    fn encoder_set_first_available_wins() {
        let candidates: Vec<Arc<dyn Encoder>> = vec![
            Arc::new(MockEncoder::unavailable(TargetFormat::Webp)),
            Arc::new(MockEncoder::new(TargetFormat::Webp, 7)),
            Arc::new(MockEncoder::new(TargetFormat::Webp, 9)),
        ];
        let set = EncoderSet::from_encoders(candidates);
        let encoder = set.get(TargetFormat::Webp).unwrap();
        let bytes = encoder
            .encode(&DynamicImage::new_rgb8(1, 1), Quality::new(1))
            .unwrap();
        assert_eq!(bytes.len(), 7);
    }

    #[test]
    fn mock_records_encodes() {
        let mock = MockEncoder::new(TargetFormat::Webp, 2);
        let img = DynamicImage::new_rgba8(30, 20);
        let bytes = mock.encode(&img, Quality::new(90)).unwrap();
        assert_eq!(bytes.len(), 180);
        assert_eq!(
            mock.calls.lock().unwrap()[0],
            RecordedEncode {
                width: 30,
                height: 20,
                quality: 90
            }
        );
    }
}
