//! Image processing: inspection, resize planning, and encoding.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::image_dimensions` (header only) |
//! | **Decode** | `image::ImageReader` |
//! | **Resample** | `resize_exact` with `Triangle` filter |
//! | **Encode → WebP** | `webp` crate (libwebp) |
//! | **Encode → AVIF** | `image::codecs::avif` (rav1e) |
//!
//! The module is split into:
//! - **Source**: [`SourceImage`] snapshots and [`inspect`]
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing what to encode
//! - **Backend**: [`Encoder`] trait, [`EncoderSet`], and the production encoders
//! - **Ladder**: the size-bounded quality search that writes derivatives

pub mod backend;
mod calculations;
pub mod ladder;
mod params;
pub mod rust_backend;
pub mod source;

pub use backend::{BackendError, Encoder, EncoderSet};
pub use calculations::{plan_resize, scaled_height, width_keys};
pub use ladder::{EncodeJob, LadderReport, decode_source, encode_derivative};
pub use params::{Quality, QualityLadder, ResizeTarget};
pub use rust_backend::{AvifEncoder, WebpEncoder};
pub use source::{SourceImage, inspect};
