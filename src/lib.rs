//! # Image Derivatives
//!
//! Generates next-gen (WebP, AVIF) derivatives of PNG and JPEG images, at full
//! size and at requested widths, and decides on every call whether an existing
//! derivative can be served as-is.
//!
//! Two guarantees hold for every derivative this crate reports as usable:
//!
//! - **Never larger**: it is strictly smaller than its source. A quality
//!   ladder (100, 95, …, 70) steps down until that holds, or gives up.
//! - **Never stale**: its modification time equals the source's. Any edit to
//!   the source moves the source mtime, and every derivative regenerates.
//!
//! Anything that goes wrong with one image degrades to "serve the original":
//! the result says *why* a derivative is missing, but nothing panics or
//! propagates an error for a bad file.
//!
//! # Pipeline
//!
//! ```text
//! inspect ─► plan resize ─► resolve path ─► fresh? ──yes──► reuse
//!                                             │
//!                                             no
//!                                             ▼
//!                              decode ─► resample ─► quality ladder ─► atomic write + mtime
//! ```
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`convert`] | Orchestrates a [`ConversionRequest`](convert::ConversionRequest) into a [`ConversionResult`](convert::ConversionResult); batch mode on rayon |
//! | [`imaging`] | Source inspection, resize math, encoders, and the quality ladder |
//! | [`cache`] | Freshness decision (the mtime contract) and cache statistics |
//! | [`naming`] | Derivative file names and per-format output directories |
//! | [`locks`] | Single-writer-per-destination guard |
//! | [`config`] | `derivatives.toml` loading, merging, and validation |
//! | [`types`] | Shared vocabulary: formats, skip reasons, outcomes |
//! | [`output`] | CLI output formatting |
//!
//! # Example
//!
//! ```no_run
//! use image_derivatives::convert::{ConversionRequest, Converter, ConverterOptions};
//! use image_derivatives::types::TargetFormat;
//!
//! let converter = Converter::new(ConverterOptions::default());
//! let request = ConversionRequest::new("/srv/www/images/extra.png")
//!     .with_root("/srv/www")
//!     .with_widths([576, 768, 992])
//!     .with_formats([TargetFormat::Webp]);
//!
//! let result = converter.convert(&request)?;
//! for (width, path) in result.usable(TargetFormat::Webp) {
//!     println!("{width}: {}", path.display());
//! }
//! # Ok::<(), image_derivatives::convert::RequestError>(())
//! ```

pub mod cache;
pub mod config;
pub mod convert;
pub mod imaging;
pub mod locks;
pub mod naming;
pub mod output;
pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
