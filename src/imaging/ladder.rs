//! Quality-ladder encoding of a single derivative.
//!
//! A derivative is only worth serving if it is smaller than its source. The
//! ladder encodes at the best quality first and steps down until the output
//! undercuts the source size or the floor is reached:
//!
//! ```text
//! q=100 → 61 KB ≥ 50 KB   retry
//! q=95  → 53 KB ≥ 50 KB   retry
//! q=90  → 47 KB <  50 KB  write, stamp mtime, done
//! ```
//!
//! Encodes happen in memory; only the winning attempt touches disk. It is
//! written to a temporary sibling, stamped with the source's modification
//! time, then renamed over the destination, so readers never observe a
//! half-written file and the timestamp contract holds from the moment the
//! file appears.

use super::backend::Encoder;
use super::params::{Quality, QualityLadder, ResizeTarget};
use super::rust_backend::{load_image, normalize, resample};
use super::source::SourceImage;
use crate::types::SkipReason;
use filetime::FileTime;
use image::DynamicImage;
use std::borrow::Cow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Everything needed to produce one derivative file.
pub struct EncodeJob<'a> {
    pub encoder: &'a dyn Encoder,
    pub source: &'a SourceImage,
    pub destination: &'a Path,
    pub resize: Option<ResizeTarget>,
    pub ladder: QualityLadder,
    /// Budget for the whole ladder, checked after each attempt.
    pub deadline: Option<Duration>,
}

/// What the ladder did for a derivative that was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LadderReport {
    pub quality: Quality,
    pub attempts: Vec<Quality>,
    pub byte_size: u64,
}

/// Decode a source and normalise it to 8-bit RGB/RGBA.
pub fn decode_source(path: &Path) -> Result<DynamicImage, SkipReason> {
    load_image(path)
        .map(normalize)
        .map_err(|e| SkipReason::EncodeFailure(e.to_string()))
}

/// Run the quality ladder for `job` over already-decoded `pixels`.
///
/// On success the destination holds a file strictly smaller than the source
/// whose mtime equals the source's. On [`SkipReason::NoSizeImprovement`] any
/// existing file at the destination is removed, since it cannot be valid
/// either.
pub fn encode_derivative(job: &EncodeJob<'_>, pixels: &DynamicImage) -> Result<LadderReport, SkipReason> {
    let prepared: Cow<'_, DynamicImage> = match job.resize {
        Some(target) => Cow::Owned(resample(pixels, target)),
        None => Cow::Borrowed(pixels),
    };

    let started = Instant::now();
    let mut attempts = Vec::with_capacity(job.ladder.max_attempts());

    for quality in job.ladder.steps() {
        let bytes = job
            .encoder
            .encode(&prepared, quality)
            .map_err(|e| SkipReason::EncodeFailure(e.to_string()))?;
        attempts.push(quality);

        if (bytes.len() as u64) < job.source.byte_size {
            write_atomically(job.destination, &bytes, job.source.modified_at)
                .map_err(|e| SkipReason::EncodeFailure(format!("{}: {e}", job.destination.display())))?;
            tracing::debug!(
                path = %job.destination.display(),
                quality = quality.value(),
                attempts = attempts.len(),
                bytes = bytes.len(),
                "derivative written"
            );
            return Ok(LadderReport {
                quality,
                attempts,
                byte_size: bytes.len() as u64,
            });
        }

        tracing::trace!(
            quality = quality.value(),
            bytes = bytes.len(),
            source_bytes = job.source.byte_size,
            "not smaller than source"
        );

        if job.deadline.is_some_and(|limit| started.elapsed() >= limit) {
            return Err(SkipReason::DeadlineExceeded);
        }
    }

    remove_orphan(job.destination);
    Err(SkipReason::NoSizeImprovement)
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// `<dest>.<pid>.<n>.tmp`. Unique per writer, within and across processes.
fn temp_path(dest: &Path) -> PathBuf {
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut name = dest.as_os_str().to_owned();
    name.push(format!(".{}.{n}.tmp", std::process::id()));
    PathBuf::from(name)
}

fn write_atomically(dest: &Path, bytes: &[u8], mtime: Option<SystemTime>) -> io::Result<()> {
    let tmp = temp_path(dest);
    let result = fs::write(&tmp, bytes)
        .and_then(|()| match mtime {
            Some(t) => filetime::set_file_mtime(&tmp, FileTime::from_system_time(t)),
            None => {
                tracing::warn!(path = %dest.display(), "source mtime unavailable; derivative will be regenerated next time");
                Ok(())
            }
        })
        .and_then(|()| fs::rename(&tmp, dest));
    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn remove_orphan(dest: &Path) {
    match fs::remove_file(dest) {
        Ok(()) => tracing::debug!(path = %dest.display(), "removed derivative that is not smaller than source"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %dest.display(), error = %e, "could not remove orphaned derivative"),
    }
}
