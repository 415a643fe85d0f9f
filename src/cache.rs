//! Derivative freshness checks.
//!
//! Encoding (AVIF especially) dominates conversion time, so an existing
//! derivative is reused whenever it is provably still valid. There is no
//! manifest or index file: the derivative's own metadata is the cache entry.
//!
//! # The timestamp contract
//!
//! Every derivative is written with its modification time set to the source's
//! modification time (see [`ladder`](crate::imaging::ladder)). Equality of the
//! two timestamps is the validity token: editing or replacing the source moves
//! its mtime and every derivative becomes stale, regardless of whether the
//! new mtime is older or newer.
//!
//! # Decision ladder
//!
//! [`check_freshness`] short-circuits in this order:
//!
//! 1. `force_recreate` → regenerate
//! 2. derivative missing → regenerate
//! 3. derivative not smaller than the source → regenerate (never serve a
//!    "derivative" that is no improvement)
//! 4. mtimes equal → reuse, without decoding any pixels
//! 5. anything else, including an unreadable timestamp on either side →
//!    regenerate

use crate::imaging::SourceImage;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

/// Metadata of a derivative file as found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivativeArtifact {
    pub path: PathBuf,
    pub byte_size: u64,
    pub modified_at: Option<SystemTime>,
}

impl DerivativeArtifact {
    /// Read the artifact's metadata; `None` if no regular file exists.
    pub fn stat(path: &Path) -> Option<Self> {
        let meta = std::fs::metadata(path).ok().filter(|m| m.is_file())?;
        Some(Self {
            path: path.to_path_buf(),
            byte_size: meta.len(),
            modified_at: meta.modified().ok(),
        })
    }
}

/// Why an existing derivative cannot be reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    Forced,
    Missing,
    NotSmaller,
    TimestampMismatch,
    TimestampUnreadable,
}

impl StaleReason {
    pub fn label(self) -> &'static str {
        match self {
            Self::Forced => "forced",
            Self::Missing => "missing",
            Self::NotSmaller => "not-smaller",
            Self::TimestampMismatch => "timestamp-mismatch",
            Self::TimestampUnreadable => "timestamp-unreadable",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    Fresh(DerivativeArtifact),
    Stale(StaleReason),
}

#[cfg(test)]
impl Freshness {
    pub(crate) fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }
}

/// Decide whether the derivative at `candidate` can be served as-is.
pub fn check_freshness(source: &SourceImage, candidate: &Path, force_recreate: bool) -> Freshness {
    if force_recreate {
        return Freshness::Stale(StaleReason::Forced);
    }
    let Some(artifact) = DerivativeArtifact::stat(candidate) else {
        return Freshness::Stale(StaleReason::Missing);
    };
    if artifact.byte_size >= source.byte_size {
        return Freshness::Stale(StaleReason::NotSmaller);
    }
    match (artifact.modified_at, source.modified_at) {
        (Some(derived), Some(original)) if derived == original => Freshness::Fresh(artifact),
        (Some(_), Some(_)) => Freshness::Stale(StaleReason::TimestampMismatch),
        _ => Freshness::Stale(StaleReason::TimestampUnreadable),
    }
}

/// Summary of cache performance for a conversion run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub reused: u32,
    pub encoded: u32,
    pub skipped: u32,
}

impl CacheStats {
    pub fn reuse(&mut self) {
        self.reused += 1;
    }

    pub fn encode(&mut self) {
        self.encoded += 1;
    }

    pub fn skip(&mut self) {
        self.skipped += 1;
    }

    pub fn merge(&mut self, other: CacheStats) {
        self.reused += other.reused;
        self.encoded += other.encoded;
        self.skipped += other.skipped;
    }

    pub fn total(&self) -> u32 {
        self.reused + self.encoded + self.skipped
    }
}

impl fmt::Display for CacheStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.reused > 0 || self.skipped > 0 {
            write!(
                f,
                "{} cached, {} encoded, {} skipped ({} total)",
                self.reused,
                self.encoded,
                self.skipped,
                self.total()
            )
        } else {
            write!(f, "{} encoded", self.encoded)
        }
    }
}
