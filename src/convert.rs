//! Conversion orchestration.
//!
//! Composes inspection, resize planning, path resolution, freshness checks,
//! and the quality ladder into one call per source image:
//!
//! ```text
//! ConversionRequest ──► inspect source ──► for each format:
//!                                            encoder probed available?
//!                                            for each width-key (0 = full size):
//!                                              plan resize → resolve path → lock
//!                                              fresh? reuse : decode once → ladder
//!                                        ──► ConversionResult
//! ```
//!
//! Nothing here fails the caller for a bad image. Every problem with the
//! source or with one derivative becomes a [`SkipReason`] on that entry, and
//! the caller serves the original image instead. Only a malformed request
//! (a width of zero) is rejected outright with [`RequestError`].
//!
//! Independent requests run on the rayon pool via
//! [`Converter::convert_batch`]. Requests that share a destination file are
//! serialised by [`PathLocks`], keyed on the canonical destination so that
//! `img/a.png` and `img/sub/../a.png` contend. The second request observes
//! the first one's finished file and reuses it.

use crate::cache::{CacheStats, Freshness, check_freshness};
use crate::config::{EngineConfig, OutputConfig};
use crate::imaging::{
    EncodeJob, Encoder, EncoderSet, QualityLadder, ResizeTarget, SourceImage, decode_source,
    encode_derivative, inspect, plan_resize, width_keys,
};
use crate::locks::PathLocks;
use crate::naming::{canonical_destination, derivative_path, relative_to, resolve_derivative_path};
use crate::types::{ConversionOutcome, SkipReason, TargetFormat};
use image::DynamicImage;
use rayon::prelude::*;
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::Sender;
use std::time::Duration;
use thiserror::Error;

/// A request the caller should never have made.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RequestError {
    #[error("requested width must be positive (source: {0})")]
    ZeroWidth(PathBuf),
}

/// Derivatives wanted for one source image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Absolute path of the source image.
    pub source: PathBuf,
    /// When set, usable paths are returned relative to this directory.
    pub root: Option<PathBuf>,
    /// Extra widths. The full-size derivative is always requested.
    pub widths: Vec<u32>,
    pub formats: Vec<TargetFormat>,
    pub force_recreate: bool,
    pub disabled: bool,
}

impl ConversionRequest {
    /// Full-size WebP and AVIF for `source`.
    pub fn new(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            root: None,
            widths: Vec::new(),
            formats: TargetFormat::ALL.to_vec(),
            force_recreate: false,
            disabled: false,
        }
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = Some(root.into());
        self
    }

    pub fn with_widths(mut self, widths: impl IntoIterator<Item = u32>) -> Self {
        self.widths = widths.into_iter().collect();
        self
    }

    pub fn with_formats(mut self, formats: impl IntoIterator<Item = TargetFormat>) -> Self {
        self.formats = formats.into_iter().collect();
        self
    }

    pub fn with_force_recreate(mut self, force: bool) -> Self {
        self.force_recreate = force;
        self
    }

    pub fn with_disabled(mut self, disabled: bool) -> Self {
        self.disabled = disabled;
        self
    }

    fn validate(&self) -> Result<(), RequestError> {
        if self.widths.contains(&0) {
            return Err(RequestError::ZeroWidth(self.source.clone()));
        }
        Ok(())
    }

    /// Requested formats in order, duplicates dropped.
    fn target_formats(&self) -> Vec<TargetFormat> {
        let mut formats = Vec::with_capacity(self.formats.len());
        for format in &self.formats {
            if !formats.contains(format) {
                formats.push(*format);
            }
        }
        formats
    }
}

/// How one entry was resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EntryStatus {
    /// An existing derivative was still valid; nothing was decoded.
    Reused,
    /// Written by the quality ladder.
    Encoded { quality: u32, attempts: usize },
    Skipped(SkipReason),
}

/// One (format, width-key) cell of a [`ConversionResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DerivativeEntry {
    pub format: TargetFormat,
    /// `0` is the full-size derivative.
    pub width_key: u32,
    pub outcome: ConversionOutcome,
    pub status: EntryStatus,
}

impl DerivativeEntry {
    fn usable(format: TargetFormat, width_key: u32, path: PathBuf, status: EntryStatus) -> Self {
        Self {
            format,
            width_key,
            outcome: ConversionOutcome::Usable { path },
            status,
        }
    }

    fn skipped(format: TargetFormat, width_key: u32, reason: SkipReason) -> Self {
        Self {
            format,
            width_key,
            outcome: ConversionOutcome::Skipped {
                reason: reason.clone(),
            },
            status: EntryStatus::Skipped(reason),
        }
    }
}

/// Everything produced for one request. No state survives between calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionResult {
    pub source: PathBuf,
    pub entries: Vec<DerivativeEntry>,
}

impl ConversionResult {
    /// Width-key → usable path for `format`. Skipped entries are absent;
    /// the caller falls back to the original for those.
    pub fn usable(&self, format: TargetFormat) -> BTreeMap<u32, PathBuf> {
        self.entries
            .iter()
            .filter(|e| e.format == format)
            .filter_map(|e| {
                e.outcome
                    .usable_path()
                    .map(|p| (e.width_key, p.to_path_buf()))
            })
            .collect()
    }

    pub fn entry(&self, format: TargetFormat, width_key: u32) -> Option<&DerivativeEntry> {
        self.entries
            .iter()
            .find(|e| e.format == format && e.width_key == width_key)
    }

    pub fn stats(&self) -> CacheStats {
        let mut stats = CacheStats::default();
        for entry in &self.entries {
            match entry.status {
                EntryStatus::Reused => stats.reuse(),
                EntryStatus::Encoded { .. } => stats.encode(),
                EntryStatus::Skipped(_) => stats.skip(),
            }
        }
        stats
    }

    fn skip_all(
        request: &ConversionRequest,
        formats: &[TargetFormat],
        keys: &[u32],
        reason: SkipReason,
    ) -> Self {
        let entries = formats
            .iter()
            .flat_map(|&format| {
                keys.iter()
                    .map(move |&key| (format, key))
            })
            .map(|(format, key)| DerivativeEntry::skipped(format, key, reason.clone()))
            .collect();
        Self {
            source: request.source.clone(),
            entries,
        }
    }
}

/// Progress notification sent once per finished request in a batch.
#[derive(Debug, Clone)]
pub struct ConversionEvent {
    /// 1-based completion order.
    pub position: usize,
    pub total: usize,
    pub result: ConversionResult,
}

/// Results of [`Converter::convert_batch`], in request order.
#[derive(Debug)]
pub struct BatchResult {
    pub results: Vec<ConversionResult>,
    pub cache_stats: CacheStats,
}

/// What a conversion would do for one entry, computed without writing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum PlanAction {
    Reuse {
        path: PathBuf,
    },
    Encode {
        path: PathBuf,
        /// `None` for the full-size derivative.
        resize: Option<ResizeTarget>,
        stale: &'static str,
    },
    Skip {
        reason: SkipReason,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedDerivative {
    pub format: TargetFormat,
    pub width_key: u32,
    pub action: PlanAction,
}

/// Dry run of a [`ConversionRequest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversionPlan {
    pub source: PathBuf,
    /// Source pixel dimensions, when the source could be inspected.
    pub dimensions: Option<(u32, u32)>,
    pub byte_size: Option<u64>,
    pub entries: Vec<PlannedDerivative>,
}

/// Instance-level settings shared by every request.
#[derive(Debug, Clone)]
pub struct ConverterOptions {
    pub output: OutputConfig,
    pub ladder: QualityLadder,
    /// Budget for one derivative's quality ladder.
    pub deadline: Option<Duration>,
    /// OR'ed with each request's own flag.
    pub force_recreate: bool,
    /// OR'ed with each request's own flag.
    pub disabled: bool,
}

impl ConverterOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            output: config.output.clone(),
            ladder: config.quality.ladder(),
            deadline: config.processing.encode_deadline(),
            force_recreate: config.force_recreate,
            disabled: config.disabled,
        }
    }
}

impl Default for ConverterOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// The conversion engine. Cheap to share across threads by reference.
#[derive(Debug)]
pub struct Converter {
    encoders: EncoderSet,
    options: ConverterOptions,
    locks: PathLocks,
}

impl Converter {
    /// Probe the built-in encoders once and keep the ones that work.
    pub fn new(options: ConverterOptions) -> Self {
        Self::with_encoders(EncoderSet::probe(), options)
    }

    pub fn with_encoders(encoders: EncoderSet, options: ConverterOptions) -> Self {
        Self {
            encoders,
            options,
            locks: PathLocks::new(),
        }
    }

    pub fn encoders(&self) -> &EncoderSet {
        &self.encoders
    }

    pub fn options(&self) -> &ConverterOptions {
        &self.options
    }

    /// Produce or reuse every derivative `request` asks for.
    pub fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult, RequestError> {
        request.validate()?;
        Ok(self.run(request))
    }

    /// Convert independent requests in parallel on the rayon pool.
    ///
    /// All requests are validated before any work starts. When `events` is
    /// given, one [`ConversionEvent`] is sent per finished request.
    pub fn convert_batch(
        &self,
        requests: &[ConversionRequest],
        events: Option<Sender<ConversionEvent>>,
    ) -> Result<BatchResult, RequestError> {
        for request in requests {
            request.validate()?;
        }

        let total = requests.len();
        let finished = AtomicUsize::new(0);
        let results: Vec<ConversionResult> = requests
            .par_iter()
            .map(|request| {
                let result = self.run(request);
                if let Some(tx) = &events {
                    let position = finished.fetch_add(1, Ordering::Relaxed) + 1;
                    // A dropped receiver only means nobody is watching.
                    let _ = tx.send(ConversionEvent {
                        position,
                        total,
                        result: result.clone(),
                    });
                }
                result
            })
            .collect();

        let mut cache_stats = CacheStats::default();
        for result in &results {
            cache_stats.merge(result.stats());
        }
        Ok(BatchResult {
            results,
            cache_stats,
        })
    }

    /// Report what [`convert`](Self::convert) would do, touching nothing.
    pub fn plan(&self, request: &ConversionRequest) -> Result<ConversionPlan, RequestError> {
        request.validate()?;
        let formats = request.target_formats();
        let keys = width_keys(&request.widths);

        let skip_all = |reason: SkipReason| -> Vec<PlannedDerivative> {
            formats
                .iter()
                .flat_map(|&format| keys.iter().map(move |&key| (format, key)))
                .map(|(format, width_key)| PlannedDerivative {
                    format,
                    width_key,
                    action: PlanAction::Skip {
                        reason: reason.clone(),
                    },
                })
                .collect()
        };

        if self.options.disabled || request.disabled {
            return Ok(ConversionPlan {
                source: request.source.clone(),
                dimensions: None,
                byte_size: None,
                entries: skip_all(SkipReason::Disabled),
            });
        }
        let source = match inspect(&request.source) {
            Ok(source) => source,
            Err(reason) => {
                return Ok(ConversionPlan {
                    source: request.source.clone(),
                    dimensions: None,
                    byte_size: None,
                    entries: skip_all(reason),
                });
            }
        };

        let force = self.options.force_recreate || request.force_recreate;
        let mut entries = Vec::with_capacity(formats.len() * keys.len());
        for &format in &formats {
            let available = self.encoders.get(format).is_some();
            for &width_key in &keys {
                let action = if available {
                    self.plan_one(&source, format, width_key, force)
                } else {
                    PlanAction::Skip {
                        reason: SkipReason::CapabilityUnavailable,
                    }
                };
                entries.push(PlannedDerivative {
                    format,
                    width_key,
                    action,
                });
            }
        }

        Ok(ConversionPlan {
            source: request.source.clone(),
            dimensions: Some(source.dimensions()),
            byte_size: Some(source.byte_size),
            entries,
        })
    }

    fn plan_one(
        &self,
        source: &SourceImage,
        format: TargetFormat,
        width_key: u32,
        force: bool,
    ) -> PlanAction {
        let resize = match width_key {
            0 => None,
            width => match plan_resize(source.dimensions(), width) {
                Ok(target) => Some(target),
                Err(reason) => return PlanAction::Skip { reason },
            },
        };
        let path = derivative_path(&source.path, self.options.output.subdir(format), format, resize);
        match check_freshness(source, &path, force) {
            Freshness::Fresh(_) => PlanAction::Reuse { path },
            Freshness::Stale(reason) => PlanAction::Encode {
                path,
                resize,
                stale: reason.label(),
            },
        }
    }

    fn run(&self, request: &ConversionRequest) -> ConversionResult {
        let formats = request.target_formats();
        let keys = width_keys(&request.widths);

        if self.options.disabled || request.disabled {
            tracing::debug!(source = %request.source.display(), "derivatives disabled");
            return ConversionResult::skip_all(request, &formats, &keys, SkipReason::Disabled);
        }

        let source = match inspect(&request.source) {
            Ok(source) => source,
            Err(reason) => {
                log_source_skip(&request.source, &reason);
                return ConversionResult::skip_all(request, &formats, &keys, reason);
            }
        };

        let force = self.options.force_recreate || request.force_recreate;
        let root = request.root.as_deref();
        // Decoded lazily on the first stale entry, then shared by the rest.
        let mut pixels: Option<Result<DynamicImage, SkipReason>> = None;
        let mut entries = Vec::with_capacity(formats.len() * keys.len());

        for format in formats {
            let Some(encoder) = self.encoders.get(format) else {
                tracing::debug!(
                    source = %source.path.display(),
                    format = %format,
                    "no encoder available"
                );
                entries.extend(
                    keys.iter()
                        .map(|&key| DerivativeEntry::skipped(format, key, SkipReason::CapabilityUnavailable)),
                );
                continue;
            };

            for &key in &keys {
                let entry = match self.derive(&source, encoder, key, force, &mut pixels) {
                    Ok((path, status)) => {
                        DerivativeEntry::usable(format, key, relative_to(&path, root), status)
                    }
                    Err(reason) => {
                        log_entry_skip(&source, format, key, &reason);
                        DerivativeEntry::skipped(format, key, reason)
                    }
                };
                entries.push(entry);
            }
        }

        ConversionResult {
            source: request.source.clone(),
            entries,
        }
    }

    /// Resolve a single derivative, returning its absolute path.
    fn derive(
        &self,
        source: &SourceImage,
        encoder: &dyn Encoder,
        width_key: u32,
        force: bool,
        pixels: &mut Option<Result<DynamicImage, SkipReason>>,
    ) -> Result<(PathBuf, EntryStatus), SkipReason> {
        let format = encoder.format();
        let resize = match width_key {
            0 => None,
            width => Some(plan_resize(source.dimensions(), width)?),
        };
        let destination =
            resolve_derivative_path(&source.path, self.options.output.subdir(format), format, resize)?;

        let _guard = self.locks.acquire(&canonical_destination(&destination));

        match check_freshness(source, &destination, force) {
            Freshness::Fresh(_) => {
                tracing::debug!(path = %destination.display(), "derivative is fresh");
                return Ok((destination, EntryStatus::Reused));
            }
            Freshness::Stale(reason) => {
                tracing::debug!(path = %destination.display(), reason = reason.label(), "derivative is stale");
            }
        }

        let decoded = pixels
            .get_or_insert_with(|| decode_source(&source.path))
            .as_ref()
            .map_err(Clone::clone)?;

        let job = EncodeJob {
            encoder,
            source,
            destination: &destination,
            resize,
            ladder: self.options.ladder,
            deadline: self.options.deadline,
        };
        let report = encode_derivative(&job, decoded)?;
        tracing::info!(
            path = %destination.display(),
            quality = report.quality.value(),
            bytes = report.byte_size,
            source_bytes = source.byte_size,
            "encoded derivative"
        );
        Ok((
            destination,
            EntryStatus::Encoded {
                quality: report.quality.value(),
                attempts: report.attempts.len(),
            },
        ))
    }
}

fn log_source_skip(source: &Path, reason: &SkipReason) {
    if reason.is_expected() {
        tracing::debug!(source = %source.display(), reason = reason.label(), "source skipped");
    } else {
        tracing::warn!(source = %source.display(), reason = reason.label(), "source skipped: {reason}");
    }
}

fn log_entry_skip(source: &SourceImage, format: TargetFormat, width_key: u32, reason: &SkipReason) {
    if reason.is_expected() || *reason == SkipReason::NoSizeImprovement {
        tracing::debug!(
            source = %source.path.display(),
            format = %format,
            width_key,
            reason = reason.label(),
            "derivative skipped"
        );
    } else {
        tracing::warn!(
            source = %source.path.display(),
            format = %format,
            width_key,
            reason = reason.label(),
            "derivative skipped: {reason}"
        );
    }
}
