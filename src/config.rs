//! Engine configuration.
//!
//! Handles loading, merging, and validating `derivatives.toml`. Stock
//! defaults are the base layer; a user file overrides only the keys it sets.
//!
//! ## Configuration Options
//!
//! ```toml
//! # All options are optional - defaults shown below
//!
//! force_recreate = false    # Re-encode even when derivatives are fresh
//! disabled = false          # Produce no derivatives at all
//!
//! [derivatives]
//! widths = []               # Extra widths to generate besides full size
//! formats = ["webp", "avif"]
//!
//! [output]
//! webp_dir = "webp"         # Sibling subdirectory for WebP files
//! avif_dir = "avif"         # Sibling subdirectory for AVIF files
//!
//! [quality]
//! start = 100               # First quality tried
//! step = 5                  # Decrement between attempts
//! floor = 70                # Lowest quality ever tried
//!
//! [processing]
//! max_processes = 4         # Max parallel workers (omit for auto = CPU cores)
//! encode_deadline_ms = 30000 # Per-derivative budget (omit for none)
//! ```
//!
//! Unknown keys are rejected to catch typos early.

use crate::imaging::QualityLadder;
use crate::types::TargetFormat;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// File name looked up by [`load_config`].
pub const CONFIG_FILENAME: &str = "derivatives.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Engine configuration loaded from `derivatives.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Re-encode every derivative regardless of freshness.
    pub force_recreate: bool,
    /// Short-circuit every request to "no derivatives".
    pub disabled: bool,
    pub derivatives: DerivativesConfig,
    pub output: OutputConfig,
    pub quality: QualityConfig,
    pub processing: ProcessingConfig,
}

/// Which derivatives are requested by default.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct DerivativesConfig {
    /// Widths (pixels) to generate in addition to the full-size derivative.
    pub widths: Vec<u32>,
    pub formats: Vec<TargetFormat>,
}

impl Default for DerivativesConfig {
    fn default() -> Self {
        Self {
            widths: Vec::new(),
            formats: TargetFormat::ALL.to_vec(),
        }
    }
}

/// Per-format output subdirectories, relative to each source's directory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    pub webp_dir: String,
    pub avif_dir: String,
}

impl OutputConfig {
    pub fn subdir(&self, format: TargetFormat) -> &str {
        match format {
            TargetFormat::Webp => &self.webp_dir,
            TargetFormat::Avif => &self.avif_dir,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            webp_dir: "webp".to_string(),
            avif_dir: "avif".to_string(),
        }
    }
}

/// Quality ladder bounds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct QualityConfig {
    pub start: u32,
    pub step: u32,
    pub floor: u32,
}

impl QualityConfig {
    pub fn ladder(&self) -> QualityLadder {
        QualityLadder::new(self.start, self.step, self.floor)
    }
}

impl Default for QualityConfig {
    fn default() -> Self {
        Self {
            start: 100,
            step: 5,
            floor: 70,
        }
    }
}

/// Parallel processing settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessingConfig {
    /// Maximum number of parallel conversion workers.
    /// When absent, defaults to the number of CPU cores.
    /// Values larger than the core count are clamped down.
    pub max_processes: Option<usize>,
    /// Time budget for one derivative's quality ladder, in milliseconds.
    pub encode_deadline_ms: Option<u64>,
}

impl ProcessingConfig {
    pub fn encode_deadline(&self) -> Option<Duration> {
        self.encode_deadline_ms.map(Duration::from_millis)
    }
}

/// Resolve the effective thread count from config.
///
/// - `None` → use all available cores
/// - `Some(n)` → use `min(n, cores)` (user can constrain down, not up)
pub fn effective_threads(config: &ProcessingConfig) -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    config
        .max_processes
        .map(|n| n.clamp(1, cores))
        .unwrap_or(cores)
}

impl EngineConfig {
    /// Validate config values are within acceptable ranges.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let q = &self.quality;
        if !(1..=100).contains(&q.start) || !(1..=100).contains(&q.floor) {
            return Err(ConfigError::Validation(
                "quality.start and quality.floor must be 1-100".into(),
            ));
        }
        if q.floor > q.start {
            return Err(ConfigError::Validation(
                "quality.floor must not exceed quality.start".into(),
            ));
        }
        if q.step == 0 {
            return Err(ConfigError::Validation(
                "quality.step must be at least 1".into(),
            ));
        }
        if self.derivatives.widths.contains(&0) {
            return Err(ConfigError::Validation(
                "derivatives.widths must be positive".into(),
            ));
        }
        for format in TargetFormat::ALL {
            let dir = crate::naming::normalize_subdir(self.output.subdir(format));
            if dir.is_empty() || dir.split('/').any(|part| part == "..") {
                return Err(ConfigError::Validation(format!(
                    "output.{format}_dir must be a non-empty name inside the source directory"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Config loading, merging, and validation
// =============================================================================

/// Returns the stock default config as a `toml::Value::Table`.
pub fn stock_defaults_value() -> Result<toml::Value, ConfigError> {
    toml::Value::try_from(EngineConfig::default())
        .map_err(|e| ConfigError::Validation(format!("default config must serialize: {e}")))
}

/// Recursively merge `overlay` on top of `base`.
///
/// - Tables are merged key-by-key (overlay keys override base keys).
/// - Non-table values in overlay replace base values entirely.
/// - Keys in base that are not in overlay are preserved.
pub fn merge_toml(base: toml::Value, overlay: toml::Value) -> toml::Value {
    match (base, overlay) {
        (toml::Value::Table(mut base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                let merged = match base_table.remove(&key) {
                    Some(base_val) => merge_toml(base_val, overlay_val),
                    None => overlay_val,
                };
                base_table.insert(key, merged);
            }
            toml::Value::Table(base_table)
        }
        (_, overlay) => overlay,
    }
}

/// Merge user TOML text over the stock defaults, then deserialize and validate.
pub fn parse_config(content: &str) -> Result<EngineConfig, ConfigError> {
    let overlay: toml::Value = toml::from_str(content)?;
    let merged = merge_toml(stock_defaults_value()?, overlay);
    let config: EngineConfig = merged.try_into()?;
    config.validate()?;
    Ok(config)
}

/// Load a config file. A missing file yields the stock defaults.
pub fn load_config_file(path: &Path) -> Result<EngineConfig, ConfigError> {
    if !path.exists() {
        return Ok(EngineConfig::default());
    }
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Load `derivatives.toml` from the given directory.
pub fn load_config(dir: &Path) -> Result<EngineConfig, ConfigError> {
    load_config_file(&dir.join(CONFIG_FILENAME))
}

/// Returns a fully-commented stock `derivatives.toml`.
///
/// Used by the `gen-config` CLI command.
pub fn stock_config_toml() -> &'static str {
    r##"# Image derivative configuration
# ==============================
# All settings are optional. Remove or comment out any you don't need.
# Values shown below are the defaults. Unknown keys cause an error.

# Re-encode every derivative even when an existing one is still valid.
force_recreate = false

# Produce no derivatives at all; callers fall back to the original image.
disabled = false

# ---------------------------------------------------------------------------
# Requested derivatives
# ---------------------------------------------------------------------------
[derivatives]
# Widths (pixels) generated in addition to the full-size derivative.
# Widths not strictly smaller than the source are skipped, never upscaled.
widths = []

# Target formats. Formats without a working encoder are skipped.
formats = ["webp", "avif"]

# ---------------------------------------------------------------------------
# Output layout
# ---------------------------------------------------------------------------
[output]
# Subdirectories created next to each source image.
webp_dir = "webp"
avif_dir = "avif"

# ---------------------------------------------------------------------------
# Quality ladder
# ---------------------------------------------------------------------------
[quality]
# Encoding starts at `start` and drops by `step` until the derivative is
# smaller than its source. Qualities below `floor` are never tried.
start = 100
step = 5
floor = 70

# ---------------------------------------------------------------------------
# Processing
# ---------------------------------------------------------------------------
[processing]
# Maximum parallel conversion workers.
# Omit or comment out to auto-detect (= number of CPU cores).
# max_processes = 4

# Time budget for one derivative's quality ladder, in milliseconds.
# encode_deadline_ms = 30000
"##
}
