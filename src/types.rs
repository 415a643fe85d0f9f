//! Shared vocabulary used across every stage of a conversion.
//!
//! These types cross module boundaries (inspector → planner → encoder →
//! orchestrator) and are serialized by the CLI's `--json` output, so they
//! must stay small and self-describing.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Raster formats accepted as conversion sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Png,
    Jpeg,
}

impl SourceFormat {
    /// Detect the source format from the file extension (case-insensitive).
    ///
    /// Only `png`, `jpg` and `jpeg` are recognised; everything else is `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("png") {
            Some(Self::Png)
        } else if ext.eq_ignore_ascii_case("jpg") || ext.eq_ignore_ascii_case("jpeg") {
            Some(Self::Jpeg)
        } else {
            None
        }
    }
}

/// Next-gen formats a derivative can be written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetFormat {
    Webp,
    Avif,
}

impl TargetFormat {
    pub const ALL: [TargetFormat; 2] = [TargetFormat::Webp, TargetFormat::Avif];

    /// File extension written for this format.
    pub fn extension(self) -> &'static str {
        match self {
            Self::Webp => "webp",
            Self::Avif => "avif",
        }
    }

    /// Parse a user-supplied format name (`"webp"`, `"AVIF"`, ...).
    pub fn parse(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|f| f.extension().eq_ignore_ascii_case(name.trim()))
    }
}

impl fmt::Display for TargetFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Why a derivative was not produced.
///
/// Every variant degrades to "serve the original image"; they are kept
/// distinct so logs and stats can tell them apart.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SkipReason {
    #[error("source file does not exist")]
    MissingSource,
    #[error("source file is empty")]
    EmptySource,
    #[error("source format is not PNG or JPEG")]
    UnsupportedFormat,
    #[error("requested width is not smaller than the source width")]
    InvalidResizeTarget,
    #[error("no encoder available for this format")]
    CapabilityUnavailable,
    #[error("encoding failed: {0}")]
    EncodeFailure(String),
    #[error("no quality step produced a file smaller than the source")]
    NoSizeImprovement,
    #[error("could not create output directory: {0}")]
    DirectoryCreationFailure(String),
    #[error("encoding exceeded its deadline")]
    DeadlineExceeded,
    #[error("derivatives are disabled")]
    Disabled,
}

impl SkipReason {
    /// Stable, machine-friendly label for logs and CLI output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::MissingSource => "missing-source",
            Self::EmptySource => "empty-source",
            Self::UnsupportedFormat => "unsupported-format",
            Self::InvalidResizeTarget => "invalid-resize-target",
            Self::CapabilityUnavailable => "capability-unavailable",
            Self::EncodeFailure(_) => "encode-failure",
            Self::NoSizeImprovement => "no-size-improvement",
            Self::DirectoryCreationFailure(_) => "directory-creation-failure",
            Self::DeadlineExceeded => "deadline-exceeded",
            Self::Disabled => "disabled",
        }
    }

    /// Skips that follow from the request itself rather than from a fault.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Self::InvalidResizeTarget
                | Self::Disabled
                | Self::UnsupportedFormat
                | Self::CapabilityUnavailable
        )
    }
}

/// Result of converting one (format, width) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ConversionOutcome {
    Usable { path: PathBuf },
    Skipped { reason: SkipReason },
}

impl ConversionOutcome {
    pub fn usable_path(&self) -> Option<&Path> {
        match self {
            Self::Usable { path } => Some(path),
            Self::Skipped { .. } => None,
        }
    }

    pub fn skip_reason(&self) -> Option<&SkipReason> {
        match self {
            Self::Usable { .. } => None,
            Self::Skipped { reason } => Some(reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_format_from_extension_is_case_insensitive() {
        assert_eq!(SourceFormat::from_path(Path::new("a.png")), Some(SourceFormat::Png));
        assert_eq!(SourceFormat::from_path(Path::new("a.PNG")), Some(SourceFormat::Png));
        assert_eq!(SourceFormat::from_path(Path::new("a.Jpg")), Some(SourceFormat::Jpeg));
        assert_eq!(SourceFormat::from_path(Path::new("a.JPEG")), Some(SourceFormat::Jpeg));
    }

    #[test]
    fn source_format_rejects_other_extensions() {
        assert_eq!(SourceFormat::from_path(Path::new("a.gif")), None);
        assert_eq!(SourceFormat::from_path(Path::new("a.webp")), None);
        assert_eq!(SourceFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn target_format_parse_and_extension() {
        assert_eq!(TargetFormat::parse("webp"), Some(TargetFormat::Webp));
        assert_eq!(TargetFormat::parse(" AVIF "), Some(TargetFormat::Avif));
        assert_eq!(TargetFormat::parse("png"), None);
        assert_eq!(TargetFormat::Avif.extension(), "avif");
        assert_eq!(TargetFormat::Webp.to_string(), "webp");
    }

    #[test]
    fn skip_reason_labels_are_distinct() {
        let reasons = [
            SkipReason::MissingSource,
            SkipReason::EmptySource,
            SkipReason::UnsupportedFormat,
            SkipReason::InvalidResizeTarget,
            SkipReason::CapabilityUnavailable,
            SkipReason::EncodeFailure("x".into()),
            SkipReason::NoSizeImprovement,
            SkipReason::DirectoryCreationFailure("x".into()),
            SkipReason::DeadlineExceeded,
            SkipReason::Disabled,
        ];
        let mut labels: Vec<&str> = reasons.iter().map(|r| r.label()).collect();
        labels.sort();
        labels.dedup();
        assert_eq!(labels.len(), reasons.len());
    }

    #[test]
    fn outcome_accessors() {
        let usable = ConversionOutcome::Usable {
            path: PathBuf::from("webp/a.webp"),
        };
        assert_eq!(usable.usable_path(), Some(Path::new("webp/a.webp")));
        assert_eq!(usable.skip_reason(), None);

        let skipped = ConversionOutcome::Skipped {
            reason: SkipReason::EmptySource,
        };
        assert_eq!(skipped.usable_path(), None);
        assert_eq!(skipped.skip_reason(), Some(&SkipReason::EmptySource));
    }
}
