//! Canonical names and locations for derivative files.
//!
//! Derivatives live in a per-format subdirectory next to their source:
//!
//! ```text
//! images/
//! ├── extra.png
//! ├── webp/
//! │   ├── extra.webp              # full size
//! │   ├── extra@576x413.webp      # resized: <stem>@<width>x<height>.<ext>
//! │   └── extra@992x711.webp
//! └── avif/
//!     └── extra.avif
//! ```
//!
//! The file name encodes the exact output dimensions, so a derivative for a
//! different width can never be mistaken for this one.

use crate::imaging::ResizeTarget;
use crate::types::{SkipReason, TargetFormat};
use std::path::{Path, PathBuf};

/// Directory mode for created format subdirectories (readable and listable
/// by the web server user).
#[cfg(unix)]
const DIR_MODE: u32 = 0o755;

/// File name for a derivative: `<stem>.<ext>` or `<stem>@<w>x<h>.<ext>`.
pub fn derivative_file_name(
    stem: &str,
    format: TargetFormat,
    resize: Option<ResizeTarget>,
) -> String {
    match resize {
        Some(ResizeTarget { width, height }) => {
            format!("{stem}@{width}x{height}.{}", format.extension())
        }
        None => format!("{stem}.{}", format.extension()),
    }
}

/// Normalise a configured subdirectory name (`"/webp"` and `"webp/"` both
/// become `"webp"`).
pub fn normalize_subdir(subdir: &str) -> &str {
    subdir.trim_matches('/')
}

/// Path of the derivative for `source`, without touching the filesystem.
pub fn derivative_path(
    source: &Path,
    subdir: &str,
    format: TargetFormat,
    resize: Option<ResizeTarget>,
) -> PathBuf {
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let dir = source.parent().unwrap_or(Path::new(""));
    dir.join(normalize_subdir(subdir))
        .join(derivative_file_name(&stem, format, resize))
}

/// Compute the derivative path and make sure its directory exists.
///
/// A failure here only affects this one derivative; it surfaces as
/// [`SkipReason::DirectoryCreationFailure`].
pub fn resolve_derivative_path(
    source: &Path,
    subdir: &str,
    format: TargetFormat,
    resize: Option<ResizeTarget>,
) -> Result<PathBuf, SkipReason> {
    let path = derivative_path(source, subdir, format, resize);
    if let Some(dir) = path.parent() {
        create_output_dir(dir)
            .map_err(|e| SkipReason::DirectoryCreationFailure(format!("{}: {e}", dir.display())))?;
    }
    Ok(path)
}

fn create_output_dir(dir: &Path) -> std::io::Result<()> {
    if dir.is_dir() {
        return Ok(());
    }
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(DIR_MODE);
    }
    builder.create(dir)
}

/// The destination with its directory resolved through symlinks and `..`, so
/// aliases of one file map to one key. Falls back to `path` when the
/// directory cannot be resolved.
pub fn canonical_destination(path: &Path) -> PathBuf {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    std::fs::canonicalize(dir)
        .map(|dir| dir.join(name))
        .unwrap_or_else(|_| path.to_path_buf())
}

/// Express `path` relative to `root` when it lives under it.
pub fn relative_to(path: &Path, root: Option<&Path>) -> PathBuf {
    root.and_then(|r| path.strip_prefix(r).ok())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| path.to_path_buf())
}
