//! CLI output formatting.
//!
//! Every `format_*` function is pure and returns the lines to print, so the
//! exact output is unit-tested without capturing stdout. The `print_*`
//! wrappers are the only place that writes to the terminal.
//!
//! # Output Format
//!
//! ## Convert
//!
//! ```text
//! [1/2] images/extra.png
//!     webp full: encoded q95 (2 attempts) → images/webp/extra.webp
//!     webp 576px: cached → images/webp/extra@576x413.webp
//!     avif full: skipped (capability-unavailable)
//! ```
//!
//! ## Plan
//!
//! ```text
//! images/extra.png (1200x860, 50000 bytes)
//!     webp full: encode (missing) → images/webp/extra.webp
//!     webp 1600px: skip (invalid-resize-target)
//! ```
//!
//! ## Capabilities
//!
//! ```text
//! webp: available
//! avif: unavailable
//! ```

use crate::convert::{ConversionEvent, ConversionPlan, ConversionResult, EntryStatus, PlanAction};
use crate::imaging::EncoderSet;
use crate::types::TargetFormat;
use std::path::Path;

fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `full` for the full-size derivative, `<w>px` otherwise.
fn width_label(width_key: u32) -> String {
    match width_key {
        0 => "full".to_string(),
        w => format!("{w}px"),
    }
}

fn entry_label(format: TargetFormat, width_key: u32) -> String {
    format!("{}{} {}", indent(1), format, width_label(width_key))
}

fn arrow(path: &Path) -> String {
    format!("\u{2192} {}", path.display())
}

// ============================================================================
// Convert
// ============================================================================

/// Lines for one converted source, without a progress prefix.
pub fn format_result(result: &ConversionResult) -> Vec<String> {
    let mut lines = vec![result.source.display().to_string()];
    lines.extend(format_entries(result));
    lines
}

fn format_entries(result: &ConversionResult) -> Vec<String> {
    result
        .entries
        .iter()
        .map(|entry| {
            let label = entry_label(entry.format, entry.width_key);
            let path = entry.outcome.usable_path();
            match (&entry.status, path) {
                (EntryStatus::Reused, Some(path)) => format!("{label}: cached {}", arrow(path)),
                (EntryStatus::Encoded { quality, attempts }, Some(path)) => {
                    let plural = if *attempts == 1 { "" } else { "s" };
                    format!(
                        "{label}: encoded q{quality} ({attempts} attempt{plural}) {}",
                        arrow(path)
                    )
                }
                (EntryStatus::Skipped(reason), _) => {
                    format!("{label}: skipped ({})", reason.label())
                }
                (_, None) => format!("{label}: no derivative"),
            }
        })
        .collect()
}

/// Lines for a batch progress event: `[position/total]` plus the result.
pub fn format_conversion_event(event: &ConversionEvent) -> Vec<String> {
    let mut lines = vec![format!(
        "[{}/{}] {}",
        event.position,
        event.total,
        event.result.source.display()
    )];
    lines.extend(format_entries(&event.result));
    lines
}

// ============================================================================
// Plan
// ============================================================================

pub fn format_plan(plan: &ConversionPlan) -> Vec<String> {
    let header = match (plan.dimensions, plan.byte_size) {
        (Some((w, h)), Some(bytes)) => {
            format!("{} ({w}x{h}, {bytes} bytes)", plan.source.display())
        }
        _ => plan.source.display().to_string(),
    };
    let mut lines = vec![header];
    for entry in &plan.entries {
        let label = entry_label(entry.format, entry.width_key);
        lines.push(match &entry.action {
            PlanAction::Reuse { path } => format!("{label}: reuse {}", arrow(path)),
            PlanAction::Encode { path, stale, .. } => {
                format!("{label}: encode ({stale}) {}", arrow(path))
            }
            PlanAction::Skip { reason } => format!("{label}: skip ({})", reason.label()),
        });
    }
    lines
}

pub fn print_plan(plan: &ConversionPlan) {
    for line in format_plan(plan) {
        println!("{}", line);
    }
}

// ============================================================================
// Capabilities
// ============================================================================

pub fn format_capabilities(encoders: &EncoderSet) -> Vec<String> {
    TargetFormat::ALL
        .iter()
        .map(|&format| {
            let state = if encoders.get(format).is_some() {
                "available"
            } else {
                "unavailable"
            };
            format!("{format}: {state}")
        })
        .collect()
}

pub fn print_capabilities(encoders: &EncoderSet) {
    for line in format_capabilities(encoders) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::{DerivativeEntry, PlannedDerivative};
    use crate::imaging::backend::tests::MockEncoder;
    use crate::imaging::{Encoder, ResizeTarget};
    use crate::types::{ConversionOutcome, SkipReason};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn entry(format: TargetFormat, width_key: u32, path: Option<&str>, status: EntryStatus) -> DerivativeEntry {
        let outcome = match (&status, path) {
            (EntryStatus::Skipped(reason), _) => ConversionOutcome::Skipped {
                reason: reason.clone(),
            },
            (_, Some(p)) => ConversionOutcome::Usable {
                path: PathBuf::from(p),
            },
            (_, None) => panic!("usable entry needs a path"),
        };
        DerivativeEntry {
            format,
            width_key,
            outcome,
            status,
        }
    }

    fn sample_result() -> ConversionResult {
        ConversionResult {
            source: PathBuf::from("images/extra.png"),
            entries: vec![
                entry(
                    TargetFormat::Webp,
                    0,
                    Some("images/webp/extra.webp"),
                    EntryStatus::Encoded {
                        quality: 95,
                        attempts: 2,
                    },
                ),
                entry(
                    TargetFormat::Webp,
                    576,
                    Some("images/webp/extra@576x413.webp"),
                    EntryStatus::Reused,
                ),
                entry(
                    TargetFormat::Avif,
                    0,
                    None,
                    EntryStatus::Skipped(SkipReason::CapabilityUnavailable),
                ),
            ],
        }
    }

    // =========================================================================
    // Convert
    // =========================================================================

    #[test]
    fn width_labels() {
        assert_eq!(width_label(0), "full");
        assert_eq!(width_label(576), "576px");
    }

    #[test]
    fn result_lines() {
        let lines = format_result(&sample_result());
        assert_eq!(
            lines,
            vec![
                "images/extra.png",
                "    webp full: encoded q95 (2 attempts) \u{2192} images/webp/extra.webp",
                "    webp 576px: cached \u{2192} images/webp/extra@576x413.webp",
                "    avif full: skipped (capability-unavailable)",
            ]
        );
    }

    #[test]
    fn single_attempt_is_singular() {
        let result = ConversionResult {
            source: PathBuf::from("a.png"),
            entries: vec![entry(
                TargetFormat::Avif,
                0,
                Some("avif/a.avif"),
                EntryStatus::Encoded {
                    quality: 100,
                    attempts: 1,
                },
            )],
        };
        assert_eq!(
            format_result(&result)[1],
            "    avif full: encoded q100 (1 attempt) \u{2192} avif/a.avif"
        );
    }

    #[test]
    fn event_has_progress_prefix() {
        let event = ConversionEvent {
            position: 3,
            total: 10,
            result: sample_result(),
        };
        let lines = format_conversion_event(&event);
        assert_eq!(lines[0], "[3/10] images/extra.png");
        assert_eq!(lines.len(), 4);
    }

    // =========================================================================
    // Plan
    // =========================================================================

    #[test]
    fn plan_lines() {
        let plan = ConversionPlan {
            source: PathBuf::from("images/extra.png"),
            dimensions: Some((1200, 860)),
            byte_size: Some(50000),
            entries: vec![
                PlannedDerivative {
                    format: TargetFormat::Webp,
                    width_key: 0,
                    action: PlanAction::Reuse {
                        path: PathBuf::from("images/webp/extra.webp"),
                    },
                },
                PlannedDerivative {
                    format: TargetFormat::Webp,
                    width_key: 576,
                    action: PlanAction::Encode {
                        path: PathBuf::from("images/webp/extra@576x413.webp"),
                        resize: Some(ResizeTarget {
                            width: 576,
                            height: 413,
                        }),
                        stale: "missing",
                    },
                },
                PlannedDerivative {
                    format: TargetFormat::Webp,
                    width_key: 1600,
                    action: PlanAction::Skip {
                        reason: SkipReason::InvalidResizeTarget,
                    },
                },
            ],
        };
        assert_eq!(
            format_plan(&plan),
            vec![
                "images/extra.png (1200x860, 50000 bytes)",
                "    webp full: reuse \u{2192} images/webp/extra.webp",
                "    webp 576px: encode (missing) \u{2192} images/webp/extra@576x413.webp",
                "    webp 1600px: skip (invalid-resize-target)",
            ]
        );
    }

    #[test]
    fn plan_header_without_source_details() {
        let plan = ConversionPlan {
            source: PathBuf::from("gone.png"),
            dimensions: None,
            byte_size: None,
            entries: Vec::new(),
        };
        assert_eq!(format_plan(&plan), vec!["gone.png"]);
    }

    // =========================================================================
    // Capabilities
    // =========================================================================

    #[test]
    fn capabilities_list_every_format() {
        let encoders = EncoderSet::from_encoders(vec![
            Arc::new(MockEncoder::new(TargetFormat::Webp, 1)) as Arc<dyn Encoder>,
            Arc::new(MockEncoder::unavailable(TargetFormat::Avif)) as Arc<dyn Encoder>,
        ]);
        assert_eq!(
            format_capabilities(&encoders),
            vec!["webp: available", "avif: unavailable"]
        );
    }
}
