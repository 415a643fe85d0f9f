//! Pure calculation functions for derivative dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

use super::params::ResizeTarget;
use crate::types::SkipReason;

/// Height for `target_width` that preserves the source aspect ratio.
///
/// Always rounds up: `ceil(source_height × target_width / source_width)`.
/// Rounding down drops a row on some photo sizes.
///
/// # Examples
/// ```
/// # use image_derivatives::imaging::scaled_height;
/// assert_eq!(scaled_height((1000, 700), 500), 350);
/// assert_eq!(scaled_height((1200, 860), 576), 413);
/// ```
pub fn scaled_height(source: (u32, u32), target_width: u32) -> u32 {
    let (src_w, src_h) = source;
    let numerator = u64::from(src_h) * u64::from(target_width);
    numerator.div_ceil(u64::from(src_w.max(1))) as u32
}

/// Plan a downscale to `target_width`.
///
/// Returns [`SkipReason::InvalidResizeTarget`] when `target_width` is not
/// strictly smaller than the source width: derivatives are never upscaled,
/// and a same-width request is the full-size derivative under another name.
pub fn plan_resize(source: (u32, u32), target_width: u32) -> Result<ResizeTarget, SkipReason> {
    if target_width == 0 || target_width >= source.0 {
        return Err(SkipReason::InvalidResizeTarget);
    }
    Ok(ResizeTarget {
        width: target_width,
        height: scaled_height(source, target_width),
    })
}

/// Width keys for a request: `0` (full size) followed by the requested
/// widths in ascending order, duplicates removed.
pub fn width_keys(widths: &[u32]) -> Vec<u32> {
    let mut keys: Vec<u32> = widths.iter().copied().filter(|w| *w > 0).collect();
    keys.sort_unstable();
    keys.dedup();
    keys.insert(0, 0);
    keys
}

#[cfg(test)]
mod tests {
    use super::*;

    // =========================================================================
    // scaled_height tests
    // =========================================================================

    #[test]
    fn halving_is_exact() {
        assert_eq!(scaled_height((1000, 700), 500), 350);
    }

    #[test]
    fn fractional_heights_round_up() {
        // 860 * 576 / 1200 = 412.8
        assert_eq!(scaled_height((1200, 860), 576), 413);
        // 860 * 768 / 1200 = 550.4
        assert_eq!(scaled_height((1200, 860), 768), 551);
        // 860 * 992 / 1200 = 710.93
        assert_eq!(scaled_height((1200, 860), 992), 711);
    }

    #[test]
    fn tiny_heights_never_round_to_zero() {
        assert_eq!(scaled_height((1000, 1), 10), 1);
    }

    #[test]
    fn large_dimensions_do_not_overflow() {
        assert_eq!(scaled_height((100_000, 80_000), 50_000), 40_000);
    }

    // =========================================================================
    // plan_resize tests
    // =========================================================================

    #[test]
    fn plan_resize_downscale() {
        assert_eq!(
            plan_resize((1000, 700), 500),
            Ok(ResizeTarget {
                width: 500,
                height: 350
            })
        );
    }

    #[test]
    fn plan_resize_rejects_same_width() {
        assert_eq!(
            plan_resize((1000, 700), 1000),
            Err(SkipReason::InvalidResizeTarget)
        );
    }

    #[test]
    fn plan_resize_rejects_upscale() {
        assert_eq!(
            plan_resize((1000, 700), 1400),
            Err(SkipReason::InvalidResizeTarget)
        );
    }

    #[test]
    fn plan_resize_portrait() {
        assert_eq!(
            plan_resize((600, 900), 400),
            Ok(ResizeTarget {
                width: 400,
                height: 600
            })
        );
    }

    // =========================================================================
    // width_keys tests
    // =========================================================================

    #[test]
    fn width_keys_full_size_first_then_sorted() {
        assert_eq!(width_keys(&[992, 576, 768]), vec![0, 576, 768, 992]);
    }

    #[test]
    fn width_keys_dedups() {
        assert_eq!(width_keys(&[576, 576]), vec![0, 576]);
    }

    #[test]
    fn width_keys_empty_is_full_size_only() {
        assert_eq!(width_keys(&[]), vec![0]);
    }
}
