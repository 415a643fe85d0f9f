//! Parameter types for derivative encoding.
//!
//! These structs describe *what* to produce, not *how*. They are the
//! interface between the orchestrator (which decides which derivatives are
//! needed) and the encoders (which do the pixel work).
//!
//! ## Types
//!
//! - [`Quality`]: lossy encoding quality (1–100). Clamped on construction.
//! - [`QualityLadder`]: the descending sequence of qualities tried until the
//!   output beats the source size (default 100, 95, …, 70).
//! - [`ResizeTarget`]: exact output dimensions for a resampled derivative.

use serde::Serialize;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct Quality(pub u32);

impl Quality {
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(100)
    }
}

/// Descending quality search bounds.
///
/// Iterating yields `start, start - step, …` and stops before dropping under
/// `floor`, so with the defaults the qualities tried are exactly
/// 100, 95, 90, 85, 80, 75, 70.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityLadder {
    pub start: Quality,
    pub step: u32,
    pub floor: Quality,
}

impl QualityLadder {
    pub fn new(start: u32, step: u32, floor: u32) -> Self {
        let start = Quality::new(start);
        Self {
            start,
            step: step.max(1),
            floor: Quality::new(floor).min(start),
        }
    }

    /// Qualities to attempt, best first. Never empty.
    pub fn steps(&self) -> impl Iterator<Item = Quality> + '_ {
        let floor = self.floor.value();
        std::iter::successors(Some(self.start.value()), move |q| {
            q.checked_sub(self.step).filter(|next| *next >= floor)
        })
        .map(Quality)
    }

    /// Upper bound on encode attempts for one derivative.
    pub fn max_attempts(&self) -> usize {
        ((self.start.value() - self.floor.value()) / self.step) as usize + 1
    }
}

impl Default for QualityLadder {
    fn default() -> Self {
        Self::new(100, 5, 70)
    }
}

/// Exact pixel dimensions of a resampled derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResizeTarget {
    pub width: u32,
    pub height: u32,
}
