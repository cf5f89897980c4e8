//! Pixel-buffer enhancement transforms
//!
//! Every transform here is pure, `O(width·height)`, and returns a new frame
//! with the same width, height and alpha as its input:
//! - Grayscale conversion (BT.601 luma)
//! - Contrast stretch around mid-gray
//! - 3×3 sharpen and median denoise
//! - Global and adaptive (local mean) binarization

pub mod filter;
pub mod grayscale;
pub mod threshold;
pub mod tone;

pub use filter::{denoise_median, sharpen};
pub use grayscale::{luma, luma_plane, to_grayscale};
pub use threshold::{ThresholdMode, binary_threshold, otsu_threshold};
pub use tone::contrast_stretch;

use crate::models::Frame;
use serde::{Deserialize, Serialize};

/// One step of an enhancement chain
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "op")]
pub enum Enhancement {
    /// [`to_grayscale`]
    Grayscale,
    /// [`contrast_stretch`] with the given factor
    Contrast {
        /// Stretch factor
        factor: f32,
    },
    /// [`sharpen`]
    Sharpen,
    /// [`denoise_median`]
    Denoise,
    /// [`binary_threshold`]
    Threshold {
        /// Cutoff policy
        mode: ThresholdMode,
    },
}

impl Enhancement {
    /// Apply this step
    pub fn apply(&self, frame: &Frame) -> Frame {
        match *self {
            Enhancement::Grayscale => to_grayscale(frame),
            Enhancement::Contrast { factor } => contrast_stretch(frame, factor),
            Enhancement::Sharpen => sharpen(frame),
            Enhancement::Denoise => denoise_median(frame),
            Enhancement::Threshold { mode } => binary_threshold(frame, mode),
        }
    }
}

/// Apply a chain of steps in order; an empty chain returns `None` so callers
/// can share the source frame instead of copying it
pub fn apply_chain(frame: &Frame, steps: &[Enhancement]) -> Option<Frame> {
    let (first, rest) = steps.split_first()?;
    let mut current = first.apply(frame);
    for step in rest {
        current = step.apply(&current);
    }
    Some(current)
}
