//! Binarization of frames into pure black/white
//!
//! - Global: the frame's mean luma is the cutoff
//! - Local: per pixel, mean luma of a square neighbourhood minus a constant
//!
//! Output pixels are 0 or 255 in R, G and B; alpha passes through.

use super::grayscale::luma_plane;
use crate::models::{CHANNELS, Frame};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Cutoff policy for [`binary_threshold`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "mode")]
pub enum ThresholdMode {
    /// Mean luma of the whole frame
    Global,
    /// Mean luma of a `block`×`block` neighbourhood minus `c`
    Local {
        /// Neighbourhood edge length in pixels
        block: u32,
        /// Subtracted from the local mean
        c: i32,
    },
}

impl ThresholdMode {
    /// 25px neighbourhood, C = 10
    pub fn adaptive() -> Self {
        ThresholdMode::Local { block: 25, c: 10 }
    }
}

/// Binarize a frame; pixels at or below the cutoff become black
pub fn binary_threshold(frame: &Frame, mode: ThresholdMode) -> Frame {
    let gray = luma_plane(frame);
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    if gray.is_empty() {
        return frame.derive(frame.pixels().to_vec());
    }

    let black: Vec<bool> = match mode {
        ThresholdMode::Global => {
            let sum: u64 = gray.iter().map(|&v| v as u64).sum();
            let mean = (sum / gray.len() as u64) as u8;
            gray.par_iter().map(|&v| v < mean).collect()
        }
        ThresholdMode::Local { block, c } => local_mask(&gray, width, height, block, c),
    };

    let mut out = frame.pixels().to_vec();
    out.par_chunks_mut(CHANNELS)
        .zip(black.par_iter())
        .for_each(|(px, &is_black)| {
            let v = if is_black { 0 } else { 255 };
            px[0] = v;
            px[1] = v;
            px[2] = v;
        });

    frame.derive(out)
}

fn local_mask(gray: &[u8], width: usize, height: usize, block: u32, c: i32) -> Vec<bool> {
    let integral = integral_image(gray, width, height);
    let radius = (block.max(1) as usize) / 2;
    let iw = width + 1;

    let mut mask = vec![false; width * height];
    mask.par_chunks_mut(width).enumerate().for_each(|(y, row)| {
        let y0 = y.saturating_sub(radius);
        let y1 = (y + radius + 1).min(height);
        for (x, slot) in row.iter_mut().enumerate() {
            let x0 = x.saturating_sub(radius);
            let x1 = (x + radius + 1).min(width);
            let area = ((x1 - x0) * (y1 - y0)) as i64;
            let sum = integral[y1 * iw + x1] - integral[y0 * iw + x1] - integral[y1 * iw + x0]
                + integral[y0 * iw + x0];
            let cutoff = sum / area - c as i64;
            *slot = (gray[y * width + x] as i64) <= cutoff;
        }
    });
    mask
}

/// Summed-area table with a zero first row and column: `(width+1) × (height+1)`
fn integral_image(gray: &[u8], width: usize, height: usize) -> Vec<i64> {
    let iw = width + 1;
    let mut integral = vec![0i64; iw * (height + 1)];
    for y in 0..height {
        let mut row_sum = 0i64;
        for x in 0..width {
            row_sum += gray[y * width + x] as i64;
            integral[(y + 1) * iw + x + 1] = integral[y * iw + x + 1] + row_sum;
        }
    }
    integral
}

/// Otsu's optimal threshold for a luma plane
pub fn otsu_threshold(gray: &[u8]) -> u8 {
    // Build histogram
    let mut histogram = [0u64; 256];
    for &pixel in gray {
        histogram[pixel as usize] += 1;
    }

    let total = gray.len() as f64;
    if total == 0.0 {
        return 128;
    }
    let total_sum: f64 = histogram
        .iter()
        .enumerate()
        .map(|(i, &count)| i as f64 * count as f64)
        .sum();

    let mut class1_pixels = 0f64;
    let mut class1_sum = 0f64;
    let mut max_variance = 0.0;
    let mut optimal_threshold = 128u8;

    // Class 1 is every intensity strictly below `threshold`
    for threshold in 1..=255usize {
        let count = histogram[threshold - 1] as f64;
        class1_pixels += count;
        class1_sum += (threshold - 1) as f64 * count;

        let class2_pixels = total - class1_pixels;
        if class1_pixels == 0.0 || class2_pixels == 0.0 {
            continue;
        }

        let class1_mean = class1_sum / class1_pixels;
        let class2_mean = (total_sum - class1_sum) / class2_pixels;
        let weight1 = class1_pixels / total;
        let weight2 = class2_pixels / total;
        let variance = weight1 * weight2 * (class1_mean - class2_mean).powi(2);

        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = threshold as u8;
        }
    }

    optimal_threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    /// Horizontal brightness ramp: dark on the left, bright on the right
    fn gradient_frame(width: u32, height: u32) -> Frame {
        let mut luma = Vec::with_capacity((width * height) as usize);
        for _ in 0..height {
            for x in 0..width {
                luma.push((x * 255 / (width - 1)) as u8);
            }
        }
        Frame::from_luma(width, height, &luma, Instant::now()).unwrap()
    }

    #[test]
    fn test_global_threshold_splits_on_mean() {
        let frame = Frame::from_luma(4, 1, &[10, 20, 200, 210], Instant::now()).unwrap();
        let out = binary_threshold(&frame, ThresholdMode::Global);
        assert_eq!(out.pixel(0, 0)[0], 0);
        assert_eq!(out.pixel(1, 0)[0], 0);
        assert_eq!(out.pixel(2, 0)[0], 255);
        assert_eq!(out.pixel(3, 0)[0], 255);
    }

    #[test]
    fn test_local_threshold_differs_from_global_on_gradient() {
        let frame = gradient_frame(128, 32);
        let global = binary_threshold(&frame, ThresholdMode::Global);
        let local = binary_threshold(&frame, ThresholdMode::adaptive());
        assert_ne!(global.pixels(), local.pixels());
        // Global blackens the whole dark half; local keeps the smooth ramp white
        assert_eq!(global.pixel(10, 16)[0], 0);
        assert_eq!(local.pixel(10, 16)[0], 255);
    }

    #[test]
    fn test_local_threshold_finds_dark_mark_in_bright_area() {
        let mut luma = vec![220u8; 40 * 40];
        for y in 18..22 {
            for x in 18..22 {
                luma[y * 40 + x] = 150;
            }
        }
        let frame = Frame::from_luma(40, 40, &luma, Instant::now()).unwrap();
        let out = binary_threshold(&frame, ThresholdMode::adaptive());
        assert_eq!(out.pixel(20, 20)[0], 0);
        assert_eq!(out.pixel(2, 2)[0], 255);
    }

    #[test]
    fn test_threshold_keeps_alpha() {
        let frame = Frame::from_rgba(1, 1, vec![30, 30, 30, 42], Instant::now()).unwrap();
        let out = binary_threshold(&frame, ThresholdMode::Global);
        assert_eq!(out.pixel(0, 0)[3], 42);
    }

    #[test]
    fn test_otsu_threshold_two_classes() {
        let mut gray = vec![50u8; 50];
        gray.extend(vec![200u8; 50]);
        let t = otsu_threshold(&gray);
        assert!(t > 50 && t <= 200, "threshold {t}");
    }
}
