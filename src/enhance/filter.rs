//! 3×3 neighbourhood filters
//!
//! Both filters touch interior pixels only; the one-pixel border and the
//! alpha channel pass through unchanged. Frames narrower or shorter than
//! three pixels come back as a plain copy.

use crate::models::{CHANNELS, Frame};
use rayon::prelude::*;

/// Sharpening kernel `[[0,-1,0],[-1,5,-1],[0,-1,0]]`
pub fn sharpen(frame: &Frame) -> Frame {
    let src = frame.pixels();
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride();
    let mut out = src.to_vec();
    if width < 3 || height < 3 {
        return frame.derive(out);
    }

    out.par_chunks_mut(stride)
        .enumerate()
        .skip(1)
        .take(height - 2)
        .for_each(|(y, row)| {
            for x in 1..width - 1 {
                let idx = y * stride + x * CHANNELS;
                for c in 0..3 {
                    let center = src[idx + c] as i32;
                    let up = src[idx - stride + c] as i32;
                    let down = src[idx + stride + c] as i32;
                    let left = src[idx - CHANNELS + c] as i32;
                    let right = src[idx + CHANNELS + c] as i32;
                    let v = 5 * center - up - down - left - right;
                    row[x * CHANNELS + c] = v.clamp(0, 255) as u8;
                }
            }
        });

    frame.derive(out)
}

/// Median of the 3×3 neighbourhood, per channel
pub fn denoise_median(frame: &Frame) -> Frame {
    let src = frame.pixels();
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    let stride = frame.stride();
    let mut out = src.to_vec();
    if width < 3 || height < 3 {
        return frame.derive(out);
    }

    out.par_chunks_mut(stride)
        .enumerate()
        .skip(1)
        .take(height - 2)
        .for_each(|(y, row)| {
            let mut window = [0u8; 9];
            for x in 1..width - 1 {
                for c in 0..3 {
                    let mut k = 0;
                    for dy in 0..3 {
                        let base = (y + dy - 1) * stride + (x - 1) * CHANNELS + c;
                        for dx in 0..3 {
                            window[k] = src[base + dx * CHANNELS];
                            k += 1;
                        }
                    }
                    window.sort_unstable();
                    row[x * CHANNELS + c] = window[4];
                }
            }
        });

    frame.derive(out)
}
