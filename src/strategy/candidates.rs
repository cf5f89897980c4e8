//! Turning one frame into decode candidates
//!
//! Whole-frame, rotation and scale rules enhance the full frame once and
//! derive candidates from the result. Region rules crop first so the
//! enhancement only pays for the pixels that will be decoded.

use super::catalogue::{FanOut, Strategy};
use crate::enhance::apply_chain;
use crate::models::{CHANNELS, CandidateGeometry, DecodeCandidate, Frame, Point};
use image::imageops::{self, FilterType};
use image::{ImageBuffer, Rgba};
use rayon::prelude::*;
use std::sync::Arc;

/// Candidates of `strategy` for `frame`, in catalogue order
pub fn build_candidates(strategy: &Strategy, frame: &Arc<Frame>) -> Vec<DecodeCandidate> {
    if frame.is_empty() {
        return Vec::new();
    }
    match &strategy.fan_out {
        FanOut::Whole => vec![DecodeCandidate {
            frame: enhanced(strategy, frame),
            geometry: CandidateGeometry::default(),
            priority: 0,
            label: strategy.id.clone(),
        }],
        FanOut::Regions { regions } => regions
            .iter()
            .enumerate()
            .filter_map(|(i, region)| {
                let rect = region.value.to_pixels(frame.width(), frame.height());
                if rect.width == 0 || rect.height == 0 {
                    return None;
                }
                let crop = Arc::new(frame.crop(rect));
                Some(DecodeCandidate {
                    frame: enhanced(strategy, &crop),
                    geometry: CandidateGeometry {
                        region_offset: (rect.x, rect.y),
                        ..Default::default()
                    },
                    priority: region.priority,
                    label: if regions.len() == 1 {
                        strategy.id.clone()
                    } else {
                        format!("{}-{}", strategy.id, i)
                    },
                })
            })
            .collect(),
        FanOut::Rotations { angles } => {
            let base = enhanced(strategy, frame);
            let center = Point::new(base.width() as f32 / 2.0, base.height() as f32 / 2.0);
            angles
                .iter()
                .map(|angle| DecodeCandidate {
                    frame: Arc::new(rotate(&base, angle.value)),
                    geometry: CandidateGeometry {
                        rotation_degrees: angle.value,
                        rotation_center: center,
                        ..Default::default()
                    },
                    priority: angle.priority,
                    label: format!("{}{:+}", strategy.id, angle.value),
                })
                .collect()
        }
        FanOut::Scales { factors } => {
            let base = enhanced(strategy, frame);
            factors
                .iter()
                .filter_map(|factor| {
                    let scaled = resize(&base, factor.value)?;
                    Some(DecodeCandidate {
                        frame: Arc::new(scaled),
                        geometry: CandidateGeometry {
                            scale: factor.value,
                            ..Default::default()
                        },
                        priority: factor.priority,
                        label: format!("{}{}x", strategy.id, factor.value),
                    })
                })
                .collect()
        }
    }
}

fn enhanced(strategy: &Strategy, frame: &Arc<Frame>) -> Arc<Frame> {
    match apply_chain(frame, &strategy.steps) {
        Some(out) => Arc::new(out),
        None => Arc::clone(frame),
    }
}

/// Rotate about the frame center, keeping dimensions; uncovered pixels are white
///
/// Each output pixel samples the source bilinearly at its inverse-rotated
/// position.
pub fn rotate(frame: &Frame, degrees: f32) -> Frame {
    let width = frame.width() as usize;
    let height = frame.height() as usize;
    if width == 0 || height == 0 || degrees == 0.0 {
        return frame.clone();
    }
    let (sin, cos) = (-degrees).to_radians().sin_cos();
    let cx = width as f32 / 2.0;
    let cy = height as f32 / 2.0;
    let src = frame.pixels();
    let stride = frame.stride();

    let mut out = vec![255u8; src.len()];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let dy = y as f32 + 0.5 - cy;
        for x in 0..width {
            let dx = x as f32 + 0.5 - cx;
            let sx = dx * cos - dy * sin + cx - 0.5;
            let sy = dx * sin + dy * cos + cy - 0.5;
            let px = &mut row[x * CHANNELS..(x + 1) * CHANNELS];
            sample_bilinear(src, width, height, sx, sy, px);
        }
    });

    frame.derive(out)
}

fn sample_bilinear(src: &[u8], width: usize, height: usize, sx: f32, sy: f32, out: &mut [u8]) {
    if sx < 0.0 || sy < 0.0 || sx > (width - 1) as f32 || sy > (height - 1) as f32 {
        return;
    }
    let x0 = sx.floor() as usize;
    let y0 = sy.floor() as usize;
    let x1 = (x0 + 1).min(width - 1);
    let y1 = (y0 + 1).min(height - 1);
    let fx = sx - x0 as f32;
    let fy = sy - y0 as f32;
    let stride = width * CHANNELS;
    for c in 0..CHANNELS {
        let p00 = src[y0 * stride + x0 * CHANNELS + c] as f32;
        let p10 = src[y0 * stride + x1 * CHANNELS + c] as f32;
        let p01 = src[y1 * stride + x0 * CHANNELS + c] as f32;
        let p11 = src[y1 * stride + x1 * CHANNELS + c] as f32;
        let top = p00 + (p10 - p00) * fx;
        let bottom = p01 + (p11 - p01) * fx;
        out[c] = (top + (bottom - top) * fy).round().clamp(0.0, 255.0) as u8;
    }
}

/// Resize by `factor` with a triangle filter; `None` for non-positive factors
pub fn resize(frame: &Frame, factor: f32) -> Option<Frame> {
    if factor.is_nan() || factor <= 0.0 || frame.is_empty() {
        return None;
    }
    let width = ((frame.width() as f32 * factor).round() as u32).max(1);
    let height = ((frame.height() as f32 * factor).round() as u32).max(1);
    let view: ImageBuffer<Rgba<u8>, &[u8]> =
        ImageBuffer::from_raw(frame.width(), frame.height(), frame.pixels())?;
    let scaled = imageops::resize(&view, width, height, FilterType::Triangle);
    Some(frame.derive_sized(width, height, scaled.into_raw()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::strategy::catalogue::builtin;
    use std::time::Instant;

    fn frame(width: u32, height: u32) -> Arc<Frame> {
        let luma: Vec<u8> = (0..width * height).map(|i| (i % 251) as u8).collect();
        Arc::new(Frame::from_luma(width, height, &luma, Instant::now()).unwrap())
    }

    #[test]
    fn test_direct_shares_the_source_frame() {
        let source = frame(8, 8);
        let candidates = build_candidates(&builtin("direct").unwrap(), &source);
        assert_eq!(candidates.len(), 1);
        assert!(Arc::ptr_eq(&candidates[0].frame, &source));
    }

    #[test]
    fn test_quadrants_fan_out_with_offsets() {
        let candidates = build_candidates(&builtin("quadrants").unwrap(), &frame(100, 80));
        assert_eq!(candidates.len(), 4);
        let offsets: Vec<_> = candidates.iter().map(|c| c.geometry.region_offset).collect();
        assert_eq!(offsets[0], (0, 0));
        assert!(offsets[3].0 > 0 && offsets[3].1 > 0);
        assert!(candidates.iter().all(|c| c.priority == 1));
    }

    #[test]
    fn test_center_region_crops_half() {
        let candidates = build_candidates(&builtin("center-region").unwrap(), &frame(64, 48));
        let c = &candidates[0];
        assert_eq!((c.frame.width(), c.frame.height()), (32, 24));
        assert_eq!(c.geometry.region_offset, (16, 12));
        assert_eq!(c.label, "center-region");
    }

    #[test]
    fn test_rotations_keep_dimensions() {
        let candidates = build_candidates(&builtin("rotate").unwrap(), &frame(40, 30));
        assert_eq!(candidates.len(), 4);
        for c in &candidates {
            assert_eq!((c.frame.width(), c.frame.height()), (40, 30));
        }
        assert_eq!(candidates[0].label, "rotate+5");
        assert_eq!(candidates[3].label, "rotate-10");
    }

    #[test]
    fn test_scales_resize() {
        let candidates = build_candidates(&builtin("scale").unwrap(), &frame(40, 30));
        let sizes: Vec<_> = candidates
            .iter()
            .map(|c| (c.frame.width(), c.frame.height()))
            .collect();
        assert_eq!(sizes, vec![(20, 15), (60, 45), (80, 60)]);
    }

    #[test]
    fn test_rotate_zero_is_identity() {
        let source = frame(9, 7);
        assert_eq!(rotate(&source, 0.0), *source);
    }

    #[test]
    fn test_rotate_fills_corners_white() {
        let black = Frame::from_luma(20, 20, &[0; 400], Instant::now()).unwrap();
        let rotated = rotate(&black, 45.0);
        assert_eq!(rotated.pixel(0, 0)[0], 255);
        assert_eq!(rotated.pixel(10, 10)[0], 0);
    }

    #[test]
    fn test_empty_frame_has_no_candidates() {
        let empty = Arc::new(Frame::from_rgba(0, 0, Vec::new(), Instant::now()).unwrap());
        for id in ["direct", "quadrants", "rotate", "scale"] {
            assert!(build_candidates(&builtin(id).unwrap(), &empty).is_empty());
        }
    }
}
