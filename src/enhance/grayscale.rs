/// Grayscale conversion for RGBA frames
/// Y = 0.299*R + 0.587*G + 0.114*B
/// Uses 16-bit fixed point: Y = (19595*R + 38470*G + 7471*B + 32768) >> 16
///
/// Rows are processed in parallel with rayon; alpha is carried through.
use crate::models::{CHANNELS, Frame};
use rayon::prelude::*;

/// Coefficients for grayscale conversion, scaled by 2^16 (they sum to 65536)
const COEF_R: u32 = 19595;
const COEF_G: u32 = 38470;
const COEF_B: u32 = 7471;

/// Luma of one RGB triple
#[inline]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    ((COEF_R * r as u32 + COEF_G * g as u32 + COEF_B * b as u32 + 32768) >> 16) as u8
}

/// Replace every pixel's RGB with its luma, keeping alpha
pub fn to_grayscale(frame: &Frame) -> Frame {
    let mut out = frame.pixels().to_vec();
    let stride = frame.stride();
    if stride == 0 {
        return frame.derive(out);
    }

    out.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(CHANNELS) {
            let y = luma(px[0], px[1], px[2]);
            px[0] = y;
            px[1] = y;
            px[2] = y;
        }
    });

    frame.derive(out)
}

/// Single-channel luma plane (1 byte per pixel), as decoders consume it
pub fn luma_plane(frame: &Frame) -> Vec<u8> {
    let width = frame.width() as usize;
    let pixel_count = width * frame.height() as usize;
    let mut gray = vec![0u8; pixel_count];
    if width == 0 {
        return gray;
    }

    gray.par_chunks_mut(width)
        .zip(frame.pixels().par_chunks(frame.stride()))
        .for_each(|(dst, src)| {
            for (d, px) in dst.iter_mut().zip(src.chunks_exact(CHANNELS)) {
                *d = luma(px[0], px[1], px[2]);
            }
        });

    gray
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn frame_rgba(width: u32, height: u32, pixels: Vec<u8>) -> Frame {
        Frame::from_rgba(width, height, pixels, Instant::now()).unwrap()
    }

    #[test]
    fn test_luma_extremes() {
        assert_eq!(luma(255, 255, 255), 255);
        assert_eq!(luma(0, 0, 0), 0);
        // Pure green dominates
        assert!(luma(0, 255, 0) > 140);
        // Pure blue is dark
        assert!(luma(0, 0, 255) < 40);
    }

    #[test]
    fn test_to_grayscale_keeps_alpha_and_dimensions() {
        let frame = frame_rgba(2, 1, vec![255, 0, 0, 10, 0, 0, 255, 200]);
        let gray = to_grayscale(&frame);
        assert_eq!((gray.width(), gray.height()), (2, 1));
        let [r, g, b, a] = gray.pixel(0, 0);
        assert_eq!((r, g, b, a), (76, 76, 76, 10));
        assert_eq!(gray.pixel(1, 0)[3], 200);
    }

    #[test]
    fn test_luma_plane_matches_luma() {
        let frame = frame_rgba(2, 2, vec![
            10, 20, 30, 255, 40, 50, 60, 255, 70, 80, 90, 255, 200, 100, 0, 255,
        ]);
        let plane = luma_plane(&frame);
        assert_eq!(plane.len(), 4);
        assert_eq!(plane[3], luma(200, 100, 0));
    }

    #[test]
    fn test_empty_frame() {
        let frame = frame_rgba(0, 0, Vec::new());
        assert!(to_grayscale(&frame).is_empty());
        assert!(luma_plane(&frame).is_empty());
    }
}
