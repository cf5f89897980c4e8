use crate::models::{CHANNELS, Frame};
use rayon::prelude::*;

/// Contrast stretch around mid-gray:
/// `pixel' = clamp((pixel - 128) * factor + 128, 0, 255)` for R, G and B.
///
/// A factor above 1 pulls washed-out glare regions apart; below 1 flattens.
pub fn contrast_stretch(frame: &Frame, factor: f32) -> Frame {
    let lut = contrast_lut(factor);
    let mut out = frame.pixels().to_vec();
    let stride = frame.stride();
    if stride == 0 {
        return frame.derive(out);
    }

    out.par_chunks_mut(stride).for_each(|row| {
        for px in row.chunks_exact_mut(CHANNELS) {
            px[0] = lut[px[0] as usize];
            px[1] = lut[px[1] as usize];
            px[2] = lut[px[2] as usize];
        }
    });

    frame.derive(out)
}

fn contrast_lut(factor: f32) -> [u8; 256] {
    let mut lut = [0u8; 256];
    for (value, slot) in lut.iter_mut().enumerate() {
        let stretched = (value as f32 - 128.0) * factor + 128.0;
        *slot = stretched.round().clamp(0.0, 255.0) as u8;
    }
    lut
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    #[test]
    fn test_contrast_stretch_formula() {
        let frame = Frame::from_rgba(
            2,
            1,
            vec![100, 128, 200, 77, 0, 250, 140, 255],
            Instant::now(),
        )
        .unwrap();
        let out = contrast_stretch(&frame, 2.0);
        // (100-128)*2+128 = 72, 128 stays, (200-128)*2+128 = 272 -> 255
        assert_eq!(out.pixel(0, 0), [72, 128, 255, 77]);
        // 0 -> -128 -> 0, 250 -> 372 -> 255, 140 -> 152
        assert_eq!(out.pixel(1, 0), [0, 255, 152, 255]);
    }

    #[test]
    fn test_identity_factor() {
        let frame = Frame::from_rgba(1, 1, vec![13, 57, 211, 9], Instant::now()).unwrap();
        assert_eq!(contrast_stretch(&frame, 1.0), frame);
    }
}
