use super::{DecodeBackend, Decoded};
use crate::enhance::{luma_plane, otsu_threshold};
use crate::models::{DecodeCandidate, Point};
use rqrr::PreparedImage;

/// Smallest edge that can hold a version 1 symbol
const MIN_EDGE: u32 = 21;

/// How the candidate is handed to rqrr
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binarization {
    /// Let rqrr threshold the luma plane itself
    Greyscale,
    /// Binarise with Otsu's threshold first
    Otsu,
}

/// Pure-software QR backend built on `rqrr`
#[derive(Debug, Clone)]
pub struct RqrrBackend {
    id: String,
    binarization: Binarization,
}

impl RqrrBackend {
    /// Backend with the id `rqrr` or `rqrr-otsu`
    pub fn new(binarization: Binarization) -> Self {
        let id = match binarization {
            Binarization::Greyscale => "rqrr",
            Binarization::Otsu => "rqrr-otsu",
        };
        Self {
            id: id.to_string(),
            binarization,
        }
    }
}

impl DecodeBackend for RqrrBackend {
    fn id(&self) -> &str {
        &self.id
    }

    fn decode(&self, candidate: &DecodeCandidate) -> Option<Decoded> {
        let frame = &candidate.frame;
        if frame.width() < MIN_EDGE || frame.height() < MIN_EDGE {
            return None;
        }
        let w = frame.width() as usize;
        let h = frame.height() as usize;
        let grey = luma_plane(frame);

        let mut img = match self.binarization {
            Binarization::Greyscale => {
                PreparedImage::prepare_from_greyscale(w, h, |x, y| grey[y * w + x])
            }
            Binarization::Otsu => {
                let cutoff = otsu_threshold(&grey);
                PreparedImage::prepare_from_bitmap(w, h, |x, y| grey[y * w + x] < cutoff)
            }
        };

        // First grid that decodes wins; the rest are other symbols or noise
        img.detect_grids().into_iter().find_map(|grid| {
            let (_meta, payload) = grid.decode().ok()?;
            let polygon = grid
                .bounds
                .map(|corner| Point::new(corner.x as f32, corner.y as f32));
            Some(Decoded {
                payload,
                polygon: Some(polygon),
            })
        })
    }
}
