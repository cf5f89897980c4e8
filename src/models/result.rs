use super::{Frame, Point};
use crate::error::AcquireError;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// How a candidate was derived from its source frame
///
/// Used to map decoder coordinates back onto the captured frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CandidateGeometry {
    /// Top-left of the cropped region inside the source frame
    pub region_offset: (u32, u32),
    /// Resize factor applied after cropping (1.0 = none)
    pub scale: f32,
    /// Rotation applied around `rotation_center`, in degrees
    pub rotation_degrees: f32,
    /// Pivot of the rotation, in candidate coordinates
    pub rotation_center: Point,
}

impl Default for CandidateGeometry {
    fn default() -> Self {
        Self {
            region_offset: (0, 0),
            scale: 1.0,
            rotation_degrees: 0.0,
            rotation_center: Point::default(),
        }
    }
}

impl CandidateGeometry {
    /// Map a point from candidate space into source-frame space
    pub fn to_source(&self, p: Point) -> Point {
        let unrotated = if self.rotation_degrees == 0.0 {
            p
        } else {
            p.rotate_about(&self.rotation_center, -self.rotation_degrees)
        };
        let unscaled = if self.scale > 0.0 && self.scale != 1.0 {
            unrotated.scale(1.0 / self.scale)
        } else {
            unrotated
        };
        unscaled.translate(self.region_offset.0 as f32, self.region_offset.1 as f32)
    }
}

/// The unit of work submitted to the decoder pool
#[derive(Debug, Clone)]
pub struct DecodeCandidate {
    /// Immutable pixels handed to every backend
    pub frame: Arc<Frame>,
    /// Where the pixels came from
    pub geometry: CandidateGeometry,
    /// 0 is the most valuable; higher numbers are dropped first under load
    pub priority: u8,
    /// Short human readable tag (e.g. `quadrant-2`, `rotate+5`)
    pub label: String,
}

impl DecodeCandidate {
    /// Whole-frame candidate with no geometry change
    pub fn whole(frame: Arc<Frame>) -> Self {
        Self {
            frame,
            geometry: CandidateGeometry::default(),
            priority: 0,
            label: "whole".to_string(),
        }
    }
}

/// A decoded payload, as delivered to the sink
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecodeResult {
    /// Decoded text
    pub payload: String,
    /// Strategy that produced the winning candidate
    pub strategy_id: String,
    /// Backend that decoded it
    pub decoder_id: String,
    /// Time from race start to the winning decode
    pub latency: Duration,
    /// Corners of the code in source-frame coordinates, when the backend reports them
    pub bounding_polygon: Option<[Point; 4]>,
    /// Label of the winning candidate
    pub candidate_label: String,
}

impl DecodeResult {
    /// Latency in milliseconds
    pub fn latency_ms(&self) -> f64 {
        self.latency.as_secs_f64() * 1000.0
    }
}

/// Status changes surfaced to the host
#[derive(Debug, Clone, PartialEq)]
pub enum ScanStatus {
    /// Actively scanning
    Scanning,
    /// Scanning suspended (explicit or auto-pause after an emission)
    Paused,
    /// Every strategy has been exhausted for the giving-up number of ticks;
    /// scanning continues, the host may offer manual entry
    Degraded {
        /// Failure streak at the moment of the transition
        consecutive_failures: u64,
    },
    /// Session stopped and camera released
    Stopped,
    /// Acquisition failed; terminal
    Failed(AcquireError),
}

/// Everything the engine hands to its sink
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    /// A payload passed the dedup gate
    Decoded(DecodeResult),
    /// Lifecycle or health change
    Status(ScanStatus),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geometry_offset_and_scale() {
        let geometry = CandidateGeometry {
            region_offset: (100, 50),
            scale: 2.0,
            ..Default::default()
        };
        let p = geometry.to_source(Point::new(20.0, 10.0));
        assert_eq!(p, Point::new(110.0, 55.0));
    }

    #[test]
    fn test_geometry_rotation_inverts() {
        let center = Point::new(32.0, 32.0);
        let geometry = CandidateGeometry {
            rotation_degrees: 10.0,
            rotation_center: center,
            ..Default::default()
        };
        let source = Point::new(40.0, 20.0);
        let in_candidate = source.rotate_about(&center, 10.0);
        assert!(geometry.to_source(in_candidate).distance(&source) < 1e-3);
    }
}
