use crate::error::DeviceError;
use crate::models::Frame;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::future::Future;

/// Which way the camera faces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Facing {
    /// Rear camera, pointed at the scene
    Environment,
    /// Front camera, pointed at the user
    User,
}

/// One rung of the acquisition ladder; `None` fields are left to the device
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConstraintSet {
    /// Ideal width in pixels
    pub width: Option<u32>,
    /// Ideal height in pixels
    pub height: Option<u32>,
    /// Ideal frame rate
    pub frame_rate: Option<f32>,
    /// Preferred facing direction
    pub facing: Option<Facing>,
}

impl ConstraintSet {
    /// Resolution + rate + facing
    pub fn new(width: u32, height: u32, frame_rate: f32, facing: Facing) -> Self {
        Self {
            width: Some(width),
            height: Some(height),
            frame_rate: Some(frame_rate),
            facing: Some(facing),
        }
    }

    /// Only a facing preference
    pub fn facing(facing: Facing) -> Self {
        Self {
            facing: Some(facing),
            ..Default::default()
        }
    }

    /// Compact description for logs
    pub fn describe(&self) -> String {
        let mut parts = Vec::new();
        if let (Some(w), Some(h)) = (self.width, self.height) {
            parts.push(format!("{w}x{h}"));
        }
        if let Some(fps) = self.frame_rate {
            parts.push(format!("{fps}fps"));
        }
        if let Some(facing) = self.facing {
            parts.push(format!("{facing:?}").to_lowercase());
        }
        if parts.is_empty() {
            "any".to_string()
        } else {
            parts.join(" ")
        }
    }
}

/// Ordered constraint sets, tried first to last
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CameraConstraintProfile(pub Vec<ConstraintSet>);

impl CameraConstraintProfile {
    /// Sets in the order they will be tried
    pub fn sets(&self) -> &[ConstraintSet] {
        &self.0
    }
}

impl Default for CameraConstraintProfile {
    /// 1080p → 720p → VGA on the rear camera, then any rear camera, then anything
    fn default() -> Self {
        Self(vec![
            ConstraintSet::new(1920, 1080, 30.0, Facing::Environment),
            ConstraintSet::new(1280, 720, 30.0, Facing::Environment),
            ConstraintSet::new(640, 480, 30.0, Facing::Environment),
            ConstraintSet::facing(Facing::Environment),
            ConstraintSet::default(),
        ])
    }
}

/// Focus behaviour a device can be put into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FocusMode {
    /// Fixed/manual focus
    Manual,
    /// Focus once, then hold
    SingleShot,
    /// Keep refocusing
    Continuous,
}

/// Exposure behaviour a device can be put into
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExposureMode {
    /// Fixed exposure
    Manual,
    /// Auto exposure
    Continuous,
}

/// Supported zoom levels
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ZoomRange {
    /// Smallest zoom factor
    pub min: f32,
    /// Largest zoom factor
    pub max: f32,
}

impl ZoomRange {
    /// Clamp a requested level into the range
    pub fn clamp(&self, level: f32) -> f32 {
        level.clamp(self.min, self.max)
    }
}

/// Device features a strategy may depend on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Controllable torch/flash
    Torch,
    /// Optical or digital zoom
    Zoom,
    /// Continuous autofocus
    ContinuousFocus,
}

/// What an acquired stream can do; discovered once after acquisition
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceCapabilities {
    /// Torch can be toggled
    pub torch: bool,
    /// Zoom range, if zoom is supported
    pub zoom: Option<ZoomRange>,
    /// Supported focus modes
    pub focus_modes: BTreeSet<FocusMode>,
    /// Supported exposure modes
    pub exposure_modes: BTreeSet<ExposureMode>,
}

impl DeviceCapabilities {
    /// Whether a strategy requirement is met
    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::Torch => self.torch,
            Capability::Zoom => self.zoom.is_some(),
            Capability::ContinuousFocus => self.focus_modes.contains(&FocusMode::Continuous),
        }
    }
}

/// Runtime changes applied to a live stream
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConstraintUpdate {
    /// Turn the torch on or off
    pub torch: Option<bool>,
    /// Set the zoom factor
    pub zoom: Option<f32>,
    /// Switch focus mode
    pub focus_mode: Option<FocusMode>,
}

/// A camera that can be opened with constraints
pub trait CameraDevice: Send {
    /// Stream produced by a successful acquisition
    type Stream: CameraStream;

    /// Open a stream satisfying `constraints`
    fn acquire(
        &mut self,
        constraints: &ConstraintSet,
    ) -> impl Future<Output = Result<Self::Stream, DeviceError>> + Send;
}

/// A live, acquired camera stream
pub trait CameraStream: Send {
    /// Introspect what the stream supports
    fn capabilities(&self) -> DeviceCapabilities;

    /// Change torch/zoom/focus on the live stream
    fn apply_constraints(
        &mut self,
        update: &ConstraintUpdate,
    ) -> impl Future<Output = Result<(), DeviceError>> + Send;

    /// Most recent frame, or `None` when the device has nothing yet
    fn current_frame(&mut self) -> Option<Frame>;

    /// Stop all tracks and free the device
    fn stop(&mut self) -> impl Future<Output = ()> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_degrades_towards_unconstrained() {
        let ladder = CameraConstraintProfile::default();
        assert_eq!(ladder.sets().first().and_then(|s| s.width), Some(1920));
        assert_eq!(ladder.sets().last(), Some(&ConstraintSet::default()));
    }

    #[test]
    fn test_describe() {
        let set = ConstraintSet::new(1280, 720, 30.0, Facing::Environment);
        assert_eq!(set.describe(), "1280x720 30fps environment");
        assert_eq!(ConstraintSet::default().describe(), "any");
    }

    #[test]
    fn test_supports() {
        let caps = DeviceCapabilities {
            torch: true,
            zoom: None,
            focus_modes: [FocusMode::Continuous].into_iter().collect(),
            exposure_modes: BTreeSet::new(),
        };
        assert!(caps.supports(Capability::Torch));
        assert!(!caps.supports(Capability::Zoom));
        assert!(caps.supports(Capability::ContinuousFocus));
    }
}
