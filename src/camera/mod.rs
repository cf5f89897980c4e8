//! Camera acquisition and device control
//!
//! [`CameraDevice`] and [`CameraStream`] are the platform seam; the rest of
//! the crate only talks to a device through [`CameraSessionManager`].

pub mod device;
pub mod manager;
pub mod replay;

pub use device::{
    CameraConstraintProfile, CameraDevice, CameraStream, Capability, ConstraintSet,
    ConstraintUpdate, DeviceCapabilities, ExposureMode, Facing, FocusMode, ZoomRange,
};
pub use manager::CameraSessionManager;
pub use replay::{ReplayCamera, ReplayStream};
