//! Error types for the scan engine
//!
//! Acquisition failures are the only errors that end a session. Everything
//! that goes wrong inside the running tick loop is a [`RecoveredFault`]: it
//! is counted by diagnostics and scanning carries on.

use crate::camera::Capability;
use crate::models::ScanState;
use thiserror::Error;

/// Raw failure reported by a camera device for one acquisition attempt
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DeviceError {
    /// The user or platform refused camera access
    #[error("camera access not allowed: {0}")]
    NotAllowed(String),

    /// No device matches the request
    #[error("no matching camera: {0}")]
    NotFound(String),

    /// The device exists but could not be started (usually held by another process)
    #[error("camera could not be started: {0}")]
    NotReadable(String),

    /// A requested constraint cannot be satisfied by any device
    #[error("constraint `{constraint}` cannot be satisfied")]
    Overconstrained {
        /// Name of the offending constraint
        constraint: String,
    },

    /// Anything else the platform reports
    #[error("camera failure: {0}")]
    Other(String),
}

/// Classified acquisition failure; fatal to the session
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AcquireError {
    /// Camera access was refused
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// No camera is present
    #[error("device not found: {0}")]
    DeviceNotFound(String),

    /// Camera is in use or failed to start
    #[error("device busy: {0}")]
    DeviceBusy(String),

    /// No rung of the constraint ladder could be satisfied
    #[error("unsupported constraint: {0}")]
    UnsupportedConstraint(String),
}

impl AcquireError {
    /// Classify the last underlying failure of a constraint ladder
    pub fn classify(last: &DeviceError) -> Self {
        match last {
            DeviceError::NotAllowed(msg) => AcquireError::PermissionDenied(msg.clone()),
            DeviceError::NotFound(msg) => AcquireError::DeviceNotFound(msg.clone()),
            DeviceError::NotReadable(msg) => AcquireError::DeviceBusy(msg.clone()),
            DeviceError::Overconstrained { constraint } => {
                AcquireError::UnsupportedConstraint(constraint.clone())
            }
            // A start failure the platform could not name behaves like a busy device
            DeviceError::Other(msg) => AcquireError::DeviceBusy(msg.clone()),
        }
    }
}

/// Non-fatal outcomes inside the tick loop
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveredFault {
    /// The decode race missed its tick deadline
    #[error("decode race exceeded its tick deadline")]
    DecodeTimeout,

    /// A capability toggle was requested that the device does not offer
    #[error("capability unavailable: {0:?}")]
    CapabilityUnavailable(Capability),
}

/// Main error type for the crate
#[derive(Error, Debug)]
pub enum ScanError {
    /// Camera acquisition failed
    #[error(transparent)]
    Acquire(#[from] AcquireError),

    /// Profile values are out of range or inconsistent
    #[error("Configuration error: {0}")]
    Config(String),

    /// Profile file could not be parsed
    #[error("Profile parse error: {0}")]
    ProfileParse(#[from] toml::de::Error),

    /// Operation not valid in the current lifecycle state
    #[error("Cannot {action} while {state:?}")]
    InvalidState {
        /// Attempted operation
        action: &'static str,
        /// State at the time of the call
        state: ScanState,
    },

    /// Pixel buffer does not match the declared dimensions
    #[error("Frame buffer holds {actual} bytes, expected {expected}")]
    FrameSize {
        /// Bytes implied by width × height × channels
        expected: usize,
        /// Bytes supplied
        actual: usize,
    },

    /// File I/O errors
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Image loading errors
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// Convenience Result type
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_covers_every_device_error() {
        let cases = [
            (
                DeviceError::NotAllowed("denied".into()),
                AcquireError::PermissionDenied("denied".into()),
            ),
            (
                DeviceError::NotFound("none".into()),
                AcquireError::DeviceNotFound("none".into()),
            ),
            (
                DeviceError::NotReadable("in use".into()),
                AcquireError::DeviceBusy("in use".into()),
            ),
            (
                DeviceError::Overconstrained {
                    constraint: "width".into(),
                },
                AcquireError::UnsupportedConstraint("width".into()),
            ),
            (
                DeviceError::Other("driver crashed".into()),
                AcquireError::DeviceBusy("driver crashed".into()),
            ),
        ];
        for (raw, expected) in cases {
            assert_eq!(AcquireError::classify(&raw), expected);
        }
    }
}
