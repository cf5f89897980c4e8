//! adaptive_scan - adaptive multi-strategy visual code scanning
//!
//! Turns a live camera stream into decoded payloads. Each tick grabs the
//! freshest frame, builds decode candidates with the active enhancement
//! strategy, races them across every registered decoder backend and lets the
//! first answer through a time-windowed dedup gate. Repeated failures
//! escalate to heavier strategies; a success drops back to the cheapest.
//!
//! ```no_run
//! use adaptive_scan::{Frame, ReplayCamera, ScanEngine, ScanEvent, ScanProfile};
//! use std::time::Instant;
//!
//! # async fn demo() -> adaptive_scan::Result<()> {
//! let frame = Frame::from_luma(64, 64, &[255; 64 * 64], Instant::now())?;
//! let mut engine = ScanEngine::builder()
//!     .profile(ScanProfile::generic())
//!     .device(ReplayCamera::new(vec![frame]))
//!     .sink(|event: ScanEvent| println!("{event:?}"))
//!     .build()?;
//! engine.start().await?;
//! engine.tick().await?;
//! engine.stop().await;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![allow(clippy::missing_docs_in_private_items)]

/// Camera acquisition, capability discovery and the replay device
pub mod camera;
/// Scan profiles (TOML, presets, environment overrides)
pub mod config;
/// Decoder backends and the candidate race
pub mod decoder;
/// Duplicate payload suppression
pub mod dedup;
/// Rolling statistics and the snapshot channel
pub mod diagnostics;
/// Engine facade, builder, sink and remote control
pub mod engine;
/// Pure frame enhancement operations
pub mod enhance;
/// Error types
pub mod error;
/// Core data structures (Frame, Point, DecodeResult, ScanSession, etc.)
pub mod models;
/// Tick loop
pub mod pipeline;
/// Strategy catalogue, candidate fan-out and escalation
pub mod strategy;
/// Image loading helpers shared by the CLI and benchmarks
pub mod tools;

pub use camera::{
    CameraDevice, CameraStream, Capability, DeviceCapabilities, ReplayCamera,
};
pub use config::ScanProfile;
pub use decoder::{BackendKind, DecodeBackend, Decoded, DecoderPool};
pub use diagnostics::{DiagnosticsHandle, DiagnosticsSnapshot};
pub use engine::{ScanControl, ScanEngine, ScanEngineBuilder, ScanSink, channel_sink};
pub use error::{AcquireError, DeviceError, RecoveredFault, Result, ScanError};
pub use models::{DecodeCandidate, DecodeResult, Frame, Point, ScanEvent, ScanState, ScanStatus};
pub use pipeline::TickOutcome;
