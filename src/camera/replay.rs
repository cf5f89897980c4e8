//! In-memory camera that replays still frames
//!
//! Used by the `scantool` binary to run the engine over image files and by
//! tests to script acquisition failures and capability sets.

use super::device::{
    CameraDevice, CameraStream, ConstraintSet, ConstraintUpdate, DeviceCapabilities,
};
use crate::error::DeviceError;
use crate::models::Frame;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Camera backed by a fixed list of frames
///
/// Each acquisition attempt first consumes one scripted failure, if any are
/// left. Streams cycle through the frames forever, restamping each one with
/// the time it was read.
#[derive(Debug, Default)]
pub struct ReplayCamera {
    frames: Arc<Vec<Frame>>,
    capabilities: DeviceCapabilities,
    failures: VecDeque<DeviceError>,
    attempts: usize,
    releases: Arc<AtomicUsize>,
    applied: Arc<Mutex<Vec<ConstraintUpdate>>>,
    loop_frames: bool,
}

impl ReplayCamera {
    /// Replay `frames` in order, looping
    pub fn new(frames: Vec<Frame>) -> Self {
        Self {
            frames: Arc::new(frames),
            loop_frames: true,
            ..Default::default()
        }
    }

    /// Report these capabilities from every stream
    pub fn with_capabilities(mut self, capabilities: DeviceCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Fail the next acquisitions with these errors, one per attempt
    pub fn with_acquire_failures(mut self, failures: Vec<DeviceError>) -> Self {
        self.failures = failures.into();
        self
    }

    /// Play the frames once, then report no frame
    pub fn once(mut self) -> Self {
        self.loop_frames = false;
        self
    }

    /// Number of acquisition attempts so far
    pub fn acquire_attempts(&self) -> usize {
        self.attempts
    }

    /// Number of streams that have been stopped
    pub fn release_count(&self) -> usize {
        self.releases.load(Ordering::SeqCst)
    }

    /// Every constraint update applied to any stream, oldest first
    pub fn applied_updates(&self) -> Vec<ConstraintUpdate> {
        self.applied
            .lock()
            .map(|updates| updates.clone())
            .unwrap_or_default()
    }
}

impl CameraDevice for ReplayCamera {
    type Stream = ReplayStream;

    async fn acquire(&mut self, _constraints: &ConstraintSet) -> Result<ReplayStream, DeviceError> {
        self.attempts += 1;
        if let Some(err) = self.failures.pop_front() {
            return Err(err);
        }
        Ok(ReplayStream {
            frames: Arc::clone(&self.frames),
            capabilities: self.capabilities.clone(),
            cursor: 0,
            loop_frames: self.loop_frames,
            releases: Arc::clone(&self.releases),
            applied: Arc::clone(&self.applied),
            stopped: false,
        })
    }
}

/// Stream handed out by [`ReplayCamera`]
#[derive(Debug)]
pub struct ReplayStream {
    frames: Arc<Vec<Frame>>,
    capabilities: DeviceCapabilities,
    cursor: usize,
    loop_frames: bool,
    releases: Arc<AtomicUsize>,
    applied: Arc<Mutex<Vec<ConstraintUpdate>>>,
    stopped: bool,
}

impl CameraStream for ReplayStream {
    fn capabilities(&self) -> DeviceCapabilities {
        self.capabilities.clone()
    }

    async fn apply_constraints(&mut self, update: &ConstraintUpdate) -> Result<(), DeviceError> {
        if self.stopped {
            return Err(DeviceError::NotReadable("stream stopped".to_string()));
        }
        if let Ok(mut applied) = self.applied.lock() {
            applied.push(update.clone());
        }
        Ok(())
    }

    fn current_frame(&mut self) -> Option<Frame> {
        if self.stopped || self.frames.is_empty() {
            return None;
        }
        if self.cursor >= self.frames.len() {
            if !self.loop_frames {
                return None;
            }
            self.cursor = 0;
        }
        let frame = self.frames[self.cursor].clone().with_timestamp(Instant::now());
        self.cursor += 1;
        Some(frame)
    }

    async fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }
}
