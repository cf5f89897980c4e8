//! Public facade: one configurable scanning engine
//!
//! ```text
//! Idle → Acquiring → Scanning ⇄ Paused → Stopped
//!            └──────→ Failed
//! ```
//!
//! The engine owns the camera, the strategy engine, the dedup gate and the
//! diagnostics recorder. Hosts feed it a [`CameraDevice`], receive
//! [`ScanEvent`]s through a [`ScanSink`], and steer a running loop through
//! [`ScanControl`].

use crate::camera::{CameraDevice, CameraSessionManager, FocusMode};
use crate::config::ScanProfile;
use crate::decoder::{DecodeBackend, DecoderPool};
use crate::dedup::DedupGate;
use crate::diagnostics::DiagnosticsHandle;
use crate::error::{Result, ScanError};
use crate::models::{ScanEvent, ScanSession, ScanState, ScanStatus};
use crate::pipeline::{Control, FramePipeline, PipelineSettings, TickOutcome};
use crate::strategy::StrategyEngine;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Receiver of everything the engine reports
pub trait ScanSink: Send {
    /// Handle one event; called on the scanning task, so keep it short
    fn deliver(&mut self, event: ScanEvent);
}

impl<F> ScanSink for F
where
    F: FnMut(ScanEvent) + Send,
{
    fn deliver(&mut self, event: ScanEvent) {
        self(event)
    }
}

/// Sink that forwards into an unbounded channel
pub fn channel_sink() -> (impl ScanSink, mpsc::UnboundedReceiver<ScanEvent>) {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = move |event: ScanEvent| {
        if tx.send(event).is_err() {
            debug!("Scan event receiver dropped");
        }
    };
    (sink, rx)
}

/// Cloneable remote for a running engine
#[derive(Debug, Clone)]
pub struct ScanControl {
    tx: mpsc::UnboundedSender<Control>,
}

impl ScanControl {
    fn send(&self, control: Control) -> bool {
        self.tx.send(control).is_ok()
    }

    /// Pause decoding; `false` if the engine is gone
    pub fn pause(&self) -> bool {
        self.send(Control::Pause)
    }

    /// Resume decoding
    pub fn resume(&self) -> bool {
        self.send(Control::Resume)
    }

    /// Switch the torch
    pub fn set_torch(&self, on: bool) -> bool {
        self.send(Control::SetTorch(on))
    }

    /// Change zoom
    pub fn set_zoom(&self, level: f32) -> bool {
        self.send(Control::SetZoom(level))
    }

    /// Switch focus mode
    pub fn set_focus_mode(&self, mode: FocusMode) -> bool {
        self.send(Control::SetFocus(mode))
    }

    /// Stop the session and release the camera
    pub fn stop(&self) -> bool {
        self.send(Control::Stop)
    }
}

/// Builder for [`ScanEngine`]
pub struct ScanEngineBuilder<D: CameraDevice> {
    profile: ScanProfile,
    device: Option<D>,
    backends: Vec<Arc<dyn DecodeBackend>>,
    sink: Option<Box<dyn ScanSink>>,
}

impl<D: CameraDevice> Default for ScanEngineBuilder<D> {
    fn default() -> Self {
        Self {
            profile: ScanProfile::generic(),
            device: None,
            backends: Vec::new(),
            sink: None,
        }
    }
}

impl<D: CameraDevice> ScanEngineBuilder<D> {
    /// Use `profile` instead of the generic one
    pub fn profile(mut self, profile: ScanProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Camera to drive
    pub fn device(mut self, device: D) -> Self {
        self.device = Some(device);
        self
    }

    /// Register a backend next to the ones the profile names
    pub fn backend(mut self, backend: Arc<dyn DecodeBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Where events go; events are only logged when unset
    pub fn sink(mut self, sink: impl ScanSink + 'static) -> Self {
        self.sink = Some(Box::new(sink));
        self
    }

    /// Validate the profile and wire everything together
    pub fn build(self) -> Result<ScanEngine<D>> {
        self.profile.validate()?;
        let device = self
            .device
            .ok_or_else(|| ScanError::Config("no camera device supplied".to_string()))?;

        let mut backends: Vec<Arc<dyn DecodeBackend>> = self
            .profile
            .decoder_backends
            .iter()
            .map(|kind| kind.build())
            .collect();
        backends.extend(self.backends);
        if backends.is_empty() {
            return Err(ScanError::Config("no decode backends registered".to_string()));
        }
        let pool = DecoderPool::new(backends, self.profile.concurrency_cap);
        let strategies = StrategyEngine::from_profile(&self.profile, pool)?;
        let sink: Box<dyn ScanSink> = match self.sink {
            Some(sink) => sink,
            None => Box::new(|event: ScanEvent| debug!(?event, "Scan event")),
        };
        let pipeline = FramePipeline::new(
            CameraSessionManager::new(device),
            strategies,
            DedupGate::new(self.profile.debounce_window()),
            sink,
            PipelineSettings::from_profile(&self.profile),
        );
        let (control_tx, controls) = mpsc::unbounded_channel();

        debug!(profile = %self.profile.name, pipeline = ?pipeline, "Scan engine built");
        Ok(ScanEngine {
            profile: self.profile,
            pipeline,
            session: None,
            lifecycle: ScanState::Idle,
            control_tx,
            controls,
        })
    }
}

/// The scanning engine
///
/// Dropping an engine without [`stop`](Self::stop) leaves the camera stream
/// to the device's own drop behaviour.
pub struct ScanEngine<D: CameraDevice> {
    profile: ScanProfile,
    pipeline: FramePipeline<D>,
    session: Option<ScanSession>,
    lifecycle: ScanState,
    control_tx: mpsc::UnboundedSender<Control>,
    controls: mpsc::UnboundedReceiver<Control>,
}

impl<D: CameraDevice> ScanEngine<D> {
    /// Start configuring an engine
    pub fn builder() -> ScanEngineBuilder<D> {
        ScanEngineBuilder::default()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ScanState {
        self.session
            .as_ref()
            .map(|session| session.state)
            .unwrap_or(self.lifecycle)
    }

    /// Active session, between `start` and `stop`
    pub fn session(&self) -> Option<&ScanSession> {
        self.session.as_ref()
    }

    /// Profile the engine was built with
    pub fn profile(&self) -> &ScanProfile {
        &self.profile
    }

    /// Camera manager
    pub fn camera(&self) -> &CameraSessionManager<D> {
        self.pipeline.camera()
    }

    /// Strategy engine
    pub fn strategies(&self) -> &StrategyEngine {
        self.pipeline.strategies()
    }

    /// Remote for pause/resume/torch/stop
    pub fn control(&self) -> ScanControl {
        ScanControl {
            tx: self.control_tx.clone(),
        }
    }

    /// Non-blocking statistics reader
    pub fn diagnostics(&self) -> DiagnosticsHandle {
        self.pipeline.diagnostics()
    }

    /// Acquire the camera and begin scanning
    ///
    /// Only valid from `Idle`. An acquisition failure moves the engine to
    /// `Failed` for good, is reported once to the sink and returned.
    pub async fn start(&mut self) -> Result<()> {
        let state = self.state();
        if state != ScanState::Idle {
            return Err(ScanError::InvalidState {
                action: "start",
                state,
            });
        }

        info!(profile = %self.profile.name, "Starting scan session");
        let mut session = ScanSession::new(Instant::now());
        self.lifecycle = ScanState::Acquiring;
        self.pipeline.reset_for_session();

        match self
            .pipeline
            .camera_mut()
            .acquire(&self.profile.constraints)
            .await
        {
            Ok(capabilities) => {
                self.pipeline.strategies_mut().set_capabilities(&capabilities);
                session.capabilities = capabilities;
                if self.profile.default_torch {
                    self.pipeline
                        .apply_control(&mut session, Control::SetTorch(true))
                        .await;
                }
                self.pipeline.transition(&mut session, ScanState::Scanning);
                self.session = Some(session);
                Ok(())
            }
            Err(err) => {
                warn!(error = %err, "Scan session failed");
                self.pipeline.transition(&mut session, ScanState::Failed);
                self.lifecycle = ScanState::Failed;
                self.pipeline
                    .emit(ScanEvent::Status(ScanStatus::Failed(err.clone())));
                Err(err.into())
            }
        }
    }

    /// Tick at the profile rate until stopped through [`ScanControl`]
    ///
    /// The camera is released before this returns.
    pub async fn run(&mut self) -> Result<()> {
        let Some(session) = self.session.as_mut() else {
            return Err(ScanError::InvalidState {
                action: "run",
                state: self.lifecycle,
            });
        };
        self.pipeline.run(session, &mut self.controls).await;
        self.stop().await;
        Ok(())
    }

    /// Run exactly one tick now, after applying queued control messages
    pub async fn tick(&mut self) -> Result<TickOutcome> {
        self.tick_at(Instant::now()).await
    }

    /// Run one tick with an explicit clock reading
    pub async fn tick_at(&mut self, now: Instant) -> Result<TickOutcome> {
        while let Ok(control) = self.controls.try_recv() {
            if control == Control::Stop {
                self.stop().await;
                return Ok(TickOutcome::Idle);
            }
            if let Some(session) = self.session.as_mut() {
                self.pipeline.apply_control(session, control).await;
            }
        }
        let state = self.state();
        let Some(session) = self.session.as_mut() else {
            return Err(ScanError::InvalidState {
                action: "tick",
                state,
            });
        };
        Ok(self.pipeline.tick(session, now).await)
    }

    /// Suspend decoding; the camera stays acquired
    pub fn pause(&mut self) -> Result<()> {
        let state = self.state();
        let Some(session) = self.session.as_mut() else {
            return Err(ScanError::InvalidState {
                action: "pause",
                state,
            });
        };
        self.pipeline.pause(session);
        Ok(())
    }

    /// Resume decoding after a pause
    pub fn resume(&mut self) -> Result<()> {
        let state = self.state();
        let Some(session) = self.session.as_mut() else {
            return Err(ScanError::InvalidState {
                action: "resume",
                state,
            });
        };
        self.pipeline.resume(session);
        Ok(())
    }

    /// Release the camera and end the session
    ///
    /// Valid from every non-terminal state; calling it again, or after a
    /// failed start, does nothing.
    pub async fn stop(&mut self) {
        let mut session = match self.session.take() {
            Some(session) => {
                self.pipeline.camera_mut().release().await;
                session
            }
            None if self.lifecycle == ScanState::Idle => {
                let mut idle = ScanSession::new(Instant::now());
                idle.state = ScanState::Idle;
                idle
            }
            None => return,
        };
        self.pipeline.transition(&mut session, ScanState::Stopped);
        self.lifecycle = ScanState::Stopped;
        info!(
            uptime_ms = session.started_at.elapsed().as_millis() as u64,
            "Scan session stopped"
        );
    }
}

impl<D: CameraDevice> std::fmt::Debug for ScanEngine<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanEngine")
            .field("profile", &self.profile.name)
            .field("state", &self.state())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::ReplayCamera;
    use crate::error::{AcquireError, DeviceError};
    use crate::models::Frame;
    use std::sync::Mutex;

    fn frame() -> Frame {
        Frame::from_luma(32, 32, &[255; 1024], Instant::now()).unwrap()
    }

    fn engine_with(camera: ReplayCamera) -> (ScanEngine<ReplayCamera>, Arc<Mutex<Vec<ScanEvent>>>) {
        let events = Arc::new(Mutex::new(Vec::new()));
        let seen = Arc::clone(&events);
        let engine = ScanEngine::builder()
            .device(camera)
            .sink(move |event: ScanEvent| seen.lock().unwrap().push(event))
            .build()
            .unwrap();
        (engine, events)
    }

    #[test]
    fn test_build_requires_device() {
        let err = ScanEngine::<ReplayCamera>::builder().build().unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[test]
    fn test_build_requires_backend() {
        let err = ScanEngine::builder()
            .profile(ScanProfile::generic().with_decoder_backends(Vec::new()))
            .device(ReplayCamera::new(vec![frame()]))
            .build()
            .unwrap_err();
        assert!(matches!(err, ScanError::Config(_)));
    }

    #[tokio::test]
    async fn test_start_moves_to_scanning() {
        let (mut engine, events) = engine_with(ReplayCamera::new(vec![frame()]));
        assert_eq!(engine.state(), ScanState::Idle);
        engine.start().await.unwrap();
        assert_eq!(engine.state(), ScanState::Scanning);
        assert_eq!(
            events.lock().unwrap().as_slice(),
            &[ScanEvent::Status(ScanStatus::Scanning)]
        );
    }

    #[tokio::test]
    async fn test_failed_start_is_terminal() {
        let camera = ReplayCamera::new(vec![frame()]).with_acquire_failures(vec![
            DeviceError::NotFound("none".into());
            8
        ]);
        let (mut engine, events) = engine_with(camera);
        let err = engine.start().await.unwrap_err();
        assert!(matches!(err, ScanError::Acquire(AcquireError::DeviceNotFound(_))));
        assert_eq!(engine.state(), ScanState::Failed);
        assert!(matches!(
            engine.start().await,
            Err(ScanError::InvalidState { .. })
        ));
        engine.stop().await;
        assert_eq!(engine.state(), ScanState::Failed);
        let failed = events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| matches!(e, ScanEvent::Status(ScanStatus::Failed(_))))
            .count();
        assert_eq!(failed, 1);
    }

    #[tokio::test]
    async fn test_stop_from_idle() {
        let (mut engine, _events) = engine_with(ReplayCamera::new(vec![frame()]));
        engine.stop().await;
        assert_eq!(engine.state(), ScanState::Stopped);
        assert!(engine.start().await.is_err());
    }

    #[tokio::test]
    async fn test_pause_and_resume() {
        let (mut engine, _events) = engine_with(ReplayCamera::new(vec![frame()]));
        assert!(engine.pause().is_err());
        engine.start().await.unwrap();
        engine.pause().unwrap();
        assert_eq!(engine.state(), ScanState::Paused);
        assert_eq!(engine.tick().await.unwrap(), TickOutcome::Idle);
        engine.resume().unwrap();
        assert_eq!(engine.state(), ScanState::Scanning);
    }

    #[tokio::test]
    async fn test_control_stop_is_applied_on_tick() {
        let (mut engine, _events) = engine_with(ReplayCamera::new(vec![frame()]));
        engine.start().await.unwrap();
        assert!(engine.control().stop());
        assert_eq!(engine.tick().await.unwrap(), TickOutcome::Idle);
        assert_eq!(engine.state(), ScanState::Stopped);
        assert!(!engine.camera().is_acquired());
    }
}
