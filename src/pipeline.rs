//! The tick loop
//!
//! One tick: take the newest frame from the camera, run the active strategy
//! against it under a deadline, then either emit through the dedup gate or
//! count a failure. Ticks never overlap; control messages are applied
//! between ticks, except `Stop`, which abandons a tick in flight.

use crate::camera::{CameraDevice, CameraSessionManager, Capability, FocusMode};
use crate::config::ScanProfile;
use crate::dedup::DedupGate;
use crate::diagnostics::{DiagnosticsHandle, DiagnosticsRecorder};
use crate::engine::ScanSink;
use crate::error::RecoveredFault;
use crate::models::{DecodeResult, ScanEvent, ScanSession, ScanState, ScanStatus};
use crate::strategy::StrategyEngine;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, trace};

/// Commands accepted by a running pipeline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Control {
    /// Stop decoding until resumed
    Pause,
    /// Resume decoding
    Resume,
    /// Switch the torch
    SetTorch(bool),
    /// Change zoom
    SetZoom(f32),
    /// Switch focus mode
    SetFocus(FocusMode),
    /// Leave the run loop
    Stop,
}

/// What a single tick did
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// Session is paused (or not scanning); nothing was decoded
    Idle,
    /// No fresh frame was available
    Skipped,
    /// A payload passed the dedup gate and was delivered
    Emitted(String),
    /// A payload was decoded but held back as a duplicate
    Suppressed(String),
    /// Nothing decoded this tick
    Missed,
    /// The decode race ran past the deadline
    TimedOut,
}

/// Timing and pause policy taken from the profile
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PipelineSettings {
    /// Time between ticks
    pub tick_interval: Duration,
    /// Deadline for one decode race
    pub decode_deadline: Duration,
    /// Pause after each emission
    pub auto_pause_on_success: bool,
    /// Cooldown before an auto-pause lifts itself
    pub auto_resume_after: Option<Duration>,
}

impl PipelineSettings {
    /// Settings for `profile`
    pub fn from_profile(profile: &ScanProfile) -> Self {
        Self {
            tick_interval: profile.tick_interval(),
            decode_deadline: profile.decode_deadline(),
            auto_pause_on_success: profile.auto_pause_on_success,
            auto_resume_after: profile.auto_resume_after(),
        }
    }
}

enum Wake {
    Tick,
    Control(Option<Control>),
}

/// Drives frames from the camera through the strategy engine
pub struct FramePipeline<D: CameraDevice> {
    camera: CameraSessionManager<D>,
    strategies: StrategyEngine,
    dedup: DedupGate,
    diagnostics: DiagnosticsRecorder,
    sink: Box<dyn ScanSink>,
    settings: PipelineSettings,
    last_frame_at: Option<Instant>,
    torch_assist_engaged: bool,
}

impl<D: CameraDevice> FramePipeline<D> {
    /// Assemble a pipeline
    pub fn new(
        camera: CameraSessionManager<D>,
        strategies: StrategyEngine,
        dedup: DedupGate,
        sink: Box<dyn ScanSink>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            camera,
            strategies,
            dedup,
            diagnostics: DiagnosticsRecorder::new(Instant::now()),
            sink,
            settings,
            last_frame_at: None,
            torch_assist_engaged: false,
        }
    }

    /// Camera under this pipeline
    pub fn camera(&self) -> &CameraSessionManager<D> {
        &self.camera
    }

    pub(crate) fn camera_mut(&mut self) -> &mut CameraSessionManager<D> {
        &mut self.camera
    }

    /// Strategy engine under this pipeline
    pub fn strategies(&self) -> &StrategyEngine {
        &self.strategies
    }

    pub(crate) fn strategies_mut(&mut self) -> &mut StrategyEngine {
        &mut self.strategies
    }

    /// New diagnostics reader
    pub fn diagnostics(&self) -> DiagnosticsHandle {
        self.diagnostics.handle()
    }

    /// Timing and pause policy
    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    pub(crate) fn emit(&mut self, event: ScanEvent) {
        self.sink.deliver(event);
    }

    /// Move the session to `state`, telling the sink about visible changes
    pub(crate) fn transition(&mut self, session: &mut ScanSession, state: ScanState) {
        if session.state == state {
            return;
        }
        debug!(from = ?session.state, to = ?state, "Session state change");
        session.state = state;
        self.diagnostics.set_state(state);
        let status = match state {
            ScanState::Scanning => Some(ScanStatus::Scanning),
            ScanState::Paused => Some(ScanStatus::Paused),
            ScanState::Stopped => Some(ScanStatus::Stopped),
            ScanState::Idle | ScanState::Acquiring | ScanState::Failed => None,
        };
        if let Some(status) = status {
            self.emit(ScanEvent::Status(status));
        }
        self.diagnostics.publish(Instant::now());
    }

    /// Pause decoding; frames keep being ignored until resumed
    pub(crate) fn pause(&mut self, session: &mut ScanSession) {
        if session.state == ScanState::Scanning {
            session.resume_at = None;
            self.transition(session, ScanState::Paused);
        }
    }

    /// Resume decoding after a pause
    pub(crate) fn resume(&mut self, session: &mut ScanSession) {
        if session.state == ScanState::Paused {
            session.resume_at = None;
            self.transition(session, ScanState::Scanning);
        }
    }

    /// Forget per-acquisition state before a new session starts
    pub(crate) fn reset_for_session(&mut self) {
        self.last_frame_at = None;
        self.torch_assist_engaged = false;
    }

    /// Apply a non-stop control message
    pub async fn apply_control(&mut self, session: &mut ScanSession, control: Control) {
        match control {
            Control::Pause => self.pause(session),
            Control::Resume => self.resume(session),
            Control::SetTorch(on) => {
                self.torch_assist_engaged = false;
                let applied = self.camera.set_torch(on).await;
                self.note_capability(applied, Capability::Torch);
            }
            Control::SetZoom(level) => {
                let applied = self.camera.set_zoom(level).await;
                self.note_capability(applied, Capability::Zoom);
            }
            Control::SetFocus(mode) => {
                let applied = self.camera.set_focus_mode(mode).await;
                if mode == FocusMode::Continuous {
                    self.note_capability(applied, Capability::ContinuousFocus);
                }
            }
            Control::Stop => {}
        }
        self.diagnostics.publish(Instant::now());
    }

    fn note_capability(&mut self, applied: bool, capability: Capability) {
        if !applied && !self.camera.supports(capability) {
            self.diagnostics
                .record_fault(RecoveredFault::CapabilityUnavailable(capability));
        }
    }

    /// Run one tick against the session
    pub async fn tick(&mut self, session: &mut ScanSession, now: Instant) -> TickOutcome {
        if session.state == ScanState::Paused
            && session.resume_at.is_some_and(|deadline| now >= deadline)
        {
            info!("Cooldown over, resuming");
            self.resume(session);
        }
        if session.state != ScanState::Scanning {
            return TickOutcome::Idle;
        }

        let frame = match self.camera.current_frame() {
            Some(frame) if self.last_frame_at != Some(frame.timestamp()) => frame,
            _ => {
                trace!("No fresh frame");
                self.diagnostics.record_skipped();
                self.diagnostics.publish(now);
                return TickOutcome::Skipped;
            }
        };
        self.last_frame_at = Some(frame.timestamp());
        self.diagnostics.record_tick(now);

        let processed = time::timeout(
            self.settings.decode_deadline,
            self.strategies.process(frame, session),
        )
        .await;

        let outcome = match processed {
            Ok(report) => {
                self.diagnostics.record_dropped(report.dropped);
                match report.result {
                    Some(result) => {
                        self.diagnostics.record_success(&result);
                        let payload = result.payload.clone();
                        if self.dedup.consider(session, &payload, now) {
                            self.accept(session, result, now);
                            TickOutcome::Emitted(payload)
                        } else {
                            self.diagnostics.record_suppressed();
                            TickOutcome::Suppressed(payload)
                        }
                    }
                    None => {
                        self.fail(session);
                        TickOutcome::Missed
                    }
                }
            }
            Err(_) => {
                trace!(
                    deadline_ms = self.settings.decode_deadline.as_millis() as u64,
                    "Decode race timed out"
                );
                self.diagnostics.record_fault(RecoveredFault::DecodeTimeout);
                self.fail(session);
                TickOutcome::TimedOut
            }
        };

        self.sync_torch_assist(session).await;
        let strategy_id = self
            .strategies
            .strategy_at(session.active_strategy_index)
            .map(|s| s.id.clone())
            .unwrap_or_default();
        self.diagnostics.set_strategy(
            session.active_strategy_index,
            &strategy_id,
            session.consecutive_failures,
            session.degraded,
        );
        self.diagnostics.publish(now);
        outcome
    }

    fn accept(&mut self, session: &mut ScanSession, result: DecodeResult, now: Instant) {
        let was_degraded = session.degraded;
        self.strategies.reset(session);
        info!(
            payload = %result.payload,
            strategy = %result.strategy_id,
            decoder = %result.decoder_id,
            latency_ms = result.latency_ms(),
            "Payload emitted"
        );
        self.diagnostics.record_emitted();
        self.emit(ScanEvent::Decoded(result));
        if was_degraded {
            self.emit(ScanEvent::Status(ScanStatus::Scanning));
        }
        if self.settings.auto_pause_on_success {
            self.transition(session, ScanState::Paused);
            session.resume_at = self.settings.auto_resume_after.map(|cooldown| now + cooldown);
        }
    }

    fn fail(&mut self, session: &mut ScanSession) {
        let escalation = self.strategies.record_failure(session);
        if escalation.became_degraded {
            self.emit(ScanEvent::Status(ScanStatus::Degraded {
                consecutive_failures: session.consecutive_failures,
            }));
        }
    }

    async fn sync_torch_assist(&mut self, session: &ScanSession) {
        let wants = self
            .strategies
            .strategy_at(session.active_strategy_index)
            .is_some_and(|s| s.torch_assist);
        if wants && !self.torch_assist_engaged && !self.camera.torch_on() {
            if self.camera.set_torch(true).await {
                info!("Torch assist engaged");
                self.torch_assist_engaged = true;
            } else {
                self.diagnostics
                    .record_fault(RecoveredFault::CapabilityUnavailable(Capability::Torch));
            }
        } else if !wants && self.torch_assist_engaged {
            self.camera.set_torch(false).await;
            self.torch_assist_engaged = false;
            info!("Torch assist released");
        }
    }

    /// Tick until a `Stop` arrives
    ///
    /// If every control handle is dropped the loop keeps ticking on the
    /// timer alone; only a `Stop` ends it. A `Stop` received while a tick is
    /// in flight drops that tick together with its decode race.
    pub async fn run(
        &mut self,
        session: &mut ScanSession,
        controls: &mut mpsc::UnboundedReceiver<Control>,
    ) {
        let mut ticker = time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut deferred: Vec<Control> = Vec::new();
        let mut controls_open = true;

        loop {
            let wake = if controls_open {
                tokio::select! {
                    biased;
                    control = controls.recv() => Wake::Control(control),
                    _ = ticker.tick() => Wake::Tick,
                }
            } else {
                ticker.tick().await;
                Wake::Tick
            };

            match wake {
                Wake::Control(Some(Control::Stop)) => {
                    debug!("Stop requested");
                    return;
                }
                Wake::Control(Some(control)) => {
                    self.apply_control(session, control).await;
                    continue;
                }
                Wake::Control(None) => {
                    // Host dropped every control handle; keep scanning
                    controls_open = false;
                    continue;
                }
                Wake::Tick => {}
            }

            let stopped = {
                let tick = self.tick(session, Instant::now());
                tokio::pin!(tick);
                loop {
                    if !controls_open {
                        tick.as_mut().await;
                        break false;
                    }
                    tokio::select! {
                        biased;
                        _ = &mut tick => break false,
                        control = controls.recv() => match control {
                            Some(Control::Stop) => break true,
                            Some(other) => deferred.push(other),
                            None => controls_open = false,
                        },
                    }
                }
            };
            if stopped {
                debug!("Stop requested mid-tick, abandoning decode race");
                return;
            }
            for control in deferred.drain(..) {
                self.apply_control(session, control).await;
            }
        }
    }
}

impl<D: CameraDevice> std::fmt::Debug for FramePipeline<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FramePipeline")
            .field("strategies", &self.strategies)
            .field("dedup", &self.dedup)
            .field("settings", &self.settings)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{
        CameraConstraintProfile, CameraStream, ConstraintSet, ConstraintUpdate,
        DeviceCapabilities, ReplayCamera,
    };
    use crate::decoder::{DecodeBackend, Decoded, DecoderPool};
    use crate::error::DeviceError;
    use crate::models::{DecodeCandidate, Frame};
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    /// Sleeps, then answers only while `answer` is set
    struct Slow {
        delay: Duration,
        answer: Arc<AtomicBool>,
    }

    impl DecodeBackend for Slow {
        fn id(&self) -> &str {
            "slow"
        }

        fn decode(&self, _candidate: &DecodeCandidate) -> Option<Decoded> {
            std::thread::sleep(self.delay);
            self.answer
                .load(Ordering::SeqCst)
                .then(|| Decoded::text("P"))
        }
    }

    /// Device whose stream keeps returning the same capture
    struct Frozen(Frame);

    struct FrozenStream(Frame);

    impl CameraDevice for Frozen {
        type Stream = FrozenStream;

        async fn acquire(&mut self, _constraints: &ConstraintSet) -> Result<FrozenStream, DeviceError> {
            Ok(FrozenStream(self.0.clone()))
        }
    }

    impl CameraStream for FrozenStream {
        fn capabilities(&self) -> DeviceCapabilities {
            DeviceCapabilities::default()
        }

        async fn apply_constraints(&mut self, _update: &ConstraintUpdate) -> Result<(), DeviceError> {
            Ok(())
        }

        fn current_frame(&mut self) -> Option<Frame> {
            Some(self.0.clone())
        }

        async fn stop(&mut self) {}
    }

    fn frame() -> Frame {
        Frame::from_luma(32, 32, &[180; 1024], Instant::now()).unwrap()
    }

    async fn pipeline<D: CameraDevice>(
        device: D,
        profile: &ScanProfile,
        backend: Slow,
    ) -> (FramePipeline<D>, ScanSession) {
        let mut camera = CameraSessionManager::new(device);
        let capabilities = camera
            .acquire(&CameraConstraintProfile::default())
            .await
            .unwrap();
        let backends: Vec<Arc<dyn DecodeBackend>> = vec![Arc::new(backend)];
        let mut strategies =
            StrategyEngine::from_profile(profile, DecoderPool::new(backends, 8)).unwrap();
        strategies.set_capabilities(&capabilities);
        let pipeline = FramePipeline::new(
            camera,
            strategies,
            DedupGate::new(profile.debounce_window()),
            Box::new(|_event: ScanEvent| {}),
            PipelineSettings::from_profile(profile),
        );
        let mut session = ScanSession::new(Instant::now());
        session.state = ScanState::Scanning;
        session.capabilities = capabilities;
        (pipeline, session)
    }

    #[tokio::test]
    async fn test_deadline_turns_slow_race_into_failure() {
        let profile = ScanProfile::generic().with_decode_deadline_ms(20);
        let backend = Slow {
            delay: Duration::from_millis(300),
            answer: Arc::new(AtomicBool::new(true)),
        };
        let (mut pipeline, mut session) =
            pipeline(ReplayCamera::new(vec![frame()]), &profile, backend).await;
        let stats = pipeline.diagnostics();

        assert_eq!(
            pipeline.tick(&mut session, Instant::now()).await,
            TickOutcome::TimedOut
        );
        assert_eq!(session.consecutive_failures, 1);
        assert_eq!(stats.get_stats().timeouts, 1);
        assert_eq!(stats.get_stats().successful_ticks, 0);
    }

    #[tokio::test]
    async fn test_same_capture_is_not_decoded_twice() {
        let profile = ScanProfile::generic().with_decode_deadline_ms(5_000);
        let backend = Slow {
            delay: Duration::ZERO,
            answer: Arc::new(AtomicBool::new(false)),
        };
        let (mut pipeline, mut session) = pipeline(Frozen(frame()), &profile, backend).await;
        let stats = pipeline.diagnostics();

        assert_eq!(
            pipeline.tick(&mut session, Instant::now()).await,
            TickOutcome::Missed
        );
        assert_eq!(
            pipeline.tick(&mut session, Instant::now()).await,
            TickOutcome::Skipped
        );
        assert_eq!(session.consecutive_failures, 1);
        assert_eq!(stats.get_stats().skipped_ticks, 1);
    }

    #[tokio::test]
    async fn test_torch_assist_leaves_user_torch_on() {
        let profile = ScanProfile::generic()
            .with_strategy_order(["direct", "torch-assist"])
            .with_escalation_threshold(1)
            .with_decode_deadline_ms(5_000);
        let answer = Arc::new(AtomicBool::new(false));
        let backend = Slow {
            delay: Duration::ZERO,
            answer: Arc::clone(&answer),
        };
        let camera = ReplayCamera::new(vec![frame()]).with_capabilities(DeviceCapabilities {
            torch: true,
            ..Default::default()
        });
        let (mut pipeline, mut session) = pipeline(camera, &profile, backend).await;

        pipeline
            .apply_control(&mut session, Control::SetTorch(true))
            .await;
        pipeline.tick(&mut session, Instant::now()).await;
        assert_eq!(session.active_strategy_index, 1);

        answer.store(true, Ordering::SeqCst);
        assert_eq!(
            pipeline.tick(&mut session, Instant::now()).await,
            TickOutcome::Emitted("P".to_string())
        );
        assert_eq!(session.active_strategy_index, 0);
        assert!(pipeline.camera().torch_on());
    }

    #[tokio::test]
    async fn test_stop_abandons_tick_in_flight() {
        let profile = ScanProfile::generic().with_decode_deadline_ms(5_000);
        let backend = Slow {
            delay: Duration::from_millis(200),
            answer: Arc::new(AtomicBool::new(false)),
        };
        let (mut pipeline, mut session) =
            pipeline(ReplayCamera::new(vec![frame()]), &profile, backend).await;
        let (tx, mut rx) = mpsc::unbounded_channel();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(20)).await;
            let _ = tx.send(Control::Stop);
        });

        let started = Instant::now();
        pipeline.run(&mut session, &mut rx).await;
        assert!(started.elapsed() < Duration::from_millis(200));
        assert_eq!(session.consecutive_failures, 0);
    }

    #[tokio::test]
    async fn test_dropped_controls_keep_ticking() {
        let profile = ScanProfile::generic()
            .with_target_fps(100)
            .with_decode_deadline_ms(5_000);
        let backend = Slow {
            delay: Duration::ZERO,
            answer: Arc::new(AtomicBool::new(false)),
        };
        let (mut pipeline, mut session) =
            pipeline(ReplayCamera::new(vec![frame()]), &profile, backend).await;
        let stats = pipeline.diagnostics();
        let (tx, mut rx) = mpsc::unbounded_channel::<Control>();
        drop(tx);

        let ran = time::timeout(
            Duration::from_millis(150),
            pipeline.run(&mut session, &mut rx),
        )
        .await;
        assert!(ran.is_err());
        let snapshot = stats.get_stats();
        assert!(snapshot.total_ticks + snapshot.skipped_ticks >= 2);
    }
}
