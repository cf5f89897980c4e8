use crate::camera::DeviceCapabilities;
use serde::Serialize;
use std::time::Instant;

/// Lifecycle of a scan session
///
/// `Idle → Acquiring → Scanning ⇄ Paused → Stopped`, with
/// `Acquiring → Failed` when the constraint ladder is exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanState {
    /// Constructed, camera not requested yet
    Idle,
    /// Walking the constraint ladder
    Acquiring,
    /// Tick loop is decoding frames
    Scanning,
    /// Tick loop keeps running but skips decoding
    Paused,
    /// Camera released; terminal
    Stopped,
    /// Acquisition failed; terminal
    Failed,
}

impl ScanState {
    /// `Stopped` and `Failed` accept no further transitions
    pub fn is_terminal(&self) -> bool {
        matches!(self, ScanState::Stopped | ScanState::Failed)
    }
}

/// Runtime state of one `start()`..`stop()` span
#[derive(Debug, Clone)]
pub struct ScanSession {
    /// Current lifecycle state
    pub state: ScanState,
    /// Position in the eligible strategy catalogue
    pub active_strategy_index: usize,
    /// Ticks without a decode since the last accepted emission
    pub consecutive_failures: u64,
    /// Last payload let through the dedup gate
    pub last_payload: Option<String>,
    /// When `last_payload` was emitted
    pub last_emit_time: Option<Instant>,
    /// Discovered once at acquisition
    pub capabilities: DeviceCapabilities,
    /// All strategies exhausted for the giving-up number of ticks
    pub degraded: bool,
    /// Cooldown deadline after an auto-pause
    pub resume_at: Option<Instant>,
    /// Creation time
    pub started_at: Instant,
}

impl ScanSession {
    /// Fresh session in `Acquiring`
    pub fn new(started_at: Instant) -> Self {
        Self {
            state: ScanState::Acquiring,
            active_strategy_index: 0,
            consecutive_failures: 0,
            last_payload: None,
            last_emit_time: None,
            capabilities: DeviceCapabilities::default(),
            degraded: false,
            resume_at: None,
            started_at,
        }
    }
}
