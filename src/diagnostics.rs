//! Rolling scan statistics
//!
//! The pipeline owns the only [`DiagnosticsRecorder`] and publishes a fresh
//! [`DiagnosticsSnapshot`] after every tick through a `watch` channel. Readers
//! hold a [`DiagnosticsHandle`]; reading never waits on the pipeline.

use crate::error::RecoveredFault;
use crate::models::{DecodeResult, ScanState};
use serde::Serialize;
use std::collections::{BTreeMap, VecDeque};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Window used for the fps figure
pub const FPS_WINDOW: Duration = Duration::from_secs(1);

/// Decodes averaged into the latency figure
pub const LATENCY_WINDOW: usize = 32;

/// Immutable copy of the counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticsSnapshot {
    /// Lifecycle state at publication
    pub state: Option<ScanState>,
    /// Ticks that processed a frame
    pub total_ticks: u64,
    /// Ticks that produced a decode
    pub successful_ticks: u64,
    /// Ticks skipped because no fresh frame was available
    pub skipped_ticks: u64,
    /// Decode races abandoned at the deadline
    pub timeouts: u64,
    /// Payloads delivered to the sink
    pub emitted: u64,
    /// Payloads held back by the dedup gate
    pub suppressed: u64,
    /// Capability toggles the device could not honour
    pub capability_unavailable: u64,
    /// Candidates dropped by the concurrency cap
    pub dropped_candidates: u64,
    /// Successful decodes per strategy id
    pub strategy_hits: BTreeMap<String, u64>,
    /// Successful decodes per backend id
    pub decoder_hits: BTreeMap<String, u64>,
    /// Mean latency of recent decodes
    pub avg_latency_ms: Option<f64>,
    /// Processed ticks in the trailing second
    pub fps: f64,
    /// Position of the active strategy
    pub strategy_index: usize,
    /// Id of the active strategy
    pub strategy_id: String,
    /// Current failure streak
    pub consecutive_failures: u64,
    /// All strategies exhausted
    pub degraded: bool,
    /// Time since the recorder was created
    pub uptime_ms: u64,
}

impl DiagnosticsSnapshot {
    /// Fraction of processed ticks that decoded something
    pub fn success_rate(&self) -> f64 {
        if self.total_ticks == 0 {
            0.0
        } else {
            self.successful_ticks as f64 / self.total_ticks as f64
        }
    }
}

/// Read side of the diagnostics channel
#[derive(Debug, Clone)]
pub struct DiagnosticsHandle {
    rx: watch::Receiver<DiagnosticsSnapshot>,
}

impl DiagnosticsHandle {
    /// Latest published snapshot
    pub fn get_stats(&self) -> DiagnosticsSnapshot {
        self.rx.borrow().clone()
    }

    /// Wait for the next publication; `false` once the recorder is gone
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

/// Counter store written by the pipeline
#[derive(Debug)]
pub struct DiagnosticsRecorder {
    current: DiagnosticsSnapshot,
    started: Instant,
    tick_times: VecDeque<Instant>,
    latencies: VecDeque<Duration>,
    tx: watch::Sender<DiagnosticsSnapshot>,
}

impl DiagnosticsRecorder {
    /// Fresh recorder; `now` anchors the uptime
    pub fn new(now: Instant) -> Self {
        let (tx, _rx) = watch::channel(DiagnosticsSnapshot::default());
        Self {
            current: DiagnosticsSnapshot::default(),
            started: now,
            tick_times: VecDeque::new(),
            latencies: VecDeque::with_capacity(LATENCY_WINDOW),
            tx,
        }
    }

    /// New reader
    pub fn handle(&self) -> DiagnosticsHandle {
        DiagnosticsHandle {
            rx: self.tx.subscribe(),
        }
    }

    /// A tick processed a frame
    pub fn record_tick(&mut self, now: Instant) {
        self.current.total_ticks += 1;
        self.tick_times.push_back(now);
        self.prune(now);
    }

    /// A tick found no fresh frame
    pub fn record_skipped(&mut self) {
        self.current.skipped_ticks += 1;
    }

    /// A tick decoded something
    pub fn record_success(&mut self, result: &DecodeResult) {
        self.current.successful_ticks += 1;
        *self
            .current
            .strategy_hits
            .entry(result.strategy_id.clone())
            .or_default() += 1;
        *self
            .current
            .decoder_hits
            .entry(result.decoder_id.clone())
            .or_default() += 1;
        if self.latencies.len() == LATENCY_WINDOW {
            self.latencies.pop_front();
        }
        self.latencies.push_back(result.latency);
        let total: Duration = self.latencies.iter().sum();
        self.current.avg_latency_ms =
            Some(total.as_nanos() as f64 / 1_000_000.0 / self.latencies.len() as f64);
    }

    /// Count a recovered in-loop fault
    pub fn record_fault(&mut self, fault: RecoveredFault) {
        match fault {
            RecoveredFault::DecodeTimeout => self.current.timeouts += 1,
            RecoveredFault::CapabilityUnavailable(_) => self.current.capability_unavailable += 1,
        }
    }

    /// A payload reached the sink
    pub fn record_emitted(&mut self) {
        self.current.emitted += 1;
    }

    /// A payload was held back as a duplicate
    pub fn record_suppressed(&mut self) {
        self.current.suppressed += 1;
    }

    /// Candidates lost to the concurrency cap
    pub fn record_dropped(&mut self, dropped: usize) {
        self.current.dropped_candidates += dropped as u64;
    }

    /// Mirror the escalation state
    pub fn set_strategy(&mut self, index: usize, id: &str, consecutive_failures: u64, degraded: bool) {
        self.current.strategy_index = index;
        if self.current.strategy_id != id {
            self.current.strategy_id = id.to_string();
        }
        self.current.consecutive_failures = consecutive_failures;
        self.current.degraded = degraded;
    }

    /// Mirror the lifecycle state
    pub fn set_state(&mut self, state: ScanState) {
        self.current.state = Some(state);
    }

    /// Current figures without publishing
    pub fn snapshot(&self, now: Instant) -> DiagnosticsSnapshot {
        let mut snapshot = self.current.clone();
        snapshot.fps = self
            .tick_times
            .iter()
            .filter(|&&t| now.saturating_duration_since(t) < FPS_WINDOW)
            .count() as f64;
        snapshot.uptime_ms = now.saturating_duration_since(self.started).as_millis() as u64;
        snapshot
    }

    /// Push a snapshot to every handle
    pub fn publish(&mut self, now: Instant) {
        self.prune(now);
        let snapshot = self.snapshot(now);
        self.tx.send_replace(snapshot);
    }

    fn prune(&mut self, now: Instant) {
        while let Some(&front) = self.tick_times.front() {
            if now.saturating_duration_since(front) >= FPS_WINDOW {
                self.tick_times.pop_front();
            } else {
                break;
            }
        }
    }
}
