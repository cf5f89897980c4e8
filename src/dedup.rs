//! Time-windowed duplicate suppression

use crate::models::ScanSession;
use std::time::{Duration, Instant};
use tracing::debug;

/// Debouncer in front of the sink
///
/// The same payload is let through at most once per window. A different
/// payload always goes straight through and restarts the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DedupGate {
    window: Duration,
}

impl DedupGate {
    /// Gate with the given debounce window
    pub fn new(window: Duration) -> Self {
        Self { window }
    }

    /// Debounce window
    pub fn window(&self) -> Duration {
        self.window
    }

    /// Decide whether `payload` may be emitted at `now`
    ///
    /// Accepting records the payload and time on the session; a rejection
    /// leaves the session untouched.
    pub fn consider(&self, session: &mut ScanSession, payload: &str, now: Instant) -> bool {
        if let (Some(last), Some(at)) = (&session.last_payload, session.last_emit_time) {
            let elapsed = now.saturating_duration_since(at);
            if last == payload && elapsed < self.window {
                debug!(
                    payload,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "Duplicate payload suppressed"
                );
                return false;
            }
        }
        session.last_payload = Some(payload.to_string());
        session.last_emit_time = Some(now);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate(ms: u64) -> (DedupGate, ScanSession, Instant) {
        let t0 = Instant::now();
        (DedupGate::new(Duration::from_millis(ms)), ScanSession::new(t0), t0)
    }

    #[test]
    fn test_same_payload_inside_window_suppressed() {
        let (gate, mut session, t0) = gate(200);
        assert!(gate.consider(&mut session, "ABC123", t0));
        assert!(!gate.consider(&mut session, "ABC123", t0 + Duration::from_millis(150)));
        assert_eq!(session.last_emit_time, Some(t0));
    }

    #[test]
    fn test_different_payload_passes_immediately() {
        let (gate, mut session, t0) = gate(200);
        assert!(gate.consider(&mut session, "ABC123", t0));
        assert!(gate.consider(&mut session, "XYZ999", t0 + Duration::from_millis(10)));
        assert_eq!(session.last_payload.as_deref(), Some("XYZ999"));
    }

    #[test]
    fn test_same_payload_after_window_passes() {
        let (gate, mut session, t0) = gate(200);
        assert!(gate.consider(&mut session, "ABC123", t0));
        assert!(gate.consider(&mut session, "ABC123", t0 + Duration::from_millis(200)));
    }

    #[test]
    fn test_a_b_a_inside_window_emits_all() {
        let (gate, mut session, t0) = gate(1000);
        assert!(gate.consider(&mut session, "A", t0));
        assert!(gate.consider(&mut session, "B", t0 + Duration::from_millis(5)));
        assert!(gate.consider(&mut session, "A", t0 + Duration::from_millis(10)));
    }

    #[test]
    fn test_zero_window_never_suppresses() {
        let (gate, mut session, t0) = gate(0);
        assert!(gate.consider(&mut session, "A", t0));
        assert!(gate.consider(&mut session, "A", t0));
    }
}
