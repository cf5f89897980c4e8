use super::candidates::build_candidates;
use super::catalogue::{self, Strategy};
use crate::camera::DeviceCapabilities;
use crate::config::ScanProfile;
use crate::decoder::DecoderPool;
use crate::error::{Result, ScanError};
use crate::models::{DecodeResult, Frame, ScanSession};
use std::sync::Arc;
use tracing::{debug, info, trace, warn};

/// What happened to the escalation state after a failed tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Escalation {
    /// New strategy position, when the failure moved it
    pub escalated_to: Option<usize>,
    /// The session just crossed the giving-up threshold
    pub became_degraded: bool,
}

/// Summary of one `process` call
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// Position of the strategy that ran
    pub strategy_index: usize,
    /// Id of the strategy that ran
    pub strategy_id: String,
    /// Candidates the strategy produced
    pub candidates: usize,
    /// Candidates dropped by the concurrency cap
    pub dropped: usize,
    /// The decode, if any backend succeeded
    pub result: Option<DecodeResult>,
}

struct Entry {
    strategy: Arc<Strategy>,
    threshold: u64,
}

/// Ordered, escalating strategy catalogue driving the decoder pool
///
/// The active strategy is a pure function of the failure streak: the
/// eligible strategies are walked in order, each consuming its own
/// threshold worth of failures, and the last one is held once reached.
pub struct StrategyEngine {
    entries: Vec<Entry>,
    eligible: Vec<usize>,
    give_up_ticks: u64,
    pool: DecoderPool,
}

impl StrategyEngine {
    /// Resolve the profile's strategy order against the built-in catalogue
    pub fn from_profile(profile: &ScanProfile, pool: DecoderPool) -> Result<Self> {
        let mut entries = Vec::with_capacity(profile.strategy_order.len());
        for id in &profile.strategy_order {
            let strategy = catalogue::builtin(id)
                .ok_or_else(|| ScanError::Config(format!("unknown strategy `{id}`")))?;
            entries.push(Entry {
                strategy: Arc::new(strategy),
                threshold: profile.threshold_for(id).max(1) as u64,
            });
        }
        let mut engine = Self {
            eligible: Vec::new(),
            entries,
            give_up_ticks: profile.give_up_ticks,
            pool,
        };
        engine.set_capabilities(&DeviceCapabilities::default());
        Ok(engine)
    }

    /// Drop strategies whose device requirement is not met
    pub fn set_capabilities(&mut self, capabilities: &DeviceCapabilities) {
        self.eligible = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, entry)| {
                entry
                    .strategy
                    .required_capability
                    .is_none_or(|cap| capabilities.supports(cap))
            })
            .map(|(i, _)| i)
            .collect();
        debug!(
            eligible = ?self.eligible_ids(),
            "Strategy catalogue resolved"
        );
    }

    /// Ids of the eligible strategies, in escalation order
    pub fn eligible_ids(&self) -> Vec<&str> {
        self.eligible
            .iter()
            .map(|&i| self.entries[i].strategy.id.as_str())
            .collect()
    }

    /// Number of eligible strategies
    pub fn len(&self) -> usize {
        self.eligible.len()
    }

    /// True when no strategy is eligible
    pub fn is_empty(&self) -> bool {
        self.eligible.is_empty()
    }

    /// Strategy at an eligible position
    pub fn strategy_at(&self, position: usize) -> Option<&Strategy> {
        let &i = self.eligible.get(position)?;
        Some(self.entries[i].strategy.as_ref())
    }

    /// The pool candidates are raced on
    pub fn pool(&self) -> &DecoderPool {
        &self.pool
    }

    /// Eligible position for a failure streak
    pub fn select_index(&self, consecutive_failures: u64) -> usize {
        let last = self.eligible.len().saturating_sub(1);
        let mut remaining = consecutive_failures;
        for (position, &i) in self.eligible.iter().enumerate() {
            if position == last {
                return position;
            }
            let threshold = self.entries[i].threshold;
            if remaining < threshold {
                return position;
            }
            remaining -= threshold;
        }
        0
    }

    /// Failed ticks spent on the last strategy
    pub fn exhausted_ticks(&self, consecutive_failures: u64) -> u64 {
        let Some((_, before_last)) = self.eligible.split_last() else {
            return 0;
        };
        let budget: u64 = before_last.iter().map(|&i| self.entries[i].threshold).sum();
        consecutive_failures.saturating_sub(budget)
    }

    /// Whether a failure streak has been on the last strategy long enough to give up
    pub fn is_exhausted(&self, consecutive_failures: u64) -> bool {
        !self.eligible.is_empty() && self.exhausted_ticks(consecutive_failures) >= self.give_up_ticks
    }

    /// Count a failed tick and escalate if its strategy's threshold is used up
    pub fn record_failure(&self, session: &mut ScanSession) -> Escalation {
        session.consecutive_failures += 1;
        let mut outcome = Escalation::default();

        let position = self.select_index(session.consecutive_failures);
        if position != session.active_strategy_index {
            info!(
                from = session.active_strategy_index,
                to = position,
                strategy = self.strategy_at(position).map(|s| s.id.as_str()).unwrap_or(""),
                consecutive_failures = session.consecutive_failures,
                "Escalating strategy"
            );
            session.active_strategy_index = position;
            outcome.escalated_to = Some(position);
        }

        if !session.degraded && self.is_exhausted(session.consecutive_failures) {
            warn!(
                consecutive_failures = session.consecutive_failures,
                "All strategies exhausted, scanning continues degraded"
            );
            session.degraded = true;
            outcome.became_degraded = true;
        }
        outcome
    }

    /// Back to the cheapest strategy after a success
    pub fn reset(&self, session: &mut ScanSession) {
        if session.active_strategy_index != 0 || session.consecutive_failures != 0 {
            debug!(
                from = session.active_strategy_index,
                "Strategy reset after success"
            );
        }
        session.active_strategy_index = 0;
        session.consecutive_failures = 0;
        session.degraded = false;
    }

    /// Run the active strategy against one frame
    ///
    /// Candidates are built on the blocking pool and raced; the first decode
    /// wins. Failure bookkeeping is left to the caller.
    pub async fn process(&self, frame: Frame, session: &mut ScanSession) -> TickReport {
        let position = self.select_index(session.consecutive_failures);
        session.active_strategy_index = position;

        let Some(strategy) = self.eligible.get(position).map(|&i| &self.entries[i].strategy)
        else {
            return TickReport {
                strategy_index: position,
                strategy_id: String::new(),
                candidates: 0,
                dropped: 0,
                result: None,
            };
        };

        let frame = Arc::new(frame);
        let built = {
            let strategy = Arc::clone(strategy);
            tokio::task::spawn_blocking(move || build_candidates(&strategy, &frame)).await
        };
        let candidates = match built {
            Ok(candidates) => candidates,
            Err(err) => {
                warn!(strategy = %strategy.id, error = %err, "Candidate construction failed");
                Vec::new()
            }
        };
        let count = candidates.len();
        trace!(strategy = %strategy.id, candidates = count, "Racing candidates");

        let race = self.pool.race(candidates).await;
        TickReport {
            strategy_index: position,
            strategy_id: strategy.id.clone(),
            candidates: count,
            dropped: race.dropped,
            result: race.winner.map(|win| win.into_result(&strategy.id)),
        }
    }
}

impl std::fmt::Debug for StrategyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StrategyEngine")
            .field("eligible", &self.eligible_ids())
            .field("give_up_ticks", &self.give_up_ticks)
            .field("pool", &self.pool)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecodeBackend, Decoded};
    use crate::models::DecodeCandidate;
    use std::time::Instant;

    struct Always(&'static str);

    impl DecodeBackend for Always {
        fn id(&self) -> &str {
            "always"
        }

        fn decode(&self, _candidate: &DecodeCandidate) -> Option<Decoded> {
            Some(Decoded::text(self.0))
        }
    }

    fn engine(profile: &ScanProfile) -> StrategyEngine {
        StrategyEngine::from_profile(profile, DecoderPool::new(Vec::new(), 8)).unwrap()
    }

    fn profile(order: &[&str], threshold: u32) -> ScanProfile {
        ScanProfile::generic()
            .with_strategy_order(order.iter().copied())
            .with_escalation_threshold(threshold)
    }

    #[test]
    fn test_five_failures_advance_to_second_strategy() {
        let engine = engine(&profile(&["direct", "grayscale", "contrast"], 5));
        let mut session = ScanSession::new(Instant::now());
        for _ in 0..4 {
            engine.record_failure(&mut session);
        }
        assert_eq!(session.active_strategy_index, 0);
        let step = engine.record_failure(&mut session);
        assert_eq!(step.escalated_to, Some(1));
        assert_eq!(session.active_strategy_index, 1);
    }

    #[test]
    fn test_escalation_is_monotonic_and_held_at_last() {
        let engine = engine(&profile(&["direct", "grayscale", "contrast"], 3));
        let mut previous = 0;
        for failures in 0..40 {
            let index = engine.select_index(failures);
            assert!(index >= previous);
            assert!(index < engine.len());
            previous = index;
        }
        assert_eq!(engine.select_index(1_000_000), 2);
    }

    #[test]
    fn test_overrides_change_step_length() {
        let p = profile(&["direct", "grayscale", "contrast"], 5).with_escalation_override("direct", 2);
        let engine = engine(&p);
        assert_eq!(engine.select_index(1), 0);
        assert_eq!(engine.select_index(2), 1);
        assert_eq!(engine.select_index(6), 1);
        assert_eq!(engine.select_index(7), 2);
    }

    #[test]
    fn test_reset_returns_to_cheapest() {
        let engine = engine(&profile(&["direct", "grayscale"], 1));
        let mut session = ScanSession::new(Instant::now());
        engine.record_failure(&mut session);
        engine.record_failure(&mut session);
        assert_eq!(session.active_strategy_index, 1);
        engine.reset(&mut session);
        assert_eq!(session.active_strategy_index, 0);
        assert_eq!(session.consecutive_failures, 0);
    }

    #[test]
    fn test_degraded_once_after_give_up_ticks() {
        let p = profile(&["direct", "grayscale"], 2).with_give_up_ticks(3);
        let engine = engine(&p);
        let mut session = ScanSession::new(Instant::now());
        let mut transitions = 0;
        for _ in 0..20 {
            if engine.record_failure(&mut session).became_degraded {
                transitions += 1;
            }
        }
        assert_eq!(transitions, 1);
        assert!(session.degraded);
        // 2 failures on `direct`, then 3 on `grayscale`
        assert!(!engine.is_exhausted(4));
        assert!(engine.is_exhausted(5));
    }

    #[test]
    fn test_gated_strategy_needs_capability() {
        let p = profile(&["direct", "torch-assist", "grayscale"], 5);
        let mut engine = engine(&p);
        assert_eq!(engine.eligible_ids(), vec!["direct", "grayscale"]);
        engine.set_capabilities(&DeviceCapabilities {
            torch: true,
            ..Default::default()
        });
        assert_eq!(engine.eligible_ids(), vec!["direct", "torch-assist", "grayscale"]);
    }

    #[tokio::test]
    async fn test_process_reports_strategy_and_decoder() {
        let pool = DecoderPool::new(vec![Arc::new(Always("ABC123")) as Arc<dyn DecodeBackend>], 8);
        let engine = StrategyEngine::from_profile(&profile(&["direct", "quadrants"], 1), pool).unwrap();
        let mut session = ScanSession::new(Instant::now());
        session.consecutive_failures = 1;
        let frame = Frame::from_luma(40, 40, &[200; 1600], Instant::now()).unwrap();
        let report = engine.process(frame, &mut session).await;
        assert_eq!(report.strategy_id, "quadrants");
        assert_eq!(report.candidates, 4);
        let result = report.result.unwrap();
        assert_eq!(result.payload, "ABC123");
        assert_eq!(result.strategy_id, "quadrants");
        assert_eq!(result.decoder_id, "always");
        assert_eq!(session.active_strategy_index, 1);
    }
}
