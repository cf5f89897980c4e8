use super::{DecodeBackend, Decoded};
use crate::models::{DecodeCandidate, DecodeResult, Point};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// The first successful decode of a race
#[derive(Debug, Clone, PartialEq)]
pub struct RaceWin {
    /// Decoded text
    pub payload: String,
    /// Backend that produced it
    pub decoder_id: String,
    /// Label of the winning candidate
    pub candidate_label: String,
    /// Time from race start to this decode
    pub latency: Duration,
    /// Corners in source-frame coordinates
    pub bounding_polygon: Option<[Point; 4]>,
}

impl RaceWin {
    /// Attach the strategy that produced the candidates
    pub fn into_result(self, strategy_id: &str) -> DecodeResult {
        DecodeResult {
            payload: self.payload,
            strategy_id: strategy_id.to_string(),
            decoder_id: self.decoder_id,
            latency: self.latency,
            bounding_polygon: self.bounding_polygon,
            candidate_label: self.candidate_label,
        }
    }
}

/// What one race did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RaceOutcome {
    /// First decode to resolve, if any
    pub winner: Option<RaceWin>,
    /// Candidate × backend pairs started
    pub attempts: usize,
    /// Candidates dropped by the concurrency cap
    pub dropped: usize,
}

/// Races every registered backend against every candidate
///
/// Pairs run on the blocking thread pool. The first non-empty result wins.
/// Once a race has returned or been dropped at its deadline, pairs that have
/// not started yet are skipped; pairs already decoding finish on their own
/// `Arc`ed copy of the candidate and their result is discarded.
#[derive(Clone)]
pub struct DecoderPool {
    backends: Vec<Arc<dyn DecodeBackend>>,
    concurrency_cap: usize,
}

impl DecoderPool {
    /// Pool over `backends`, running at most `concurrency_cap` pairs per race
    pub fn new(backends: Vec<Arc<dyn DecodeBackend>>, concurrency_cap: usize) -> Self {
        Self {
            backends,
            concurrency_cap: concurrency_cap.max(1),
        }
    }

    /// Register another backend
    pub fn with_backend(mut self, backend: Arc<dyn DecodeBackend>) -> Self {
        self.backends.push(backend);
        self
    }

    /// Ids of the registered backends, in registration order
    pub fn backend_ids(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.id().to_string()).collect()
    }

    /// Maximum concurrent pairs per race
    pub fn concurrency_cap(&self) -> usize {
        self.concurrency_cap
    }

    /// Keep the most valuable candidates that fit under the cap
    ///
    /// Candidates are ordered by priority (stable, so catalogue order breaks
    /// ties) and the tail is dropped. At least one candidate always survives
    /// and runs on every backend, so a cap below the backend count still
    /// starts one pair per backend. Profiles reject such a cap up front.
    pub fn admit(&self, mut candidates: Vec<DecodeCandidate>) -> (Vec<DecodeCandidate>, usize) {
        if candidates.is_empty() {
            return (candidates, 0);
        }
        candidates.sort_by_key(|c| c.priority);
        let per_candidate = self.backends.len().max(1);
        let keep = (self.concurrency_cap / per_candidate)
            .max(1)
            .min(candidates.len());
        let dropped = candidates.len() - keep;
        candidates.truncate(keep);
        (candidates, dropped)
    }

    /// Resolve with the first decode across all candidate × backend pairs
    pub async fn race(&self, candidates: Vec<DecodeCandidate>) -> RaceOutcome {
        if self.backends.is_empty() {
            return RaceOutcome::default();
        }
        let started = Instant::now();
        let (admitted, dropped) = self.admit(candidates);
        if dropped > 0 {
            debug!(dropped, kept = admitted.len(), "Concurrency cap dropped candidates");
        }

        let settled = Settled::default();
        let mut tasks = FuturesUnordered::new();
        for candidate in admitted {
            let candidate = Arc::new(candidate);
            for backend in &self.backends {
                let backend = Arc::clone(backend);
                let candidate = Arc::clone(&candidate);
                let abandoned = Arc::clone(&settled.0);
                tasks.push(tokio::task::spawn_blocking(move || {
                    if abandoned.load(Ordering::Acquire) {
                        return None;
                    }
                    run_pair(backend.as_ref(), &candidate, started)
                }));
            }
        }
        let attempts = tasks.len();

        while let Some(joined) = tasks.next().await {
            match joined {
                Ok(Some(win)) => {
                    trace!(
                        decoder = %win.decoder_id,
                        candidate = %win.candidate_label,
                        latency_ms = win.latency.as_secs_f64() * 1000.0,
                        "Race won"
                    );
                    return RaceOutcome {
                        winner: Some(win),
                        attempts,
                        dropped,
                    };
                }
                Ok(None) => {}
                Err(err) => warn!(error = %err, "Decode task failed"),
            }
        }

        RaceOutcome {
            winner: None,
            attempts,
            dropped,
        }
    }
}

/// Raised when a race returns or its future is dropped
#[derive(Default)]
struct Settled(Arc<AtomicBool>);

impl Drop for Settled {
    fn drop(&mut self) {
        self.0.store(true, Ordering::Release);
    }
}

impl std::fmt::Debug for DecoderPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecoderPool")
            .field("backends", &self.backend_ids())
            .field("concurrency_cap", &self.concurrency_cap)
            .finish()
    }
}

fn run_pair(
    backend: &dyn DecodeBackend,
    candidate: &DecodeCandidate,
    started: Instant,
) -> Option<RaceWin> {
    let Decoded { payload, polygon } = backend.decode(candidate)?;
    let geometry = candidate.geometry;
    Some(RaceWin {
        payload,
        decoder_id: backend.id().to_string(),
        candidate_label: candidate.label.clone(),
        latency: started.elapsed(),
        bounding_polygon: polygon.map(|corners| corners.map(|p| geometry.to_source(p))),
    })
}
