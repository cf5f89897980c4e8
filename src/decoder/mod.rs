//! Decode backends and the racing pool
//!
//! A backend turns one candidate into at most one payload. The pool runs
//! every registered backend against every candidate of a tick and keeps the
//! first payload that comes back.

pub mod pool;
pub mod rqrr_backend;

pub use pool::DecoderPool;
pub use rqrr_backend::{Binarization, RqrrBackend};

use crate::models::{DecodeCandidate, Point};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// What a backend found in a candidate
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    /// Decoded text
    pub payload: String,
    /// Corners of the code in candidate coordinates, if known
    pub polygon: Option<[Point; 4]>,
}

impl Decoded {
    /// Payload without location information
    pub fn text(payload: impl Into<String>) -> Self {
        Self {
            payload: payload.into(),
            polygon: None,
        }
    }
}

/// An independent decoder for the code format
///
/// Implementations are called from blocking worker threads and must not
/// assume anything about which thread or in which order they run.
pub trait DecodeBackend: Send + Sync {
    /// Stable identifier recorded in results and diagnostics
    fn id(&self) -> &str;

    /// Try to decode a single candidate
    fn decode(&self, candidate: &DecodeCandidate) -> Option<Decoded>;
}

/// Backends that can be named from a profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BackendKind {
    /// rqrr on the luma plane
    Rqrr,
    /// rqrr on an Otsu-binarised bitmap
    RqrrOtsu,
}

impl BackendKind {
    /// Profile name of this backend
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Rqrr => "rqrr",
            BackendKind::RqrrOtsu => "rqrr-otsu",
        }
    }

    /// Instantiate the backend
    pub fn build(&self) -> Arc<dyn DecodeBackend> {
        match self {
            BackendKind::Rqrr => Arc::new(RqrrBackend::new(Binarization::Greyscale)),
            BackendKind::RqrrOtsu => Arc::new(RqrrBackend::new(Binarization::Otsu)),
        }
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
