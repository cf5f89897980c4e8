//! Built-in strategies
//!
//! A strategy is an enhancement chain plus a fan-out rule that turns one
//! frame into one or more decode candidates. The catalogue is ordered from
//! cheapest to most aggressive; profiles pick and reorder entries by id.

use crate::camera::Capability;
use crate::enhance::{Enhancement, ThresholdMode};
use crate::models::Region;
use serde::{Deserialize, Serialize};

/// A value tagged with how valuable its candidate is (0 = most)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Weighted<T> {
    /// Region, angle or factor
    pub value: T,
    /// Candidate priority under the concurrency cap
    pub priority: u8,
}

impl<T> Weighted<T> {
    /// Tag `value` with `priority`
    pub const fn new(value: T, priority: u8) -> Self {
        Self { value, priority }
    }
}

/// How an enhanced frame becomes decode candidates
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "kind")]
pub enum FanOut {
    /// One candidate: the whole frame
    Whole,
    /// One candidate per region crop
    Regions {
        /// Crops as fractions of the frame
        regions: Vec<Weighted<Region>>,
    },
    /// One candidate per rotation, in degrees
    Rotations {
        /// Rotation angles
        angles: Vec<Weighted<f32>>,
    },
    /// One candidate per resize factor
    Scales {
        /// Resize factors
        factors: Vec<Weighted<f32>>,
    },
}

impl FanOut {
    /// Number of candidates this rule produces per frame
    pub fn width(&self) -> usize {
        match self {
            FanOut::Whole => 1,
            FanOut::Regions { regions } => regions.len(),
            FanOut::Rotations { angles } => angles.len(),
            FanOut::Scales { factors } => factors.len(),
        }
    }
}

/// A named transform + region combination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    /// Stable identifier used in profiles, results and diagnostics
    pub id: String,
    /// Enhancement chain applied before (or, for regions, after) fan-out
    pub steps: Vec<Enhancement>,
    /// Candidate fan-out
    pub fan_out: FanOut,
    /// Device feature the strategy depends on
    pub required_capability: Option<Capability>,
    /// Turn the torch on while this strategy is active
    pub torch_assist: bool,
}

impl Strategy {
    fn new(id: &str, steps: Vec<Enhancement>, fan_out: FanOut) -> Self {
        Self {
            id: id.to_string(),
            steps,
            fan_out,
            required_capability: None,
            torch_assist: false,
        }
    }
}

/// Contrast factor used by the contrast strategies
pub const CONTRAST_FACTOR: f32 = 1.8;

/// Overlap added to each quadrant so codes on the seams survive
pub const QUADRANT_OVERLAP: f32 = 0.1;

/// Ids of every built-in strategy, in default order
pub const BUILTIN_IDS: &[&str] = &[
    "direct",
    "grayscale",
    "contrast",
    "sharpen",
    "denoise",
    "adaptive-threshold",
    "torch-assist",
    "center-region",
    "quadrants",
    "rotate",
    "scale",
];

/// Default strategy order
pub fn default_order() -> Vec<String> {
    BUILTIN_IDS.iter().map(|id| id.to_string()).collect()
}

/// Look up a built-in strategy
pub fn builtin(id: &str) -> Option<Strategy> {
    let gray = Enhancement::Grayscale;
    let contrast = Enhancement::Contrast {
        factor: CONTRAST_FACTOR,
    };
    let strategy = match id {
        "direct" => Strategy::new(id, vec![], FanOut::Whole),
        "grayscale" => Strategy::new(id, vec![gray], FanOut::Whole),
        "contrast" => Strategy::new(id, vec![gray, contrast], FanOut::Whole),
        "sharpen" => Strategy::new(id, vec![gray, Enhancement::Sharpen], FanOut::Whole),
        "denoise" => Strategy::new(id, vec![gray, Enhancement::Denoise], FanOut::Whole),
        "adaptive-threshold" => Strategy::new(
            id,
            vec![
                gray,
                Enhancement::Threshold {
                    mode: ThresholdMode::adaptive(),
                },
            ],
            FanOut::Whole,
        ),
        "torch-assist" => Strategy {
            required_capability: Some(Capability::Torch),
            torch_assist: true,
            ..Strategy::new(id, vec![gray, contrast], FanOut::Whole)
        },
        "center-region" => Strategy::new(
            id,
            vec![gray],
            FanOut::Regions {
                regions: vec![Weighted::new(Region::center(0.5), 0)],
            },
        ),
        "quadrants" => Strategy::new(
            id,
            vec![gray],
            FanOut::Regions {
                regions: Region::quadrants(QUADRANT_OVERLAP)
                    .into_iter()
                    .map(|r| Weighted::new(r, 1))
                    .collect(),
            },
        ),
        "rotate" => Strategy::new(
            id,
            vec![gray],
            FanOut::Rotations {
                angles: vec![
                    Weighted::new(5.0, 0),
                    Weighted::new(-5.0, 0),
                    Weighted::new(10.0, 1),
                    Weighted::new(-10.0, 1),
                ],
            },
        ),
        "scale" => Strategy::new(
            id,
            vec![gray],
            FanOut::Scales {
                factors: vec![
                    Weighted::new(0.5, 0),
                    Weighted::new(1.5, 1),
                    Weighted::new(2.0, 2),
                ],
            },
        ),
        _ => return None,
    };
    Some(strategy)
}
