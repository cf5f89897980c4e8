//! Escalating strategy catalogue
//!
//! - `catalogue`: the built-in strategies and their fan-out rules
//! - `candidates`: turning a frame into decode candidates
//! - `engine`: escalation state and per-tick processing

pub mod candidates;
pub mod catalogue;
pub mod engine;

pub use candidates::build_candidates;
pub use catalogue::{FanOut, Strategy, Weighted};
pub use engine::{Escalation, StrategyEngine, TickReport};
