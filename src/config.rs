//! Scan profiles
//!
//! Deployment differences (outdoor packet scanning vs. a generic desk
//! scanner) are expressed as [`ScanProfile`] data rather than code paths.
//! Profiles load from TOML, and a handful of tuning knobs can be overridden
//! from `SCAN_*` environment variables; unparsable values are ignored.

use crate::camera::CameraConstraintProfile;
use crate::decoder::BackendKind;
use crate::error::{Result, ScanError};
use crate::strategy::catalogue;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Highest tick rate a profile may request
pub const MAX_TARGET_FPS: u32 = 120;

fn parse_env_u64(name: &str) -> Option<u64> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
}

fn parse_env_u32(name: &str) -> Option<u32> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
}

fn parse_env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
}

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanProfile {
    /// Profile name, for logs
    pub name: String,

    /// Tick rate of the frame pipeline
    pub target_fps: u32,

    /// Built-in strategy ids, cheapest first
    pub strategy_order: Vec<String>,

    /// Consecutive failed ticks before escalating past a strategy
    pub escalation_threshold: u32,

    /// Per-strategy escalation thresholds
    pub escalation_overrides: BTreeMap<String, u32>,

    /// Ticks spent on the last strategy before reporting `Degraded`
    pub give_up_ticks: u64,

    /// Identical payloads inside this window are emitted once
    pub debounce_window_ms: u64,

    /// Maximum candidate × backend pairs per tick
    pub concurrency_cap: usize,

    /// Decode deadline per tick; one tick interval when unset
    pub decode_deadline_ms: Option<u64>,

    /// Pause after each accepted emission
    pub auto_pause_on_success: bool,

    /// Resume this long after an auto-pause; stay paused when unset
    pub auto_resume_after_ms: Option<u64>,

    /// Decode backends to register
    pub decoder_backends: Vec<BackendKind>,

    /// Torch state right after acquisition
    pub default_torch: bool,

    /// Camera acquisition ladder
    pub constraints: CameraConstraintProfile,
}

impl Default for ScanProfile {
    fn default() -> Self {
        Self::generic()
    }
}

impl ScanProfile {
    /// Balanced defaults for an unknown environment
    pub fn generic() -> Self {
        Self {
            name: "generic".to_string(),
            target_fps: 30,
            strategy_order: catalogue::default_order(),
            escalation_threshold: 8,
            escalation_overrides: BTreeMap::new(),
            give_up_ticks: 150,
            debounce_window_ms: 500,
            concurrency_cap: 8,
            decode_deadline_ms: None,
            auto_pause_on_success: false,
            auto_resume_after_ms: None,
            decoder_backends: vec![BackendKind::Rqrr, BackendKind::RqrrOtsu],
            default_torch: false,
            constraints: CameraConstraintProfile::default(),
        }
    }

    /// Outdoor scanning of labels on glossy packets
    ///
    /// Torch on from the start, contrast work first, quicker escalation, and
    /// a pause after every read so the operator can move to the next packet.
    pub fn agricultural_packet() -> Self {
        let order = [
            "contrast",
            "adaptive-threshold",
            "grayscale",
            "direct",
            "denoise",
            "sharpen",
            "center-region",
            "quadrants",
            "rotate",
            "scale",
        ];
        Self {
            name: "agricultural-packet".to_string(),
            strategy_order: order.iter().map(|s| s.to_string()).collect(),
            escalation_threshold: 5,
            escalation_overrides: BTreeMap::from([("rotate".to_string(), 10)]),
            give_up_ticks: 300,
            debounce_window_ms: 1000,
            auto_pause_on_success: true,
            auto_resume_after_ms: Some(1500),
            default_torch: true,
            ..Self::generic()
        }
    }

    /// Parse a TOML profile; missing keys take the generic defaults
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let profile: Self = toml::from_str(content)?;
        profile.validate()?;
        Ok(profile)
    }

    /// Load a TOML profile from disk
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Apply `SCAN_*` environment overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(fps) = parse_env_u32("SCAN_TARGET_FPS") {
            self.target_fps = fps;
        }
        if let Some(ms) = parse_env_u64("SCAN_DEBOUNCE_MS") {
            self.debounce_window_ms = ms;
        }
        if let Some(cap) = parse_env_usize("SCAN_CONCURRENCY_CAP") {
            self.concurrency_cap = cap;
        }
        if let Some(n) = parse_env_u32("SCAN_ESCALATION_THRESHOLD") {
            self.escalation_threshold = n;
        }
        if let Some(ticks) = parse_env_u64("SCAN_GIVE_UP_TICKS") {
            self.give_up_ticks = ticks;
        }
        self
    }

    /// Set the tick rate
    pub fn with_target_fps(mut self, fps: u32) -> Self {
        self.target_fps = fps;
        self
    }

    /// Set the strategy order
    pub fn with_strategy_order<I, S>(mut self, order: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.strategy_order = order.into_iter().map(Into::into).collect();
        self
    }

    /// Set the default escalation threshold
    pub fn with_escalation_threshold(mut self, n: u32) -> Self {
        self.escalation_threshold = n;
        self
    }

    /// Override the escalation threshold of one strategy
    pub fn with_escalation_override(mut self, strategy: &str, n: u32) -> Self {
        self.escalation_overrides.insert(strategy.to_string(), n);
        self
    }

    /// Set the giving-up tick count
    pub fn with_give_up_ticks(mut self, ticks: u64) -> Self {
        self.give_up_ticks = ticks;
        self
    }

    /// Set the debounce window
    pub fn with_debounce_window_ms(mut self, ms: u64) -> Self {
        self.debounce_window_ms = ms;
        self
    }

    /// Set the concurrency cap
    pub fn with_concurrency_cap(mut self, cap: usize) -> Self {
        self.concurrency_cap = cap;
        self
    }

    /// Set an explicit per-tick decode deadline
    pub fn with_decode_deadline_ms(mut self, ms: u64) -> Self {
        self.decode_deadline_ms = Some(ms);
        self
    }

    /// Enable auto-pause, optionally resuming after a cooldown
    pub fn with_auto_pause(mut self, resume_after_ms: Option<u64>) -> Self {
        self.auto_pause_on_success = true;
        self.auto_resume_after_ms = resume_after_ms;
        self
    }

    /// Set the decode backends
    pub fn with_decoder_backends(mut self, backends: Vec<BackendKind>) -> Self {
        self.decoder_backends = backends;
        self
    }

    /// Set the torch state applied after acquisition
    pub fn with_default_torch(mut self, on: bool) -> Self {
        self.default_torch = on;
        self
    }

    /// Set the constraint ladder
    pub fn with_constraints(mut self, constraints: CameraConstraintProfile) -> Self {
        self.constraints = constraints;
        self
    }

    /// Time between ticks
    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.target_fps.clamp(1, MAX_TARGET_FPS) as f64)
    }

    /// Deadline for one tick's decode race
    pub fn decode_deadline(&self) -> Duration {
        self.decode_deadline_ms
            .map(Duration::from_millis)
            .unwrap_or_else(|| self.tick_interval())
    }

    /// Debounce window as a duration
    pub fn debounce_window(&self) -> Duration {
        Duration::from_millis(self.debounce_window_ms)
    }

    /// Auto-resume cooldown as a duration
    pub fn auto_resume_after(&self) -> Option<Duration> {
        self.auto_resume_after_ms.map(Duration::from_millis)
    }

    /// Escalation threshold for one strategy
    pub fn threshold_for(&self, strategy: &str) -> u32 {
        self.escalation_overrides
            .get(strategy)
            .copied()
            .unwrap_or(self.escalation_threshold)
    }

    /// Check ranges and strategy names
    pub fn validate(&self) -> Result<()> {
        if !(1..=MAX_TARGET_FPS).contains(&self.target_fps) {
            return Err(ScanError::Config(format!(
                "target_fps must be within 1..={MAX_TARGET_FPS}, got {}",
                self.target_fps
            )));
        }
        if self.strategy_order.is_empty() {
            return Err(ScanError::Config("strategy_order is empty".to_string()));
        }
        let mut has_ungated = false;
        for id in &self.strategy_order {
            let strategy = catalogue::builtin(id)
                .ok_or_else(|| ScanError::Config(format!("unknown strategy `{id}`")))?;
            has_ungated |= strategy.required_capability.is_none();
        }
        if !has_ungated {
            return Err(ScanError::Config(
                "strategy_order needs at least one strategy without a device requirement"
                    .to_string(),
            ));
        }
        if self.escalation_threshold == 0 {
            return Err(ScanError::Config(
                "escalation_threshold must be at least 1".to_string(),
            ));
        }
        for (id, n) in &self.escalation_overrides {
            if catalogue::builtin(id).is_none() {
                return Err(ScanError::Config(format!(
                    "escalation override for unknown strategy `{id}`"
                )));
            }
            if *n == 0 {
                return Err(ScanError::Config(format!(
                    "escalation override for `{id}` must be at least 1"
                )));
            }
        }
        if self.concurrency_cap == 0 {
            return Err(ScanError::Config(
                "concurrency_cap must be at least 1".to_string(),
            ));
        }
        if self.concurrency_cap < self.decoder_backends.len() {
            return Err(ScanError::Config(format!(
                "concurrency_cap {} cannot cover one candidate on each of {} decoder backends",
                self.concurrency_cap,
                self.decoder_backends.len()
            )));
        }
        if self.decode_deadline_ms == Some(0) {
            return Err(ScanError::Config(
                "decode_deadline_ms must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    #[test]
    fn test_presets_validate() {
        ScanProfile::generic().validate().unwrap();
        ScanProfile::agricultural_packet().validate().unwrap();
    }

    #[test]
    fn test_torch_default_is_explicit_per_preset() {
        assert!(!ScanProfile::generic().default_torch);
        assert!(ScanProfile::agricultural_packet().default_torch);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let profile = ScanProfile::from_toml_str(
            r#"
            name = "dock"
            target_fps = 60
            strategy_order = ["direct", "adaptive-threshold"]
            decoder_backends = ["rqrr-otsu"]

            [escalation_overrides]
            direct = 3
            "#,
        )
        .unwrap();
        assert_eq!(profile.name, "dock");
        assert_eq!(profile.target_fps, 60);
        assert_eq!(profile.debounce_window_ms, 500);
        assert_eq!(profile.decoder_backends, vec![BackendKind::RqrrOtsu]);
        assert_eq!(profile.threshold_for("direct"), 3);
        assert_eq!(profile.threshold_for("adaptive-threshold"), 8);
    }

    #[test]
    fn test_constraint_ladder_from_toml() {
        let profile = ScanProfile::from_toml_str(
            r#"
            [[constraints]]
            width = 1280
            height = 720
            facing = "environment"

            [[constraints]]
            "#,
        )
        .unwrap();
        assert_eq!(profile.constraints.sets().len(), 2);
        assert_eq!(profile.constraints.sets()[0].width, Some(1280));
        assert_eq!(profile.constraints.sets()[1].width, None);
    }

    #[test]
    fn test_rejects_out_of_range() {
        let bad_fps = ScanProfile::generic().with_target_fps(0);
        assert!(matches!(bad_fps.validate(), Err(ScanError::Config(_))));
        let too_fast = ScanProfile::generic().with_target_fps(MAX_TARGET_FPS + 1);
        assert!(too_fast.validate().is_err());
        let unknown = ScanProfile::generic().with_strategy_order(["direct", "x-ray"]);
        assert!(unknown.validate().is_err());
        let gated_only = ScanProfile::generic().with_strategy_order(["torch-assist"]);
        assert!(gated_only.validate().is_err());
        assert!(
            ScanProfile::generic()
                .with_escalation_threshold(0)
                .validate()
                .is_err()
        );
        let starved = ScanProfile::generic().with_concurrency_cap(1);
        assert!(matches!(starved.validate(), Err(ScanError::Config(_))));
        ScanProfile::generic()
            .with_concurrency_cap(2)
            .validate()
            .unwrap();
    }

    static ENV_LOCK: Mutex<()> = Mutex::new(());

    #[test]
    fn test_env_overrides_apply_valid_values_only() {
        let _guard = ENV_LOCK.lock().unwrap_or_else(|e| e.into_inner());
        unsafe {
            env::set_var("SCAN_DEBOUNCE_MS", "750");
            env::set_var("SCAN_TARGET_FPS", "fast");
        }
        let profile = ScanProfile::generic().with_env_overrides();
        unsafe {
            env::remove_var("SCAN_DEBOUNCE_MS");
            env::remove_var("SCAN_TARGET_FPS");
        }
        assert_eq!(profile.debounce_window_ms, 750);
        assert_eq!(profile.target_fps, 30);
    }

    #[test]
    fn test_toml_parse_error_is_reported() {
        let err = ScanProfile::from_toml_str("target_fps = \"fast\"").unwrap_err();
        assert!(matches!(err, ScanError::ProfileParse(_)));
    }

    #[test]
    fn test_deadline_defaults_to_tick_interval() {
        let profile = ScanProfile::generic().with_target_fps(50);
        assert_eq!(profile.tick_interval(), Duration::from_millis(20));
        assert_eq!(profile.decode_deadline(), Duration::from_millis(20));
        let explicit = profile.with_decode_deadline_ms(75);
        assert_eq!(explicit.decode_deadline(), Duration::from_millis(75));
    }
}
