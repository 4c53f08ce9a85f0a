//! Engine configuration and tuning constants.
//!
//! `EngineConfig` is immutable once validated and shared by reference between
//! an engine and all of its forks.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMicroSeconds};

use super::errors::ConfigError;

/// Segment size used when none is configured (bytes)
pub const DEFAULT_SEGMENT_SIZE: usize = 1400;

/// Lower bound of the congestion window, in segments
pub const MIN_CWND_SEGMENTS: usize = 1;

/// Lower bound of the slow start threshold, in segments
pub const MIN_SSTHRESH_SEGMENTS: usize = 2;

/// Upper bound of both cwnd and ssthresh, in segments
pub const MAX_CWND_SEGMENTS: usize = 1 << 20;

/// ACK count returned when the cubic target does not exceed cwnd.
/// Expressed as a multiple of the current window in segments.
pub(crate) const NO_GROWTH_ACK_FACTOR: u32 = 100;

/// Smallest ACK count CUBIC may return: at most one segment of growth
/// per two segments acknowledged (1.5x per RTT).
pub(crate) const MIN_ACK_THRESHOLD: u32 = 2;

/// Weight of the fresh delay-gradient target against the running mean.
pub(crate) const GRADIENT_ALPHA: f64 = 0.7;

/// Delay derivatives with a smaller magnitude are treated as flat.
pub(crate) const DERIVATIVE_DEADBAND: f64 = 0.02;

/// Base of the progressive growth factor applied in the safe zone.
pub(crate) const PROGRESSIVE_BASE: f64 = 1.5;

/// Safe-zone score below which the window is pinned regardless of history.
pub(crate) const HARD_CAP_SAFE_ZONE: f64 = -8.0;

/// How the delay-gradient layer is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateCadence {
    /// Recompute the delay gradient on every acknowledged packet.
    #[default]
    PerPacket,
    /// Recompute the delay gradient from a timer every `report_period`.
    Periodic,
}

/// How the delay-gradient target combines with CUBIC growth in
/// congestion avoidance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GradientBlend {
    /// CUBIC grows the window first, then the scaled target replaces it.
    #[default]
    Supplement,
    /// The scaled target is the only growth rule while the layer is active.
    Override,
}

/// Configuration for the delay-gradient CUBIC engine.
///
/// Durations are stored in microseconds when serialized.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Segment size (bytes)
    pub segment_size: usize,
    /// Initial congestion window (segments)
    pub initial_cwnd_segments: usize,
    /// Initial slow start threshold (bytes). `None` leaves slow start
    /// unbounded until the first loss or HyStart exit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_ssthresh: Option<usize>,

    /// Shrink the remembered maximum when losses come in quick succession
    pub fast_convergence: bool,
    /// Multiplicative decrease factor applied on loss
    pub beta: f64,
    /// Cubic scaling constant `C`
    #[serde(rename = "c")]
    pub scaling_constant: f64,
    /// Upper bound on the ACK count before the first loss
    pub cnt_clamp: u32,
    /// RTT samples this close to an epoch start are discarded
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    #[serde(rename = "cubic_delta_us")]
    pub cubic_delta: Duration,

    /// Enable HyStart slow start exit
    pub hystart_enabled: bool,
    /// Detectors allowed to end slow start: 1 = ack train, 2 = delay, 3 = both
    pub hystart_detect_mask: u8,
    /// HyStart only runs once cwnd reaches this many segments
    pub hystart_low_window: usize,
    /// RTT samples collected per round before the delay test applies
    pub hystart_min_samples: u32,
    /// Maximum spacing between ACKs that still counts as one train
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    #[serde(rename = "hystart_ack_delta_us")]
    pub hystart_ack_delta: Duration,
    /// Lower clamp of the delay-increase threshold
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    #[serde(rename = "hystart_delay_min_us")]
    pub hystart_delay_min: Duration,
    /// Upper clamp of the delay-increase threshold
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    #[serde(rename = "hystart_delay_max_us")]
    pub hystart_delay_max: Duration,

    /// Bad-delay threshold as a multiple of the minimum RTT. 0 disables the
    /// delay-gradient layer.
    pub rtt_threshold_factor: f64,
    /// Bad-delay threshold reported before any RTT has been observed. Never
    /// drives a rescale, since rescaling needs a sample.
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    #[serde(rename = "bad_delay_default_us")]
    pub bad_delay_default: Duration,
    /// Whether the delay gradient is updated per ACK or from a timer
    pub update_cadence: UpdateCadence,
    /// Timer period in `UpdateCadence::Periodic`
    #[serde_as(as = "DurationMicroSeconds<u64>")]
    #[serde(rename = "report_period_us")]
    pub report_period: Duration,
    /// Combination rule for the delay-gradient target
    pub gradient_blend: GradientBlend,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            segment_size: DEFAULT_SEGMENT_SIZE,
            initial_cwnd_segments: 10,
            initial_ssthresh: None,
            fast_convergence: true,
            beta: 0.7,
            scaling_constant: 0.4,
            cnt_clamp: 20,
            cubic_delta: Duration::from_millis(10),
            hystart_enabled: true,
            hystart_detect_mask: 3, // ack train | delay
            hystart_low_window: 16,
            hystart_min_samples: 8,
            hystart_ack_delta: Duration::from_millis(2),
            hystart_delay_min: Duration::from_millis(4),
            hystart_delay_max: Duration::from_millis(1000),
            rtt_threshold_factor: 0.0, // plain CUBIC
            bad_delay_default: Duration::from_millis(20),
            update_cadence: UpdateCadence::PerPacket,
            report_period: Duration::from_micros(20),
            gradient_blend: GradientBlend::Supplement,
        }
    }
}

impl EngineConfig {
    /// CUBIC with HyStart and no delay-gradient layer.
    pub fn cubic() -> Self {
        Self::default()
    }

    /// CUBIC with the delay-gradient layer enabled at the given bad-delay
    /// factor.
    pub fn delay_gradient(rtt_threshold_factor: f64) -> Self {
        Self {
            rtt_threshold_factor,
            ..Self::default()
        }
    }

    /// Parse a TOML document. Missing keys take their default values.
    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw)
    }

    /// Reject parameter combinations the engine cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.segment_size == 0 {
            return Err(ConfigError::InvalidSegmentSize);
        }
        if self.initial_cwnd_segments == 0 {
            return Err(ConfigError::InvalidInitialWindow);
        }
        if !(self.beta.is_finite() && self.beta > 0.0) {
            return Err(ConfigError::InvalidBeta(self.beta));
        }
        if !(self.scaling_constant.is_finite() && self.scaling_constant > 0.0) {
            return Err(ConfigError::InvalidScalingConstant(self.scaling_constant));
        }
        if !(1..=3).contains(&self.hystart_detect_mask) {
            return Err(ConfigError::InvalidDetectMask(self.hystart_detect_mask));
        }
        if self.hystart_delay_min > self.hystart_delay_max {
            return Err(ConfigError::InvalidHystartDelayBounds {
                min: self.hystart_delay_min,
                max: self.hystart_delay_max,
            });
        }
        if !(self.rtt_threshold_factor.is_finite() && self.rtt_threshold_factor >= 0.0) {
            return Err(ConfigError::InvalidRttThresholdFactor(
                self.rtt_threshold_factor,
            ));
        }
        if self.update_cadence == UpdateCadence::Periodic && self.report_period.is_zero() {
            return Err(ConfigError::InvalidReportPeriod);
        }
        Ok(())
    }

    /// Whether the delay-gradient layer participates at all.
    pub fn gradient_enabled(&self) -> bool {
        self.rtt_threshold_factor > 0.0
    }

    pub(crate) fn min_cwnd(&self) -> usize {
        MIN_CWND_SEGMENTS * self.segment_size
    }

    pub(crate) fn min_ssthresh(&self) -> usize {
        MIN_SSTHRESH_SEGMENTS * self.segment_size
    }

    pub(crate) fn max_cwnd(&self) -> usize {
        MAX_CWND_SEGMENTS.saturating_mul(self.segment_size)
    }

    pub(crate) fn initial_cwnd(&self) -> usize {
        self.initial_cwnd_segments
            .saturating_mul(self.segment_size)
            .clamp(self.min_cwnd(), self.max_cwnd())
    }

    pub(crate) fn initial_ssthresh(&self) -> usize {
        self.initial_ssthresh
            .unwrap_or(usize::MAX)
            .clamp(self.min_ssthresh(), self.max_cwnd())
    }

    // ---- builder helpers ----

    pub fn with_segment_size(mut self, segment_size: usize) -> Self {
        self.segment_size = segment_size;
        self
    }

    pub fn with_initial_cwnd_segments(mut self, segments: usize) -> Self {
        self.initial_cwnd_segments = segments;
        self
    }

    pub fn with_initial_ssthresh(mut self, bytes: usize) -> Self {
        self.initial_ssthresh = Some(bytes);
        self
    }

    pub fn with_fast_convergence(mut self, enabled: bool) -> Self {
        self.fast_convergence = enabled;
        self
    }

    pub fn with_beta(mut self, beta: f64) -> Self {
        self.beta = beta;
        self
    }

    pub fn with_scaling_constant(mut self, c: f64) -> Self {
        self.scaling_constant = c;
        self
    }

    pub fn with_hystart(mut self, enabled: bool) -> Self {
        self.hystart_enabled = enabled;
        self
    }

    pub fn with_hystart_detect_mask(mut self, mask: u8) -> Self {
        self.hystart_detect_mask = mask;
        self
    }

    pub fn with_hystart_low_window(mut self, segments: usize) -> Self {
        self.hystart_low_window = segments;
        self
    }

    pub fn with_rtt_threshold_factor(mut self, factor: f64) -> Self {
        self.rtt_threshold_factor = factor;
        self
    }

    pub fn with_update_cadence(mut self, cadence: UpdateCadence) -> Self {
        self.update_cadence = cadence;
        self
    }

    pub fn with_report_period(mut self, period: Duration) -> Self {
        self.report_period = period;
        self
    }

    pub fn with_gradient_blend(mut self, blend: GradientBlend) -> Self {
        self.gradient_blend = blend;
        self
    }
}
