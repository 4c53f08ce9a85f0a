//! Delay-gradient window adaptation.
//!
//! Tracks how fast the RTT is moving and where it sits relative to a
//! "bad delay" threshold (`rtt_threshold_factor × min_rtt`), then rescales
//! the window:
//!
//! | zone | condition | target |
//! |------|-----------|--------|
//! | progressive | safe ≥ 0, delay falling | `1.5^coef · cwnd` |
//! | future growth | safe ≥ 0, predicted over threshold, future > −1 | `2^future · cwnd` |
//! | future collapse | safe ≥ 0, predicted over threshold, future ≤ −1 | min window |
//! | hold | safe ≥ 0, otherwise | `cwnd` |
//! | caution | −1 < safe < 0 | `2^(safe − 1) · cwnd` |
//! | danger | safe ≤ −1 | min window |
//!
//! `coef` is a logistic-squashed normal sample centred on the running mean of
//! the delay derivative. Every target is blended with the running mean of
//! previous targets before being applied.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::config::{
    EngineConfig, DERIVATIVE_DEADBAND, GRADIENT_ALPHA, HARD_CAP_SAFE_ZONE, MAX_CWND_SEGMENTS,
    MIN_CWND_SEGMENTS, PROGRESSIVE_BASE,
};
use super::rng::GaussianSource;

/// Branch of the control law chosen for a rescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GradientZone {
    Progressive,
    FutureGrowth,
    FutureCollapse,
    Hold,
    Caution,
    Danger,
}

impl fmt::Display for GradientZone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            GradientZone::Progressive => "progressive",
            GradientZone::FutureGrowth => "future-growth",
            GradientZone::FutureCollapse => "future-collapse",
            GradientZone::Hold => "hold",
            GradientZone::Caution => "caution",
            GradientZone::Danger => "danger",
        };
        f.write_str(name)
    }
}

/// Result of one rescale.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScaledTarget {
    /// New window (segments)
    pub segments: usize,
    pub zone: GradientZone,
    /// Delay is far past the threshold (safe zone below -8)
    pub hard_cap: bool,
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Delay-gradient state for one connection.
#[derive(Debug)]
pub struct DelayGradientAdaptor {
    config: Arc<EngineConfig>,
    rng: Box<dyn GaussianSource>,

    current_delay: Option<Duration>,
    min_rtt: Option<Duration>,
    prev_delay: Option<Duration>,
    last_update: Option<Duration>,

    delay_derivative: f64,
    derivative_sum: f64,
    derivative_count: u64,

    safe_zone: f64,
    future_safe_zone: f64,
    future_cat: bool,

    cwnd_sum: f64,
    cwnd_count: u64,
}

impl DelayGradientAdaptor {
    pub fn new(config: Arc<EngineConfig>, rng: Box<dyn GaussianSource>) -> Self {
        Self {
            config,
            rng,
            current_delay: None,
            min_rtt: None,
            prev_delay: None,
            last_update: None,
            delay_derivative: 0.0,
            derivative_sum: 0.0,
            derivative_count: 0,
            safe_zone: 1.0,
            future_safe_zone: 1.0,
            future_cat: false,
            cwnd_sum: 0.0,
            cwnd_count: 0,
        }
    }

    /// Fresh adaptor for a forked engine, drawing from a derived random stream.
    pub fn fork(&mut self) -> Self {
        Self::new(self.config.clone(), self.rng.fork())
    }

    /// Bad-delay threshold, or `None` while the layer cannot divide by it.
    ///
    /// Before the first RTT sample this reports `bad_delay_default`. No
    /// rescale happens until a sample arrives, and the sample also sets the
    /// minimum RTT, so the default is informational only.
    pub fn bad_delay(&self) -> Option<Duration> {
        if !self.config.gradient_enabled() {
            return None;
        }
        let bad = match self.min_rtt {
            Some(min_rtt) => {
                let secs = min_rtt.as_secs_f64() * self.config.rtt_threshold_factor;
                Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX)
            }
            None => self.config.bad_delay_default,
        };
        (!bad.is_zero()).then_some(bad)
    }

    /// Fold an RTT sample taken at `now` into the gradient and zone scores.
    pub fn update(&mut self, rtt: Duration, now: Duration) {
        let min_rtt = match self.min_rtt {
            Some(min) if min <= rtt => min,
            _ => rtt,
        };
        self.min_rtt = Some(min_rtt);
        self.current_delay = Some(rtt);

        let mut predicted = 0.0;
        let elapsed = self.last_update.map(|last| now.saturating_sub(last).as_secs_f64());
        match (elapsed, self.prev_delay) {
            // Same instant as the previous update: nothing to differentiate,
            // only the zone scores follow the new delay
            (Some(elapsed), Some(_)) if elapsed <= 0.0 => {}
            (elapsed, prev) => {
                if let (Some(elapsed), Some(prev)) = (elapsed, prev) {
                    let mut derivative = (rtt.as_secs_f64() - prev.as_secs_f64()) / elapsed;
                    if derivative.abs() < DERIVATIVE_DEADBAND {
                        derivative = 0.0;
                    }
                    self.delay_derivative = derivative;
                    self.derivative_sum += derivative;
                    self.derivative_count += 1;
                    predicted = derivative * elapsed;
                }
                self.prev_delay = Some(rtt);
                self.last_update = Some(now);
            }
        }

        let Some(bad) = self.bad_delay() else {
            return;
        };
        let bad = bad.as_secs_f64();
        let queueing = rtt.saturating_sub(min_rtt).as_secs_f64();
        self.safe_zone = 1.0 - queueing / bad;
        self.future_cat = predicted + queueing > bad;
        self.future_safe_zone = 1.0 - (predicted + queueing) / bad;

        tracing::trace!(
            rtt_ms = rtt.as_secs_f64() * 1000.0,
            derivative = self.delay_derivative,
            safe_zone = self.safe_zone,
            future_safe_zone = self.future_safe_zone,
            future_cat = self.future_cat,
            "delay gradient update"
        );
    }

    /// Rescale a window of `cwnd_segments`. Returns `None` while the bad-delay
    /// threshold is unavailable or no sample has been seen yet.
    pub fn compute_scaled_target(&mut self, cwnd_segments: usize) -> Option<ScaledTarget> {
        self.bad_delay()?;
        self.current_delay?;

        let cwnd = cwnd_segments as f64;
        let min_window = MIN_CWND_SEGMENTS as f64;
        let (zone, raw) = if self.safe_zone >= 0.0 {
            if self.delay_derivative < 0.0 {
                let coef = self.progressive_coefficient();
                (GradientZone::Progressive, (PROGRESSIVE_BASE.powf(coef) * cwnd).floor())
            } else if self.future_cat && self.future_safe_zone > -1.0 {
                (
                    GradientZone::FutureGrowth,
                    (2f64.powf(self.future_safe_zone) * cwnd).floor(),
                )
            } else if self.future_cat {
                (GradientZone::FutureCollapse, min_window)
            } else {
                (GradientZone::Hold, cwnd)
            }
        } else if self.safe_zone > -1.0 {
            (
                GradientZone::Caution,
                (2f64.powf(self.safe_zone - 1.0) * cwnd).floor(),
            )
        } else {
            (GradientZone::Danger, min_window)
        };

        let hard_cap = self.safe_zone < HARD_CAP_SAFE_ZONE;
        let blended = match self.running_cwnd_mean() {
            Some(mean) => GRADIENT_ALPHA * raw + (1.0 - GRADIENT_ALPHA) * mean,
            None => raw,
        };
        let segments = (blended.floor() as usize).clamp(MIN_CWND_SEGMENTS, MAX_CWND_SEGMENTS);

        self.cwnd_sum += segments as f64;
        self.cwnd_count += 1;

        if hard_cap {
            tracing::warn!(
                safe_zone = self.safe_zone,
                cwnd_segments,
                target_segments = segments,
                "Delay far beyond threshold"
            );
        } else {
            tracing::debug!(
                %zone,
                cwnd_segments,
                target_segments = segments,
                safe_zone = self.safe_zone,
                "Delay-gradient rescale"
            );
        }

        Some(ScaledTarget {
            segments,
            zone,
            hard_cap,
        })
    }

    fn progressive_coefficient(&mut self) -> f64 {
        let mean = self.derivative_mean();
        let std_dev = (mean / 4.0).abs().sqrt();
        logistic(self.rng.sample(mean, std_dev))
    }

    /// Mean of all delay derivatives measured so far.
    pub fn derivative_mean(&self) -> f64 {
        if self.derivative_count == 0 {
            0.0
        } else {
            self.derivative_sum / self.derivative_count as f64
        }
    }

    /// Mean of all applied targets (segments).
    pub fn running_cwnd_mean(&self) -> Option<f64> {
        (self.cwnd_count > 0).then(|| self.cwnd_sum / self.cwnd_count as f64)
    }

    pub fn delay_derivative(&self) -> f64 {
        self.delay_derivative
    }

    pub fn safe_zone(&self) -> f64 {
        self.safe_zone
    }

    pub fn future_safe_zone(&self) -> f64 {
        self.future_safe_zone
    }

    pub fn future_cat(&self) -> bool {
        self.future_cat
    }

    pub fn min_rtt(&self) -> Option<Duration> {
        self.min_rtt
    }

    pub fn current_delay(&self) -> Option<Duration> {
        self.current_delay
    }
}
