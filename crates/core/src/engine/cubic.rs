//! CUBIC window growth model.
//!
//! The window follows `W(t) = C·(t − K)³ + W_origin` where `t` is measured from
//! the start of the current congestion avoidance epoch. Growth is expressed as
//! an ACK count: the number of acknowledged segments that must accumulate
//! before cwnd may grow by one segment.

use std::sync::Arc;
use std::time::Duration;

use super::config::{EngineConfig, MIN_ACK_THRESHOLD, NO_GROWTH_ACK_FACTOR};

/// CUBIC epoch state and window arithmetic.
#[derive(Debug, Clone)]
pub struct CubicWindowModel {
    config: Arc<EngineConfig>,
    /// Window before the last reduction (segments, 0 = no loss yet)
    last_max_cwnd: u32,
    /// Window the curve is centred on (segments)
    bic_origin_point: u32,
    /// Time for the curve to climb back to the origin (seconds)
    bic_k: f64,
    epoch_start: Option<Duration>,
    last_target: f64,
}

impl CubicWindowModel {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        Self {
            config,
            last_max_cwnd: 0,
            bic_origin_point: 0,
            bic_k: 0.0,
            epoch_start: None,
            last_target: 0.0,
        }
    }

    /// ACKs required before cwnd grows by one segment.
    ///
    /// Opens a new epoch on the first call after a loss, fitting the curve so
    /// that it passes through `last_max_cwnd` after `K` seconds. An unset
    /// `delay_min` contributes nothing to the epoch clock. Never returns less
    /// than 2.
    pub fn compute_ack_threshold(
        &mut self,
        cwnd_segments: u32,
        now: Duration,
        delay_min: Option<Duration>,
    ) -> u32 {
        let cwnd_segments = cwnd_segments.max(1);
        let epoch_start = match self.epoch_start {
            Some(start) => start,
            None => {
                self.open_epoch(cwnd_segments, now);
                now
            }
        };

        let t = (now + delay_min.unwrap_or_default())
            .saturating_sub(epoch_start)
            .as_secs_f64();
        let offset = (t - self.bic_k).abs();
        let delta = self.config.scaling_constant * offset.powi(3);
        let origin = self.bic_origin_point as f64;
        let target = if t < self.bic_k {
            origin - delta
        } else {
            origin + delta
        };
        self.last_target = target;

        let cwnd = cwnd_segments as f64;
        let mut count = if target > cwnd {
            // `as` saturates, so a vanishing gap maps to u32::MAX
            (cwnd / (target - cwnd)) as u32
        } else {
            NO_GROWTH_ACK_FACTOR.saturating_mul(cwnd_segments)
        };

        if self.last_max_cwnd == 0 && count > self.config.cnt_clamp {
            count = self.config.cnt_clamp;
        }

        tracing::trace!(
            cwnd_segments,
            t_secs = t,
            target_segments = target,
            count,
            "CUBIC ack threshold"
        );

        count.max(MIN_ACK_THRESHOLD)
    }

    fn open_epoch(&mut self, cwnd_segments: u32, now: Duration) {
        self.epoch_start = Some(now);
        if self.last_max_cwnd <= cwnd_segments {
            self.bic_k = 0.0;
            self.bic_origin_point = cwnd_segments;
        } else {
            let gap = (self.last_max_cwnd - cwnd_segments) as f64;
            self.bic_k = (gap / self.config.scaling_constant).cbrt();
            self.bic_origin_point = self.last_max_cwnd;
        }
        tracing::debug!(
            cwnd_segments,
            last_max_cwnd = self.last_max_cwnd,
            origin = self.bic_origin_point,
            k_secs = self.bic_k,
            "CUBIC epoch started"
        );
    }

    /// Record a loss and return the new slow start threshold in bytes.
    ///
    /// Closes the current epoch; the next threshold computation opens a fresh
    /// one with a recomputed `K`.
    pub fn on_loss(
        &mut self,
        cwnd_segments: u32,
        bytes_in_flight: usize,
        segment_size: usize,
    ) -> usize {
        let beta = self.config.beta;
        self.last_max_cwnd = if self.config.fast_convergence && cwnd_segments < self.last_max_cwnd
        {
            (cwnd_segments as f64 * (1.0 + beta) / 2.0) as u32
        } else {
            cwnd_segments
        };
        self.epoch_start = None;

        let segments_in_flight = bytes_in_flight / segment_size.max(1);
        let ssthresh_segments = ((segments_in_flight as f64 * beta).round() as usize).max(2);

        tracing::debug!(
            cwnd_segments,
            segments_in_flight,
            last_max_cwnd = self.last_max_cwnd,
            ssthresh_segments,
            "CUBIC loss"
        );

        ssthresh_segments.saturating_mul(segment_size)
    }

    /// Forget everything learned about the path.
    pub fn reset(&mut self) {
        self.last_max_cwnd = 0;
        self.bic_origin_point = 0;
        self.bic_k = 0.0;
        self.epoch_start = None;
        self.last_target = 0.0;
    }

    /// Slide an open epoch forward by an idle period so the curve resumes
    /// where it left off.
    pub fn shift_epoch(&mut self, idle: Duration, now: Duration) {
        if let Some(start) = self.epoch_start {
            let shifted = (start + idle).min(now);
            tracing::trace!(idle_ms = idle.as_millis() as u64, "CUBIC epoch shifted after idle");
            self.epoch_start = Some(shifted);
        }
    }

    pub fn last_max_cwnd(&self) -> u32 {
        self.last_max_cwnd
    }

    pub fn bic_origin_point(&self) -> u32 {
        self.bic_origin_point
    }

    pub fn bic_k(&self) -> f64 {
        self.bic_k
    }

    pub fn epoch_start(&self) -> Option<Duration> {
        self.epoch_start
    }

    /// Target window (segments) from the most recent threshold computation.
    pub fn last_target(&self) -> f64 {
        self.last_target
    }
}
