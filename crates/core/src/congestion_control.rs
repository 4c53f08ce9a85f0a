//! Congestion control interface for transport sockets.
//!
//! Transports hold the engine behind [`CongestionOps`] so a connection can be
//! forked into a new one without knowing the concrete clock type.
//!
//! ## Usage
//!
//! ```ignore
//! use mmwave_cc::congestion_control::CongestionOps;
//! use mmwave_cc::engine::{CongestionControlEngine, EngineConfig};
//!
//! let engine = CongestionControlEngine::new(EngineConfig::delay_gradient(2.0))?;
//! let mut ops: Box<dyn CongestionOps> = Box::new(engine);
//!
//! ops.on_ack(1, Duration::from_millis(8));
//! let ssthresh = ops.get_ssthresh(56_000);
//! ```

use std::fmt;
use std::time::Duration;

use crate::engine::{CaEvent, CongestionControlEngine, TcpCongState};
use crate::simulation::TimeSource;

// =============================================================================
// Algorithm Identification
// =============================================================================

/// Which layers of the engine are active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[non_exhaustive]
pub enum CongestionControlAlgorithm {
    /// CUBIC window growth with HyStart slow start exit
    #[default]
    Cubic,

    /// CUBIC plus delay-gradient window rescaling
    DelayGradient,
}

impl fmt::Display for CongestionControlAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionControlAlgorithm::Cubic => write!(f, "CUBIC"),
            CongestionControlAlgorithm::DelayGradient => write!(f, "CUBIC+DelayGradient"),
        }
    }
}

// =============================================================================
// Algorithm-Agnostic Statistics
// =============================================================================

/// Window and loss counters common to every engine configuration.
///
/// For layer-specific detail use [`CongestionControlEngine::stats`].
#[derive(Debug, Clone)]
pub struct CongestionControlStats {
    pub algorithm: CongestionControlAlgorithm,
    /// Current congestion window (bytes).
    pub cwnd: usize,
    /// Current slow start threshold (bytes).
    pub ssthresh: usize,
    /// Minimum observed RTT since the last loss reset.
    pub base_delay: Option<Duration>,
    /// Peak congestion window reached.
    pub peak_cwnd: usize,
    /// Loss notifications that recomputed ssthresh.
    pub total_losses: usize,
    /// Loss-state resets.
    pub total_timeouts: usize,
}

impl CongestionControlStats {
    /// Calculate effective bandwidth based on cwnd and RTT.
    ///
    /// Returns bytes per second, 0 for a zero RTT. Saturates at `usize::MAX`.
    pub fn effective_bandwidth(&self, rtt: Duration) -> usize {
        if rtt.is_zero() {
            return 0;
        }
        let bandwidth = self.cwnd as f64 / rtt.as_secs_f64();
        if !bandwidth.is_finite() || bandwidth > usize::MAX as f64 {
            usize::MAX
        } else if bandwidth < 0.0 {
            0
        } else {
            bandwidth as usize
        }
    }
}

// =============================================================================
// Congestion Control Trait
// =============================================================================

/// Operations a transport socket invokes on its congestion control.
///
/// Calls for one connection must be serialized; implementations do no
/// internal locking.
pub trait CongestionOps: Send {
    /// Diagnostic identifier.
    fn name(&self) -> &'static str;

    /// Highest sequence number handed to the network. Optional: without it
    /// slow start rounds are estimated from the window.
    fn on_send(&mut self, high_tx_mark: u64);

    /// New data acknowledged with an RTT sample.
    fn on_ack(&mut self, segments_acked: u32, rtt: Duration);

    /// Congestion event raised by the transport.
    fn on_congestion_event(&mut self, event: CaEvent);

    /// Transport congestion state transition.
    fn on_congestion_state_changed(&mut self, new_state: TcpCongState);

    /// Slow start threshold (bytes) after a loss.
    fn get_ssthresh(&mut self, bytes_in_flight: usize) -> usize;

    /// Independent instance with the same configuration and fresh state.
    fn fork(&mut self) -> Box<dyn CongestionOps>;

    /// Current congestion window (bytes).
    fn cwnd(&self) -> usize;

    /// Current slow start threshold (bytes).
    fn ssthresh(&self) -> usize;

    fn algorithm(&self) -> CongestionControlAlgorithm;

    fn stats(&self) -> CongestionControlStats;
}

impl<T: TimeSource> CongestionOps for CongestionControlEngine<T> {
    fn name(&self) -> &'static str {
        CongestionControlEngine::name(self)
    }

    fn on_send(&mut self, high_tx_mark: u64) {
        CongestionControlEngine::on_send(self, high_tx_mark)
    }

    fn on_ack(&mut self, segments_acked: u32, rtt: Duration) {
        CongestionControlEngine::on_ack(self, segments_acked, rtt)
    }

    fn on_congestion_event(&mut self, event: CaEvent) {
        CongestionControlEngine::on_congestion_event(self, event)
    }

    fn on_congestion_state_changed(&mut self, new_state: TcpCongState) {
        CongestionControlEngine::on_congestion_state_changed(self, new_state)
    }

    fn get_ssthresh(&mut self, bytes_in_flight: usize) -> usize {
        CongestionControlEngine::get_ssthresh(self, bytes_in_flight)
    }

    fn fork(&mut self) -> Box<dyn CongestionOps> {
        Box::new(CongestionControlEngine::fork(self))
    }

    fn cwnd(&self) -> usize {
        CongestionControlEngine::cwnd(self)
    }

    fn ssthresh(&self) -> usize {
        CongestionControlEngine::ssthresh(self)
    }

    fn algorithm(&self) -> CongestionControlAlgorithm {
        if self.config().gradient_enabled() {
            CongestionControlAlgorithm::DelayGradient
        } else {
            CongestionControlAlgorithm::Cubic
        }
    }

    fn stats(&self) -> CongestionControlStats {
        let stats = CongestionControlEngine::stats(self);
        CongestionControlStats {
            algorithm: CongestionOps::algorithm(self),
            cwnd: stats.cwnd,
            ssthresh: stats.ssthresh,
            base_delay: stats.delay_min,
            peak_cwnd: stats.peak_cwnd,
            total_losses: stats.total_losses,
            total_timeouts: stats.loss_state_resets,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineConfig;
    use crate::simulation::VirtualTime;

    fn boxed(config: EngineConfig) -> Box<dyn CongestionOps> {
        Box::new(
            CongestionControlEngine::new_with_time_source(config, VirtualTime::new())
                .expect("valid config"),
        )
    }

    #[test]
    fn test_algorithm_display() {
        assert_eq!(CongestionControlAlgorithm::Cubic.to_string(), "CUBIC");
        assert_eq!(
            CongestionControlAlgorithm::DelayGradient.to_string(),
            "CUBIC+DelayGradient"
        );
        assert_eq!(
            CongestionControlAlgorithm::default(),
            CongestionControlAlgorithm::Cubic
        );
    }

    #[test]
    fn test_algorithm_follows_config() {
        assert_eq!(
            boxed(EngineConfig::cubic()).algorithm(),
            CongestionControlAlgorithm::Cubic
        );
        assert_eq!(
            boxed(EngineConfig::delay_gradient(1.5)).algorithm(),
            CongestionControlAlgorithm::DelayGradient
        );
    }

    #[test]
    fn test_trait_object_drives_engine() {
        let mut ops = boxed(EngineConfig::default().with_initial_cwnd_segments(2));
        assert_eq!(ops.name(), "Tcp5G");

        ops.on_ack(1, Duration::from_millis(5));
        assert_eq!(ops.cwnd(), 4200);

        assert_eq!(ops.get_ssthresh(56_000), 39_200);
        assert_eq!(ops.ssthresh(), 39_200);

        ops.on_congestion_state_changed(TcpCongState::Loss);
        let stats = ops.stats();
        assert_eq!(stats.cwnd, 1400);
        assert_eq!(stats.total_losses, 1);
        assert_eq!(stats.total_timeouts, 1);
        assert_eq!(stats.base_delay, None);
    }

    #[test]
    fn test_hystart_exits_through_trait() {
        let time = VirtualTime::new();
        let mut ops: Box<dyn CongestionOps> = Box::new(
            CongestionControlEngine::new_with_time_source(
                EngineConfig::default()
                    .with_initial_cwnd_segments(8)
                    .with_hystart_low_window(4)
                    .with_hystart_detect_mask(1),
                time.clone(),
            )
            .expect("valid config"),
        );

        // No send marks: the first round spans ACKs 1-9, the second starts
        // on ACK 10 and the train outlasts the 10ms RTT on ACK 21
        let initial_ssthresh = ops.ssthresh();
        ops.on_ack(1, Duration::from_millis(10));
        for _ in 0..40 {
            time.advance(Duration::from_millis(1));
            ops.on_ack(1, Duration::from_millis(10));
        }
        assert!(ops.ssthresh() < initial_ssthresh);
        assert_eq!(ops.ssthresh(), 28 * 1400);
        assert!(ops.cwnd() >= ops.ssthresh());
        assert!(ops.cwnd() < 40 * 1400);
    }

    #[test]
    fn test_send_marks_through_trait() {
        let time = VirtualTime::new();
        let mut ops: Box<dyn CongestionOps> = Box::new(
            CongestionControlEngine::new_with_time_source(
                EngineConfig::default()
                    .with_initial_cwnd_segments(8)
                    .with_hystart_low_window(4)
                    .with_hystart_detect_mask(1),
                time.clone(),
            )
            .expect("valid config"),
        );
        ops.on_send(100_000);
        ops.on_ack(1, Duration::from_millis(10));
        for _ in 0..11 {
            time.advance(Duration::from_millis(1));
            ops.on_ack(1, Duration::from_millis(10));
        }
        // One round covers the whole train, so it exits on the 12th ACK
        assert_eq!(ops.ssthresh(), 19 * 1400);
    }

    #[test]
    fn test_fork_through_trait() {
        let mut ops = boxed(EngineConfig::default());
        ops.on_ack(4, Duration::from_millis(5));
        ops.on_congestion_event(CaEvent::Loss);

        let forked = ops.fork();
        assert_eq!(forked.cwnd(), 14_000);
        assert_eq!(forked.stats().total_timeouts, 0);
        assert_eq!(ops.cwnd(), 1400);
    }

    #[test]
    fn test_effective_bandwidth() {
        let stats = CongestionControlStats {
            algorithm: CongestionControlAlgorithm::Cubic,
            cwnd: 100_000,
            ssthresh: 200_000,
            base_delay: Some(Duration::from_millis(10)),
            peak_cwnd: 100_000,
            total_losses: 0,
            total_timeouts: 0,
        };
        assert_eq!(stats.effective_bandwidth(Duration::from_secs(1)), 100_000);
        assert_eq!(stats.effective_bandwidth(Duration::from_secs(2)), 50_000);
        assert_eq!(stats.effective_bandwidth(Duration::ZERO), 0);
    }
}
