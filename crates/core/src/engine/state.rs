//! Per-connection congestion state and the events that drive it.

use std::fmt;
use std::time::Duration;

use super::config::EngineConfig;

/// Phase the engine reports to the transport.
///
/// ```text
/// ┌─────────────┐  cwnd >= ssthresh / HyStart exit  ┌──────────────────────┐
/// │  SlowStart  │──────────────────────────────────►│ CongestionAvoidance  │
/// └─────────────┘                                   └──────────┬───────────┘
///        ▲                                                     │ loss
///        │ next ACK (cwnd < ssthresh)              ┌───────────▼──────────┐
///        └─────────────────────────────────────────│     LossRecovery     │
///                                                  └──────────────────────┘
/// ```
///
/// `LossRecovery` is transient: it lasts from a loss notification until the
/// next acknowledgment is processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CongestionPhase {
    SlowStart,
    CongestionAvoidance,
    LossRecovery,
}

impl fmt::Display for CongestionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CongestionPhase::SlowStart => write!(f, "slow-start"),
            CongestionPhase::CongestionAvoidance => write!(f, "congestion-avoidance"),
            CongestionPhase::LossRecovery => write!(f, "loss-recovery"),
        }
    }
}

/// Congestion events raised by the transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaEvent {
    /// First transmission after the connection went idle.
    TxStart,
    /// Loss detected by the transport.
    Loss,
    /// Fast recovery entered.
    Recovery,
}

/// Transport-level congestion states, as reported on every transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TcpCongState {
    Open,
    Disorder,
    Cwr,
    Recovery,
    /// Retransmission timeout: all in-flight data is considered lost.
    Loss,
}

/// Window state owned by one engine instance.
///
/// Unset timestamps are `None`, which is distinct from a zero duration.
#[derive(Debug, Clone)]
pub(crate) struct CongestionState {
    /// Congestion window (bytes)
    pub(crate) cwnd: usize,
    /// Slow start threshold (bytes)
    pub(crate) ssthresh: usize,
    pub(crate) segment_size: usize,
    /// ACKed segments not yet converted into window growth
    pub(crate) cwnd_increment_counter: u32,
    /// Minimum RTT since the last loss reset
    pub(crate) delay_min: Option<Duration>,
    /// Highest sequence number handed to the network
    pub(crate) high_tx_mark: u64,
    /// Highest cumulatively acknowledged sequence number
    pub(crate) last_acked_seq: u64,
    pub(crate) last_ack_time: Option<Duration>,
    pub(crate) in_loss_recovery: bool,
    pub(crate) peak_cwnd: usize,
}

impl CongestionState {
    pub(crate) fn new(config: &EngineConfig) -> Self {
        let cwnd = config.initial_cwnd();
        Self {
            cwnd,
            ssthresh: config.initial_ssthresh(),
            segment_size: config.segment_size,
            cwnd_increment_counter: 0,
            delay_min: None,
            high_tx_mark: 0,
            last_acked_seq: 0,
            last_ack_time: None,
            in_loss_recovery: false,
            peak_cwnd: cwnd,
        }
    }

    pub(crate) fn cwnd_segments(&self) -> u32 {
        (self.cwnd / self.segment_size).min(u32::MAX as usize) as u32
    }

    pub(crate) fn phase(&self) -> CongestionPhase {
        if self.in_loss_recovery {
            CongestionPhase::LossRecovery
        } else if self.cwnd < self.ssthresh {
            CongestionPhase::SlowStart
        } else {
            CongestionPhase::CongestionAvoidance
        }
    }

    /// Fold a new RTT sample into the minimum delay estimate.
    pub(crate) fn observe_rtt(&mut self, rtt: Duration) {
        match self.delay_min {
            Some(min) if min <= rtt => {}
            _ => self.delay_min = Some(rtt),
        }
    }
}
