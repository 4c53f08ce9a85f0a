//! Engine statistics snapshot for telemetry and debugging.

use std::time::Duration;

use super::state::CongestionPhase;

/// Snapshot of one engine's window state and lifetime counters.
#[derive(Debug, Clone)]
pub struct EngineStats {
    /// Current congestion window (bytes).
    pub cwnd: usize,
    /// Current slow start threshold (bytes).
    pub ssthresh: usize,
    pub phase: CongestionPhase,
    pub segment_size: usize,
    /// Largest window reached during the engine's lifetime (bytes).
    pub peak_cwnd: usize,
    /// Window before the last reduction (segments, 0 = none).
    pub last_max_cwnd: u32,
    /// Time for the cubic curve to return to its origin (seconds).
    pub bic_k: f64,
    /// Start of the current CUBIC epoch, if one is open.
    pub epoch_start: Option<Duration>,
    /// Minimum RTT since the last loss reset.
    pub delay_min: Option<Duration>,
    /// Minimum RTT seen by the delay-gradient layer.
    pub min_rtt: Option<Duration>,
    pub safe_zone: f64,
    pub future_safe_zone: f64,
    pub delay_derivative: f64,
    /// ACKs processed.
    pub total_acks: usize,
    /// Transitions from slow start into congestion avoidance.
    pub slow_start_exits: usize,
    /// Slow start exits triggered by the ack-train detector.
    pub hystart_ack_train_exits: usize,
    /// Slow start exits triggered by the delay-increase detector.
    pub hystart_delay_exits: usize,
    /// Loss notifications that recomputed ssthresh.
    pub total_losses: usize,
    /// Loss-state resets (retransmission timeouts).
    pub loss_state_resets: usize,
    /// Windows applied by the delay-gradient layer.
    pub gradient_rescales: usize,
    /// Rescales pinned at the minimum window.
    pub gradient_hard_caps: usize,
}
