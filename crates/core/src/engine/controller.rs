//! Congestion control engine façade.
//!
//! Owns one CUBIC model, one HyStart detector and one delay-gradient adaptor
//! per connection and routes transport events between them.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::simulation::{RealTime, TimeSource};

use super::config::{EngineConfig, GradientBlend, UpdateCadence};
use super::cubic::CubicWindowModel;
use super::errors::ConfigError;
use super::gradient::{DelayGradientAdaptor, ScaledTarget};
use super::hystart::{HyStartDetector, HyStartFlags};
use super::rng::{GaussianSource, ThreadGaussian};
use super::state::{CaEvent, CongestionPhase, CongestionState, TcpCongState};
use super::stats::EngineStats;
use super::timer::PeriodicTimer;

/// Engine shared between the transport task and its periodic timer.
pub type SharedEngine<T = RealTime> = Arc<Mutex<CongestionControlEngine<T>>>;

/// Delay-gradient CUBIC congestion control for one connection.
///
/// All entry points take `&mut self`: the engine expects a single task to
/// feed it events in order. Periodic mode is the one exception, where the
/// engine lives in a [`SharedEngine`] so its timer can reach it.
///
/// ## Type Parameter
///
/// `T` is the clock. Defaults to `RealTime`; tests and the simulator use
/// `VirtualTime` via [`CongestionControlEngine::new_with_time_source`].
#[derive(Debug)]
pub struct CongestionControlEngine<T: TimeSource = RealTime> {
    config: Arc<EngineConfig>,
    time_source: T,

    state: CongestionState,
    cubic: CubicWindowModel,
    hystart: HyStartDetector,
    gradient: DelayGradientAdaptor,

    /// Latest RTT sample, consumed by periodic delay-gradient updates
    last_rtt: Option<Duration>,
    timer: Option<PeriodicTimer>,
    active: bool,

    // ===== Statistics =====
    total_acks: usize,
    slow_start_exits: usize,
    hystart_ack_train_exits: usize,
    hystart_delay_exits: usize,
    total_losses: usize,
    loss_state_resets: usize,
    gradient_rescales: usize,
    gradient_hard_caps: usize,
}

// ============================================================================
// Production constructors (use real time)
// ============================================================================

impl CongestionControlEngine<RealTime> {
    /// Create an engine on the wall clock.
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::new_with_time_source(config, RealTime::new())
    }
}

// ============================================================================
// Generic implementation (works with any TimeSource)
// ============================================================================

impl<T: TimeSource> CongestionControlEngine<T> {
    pub fn new_with_time_source(config: EngineConfig, time_source: T) -> Result<Self, ConfigError> {
        Self::with_gaussian_source(config, time_source, Box::new(ThreadGaussian))
    }

    /// Create an engine with an explicit randomness source for the
    /// delay-gradient coefficient.
    pub fn with_gaussian_source(
        config: EngineConfig,
        time_source: T,
        rng: Box<dyn GaussianSource>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::from_shared_config(Arc::new(config), time_source, rng))
    }

    fn from_shared_config(
        config: Arc<EngineConfig>,
        time_source: T,
        rng: Box<dyn GaussianSource>,
    ) -> Self {
        Self {
            state: CongestionState::new(&config),
            cubic: CubicWindowModel::new(config.clone()),
            hystart: HyStartDetector::new(config.clone()),
            gradient: DelayGradientAdaptor::new(config.clone(), rng),
            config,
            time_source,
            last_rtt: None,
            timer: None,
            active: true,
            total_acks: 0,
            slow_start_exits: 0,
            hystart_ack_train_exits: 0,
            hystart_delay_exits: 0,
            total_losses: 0,
            loss_state_resets: 0,
            gradient_rescales: 0,
            gradient_hard_caps: 0,
        }
    }

    /// Wrap the engine for use with [`start_periodic_updates`](Self::start_periodic_updates).
    pub fn into_shared(self) -> SharedEngine<T> {
        Arc::new(Mutex::new(self))
    }

    /// Diagnostic identifier.
    pub fn name(&self) -> &'static str {
        "Tcp5G"
    }

    /// A new engine with the same configuration and clock but none of this
    /// engine's window state, epoch, round or averages. Any periodic timer
    /// must be started again on the fork.
    pub fn fork(&mut self) -> Self {
        let gradient = self.gradient.fork();
        let mut forked = Self::from_shared_config(
            self.config.clone(),
            self.time_source.clone(),
            Box::new(ThreadGaussian),
        );
        forked.gradient = gradient;
        tracing::debug!(name = self.name(), "Engine forked");
        forked
    }

    fn now(&self) -> Duration {
        self.time_source.now()
    }

    // ========================================================================
    // Transport events
    // ========================================================================

    /// Record the highest sequence number handed to the network.
    pub fn on_send(&mut self, high_tx_mark: u64) {
        self.state.high_tx_mark = self.state.high_tx_mark.max(high_tx_mark);
    }

    /// ACK for `segments_acked` new segments with an RTT sample.
    ///
    /// The cumulative acknowledgment point advances by
    /// `segments_acked × segment_size`; use
    /// [`on_ack_with_seq`](Self::on_ack_with_seq) when the transport tracks
    /// sequence numbers itself.
    pub fn on_ack(&mut self, segments_acked: u32, rtt: Duration) {
        let advance = segments_acked as u64 * self.state.segment_size as u64;
        let last_acked_seq = self.state.last_acked_seq.saturating_add(advance);
        self.on_ack_with_seq(segments_acked, rtt, last_acked_seq);
    }

    /// ACK for `segments_acked` new segments, cumulative up to `last_acked_seq`.
    pub fn on_ack_with_seq(&mut self, segments_acked: u32, rtt: Duration, last_acked_seq: u64) {
        if !self.active {
            return;
        }
        let now = self.now();
        self.total_acks += 1;
        self.state.in_loss_recovery = false;
        self.state.last_acked_seq = self.state.last_acked_seq.max(last_acked_seq);
        self.last_rtt = Some(rtt);

        let was_slow_start = self.state.phase() == CongestionPhase::SlowStart;
        let sample_accepted = self.sample_rtt(rtt, now);

        let mut remaining = segments_acked;
        if self.state.phase() == CongestionPhase::SlowStart {
            if self.config.hystart_enabled && self.hystart.round_complete(self.state.last_acked_seq)
            {
                self.hystart.on_round_start(self.round_end_mark(), now);
            }
            if sample_accepted {
                self.run_hystart(rtt, now);
            }
            remaining = self.slow_start(remaining);
        }

        if self.state.phase() == CongestionPhase::CongestionAvoidance && remaining > 0 {
            self.congestion_avoidance(remaining, now);
        }

        if was_slow_start && self.state.phase() == CongestionPhase::CongestionAvoidance {
            self.slow_start_exits += 1;
        }
        self.state.last_ack_time = Some(now);
    }

    /// Sequence number that closes the HyStart round starting now. Without
    /// send marks from the transport the round spans one window past the
    /// acknowledgment point.
    fn round_end_mark(&self) -> u64 {
        if self.state.high_tx_mark > self.state.last_acked_seq {
            self.state.high_tx_mark
        } else {
            self.state.last_acked_seq.saturating_add(self.state.cwnd as u64)
        }
    }

    /// Update the minimum delay estimate and, per packet, the delay gradient.
    ///
    /// Returns `false` when the sample falls inside the discard window right
    /// after an epoch start.
    fn sample_rtt(&mut self, rtt: Duration, now: Duration) -> bool {
        if self.config.gradient_enabled() && self.config.update_cadence == UpdateCadence::PerPacket
        {
            self.gradient.update(rtt, now);
        }

        if let Some(epoch) = self.cubic.epoch_start() {
            if now.saturating_sub(epoch) < self.config.cubic_delta {
                tracing::trace!(
                    rtt_ms = rtt.as_millis() as u64,
                    "Discarding RTT sample at epoch start"
                );
                return false;
            }
        }
        self.state.observe_rtt(rtt);
        true
    }

    /// Grow cwnd by one segment per acknowledged segment up to ssthresh.
    /// Returns the ACKed segments left over for congestion avoidance.
    fn slow_start(&mut self, segments_acked: u32) -> u32 {
        let seg = self.state.segment_size;
        let room = self.state.ssthresh.saturating_sub(self.state.cwnd).div_ceil(seg);
        let used = (segments_acked as usize).min(room);
        if used > 0 {
            self.set_cwnd(self.state.cwnd + used * seg);
        }
        segments_acked - used as u32
    }

    fn run_hystart(&mut self, rtt: Duration, now: Duration) {
        let cwnd = self.state.cwnd;
        let low_window = self.config.hystart_low_window * self.state.segment_size;
        if !self.config.hystart_enabled || cwnd >= self.state.ssthresh || cwnd < low_window {
            return;
        }
        if let Some(ssthresh) = self.hystart.on_ack(rtt, now, self.state.delay_min, cwnd) {
            let detected = self.hystart.detected();
            let mask = HyStartFlags::from_bits(self.config.hystart_detect_mask);
            if detected.contains(HyStartFlags::ACK_TRAIN) && mask.contains(HyStartFlags::ACK_TRAIN)
            {
                self.hystart_ack_train_exits += 1;
            }
            if detected.contains(HyStartFlags::DELAY) && mask.contains(HyStartFlags::DELAY) {
                self.hystart_delay_exits += 1;
            }
            self.set_ssthresh(ssthresh);
        }
    }

    fn congestion_avoidance(&mut self, segments_acked: u32, now: Duration) {
        let gradient_first =
            self.config.gradient_enabled() && self.config.gradient_blend == GradientBlend::Override;
        if gradient_first && self.apply_gradient().is_some() {
            return;
        }

        self.state.cwnd_increment_counter =
            self.state.cwnd_increment_counter.saturating_add(segments_acked);
        let count = self.cubic.compute_ack_threshold(
            self.state.cwnd_segments(),
            now,
            self.state.delay_min,
        );
        if self.state.cwnd_increment_counter >= count {
            self.set_cwnd(self.state.cwnd + self.state.segment_size);
            self.state.cwnd_increment_counter -= count;
        }

        if self.config.gradient_enabled() && !gradient_first {
            self.apply_gradient();
        }
    }

    fn apply_gradient(&mut self) -> Option<ScaledTarget> {
        let scaled = self
            .gradient
            .compute_scaled_target(self.state.cwnd / self.state.segment_size)?;
        self.gradient_rescales += 1;
        if scaled.hard_cap {
            self.gradient_hard_caps += 1;
        }
        self.set_cwnd(scaled.segments.saturating_mul(self.state.segment_size));
        Some(scaled)
    }

    /// Handle a congestion event raised by the transport.
    pub fn on_congestion_event(&mut self, event: CaEvent) {
        match event {
            CaEvent::TxStart => {
                let now = self.now();
                if let Some(last_ack) = self.state.last_ack_time {
                    self.cubic.shift_epoch(now.saturating_sub(last_ack), now);
                }
            }
            CaEvent::Loss => self.enter_loss_recovery(),
            CaEvent::Recovery => {
                // Credit earned before the reduction does not carry over
                self.state.cwnd_increment_counter = 0;
                tracing::debug!(cwnd_kb = self.state.cwnd / 1024, "Fast recovery entered");
            }
        }
    }

    /// Handle a transport congestion state transition. `Loss` resets the
    /// CUBIC model and HyStart and restarts slow start from one segment.
    pub fn on_congestion_state_changed(&mut self, new_state: TcpCongState) {
        match new_state {
            TcpCongState::Loss => self.enter_loss_recovery(),
            other => tracing::trace!(state = ?other, "Congestion state changed"),
        }
    }

    fn enter_loss_recovery(&mut self) {
        let now = self.now();
        let old_cwnd = self.state.cwnd;

        self.cubic.reset();
        self.state.delay_min = None;
        self.state.cwnd_increment_counter = 0;

        self.set_cwnd(self.state.segment_size);
        self.hystart.reset(self.round_end_mark(), now);
        self.state.in_loss_recovery = true;
        self.loss_state_resets += 1;

        tracing::warn!(
            old_cwnd_kb = old_cwnd / 1024,
            new_cwnd_kb = self.state.cwnd / 1024,
            ssthresh_kb = self.state.ssthresh / 1024,
            loss_state_resets = self.loss_state_resets,
            "Loss state - CUBIC and HyStart reset, re-entering slow start"
        );
    }

    /// Slow start threshold after a loss with `bytes_in_flight` outstanding.
    /// The value is also stored as the engine's ssthresh.
    pub fn get_ssthresh(&mut self, bytes_in_flight: usize) -> usize {
        let ssthresh = self.cubic.on_loss(
            self.state.cwnd_segments(),
            bytes_in_flight,
            self.state.segment_size,
        );
        self.set_ssthresh(ssthresh);
        self.total_losses += 1;
        self.state.ssthresh
    }

    /// Halve cwnd, never below one segment.
    pub fn reduce_cwnd(&mut self) {
        let reduced = (self.state.cwnd / 2).max(self.state.segment_size);
        self.set_cwnd(reduced);
    }

    /// Loss detected: recompute ssthresh and halve cwnd. Returns ssthresh.
    pub fn on_loss(&mut self, bytes_in_flight: usize) -> usize {
        let old_cwnd = self.state.cwnd;
        let ssthresh = self.get_ssthresh(bytes_in_flight);
        self.reduce_cwnd();
        tracing::warn!(
            old_cwnd_kb = old_cwnd / 1024,
            new_cwnd_kb = self.state.cwnd / 1024,
            ssthresh_kb = ssthresh / 1024,
            total_losses = self.total_losses,
            "Packet loss - halving cwnd"
        );
        ssthresh
    }

    // ========================================================================
    // Periodic updates
    // ========================================================================

    /// One timer tick: refresh the delay gradient from the latest RTT sample.
    pub fn on_tick(&mut self) {
        if !self.active
            || !self.config.gradient_enabled()
            || self.config.update_cadence != UpdateCadence::Periodic
        {
            return;
        }
        if let Some(rtt) = self.last_rtt {
            let now = self.now();
            self.gradient.update(rtt, now);
        }
    }

    /// Start the periodic timer for a shared engine configured with
    /// `UpdateCadence::Periodic`. The timer holds only a weak reference, so
    /// dropping the last handle to the engine also stops it.
    ///
    /// Returns whether a timer is running afterwards.
    pub fn start_periodic_updates(shared: &SharedEngine<T>) -> bool {
        let mut engine = shared.lock();
        if !engine.active || engine.config.update_cadence != UpdateCadence::Periodic {
            return false;
        }
        if engine.timer.as_ref().is_some_and(PeriodicTimer::is_active) {
            return true;
        }

        let weak = Arc::downgrade(shared);
        let timer = PeriodicTimer::spawn(
            engine.time_source.clone(),
            engine.config.report_period,
            move || {
                let Some(engine) = weak.upgrade() else {
                    return false;
                };
                let mut engine = engine.lock();
                engine.on_tick();
                let active = engine.active;
                active
            },
        );
        engine.timer = timer;
        engine.timer.is_some()
    }

    /// Tear down: stop the timer and ignore further events.
    pub fn close(&mut self) {
        self.active = false;
        if let Some(mut timer) = self.timer.take() {
            timer.cancel();
        }
        tracing::debug!(
            peak_cwnd_kb = self.state.peak_cwnd / 1024,
            total_losses = self.total_losses,
            "Engine closed"
        );
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn has_running_timer(&self) -> bool {
        self.timer.as_ref().is_some_and(PeriodicTimer::is_active)
    }

    // ========================================================================
    // State
    // ========================================================================

    fn set_cwnd(&mut self, new_cwnd: usize) {
        let old_cwnd = self.state.cwnd;
        let new_cwnd = new_cwnd.clamp(self.config.min_cwnd(), self.config.max_cwnd());
        self.state.cwnd = new_cwnd;
        self.state.peak_cwnd = self.state.peak_cwnd.max(new_cwnd);
        if old_cwnd != new_cwnd {
            tracing::trace!(old_cwnd, new_cwnd, phase = %self.state.phase(), "cwnd changed");
        }
    }

    fn set_ssthresh(&mut self, ssthresh: usize) {
        self.state.ssthresh = ssthresh.clamp(self.config.min_ssthresh(), self.config.max_cwnd());
    }

    /// Current congestion window (bytes).
    pub fn cwnd(&self) -> usize {
        self.state.cwnd
    }

    /// Current slow start threshold (bytes).
    pub fn ssthresh(&self) -> usize {
        self.state.ssthresh
    }

    pub fn phase(&self) -> CongestionPhase {
        self.state.phase()
    }

    pub fn segment_size(&self) -> usize {
        self.state.segment_size
    }

    pub fn delay_min(&self) -> Option<Duration> {
        self.state.delay_min
    }

    pub fn config(&self) -> &Arc<EngineConfig> {
        &self.config
    }

    pub fn time_source(&self) -> &T {
        &self.time_source
    }

    pub fn cubic(&self) -> &CubicWindowModel {
        &self.cubic
    }

    pub fn hystart(&self) -> &HyStartDetector {
        &self.hystart
    }

    pub fn gradient(&self) -> &DelayGradientAdaptor {
        &self.gradient
    }

    /// Convert cwnd to a sending rate (bytes/sec).
    pub fn current_rate(&self, rtt: Duration) -> usize {
        let safe_rtt = rtt.max(Duration::from_millis(1));
        ((self.state.cwnd as f64) / safe_rtt.as_secs_f64()) as usize
    }

    #[cfg(test)]
    pub(crate) fn set_window_for_test(&mut self, cwnd: usize, ssthresh: usize) {
        self.state.cwnd = cwnd;
        self.state.ssthresh = ssthresh;
    }

    pub fn stats(&self) -> EngineStats {
        EngineStats {
            cwnd: self.state.cwnd,
            ssthresh: self.state.ssthresh,
            phase: self.state.phase(),
            segment_size: self.state.segment_size,
            peak_cwnd: self.state.peak_cwnd,
            last_max_cwnd: self.cubic.last_max_cwnd(),
            bic_k: self.cubic.bic_k(),
            epoch_start: self.cubic.epoch_start(),
            delay_min: self.state.delay_min,
            min_rtt: self.gradient.min_rtt(),
            safe_zone: self.gradient.safe_zone(),
            future_safe_zone: self.gradient.future_safe_zone(),
            delay_derivative: self.gradient.delay_derivative(),
            total_acks: self.total_acks,
            slow_start_exits: self.slow_start_exits,
            hystart_ack_train_exits: self.hystart_ack_train_exits,
            hystart_delay_exits: self.hystart_delay_exits,
            total_losses: self.total_losses,
            loss_state_resets: self.loss_state_resets,
            gradient_rescales: self.gradient_rescales,
            gradient_hard_caps: self.gradient_hard_caps,
        }
    }
}
