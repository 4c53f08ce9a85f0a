use std::sync::Arc;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

use crate::simulation::{TimeSource, VirtualTime};

use super::config::{EngineConfig, GradientBlend, UpdateCadence};
use super::controller::CongestionControlEngine;
use super::errors::ConfigError;
use super::rng::SeededGaussian;
use super::state::{CaEvent, CongestionPhase, TcpCongState};

const SEG: usize = 1400;

fn ms(v: u64) -> Duration {
    Duration::from_millis(v)
}

// ============================================================================
// Deterministic Test Harness
// ============================================================================

/// Link presets for harness runs.
#[derive(Debug, Clone, Copy)]
#[allow(dead_code)] // Presets available for future test expansion
pub struct NetworkCondition {
    /// Base round-trip time
    pub rtt: Duration,
    /// Jitter as (min_multiplier, max_multiplier)
    pub jitter: Option<(f64, f64)>,
    /// Fraction of flights lost
    pub loss_rate: f64,
}

#[allow(dead_code)]
impl NetworkCondition {
    /// mmWave line of sight: 4ms RTT, ±5% jitter, no loss
    pub const MMWAVE_LOS: Self = Self {
        rtt: Duration::from_millis(4),
        jitter: Some((0.95, 1.05)),
        loss_rate: 0.0,
    };

    /// Partially blocked beam: RTT inflated by queueing, 1% loss
    pub const MMWAVE_BLOCKAGE: Self = Self {
        rtt: Duration::from_millis(40),
        jitter: Some((0.5, 1.5)),
        loss_rate: 0.01,
    };

    /// LTE fallback: 50ms RTT, ±10% jitter, 0.1% loss
    pub const LTE: Self = Self {
        rtt: Duration::from_millis(50),
        jitter: Some((0.9, 1.1)),
        loss_rate: 0.001,
    };

    /// Every flight is lost
    pub const OUTAGE: Self = Self {
        rtt: Duration::from_millis(10),
        jitter: None,
        loss_rate: 1.0,
    };
}

/// Engine state captured after a harness step.
#[derive(Debug, Clone)]
#[allow(dead_code)] // Fields available for test assertions and debugging
pub struct HarnessSnapshot {
    /// Time since harness creation (nanos)
    pub time_nanos: u64,
    pub cwnd: usize,
    pub ssthresh: usize,
    pub phase: CongestionPhase,
    pub losses: usize,
}

/// Drives a [`CongestionControlEngine`] over a simulated link on virtual time.
///
/// Each step sends up to one window, advances time by a jittered RTT and then
/// either acknowledges every segment or reports the whole flight lost.
pub struct EngineTestHarness {
    time_source: VirtualTime,
    engine: CongestionControlEngine<VirtualTime>,
    condition: NetworkCondition,
    rng: SmallRng,
    epoch_nanos: u64,
    high_tx_mark: u64,
}

#[allow(dead_code)] // Methods available for test expansion
impl EngineTestHarness {
    pub fn new(config: EngineConfig, condition: NetworkCondition, seed: u64) -> Self {
        let time_source = VirtualTime::new();
        let epoch_nanos = time_source.now_nanos();
        let engine = CongestionControlEngine::with_gaussian_source(
            config,
            time_source.clone(),
            Box::new(SeededGaussian::new(seed)),
        )
        .expect("valid config");

        Self {
            time_source,
            engine,
            condition,
            rng: SmallRng::seed_from_u64(seed),
            epoch_nanos,
            high_tx_mark: 0,
        }
    }

    pub fn engine(&self) -> &CongestionControlEngine<VirtualTime> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CongestionControlEngine<VirtualTime> {
        &mut self.engine
    }

    pub fn current_time_nanos(&self) -> u64 {
        self.time_source.now_nanos() - self.epoch_nanos
    }

    pub fn advance_time(&mut self, duration: Duration) {
        self.time_source.advance(duration);
    }

    fn jittered_rtt(&mut self) -> Duration {
        let base_nanos = self.condition.rtt.as_nanos() as f64;
        let jittered_nanos = match self.condition.jitter {
            Some((min_mult, max_mult)) => base_nanos * self.rng.random_range(min_mult..=max_mult),
            None => base_nanos,
        };
        Duration::from_nanos(jittered_nanos as u64)
    }

    fn should_drop_flight(&mut self) -> bool {
        self.condition.loss_rate > 0.0 && self.rng.random::<f64>() < self.condition.loss_rate
    }

    /// Send `bytes_to_send` (capped at cwnd) and process the outcome.
    ///
    /// # Returns
    /// The number of bytes acknowledged (0 if the flight was lost).
    pub fn step(&mut self, bytes_to_send: usize) -> usize {
        let seg = self.engine.segment_size();
        let flight = bytes_to_send.min(self.engine.cwnd()) / seg * seg;
        self.high_tx_mark += flight as u64;
        self.engine.on_send(self.high_tx_mark);

        let rtt = self.jittered_rtt();
        self.advance_time(rtt);

        if self.should_drop_flight() {
            self.engine.on_loss(flight);
            return 0;
        }

        for _ in 0..flight / seg {
            self.engine.on_ack(1, rtt);
        }
        flight
    }

    /// Run `count` round trips, collecting a snapshot after each.
    pub fn run_rtts(&mut self, count: usize, bytes_per_rtt: usize) -> Vec<HarnessSnapshot> {
        (0..count)
            .map(|_| {
                self.step(bytes_per_rtt);
                self.snapshot()
            })
            .collect()
    }

    pub fn snapshot(&self) -> HarnessSnapshot {
        let stats = self.engine.stats();
        HarnessSnapshot {
            time_nanos: self.current_time_nanos(),
            cwnd: stats.cwnd,
            ssthresh: stats.ssthresh,
            phase: stats.phase,
            losses: stats.total_losses,
        }
    }
}

fn engine_with(config: EngineConfig) -> (VirtualTime, CongestionControlEngine<VirtualTime>) {
    let vt = VirtualTime::new();
    let engine = CongestionControlEngine::with_gaussian_source(
        config,
        vt.clone(),
        Box::new(SeededGaussian::new(7)),
    )
    .expect("valid config");
    (vt, engine)
}

/// Engine that starts in congestion avoidance at 12 segments with three
/// ACKed segments already credited towards the next increment.
fn avoidance_engine() -> (VirtualTime, CongestionControlEngine<VirtualTime>) {
    let (vt, mut engine) = engine_with(
        EngineConfig::cubic()
            .with_hystart(false)
            .with_initial_ssthresh(12 * SEG),
    );
    engine.on_ack(5, ms(50));
    (vt, engine)
}

// ============================================================================
// Construction
// ============================================================================

#[test]
fn test_name() {
    let (_, engine) = engine_with(EngineConfig::default());
    assert_eq!(engine.name(), "Tcp5G");
}

#[test]
fn test_invalid_config_rejected() {
    let result = CongestionControlEngine::new_with_time_source(
        EngineConfig::default().with_beta(0.0),
        VirtualTime::new(),
    );
    assert!(matches!(result, Err(ConfigError::InvalidBeta(_))));
}

#[test]
fn test_initial_state() {
    let (_, engine) = engine_with(EngineConfig::default());
    assert_eq!(engine.cwnd(), 10 * SEG);
    assert_eq!(engine.phase(), CongestionPhase::SlowStart);
    assert!(engine.delay_min().is_none());
    assert!(engine.is_active());
}

// ============================================================================
// Slow start and congestion avoidance
// ============================================================================

#[test]
fn test_slow_start_single_segment() {
    let (_, mut engine) = engine_with(
        EngineConfig::default()
            .with_initial_cwnd_segments(2)
            .with_initial_ssthresh(100_000),
    );
    assert_eq!(engine.cwnd(), 2800);

    engine.on_ack(1, ms(20));
    assert_eq!(engine.cwnd(), 4200);
}

#[test]
fn test_slow_start_grows_per_acked_segment() {
    let (_, mut engine) = engine_with(EngineConfig::default().with_hystart(false));
    engine.on_ack(5, ms(20));
    assert_eq!(engine.cwnd(), 15 * SEG);
    engine.on_ack(3, ms(20));
    assert_eq!(engine.cwnd(), 18 * SEG);
    assert_eq!(engine.delay_min(), Some(ms(20)));
}

#[test]
fn test_slow_start_remainder_goes_to_avoidance() {
    let (_, engine) = avoidance_engine();

    // Two segments fill the window up to ssthresh, the other three are credit
    assert_eq!(engine.cwnd(), 12 * SEG);
    assert_eq!(engine.phase(), CongestionPhase::CongestionAvoidance);
    assert!(engine.cubic().epoch_start().is_some());

    let stats = engine.stats();
    assert_eq!(stats.slow_start_exits, 1);
    assert_eq!(stats.total_acks, 1);
}

#[test]
fn test_avoidance_increments_after_ack_threshold() {
    let (_, mut engine) = avoidance_engine();

    // No loss yet, so the threshold is clamped to 20 ACKs
    for _ in 0..16 {
        engine.on_ack(1, ms(50));
    }
    assert_eq!(engine.cwnd(), 12 * SEG);

    engine.on_ack(1, ms(50));
    assert_eq!(engine.cwnd(), 13 * SEG);
}

#[test]
fn test_recovery_event_clears_ack_credit() {
    let (_, mut engine) = avoidance_engine();
    engine.on_congestion_event(CaEvent::Recovery);

    for _ in 0..19 {
        engine.on_ack(1, ms(50));
    }
    assert_eq!(engine.cwnd(), 12 * SEG);

    engine.on_ack(1, ms(50));
    assert_eq!(engine.cwnd(), 13 * SEG);
}

// ============================================================================
// Loss handling
// ============================================================================

#[test]
fn test_on_loss_recomputes_ssthresh_and_halves() {
    let (_, mut engine) = engine_with(EngineConfig::default());

    let ssthresh = engine.on_loss(56_000);
    assert_eq!(ssthresh, 39_200);
    assert_eq!(engine.ssthresh(), 39_200);
    assert_eq!(engine.cwnd(), 7_000);
    assert_eq!(engine.phase(), CongestionPhase::SlowStart);
    assert_eq!(engine.cubic().last_max_cwnd(), 10);
    assert_eq!(engine.stats().total_losses, 1);
}

#[test]
fn test_get_ssthresh_floor() {
    let (_, mut engine) = engine_with(EngineConfig::default());
    assert_eq!(engine.get_ssthresh(0), 2 * SEG);
    assert_eq!(engine.get_ssthresh(SEG), 2 * SEG);
    // GetSsThresh alone leaves the window untouched
    assert_eq!(engine.cwnd(), 10 * SEG);
}

#[test]
fn test_reduce_cwnd_floors_at_one_segment() {
    let (_, mut engine) = engine_with(EngineConfig::default().with_initial_cwnd_segments(3));
    engine.reduce_cwnd();
    assert_eq!(engine.cwnd(), 2100);
    engine.reduce_cwnd();
    assert_eq!(engine.cwnd(), SEG);
    engine.reduce_cwnd();
    assert_eq!(engine.cwnd(), SEG);
}

#[test]
fn test_loss_state_resets_into_slow_start() {
    let (_, mut engine) = engine_with(EngineConfig::default());
    engine.on_ack(1, ms(20));
    engine.on_loss(11 * SEG);
    assert_eq!(engine.cubic().last_max_cwnd(), 11);
    let ssthresh = engine.ssthresh();

    engine.on_congestion_state_changed(TcpCongState::Loss);
    assert_eq!(engine.cwnd(), SEG);
    assert_eq!(engine.ssthresh(), ssthresh);
    assert_eq!(engine.phase(), CongestionPhase::LossRecovery);
    assert_eq!(engine.cubic().last_max_cwnd(), 0);
    assert!(engine.cubic().epoch_start().is_none());
    assert!(engine.delay_min().is_none());
    assert_eq!(engine.stats().loss_state_resets, 1);

    engine.on_ack(1, ms(20));
    assert_eq!(engine.phase(), CongestionPhase::SlowStart);
    assert_eq!(engine.cwnd(), 2 * SEG);
}

#[test]
fn test_loss_event_matches_loss_state() {
    let (_, mut engine) = engine_with(EngineConfig::default());
    engine.on_congestion_event(CaEvent::Loss);
    assert_eq!(engine.cwnd(), SEG);
    assert_eq!(engine.phase(), CongestionPhase::LossRecovery);
}

#[test]
fn test_other_states_leave_window_alone() {
    let (_, mut engine) = engine_with(EngineConfig::default());
    for state in [
        TcpCongState::Open,
        TcpCongState::Disorder,
        TcpCongState::Cwr,
        TcpCongState::Recovery,
    ] {
        engine.on_congestion_state_changed(state);
    }
    assert_eq!(engine.cwnd(), 10 * SEG);
    assert_eq!(engine.stats().loss_state_resets, 0);
}

// ============================================================================
// HyStart
// ============================================================================

/// Ack-train-only HyStart active from 4 segments, starting at 8 segments.
fn hystart_engine() -> (VirtualTime, CongestionControlEngine<VirtualTime>) {
    let (vt, mut engine) = engine_with(
        EngineConfig::default()
            .with_initial_cwnd_segments(8)
            .with_hystart_low_window(4)
            .with_hystart_detect_mask(1),
    );
    engine.on_send(100_000);
    (vt, engine)
}

/// ACK every millisecond with a 10ms RTT until the train outlasts the
/// minimum delay.
fn run_ack_train(vt: &VirtualTime, engine: &mut CongestionControlEngine<VirtualTime>) {
    engine.on_ack(1, ms(10));
    for _ in 0..11 {
        vt.advance(ms(1));
        engine.on_ack(1, ms(10));
    }
}

#[test]
fn test_hystart_ack_train_exit() {
    let (vt, mut engine) = hystart_engine();
    run_ack_train(&vt, &mut engine);

    // Grew for 11 ACKs, then the 12th exited slow start at 19 segments
    assert_eq!(engine.cwnd(), 19 * SEG);
    assert_eq!(engine.ssthresh(), 19 * SEG);
    assert_eq!(engine.phase(), CongestionPhase::CongestionAvoidance);
    assert!(engine.hystart().has_exited());

    let stats = engine.stats();
    assert_eq!(stats.hystart_ack_train_exits, 1);
    assert_eq!(stats.hystart_delay_exits, 0);
    assert_eq!(stats.slow_start_exits, 1);
}

#[test]
fn test_hystart_fires_once_until_loss_state() {
    let (vt, mut engine) = hystart_engine();
    run_ack_train(&vt, &mut engine);

    // Back into slow start after a loss; the detector stays quiet
    engine.on_loss(19 * SEG);
    assert_eq!(engine.phase(), CongestionPhase::SlowStart);
    for _ in 0..4 {
        vt.advance(ms(1));
        engine.on_ack(1, ms(10));
    }
    let stats = engine.stats();
    assert_eq!(stats.hystart_ack_train_exits, 1);
    assert_eq!(stats.slow_start_exits, 2);
    assert_eq!(engine.phase(), CongestionPhase::CongestionAvoidance);

    engine.on_congestion_state_changed(TcpCongState::Loss);
    assert!(!engine.hystart().has_exited());
}

#[test]
fn test_hystart_below_low_window_is_inactive() {
    let (vt, mut engine) = engine_with(
        EngineConfig::default()
            .with_initial_cwnd_segments(2)
            .with_hystart_detect_mask(1),
    );
    engine.on_send(100_000);
    engine.on_ack(1, ms(10));
    for _ in 0..11 {
        vt.advance(ms(1));
        engine.on_ack(1, ms(10));
    }
    // 14 segments is still below the 16 segment low window
    assert_eq!(engine.cwnd(), 14 * SEG);
    assert!(!engine.hystart().has_exited());
    assert_eq!(engine.phase(), CongestionPhase::SlowStart);
}

// ============================================================================
// Congestion events
// ============================================================================

#[test]
fn test_tx_start_shifts_epoch_by_idle_time() {
    let (vt, mut engine) = engine_with(EngineConfig::cubic().with_initial_ssthresh(10 * SEG));
    let t0 = vt.now();
    engine.on_ack(1, ms(50));
    assert_eq!(engine.cubic().epoch_start(), Some(t0));

    vt.advance(Duration::from_secs(2));
    engine.on_congestion_event(CaEvent::TxStart);
    assert_eq!(engine.cubic().epoch_start(), Some(t0 + Duration::from_secs(2)));
}

#[test]
fn test_tx_start_without_epoch_is_noop() {
    let (vt, mut engine) = engine_with(EngineConfig::default());
    vt.advance(ms(500));
    engine.on_congestion_event(CaEvent::TxStart);
    assert!(engine.cubic().epoch_start().is_none());
    assert_eq!(engine.cwnd(), 10 * SEG);
}

// ============================================================================
// Fork
// ============================================================================

#[test]
fn test_fork_starts_fresh() {
    let (vt, mut parent) = avoidance_engine();
    vt.advance(ms(100));
    parent.on_loss(12 * SEG);

    let mut child = parent.fork();
    assert!(Arc::ptr_eq(parent.config(), child.config()));
    assert_eq!(child.cwnd(), 10 * SEG);
    assert_eq!(child.ssthresh(), 12 * SEG);
    assert!(child.cubic().epoch_start().is_none());
    assert_eq!(child.cubic().last_max_cwnd(), 0);
    assert!(child.delay_min().is_none());
    assert_eq!(child.stats().total_acks, 0);

    let parent_cwnd = parent.cwnd();
    child.on_ack(1, ms(5));
    assert_eq!(parent.cwnd(), parent_cwnd);
    assert_eq!(parent.delay_min(), Some(ms(50)));
}

#[test]
fn test_parent_changes_do_not_reach_fork() {
    let (vt, mut parent) = avoidance_engine();
    let mut child = parent.fork();
    vt.advance(ms(100));
    // Two segments of slow start, the third opens the epoch
    child.on_ack(3, ms(30));
    let child_cwnd = child.cwnd();
    let child_epoch = child.cubic().epoch_start();
    assert!(child_epoch.is_some());

    vt.advance(ms(100));
    parent.on_ack(1, ms(5));
    parent.on_loss(parent.cwnd());
    parent.on_congestion_state_changed(TcpCongState::Loss);

    assert_eq!(child.cwnd(), child_cwnd);
    assert_eq!(child.cubic().epoch_start(), child_epoch);
    assert_eq!(child.delay_min(), Some(ms(30)));
    assert_eq!(child.stats().total_losses, 0);
    assert_eq!(child.stats().loss_state_resets, 0);
}

// ============================================================================
// Delay gradient
// ============================================================================

fn gradient_engine(blend: GradientBlend) -> (VirtualTime, CongestionControlEngine<VirtualTime>) {
    engine_with(
        EngineConfig::delay_gradient(2.0)
            .with_initial_ssthresh(10 * SEG)
            .with_gradient_blend(blend),
    )
}

#[test]
fn test_gradient_supplements_cubic() {
    let (vt, mut engine) = gradient_engine(GradientBlend::Supplement);

    // First sample sits at the minimum RTT, so the window holds
    engine.on_ack(1, ms(10));
    assert_eq!(engine.cwnd(), 10 * SEG);
    assert!(engine.cubic().epoch_start().is_some());

    // 30ms of queueing against a 20ms bad delay: caution zone
    vt.advance(ms(500));
    engine.on_ack(1, ms(40));
    assert!((engine.gradient().safe_zone() + 0.5).abs() < 1e-9);
    assert_eq!(engine.cwnd(), 5 * SEG);

    let stats = engine.stats();
    assert_eq!(stats.gradient_rescales, 2);
    assert_eq!(stats.gradient_hard_caps, 0);
}

#[test]
fn test_gradient_override_bypasses_cubic() {
    let (vt, mut engine) = gradient_engine(GradientBlend::Override);
    engine.on_ack(1, ms(10));
    vt.advance(ms(500));
    engine.on_ack(1, ms(40));

    assert_eq!(engine.cwnd(), 5 * SEG);
    assert!(engine.cubic().epoch_start().is_none());
}

#[test]
fn test_gradient_hard_cap_blends_toward_minimum() {
    let (vt, mut engine) = gradient_engine(GradientBlend::Supplement);
    engine.on_ack(1, ms(10));
    vt.advance(ms(500));
    // 190ms of queueing: safe zone -8.5
    engine.on_ack(1, ms(200));
    // Minimum window blended with the 10 segment mean: 0.7 + 3.0
    assert_eq!(engine.cwnd(), 3 * SEG);
    assert_eq!(engine.stats().gradient_hard_caps, 1);
}

#[test]
fn test_gradient_disabled_for_plain_cubic() {
    let (vt, mut engine) = engine_with(EngineConfig::cubic().with_initial_ssthresh(10 * SEG));
    engine.on_ack(1, ms(10));
    vt.advance(ms(500));
    engine.on_ack(1, ms(200));
    assert_eq!(engine.cwnd(), 10 * SEG);
    assert_eq!(engine.stats().gradient_rescales, 0);
    assert!(engine.gradient().min_rtt().is_none());
}

#[test]
fn test_periodic_override_falls_back_without_samples() {
    let (_, mut engine) = engine_with(
        EngineConfig::delay_gradient(2.0)
            .with_initial_ssthresh(10 * SEG)
            .with_gradient_blend(GradientBlend::Override)
            .with_update_cadence(UpdateCadence::Periodic),
    );
    engine.on_ack(1, ms(10));
    // No tick yet, so CUBIC handled the ACK
    assert!(engine.gradient().current_delay().is_none());
    assert!(engine.cubic().epoch_start().is_some());
    assert_eq!(engine.stats().gradient_rescales, 0);
}

// ============================================================================
// Periodic updates
// ============================================================================

async fn settle() {
    for _ in 0..8 {
        tokio::task::yield_now().await;
    }
}

fn periodic_config() -> EngineConfig {
    EngineConfig::delay_gradient(2.0)
        .with_update_cadence(UpdateCadence::Periodic)
        .with_report_period(ms(1))
}

#[test]
fn test_periodic_updates_need_periodic_cadence() {
    let (_, engine) = engine_with(EngineConfig::delay_gradient(2.0));
    let shared = engine.into_shared();
    assert!(!CongestionControlEngine::start_periodic_updates(&shared));
    assert!(!shared.lock().has_running_timer());
}

#[tokio::test]
async fn test_periodic_tick_refreshes_gradient() {
    let (vt, engine) = engine_with(periodic_config());
    let shared = engine.into_shared();
    assert!(CongestionControlEngine::start_periodic_updates(&shared));
    settle().await;

    shared.lock().on_ack(1, ms(10));
    assert!(shared.lock().gradient().min_rtt().is_none());

    vt.advance(ms(1));
    settle().await;
    assert_eq!(shared.lock().gradient().min_rtt(), Some(ms(10)));
    assert!(shared.lock().has_running_timer());
}

#[tokio::test]
async fn test_close_cancels_timer() {
    let (vt, engine) = engine_with(periodic_config());
    let shared = engine.into_shared();
    assert!(CongestionControlEngine::start_periodic_updates(&shared));
    settle().await;

    shared.lock().close();
    assert!(!shared.lock().has_running_timer());
    assert!(!shared.lock().is_active());
    settle().await;
    assert_eq!(vt.pending_wakeup_count(), 0);

    // Closed engines ignore further events and cannot restart the timer
    shared.lock().on_ack(1, ms(10));
    assert_eq!(shared.lock().stats().total_acks, 0);
    assert!(!CongestionControlEngine::start_periodic_updates(&shared));
}

#[tokio::test]
async fn test_dropping_engine_stops_timer() {
    let (vt, engine) = engine_with(periodic_config());
    let shared = engine.into_shared();
    assert!(CongestionControlEngine::start_periodic_updates(&shared));
    settle().await;
    assert_eq!(vt.pending_wakeup_count(), 1);

    drop(shared);
    settle().await;
    vt.advance(ms(5));
    settle().await;
    assert_eq!(vt.pending_wakeup_count(), 0);
}

#[tokio::test]
async fn test_fork_has_no_timer() {
    let (_, engine) = engine_with(periodic_config());
    let shared = engine.into_shared();
    assert!(CongestionControlEngine::start_periodic_updates(&shared));

    let child = shared.lock().fork();
    assert!(!child.has_running_timer());

    let child = child.into_shared();
    assert!(CongestionControlEngine::start_periodic_updates(&child));
    assert!(child.lock().has_running_timer());
}

// ============================================================================
// Harness runs
// ============================================================================

#[test_log::test]
fn test_line_of_sight_grows_window() {
    let mut harness = EngineTestHarness::new(
        EngineConfig::cubic().with_hystart(false),
        NetworkCondition::MMWAVE_LOS,
        12345,
    );
    let snapshots = harness.run_rtts(4, 1 << 20);

    // Slow start doubles each round trip
    let cwnds: Vec<usize> = snapshots.iter().map(|s| s.cwnd).collect();
    assert_eq!(cwnds, vec![20 * SEG, 40 * SEG, 80 * SEG, 160 * SEG]);
    assert!(snapshots.iter().all(|s| s.phase == CongestionPhase::SlowStart));
}

#[test_log::test]
fn test_outage_collapses_to_minimum() {
    let mut harness = EngineTestHarness::new(EngineConfig::cubic(), NetworkCondition::OUTAGE, 1);
    let snapshots = harness.run_rtts(6, 1 << 20);

    let last = snapshots.last().expect("snapshots");
    assert_eq!(last.cwnd, SEG);
    assert_eq!(last.ssthresh, 2 * SEG);
    assert_eq!(last.losses, 6);
    assert!(snapshots.windows(2).all(|w| w[1].cwnd <= w[0].cwnd));
}

#[test_log::test]
fn test_blockage_respects_window_bounds() {
    let mut harness = EngineTestHarness::new(
        EngineConfig::delay_gradient(1.5),
        NetworkCondition::MMWAVE_BLOCKAGE,
        42,
    );
    for snapshot in harness.run_rtts(50, 256 * SEG) {
        assert!(snapshot.cwnd >= SEG);
        assert!(snapshot.ssthresh >= 2 * SEG);
    }
}

#[test]
fn test_seeded_runs_are_reproducible() {
    let run = |seed| {
        let mut harness =
            EngineTestHarness::new(EngineConfig::delay_gradient(2.0), NetworkCondition::LTE, seed);
        harness
            .run_rtts(30, 256 * SEG)
            .into_iter()
            .map(|s| s.cwnd)
            .collect::<Vec<_>>()
    };
    assert_eq!(run(9), run(9));
}
