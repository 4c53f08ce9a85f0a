//! HyStart slow start exit.
//!
//! Two detectors run over each round of slow start:
//! - ack train: closely spaced ACKs spanning more than the minimum RTT
//!   indicate the sender has already filled the path
//! - delay increase: the minimum RTT of the first samples of a round rising
//!   clearly above the connection minimum indicates a queue is building
//!
//! When a detector enabled in the mask fires, slow start ends immediately by
//! setting ssthresh to the current window.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::config::EngineConfig;

/// Set of HyStart detectors, used both as the configured mask and as the
/// record of which detectors fired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HyStartFlags(u8);

impl HyStartFlags {
    pub const NONE: Self = Self(0);
    pub const ACK_TRAIN: Self = Self(0x1);
    pub const DELAY: Self = Self(0x2);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits & 0x3)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }
}

impl fmt::Display for HyStartFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.contains(Self::ACK_TRAIN), self.contains(Self::DELAY)) {
            (true, true) => write!(f, "ack-train+delay"),
            (true, false) => write!(f, "ack-train"),
            (false, true) => write!(f, "delay"),
            (false, false) => write!(f, "none"),
        }
    }
}

/// Per-round HyStart bookkeeping.
#[derive(Debug, Clone)]
pub struct HyStartDetector {
    config: Arc<EngineConfig>,
    mask: HyStartFlags,
    round_start: Option<Duration>,
    last_ack_time: Option<Duration>,
    /// Highest sequence sent when the current round started
    end_seq: u64,
    sample_count: u32,
    /// Minimum RTT among the first samples of the round
    current_rtt: Option<Duration>,
    detected: HyStartFlags,
}

impl HyStartDetector {
    pub fn new(config: Arc<EngineConfig>) -> Self {
        let mask = HyStartFlags::from_bits(config.hystart_detect_mask);
        Self {
            config,
            mask,
            round_start: None,
            last_ack_time: None,
            end_seq: 0,
            sample_count: 0,
            current_rtt: None,
            detected: HyStartFlags::NONE,
        }
    }

    /// Whether an acknowledgment up to `last_acked_seq` closes the current round.
    pub fn round_complete(&self, last_acked_seq: u64) -> bool {
        last_acked_seq > self.end_seq
    }

    /// Begin a new round that ends once `highest_sent_seq` is acknowledged.
    ///
    /// Detection results carry over between rounds; only [`reset`](Self::reset)
    /// clears them.
    pub fn on_round_start(&mut self, highest_sent_seq: u64, now: Duration) {
        self.round_start = Some(now);
        self.last_ack_time = Some(now);
        self.end_seq = highest_sent_seq;
        self.current_rtt = None;
        self.sample_count = 0;
    }

    /// Feed one RTT sample taken during slow start.
    ///
    /// Returns the new ssthresh (the current window) the first time an
    /// enabled detector fires; `None` otherwise.
    pub fn on_ack(
        &mut self,
        rtt: Duration,
        now: Duration,
        delay_min: Option<Duration>,
        cwnd: usize,
    ) -> Option<usize> {
        if self.detected.intersects(self.mask) {
            return None;
        }

        if let Some(last_ack) = self.last_ack_time {
            if now.saturating_sub(last_ack) <= self.config.hystart_ack_delta {
                self.last_ack_time = Some(now);
                let round_elapsed = self.round_start.map(|start| now.saturating_sub(start));
                if let (Some(elapsed), Some(min)) = (round_elapsed, delay_min) {
                    if elapsed > min {
                        self.detected.insert(HyStartFlags::ACK_TRAIN);
                    }
                }
            }
        }

        if self.sample_count < self.config.hystart_min_samples {
            match self.current_rtt {
                Some(current) if current <= rtt => {}
                _ => self.current_rtt = Some(rtt),
            }
            self.sample_count += 1;
        } else if let (Some(current), Some(min)) = (self.current_rtt, delay_min) {
            if current > min + self.delay_threshold(min) {
                self.detected.insert(HyStartFlags::DELAY);
            }
        }

        if self.detected.intersects(self.mask) {
            tracing::debug!(
                cwnd_kb = cwnd / 1024,
                detected = %self.detected,
                current_rtt_ms = self.current_rtt.map(|d| d.as_millis() as u64),
                delay_min_ms = delay_min.map(|d| d.as_millis() as u64),
                "HyStart exit from slow start"
            );
            Some(cwnd)
        } else {
            None
        }
    }

    /// Delay increase that counts as congestion: `delay_min` clamped to the
    /// configured bounds.
    pub fn delay_threshold(&self, delay_min: Duration) -> Duration {
        delay_min.clamp(self.config.hystart_delay_min, self.config.hystart_delay_max)
    }

    /// Clear round state and detection results.
    pub fn reset(&mut self, highest_sent_seq: u64, now: Duration) {
        self.on_round_start(highest_sent_seq, now);
        self.detected = HyStartFlags::NONE;
    }

    pub fn detected(&self) -> HyStartFlags {
        self.detected
    }

    /// Whether slow start has already been ended by an enabled detector.
    pub fn has_exited(&self) -> bool {
        self.detected.intersects(self.mask)
    }

    pub fn end_seq(&self) -> u64 {
        self.end_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CWND: usize = 32 * 1400;

    fn detector(mask: u8) -> HyStartDetector {
        HyStartDetector::new(Arc::new(
            EngineConfig::default().with_hystart_detect_mask(mask),
        ))
    }

    fn ms(v: u64) -> Duration {
        Duration::from_millis(v)
    }

    #[test]
    fn test_ack_train_fires_after_delay_min() {
        let mut hs = detector(1);
        hs.on_round_start(100, ms(0));
        let delay_min = Some(ms(5));

        // ACKs 1ms apart, the train spans more than delay_min after 6ms
        let mut exit = None;
        for i in 1..=6 {
            exit = hs.on_ack(ms(5), ms(i), delay_min, CWND);
            if i < 6 {
                assert_eq!(exit, None, "fired early at {i}ms");
            }
        }
        assert_eq!(exit, Some(CWND));
        assert!(hs.detected().contains(HyStartFlags::ACK_TRAIN));
    }

    #[test]
    fn test_sparse_acks_do_not_form_train() {
        let mut hs = detector(1);
        hs.on_round_start(100, ms(0));
        for i in 1..=20 {
            assert_eq!(hs.on_ack(ms(5), ms(i * 10), Some(ms(5)), CWND), None);
        }
        assert_eq!(hs.detected(), HyStartFlags::NONE);
    }

    #[test]
    fn test_delay_increase_fires_after_min_samples() {
        let mut hs = detector(2);
        hs.on_round_start(100, ms(0));
        let delay_min = Some(ms(20));

        // Threshold is 20ms + clamp(20ms) = 40ms, so a 30ms round is fine
        for i in 0..8 {
            assert_eq!(hs.on_ack(ms(30), ms(100 + i * 10), delay_min, CWND), None);
        }
        assert_eq!(hs.on_ack(ms(30), ms(200), delay_min, CWND), None);

        // A round whose minimum is 45ms does exceed 40ms
        hs.on_round_start(200, ms(300));
        for i in 0..8 {
            assert_eq!(hs.on_ack(ms(45), ms(400 + i * 10), delay_min, CWND), None);
        }
        assert_eq!(hs.on_ack(ms(45), ms(500), delay_min, CWND), Some(CWND));
        assert!(hs.detected().contains(HyStartFlags::DELAY));
    }

    #[test]
    fn test_masked_detector_does_not_exit() {
        // Delay-only mask ignores a perfect ack train
        let mut hs = detector(2);
        hs.on_round_start(100, ms(0));
        for i in 1..=6 {
            assert_eq!(hs.on_ack(ms(5), ms(i), Some(ms(5)), CWND), None);
        }
        assert!(hs.detected().contains(HyStartFlags::ACK_TRAIN));
        assert!(!hs.has_exited());
    }

    #[test]
    fn test_fires_at_most_once_until_reset() {
        let mut hs = detector(3);
        hs.on_round_start(100, ms(0));
        let mut exits = 0;
        for i in 1..=50 {
            if hs.on_ack(ms(5), ms(i), Some(ms(5)), CWND).is_some() {
                exits += 1;
            }
        }
        assert_eq!(exits, 1);

        // New rounds keep the result
        hs.on_round_start(200, ms(60));
        assert_eq!(hs.on_ack(ms(5), ms(61), Some(ms(1)), CWND), None);

        hs.reset(300, ms(100));
        assert_eq!(hs.detected(), HyStartFlags::NONE);
        assert!(!hs.has_exited());
    }

    #[test]
    fn test_unknown_delay_min_never_fires() {
        let mut hs = detector(3);
        hs.on_round_start(100, ms(0));
        for i in 1..=30 {
            assert_eq!(hs.on_ack(ms(500), ms(i), None, CWND), None);
        }
    }

    #[test]
    fn test_round_boundary_and_threshold_clamp() {
        let mut hs = detector(3);
        hs.on_round_start(5_000, ms(0));
        assert!(!hs.round_complete(5_000));
        assert!(hs.round_complete(5_001));
        assert_eq!(hs.end_seq(), 5_000);

        assert_eq!(hs.delay_threshold(ms(1)), ms(4));
        assert_eq!(hs.delay_threshold(ms(50)), ms(50));
        assert_eq!(hs.delay_threshold(ms(5_000)), ms(1000));
    }
}
