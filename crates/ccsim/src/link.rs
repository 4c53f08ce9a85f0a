//! Single bottleneck link driven round trip by round trip.

use std::time::Duration;

use mmwave_cc::engine::{
    CongestionControlEngine, EngineConfig, EngineStats, SeededGaussian, UpdateCadence,
};
use mmwave_cc::simulation::{TimeSource, VirtualTime};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

/// Periodic capacity drop, as when the beam is blocked.
#[derive(Debug, Clone)]
pub struct Blockage {
    pub every: Duration,
    pub length: Duration,
    /// Fraction of the capacity left while blocked
    pub capacity_factor: f64,
}

#[derive(Debug, Clone)]
pub struct LinkModel {
    /// Propagation round-trip time
    pub base_rtt: Duration,
    /// Bottleneck capacity (bytes/sec)
    pub capacity: f64,
    /// Buffer size as a multiple of the bandwidth-delay product
    pub buffer_bdp: f64,
    /// Probability of a random loss per round trip
    pub loss_rate: f64,
    pub blockage: Option<Blockage>,
}

impl LinkModel {
    /// Capacity (bytes/sec) at `elapsed` into the run.
    pub fn capacity_at(&self, elapsed: Duration) -> f64 {
        match &self.blockage {
            Some(blockage) if is_blocked(blockage, elapsed) => {
                self.capacity * blockage.capacity_factor
            }
            _ => self.capacity,
        }
    }

    /// Bandwidth-delay product (bytes) at full capacity.
    pub fn bdp(&self) -> f64 {
        self.capacity * self.base_rtt.as_secs_f64()
    }
}

fn is_blocked(blockage: &Blockage, elapsed: Duration) -> bool {
    if blockage.every.is_zero() || elapsed < blockage.every {
        return false;
    }
    let phase = elapsed.as_nanos() % blockage.every.as_nanos();
    phase < blockage.length.as_nanos()
}

/// One congestion window change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CwndChange {
    /// Time since the start of the run
    pub time: Duration,
    pub old: usize,
    pub new: usize,
}

#[derive(Debug, Clone)]
pub struct Summary {
    pub rounds: usize,
    pub delivered_bytes: u64,
    pub overflow_losses: usize,
    pub random_losses: usize,
    pub elapsed: Duration,
    pub engine: EngineStats,
}

impl Summary {
    /// Mean goodput over the run (bits/sec).
    pub fn goodput_bps(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.delivered_bytes as f64 * 8.0 / secs
        } else {
            0.0
        }
    }
}

pub struct Simulation {
    time: VirtualTime,
    engine: CongestionControlEngine<VirtualTime>,
    link: LinkModel,
    rng: SmallRng,
    start: Duration,
    next_tick: Option<Duration>,
    high_tx_mark: u64,
    rounds: usize,
    delivered_bytes: u64,
    overflow_losses: usize,
    random_losses: usize,
}

impl Simulation {
    pub fn new(config: EngineConfig, link: LinkModel, seed: u64) -> anyhow::Result<Self> {
        let time = VirtualTime::new();
        let periodic = config.update_cadence == UpdateCadence::Periodic;
        let report_period = config.report_period;
        let mut rng = SmallRng::seed_from_u64(seed);
        let engine = CongestionControlEngine::with_gaussian_source(
            config,
            time.clone(),
            Box::new(SeededGaussian::new(rng.random())),
        )?;
        let start = time.now();
        Ok(Self {
            next_tick: periodic.then(|| start + report_period),
            time,
            engine,
            link,
            rng,
            start,
            high_tx_mark: 0,
            rounds: 0,
            delivered_bytes: 0,
            overflow_losses: 0,
            random_losses: 0,
        })
    }

    pub fn engine(&self) -> &CongestionControlEngine<VirtualTime> {
        &self.engine
    }

    fn elapsed(&self) -> Duration {
        self.time.now() - self.start
    }

    /// Advance virtual time, running any timer ticks that fall due.
    fn advance(&mut self, by: Duration) {
        self.time.advance(by);
        let now = self.time.now();
        let period = self.engine.config().report_period;
        while let Some(deadline) = self.next_tick.filter(|deadline| *deadline <= now) {
            self.engine.on_tick();
            self.next_tick = Some(deadline + period);
        }
    }

    /// Run for `duration` of virtual time, reporting each window change.
    pub fn run<F>(&mut self, duration: Duration, mut on_change: F) -> Summary
    where
        F: FnMut(CwndChange),
    {
        while self.elapsed() < duration {
            self.round(&mut on_change);
        }
        Summary {
            rounds: self.rounds,
            delivered_bytes: self.delivered_bytes,
            overflow_losses: self.overflow_losses,
            random_losses: self.random_losses,
            elapsed: self.elapsed(),
            engine: self.engine.stats(),
        }
    }

    /// Send one window and deliver or drop it.
    fn round<F>(&mut self, on_change: &mut F)
    where
        F: FnMut(CwndChange),
    {
        self.rounds += 1;
        let seg = self.engine.segment_size();
        let flight = self.engine.cwnd();
        self.high_tx_mark += flight as u64;
        self.engine.on_send(self.high_tx_mark);

        let capacity = self.link.capacity_at(self.elapsed());
        let bdp = capacity * self.link.base_rtt.as_secs_f64();
        let queued = (flight as f64 - bdp).max(0.0);
        let overflow = queued > self.link.buffer_bdp * self.link.bdp();
        let random_loss = !overflow && self.rng.random::<f64>() < self.link.loss_rate;

        if overflow || random_loss {
            if overflow {
                self.overflow_losses += 1;
            } else {
                self.random_losses += 1;
            }
            self.advance(self.link.base_rtt);
            let old = self.engine.cwnd();
            self.engine.on_loss(flight);
            self.report(old, on_change);
            tracing::debug!(
                flight_kb = flight / 1024,
                overflow,
                cwnd_kb = self.engine.cwnd() / 1024,
                "Flight lost"
            );
            return;
        }

        let rtt = self.link.base_rtt + Duration::from_secs_f64(queued / capacity);
        let acks = (flight / seg).max(1);
        let spacing = rtt / acks as u32;
        for _ in 0..acks {
            self.advance(spacing);
            let old = self.engine.cwnd();
            self.engine.on_ack(1, rtt);
            self.report(old, on_change);
        }
        self.delivered_bytes += flight as u64;
    }

    fn report<F>(&self, old: usize, on_change: &mut F)
    where
        F: FnMut(CwndChange),
    {
        let new = self.engine.cwnd();
        if new != old {
            on_change(CwndChange {
                time: self.elapsed(),
                old,
                new,
            });
        }
    }
}
