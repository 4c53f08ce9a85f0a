//! Randomness for the delay-gradient control coefficient.
//!
//! The progressive coefficient is drawn from a normal distribution on every
//! rescale. The source is pluggable so simulations can replay a run exactly.

use std::fmt;

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

/// A stream of normally distributed samples.
pub trait GaussianSource: Send + fmt::Debug {
    /// Draw one sample from `N(mean, std_dev²)`.
    ///
    /// A zero or invalid standard deviation yields `mean`.
    fn sample(&mut self, mean: f64, std_dev: f64) -> f64;

    /// Derive an independent source for a forked engine.
    fn fork(&mut self) -> Box<dyn GaussianSource>;
}

fn draw<R: Rng + ?Sized>(rng: &mut R, mean: f64, std_dev: f64) -> f64 {
    match Normal::new(mean, std_dev) {
        Ok(normal) if std_dev > 0.0 => normal.sample(rng),
        _ => mean,
    }
}

/// Reproducible source seeded from a `u64`.
#[derive(Debug, Clone)]
pub struct SeededGaussian {
    rng: SmallRng,
    seed: u64,
}

impl SeededGaussian {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            seed,
        }
    }

    /// Returns the seed used to create this source.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}

impl GaussianSource for SeededGaussian {
    fn sample(&mut self, mean: f64, std_dev: f64) -> f64 {
        draw(&mut self.rng, mean, std_dev)
    }

    fn fork(&mut self) -> Box<dyn GaussianSource> {
        // Child seed comes from the parent's stream so sibling forks differ
        Box::new(Self::new(self.rng.random()))
    }
}

/// Thread-local entropy, for production use.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadGaussian;

impl GaussianSource for ThreadGaussian {
    fn sample(&mut self, mean: f64, std_dev: f64) -> f64 {
        draw(&mut rand::rng(), mean, std_dev)
    }

    fn fork(&mut self) -> Box<dyn GaussianSource> {
        Box::new(ThreadGaussian)
    }
}

/// Always returns `mean + z·std_dev`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedGaussian {
    pub z: f64,
}

impl GaussianSource for FixedGaussian {
    fn sample(&mut self, mean: f64, std_dev: f64) -> f64 {
        mean + self.z * std_dev
    }

    fn fork(&mut self) -> Box<dyn GaussianSource> {
        Box::new(*self)
    }
}
