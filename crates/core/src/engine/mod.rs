//! CUBIC congestion control with HyStart and a delay-gradient layer for
//! millimeter-wave links.
//!
//! ## Layers
//!
//! | Layer | Role |
//! |-------|------|
//! | [`CubicWindowModel`] | Cubic growth curve anchored at the window before the last loss |
//! | [`HyStartDetector`] | Leaves slow start early on ack trains or rising delay |
//! | [`DelayGradientAdaptor`] | Rescales the window from queueing delay and its trend |
//!
//! [`CongestionControlEngine`] owns one of each per connection. The transport
//! feeds it ACKs, losses and state changes and reads back cwnd and ssthresh.
//!
//! ## Delay Gradient
//!
//! mmWave links lose capacity abruptly when the beam is blocked. Queueing delay
//! rises well before loss, so the gradient layer scores how much headroom is
//! left below a bad-delay threshold (`rtt_threshold_factor × min_rtt`):
//!
//! - `safe_zone = 1 - queueing / bad_delay`
//! - `future_safe_zone = 1 - (queueing + predicted_growth) / bad_delay`
//!
//! A falling delay grows the window progressively, a delay predicted to cross
//! the threshold scales it by `2^future_safe_zone`, and a delay already past it
//! shrinks it by `2^(safe_zone - 1)` down to one segment.
//!
//! ## Update Cadence
//!
//! Gradient state is refreshed on every ACK by default. With
//! [`UpdateCadence::Periodic`] a [`PeriodicTimer`] refreshes it every
//! `report_period` instead; see
//! [`CongestionControlEngine::start_periodic_updates`].

mod config;
mod controller;
mod cubic;
mod errors;
mod gradient;
mod hystart;
mod rng;
mod state;
mod stats;
mod timer;

#[cfg(test)]
mod tests;

pub use config::{
    EngineConfig, GradientBlend, UpdateCadence, DEFAULT_SEGMENT_SIZE, MAX_CWND_SEGMENTS,
    MIN_CWND_SEGMENTS, MIN_SSTHRESH_SEGMENTS,
};
pub use controller::{CongestionControlEngine, SharedEngine};
pub use cubic::CubicWindowModel;
pub use errors::ConfigError;
pub use gradient::{DelayGradientAdaptor, GradientZone, ScaledTarget};
pub use hystart::{HyStartDetector, HyStartFlags};
pub use rng::{FixedGaussian, GaussianSource, SeededGaussian, ThreadGaussian};
pub use state::{CaEvent, CongestionPhase, TcpCongState};
pub use stats::EngineStats;
pub use timer::PeriodicTimer;
