//! Delay-gradient CUBIC congestion control for millimeter-wave links.
//!
//! See [`engine`] for the algorithm and [`congestion_control`] for the
//! interface transports program against.

/// Transport-facing congestion control interface.
pub mod congestion_control;

/// CUBIC, HyStart and delay-gradient window control.
pub mod engine;

/// Time sources for production and deterministic simulation.
pub mod simulation;

/// Logging setup.
pub mod tracing;

pub use congestion_control::{CongestionControlAlgorithm, CongestionControlStats, CongestionOps};
pub use engine::{CongestionControlEngine, EngineConfig, SharedEngine};
