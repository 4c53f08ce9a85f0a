//! Clock abstraction for deterministic testing and simulation.

mod time;

pub use time::{RealTime, TimeSource, VirtualTime, WakeupId};
