use std::time::Duration;

/// Reasons an [`EngineConfig`](super::EngineConfig) is rejected.
///
/// Every check happens once at construction; the engine itself never fails
/// once it is running.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("beta must be a finite value greater than zero, got {0}")]
    InvalidBeta(f64),
    #[error("cubic scaling constant must be a finite value greater than zero, got {0}")]
    InvalidScalingConstant(f64),
    #[error("hystart detect mask must be within [1, 3], got {0}")]
    InvalidDetectMask(u8),
    #[error("hystart delay bounds are inverted: min {min:?} > max {max:?}")]
    InvalidHystartDelayBounds { min: Duration, max: Duration },
    #[error("segment size must be non-zero")]
    InvalidSegmentSize,
    #[error("initial window must hold at least one segment")]
    InvalidInitialWindow,
    #[error("rtt threshold factor must be finite and non-negative, got {0}")]
    InvalidRttThresholdFactor(f64),
    #[error("report period must be non-zero when updates are periodic")]
    InvalidReportPeriod,
    #[error("failed to read engine config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse engine config: {0}")]
    Parse(#[from] toml::de::Error),
}
