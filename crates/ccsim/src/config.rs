use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};
use mmwave_cc::engine::{EngineConfig, GradientBlend, UpdateCadence};
use tracing::level_filters::LevelFilter;

use crate::link::{Blockage, LinkModel};

/// Congestion control simulator
///
/// Drives one engine over a single bottleneck link on virtual time and prints
/// every congestion window change as `time<TAB>old<TAB>new` (seconds, bytes).
#[derive(clap::Parser, Clone, Debug)]
#[clap(name = "ccsim")]
#[clap(version)]
pub struct Config {
    /// TOML file with engine parameters. Missing keys use defaults.
    #[arg(long, env = "CCSIM_CONFIG")]
    pub config: Option<PathBuf>,
    /// Bad-delay factor for the delay-gradient layer (0 = plain CUBIC).
    /// Overrides the config file.
    #[arg(long)]
    pub rtt_threshold_factor: Option<f64>,
    /// How the delay-gradient target combines with CUBIC growth.
    #[arg(long, value_enum)]
    pub gradient_blend: Option<BlendArg>,
    /// Refresh the delay gradient from a timer instead of on every ACK.
    #[arg(long)]
    pub periodic: bool,
    /// Disable HyStart.
    #[arg(long)]
    pub no_hystart: bool,

    /// Seed for link randomness and the gradient coefficient. Random if not provided.
    #[arg(long)]
    pub seed: Option<u64>,
    /// Propagation round-trip time in milliseconds.
    #[arg(long, default_value_t = 4.0)]
    pub rtt_ms: f64,
    /// Bottleneck capacity in Mbit/s.
    #[arg(long, default_value_t = 1000.0)]
    pub bandwidth_mbps: f64,
    /// Bottleneck buffer as a multiple of the bandwidth-delay product.
    #[arg(long, default_value_t = 1.0)]
    pub buffer_bdp: f64,
    /// Probability that a round trip suffers a random loss.
    #[arg(long, default_value_t = 0.0)]
    pub loss_rate: f64,
    /// Simulated time in seconds.
    #[arg(long, default_value_t = 10.0)]
    pub duration_s: f64,

    /// Start a beam blockage every this many seconds.
    #[arg(long)]
    pub blockage_every_s: Option<f64>,
    /// Length of each blockage in milliseconds.
    #[arg(long, default_value_t = 200.0)]
    pub blockage_ms: f64,
    /// Fraction of the capacity left during a blockage.
    #[arg(long, default_value_t = 0.1)]
    pub blockage_capacity: f64,

    /// Print the effective engine configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
    /// Log level (error, warn, info, debug, trace). Defaults to `RUST_LOG`.
    #[arg(long, env = "CCSIM_LOG_LEVEL")]
    pub log_level: Option<LevelFilter>,
}

#[derive(clap::ValueEnum, Clone, Copy, Debug)]
pub enum BlendArg {
    Supplement,
    Override,
}

impl From<BlendArg> for GradientBlend {
    fn from(arg: BlendArg) -> Self {
        match arg {
            BlendArg::Supplement => GradientBlend::Supplement,
            BlendArg::Override => GradientBlend::Override,
        }
    }
}

impl Config {
    /// Engine parameters from the config file with command line overrides applied.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => EngineConfig::load(path)
                .with_context(|| format!("loading engine config from {}", path.display()))?,
            None => EngineConfig::default(),
        };
        if let Some(factor) = self.rtt_threshold_factor {
            config = config.with_rtt_threshold_factor(factor);
        }
        if let Some(blend) = self.gradient_blend {
            config = config.with_gradient_blend(blend.into());
        }
        if self.periodic {
            config = config.with_update_cadence(UpdateCadence::Periodic);
        }
        if self.no_hystart {
            config = config.with_hystart(false);
        }
        config.validate()?;
        Ok(config)
    }

    pub fn link_model(&self) -> anyhow::Result<LinkModel> {
        if !(self.rtt_ms.is_finite() && self.rtt_ms > 0.0) {
            bail!("--rtt-ms must be positive, got {}", self.rtt_ms);
        }
        if !(self.bandwidth_mbps.is_finite() && self.bandwidth_mbps > 0.0) {
            bail!("--bandwidth-mbps must be positive, got {}", self.bandwidth_mbps);
        }
        if !(self.buffer_bdp.is_finite() && self.buffer_bdp >= 0.0) {
            bail!("--buffer-bdp must not be negative, got {}", self.buffer_bdp);
        }
        if !(0.0..=1.0).contains(&self.loss_rate) {
            bail!("--loss-rate must be within [0, 1], got {}", self.loss_rate);
        }

        let blockage = match self.blockage_every_s {
            Some(every) => {
                if !(every.is_finite() && every > 0.0) {
                    bail!("--blockage-every-s must be positive, got {every}");
                }
                if !(self.blockage_capacity > 0.0 && self.blockage_capacity <= 1.0) {
                    bail!(
                        "--blockage-capacity must be within (0, 1], got {}",
                        self.blockage_capacity
                    );
                }
                Some(Blockage {
                    every: Duration::from_secs_f64(every),
                    length: Duration::from_micros((self.blockage_ms.max(0.0) * 1000.0) as u64),
                    capacity_factor: self.blockage_capacity,
                })
            }
            None => None,
        };

        let base_rtt = Duration::from_micros((self.rtt_ms * 1000.0) as u64);
        if base_rtt.is_zero() {
            bail!("--rtt-ms must be at least one microsecond, got {}", self.rtt_ms);
        }

        Ok(LinkModel {
            base_rtt,
            capacity: self.bandwidth_mbps * 1_000_000.0 / 8.0,
            buffer_bdp: self.buffer_bdp,
            loss_rate: self.loss_rate,
            blockage,
        })
    }

    pub fn duration(&self) -> anyhow::Result<Duration> {
        if !(self.duration_s.is_finite() && self.duration_s > 0.0) {
            bail!("--duration-s must be positive, got {}", self.duration_s);
        }
        Ok(Duration::from_secs_f64(self.duration_s))
    }
}
