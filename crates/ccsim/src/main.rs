use clap::Parser;

mod config;
mod link;

use crate::{config::Config, link::Simulation};

fn main() -> Result<(), anyhow::Error> {
    let config = Config::parse();
    let engine_config = config.engine_config()?;

    if config.print_config {
        print!("{}", toml::to_string(&engine_config)?);
        return Ok(());
    }

    mmwave_cc::tracing::set_logger(config.log_level);

    let link = config.link_model()?;
    let duration = config.duration()?;
    let seed = config.seed.unwrap_or_else(rand::random);
    tracing::info!(
        seed,
        rtt_ms = link.base_rtt.as_secs_f64() * 1000.0,
        bdp_kb = link.bdp() / 1024.0,
        gradient = engine_config.gradient_enabled(),
        "Starting simulation"
    );

    let mut sim = Simulation::new(engine_config, link, seed)?;
    println!("time\told\tnew");
    let summary = sim.run(duration, |change| {
        println!(
            "{:.6}\t{}\t{}",
            change.time.as_secs_f64(),
            change.old,
            change.new
        );
    });

    tracing::info!(
        rounds = summary.rounds,
        goodput_mbps = summary.goodput_bps() / 1_000_000.0,
        overflow_losses = summary.overflow_losses,
        random_losses = summary.random_losses,
        peak_cwnd_kb = summary.engine.peak_cwnd / 1024,
        slow_start_exits = summary.engine.slow_start_exits,
        gradient_rescales = summary.engine.gradient_rescales,
        "Simulation finished"
    );
    Ok(())
}
