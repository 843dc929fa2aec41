use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use routesim::sim::scenario::load_scenario;
use routesim::sim::TickEngine;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "routesim")]
#[command(about = "Deterministic discrete-event simulator for the routing protocol engine")]
struct Args {
    #[arg(long)]
    scenario: PathBuf,
    #[arg(long, default_value = "INFO")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let cfg = load_scenario(&args.scenario)?;
    let mut engine = TickEngine::new(cfg)?;
    let result = engine.run()?;

    info!(
        "run finished: run_id={} converged_tick={:?} ticks={} delivered={} dropped={} flaps={}",
        result.run_id,
        result.converged_tick,
        result.route_hashes.len(),
        result.delivered_messages,
        result.dropped_messages,
        result.route_flaps,
    );

    println!("{}", serde_json::to_string_pretty(&result)?);

    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .init();
    Ok(())
}
