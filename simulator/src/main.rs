//! Tasa Simulator
//!
//! Replays scripted marketplace quotes through the real rate service and
//! prints every run report.

use std::path::PathBuf;

use clap::Parser;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod controller;
mod metrics;
mod scenario;

use controller::{Noise, SimulationController};
use scenario::Scenario;

/// Tasa Simulator CLI
#[derive(Parser, Debug)]
#[command(name = "simulator")]
#[command(about = "Replay derivation runs against scripted quotes")]
struct Args {
    /// Scenario file
    #[arg(short, long, default_value = "scenarios/override-and-outage.json")]
    scenario: PathBuf,

    /// Rounds to run (default: one per scripted round)
    #[arg(short, long)]
    rounds: Option<usize>,

    /// Maximum quote move per round, in basis points
    #[arg(long, default_value = "0")]
    jitter_bps: u32,

    /// Chance that a quote fails, in percent
    #[arg(long, default_value = "0", value_parser = clap::value_parser!(u8).range(0..=100))]
    failure_pct: u8,

    /// Random seed for reproducibility
    #[arg(long)]
    seed: Option<u64>,

    /// Print reports on a single line each
    #[arg(long)]
    compact: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args = Args::parse();

    let scenario = Scenario::load(&args.scenario)?;
    let rounds = args.rounds.unwrap_or_else(|| scenario.rounds.len().max(1));
    info!(scenario = %scenario.name, description = %scenario.description, "Starting Tasa Simulator");

    let noise = Noise {
        jitter_bps: args.jitter_bps,
        failure_pct: args.failure_pct,
    };
    let mut controller = SimulationController::new(scenario, noise, args.seed)?;
    let reports = controller.run(rounds).await?;

    for report in &reports {
        let json = if args.compact {
            serde_json::to_string(report)?
        } else {
            report.to_json()?
        };
        println!("{}", json);
    }

    let metrics = controller.metrics();
    info!(
        rounds = metrics.rounds,
        succeeded = metrics.succeeded,
        partial = metrics.partial,
        failed = metrics.failed,
        candidates = metrics.candidates,
        quote_failures = metrics.quote_failures,
        write_failures = metrics.write_failures,
        "Simulation complete"
    );

    if !metrics.all_expectations_met() {
        anyhow::bail!("{} expectation(s) failed", metrics.expectation_failures);
    }
    Ok(())
}
