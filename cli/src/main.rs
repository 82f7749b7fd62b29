// qgpsr: geographic routing simulator
//
// Runs the routing core over a scenario file: node placements, a radio range
// and a list of flows. Prints where every flow went and what each router saw.

mod config;
mod scenario;
mod sim;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use qgpsr_core::{bearing, NodeId};
use scenario::Scenario;
use sim::{FlowOutcome, Simulation};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Parser)]
#[command(name = "qgpsr")]
#[command(about = "Greedy perimeter routing with delay-aware tie-breaks", long_about = None)]
#[command(version)]
struct Cli {
    /// Log every routing decision
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario and report every flow
    Simulate {
        #[arg(short, long)]
        scenario: PathBuf,
        /// Routing config (JSON); defaults when omitted
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long, default_value = "1")]
        seed: u64,
        /// Simulated seconds to run
        #[arg(long, default_value = "60")]
        until: f64,
    },
    /// Print the default routing config
    Config,
    /// Show one node's planar neighbors after a single beacon round
    Planar {
        #[arg(short, long)]
        scenario: PathBuf,
        #[arg(short, long)]
        node: u32,
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .init();

    match cli.command {
        Commands::Simulate {
            scenario,
            config,
            seed,
            until,
        } => cmd_simulate(&scenario, config.as_deref(), seed, until),
        Commands::Config => cmd_config(),
        Commands::Planar {
            scenario,
            node,
            config,
        } => cmd_planar(&scenario, NodeId(node), config.as_deref()),
    }
}

fn cmd_simulate(scenario_path: &Path, config_path: Option<&Path>, seed: u64, until: f64) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let config = config::load(config_path)?;
    let until = Duration::try_from_secs_f64(until).context("--until must be a non-negative number of seconds")?;

    println!("{}", "Running scenario...".bold());
    println!(
        "  {} nodes, {} flows, range {} m, planarization {}, tie-break {}",
        scenario.nodes.len(),
        scenario.flows.len(),
        scenario.radio_range,
        config.planarization_mode,
        if config.enable_delay_tiebreaker { "on" } else { "off" }
    );
    println!();

    let mut sim = Simulation::new(scenario, config, seed)?;
    sim.run(until);

    println!("{}", "Flows".bold());
    if sim.reports().is_empty() {
        println!("  {}", "(no flows injected)".dimmed());
    }
    for report in sim.reports() {
        let path = report
            .path
            .iter()
            .map(|id| id.0.to_string())
            .collect::<Vec<_>>()
            .join(" → ");
        let outcome = match &report.outcome {
            FlowOutcome::Delivered => "delivered".green(),
            FlowOutcome::NoRoute => "no route".red(),
            FlowOutcome::HopLimit => "hop limit".yellow(),
            FlowOutcome::Failed(reason) => format!("failed: {}", reason).as_str().red(),
        };
        println!(
            "  t={:>7.2}s {} → {}  {}  [{}]",
            report.at.as_secs_f64(),
            report.source,
            report.destination,
            outcome,
            path.dimmed()
        );
    }
    println!();

    println!("{}", "Routers".bold());
    println!(
        "  {:<10} {:>9} {:>7} {:>8} {:>9} {:>10} {:>8}",
        "node", "neighbors", "planar", "greedy", "tiebreak", "perimeter", "dropped"
    );
    for router in sim.routers().values() {
        let summary = router.summary();
        println!(
            "  {:<10} {:>9} {:>7} {:>8} {:>9} {:>10} {:>8}",
            summary.address.to_string(),
            summary.neighbors,
            summary.planar_neighbors,
            summary.stats.greedy_selections,
            summary.stats.tiebreaker_activations,
            summary.stats.perimeter_entries,
            summary.stats.no_route
        );
    }

    let overhead = sim.overhead();
    println!();
    println!(
        "Control overhead: {} beacon bytes, {} option bytes",
        overhead.beacon_bytes, overhead.option_bytes
    );

    let (selections, activations) = sim
        .routers()
        .values()
        .map(|router| router.stats())
        .fold((0, 0), |(s, a), stats| {
            (s + stats.greedy_selections, a + stats.tiebreaker_activations)
        });
    if selections > 0 {
        println!(
            "Tie-break ratio: {:.3} ({} of {} greedy selections)",
            activations as f64 / selections as f64,
            activations,
            selections
        );
    }

    Ok(())
}

fn cmd_config() -> Result<()> {
    println!("{}", config::default_json()?);
    Ok(())
}

fn cmd_planar(scenario_path: &Path, node: NodeId, config_path: Option<&Path>) -> Result<()> {
    let scenario = Scenario::load(scenario_path)?;
    let config = config::load(config_path)?;
    let mode = config.planarization_mode;
    let origin = scenario
        .node(node)
        .map(|spec| spec.position())
        .with_context(|| format!("{} is not in the scenario", node))?;

    let mut sim = Simulation::new(scenario, config, 0)?;
    sim.exchange_beacons(Duration::ZERO);

    let router = sim
        .routers()
        .get(&node)
        .with_context(|| format!("No router for {}", node))?;

    println!(
        "{} {} at {} ({} of {} neighbors kept by {})",
        "Planar neighbors of".bold(),
        node,
        origin,
        router.summary().planar_neighbors,
        router.neighbors().len(),
        mode
    );
    let ordered = router.planar_neighbors_counter_clockwise(0.0);
    if ordered.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    for neighbor in ordered {
        let Ok(position) = router.neighbors().get(&neighbor) else {
            continue;
        };
        println!(
            "  {} {:<10} {}  bearing {:>6.1}°",
            "•".bright_cyan(),
            neighbor.to_string(),
            position,
            bearing(position - origin).to_degrees()
        );
    }
    Ok(())
}
