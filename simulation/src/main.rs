//! hostmap-sim - run topology discovery against simulated networks
//!
//! Runs a canned scenario, prints the events it produced, the run report
//! and the final topology as JSON.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};

use hostmap_discovery::DiscoveryConfig;
use hostmap_logging::{HostmapSubscriberBuilder, LogConfig};
use hostmap_simulation::{NetworkBuilder, Scenario, ScenarioOutcome, run_scenario};

#[derive(Parser)]
#[command(
    name = "hostmap-sim",
    about = "Topology discovery against simulated networks",
    version
)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log as JSON lines instead of pretty text
    #[arg(long, global = true)]
    json_logs: bool,

    /// Discovery configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Keep refreshing for this many seconds instead of a single sweep
    #[arg(short, long, global = true)]
    duration: Option<u64>,

    /// Print only the final snapshot
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed A reports B and C, which both report D
    Abc,

    /// A line with a flaky device and a dead one
    Flaky,

    /// A multi-homed device first seen as two hosts
    SplitBrain,

    /// A random connected network
    Random {
        /// Number of devices
        #[arg(short = 'n', long, default_value = "20")]
        devices: usize,

        /// Probability of each extra link
        #[arg(short, long, default_value = "0.1")]
        probability: f64,

        /// Random seed
        #[arg(short, long, default_value = "1")]
        seed: u64,
    },

    /// Print a network shape without running discovery
    Topology {
        #[arg(long, value_enum, default_value = "ring")]
        shape: Shape,

        /// Number of devices
        #[arg(short = 'n', long, default_value = "6")]
        devices: usize,

        /// Random seed (random shape only)
        #[arg(short, long, default_value = "1")]
        seed: u64,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Shape {
    Line,
    Ring,
    Star,
    Full,
    Random,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut log_config = if cli.json_logs {
        LogConfig::default()
    } else {
        LogConfig::development()
    };
    log_config.default_level = if cli.verbose { "debug" } else { "warn" }.to_string();
    let _log_guard = HostmapSubscriberBuilder::new()
        .with_config(log_config)
        .init();

    let scenario = match cli.command {
        Commands::Abc => Scenario::abc(),
        Commands::Flaky => Scenario::flaky(),
        Commands::SplitBrain => Scenario::split_brain(),
        Commands::Random {
            devices,
            probability,
            seed,
        } => Scenario::random(devices, probability, seed),
        Commands::Topology {
            shape,
            devices,
            seed,
        } => {
            let builder = NetworkBuilder::new(devices);
            let network = match shape {
                Shape::Line => builder.line(),
                Shape::Ring => builder.ring(),
                Shape::Star => builder.star(),
                Shape::Full => builder.full_mesh(),
                Shape::Random => builder.random(0.2, seed),
            };
            println!("{}", network.visualize());
            return Ok(());
        }
    };

    let config = load_config(cli.config.as_deref())?;
    let run_for = cli.duration.map(Duration::from_secs);

    if !cli.quiet {
        println!("=== Scenario: {} ===\n", scenario.name);
        println!("{}", scenario.network.visualize());
    }

    let outcome = run_scenario(&scenario, config, run_for)
        .await
        .context("discovery run failed")?;
    print_outcome(&outcome, cli.quiet)?;

    Ok(())
}

/// Read a discovery configuration, or use the defaults
fn load_config(path: Option<&Path>) -> anyhow::Result<DiscoveryConfig> {
    let Some(path) = path else {
        return Ok(DiscoveryConfig::default());
    };
    let text =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let config: DiscoveryConfig =
        toml::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

fn print_outcome(outcome: &ScenarioOutcome, quiet: bool) -> anyhow::Result<()> {
    if !quiet {
        println!("=== Events ({}) ===", outcome.events.len());
        for sequenced in &outcome.events {
            println!(
                "  #{:<4} {}",
                sequenced.sequence,
                serde_json::to_string(&sequenced.event)?
            );
        }

        let report = &outcome.report;
        println!("\n=== Report ===");
        println!("  Probes started: {}", report.probes_started);
        println!("  Probes succeeded: {}", report.probes_succeeded);
        println!(
            "  Probes failed: {} ({} timed out)",
            report.probes_failed, report.probes_timed_out
        );
        println!("  Hosts discovered: {}", report.hosts_discovered);
        println!("  Hosts unreachable: {}", report.hosts_unreachable);
        println!("  Merges: {}", report.merges);
        println!("  Elapsed: {} ms", report.elapsed_ms);
        println!("\n=== Topology ===");
    }

    println!("{}", outcome.snapshot.to_json()?);
    Ok(())
}
