//! Command-line runner: load a topology, start the realtime loop,
//! stream snapshots as JSON lines.

use clap::Parser;
use log::{info, warn};
use std::error::Error;
use std::fs;
use std::path::PathBuf;
use stellwerk_core::Command;
use stellwerk_engine::{parse_train_batch, SimConfig, SimulationHandle};
use stellwerk_topology::demo::demo_station;
use stellwerk_topology::{Topology, TopologySpec};

#[derive(Parser)]
#[command(name = "stellwerk", about = "Discrete-time railway station simulator")]
struct Args {
    /// Topology description (JSON). Uses the built-in demo station if
    /// omitted.
    #[arg(long)]
    topology: Option<PathBuf>,

    /// CSV train batch to spawn at startup.
    #[arg(long)]
    batch: Option<PathBuf>,

    /// Tick rate in Hz.
    #[arg(long, default_value_t = 10.0)]
    tick_rate: f64,

    /// Simulated seconds per wall second.
    #[arg(long, default_value_t = 1.0)]
    speed: f64,

    /// Stop after this many snapshots; run until interrupted if omitted.
    #[arg(long)]
    snapshots: Option<u64>,

    /// Print every n-th snapshot.
    #[arg(long, default_value_t = 10)]
    every: u64,
}

fn main() {
    env_logger::init();
    if let Err(e) = run(Args::parse()) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let topology = match &args.topology {
        Some(path) => {
            let spec: TopologySpec = serde_json::from_str(&fs::read_to_string(path)?)?;
            Topology::from_spec(spec)?
        }
        None => demo_station(),
    };

    let config = SimConfig {
        tick_rate_hz: args.tick_rate,
        speed_multiplier: args.speed,
        ..SimConfig::demo()
    };
    let mut handle = SimulationHandle::new(topology, config)?;
    info!("simulation running at {} Hz, x{}", args.tick_rate, args.speed);

    if let Some(path) = &args.batch {
        let requests = parse_train_batch(&fs::read_to_string(path)?)?;
        info!("spawning {} trains from {}", requests.len(), path.display());
        let commands: Vec<Command> = requests.into_iter().map(Command::Spawn).collect();
        for receipt in handle.submit_commands(commands)? {
            if let Some(reason) = receipt.reason {
                warn!("batch train {} rejected: {reason}", receipt.command_index);
            }
        }
    }

    let subscription = handle.subscribe();
    let mut seen = 0u64;
    while let Some(snapshot) = subscription.recv() {
        seen += 1;
        if args.every > 0 && seen % args.every == 0 {
            println!("{}", serde_json::to_string(&*snapshot)?);
        }
        if args.snapshots.is_some_and(|limit| seen >= limit) {
            break;
        }
    }

    handle.shutdown();
    Ok(())
}
