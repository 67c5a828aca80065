//! schedsim — Run kernel scheduler simulations from preset scenarios.

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;

use schedsim::{
    Config, ConfigPatch, Preset, SchedAlgorithm, Simulation, ThreadingModel,
};

/// Run kernel scheduler simulations from preset scenarios.
#[derive(Parser)]
#[command(name = "schedsim")]
struct Cli {
    /// Preset scenario to load.
    #[arg(value_enum)]
    preset: Preset,

    /// Maximum number of ticks to simulate. Stops early on auto-pause.
    #[arg(short, long, default_value_t = 100)]
    ticks: u64,

    /// Scheduling algorithm (overrides the preset).
    #[arg(short, long, value_enum)]
    algorithm: Option<SchedAlgorithm>,

    /// Number of CPU cores (overrides the preset).
    #[arg(short, long)]
    cpus: Option<u32>,

    /// Round-robin quantum in ticks (overrides the preset).
    #[arg(short, long)]
    quantum: Option<u32>,

    /// Threading model (overrides the preset).
    #[arg(short = 'm', long, value_enum)]
    threading_model: Option<ThreadingModel>,

    /// Enable SJF/Priority preemption.
    #[arg(long)]
    preemptive: bool,

    /// Force-release resources held longer than this many ticks.
    #[arg(long, value_name = "TICKS")]
    hold_limit: Option<u64>,

    /// Print the retained event log to stdout, oldest first.
    #[arg(long)]
    dump_log: bool,

    /// Write the final simulation state as JSON to a file.
    #[arg(long, value_name = "PATH")]
    dump_state: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    if let Err(e) = run(&cli) {
        eprintln!("error: {e:#}");
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let mut sim = Simulation::new(Config::default());
    cli.preset.load(&mut sim);
    sim.update_config(&ConfigPatch {
        algorithm: cli.algorithm,
        quantum: cli.quantum,
        cpu_count: cli.cpus,
        threading_model: cli.threading_model,
        preemptive: cli.preemptive.then_some(true),
        resource_hold_limit: cli.hold_limit,
        ..Default::default()
    });

    sim.toggle_run();
    for _ in 0..cli.ticks {
        sim.tick();
        if !sim.state().running {
            break;
        }
    }

    let state = sim.state();
    println!(
        "tick {}: {} terminated, {} ready, {} blocked, {} running",
        state.time,
        state.terminated.len(),
        state.ready_queue.len(),
        state.blocked_queue.len(),
        state.cores.iter().flatten().count(),
    );
    for thread in state.threads.values() {
        match (thread.turnaround, thread.waiting) {
            (Some(turnaround), Some(waiting)) => println!(
                "  T{} (P{}): turnaround {turnaround}, waiting {waiting}",
                thread.id.0, thread.process.0
            ),
            _ => println!(
                "  T{} (P{}): {:?}, {} of {} ticks done",
                thread.id.0, thread.process.0, thread.state, thread.elapsed, thread.burst
            ),
        }
    }

    if cli.dump_log {
        let mut entries: Vec<String> = state.log.entries().map(|e| e.to_string()).collect();
        entries.reverse();
        for line in entries {
            println!("{line}");
        }
    }

    if let Some(path) = &cli.dump_state {
        let json = serde_json::to_string_pretty(state)?;
        std::fs::write(path, json)
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("wrote state to {}", path.display());
    }

    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
}
