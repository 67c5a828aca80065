//! Shared helpers for integration tests.
//!
//! Each test binary uses a subset of these.
#![allow(dead_code)]

use schedsim::{Command, ConfigPatch, ProcessSpec, Simulation};

/// A paused simulation with the given config overrides applied.
pub fn sim_with(patch: ConfigPatch) -> Simulation {
    let mut sim = Simulation::default();
    sim.update_config(&patch);
    sim
}

/// Start the clock and advance `n` ticks.
pub fn run_ticks(sim: &mut Simulation, n: u64) {
    if !sim.state().running {
        sim.toggle_run();
    }
    for _ in 0..n {
        sim.tick();
    }
}

/// Start the clock and tick until auto-pause, panicking after `max` ticks.
pub fn run_until_paused(sim: &mut Simulation, max: u64) {
    if !sim.state().running {
        sim.toggle_run();
    }
    for _ in 0..max {
        sim.tick();
        if !sim.state().running {
            return;
        }
    }
    panic!("simulation still running after {max} ticks");
}

/// Shorthand for a single-thread process.
pub fn one_thread(burst: u64, priority: i32, arrival_delay: u64) -> Command {
    Command::CreateProcess(ProcessSpec {
        burst,
        priority,
        arrival_delay,
        ..Default::default()
    })
}
