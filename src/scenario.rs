//! Preset scenarios.
//!
//! Each preset is a canned command sequence that reconfigures the
//! engine and creates scripted processes demonstrating one scheduling
//! or synchronization behavior. Loading a preset resets the simulation
//! first and leaves it paused; the caller starts the clock.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::{ConfigPatch, SchedAlgorithm, ThreadingModel};
use crate::engine::{Command, ProcessSpec, Simulation};
use crate::monitor::MonitorOp;
use crate::resource::ResourceOp;
use crate::thread::{Instruction, SyncOp};
use crate::types::Tick;

/// The built-in demonstration scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
pub enum Preset {
    /// Round-robin rotation: three equal threads share one core.
    RoundRobin,
    /// Many-to-one: a blocked thread stalls its whole process.
    ManyToOneBlock,
    /// One-to-one contrast: a blocked thread's sibling keeps running.
    OneToOne,
    /// Monitor producer/consumer over the Buffer monitor.
    ProducerConsumer,
    /// Two threads acquire two mutexes in opposite order and deadlock.
    Deadlock,
}

fn request(at: Tick, name: &str) -> Instruction {
    Instruction {
        at,
        op: SyncOp::Resource {
            name: name.to_string(),
            op: ResourceOp::Request,
        },
    }
}

fn release(at: Tick, name: &str) -> Instruction {
    Instruction {
        at,
        op: SyncOp::Resource {
            name: name.to_string(),
            op: ResourceOp::Release,
        },
    }
}

fn monitor(at: Tick, op: MonitorOp) -> Instruction {
    Instruction {
        at,
        op: SyncOp::Monitor {
            name: "Buffer".to_string(),
            op,
        },
    }
}

impl Preset {
    /// The command sequence the preset replays onto a fresh simulation.
    pub fn commands(&self) -> Vec<Command> {
        match self {
            Preset::RoundRobin => vec![
                Command::UpdateConfig(ConfigPatch {
                    algorithm: Some(SchedAlgorithm::RoundRobin),
                    quantum: Some(3),
                    cpu_count: Some(1),
                    ..Default::default()
                }),
                Command::CreateProcess(ProcessSpec {
                    threads: 3,
                    burst: 9,
                    ..Default::default()
                }),
            ],
            Preset::ManyToOneBlock => vec![
                Command::UpdateConfig(ConfigPatch {
                    cpu_count: Some(2),
                    threading_model: Some(ThreadingModel::ManyToOne),
                    ..Default::default()
                }),
                // A one-to-one hog grabs Database first.
                Command::CreateProcess(ProcessSpec {
                    burst: 30,
                    model: ThreadingModel::OneToOne,
                    instructions: vec![request(1, "Database")],
                    ..Default::default()
                }),
                // Both siblings want Database; the first to run blocks
                // SYSTEM on it and pins the process's only LWP, so the
                // other starves with a core sitting idle.
                Command::CreateProcess(ProcessSpec {
                    threads: 2,
                    burst: 20,
                    model: ThreadingModel::ManyToOne,
                    instructions: vec![request(2, "Database")],
                    ..Default::default()
                }),
            ],
            Preset::OneToOne => vec![
                Command::UpdateConfig(ConfigPatch {
                    cpu_count: Some(2),
                    threading_model: Some(ThreadingModel::OneToOne),
                    ..Default::default()
                }),
                Command::CreateProcess(ProcessSpec {
                    threads: 2,
                    burst: 20,
                    instructions: vec![request(1, "Database"), release(6, "Database")],
                    ..Default::default()
                }),
            ],
            Preset::ProducerConsumer => vec![
                Command::UpdateConfig(ConfigPatch {
                    cpu_count: Some(2),
                    ..Default::default()
                }),
                // Producer: enter, put an item, signal, leave.
                Command::CreateProcess(ProcessSpec {
                    burst: 30,
                    instructions: vec![
                        monitor(2, MonitorOp::Enter),
                        monitor(4, MonitorOp::ModifyData { delta: 1 }),
                        monitor(
                            5,
                            MonitorOp::Signal {
                                cv: "NotEmpty".to_string(),
                            },
                        ),
                        monitor(8, MonitorOp::Exit),
                    ],
                    ..Default::default()
                }),
                // Consumer: enter, wait until an item exists, take it, leave.
                Command::CreateProcess(ProcessSpec {
                    burst: 30,
                    instructions: vec![
                        monitor(2, MonitorOp::Enter),
                        monitor(
                            5,
                            MonitorOp::CheckAndWait {
                                cv: "NotEmpty".to_string(),
                            },
                        ),
                        monitor(6, MonitorOp::ModifyData { delta: -1 }),
                        monitor(10, MonitorOp::Exit),
                    ],
                    ..Default::default()
                }),
            ],
            Preset::Deadlock => vec![
                Command::UpdateConfig(ConfigPatch {
                    cpu_count: Some(2),
                    ..Default::default()
                }),
                Command::CreateProcess(ProcessSpec {
                    burst: 999,
                    instructions: vec![request(0, "Database"), request(1, "Printer")],
                    ..Default::default()
                }),
                Command::CreateProcess(ProcessSpec {
                    burst: 999,
                    instructions: vec![request(0, "Printer"), request(1, "Database")],
                    ..Default::default()
                }),
            ],
        }
    }

    /// Reset the simulation and replay the preset's commands. The
    /// simulation is left paused.
    pub fn load(&self, sim: &mut Simulation) {
        sim.reset();
        for command in self.commands() {
            sim.apply(command);
        }
    }
}
