//! Scheduler configuration.
//!
//! The scheduling algorithm is a closed variant — selection and
//! preemption dispatch on an explicit `match`, never on strings.

use serde::{Deserialize, Serialize};

use crate::types::Tick;

/// The scheduling algorithm driving dispatch and preemption.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum SchedAlgorithm {
    /// First-come-first-served: earliest arrival wins.
    Fcfs,
    /// Shortest job first: smallest remaining time wins.
    Sjf,
    /// Priority scheduling: numerically highest priority wins.
    Priority,
    /// Round-robin: pure FIFO with quantum-based yield.
    RoundRobin,
}

/// How user threads map onto kernel-schedulable LWP slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
pub enum ThreadingModel {
    /// Every thread owns a dedicated LWP.
    OneToOne,
    /// All threads of a process share a single LWP.
    ManyToOne,
    /// Threads of a process compete for a fixed-size LWP pool.
    ManyToMany,
}

/// Engine configuration. Survives [`reset`](crate::engine::Simulation::reset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub algorithm: SchedAlgorithm,
    /// Round-robin quantum in ticks.
    pub quantum: u32,
    /// Number of CPU cores (clamped to at least 1 on merge).
    pub cpu_count: u32,
    pub threading_model: ThreadingModel,
    /// LWP pool size given to processes created under many-to-many.
    pub default_lwp_count: u32,
    /// Enables SJF/Priority preemption of a running thread.
    pub preemptive: bool,
    /// Force-release resources held longer than this many ticks. 0 disables.
    pub resource_hold_limit: Tick,
    /// Whether a USER-level block (monitor/CV wait) still occupies an LWP
    /// slot for gate accounting. User-level blocking is invisible to the
    /// kernel in most implementations, so the default is false.
    pub user_block_holds_lwp: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            algorithm: SchedAlgorithm::RoundRobin,
            quantum: 4,
            cpu_count: 2,
            threading_model: ThreadingModel::OneToOne,
            default_lwp_count: 2,
            preemptive: false,
            resource_hold_limit: 0,
            user_block_holds_lwp: false,
        }
    }
}

/// A partial configuration: only the fields present are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigPatch {
    pub algorithm: Option<SchedAlgorithm>,
    pub quantum: Option<u32>,
    pub cpu_count: Option<u32>,
    pub threading_model: Option<ThreadingModel>,
    pub default_lwp_count: Option<u32>,
    pub preemptive: Option<bool>,
    pub resource_hold_limit: Option<Tick>,
    pub user_block_holds_lwp: Option<bool>,
}

impl Config {
    /// Merge a partial configuration into this one.
    ///
    /// A zero CPU count is clamped to 1: the engine is total over its
    /// state space and a core array must never be empty.
    pub fn merge(&mut self, patch: &ConfigPatch) {
        if let Some(algorithm) = patch.algorithm {
            self.algorithm = algorithm;
        }
        if let Some(quantum) = patch.quantum {
            self.quantum = quantum;
        }
        if let Some(cpu_count) = patch.cpu_count {
            self.cpu_count = cpu_count.max(1);
        }
        if let Some(threading_model) = patch.threading_model {
            self.threading_model = threading_model;
        }
        if let Some(default_lwp_count) = patch.default_lwp_count {
            self.default_lwp_count = default_lwp_count;
        }
        if let Some(preemptive) = patch.preemptive {
            self.preemptive = preemptive;
        }
        if let Some(resource_hold_limit) = patch.resource_hold_limit {
            self.resource_hold_limit = resource_hold_limit;
        }
        if let Some(user_block_holds_lwp) = patch.user_block_holds_lwp {
            self.user_block_holds_lwp = user_block_holds_lwp;
        }
    }
}
