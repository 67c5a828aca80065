//! schedsim - Deterministic discrete-time simulation of an OS kernel scheduler.
//!
//! The engine models CPU cores, threads grouped into processes under a
//! configurable threading model (one-to-one, many-to-one, many-to-many),
//! kernel resources (counting semaphores and mutexes), Mesa-style
//! monitors with condition variables, and pluggable dispatch policies
//! (FCFS, SJF, priority, round-robin).
//!
//! Time advances in explicit ticks through [`Simulation::tick`]; each
//! tick runs arrival, execution, an optional resource-timeout sweep,
//! and dispatch, in that order. All state is held in [`SimState`],
//! every container iterates deterministically, and the only entry point
//! for mutation is the [`Command`] surface, so identical command
//! sequences always produce identical states.

pub mod config;
pub mod engine;
pub mod log;
pub mod lwp;
pub mod monitor;
pub mod policy;
pub mod resource;
pub mod scenario;
pub mod thread;
pub mod types;

pub use config::{Config, ConfigPatch, SchedAlgorithm, ThreadingModel};
pub use engine::{Command, ProcessSpec, SimState, Simulation};
pub use log::{EventLog, LogEntry, LOG_CAPACITY};
pub use monitor::{Monitor, MonitorOp};
pub use resource::{Resource, ResourceOp};
pub use scenario::Preset;
pub use thread::{HeldResource, Instruction, Process, SimThread, SyncOp};
pub use types::{BlockReason, CoreId, ProcessId, ThreadId, ThreadState, Tick};
