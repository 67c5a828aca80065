//! Thread and process entity model.
//!
//! Each simulated thread carries its scheduling parameters, lifecycle
//! state, held synchronization objects, an execution-history audit trail,
//! and an optional queue of scripted instructions consumed by the tick
//! engine (used by scenario automation).

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use crate::monitor::MonitorOp;
use crate::resource::ResourceOp;
use crate::types::{BlockReason, ProcessId, ThreadId, ThreadState, Tick};

/// A kernel resource held by a thread, with the tick it was acquired at.
///
/// The acquisition tick drives the optional hold-limit sweep: a resource
/// held past the configured limit is force-released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeldResource {
    pub name: String,
    pub acquired_at: Tick,
}

/// A synchronization operation a scripted thread issues while running.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncOp {
    Resource { name: String, op: ResourceOp },
    Monitor { name: String, op: MonitorOp },
}

/// A scripted instruction: a synchronization operation gated on how long
/// the thread has existed. Fires once `current_time - arrival >= at`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instruction {
    pub at: Tick,
    pub op: SyncOp,
}

/// A simulated thread.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SimThread {
    pub id: ThreadId,
    pub process: ProcessId,
    /// Total CPU ticks required.
    pub burst: Tick,
    /// Ticks of work left. Reaches 0 exactly at termination.
    pub remaining: Tick,
    /// Ticks actually executed so far.
    pub elapsed: Tick,
    /// Higher numeric value means higher priority.
    pub priority: i32,
    /// Tick at which the thread becomes eligible to enter the ready queue.
    pub arrival: Tick,
    pub state: ThreadState,
    pub block_reason: Option<BlockReason>,
    /// Resources currently held; a resource name appears at most once.
    pub held_resources: Vec<HeldResource>,
    /// Monitor whose lock this thread holds, if any. At most one.
    pub held_monitor: Option<String>,
    /// Half-open `(start, end)` run intervals for audit; contiguous
    /// intervals are merged as the thread keeps executing.
    pub history: Vec<(Tick, Tick)>,
    /// Pending scripted instructions, consumed front-to-back.
    pub instructions: VecDeque<Instruction>,
    /// Termination tick minus arrival. Set at termination.
    pub turnaround: Option<Tick>,
    /// Turnaround minus burst. Set at termination.
    pub waiting: Option<Tick>,
}

impl SimThread {
    pub fn new(
        id: ThreadId,
        process: ProcessId,
        burst: Tick,
        priority: i32,
        arrival: Tick,
        instructions: Vec<Instruction>,
    ) -> Self {
        SimThread {
            id,
            process,
            burst,
            remaining: burst,
            elapsed: 0,
            priority,
            arrival,
            state: ThreadState::New,
            block_reason: None,
            held_resources: Vec::new(),
            held_monitor: None,
            history: Vec::new(),
            instructions: instructions.into(),
            turnaround: None,
            waiting: None,
        }
    }

    /// Whether this thread currently holds the named resource.
    pub fn holds_resource(&self, name: &str) -> bool {
        self.held_resources.iter().any(|r| r.name == name)
    }

    /// Record that the thread executed during the tick ending at `now`.
    /// Extends the last interval when contiguous, otherwise opens a new one.
    pub(crate) fn record_run(&mut self, now: Tick) {
        match self.history.last_mut() {
            Some(last) if last.1 == now - 1 => last.1 = now,
            _ => self.history.push((now - 1, now)),
        }
    }
}

/// A simulated process: a grouping of threads sharing an LWP budget.
/// The capacity is fixed at creation from the threading model and
/// governs admission for all the process's threads for its lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Process {
    pub id: ProcessId,
    /// Number of LWP slots the process's threads compete for.
    pub lwp_capacity: u32,
}
