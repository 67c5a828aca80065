//! Newtype wrappers and type aliases for domain concepts.
//!
//! Newtypes for identifiers (thread IDs, process IDs, core IDs) prevent
//! silent type confusion. A type alias for the simulated clock provides
//! self-documenting code without the boilerplate of arithmetic traits.

use serde::{Deserialize, Serialize};

/// Thread identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ThreadId(pub u32);

/// Process identifier.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct ProcessId(pub u32);

/// CPU core identifier (index into the core array).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
pub struct CoreId(pub u32);

/// Simulated time in ticks.
pub type Tick = u64;

/// The lifecycle state of a simulated thread.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ThreadState {
    /// Created but not yet arrived.
    New,
    /// Runnable, sitting in the ready queue.
    Ready,
    /// Currently assigned to a CPU core.
    Running,
    /// Waiting on a kernel resource or a monitor; see [`BlockReason`].
    Blocked,
    /// Burst fully executed. Terminal — never re-enters any other state.
    Terminated,
}

/// Why a thread is blocked.
///
/// The distinction matters to the threading-model gate: a SYSTEM block
/// (kernel semaphore/mutex) pins the thread's LWP slot, while a USER
/// block (monitor/condition variable) is user-level synchronization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BlockReason {
    /// Blocked on a kernel resource (semaphore/mutex wait queue).
    System,
    /// Blocked on a monitor entry queue or condition variable.
    User,
}
