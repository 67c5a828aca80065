//! Threading-model admission gate.
//!
//! Before a thread may occupy a core, its process must have a free LWP
//! slot under the currently configured threading model. One-to-one never
//! gates. Many-to-one allows a single occupied slot per process.
//! Many-to-many allows up to the process's pool capacity.
//!
//! A slot counts as occupied by threads that are Running, or Blocked for
//! a SYSTEM reason (a kernel-level wait pins the LWP). A USER-level
//! block only counts when `user_block_holds_lwp` is set.

use crate::config::ThreadingModel;
use crate::engine::SimState;
use crate::thread::SimThread;
use crate::types::{BlockReason, ThreadId, ThreadState};

/// Whether `thread` may be placed on a core right now. `exclude` removes
/// one thread from the occupancy count, used when evaluating a
/// preemption swap where the incumbent is about to vacate its slot.
pub fn can_dispatch(state: &SimState, thread: ThreadId, exclude: Option<ThreadId>) -> bool {
    let Some(t) = state.threads.get(&thread) else {
        return false;
    };
    let limit = match state.config.threading_model {
        ThreadingModel::OneToOne => return true,
        ThreadingModel::ManyToOne => 1,
        ThreadingModel::ManyToMany => state
            .processes
            .get(&t.process)
            .map_or(1, |p| p.lwp_capacity),
    };
    let occupied = state
        .threads
        .values()
        .filter(|other| other.process == t.process && Some(other.id) != exclude)
        .filter(|other| occupies_lwp(other, state.config.user_block_holds_lwp))
        .count() as u32;
    occupied < limit
}

fn occupies_lwp(thread: &SimThread, user_block_holds_lwp: bool) -> bool {
    match (thread.state, thread.block_reason) {
        (ThreadState::Running, _) => true,
        (ThreadState::Blocked, Some(BlockReason::System)) => true,
        (ThreadState::Blocked, Some(BlockReason::User)) => user_block_holds_lwp,
        _ => false,
    }
}
