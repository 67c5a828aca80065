//! Dispatch and preemption policy.
//!
//! Selection scans the ready queue in order and keeps the first thread
//! on ties, so FCFS arrival order breaks every tie deterministically.
//! Preemption is strict: a challenger must beat the incumbent outright,
//! equality never preempts.

use crate::config::SchedAlgorithm;
use crate::engine::SimState;
use crate::thread::SimThread;
use crate::types::ThreadId;

/// Pick the thread to dispatch from `candidates` (ready-queue order)
/// under the configured algorithm. Returns `None` when empty.
pub fn select_candidate(state: &SimState, candidates: &[ThreadId]) -> Option<ThreadId> {
    match state.config.algorithm {
        SchedAlgorithm::RoundRobin => candidates.first().copied(),
        SchedAlgorithm::Fcfs => pick_by_min(state, candidates, |t| t.arrival),
        SchedAlgorithm::Sjf => pick_by_min(state, candidates, |t| t.remaining),
        SchedAlgorithm::Priority => {
            pick_by_min(state, candidates, |t| std::cmp::Reverse(t.priority))
        }
    }
}

/// Whether `challenger` should displace `incumbent` from its core.
/// Only SJF and Priority are preemptive; both require a strict win.
pub fn preempts(
    algorithm: SchedAlgorithm,
    challenger: &SimThread,
    incumbent: &SimThread,
) -> bool {
    match algorithm {
        SchedAlgorithm::Sjf => challenger.remaining < incumbent.remaining,
        SchedAlgorithm::Priority => challenger.priority > incumbent.priority,
        SchedAlgorithm::Fcfs | SchedAlgorithm::RoundRobin => false,
    }
}

fn pick_by_min<K: Ord>(
    state: &SimState,
    candidates: &[ThreadId],
    key: impl Fn(&SimThread) -> K,
) -> Option<ThreadId> {
    let mut best: Option<(ThreadId, K)> = None;
    for &tid in candidates {
        let Some(thread) = state.threads.get(&tid) else {
            continue;
        };
        let k = key(thread);
        // Strict comparison keeps the earliest candidate on ties.
        if best.as_ref().is_none_or(|(_, bk)| k < *bk) {
            best = Some((tid, k));
        }
    }
    best.map(|(tid, _)| tid)
}
