//! Mesa-style monitors with condition variables.
//!
//! A monitor is a user-level lock with an entry queue and named
//! condition variables. Signal moves a waiter to the entry queue rather
//! than handing the lock over directly, so woken threads must re-check
//! their predicate after reacquiring (Mesa semantics). Every operation
//! except `Enter` is a holder-only operation; issued by a non-holder it
//! is a silent no-op.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::Simulation;
use crate::types::{BlockReason, ThreadId};

/// Operations a thread can issue against a monitor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MonitorOp {
    Enter,
    Exit,
    /// Release the lock and block on a condition variable.
    Wait { cv: String },
    /// Move the head waiter of a condition variable to the entry queue.
    Signal { cv: String },
    /// Move every waiter of a condition variable to the entry queue.
    Broadcast { cv: String },
    /// Adjust the monitor's shared data value.
    ModifyData { delta: i64 },
    /// Wait on the condition variable only if the shared data is zero,
    /// otherwise proceed. The scripted-instruction engine retains a
    /// waiting `CheckAndWait` so the predicate is re-checked on wake.
    CheckAndWait { cv: String },
}

/// A monitor: user-level lock, entry queue, condition variables, and a
/// shared data value the scripted scenarios use as their predicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Monitor {
    pub locked_by: Option<ThreadId>,
    /// FIFO queue of threads waiting to acquire the lock.
    pub entry_queue: VecDeque<ThreadId>,
    /// Condition variables by name, each a FIFO queue of waiters.
    pub cvs: BTreeMap<String, VecDeque<ThreadId>>,
    pub data: i64,
}

impl Monitor {
    pub fn new() -> Self {
        Monitor {
            locked_by: None,
            entry_queue: VecDeque::new(),
            cvs: BTreeMap::new(),
            data: 0,
        }
    }

    pub fn with_cvs(names: &[&str]) -> Self {
        let mut monitor = Self::new();
        for name in names {
            monitor.cvs.insert(name.to_string(), VecDeque::new());
        }
        monitor
    }
}

impl Default for Monitor {
    fn default() -> Self {
        Self::new()
    }
}

impl Simulation {
    /// Issue a monitor operation on behalf of a thread.
    ///
    /// Unknown thread or monitor names are silent no-ops, as is any
    /// holder-only operation issued by a thread not holding the lock.
    pub fn monitor_op(&mut self, thread: ThreadId, monitor: &str, op: MonitorOp) {
        if !self.state.threads.contains_key(&thread) {
            debug!(thread = thread.0, monitor, "monitor op from unknown thread");
            return;
        }
        if !self.state.monitors.contains_key(monitor) {
            debug!(thread = thread.0, monitor, "op on unknown monitor");
            return;
        }
        match op {
            MonitorOp::Enter => self.monitor_enter(thread, monitor),
            MonitorOp::Exit => self.monitor_exit(thread, monitor),
            MonitorOp::Wait { cv } => self.monitor_wait(thread, monitor, &cv),
            MonitorOp::Signal { cv } => self.monitor_signal(thread, monitor, &cv),
            MonitorOp::Broadcast { cv } => self.monitor_broadcast(thread, monitor, &cv),
            MonitorOp::ModifyData { delta } => self.monitor_modify_data(thread, monitor, delta),
            MonitorOp::CheckAndWait { cv } => {
                let should_wait = self
                    .state
                    .monitors
                    .get(monitor)
                    .is_some_and(|m| m.data == 0);
                if should_wait {
                    self.monitor_wait(thread, monitor, &cv);
                }
            }
        }
    }

    fn holds_monitor(&self, thread: ThreadId, monitor: &str) -> bool {
        self.state
            .monitors
            .get(monitor)
            .is_some_and(|m| m.locked_by == Some(thread))
    }

    fn monitor_enter(&mut self, thread: ThreadId, monitor: &str) {
        let now = self.state.time;
        let locked_by = self
            .state
            .monitors
            .get(monitor)
            .and_then(|m| m.locked_by);
        match locked_by {
            None => {
                if let Some(m) = self.state.monitors.get_mut(monitor) {
                    m.locked_by = Some(thread);
                }
                if let Some(t) = self.state.threads.get_mut(&thread) {
                    t.held_monitor = Some(monitor.to_string());
                }
                debug!(thread = thread.0, monitor, "entered");
                self.state
                    .log
                    .push(now, format!("T{} entered {monitor}", thread.0));
            }
            Some(holder) if holder == thread => {
                // Re-entry by the holder is a no-op.
            }
            Some(_) => {
                if let Some(m) = self.state.monitors.get_mut(monitor) {
                    m.entry_queue.push_back(thread);
                }
                self.block_thread(thread, BlockReason::User);
                debug!(thread = thread.0, monitor, "queued on entry");
                self.state
                    .log
                    .push(now, format!("T{} waiting for {monitor}", thread.0));
            }
        }
    }

    fn monitor_exit(&mut self, thread: ThreadId, monitor: &str) {
        let now = self.state.time;
        if !self.holds_monitor(thread, monitor) {
            debug!(thread = thread.0, monitor, "exit by non-holder, ignored");
            return;
        }
        if let Some(m) = self.state.monitors.get_mut(monitor) {
            m.locked_by = None;
        }
        if let Some(t) = self.state.threads.get_mut(&thread) {
            t.held_monitor = None;
        }
        debug!(thread = thread.0, monitor, "exited");
        self.state
            .log
            .push(now, format!("T{} exited {monitor}", thread.0));
        self.grant_monitor_to_next(monitor);
    }

    /// Mesa wait: enqueue on the condition variable, drop the lock,
    /// block USER, then hand the lock to the next entry-queue waiter.
    fn monitor_wait(&mut self, thread: ThreadId, monitor: &str, cv: &str) {
        let now = self.state.time;
        if !self.holds_monitor(thread, monitor) {
            debug!(thread = thread.0, monitor, cv, "wait by non-holder, ignored");
            return;
        }
        if let Some(m) = self.state.monitors.get_mut(monitor) {
            m.cvs.entry(cv.to_string()).or_default().push_back(thread);
            m.locked_by = None;
        }
        if let Some(t) = self.state.threads.get_mut(&thread) {
            t.held_monitor = None;
        }
        self.block_thread(thread, BlockReason::User);
        debug!(thread = thread.0, monitor, cv, "waiting on cv");
        self.state
            .log
            .push(now, format!("T{} wait on {monitor}.{cv}", thread.0));
        self.grant_monitor_to_next(monitor);
    }

    /// Mesa signal: the head waiter moves to the entry queue and stays
    /// blocked until it reacquires the lock. The signaler keeps the lock.
    fn monitor_signal(&mut self, thread: ThreadId, monitor: &str, cv: &str) {
        let now = self.state.time;
        if !self.holds_monitor(thread, monitor) {
            debug!(thread = thread.0, monitor, cv, "signal by non-holder, ignored");
            return;
        }
        let moved = {
            let Some(m) = self.state.monitors.get_mut(monitor) else {
                return;
            };
            let moved = m.cvs.get_mut(cv).and_then(|q| q.pop_front());
            if let Some(waiter) = moved {
                m.entry_queue.push_back(waiter);
            }
            moved
        };
        match moved {
            Some(waiter) => {
                debug!(thread = thread.0, monitor, cv, waiter = waiter.0, "signaled");
                self.state.log.push(
                    now,
                    format!(
                        "T{} signaled {monitor}.{cv} -> T{} to entry queue",
                        thread.0, waiter.0
                    ),
                );
            }
            None => {
                debug!(thread = thread.0, monitor, cv, "signal with no waiters");
                self.state.log.push(
                    now,
                    format!("T{} signaled {monitor}.{cv}, no waiters", thread.0),
                );
            }
        }
    }

    fn monitor_broadcast(&mut self, thread: ThreadId, monitor: &str, cv: &str) {
        let now = self.state.time;
        if !self.holds_monitor(thread, monitor) {
            debug!(thread = thread.0, monitor, cv, "broadcast by non-holder, ignored");
            return;
        }
        let moved = {
            let Some(m) = self.state.monitors.get_mut(monitor) else {
                return;
            };
            let waiters: Vec<ThreadId> = m
                .cvs
                .get_mut(cv)
                .map(|q| q.drain(..).collect())
                .unwrap_or_default();
            for &waiter in &waiters {
                m.entry_queue.push_back(waiter);
            }
            waiters.len()
        };
        debug!(thread = thread.0, monitor, cv, moved, "broadcast");
        self.state.log.push(
            now,
            format!(
                "T{} broadcast {monitor}.{cv}, {moved} to entry queue",
                thread.0
            ),
        );
    }

    fn monitor_modify_data(&mut self, thread: ThreadId, monitor: &str, delta: i64) {
        let now = self.state.time;
        if !self.holds_monitor(thread, monitor) {
            debug!(thread = thread.0, monitor, "data write by non-holder, ignored");
            return;
        }
        let data = {
            let Some(m) = self.state.monitors.get_mut(monitor) else {
                return;
            };
            m.data += delta;
            m.data
        };
        debug!(thread = thread.0, monitor, data, "data modified");
        self.state
            .log
            .push(now, format!("T{} set {monitor} data = {data}", thread.0));
    }

    /// Hand the lock to the head of the entry queue, if any, and make
    /// that thread runnable again.
    pub(crate) fn grant_monitor_to_next(&mut self, monitor: &str) {
        let now = self.state.time;
        let next = {
            let Some(m) = self.state.monitors.get_mut(monitor) else {
                return;
            };
            let Some(next) = m.entry_queue.pop_front() else {
                return;
            };
            m.locked_by = Some(next);
            next
        };
        if let Some(t) = self.state.threads.get_mut(&next) {
            t.held_monitor = Some(monitor.to_string());
        }
        self.unblock_to_ready(next);
        debug!(thread = next.0, monitor, "lock granted");
        self.state
            .log
            .push(now, format!("T{} acquired monitor {monitor}", next.0));
    }

    /// Clean up a terminating thread's monitor involvement: release its
    /// lock (granting the next entry-queue waiter) and flush every
    /// condition-variable waiter of that monitor to the entry queue so
    /// nobody waits forever on a signal that can no longer come.
    pub(crate) fn release_monitor_on_termination(&mut self, thread: ThreadId) {
        let now = self.state.time;
        let Some(held) = self
            .state
            .threads
            .get_mut(&thread)
            .and_then(|t| t.held_monitor.take())
        else {
            return;
        };
        if let Some(m) = self.state.monitors.get_mut(&held) {
            m.locked_by = None;
        }
        self.state.log.push(
            now,
            format!("T{} exited {held} (terminated)", thread.0),
        );

        // Flush cv waiters before granting: with an empty entry queue the
        // flushed waiters must be eligible for the grant below.
        let flushed = {
            let Some(m) = self.state.monitors.get_mut(&held) else {
                return;
            };
            let mut flushed = 0usize;
            let cv_names: Vec<String> = m.cvs.keys().cloned().collect();
            for cv in cv_names {
                if let Some(queue) = m.cvs.get_mut(&cv) {
                    let waiters: Vec<ThreadId> = queue.drain(..).collect();
                    flushed += waiters.len();
                    for waiter in waiters {
                        m.entry_queue.push_back(waiter);
                    }
                }
            }
            flushed
        };
        if flushed > 0 {
            debug!(thread = thread.0, monitor = held.as_str(), flushed, "cv waiters flushed");
            self.state.log.push(
                now,
                format!("{held}: {flushed} waiter(s) moved to entry queue"),
            );
        }
        self.grant_monitor_to_next(&held);
    }
}
