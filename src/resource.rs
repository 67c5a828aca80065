//! Kernel resource (semaphore/mutex) simulation.
//!
//! A resource is a counting semaphore; a mutex is the max == 1 case.
//! Blocked requesters wait in strict FIFO order and are woken one per
//! release, re-acquiring on their way out of the wait queue. The core
//! conservation invariant is `available + holders == max` at all times.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::engine::Simulation;
use crate::thread::HeldResource;
use crate::types::{BlockReason, ThreadId};

/// Operations a thread can issue against a kernel resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResourceOp {
    Request,
    Release,
}

/// A kernel synchronization object: mutex or counting semaphore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    /// Units currently free, in `[0, max]`.
    pub available: u32,
    pub max: u32,
    /// Threads currently holding a unit. A thread appears at most once
    /// and never simultaneously in `wait_queue`.
    pub holders: Vec<ThreadId>,
    /// FIFO queue of blocked requesters.
    pub wait_queue: VecDeque<ThreadId>,
}

impl Resource {
    /// A mutex: a semaphore with a single unit.
    pub fn mutex() -> Self {
        Self::semaphore(1)
    }

    pub fn semaphore(max: u32) -> Self {
        Resource {
            available: max,
            max,
            holders: Vec::new(),
            wait_queue: VecDeque::new(),
        }
    }

    /// Whether the conservation invariant `available + holders == max` holds.
    pub fn is_conserved(&self) -> bool {
        self.available as usize + self.holders.len() == self.max as usize
    }
}

impl Simulation {
    /// Issue a resource operation on behalf of a thread.
    ///
    /// Unknown thread or resource names are silent no-ops, as is a
    /// release of a resource the thread does not hold.
    pub fn resource_op(&mut self, thread: ThreadId, resource: &str, op: ResourceOp) {
        match op {
            ResourceOp::Request => self.resource_request(thread, resource),
            ResourceOp::Release => self.resource_release(thread, resource, false),
        }
    }

    fn resource_request(&mut self, thread: ThreadId, resource: &str) {
        let now = self.state.time;
        let Some(t) = self.state.threads.get(&thread) else {
            debug!(thread = thread.0, resource, "request from unknown thread");
            return;
        };
        // A thread holds a resource at most once and never sits in the
        // wait queue of a resource it holds; re-requests are illegal ops.
        if t.holds_resource(resource) {
            debug!(thread = thread.0, resource, "request while holding, ignored");
            return;
        }
        let acquired = {
            let Some(res) = self.state.resources.get_mut(resource) else {
                debug!(thread = thread.0, resource, "request on unknown resource");
                return;
            };
            if res.available > 0 {
                res.available -= 1;
                res.holders.push(thread);
                true
            } else {
                res.wait_queue.push_back(thread);
                false
            }
        };

        if acquired {
            if let Some(t) = self.state.threads.get_mut(&thread) {
                t.held_resources.push(HeldResource {
                    name: resource.to_string(),
                    acquired_at: now,
                });
            }
            debug!(thread = thread.0, resource, "acquired");
            self.state
                .log
                .push(now, format!("T{} acquired {resource}", thread.0));
        } else {
            self.block_thread(thread, BlockReason::System);
            debug!(thread = thread.0, resource, "blocked");
            self.state
                .log
                .push(now, format!("T{} blocked on {resource}", thread.0));
        }
    }

    /// Release a held unit and hand it to the next FIFO waiter, if any.
    ///
    /// `forced` marks the hold-limit timeout path; wake semantics are
    /// identical, only the log line differs.
    pub(crate) fn resource_release(&mut self, thread: ThreadId, resource: &str, forced: bool) {
        let now = self.state.time;
        let holds = self
            .state
            .threads
            .get(&thread)
            .is_some_and(|t| t.holds_resource(resource));
        if !holds {
            debug!(thread = thread.0, resource, "release without hold, ignored");
            return;
        }

        {
            let Some(res) = self.state.resources.get_mut(resource) else {
                return;
            };
            res.holders.retain(|&h| h != thread);
            res.available += 1;
        }
        if let Some(t) = self.state.threads.get_mut(&thread) {
            t.held_resources.retain(|r| r.name != resource);
        }

        if forced {
            self.state.log.push(
                now,
                format!("{resource} force-released from T{} (hold limit)", thread.0),
            );
        } else {
            self.state
                .log
                .push(now, format!("T{} released {resource}", thread.0));
        }
        debug!(thread = thread.0, resource, forced, "released");

        self.wake_next_waiter(resource);
    }

    /// Pop the head of a resource's wait queue, re-acquire on its behalf,
    /// and move it back to the ready queue.
    fn wake_next_waiter(&mut self, resource: &str) {
        let now = self.state.time;
        let woken = {
            let Some(res) = self.state.resources.get_mut(resource) else {
                return;
            };
            let Some(woken) = res.wait_queue.pop_front() else {
                return;
            };
            res.available -= 1;
            res.holders.push(woken);
            woken
        };
        if let Some(t) = self.state.threads.get_mut(&woken) {
            t.held_resources.push(HeldResource {
                name: resource.to_string(),
                acquired_at: now,
            });
        }
        self.unblock_to_ready(woken);
        debug!(thread = woken.0, resource, "woken");
        self.state
            .log
            .push(now, format!("T{} woken on {resource}", woken.0));
    }

    /// Release every resource a terminating thread still holds.
    pub(crate) fn release_all_resources(&mut self, thread: ThreadId) {
        let held: Vec<String> = self
            .state
            .threads
            .get(&thread)
            .map(|t| t.held_resources.iter().map(|r| r.name.clone()).collect())
            .unwrap_or_default();
        for name in held {
            self.resource_release(thread, &name, false);
        }
    }

    /// Force-release any resource held longer than the configured limit.
    /// Wake semantics match a normal release; the holder's current state
    /// is irrelevant.
    pub(crate) fn sweep_resource_timeouts(&mut self) {
        let limit = self.state.config.resource_hold_limit;
        let now = self.state.time;
        let expired: Vec<(ThreadId, String)> = self
            .state
            .threads
            .values()
            .flat_map(|t| {
                t.held_resources
                    .iter()
                    .filter(move |r| now.saturating_sub(r.acquired_at) >= limit)
                    .map(move |r| (t.id, r.name.clone()))
            })
            .collect();
        for (thread, name) in expired {
            self.resource_release(thread, &name, true);
        }
    }
}
