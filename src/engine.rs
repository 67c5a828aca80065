//! The discrete-time tick engine.
//!
//! All simulation state lives in [`SimState`], a plain serializable
//! value; [`Simulation`] wraps it with the command handlers and the
//! four-phase tick: arrival, execution, resource-timeout sweep,
//! dispatch. Each phase observes the previous phase's effects within
//! the same tick, so a thread blocked during execution frees its core
//! for dispatch in that very tick.
//!
//! Determinism: every map is a `BTreeMap` and every queue is scanned in
//! order, so identical command sequences yield identical states.

use std::collections::{BTreeMap, VecDeque};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{Config, ConfigPatch, SchedAlgorithm, ThreadingModel};
use crate::log::EventLog;
use crate::lwp;
use crate::monitor::{Monitor, MonitorOp};
use crate::policy;
use crate::resource::{Resource, ResourceOp};
use crate::thread::{Instruction, Process, SimThread, SyncOp};
use crate::types::{CoreId, ProcessId, ThreadId, ThreadState, Tick};

/// The complete simulation state. Serializable as a whole for
/// snapshotting and inspection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimState {
    pub time: Tick,
    /// Whether ticks advance. Toggled by run/pause and auto-pause.
    pub running: bool,
    /// One slot per CPU core; `None` is an idle core.
    pub cores: Vec<Option<ThreadId>>,
    /// Ticks each core's current thread has run since dispatch.
    pub quantum_counters: Vec<u32>,
    pub ready_queue: VecDeque<ThreadId>,
    pub blocked_queue: Vec<ThreadId>,
    pub terminated: Vec<ThreadId>,
    pub threads: BTreeMap<ThreadId, SimThread>,
    pub processes: BTreeMap<ProcessId, Process>,
    pub resources: BTreeMap<String, Resource>,
    pub monitors: BTreeMap<String, Monitor>,
    pub log: EventLog,
    pub config: Config,
}

impl SimState {
    pub fn new(config: Config) -> Self {
        let cores = vec![None; config.cpu_count.max(1) as usize];
        let quantum_counters = vec![0; cores.len()];
        SimState {
            time: 0,
            running: false,
            cores,
            quantum_counters,
            ready_queue: VecDeque::new(),
            blocked_queue: Vec::new(),
            terminated: Vec::new(),
            threads: BTreeMap::new(),
            processes: BTreeMap::new(),
            resources: default_resources(),
            monitors: default_monitors(),
            log: EventLog::new(),
            config,
        }
    }

    pub fn thread(&self, id: ThreadId) -> Option<&SimThread> {
        self.threads.get(&id)
    }

    /// The core a thread currently occupies, if any.
    pub fn core_of(&self, thread: ThreadId) -> Option<CoreId> {
        self.cores
            .iter()
            .position(|c| *c == Some(thread))
            .map(|i| CoreId(i as u32))
    }
}

impl Default for SimState {
    fn default() -> Self {
        Self::new(Config::default())
    }
}

fn default_resources() -> BTreeMap<String, Resource> {
    BTreeMap::from([
        ("Database".to_string(), Resource::mutex()),
        ("Printer".to_string(), Resource::mutex()),
        ("Disk I/O".to_string(), Resource::semaphore(2)),
    ])
}

fn default_monitors() -> BTreeMap<String, Monitor> {
    BTreeMap::from([(
        "Buffer".to_string(),
        Monitor::with_cvs(&["NotFull", "NotEmpty"]),
    )])
}

/// How to build a process and its threads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessSpec {
    pub threads: u32,
    /// CPU ticks each thread needs.
    pub burst: Tick,
    pub priority: i32,
    /// Threading model the process is created under; fixes its LWP
    /// capacity for life, independent of later config changes.
    pub model: ThreadingModel,
    /// Ticks after creation before the threads arrive.
    pub arrival_delay: Tick,
    /// Script given to every thread of the process.
    pub instructions: Vec<Instruction>,
}

impl Default for ProcessSpec {
    fn default() -> Self {
        ProcessSpec {
            threads: 1,
            burst: 10,
            priority: 1,
            model: ThreadingModel::OneToOne,
            arrival_delay: 0,
            instructions: Vec::new(),
        }
    }
}

/// A command against the engine. The entire external surface: every
/// mutation of the simulation goes through [`Simulation::apply`] or the
/// equivalent named method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Command {
    /// Advance one tick (no-op while paused).
    Tick,
    ToggleRun,
    Reset,
    CreateProcess(ProcessSpec),
    Resource {
        thread: ThreadId,
        resource: String,
        op: ResourceOp,
    },
    Monitor {
        thread: ThreadId,
        monitor: String,
        op: MonitorOp,
    },
    UpdateConfig(ConfigPatch),
}

/// The simulation engine.
pub struct Simulation {
    pub(crate) state: SimState,
}

impl Simulation {
    pub fn new(config: Config) -> Self {
        Simulation {
            state: SimState::new(config),
        }
    }

    pub fn state(&self) -> &SimState {
        &self.state
    }

    pub fn apply(&mut self, command: Command) {
        match command {
            Command::Tick => self.tick(),
            Command::ToggleRun => self.toggle_run(),
            Command::Reset => self.reset(),
            Command::CreateProcess(spec) => {
                self.create_process(&spec);
            }
            Command::Resource {
                thread,
                resource,
                op,
            } => self.resource_op(thread, &resource, op),
            Command::Monitor {
                thread,
                monitor,
                op,
            } => self.monitor_op(thread, &monitor, op),
            Command::UpdateConfig(patch) => self.update_config(&patch),
        }
    }

    pub fn toggle_run(&mut self) {
        self.state.running = !self.state.running;
        info!(running = self.state.running, time = self.state.time, "run toggled");
    }

    /// Discard all simulation state, keeping the current configuration.
    pub fn reset(&mut self) {
        let config = self.state.config.clone();
        self.state = SimState::new(config);
        info!("reset");
    }

    /// Create a process with `spec.threads` identical threads. Thread
    /// IDs continue the global sequence; the process's LWP capacity is
    /// fixed here from its threading model.
    pub fn create_process(&mut self, spec: &ProcessSpec) -> ProcessId {
        let s = &mut self.state;
        let pid = ProcessId(s.processes.len() as u32 + 1);
        let count = spec.threads.max(1);
        let lwp_capacity = match spec.model {
            ThreadingModel::OneToOne => count,
            ThreadingModel::ManyToOne => 1,
            ThreadingModel::ManyToMany => s.config.default_lwp_count.max(1),
        };
        s.processes.insert(pid, Process { id: pid, lwp_capacity });

        let base = s.threads.len() as u32;
        let arrival = s.time + spec.arrival_delay;
        for i in 0..count {
            let tid = ThreadId(base + i + 1);
            s.threads.insert(
                tid,
                SimThread::new(
                    tid,
                    pid,
                    spec.burst,
                    spec.priority,
                    arrival,
                    spec.instructions.clone(),
                ),
            );
        }
        info!(process = pid.0, threads = count, "process created");
        s.log.push(
            s.time,
            format!("created P{} with {count} thread(s)", pid.0),
        );
        pid
    }

    /// Advance the simulation one tick. A no-op while paused.
    ///
    /// Phase order within the tick: arrival, per-core execution,
    /// resource-timeout sweep, dispatch of idle cores, auto-pause check.
    pub fn tick(&mut self) {
        if !self.state.running {
            return;
        }
        self.state.time += 1;
        debug!(time = self.state.time, "tick");

        self.admit_arrivals();
        self.run_cores();
        if self.state.config.resource_hold_limit > 0 {
            self.sweep_resource_timeouts();
        }
        self.dispatch_idle_cores();
        self.check_auto_pause();
    }

    /// Phase 1: move every New thread whose arrival time has come into
    /// the ready queue, in thread-ID order.
    fn admit_arrivals(&mut self) {
        let now = self.state.time;
        let arrivals: Vec<(ThreadId, ProcessId)> = self
            .state
            .threads
            .values()
            .filter(|t| t.state == ThreadState::New && t.arrival <= now)
            .map(|t| (t.id, t.process))
            .collect();
        for (tid, pid) in arrivals {
            if let Some(t) = self.state.threads.get_mut(&tid) {
                t.state = ThreadState::Ready;
            }
            self.state.ready_queue.push_back(tid);
            debug!(thread = tid.0, process = pid.0, "arrived");
            self.state
                .log
                .push(now, format!("T{} (P{}) arrived", tid.0, pid.0));
        }
    }

    /// Phase 2: each occupied core, in index order, runs its thread for
    /// one tick: scripted instruction first (which may block the
    /// thread), then one unit of work, then termination, quantum expiry
    /// or preemption.
    fn run_cores(&mut self) {
        let now = self.state.time;
        for i in 0..self.state.cores.len() {
            let Some(tid) = self.state.cores[i] else {
                continue;
            };
            if self
                .state
                .threads
                .get(&tid)
                .is_none_or(|t| t.state != ThreadState::Running)
            {
                // Stale core assignment, clear it.
                self.state.cores[i] = None;
                self.state.quantum_counters[i] = 0;
                continue;
            }

            // History records core occupancy for the tick, even when a
            // scripted instruction blocks the thread mid-tick.
            if let Some(t) = self.state.threads.get_mut(&tid) {
                t.record_run(now);
            }

            if !self.run_pending_instruction(tid) {
                // The instruction blocked the thread; its core is free
                // and no work executed this tick.
                self.state.cores[i] = None;
                self.state.quantum_counters[i] = 0;
                continue;
            }

            let remaining = {
                let Some(t) = self.state.threads.get_mut(&tid) else {
                    continue;
                };
                t.remaining = t.remaining.saturating_sub(1);
                t.elapsed += 1;
                t.remaining
            };
            self.state.quantum_counters[i] += 1;

            if remaining == 0 {
                self.terminate_thread(tid, i);
                continue;
            }

            let algorithm = self.state.config.algorithm;
            let quantum = self.state.config.quantum;
            let preemptive = self.state.config.preemptive;
            if algorithm == SchedAlgorithm::RoundRobin
                && self.state.quantum_counters[i] >= quantum
            {
                self.expire_quantum(tid, i);
            } else if preemptive
                && matches!(algorithm, SchedAlgorithm::Sjf | SchedAlgorithm::Priority)
            {
                self.try_preempt(tid, i);
            }
        }
    }

    /// Execute the thread's next scripted instruction if it is due.
    /// Returns false when the instruction left the thread blocked.
    /// A waiting `CheckAndWait` is retained so its predicate is
    /// re-checked after the thread wakes (Mesa semantics).
    fn run_pending_instruction(&mut self, tid: ThreadId) -> bool {
        let now = self.state.time;
        let pending = {
            let Some(t) = self.state.threads.get(&tid) else {
                return false;
            };
            t.instructions
                .front()
                .filter(|instr| now.saturating_sub(t.arrival) >= instr.at)
                .cloned()
        };
        let Some(instruction) = pending else {
            return true;
        };

        let consumed = match &instruction.op {
            SyncOp::Resource { name, op } => {
                self.resource_op(tid, name, *op);
                true
            }
            SyncOp::Monitor { name, op } => match op {
                MonitorOp::CheckAndWait { cv } => {
                    let should_wait = self
                        .state
                        .monitors
                        .get(name)
                        .is_some_and(|m| m.data == 0);
                    if should_wait {
                        self.monitor_op(tid, name, MonitorOp::Wait { cv: cv.clone() });
                        false
                    } else {
                        true
                    }
                }
                other => {
                    self.monitor_op(tid, name, other.clone());
                    true
                }
            },
        };
        if consumed {
            if let Some(t) = self.state.threads.get_mut(&tid) {
                t.instructions.pop_front();
            }
        }
        self.state
            .threads
            .get(&tid)
            .is_some_and(|t| t.state == ThreadState::Running)
    }

    fn terminate_thread(&mut self, tid: ThreadId, core: usize) {
        let now = self.state.time;
        self.release_monitor_on_termination(tid);
        self.release_all_resources(tid);
        if let Some(t) = self.state.threads.get_mut(&tid) {
            t.state = ThreadState::Terminated;
            t.block_reason = None;
            let turnaround = now - t.arrival;
            t.turnaround = Some(turnaround);
            t.waiting = Some(turnaround.saturating_sub(t.burst));
        }
        self.state.cores[core] = None;
        self.state.quantum_counters[core] = 0;
        self.state.terminated.push(tid);
        info!(thread = tid.0, core, time = now, "terminated");
        self.state
            .log
            .push(now, format!("CPU {core}: T{} terminated", tid.0));
    }

    fn expire_quantum(&mut self, tid: ThreadId, core: usize) {
        let now = self.state.time;
        if let Some(t) = self.state.threads.get_mut(&tid) {
            t.state = ThreadState::Ready;
        }
        self.state.ready_queue.push_back(tid);
        self.state.cores[core] = None;
        self.state.quantum_counters[core] = 0;
        debug!(thread = tid.0, core, "quantum expired");
        self.state
            .log
            .push(now, format!("CPU {core}: T{} quantum expired", tid.0));
    }

    /// Evaluate SJF/Priority preemption of the thread on `core`. The
    /// challenger is chosen by the dispatch policy from the gated ready
    /// queue, counting the incumbent's LWP slot as already vacated.
    fn try_preempt(&mut self, tid: ThreadId, core: usize) {
        let now = self.state.time;
        let candidates: Vec<ThreadId> = self
            .state
            .ready_queue
            .iter()
            .copied()
            .filter(|&c| lwp::can_dispatch(&self.state, c, Some(tid)))
            .collect();
        let Some(best) = policy::select_candidate(&self.state, &candidates) else {
            return;
        };
        let wins = {
            let (Some(challenger), Some(incumbent)) =
                (self.state.threads.get(&best), self.state.threads.get(&tid))
            else {
                return;
            };
            policy::preempts(self.state.config.algorithm, challenger, incumbent)
        };
        if !wins {
            return;
        }

        if let Some(t) = self.state.threads.get_mut(&tid) {
            t.state = ThreadState::Ready;
        }
        self.state.ready_queue.push_back(tid);
        self.state.ready_queue.retain(|&t| t != best);
        if let Some(t) = self.state.threads.get_mut(&best) {
            t.state = ThreadState::Running;
        }
        self.state.cores[core] = Some(best);
        self.state.quantum_counters[core] = 0;
        debug!(thread = tid.0, by = best.0, core, "preempted");
        self.state.log.push(
            now,
            format!("CPU {core}: T{} preempted by T{}", tid.0, best.0),
        );
    }

    /// Phase 4: fill idle cores in index order from the gated ready
    /// queue, one policy selection per core.
    fn dispatch_idle_cores(&mut self) {
        let now = self.state.time;
        for i in 0..self.state.cores.len() {
            if self.state.cores[i].is_some() {
                continue;
            }
            let candidates: Vec<ThreadId> = self
                .state
                .ready_queue
                .iter()
                .copied()
                .filter(|&c| lwp::can_dispatch(&self.state, c, None))
                .collect();
            let Some(best) = policy::select_candidate(&self.state, &candidates) else {
                continue;
            };
            self.state.ready_queue.retain(|&t| t != best);
            if let Some(t) = self.state.threads.get_mut(&best) {
                t.state = ThreadState::Running;
                t.block_reason = None;
            }
            self.state.cores[i] = Some(best);
            self.state.quantum_counters[i] = 0;
            debug!(thread = best.0, core = i, "dispatched");
            self.state
                .log
                .push(now, format!("CPU {i}: dispatched T{}", best.0));
        }
    }

    /// Pause automatically when nothing is runnable: all cores idle and
    /// both the ready and blocked queues empty while at least one thread
    /// exists. This also fires before a delayed arrival; resuming such a
    /// run takes another toggle. A deadlock keeps the blocked queue
    /// occupied, so the clock keeps running through it.
    fn check_auto_pause(&mut self) {
        let s = &mut self.state;
        if s.running
            && s.cores.iter().all(|c| c.is_none())
            && s.ready_queue.is_empty()
            && s.blocked_queue.is_empty()
            && !s.threads.is_empty()
        {
            s.running = false;
            info!(time = s.time, "auto-paused");
            s.log.push(s.time, "simulation idle, auto-paused");
        }
    }

    /// Merge a config patch. A CPU count change resizes the core array
    /// immediately: running threads are ejected back to the ready queue
    /// first, so nothing runs on a core that ceases to exist.
    pub fn update_config(&mut self, patch: &ConfigPatch) {
        if let Some(n) = patch.cpu_count {
            let n = n.max(1) as usize;
            if n != self.state.cores.len() {
                let now = self.state.time;
                let running: Vec<ThreadId> =
                    self.state.cores.iter().flatten().copied().collect();
                for tid in running {
                    if let Some(t) = self.state.threads.get_mut(&tid) {
                        t.state = ThreadState::Ready;
                    }
                    self.state.ready_queue.push_back(tid);
                    self.state
                        .log
                        .push(now, format!("CPU change: T{} back to ready", tid.0));
                }
                self.state.cores = vec![None; n];
                self.state.quantum_counters = vec![0; n];
                info!(cpus = n, "core array resized");
            }
        }
        self.state.config.merge(patch);
        debug!(?patch, "config updated");
    }

    /// Block a thread: vacate its core, remove it from the ready queue,
    /// mark it Blocked with the given reason, append to the blocked
    /// queue. Idempotent with respect to queue membership.
    pub(crate) fn block_thread(&mut self, tid: ThreadId, reason: crate::types::BlockReason) {
        for i in 0..self.state.cores.len() {
            if self.state.cores[i] == Some(tid) {
                self.state.cores[i] = None;
                self.state.quantum_counters[i] = 0;
            }
        }
        self.state.ready_queue.retain(|&t| t != tid);
        if let Some(t) = self.state.threads.get_mut(&tid) {
            t.state = ThreadState::Blocked;
            t.block_reason = Some(reason);
        }
        if !self.state.blocked_queue.contains(&tid) {
            self.state.blocked_queue.push(tid);
        }
    }

    /// Move a blocked thread back to the ready queue.
    pub(crate) fn unblock_to_ready(&mut self, tid: ThreadId) {
        self.state.blocked_queue.retain(|&t| t != tid);
        if let Some(t) = self.state.threads.get_mut(&tid) {
            t.state = ThreadState::Ready;
            t.block_reason = None;
        }
        if !self.state.ready_queue.contains(&tid) {
            self.state.ready_queue.push_back(tid);
        }
    }
}

impl Default for Simulation {
    fn default() -> Self {
        Self::new(Config::default())
    }
}
