//! Resource (semaphore/mutex) and monitor semantics, both through
//! direct commands and through scripted tick-engine runs.

use schedsim::*;

mod common;
use common::{run_ticks, run_until_paused, sim_with};

fn four_threads() -> Simulation {
    let mut sim = Simulation::default();
    sim.apply(Command::CreateProcess(ProcessSpec {
        threads: 4,
        burst: 10,
        ..Default::default()
    }));
    sim
}

fn assert_conserved(state: &SimState, name: &str) {
    let res = &state.resources[name];
    assert!(
        res.is_conserved(),
        "{name}: available {} + holders {} != max {}",
        res.available,
        res.holders.len(),
        res.max
    );
}

// ---------------------------------------------------------------------------
// Resources
// ---------------------------------------------------------------------------

/// A mutex admits one holder and releases wake waiters in FIFO order.
#[test]
fn test_mutex_fifo_wake_order() {
    let mut sim = four_threads();
    for id in 1..=4 {
        sim.resource_op(ThreadId(id), "Database", ResourceOp::Request);
        assert_conserved(sim.state(), "Database");
    }
    {
        let state = sim.state();
        assert_eq!(state.resources["Database"].holders, vec![ThreadId(1)]);
        assert_eq!(
            state.resources["Database"].wait_queue,
            vec![ThreadId(2), ThreadId(3), ThreadId(4)]
        );
        for id in 2..=4 {
            let t = state.thread(ThreadId(id)).unwrap();
            assert_eq!(t.state, ThreadState::Blocked);
            assert_eq!(t.block_reason, Some(BlockReason::System));
        }
    }

    sim.resource_op(ThreadId(1), "Database", ResourceOp::Release);
    assert_eq!(sim.state().resources["Database"].holders, vec![ThreadId(2)]);
    assert_eq!(
        sim.state().thread(ThreadId(2)).unwrap().state,
        ThreadState::Ready
    );
    assert_conserved(sim.state(), "Database");

    sim.resource_op(ThreadId(2), "Database", ResourceOp::Release);
    assert_eq!(sim.state().resources["Database"].holders, vec![ThreadId(3)]);
    assert_conserved(sim.state(), "Database");
}

/// A two-unit semaphore admits two holders before blocking.
#[test]
fn test_semaphore_capacity() {
    let mut sim = four_threads();
    sim.resource_op(ThreadId(1), "Disk I/O", ResourceOp::Request);
    sim.resource_op(ThreadId(2), "Disk I/O", ResourceOp::Request);
    sim.resource_op(ThreadId(3), "Disk I/O", ResourceOp::Request);

    let state = sim.state();
    assert_eq!(
        state.resources["Disk I/O"].holders,
        vec![ThreadId(1), ThreadId(2)]
    );
    assert_eq!(state.resources["Disk I/O"].wait_queue, vec![ThreadId(3)]);
    assert_conserved(state, "Disk I/O");

    sim.resource_op(ThreadId(1), "Disk I/O", ResourceOp::Release);
    assert_eq!(
        sim.state().resources["Disk I/O"].holders,
        vec![ThreadId(2), ThreadId(3)]
    );
    assert_conserved(sim.state(), "Disk I/O");
}

/// A request for a resource the thread already holds is ignored: a
/// holder never lands in its own wait queue or in holders twice.
#[test]
fn test_request_while_holding_is_noop() {
    let mut sim = four_threads();
    sim.resource_op(ThreadId(1), "Database", ResourceOp::Request);
    let before = serde_json::to_string(sim.state()).unwrap();

    sim.resource_op(ThreadId(1), "Database", ResourceOp::Request);
    assert_eq!(serde_json::to_string(sim.state()).unwrap(), before);
    let res = &sim.state().resources["Database"];
    assert_eq!(res.holders, vec![ThreadId(1)]);
    assert!(res.wait_queue.is_empty());

    // Semaphores too: a holder cannot take a second unit.
    sim.resource_op(ThreadId(2), "Disk I/O", ResourceOp::Request);
    sim.resource_op(ThreadId(2), "Disk I/O", ResourceOp::Request);
    assert_eq!(sim.state().resources["Disk I/O"].holders, vec![ThreadId(2)]);
    assert_conserved(sim.state(), "Disk I/O");
}

/// Releasing a resource the thread does not hold changes nothing.
#[test]
fn test_release_without_hold_is_noop() {
    let mut sim = four_threads();
    sim.resource_op(ThreadId(1), "Database", ResourceOp::Request);
    let before = serde_json::to_string(sim.state()).unwrap();

    sim.resource_op(ThreadId(2), "Database", ResourceOp::Release);
    assert_eq!(serde_json::to_string(sim.state()).unwrap(), before);
}

/// Operations on unknown threads or resources are silent no-ops.
#[test]
fn test_unknown_entities_are_noops() {
    let mut sim = four_threads();
    let before = serde_json::to_string(sim.state()).unwrap();

    sim.resource_op(ThreadId(99), "Database", ResourceOp::Request);
    sim.resource_op(ThreadId(1), "NoSuchResource", ResourceOp::Request);
    sim.monitor_op(ThreadId(99), "Buffer", MonitorOp::Enter);
    sim.monitor_op(ThreadId(1), "NoSuchMonitor", MonitorOp::Enter);
    assert_eq!(serde_json::to_string(sim.state()).unwrap(), before);
}

/// The hold-limit sweep force-releases an overheld resource and hands
/// it to the FIFO head, regardless of what the holder is doing.
#[test]
fn test_hold_limit_force_release() {
    let mut sim = sim_with(ConfigPatch {
        cpu_count: Some(2),
        resource_hold_limit: Some(4),
        ..Default::default()
    });
    let script = vec![Instruction {
        at: 1,
        op: SyncOp::Resource {
            name: "Database".to_string(),
            op: ResourceOp::Request,
        },
    }];
    for _ in 0..2 {
        sim.apply(Command::CreateProcess(ProcessSpec {
            burst: 30,
            instructions: script.clone(),
            ..Default::default()
        }));
    }
    // T1 acquires at tick 2, T2 blocks; the hold expires at tick 6.
    run_ticks(&mut sim, 6);

    let state = sim.state();
    assert!(state.log.contains("Database force-released from T1 (hold limit)"));
    assert!(state.log.contains("T2 woken on Database"));
    assert_eq!(state.resources["Database"].holders, vec![ThreadId(2)]);
    assert!(!state.thread(ThreadId(1)).unwrap().holds_resource("Database"));
    // The victim keeps running; only the resource is taken away.
    assert_eq!(state.thread(ThreadId(1)).unwrap().state, ThreadState::Running);
    assert_conserved(state, "Database");
}

/// Two threads acquiring two mutexes in opposite order deadlock: both
/// end Blocked, cores idle, and the state reaches a fixpoint while the
/// clock keeps running.
#[test]
fn test_deadlock_reaches_stable_fixpoint() {
    let mut sim = Simulation::default();
    Preset::Deadlock.load(&mut sim);
    run_ticks(&mut sim, 10);

    let snapshot = |state: &SimState| {
        (
            state.threads.clone(),
            state.resources.clone(),
            state.blocked_queue.clone(),
        )
    };
    let at_10 = snapshot(sim.state());
    run_ticks(&mut sim, 20);
    let at_30 = snapshot(sim.state());

    assert_eq!(at_10, at_30, "deadlocked state must not change");
    let state = sim.state();
    assert!(state.running, "deadlock must not auto-pause");
    assert_eq!(state.blocked_queue.len(), 2);
    assert!(state.cores.iter().all(|c| c.is_none()));
    assert_eq!(state.resources["Database"].holders, vec![ThreadId(1)]);
    assert_eq!(state.resources["Database"].wait_queue, vec![ThreadId(2)]);
    assert_eq!(state.resources["Printer"].holders, vec![ThreadId(2)]);
    assert_eq!(state.resources["Printer"].wait_queue, vec![ThreadId(1)]);
}

/// A terminating thread's held resources go back to their wait queues'
/// FIFO heads.
#[test]
fn test_termination_releases_resources() {
    let mut sim = sim_with(ConfigPatch {
        cpu_count: Some(2),
        ..Default::default()
    });
    sim.apply(Command::CreateProcess(ProcessSpec {
        burst: 3,
        instructions: vec![Instruction {
            at: 0,
            op: SyncOp::Resource {
                name: "Database".to_string(),
                op: ResourceOp::Request,
            },
        }],
        ..Default::default()
    }));
    sim.apply(Command::CreateProcess(ProcessSpec {
        burst: 10,
        instructions: vec![Instruction {
            at: 1,
            op: SyncOp::Resource {
                name: "Database".to_string(),
                op: ResourceOp::Request,
            },
        }],
        ..Default::default()
    }));
    // T1 terminates at tick 4 holding Database; T2 blocked since tick 3.
    run_ticks(&mut sim, 4);

    let state = sim.state();
    assert_eq!(state.thread(ThreadId(1)).unwrap().state, ThreadState::Terminated);
    assert_eq!(state.resources["Database"].holders, vec![ThreadId(2)]);
    assert_conserved(state, "Database");
}

// ---------------------------------------------------------------------------
// Monitors
// ---------------------------------------------------------------------------

/// Mesa semantics: signal moves the waiter to the entry queue but does
/// not wake it; only the lock handover on exit makes it runnable.
#[test]
fn test_mesa_signal_defers_wakeup() {
    let mut sim = four_threads();
    sim.monitor_op(ThreadId(1), "Buffer", MonitorOp::Enter);
    sim.monitor_op(ThreadId(2), "Buffer", MonitorOp::Enter);
    // T1 waits: lock passes to T2 from the entry queue.
    sim.monitor_op(
        ThreadId(1),
        "Buffer",
        MonitorOp::Wait {
            cv: "NotEmpty".to_string(),
        },
    );
    assert_eq!(sim.state().monitors["Buffer"].locked_by, Some(ThreadId(2)));

    sim.monitor_op(
        ThreadId(2),
        "Buffer",
        MonitorOp::Signal {
            cv: "NotEmpty".to_string(),
        },
    );
    {
        let state = sim.state();
        let monitor = &state.monitors["Buffer"];
        assert!(monitor.cvs["NotEmpty"].is_empty());
        assert_eq!(monitor.entry_queue, vec![ThreadId(1)]);
        // Signaled but not awake: still blocked at user level.
        let t1 = state.thread(ThreadId(1)).unwrap();
        assert_eq!(t1.state, ThreadState::Blocked);
        assert_eq!(t1.block_reason, Some(BlockReason::User));
    }

    sim.monitor_op(ThreadId(2), "Buffer", MonitorOp::Exit);
    let state = sim.state();
    assert_eq!(state.monitors["Buffer"].locked_by, Some(ThreadId(1)));
    assert_eq!(state.thread(ThreadId(1)).unwrap().state, ThreadState::Ready);
}

/// Holder-only operations issued by non-holders are silent no-ops.
#[test]
fn test_monitor_holder_only_ops() {
    let mut sim = four_threads();
    sim.monitor_op(ThreadId(1), "Buffer", MonitorOp::Enter);
    let before = serde_json::to_string(sim.state()).unwrap();

    sim.monitor_op(ThreadId(2), "Buffer", MonitorOp::Exit);
    sim.monitor_op(ThreadId(2), "Buffer", MonitorOp::ModifyData { delta: 5 });
    sim.monitor_op(
        ThreadId(2),
        "Buffer",
        MonitorOp::Signal {
            cv: "NotEmpty".to_string(),
        },
    );
    assert_eq!(serde_json::to_string(sim.state()).unwrap(), before);
    // Re-entry by the holder is also a no-op.
    sim.monitor_op(ThreadId(1), "Buffer", MonitorOp::Enter);
    assert_eq!(serde_json::to_string(sim.state()).unwrap(), before);
}

/// Broadcast flushes every cv waiter to the entry queue; the lock is
/// still handed over one thread at a time.
#[test]
fn test_broadcast_moves_all_waiters() {
    let mut sim = four_threads();
    for id in [1, 2] {
        sim.monitor_op(ThreadId(id), "Buffer", MonitorOp::Enter);
        sim.monitor_op(
            ThreadId(id),
            "Buffer",
            MonitorOp::Wait {
                cv: "NotFull".to_string(),
            },
        );
    }
    sim.monitor_op(ThreadId(3), "Buffer", MonitorOp::Enter);
    sim.monitor_op(
        ThreadId(3),
        "Buffer",
        MonitorOp::Broadcast {
            cv: "NotFull".to_string(),
        },
    );
    assert_eq!(
        sim.state().monitors["Buffer"].entry_queue,
        vec![ThreadId(1), ThreadId(2)]
    );

    sim.monitor_op(ThreadId(3), "Buffer", MonitorOp::Exit);
    let state = sim.state();
    assert_eq!(state.monitors["Buffer"].locked_by, Some(ThreadId(1)));
    assert_eq!(state.monitors["Buffer"].entry_queue, vec![ThreadId(2)]);
    assert_eq!(state.thread(ThreadId(2)).unwrap().state, ThreadState::Blocked);
}

/// CheckAndWait only waits while the shared data is zero.
#[test]
fn test_check_and_wait_predicate() {
    let mut sim = four_threads();
    sim.monitor_op(ThreadId(1), "Buffer", MonitorOp::Enter);
    sim.monitor_op(
        ThreadId(1),
        "Buffer",
        MonitorOp::CheckAndWait {
            cv: "NotEmpty".to_string(),
        },
    );
    // Data was zero: T1 is now waiting and the lock is free.
    {
        let state = sim.state();
        assert_eq!(state.monitors["Buffer"].cvs["NotEmpty"], vec![ThreadId(1)]);
        assert_eq!(state.monitors["Buffer"].locked_by, None);
    }

    sim.monitor_op(ThreadId(2), "Buffer", MonitorOp::Enter);
    sim.monitor_op(ThreadId(2), "Buffer", MonitorOp::ModifyData { delta: 1 });
    sim.monitor_op(
        ThreadId(2),
        "Buffer",
        MonitorOp::CheckAndWait {
            cv: "NotEmpty".to_string(),
        },
    );
    // Data is nonzero: T2 proceeds without waiting.
    let state = sim.state();
    assert_eq!(state.monitors["Buffer"].locked_by, Some(ThreadId(2)));
    assert!(state.monitors["Buffer"].cvs["NotEmpty"].contains(&ThreadId(1)));
}

/// A thread terminating while holding the monitor frees the lock and
/// flushes cv waiters to the entry queue so none of them waits forever.
#[test]
fn test_termination_flushes_cv_waiters() {
    let mut sim = sim_with(ConfigPatch {
        cpu_count: Some(2),
        ..Default::default()
    });
    let monitor_instr = |at, op| Instruction {
        at,
        op: SyncOp::Monitor {
            name: "Buffer".to_string(),
            op,
        },
    };
    // T1 enters and waits on a cv nobody will ever signal.
    sim.apply(Command::CreateProcess(ProcessSpec {
        burst: 30,
        instructions: vec![
            monitor_instr(0, MonitorOp::Enter),
            monitor_instr(
                1,
                MonitorOp::Wait {
                    cv: "NotEmpty".to_string(),
                },
            ),
        ],
        ..Default::default()
    }));
    // T2 takes the lock after T1's wait and dies holding it.
    sim.apply(Command::CreateProcess(ProcessSpec {
        burst: 3,
        instructions: vec![monitor_instr(1, MonitorOp::Enter)],
        ..Default::default()
    }));
    run_ticks(&mut sim, 6);

    let state = sim.state();
    assert_eq!(state.thread(ThreadId(2)).unwrap().state, ThreadState::Terminated);
    // T1 was flushed off the cv, granted the orphaned lock, and
    // dispatched in the same tick.
    assert!(state.monitors["Buffer"].cvs["NotEmpty"].is_empty());
    assert_eq!(state.monitors["Buffer"].locked_by, Some(ThreadId(1)));
    assert_eq!(state.thread(ThreadId(1)).unwrap().state, ThreadState::Running);
}

// ---------------------------------------------------------------------------
// Scripted producer/consumer
// ---------------------------------------------------------------------------

/// A consumer that reaches its CheckAndWait before the producer's item
/// exists goes to sleep, is signaled awake, re-checks the predicate
/// (Mesa), and consumes the item.
#[test]
fn test_scripted_consumer_waits_and_rechecks() {
    let mut sim = sim_with(ConfigPatch {
        cpu_count: Some(2),
        ..Default::default()
    });
    let monitor_instr = |at, op| Instruction {
        at,
        op: SyncOp::Monitor {
            name: "Buffer".to_string(),
            op,
        },
    };
    // Consumer gets in first and finds the buffer empty.
    sim.apply(Command::CreateProcess(ProcessSpec {
        burst: 30,
        instructions: vec![
            monitor_instr(1, MonitorOp::Enter),
            monitor_instr(
                2,
                MonitorOp::CheckAndWait {
                    cv: "NotEmpty".to_string(),
                },
            ),
            monitor_instr(3, MonitorOp::ModifyData { delta: -1 }),
            monitor_instr(4, MonitorOp::Exit),
        ],
        ..Default::default()
    }));
    sim.apply(Command::CreateProcess(ProcessSpec {
        burst: 30,
        instructions: vec![
            monitor_instr(3, MonitorOp::Enter),
            monitor_instr(4, MonitorOp::ModifyData { delta: 1 }),
            monitor_instr(
                5,
                MonitorOp::Signal {
                    cv: "NotEmpty".to_string(),
                },
            ),
            monitor_instr(6, MonitorOp::Exit),
        ],
        ..Default::default()
    }));

    // By tick 5 the consumer is signaled but still holds its retained
    // CheckAndWait for the re-check.
    run_ticks(&mut sim, 5);
    {
        let state = sim.state();
        let t1 = state.thread(ThreadId(1)).unwrap();
        assert_eq!(t1.state, ThreadState::Blocked);
        assert!(matches!(
            t1.instructions.front().map(|i| &i.op),
            Some(SyncOp::Monitor { op: MonitorOp::CheckAndWait { .. }, .. })
        ));
    }

    run_until_paused(&mut sim, 80);
    let state = sim.state();
    assert_eq!(state.monitors["Buffer"].data, 0, "item must be consumed");
    assert_eq!(state.terminated.len(), 2);
    assert!(state.log.contains("T1 wait on Buffer.NotEmpty"));
    assert!(state.log.contains("signaled Buffer.NotEmpty"));
}

/// The built-in producer/consumer preset runs to completion with an
/// empty buffer.
#[test]
fn test_producer_consumer_preset_completes() {
    let mut sim = Simulation::default();
    Preset::ProducerConsumer.load(&mut sim);
    run_until_paused(&mut sim, 80);

    let state = sim.state();
    assert_eq!(state.terminated.len(), 2);
    assert_eq!(state.monitors["Buffer"].data, 0);
    assert_eq!(state.monitors["Buffer"].locked_by, None);
    assert!(state.monitors["Buffer"].entry_queue.is_empty());
}
