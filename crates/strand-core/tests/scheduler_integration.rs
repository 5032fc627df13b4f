//! Integration tests for task creation, yielding and executor behaviour

use parking_lot::Mutex;
use rand::Rng;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use strand_core::{IdlePolicy, Scheduler, SchedulerConfig, StrandError, TaskId};

fn scheduler(workers: usize) -> Scheduler {
    let config = SchedulerConfig::default()
        .with_compute_workers(workers)
        .with_stack_size(128 * 1024);
    Scheduler::init(config).unwrap()
}

#[test]
fn test_all_tasks_complete_before_shutdown_returns() {
    for workers in [1, 2] {
        let mut scheduler = scheduler(workers);
        let done = Arc::new(AtomicUsize::new(0));

        for _ in 0..100 {
            let done = done.clone();
            scheduler
                .create(move |_| {
                    done.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        scheduler.shutdown().unwrap();
        assert_eq!(done.load(Ordering::SeqCst), 100);

        let stats = scheduler.stats();
        assert_eq!(stats.tasks_created, 100);
        assert_eq!(stats.tasks_completed, 100);
        assert_eq!(stats.live_tasks, 0);
        assert_eq!(stats.ready_queue_len, 0);
    }
}

#[test]
fn test_explicit_exit_counts_as_completion() {
    let mut scheduler = scheduler(1);
    let after_exit = Arc::new(AtomicBool::new(false));

    let flag = after_exit.clone();
    scheduler
        .create(move |cx| {
            cx.yield_now();
            if std::hint::black_box(true) {
                cx.exit();
            }
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    scheduler.shutdown().unwrap();
    assert!(!after_exit.load(Ordering::SeqCst));
    assert_eq!(scheduler.stats().tasks_completed, 1);
    assert_eq!(scheduler.stats().tasks_panicked, 0);
}

struct DropFlag(Arc<AtomicBool>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[test]
fn test_exit_releases_locals_and_guards() {
    let mut scheduler = scheduler(1);
    let dropped = Arc::new(AtomicBool::new(false));
    let shared = Arc::new(Mutex::new(0u32));
    let next_saw = Arc::new(Mutex::new(None));

    let owned = DropFlag(dropped.clone());
    let lock = shared.clone();
    scheduler
        .create(move |cx| {
            let _owned = owned;
            let mut guard = lock.lock();
            *guard += 1;
            cx.exit();
        })
        .unwrap();

    // Runs after the exiting task; it would block its worker forever if the
    // guard above had leaked.
    let lock = shared.clone();
    let saw = next_saw.clone();
    scheduler
        .create(move |_| {
            *saw.lock() = Some(*lock.lock());
        })
        .unwrap();

    scheduler.shutdown().unwrap();
    assert!(dropped.load(Ordering::SeqCst));
    assert!(!shared.is_locked());
    assert_eq!(Arc::strong_count(&shared), 1);
    assert_eq!(*next_saw.lock(), Some(1));

    let stats = scheduler.stats();
    assert_eq!(stats.tasks_completed, 2);
    assert_eq!(stats.tasks_panicked, 0);
}

#[test]
fn test_single_worker_round_robin() {
    let mut scheduler = scheduler(1);
    let trace = Arc::new(Mutex::new(Vec::new()));
    let gate = Arc::new(AtomicBool::new(false));

    // Hold the only worker until every task is queued, so the ready queue
    // order is exactly the creation order.
    let hold = gate.clone();
    scheduler
        .create(move |cx| {
            while !hold.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(1));
            }
            cx.yield_now();
        })
        .unwrap();

    for name in 0..3 {
        let trace = trace.clone();
        scheduler
            .create(move |cx| {
                for round in 0..3 {
                    trace.lock().push((round, name));
                    cx.yield_now();
                }
            })
            .unwrap();
    }
    gate.store(true, Ordering::SeqCst);

    scheduler.shutdown().unwrap();

    let expected: Vec<_> = (0..3)
        .flat_map(|round| (0..3).map(move |name| (round, name)))
        .collect();
    assert_eq!(*trace.lock(), expected);
}

#[test]
fn test_task_never_runs_on_two_workers() {
    let mut scheduler = scheduler(2);
    // task -> worker currently running it, as observed by the task itself
    let running: Arc<Mutex<HashMap<TaskId, usize>>> = Arc::new(Mutex::new(HashMap::new()));
    let overlaps = Arc::new(AtomicUsize::new(0));

    for _ in 0..32 {
        let running = running.clone();
        let overlaps = overlaps.clone();
        scheduler
            .create(move |cx| {
                let yields = rand::thread_rng().gen_range(1..20);
                for _ in 0..yields {
                    let worker = cx.worker_id();
                    if running.lock().insert(cx.id(), worker).is_some() {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }

                    let spin = rand::thread_rng().gen_range(0..200);
                    for i in 0..spin {
                        std::hint::black_box(i);
                    }

                    running.lock().remove(&cx.id());
                    cx.yield_now();
                }
            })
            .unwrap();
    }

    scheduler.shutdown().unwrap();
    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert!(running.lock().is_empty());
    assert_eq!(scheduler.stats().tasks_completed, 32);
}

#[test]
fn test_workers_survive_transiently_empty_queue() {
    let mut scheduler = scheduler(2);
    let done = Arc::new(AtomicBool::new(false));

    // Sleeps on the worker thread, leaving the ready queue empty for far
    // longer than the idle backoff while the task is still alive.
    let flag = done.clone();
    scheduler
        .create(move |cx| {
            std::thread::sleep(Duration::from_millis(50));
            cx.yield_now();
            std::thread::sleep(Duration::from_millis(50));
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    scheduler.shutdown().unwrap();
    assert!(done.load(Ordering::SeqCst));
}

#[test]
fn test_poll_policy_matches_park_policy() {
    for idle in [IdlePolicy::Park, IdlePolicy::Poll] {
        let config = SchedulerConfig::default()
            .with_compute_workers(2)
            .with_idle(idle);
        let mut scheduler = Scheduler::init(config).unwrap();
        let total = Arc::new(AtomicUsize::new(0));

        for _ in 0..10 {
            let total = total.clone();
            scheduler
                .create(move |cx| {
                    for _ in 0..10 {
                        total.fetch_add(1, Ordering::SeqCst);
                        cx.yield_now();
                    }
                })
                .unwrap();
        }

        scheduler.shutdown().unwrap();
        assert_eq!(total.load(Ordering::SeqCst), 100);
        assert_eq!(scheduler.stats().yields, 100);
    }
}

#[test]
fn test_spawn_from_task() {
    let mut scheduler = scheduler(1);
    let children = Arc::new(AtomicUsize::new(0));

    let counter = children.clone();
    scheduler
        .create(move |cx| {
            for _ in 0..4 {
                let counter = counter.clone();
                cx.spawn(move |child| {
                    child.yield_now();
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
            }
        })
        .unwrap();

    scheduler.shutdown().unwrap();
    assert_eq!(children.load(Ordering::SeqCst), 4);
    assert_eq!(scheduler.stats().tasks_created, 5);
}

#[test]
fn test_spawn_during_drain_is_allowed() {
    let mut scheduler = scheduler(1);
    let child_ran = Arc::new(AtomicBool::new(false));

    let flag = child_ran.clone();
    scheduler
        .create(move |cx| {
            // Long enough for shutdown() to have been called.
            std::thread::sleep(Duration::from_millis(50));
            cx.spawn(move |_| flag.store(true, Ordering::SeqCst)).unwrap();
        })
        .unwrap();

    scheduler.shutdown().unwrap();
    assert!(child_ran.load(Ordering::SeqCst));
}

#[test]
fn test_task_limit_from_inside_task() {
    let config = SchedulerConfig::default().with_max_tasks(1);
    let mut scheduler = Scheduler::init(config).unwrap();
    let rejected = Arc::new(AtomicBool::new(false));

    let flag = rejected.clone();
    scheduler
        .create(move |cx| {
            if let Err(StrandError::TaskLimit { limit: 1 }) = cx.spawn(|_| {}) {
                flag.store(true, Ordering::SeqCst);
            }
        })
        .unwrap();

    scheduler.shutdown().unwrap();
    assert!(rejected.load(Ordering::SeqCst));
    assert_eq!(scheduler.stats().tasks_created, 1);
}

#[test]
fn test_panicking_task_is_retired() {
    let config = SchedulerConfig::default().with_stack_size(256 * 1024);
    let mut scheduler = Scheduler::init(config).unwrap();
    let survivor = Arc::new(AtomicBool::new(false));

    scheduler
        .create(|cx| {
            cx.yield_now();
            panic!("task body failed");
        })
        .unwrap();

    let flag = survivor.clone();
    scheduler
        .create(move |cx| {
            cx.yield_now();
            cx.yield_now();
            flag.store(true, Ordering::SeqCst);
        })
        .unwrap();

    scheduler.shutdown().unwrap();
    assert!(survivor.load(Ordering::SeqCst));

    let stats = scheduler.stats();
    assert_eq!(stats.tasks_completed, 2);
    assert_eq!(stats.tasks_panicked, 1);
}

#[test]
fn test_stack_can_hold_large_frames() {
    let config = SchedulerConfig::default().with_stack_size(256 * 1024);
    let mut scheduler = Scheduler::init(config).unwrap();
    let sum = Arc::new(AtomicUsize::new(0));

    let total = sum.clone();
    scheduler
        .create(move |cx| {
            let buf = [1u8; 64 * 1024];
            cx.yield_now();
            let value: usize = std::hint::black_box(&buf).iter().map(|&b| b as usize).sum();
            total.store(value, Ordering::SeqCst);
        })
        .unwrap();

    scheduler.shutdown().unwrap();
    assert_eq!(sum.load(Ordering::SeqCst), 64 * 1024);
}

#[test]
fn test_float_state_survives_migration() {
    let mut scheduler = scheduler(2);
    let results = Arc::new(Mutex::new(Vec::new()));

    for seed in 1..=8 {
        let results = results.clone();
        scheduler
            .create(move |cx| {
                let mut acc = seed as f64;
                for _ in 0..10 {
                    acc = acc * 1.5 + 0.25;
                    cx.yield_now();
                }
                results.lock().push((seed, acc));
            })
            .unwrap();
    }

    scheduler.shutdown().unwrap();

    let results = results.lock();
    assert_eq!(results.len(), 8);
    for &(seed, acc) in results.iter() {
        let mut expected = seed as f64;
        for _ in 0..10 {
            expected = expected * 1.5 + 0.25;
        }
        assert_eq!(acc, expected);
    }
}
