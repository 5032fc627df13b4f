//! Compute executor threads

use crate::arch::SuspendedContext;
use crate::invariant::invariant_violated;
use crate::io::IoRequest;
use crate::scheduler::Shared;
use crate::task::{TaskId, TaskState, Transition};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Per-worker execution context. Lives on the worker thread's own stack for
/// the whole run loop; a running task holds a pointer to it so it knows
/// where to switch back to.
pub(crate) struct WorkerSlot {
    pub id: usize,
    /// The executor loop's saved context while a task is running
    pub home: SuspendedContext,
}

/// Which worker is running which task.
///
/// A descriptor lives in exactly one place at a time, so entering a task
/// that is already registered means two workers hold the same descriptor.
pub(crate) struct RunRegistry {
    owners: Mutex<FxHashMap<TaskId, usize>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self {
            owners: Mutex::new(FxHashMap::default()),
        }
    }

    pub fn enter(&self, task_id: TaskId, worker: usize) {
        if let Some(other) = self.owners.lock().insert(task_id, worker) {
            invariant_violated!(
                "{} entered on worker {} while running on worker {}",
                task_id,
                worker,
                other
            );
        }
    }

    pub fn leave(&self, task_id: TaskId, worker: usize) {
        match self.owners.lock().remove(&task_id) {
            Some(owner) if owner == worker => {}
            other => invariant_violated!(
                "{} left worker {} but was registered to {:?}",
                task_id,
                worker,
                other
            ),
        }
    }

    pub fn running(&self) -> usize {
        self.owners.lock().len()
    }
}

/// Start compute executor `id`
pub(crate) fn spawn(id: usize, shared: Arc<Shared>) -> io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(format!("strand-compute-{}", id))
        .spawn(move || run_loop(id, &shared))
}

/// Pop ready tasks and run each until its next suspension point
fn run_loop(id: usize, shared: &Shared) {
    log::debug!("compute worker {} started", id);

    let idle = shared.config.idle;
    let backoff = shared.config.idle_backoff();
    let mut slot = WorkerSlot {
        id,
        home: SuspendedContext::empty(),
    };

    loop {
        let Some(task) = shared.ready.next(idle, backoff) else {
            if shared.should_stop() {
                break;
            }
            continue;
        };

        let task_id = task.id();
        shared.running.enter(task_id, id);
        let (mut task, transition) = task.resume(&mut slot);
        shared.running.leave(task_id, id);
        debug_assert_eq!(task.state(), TaskState::Running);

        match transition {
            Transition::Yield => {
                shared.counters.record_yield();
                task.set_state(TaskState::Ready);
                shared.ready.push(task);
            }
            Transition::Io(op) => {
                log::trace!("{} blocked on {:?}", task_id, op.kind());
                shared.counters.record_io();
                task.set_state(TaskState::Blocked);
                shared.io_requests.push(IoRequest { op, task });
            }
            Transition::Exit(kind) => {
                task.set_state(TaskState::Exited);
                log::trace!("{} exited ({:?}) on worker {}", task_id, kind, id);
                // Releases the descriptor and unmaps its stack.
                drop(task);
                shared.retire(kind);
            }
        }
    }

    log::debug!("compute worker {} shutting down", id);
}
