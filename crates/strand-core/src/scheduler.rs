//! Scheduler lifecycle and shared state

use crate::config::SchedulerConfig;
use crate::io::{CompletionTable, IoRequest};
use crate::queue::WorkQueue;
use crate::task::{ExitKind, Task, TaskEntry, TaskId};
use crate::worker::RunRegistry;
use crate::{io_worker, worker, Result, StrandError, TaskContext};
use crossbeam::utils::CachePadded;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// Scheduler statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchedulerStats {
    /// Total tasks created
    pub tasks_created: u64,

    /// Total tasks that exited (including panicked ones)
    pub tasks_completed: u64,

    /// Tasks whose body panicked
    pub tasks_panicked: u64,

    /// Tasks created but not yet exited
    pub live_tasks: usize,

    /// Tasks executing on a compute executor right now
    pub running_tasks: usize,

    /// Total `yield_now` calls
    pub yields: u64,

    /// Total I/O requests handed to the I/O executor
    pub io_requests: u64,

    /// Tasks waiting in the ready queue right now
    pub ready_queue_len: usize,

    /// Requests waiting for the I/O executor right now
    pub io_queue_len: usize,
}

#[derive(Default)]
pub(crate) struct Counters {
    created: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    yields: AtomicU64,
    io_requests: AtomicU64,
}

impl Counters {
    pub fn record_yield(&self) {
        self.yields.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_io(&self) {
        self.io_requests.fetch_add(1, Ordering::Relaxed);
    }
}

/// State shared by the facade, every executor and every task
pub(crate) struct Shared {
    pub config: SchedulerConfig,
    pub ready: WorkQueue<Box<Task>>,
    pub io_requests: WorkQueue<IoRequest>,
    pub completions: CompletionTable,
    pub running: RunRegistry,
    pub counters: Counters,
    /// Created but not yet exited. Incremented before a task is enqueued and
    /// decremented only after its descriptor is released.
    live: CachePadded<AtomicUsize>,
    shutdown: AtomicBool,
    idle_lock: Mutex<()>,
    idle_cv: Condvar,
}

impl Shared {
    fn new(config: SchedulerConfig) -> Self {
        Self {
            config,
            ready: WorkQueue::new(),
            io_requests: WorkQueue::new(),
            completions: CompletionTable::new(),
            running: RunRegistry::new(),
            counters: Counters::default(),
            live: CachePadded::new(AtomicUsize::new(0)),
            shutdown: AtomicBool::new(false),
            idle_lock: Mutex::new(()),
            idle_cv: Condvar::new(),
        }
    }

    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    /// True only when there is provably no work left anywhere: shutdown was
    /// requested, both queues were recently seen empty and no task is alive.
    /// A task that is between two queues is still counted as live.
    pub fn should_stop(&self) -> bool {
        self.is_shutting_down()
            && self.ready.recently_empty()
            && self.io_requests.recently_empty()
            && self.live() == 0
    }

    /// Reserve a live slot, then allocate and enqueue the task.
    ///
    /// Called by `Scheduler::create` before shutdown and by running tasks at
    /// any time. In the latter case the creator keeps the live count above
    /// zero, so no worker can stop before the new task is counted.
    pub fn create_task(self: &Arc<Self>, entry: TaskEntry) -> Result<TaskId> {
        self.reserve_slot()?;
        self.enqueue_new(entry)
    }

    fn reserve_slot(&self) -> Result<()> {
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(limit) = self.config.max_tasks {
            if live > limit {
                self.release_slot();
                return Err(StrandError::TaskLimit { limit });
            }
        }
        Ok(())
    }

    fn release_slot(&self) {
        if self.live.fetch_sub(1, Ordering::SeqCst) == 1 {
            let _guard = self.idle_lock.lock();
            self.idle_cv.notify_all();
        }
    }

    fn enqueue_new(self: &Arc<Self>, entry: TaskEntry) -> Result<TaskId> {
        let task = match Task::new(entry, self.clone()) {
            Ok(task) => task,
            Err(err) => {
                self.release_slot();
                return Err(err);
            }
        };

        let task_id = task.id();
        self.counters.created.fetch_add(1, Ordering::Relaxed);
        log::trace!("{} created", task_id);
        self.ready.push(task);
        Ok(task_id)
    }

    /// Account for a task whose descriptor has just been released
    pub fn retire(&self, kind: ExitKind) {
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        if kind == ExitKind::Panicked {
            self.counters.panicked.fetch_add(1, Ordering::Relaxed);
        }
        self.release_slot();
    }

    fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        self.ready.wake_all();
        self.io_requests.wake_all();
    }

    fn stats(&self) -> SchedulerStats {
        SchedulerStats {
            tasks_created: self.counters.created.load(Ordering::Relaxed),
            tasks_completed: self.counters.completed.load(Ordering::Relaxed),
            tasks_panicked: self.counters.panicked.load(Ordering::Relaxed),
            live_tasks: self.live(),
            running_tasks: self.running.running(),
            yields: self.counters.yields.load(Ordering::Relaxed),
            io_requests: self.counters.io_requests.load(Ordering::Relaxed),
            ready_queue_len: self.ready.len(),
            io_queue_len: self.io_requests.len(),
        }
    }

    fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut guard = self.idle_lock.lock();
        while self.live() > 0 {
            if self.idle_cv.wait_until(&mut guard, deadline).timed_out() {
                return self.live() == 0;
            }
        }
        true
    }
}

/// Green-thread scheduler: owns the compute executors, the I/O executor and
/// every queue between them.
pub struct Scheduler {
    shared: Arc<Shared>,

    /// Compute executor threads
    compute: Vec<JoinHandle<()>>,

    /// I/O executor thread
    io: Option<JoinHandle<()>>,

    /// Whether `shutdown` has completed
    stopped: bool,
}

impl Scheduler {
    /// Validate `config`, allocate the queues and start every worker thread
    pub fn init(config: SchedulerConfig) -> Result<Self> {
        config.validate()?;

        let shared = Arc::new(Shared::new(config));
        let mut scheduler = Self {
            shared: shared.clone(),
            compute: Vec::with_capacity(shared.config.compute_workers),
            io: None,
            stopped: false,
        };

        for id in 0..shared.config.compute_workers {
            match worker::spawn(id, shared.clone()) {
                Ok(handle) => scheduler.compute.push(handle),
                Err(err) => return Err(scheduler.abort_start(err)),
            }
        }
        match io_worker::spawn(shared.clone()) {
            Ok(handle) => scheduler.io = Some(handle),
            Err(err) => return Err(scheduler.abort_start(err)),
        }

        log::debug!(
            "scheduler started with {} compute worker(s)",
            shared.config.compute_workers
        );
        Ok(scheduler)
    }

    /// Stop the workers that did start; no task exists yet, so they exit
    /// promptly.
    fn abort_start(&mut self, err: std::io::Error) -> StrandError {
        if let Err(join_err) = self.shutdown() {
            log::error!("failed to stop partially started scheduler: {}", join_err);
        }
        StrandError::ThreadSpawn(err)
    }

    /// Schedule a new task running `entry`
    pub fn create<F>(&self, entry: F) -> Result<TaskId>
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        if self.stopped {
            return Err(StrandError::ShutDown);
        }
        self.shared.create_task(Box::new(entry))
    }

    /// Drain and stop.
    ///
    /// Sets the shutdown flag, then joins every compute executor and finally
    /// the I/O executor. Workers only exit once no task is alive, so every
    /// task already created, including its pending I/O, runs to completion
    /// before this returns.
    pub fn shutdown(&mut self) -> Result<()> {
        if self.stopped {
            return Err(StrandError::ShutDown);
        }
        self.stopped = true;
        self.shared.request_shutdown();

        let mut first_error = None;
        let handles = self.compute.drain(..).chain(self.io.take());
        for handle in handles {
            let name = handle.thread().name().unwrap_or("strand-worker").to_string();
            if handle.join().is_err() {
                log::error!("worker {} panicked", name);
                first_error.get_or_insert(StrandError::WorkerPanicked { worker: name });
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                log::debug!("scheduler shut down");
                Ok(())
            }
        }
    }

    /// Block until no task is alive or `timeout` elapses. Returns whether
    /// the scheduler went idle.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        self.shared.wait_idle(timeout)
    }

    /// Get scheduler statistics
    pub fn stats(&self) -> SchedulerStats {
        self.shared.stats()
    }

    /// Tasks created but not yet exited
    pub fn live_tasks(&self) -> usize {
        self.shared.live()
    }

    /// Number of compute executors
    pub fn compute_workers(&self) -> usize {
        self.shared.config.compute_workers
    }

    /// Active configuration
    pub fn config(&self) -> &SchedulerConfig {
        &self.shared.config
    }

    /// Whether `shutdown` has been called
    pub fn is_shut_down(&self) -> bool {
        self.stopped
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        if !self.stopped {
            if let Err(err) = self.shutdown() {
                log::error!("scheduler shutdown during drop failed: {}", err);
            }
        }
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("compute_workers", &self.compute_workers())
            .field("live_tasks", &self.live_tasks())
            .field("stopped", &self.stopped)
            .finish()
    }
}
