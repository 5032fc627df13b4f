//! Task descriptor and execution state

use crate::arch::{self, SuspendedContext};
use crate::context::TaskContext;
use crate::invariant::invariant_violated;
use crate::io::IoOp;
use crate::scheduler::Shared;
use crate::stack::TaskStack;
use crate::worker::WorkerSlot;
use crate::Result;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Unique identifier for a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(u64);

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

impl TaskId {
    /// Generate a new unique TaskId
    pub fn new() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the numeric ID value
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// State of a Task
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum TaskState {
    /// In the ready queue, waiting for a compute executor
    Ready,
    /// Currently executing on a compute executor
    Running,
    /// Waiting for the I/O executor
    Blocked,
    /// Finished; the descriptor is about to be released
    Exited,
}

/// Task body. Receives the handle through which it yields, exits and
/// performs I/O.
pub type TaskEntry = Box<dyn FnOnce(&TaskContext) + Send + 'static>;

/// How a task ended
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ExitKind {
    /// Returned from its body or called `exit`
    Finished,
    /// Its body panicked
    Panicked,
}

/// Unwind payload used by `TaskContext::exit` to leave the body early.
/// Caught in `task_main`, so every frame above it is dropped normally.
pub(crate) struct ExitSignal;

/// Why a task handed control back to its worker
pub(crate) enum Transition {
    Yield,
    Io(IoOp),
    Exit(ExitKind),
}

/// A cooperatively scheduled green thread.
///
/// Always heap allocated and moved around as `Box<Task>`, so the address the
/// task's own stack refers to stays fixed for its whole life. At any moment
/// the box is owned by exactly one of: the ready queue, the I/O request
/// queue, or the compute executor currently running it.
pub(crate) struct Task {
    id: TaskId,
    state: TaskState,
    /// Where the task resumes; re-saved at every suspension point
    context: SuspendedContext,
    /// Body, taken on first resume
    entry: Option<TaskEntry>,
    /// Set by the task immediately before it switches out
    transition: Option<Transition>,
    /// Worker running this task; null unless `state == Running`
    worker: *mut WorkerSlot,
    shared: Arc<Shared>,
    stack: TaskStack,
}

// SAFETY: the raw worker pointer is only dereferenced from the task's own
// stack while that worker is running it; ownership of the box moves between
// threads only through the scheduler queues.
unsafe impl Send for Task {}

impl Task {
    /// Allocate a descriptor and stack whose first resume calls `entry`
    pub fn new(entry: TaskEntry, shared: Arc<Shared>) -> Result<Box<Self>> {
        let stack = TaskStack::new(shared.config.stack_size)?;
        let mut task = Box::new(Self {
            id: TaskId::new(),
            state: TaskState::Ready,
            context: SuspendedContext::empty(),
            entry: Some(entry),
            transition: None,
            worker: ptr::null_mut(),
            shared,
            stack,
        });

        let raw: *mut Task = &mut *task;
        // SAFETY: the stack is owned by the descriptor and lives exactly as
        // long as `raw` does; task_main receives that same pointer.
        task.context =
            unsafe { SuspendedContext::prepare(task.stack.top(), task_main, raw.cast()) };
        Ok(task)
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn set_state(&mut self, state: TaskState) {
        self.state = state;
    }

    pub fn shared(&self) -> &Arc<Shared> {
        &self.shared
    }

    /// Id of the worker currently running this task
    pub fn worker_id(&self) -> usize {
        if self.worker.is_null() {
            invariant_violated!("{} queried its worker while not running", self.id);
        }
        // SAFETY: non-null only while the worker is parked inside `resume`.
        unsafe { (*self.worker).id }
    }

    /// Run the task on the calling worker until its next suspension point.
    ///
    /// Returns the descriptor together with the reason it stopped.
    pub fn resume(self: Box<Self>, slot: &mut WorkerSlot) -> (Box<Self>, Transition) {
        if self.state == TaskState::Running || self.context.is_empty() {
            invariant_violated!("{} resumed while already running", self.id);
        }

        let raw = Box::into_raw(self);
        // SAFETY: `raw` came from Box::into_raw above and is turned back into
        // a box only after the task has switched out again. While the task
        // runs, it is the only code touching the descriptor.
        unsafe {
            (*raw).state = TaskState::Running;
            (*raw).worker = slot;
            let to = ptr::addr_of!((*raw).context);
            arch::switch(ptr::addr_of_mut!(slot.home), to);

            let mut task = Box::from_raw(raw);
            task.worker = ptr::null_mut();
            let Some(transition) = task.transition.take() else {
                invariant_violated!("{} switched out without a transition", task.id);
            };
            (task, transition)
        }
    }

    /// Record why the task is stopping and switch back to its worker.
    ///
    /// Returns when some worker resumes the task again.
    ///
    /// # Safety
    /// Must be called from the task's own stack while it is running.
    #[inline(never)]
    pub unsafe fn suspend(task: NonNull<Task>, transition: Transition) {
        let task = task.as_ptr();
        (*task).transition = Some(transition);
        let home = ptr::addr_of!((*(*task).worker).home);
        arch::switch(ptr::addr_of_mut!((*task).context), home);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("stack", &self.stack)
            .finish()
    }
}

/// First frame on every task stack
unsafe extern "C" fn task_main(arg: *mut ()) -> ! {
    let Some(task) = NonNull::new(arg.cast::<Task>()) else {
        invariant_violated!("task started without a descriptor");
    };

    let kind = match (*task.as_ptr()).entry.take() {
        Some(entry) => {
            let cx = TaskContext::new(task);
            match panic::catch_unwind(AssertUnwindSafe(|| entry(&cx))) {
                Ok(()) => ExitKind::Finished,
                Err(payload) if payload.is::<ExitSignal>() => ExitKind::Finished,
                Err(payload) => {
                    log::error!(
                        "{} panicked: {}",
                        (*task.as_ptr()).id,
                        panic_message(payload.as_ref())
                    );
                    ExitKind::Panicked
                }
            }
        }
        None => invariant_violated!("{} started twice", (*task.as_ptr()).id),
    };

    Task::suspend(task, Transition::Exit(kind));
    invariant_violated!("{} resumed after exit", (*task.as_ptr()).id)
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "<non-string panic payload>"
    }
}
