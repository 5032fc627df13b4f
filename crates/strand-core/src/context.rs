//! Task-facing handle
//!
//! Every task body receives a `&TaskContext`. All operations that may
//! suspend the caller hang off it, so they cannot be reached from outside a
//! running task.

use crate::invariant::invariant_violated;
use crate::io::{IoKind, IoOp, IoOutput, OpenOptions, RawFd};
use crate::task::{ExitSignal, Task, TaskId, Transition};
use crate::Result;
use std::io::{self, SeekFrom};
use std::marker::PhantomData;
use std::panic;
use std::path::Path;
use std::ptr::NonNull;

/// Handle to the currently running task.
///
/// Not `Send`: it is only meaningful on the task's own stack.
pub struct TaskContext {
    task: NonNull<Task>,
    _not_send: PhantomData<*mut ()>,
}

impl TaskContext {
    pub(crate) fn new(task: NonNull<Task>) -> Self {
        Self {
            task,
            _not_send: PhantomData,
        }
    }

    fn task(&self) -> &Task {
        // SAFETY: a context only exists on its task's stack, and the
        // descriptor outlives every frame on that stack.
        unsafe { self.task.as_ref() }
    }

    /// Id of this task
    pub fn id(&self) -> TaskId {
        self.task().id()
    }

    /// Index of the compute executor currently running this task. May
    /// change across suspension points when more than one executor runs.
    pub fn worker_id(&self) -> usize {
        self.task().worker_id()
    }

    /// Give up the rest of this time slice. The task goes to the back of
    /// the ready queue.
    pub fn yield_now(&self) {
        // SAFETY: called from the task's own stack while it is running.
        unsafe { Task::suspend(self.task, Transition::Yield) }
    }

    /// Terminate this task immediately.
    ///
    /// The body's frames are unwound, so locals are dropped and guards
    /// released as if it had returned. The panic hook is not invoked. A body
    /// that wraps this call in its own `catch_unwind` intercepts the exit.
    pub fn exit(&self) -> ! {
        log::trace!("{} exiting early", self.id());
        panic::resume_unwind(Box::new(ExitSignal))
    }

    /// Create a new task. Allowed while the scheduler drains, since the
    /// caller is still alive.
    pub fn spawn<F>(&self, entry: F) -> Result<TaskId>
    where
        F: FnOnce(&TaskContext) + Send + 'static,
    {
        self.task().shared().create_task(Box::new(entry))
    }

    /// Open `path` read/write in append mode, creating it with mode 0o777
    pub fn open(&self, path: impl AsRef<Path>) -> io::Result<RawFd> {
        self.open_with(path, &OpenOptions::default())
    }

    /// Open `path` with explicit options
    pub fn open_with(&self, path: impl AsRef<Path>, options: &OpenOptions) -> io::Result<RawFd> {
        let op = IoOp::Open {
            path: path.as_ref().to_path_buf(),
            options: options.clone(),
        };
        match self.submit(op)? {
            IoOutput::Opened(fd) => Ok(fd),
            other => self.unexpected(IoKind::Open, &other),
        }
    }

    /// Read up to `buf.len()` bytes from `fd` into `buf`
    pub fn read(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        let op = IoOp::Read { fd, len: buf.len() };
        match self.submit(op)? {
            IoOutput::Read(data) => {
                buf[..data.len()].copy_from_slice(&data);
                Ok(data.len())
            }
            other => self.unexpected(IoKind::Read, &other),
        }
    }

    /// Write `buf` to `fd`.
    ///
    /// Once the request completes, successfully or not, `buf` is zeroed as
    /// a completion signal.
    pub fn write(&self, fd: RawFd, buf: &mut [u8]) -> io::Result<usize> {
        let op = IoOp::Write {
            fd,
            data: buf.to_vec(),
        };
        let result = self.submit(op);
        buf.fill(0);
        match result? {
            IoOutput::Written(n) => Ok(n),
            other => self.unexpected(IoKind::Write, &other),
        }
    }

    /// Move the offset of `fd`, returning the new position
    pub fn seek(&self, fd: RawFd, pos: SeekFrom) -> io::Result<u64> {
        match self.submit(IoOp::Seek { fd, pos })? {
            IoOutput::Seeked(offset) => Ok(offset),
            other => self.unexpected(IoKind::Seek, &other),
        }
    }

    /// Close `fd`
    pub fn close(&self, fd: RawFd) -> io::Result<()> {
        match self.submit(IoOp::Close { fd })? {
            IoOutput::Closed => Ok(()),
            other => self.unexpected(IoKind::Close, &other),
        }
    }

    /// Park on the I/O executor and collect the completion addressed to us
    fn submit(&self, op: IoOp) -> io::Result<IoOutput> {
        let kind = op.kind();
        // SAFETY: called from the task's own stack while it is running.
        unsafe { Task::suspend(self.task, Transition::Io(op)) };
        self.task().shared().completions.take(self.id(), kind)
    }

    fn unexpected<T>(&self, kind: IoKind, output: &IoOutput) -> io::Result<T> {
        invariant_violated!("{} issued {:?} but got {:?}", self.id(), kind, output)
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext").field("id", &self.id()).finish()
    }
}
