//! Blocking I/O offload
//!
//! A task that performs I/O packages the operation into an [`IoRequest`]
//! carrying its own descriptor and parks. The I/O executor runs the real
//! syscall, publishes an [`IoCompletion`] tagged with the task's id, and
//! puts the task back on the ready queue. The resuming task collects its
//! completion by id, so delivery order on the I/O side never matters.
//!
//! Buffers are copied across the hand-off: a read returns a fresh buffer that
//! the task copies into the caller's slice, and a write ships a copy of the
//! caller's bytes.

use crate::invariant::invariant_violated;
use crate::task::{Task, TaskId};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::ffi::CString;
use std::io::{self, SeekFrom};
use std::os::unix::ffi::OsStrExt;
use std::path::PathBuf;

pub use std::os::unix::io::RawFd;

/// Kind of I/O operation
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum IoKind {
    /// Open a file by path
    Open,
    /// Read from a descriptor
    Read,
    /// Write to a descriptor
    Write,
    /// Reposition a descriptor's offset
    Seek,
    /// Close a descriptor
    Close,
}

/// Flags for opening a file through the I/O executor.
///
/// The default opens read/write in append mode, creating the file with mode
/// 0o777 if it does not exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    read: bool,
    write: bool,
    append: bool,
    create: bool,
    truncate: bool,
    mode: u32,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read: true,
            write: true,
            append: true,
            create: true,
            truncate: false,
            mode: 0o777,
        }
    }
}

impl OpenOptions {
    /// All flags cleared, mode 0o666
    pub fn new() -> Self {
        Self {
            read: false,
            write: false,
            append: false,
            create: false,
            truncate: false,
            mode: 0o666,
        }
    }

    /// Open for reading
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Open for writing
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Every write goes to the end of the file
    pub fn append(mut self, append: bool) -> Self {
        self.append = append;
        self
    }

    /// Create the file if it does not exist
    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    /// Truncate the file to zero length on open
    pub fn truncate(mut self, truncate: bool) -> Self {
        self.truncate = truncate;
        self
    }

    /// Permission bits used when the file is created
    pub fn mode(mut self, mode: u32) -> Self {
        self.mode = mode;
        self
    }

    fn flags(&self) -> libc::c_int {
        let mut flags = match (self.read, self.write || self.append) {
            (true, true) => libc::O_RDWR,
            (false, true) => libc::O_WRONLY,
            _ => libc::O_RDONLY,
        };
        if self.append {
            flags |= libc::O_APPEND;
        }
        if self.create {
            flags |= libc::O_CREAT;
        }
        if self.truncate {
            flags |= libc::O_TRUNC;
        }
        flags | libc::O_CLOEXEC
    }
}

/// An operation for the I/O executor
#[derive(Debug)]
pub(crate) enum IoOp {
    Open {
        path: PathBuf,
        options: OpenOptions,
    },
    Read { fd: RawFd, len: usize },
    Write { fd: RawFd, data: Vec<u8> },
    Seek { fd: RawFd, pos: SeekFrom },
    Close { fd: RawFd },
}

impl IoOp {
    pub fn kind(&self) -> IoKind {
        match self {
            IoOp::Open { .. } => IoKind::Open,
            IoOp::Read { .. } => IoKind::Read,
            IoOp::Write { .. } => IoKind::Write,
            IoOp::Seek { .. } => IoKind::Seek,
            IoOp::Close { .. } => IoKind::Close,
        }
    }
}

/// Successful outcome of an operation
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum IoOutput {
    Opened(RawFd),
    Read(Vec<u8>),
    Written(usize),
    Seeked(u64),
    Closed,
}

/// A parked task and the operation it is waiting on
pub(crate) struct IoRequest {
    pub op: IoOp,
    pub task: Box<Task>,
}

/// Result of a request, addressed to the task that issued it
#[derive(Debug)]
pub(crate) struct IoCompletion {
    pub task_id: TaskId,
    pub kind: IoKind,
    pub result: io::Result<IoOutput>,
}

/// Completions waiting for their task to resume, keyed by task id
pub(crate) struct CompletionTable {
    pending: Mutex<FxHashMap<TaskId, IoCompletion>>,
}

impl CompletionTable {
    pub fn new() -> Self {
        Self {
            pending: Mutex::new(FxHashMap::default()),
        }
    }

    /// Store a completion. A task has at most one request in flight, so a
    /// second completion for the same id means the bookkeeping is broken.
    pub fn publish(&self, completion: IoCompletion) {
        let task_id = completion.task_id;
        if self.pending.lock().insert(task_id, completion).is_some() {
            invariant_violated!("{} has two outstanding I/O completions", task_id);
        }
    }

    /// Collect the completion for `task_id`, checking it answers `kind`
    pub fn take(&self, task_id: TaskId, kind: IoKind) -> io::Result<IoOutput> {
        let Some(completion) = self.pending.lock().remove(&task_id) else {
            invariant_violated!("{} resumed without its {:?} completion", task_id, kind);
        };
        if completion.kind != kind {
            invariant_violated!(
                "{} issued {:?} but received a {:?} completion",
                task_id,
                kind,
                completion.kind
            );
        }
        completion.result
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }
}

/// Run `op` on the calling thread. Only the I/O executor calls this.
pub(crate) fn perform(op: IoOp) -> io::Result<IoOutput> {
    match op {
        IoOp::Open { path, options } => {
            let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
                io::Error::new(io::ErrorKind::InvalidInput, "path contains a NUL byte")
            })?;
            // SAFETY: c_path is a valid NUL-terminated string.
            let fd = retry(|| unsafe {
                libc::open(c_path.as_ptr(), options.flags(), options.mode as libc::c_uint) as isize
            })?;
            Ok(IoOutput::Opened(fd as RawFd))
        }
        IoOp::Read { fd, len } => {
            let mut buf = vec![0u8; len];
            // SAFETY: buf is valid for `len` writable bytes.
            let n = retry(|| unsafe { libc::read(fd, buf.as_mut_ptr().cast(), len) })?;
            buf.truncate(n as usize);
            Ok(IoOutput::Read(buf))
        }
        IoOp::Write { fd, data } => {
            // SAFETY: data is valid for `data.len()` readable bytes.
            let n = retry(|| unsafe { libc::write(fd, data.as_ptr().cast(), data.len()) })?;
            Ok(IoOutput::Written(n as usize))
        }
        IoOp::Seek { fd, pos } => {
            let (offset, whence) = match pos {
                SeekFrom::Start(n) => (
                    libc::off_t::try_from(n).map_err(|_| {
                        io::Error::new(io::ErrorKind::InvalidInput, "seek offset out of range")
                    })?,
                    libc::SEEK_SET,
                ),
                SeekFrom::Current(n) => (n as libc::off_t, libc::SEEK_CUR),
                SeekFrom::End(n) => (n as libc::off_t, libc::SEEK_END),
            };
            // SAFETY: lseek has no memory-safety preconditions.
            let n = retry(|| unsafe { libc::lseek(fd, offset, whence) as isize })?;
            Ok(IoOutput::Seeked(n as u64))
        }
        IoOp::Close { fd } => {
            // SAFETY: close has no memory-safety preconditions. EINTR is not
            // retried: the descriptor state is unspecified afterwards.
            if unsafe { libc::close(fd) } < 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(IoOutput::Closed)
        }
    }
}

fn retry(mut call: impl FnMut() -> isize) -> io::Result<isize> {
    loop {
        let rc = call();
        if rc >= 0 {
            return Ok(rc);
        }
        let err = io::Error::last_os_error();
        if err.kind() != io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}
