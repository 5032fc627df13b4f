//! Strand Core Runtime
//!
//! Cooperative user-level threads ("tasks") multiplexed onto a small fixed
//! pool of OS worker threads:
//! - One or two compute executors that run ready tasks until they yield,
//!   block on I/O, or exit
//! - One I/O executor that performs blocking file operations on behalf of
//!   suspended tasks and hands them back to the ready queue
//! - Stackful context switching on mmap'd, guard-paged task stacks
//!
//! ```ignore
//! use strand_core::{Scheduler, SchedulerConfig};
//!
//! let mut scheduler = Scheduler::init(SchedulerConfig::default())?;
//! scheduler.create(|cx| {
//!     let fd = cx.open("/tmp/hello.txt").expect("open");
//!     let mut buf = *b"hello";
//!     cx.write(fd, &mut buf).expect("write");
//!     cx.close(fd).expect("close");
//! })?;
//! scheduler.shutdown()?;
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

mod arch;
pub mod config;
mod context;
mod invariant;
pub mod io;
mod io_worker;
mod queue;
mod scheduler;
mod stack;
mod task;
mod worker;

pub use config::{ConfigError, IdlePolicy, SchedulerConfig};
pub use context::TaskContext;
pub use io::{IoKind, OpenOptions, RawFd};
pub use scheduler::{Scheduler, SchedulerStats};
pub use task::{TaskId, TaskState};

/// Scheduler errors
#[derive(Debug, thiserror::Error)]
pub enum StrandError {
    /// The scheduler is shutting down or has shut down
    #[error("Scheduler has been shut down")]
    ShutDown,

    /// The configured live-task limit is reached
    #[error("Task limit reached ({limit} live tasks)")]
    TaskLimit {
        /// Configured maximum number of live tasks
        limit: usize,
    },

    /// The task stack could not be mapped
    #[error("Failed to allocate a {size} byte task stack: {source}")]
    StackAllocation {
        /// Requested usable stack size
        size: usize,
        /// Underlying OS error
        source: std::io::Error,
    },

    /// A worker thread could not be started
    #[error("Failed to spawn worker thread: {0}")]
    ThreadSpawn(#[source] std::io::Error),

    /// A worker thread panicked and could not be joined cleanly
    #[error("Worker thread '{worker}' panicked")]
    WorkerPanicked {
        /// Name of the worker thread
        worker: String,
    },

    /// Invalid scheduler configuration
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Scheduler result
pub type Result<T> = std::result::Result<T, StrandError>;
