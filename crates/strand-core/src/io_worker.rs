//! I/O executor thread
//!
//! The only thread that performs blocking syscalls on behalf of tasks.

use crate::io::{self, IoCompletion, IoRequest};
use crate::scheduler::Shared;
use crate::task::TaskState;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Start the I/O executor
pub(crate) fn spawn(shared: Arc<Shared>) -> std::io::Result<JoinHandle<()>> {
    thread::Builder::new()
        .name("strand-io".to_string())
        .spawn(move || run_loop(&shared))
}

fn run_loop(shared: &Shared) {
    log::debug!("io worker started");

    let idle = shared.config.idle;
    let backoff = shared.config.idle_backoff();

    loop {
        let Some(IoRequest { op, mut task }) = shared.io_requests.next(idle, backoff) else {
            if shared.should_stop() {
                break;
            }
            continue;
        };

        let task_id = task.id();
        let kind = op.kind();
        let result = io::perform(op);
        if let Err(err) = &result {
            log::debug!("{} {:?} failed: {}", task_id, kind, err);
        }

        // Publish before requeueing: the task reads its completion as soon
        // as a compute worker resumes it.
        shared.completions.publish(IoCompletion {
            task_id,
            kind,
            result,
        });
        task.set_state(TaskState::Ready);
        shared.ready.push(task);
    }

    log::debug!("io worker shutting down");
}
