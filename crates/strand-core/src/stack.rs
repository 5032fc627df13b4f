//! Task stacks
//!
//! Each stack is an anonymous private mapping with one inaccessible guard
//! page below the usable region, so running off the end faults instead of
//! scribbling over a neighbouring allocation.

use crate::{Result, StrandError};
use once_cell::sync::Lazy;
use std::io;
use std::ptr::{self, NonNull};

static PAGE_SIZE: Lazy<usize> = Lazy::new(|| {
    // SAFETY: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
});

/// Exclusively owned, fixed-size task stack. Unmapped on drop.
pub(crate) struct TaskStack {
    base: NonNull<u8>,
    mapped_len: usize,
    guard_len: usize,
}

// SAFETY: the mapping is owned by exactly one TaskStack and is only touched
// by whichever thread currently runs the owning task.
unsafe impl Send for TaskStack {}

impl TaskStack {
    /// Map a stack with at least `size` usable bytes
    pub fn new(size: usize) -> Result<Self> {
        let page = *PAGE_SIZE;
        let usable = size.div_ceil(page) * page;
        let mapped_len = usable + page;

        // SAFETY: anonymous private mapping, no file descriptor involved.
        let base = unsafe {
            libc::mmap(
                ptr::null_mut(),
                mapped_len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if base == libc::MAP_FAILED {
            return Err(StrandError::StackAllocation {
                size,
                source: io::Error::last_os_error(),
            });
        }

        // SAFETY: the first page lies inside the mapping created above.
        if unsafe { libc::mprotect(base, page, libc::PROT_NONE) } != 0 {
            let source = io::Error::last_os_error();
            // SAFETY: unmapping the region we just mapped.
            unsafe { libc::munmap(base, mapped_len) };
            return Err(StrandError::StackAllocation { size, source });
        }

        Ok(Self {
            base: NonNull::new(base.cast()).ok_or_else(|| StrandError::StackAllocation {
                size,
                source: io::Error::from(io::ErrorKind::OutOfMemory),
            })?,
            mapped_len,
            guard_len: page,
        })
    }

    /// One past the highest usable address. Page aligned.
    pub fn top(&self) -> usize {
        self.base.as_ptr() as usize + self.mapped_len
    }

    /// Lowest usable address (just above the guard page)
    pub fn bottom(&self) -> usize {
        self.base.as_ptr() as usize + self.guard_len
    }

    /// Usable bytes
    pub fn size(&self) -> usize {
        self.mapped_len - self.guard_len
    }
}

impl Drop for TaskStack {
    fn drop(&mut self) {
        // SAFETY: base/mapped_len describe the mapping created in `new`, and
        // no task is running on it once its owner is dropped.
        let rc = unsafe { libc::munmap(self.base.as_ptr().cast(), self.mapped_len) };
        if rc != 0 {
            log::error!(
                "failed to unmap task stack at {:p}: {}",
                self.base,
                io::Error::last_os_error()
            );
        }
    }
}

impl std::fmt::Debug for TaskStack {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskStack")
            .field("bottom", &format_args!("{:#x}", self.bottom()))
            .field("top", &format_args!("{:#x}", self.top()))
            .field("size", &self.size())
            .finish()
    }
}
