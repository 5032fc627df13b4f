//! Machine context switching
//!
//! A suspended context is just a stack pointer: the switch routine pushes
//! the callee-saved registers onto the outgoing stack before storing its
//! pointer, and pops them from the incoming stack after loading its pointer.
//! Caller-saved registers are already spilled by the compiler around the
//! call, so nothing else needs saving.

#[cfg(target_arch = "aarch64")]
mod aarch64;
#[cfg(target_arch = "x86_64")]
mod x86_64;

#[cfg(target_arch = "aarch64")]
use self::aarch64 as imp;
#[cfg(target_arch = "x86_64")]
use self::x86_64 as imp;

#[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
compile_error!("strand-core supports x86_64 and aarch64 only");

/// Function first entered on a fresh stack. Must never return.
pub(crate) type EntryFn = unsafe extern "C" fn(arg: *mut ()) -> !;

/// Saved execution state of a stack that is not currently running
#[repr(C)]
#[derive(Debug, Default)]
pub(crate) struct SuspendedContext {
    sp: usize,
}

impl SuspendedContext {
    /// A slot to be filled by the next `switch` away from the current stack
    pub const fn empty() -> Self {
        Self { sp: 0 }
    }

    /// Build a context that calls `entry(arg)` on the stack ending at
    /// `stack_top` the first time it is switched to.
    ///
    /// # Safety
    /// `stack_top` must be the upper end of a writable region large enough
    /// for the initial frame and for everything `entry` runs, and that region
    /// must outlive every switch into the returned context.
    pub unsafe fn prepare(stack_top: usize, entry: EntryFn, arg: *mut ()) -> Self {
        Self {
            sp: imp::init_stack(stack_top, entry, arg),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sp == 0
    }
}

/// Save the running context into `from` and resume `to`.
///
/// Returns when some other stack switches back into `from`.
///
/// # Safety
/// `to` must hold a context produced by `prepare` or by an earlier `switch`
/// that has not been resumed since, and its stack must still be mapped.
/// `from` must stay valid until it is resumed.
#[inline]
pub(crate) unsafe fn switch(from: *mut SuspendedContext, to: *const SuspendedContext) {
    imp::switch_stack(std::ptr::addr_of_mut!((*from).sp), (*to).sp);
}
