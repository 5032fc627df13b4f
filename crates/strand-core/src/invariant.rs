//! Fail-fast reporting for broken scheduler invariants.

use std::fmt;

/// Log the violation and abort. Unwinding is not an option here: the
/// violation may be detected on a task stack, and continuing would touch a
/// descriptor that is owned elsewhere.
#[cold]
#[inline(never)]
pub(crate) fn violated(args: fmt::Arguments<'_>) -> ! {
    log::error!("scheduler invariant violated: {}", args);
    eprintln!("strand: scheduler invariant violated: {}", args);
    std::process::abort()
}

macro_rules! invariant_violated {
    ($($arg:tt)*) => {
        $crate::invariant::violated(format_args!($($arg)*))
    };
}

pub(crate) use invariant_violated;
