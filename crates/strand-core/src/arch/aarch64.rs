//! AArch64 (AAPCS64) context switch
//!
//! Saved frame, from the stored stack pointer upwards: x19..x28, x29 (fp),
//! x30 (lr), then d8..d15. On a fresh stack x19 holds the entry argument,
//! x20 the entry function and x30 the bootstrap address.

use super::EntryFn;
use std::arch::naked_asm;

const FRAME_WORDS: usize = 20;

#[unsafe(naked)]
pub(super) unsafe extern "C" fn switch_stack(_from: *mut usize, _to: usize) {
    naked_asm!(
        "sub sp, sp, #0xa0",
        "stp x19, x20, [sp, #0x00]",
        "stp x21, x22, [sp, #0x10]",
        "stp x23, x24, [sp, #0x20]",
        "stp x25, x26, [sp, #0x30]",
        "stp x27, x28, [sp, #0x40]",
        "stp x29, x30, [sp, #0x50]",
        "stp d8, d9, [sp, #0x60]",
        "stp d10, d11, [sp, #0x70]",
        "stp d12, d13, [sp, #0x80]",
        "stp d14, d15, [sp, #0x90]",
        "mov x9, sp",
        "str x9, [x0]",
        "mov sp, x1",
        "ldp x19, x20, [sp, #0x00]",
        "ldp x21, x22, [sp, #0x10]",
        "ldp x23, x24, [sp, #0x20]",
        "ldp x25, x26, [sp, #0x30]",
        "ldp x27, x28, [sp, #0x40]",
        "ldp x29, x30, [sp, #0x50]",
        "ldp d8, d9, [sp, #0x60]",
        "ldp d10, d11, [sp, #0x70]",
        "ldp d12, d13, [sp, #0x80]",
        "ldp d14, d15, [sp, #0x90]",
        "add sp, sp, #0xa0",
        "ret",
    )
}

#[unsafe(naked)]
unsafe extern "C" fn bootstrap() {
    naked_asm!("mov x0, x19", "blr x20", "brk #0x1")
}

pub(super) unsafe fn init_stack(stack_top: usize, entry: EntryFn, arg: *mut ()) -> usize {
    let sp = (stack_top & !0xF) - FRAME_WORDS * 8;
    let frame = sp as *mut usize;

    for word in 0..FRAME_WORDS {
        frame.add(word).write(0);
    }
    frame.write(arg as usize);
    frame.add(1).write(entry as usize);
    frame.add(11).write(bootstrap as usize);

    sp
}
