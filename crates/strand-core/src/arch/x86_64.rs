//! x86_64 System V context switch
//!
//! Saved frame, from the stored stack pointer upwards:
//!
//! ```text
//! sp+0   mxcsr (u32), x87 control word (u16), padding
//! sp+8   r15
//! sp+16  r14
//! sp+24  r13      fresh stack: entry function
//! sp+32  r12      fresh stack: entry argument
//! sp+40  rbx
//! sp+48  rbp
//! sp+56  return address (bootstrap on a fresh stack)
//! ```

use super::EntryFn;
use std::arch::naked_asm;

/// Power-on defaults: all SSE exceptions masked, round to nearest; x87
/// extended precision with all exceptions masked.
const DEFAULT_FP_CONTROL: usize = (0x037F << 32) | 0x1F80;

const FRAME_WORDS: usize = 8;

#[unsafe(naked)]
pub(super) unsafe extern "C" fn switch_stack(_from: *mut usize, _to: usize) {
    naked_asm!(
        "push rbp",
        "push rbx",
        "push r12",
        "push r13",
        "push r14",
        "push r15",
        "sub rsp, 8",
        "stmxcsr [rsp]",
        "fnstcw [rsp + 4]",
        "mov [rdi], rsp",
        "mov rsp, rsi",
        "ldmxcsr [rsp]",
        "fldcw [rsp + 4]",
        "add rsp, 8",
        "pop r15",
        "pop r14",
        "pop r13",
        "pop r12",
        "pop rbx",
        "pop rbp",
        "ret",
    )
}

/// First code run on a fresh stack. rsp is 16-byte aligned here, so the
/// call leaves the entry function with the ABI-mandated rsp % 16 == 8.
#[unsafe(naked)]
unsafe extern "C" fn bootstrap() {
    naked_asm!("mov rdi, r12", "call r13", "ud2")
}

pub(super) unsafe fn init_stack(stack_top: usize, entry: EntryFn, arg: *mut ()) -> usize {
    // Two zero words above the frame terminate frame-pointer walks.
    let top = (stack_top & !0xF) - 16;
    let sp = top - FRAME_WORDS * 8;
    let frame = sp as *mut usize;

    frame.write(DEFAULT_FP_CONTROL);
    frame.add(1).write(0);
    frame.add(2).write(0);
    frame.add(3).write(entry as usize);
    frame.add(4).write(arg as usize);
    frame.add(5).write(0);
    frame.add(6).write(0);
    frame.add(7).write(bootstrap as usize);
    frame.add(8).write(0);
    frame.add(9).write(0);

    sp
}
