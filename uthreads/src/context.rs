//! Saved CPU register state and the raw asm routines that switch between it.
//!
//! This is the direct generalization of a kernel's task-switch primitive to
//! userspace: there is no CR3 reload (one address space for the whole
//! process) and the "stack" is a plain heap allocation instead of a
//! kernel-reserved page range.

use core::arch::naked_asm;

/// Callee-saved registers on the x86_64 System V ABI, plus the saved
/// program counter. Deliberately carries no signal-mask field; see
/// `DESIGN.md` for why the library doesn't need one.
#[derive(Debug, Clone, Copy)]
#[repr(C)]
pub struct Context {
    pub rsp: u64,
    pub rbp: u64,
    pub rbx: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
}

impl Context {
    /// Placeholder context for the main thread, which is already running
    /// when the library initializes and so has nothing to restore into.
    /// The first `switch_context` call away from thread 0 overwrites every
    /// field with its real, live register state.
    pub fn empty() -> Self {
        Context {
            rsp: 0,
            rbp: 0,
            rbx: 0,
            r12: 0,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: 0,
        }
    }

    /// Build a context for a freshly spawned thread whose stack occupies
    /// `[_, stack_top)`. The entry point is stashed in `r12` rather than
    /// `rip` directly: `rip` points at `entry_trampoline`, which calls
    /// through `r12` and terminates the thread if the call ever returns.
    pub fn new(entry: extern "C" fn(), stack_top: u64) -> Self {
        // System V requires rsp % 16 == 0 at a `call` instruction boundary;
        // -8 accounts for the trampoline's own implicit return address slot.
        let aligned_sp = (stack_top - 8) & !0xF;

        Context {
            rsp: aligned_sp,
            rbp: 0,
            rbx: 0,
            r12: entry as u64,
            r13: 0,
            r14: 0,
            r15: 0,
            rip: entry_trampoline as u64,
        }
    }
}

/// Save the caller's registers into `old`, then load and jump into `new`.
/// Returns (to the instruction right after the call site) only once some
/// later `switch_context` targets `old` again.
///
/// # Safety
/// `old` and `new` must point at live `Context` values; `new` must describe
/// a stack and instruction pointer that are safe to resume.
#[unsafe(naked)]
pub unsafe extern "C" fn switch_context(old: *mut Context, new: *const Context) {
    naked_asm!(
        "mov [rdi + 0x00], rsp",
        "mov [rdi + 0x08], rbp",
        "mov [rdi + 0x10], rbx",
        "mov [rdi + 0x18], r12",
        "mov [rdi + 0x20], r13",
        "mov [rdi + 0x28], r14",
        "mov [rdi + 0x30], r15",
        "lea rax, [rip + 2f]",
        "mov [rdi + 0x38], rax",

        "mov rsp, [rsi + 0x00]",
        "mov rbp, [rsi + 0x08]",
        "mov rbx, [rsi + 0x10]",
        "mov r12, [rsi + 0x18]",
        "mov r13, [rsi + 0x20]",
        "mov r14, [rsi + 0x28]",
        "mov r15, [rsi + 0x30]",

        "jmp [rsi + 0x38]",

        "2:",
        "ret",
    );
}

/// Load `new` and jump into it without saving anything first. Used when the
/// calling thread is being torn down and its own context will never be
/// resumed.
///
/// # Safety
/// `new` must point at a live `Context` describing a stack and instruction
/// pointer that are safe to resume.
#[unsafe(naked)]
pub unsafe extern "C" fn restore_context(new: *const Context) -> ! {
    naked_asm!(
        "mov rsp, [rdi + 0x00]",
        "mov rbp, [rdi + 0x08]",
        "mov rbx, [rdi + 0x10]",
        "mov r12, [rdi + 0x18]",
        "mov r13, [rdi + 0x20]",
        "mov r14, [rdi + 0x28]",
        "mov r15, [rdi + 0x30]",
        "jmp [rdi + 0x38]",
    );
}

/// All freshly spawned threads start execution here, with the real entry
/// point stashed in `r12` by `Context::new`. Falling off the end of a
/// thread's own entry function would otherwise `ret` into garbage; routing
/// through here means it cleanly terminates the thread instead.
#[unsafe(naked)]
unsafe extern "C" fn entry_trampoline() -> ! {
    naked_asm!("call r12", "call {finish}", "ud2", finish = sym thread_finished,);
}

extern "C" fn thread_finished() -> ! {
    let _ = crate::terminate(crate::get_tid());
    unreachable!("terminate() on the running thread never returns");
}
