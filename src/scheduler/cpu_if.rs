/*
 * CPU / BIOS Interface
 *
 * Everything the scheduler core needs from the machine, gathered behind
 * one module so the rest of the scheduler never touches `core::arch`
 * directly. `cpu_swap_context` is the only piece of hand-written
 * assembly in the scheduler: a cooperative register-only context
 * switch, callable like an ordinary function, used by `sched_yield`
 * while holding no scheduler lock.
 */

use core::arch::naked_asm;
use core::mem::offset_of;
use core::sync::atomic::{AtomicU64, Ordering};

/// Callee-saved machine state for one thread. Only the registers the
/// System V ABI requires a callee to preserve need saving here, because
/// cpu_swap_context is entered and left via an ordinary `call`/`ret`.
#[repr(C)]
#[derive(Debug, Default)]
pub struct CpuContext {
    pub rbx: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub rflags: u64,
}

/// Prepares a fresh context so that the first `cpu_swap_context` into it
/// lands inside `trampoline` with `stack_top` as its stack and `entry`/`arg`
/// available to read off the stack.
///
/// The trampoline address is pushed as the return address `cpu_swap_context`
/// will `ret` into; `entry` and `arg` are pushed below it so the trampoline
/// can pop them once it starts running on the new stack.
pub fn cpu_initialize_context(
    ctx: &mut CpuContext,
    stack_top: *mut u8,
    trampoline: extern "C" fn() -> !,
    entry: extern "C" fn(usize) -> !,
    arg: usize,
) {
    unsafe {
        let mut sp = stack_top as *mut u64;
        // Reserve slots the trampoline pops: arg, then entry, in that order.
        sp = sp.sub(1);
        sp.write(arg as u64);
        sp = sp.sub(1);
        sp.write(entry as usize as u64);
        sp = sp.sub(1);
        sp.write(trampoline as usize as u64);
        ctx.rsp = sp as u64;
    }
    ctx.rbx = 0;
    ctx.r12 = 0;
    ctx.r13 = 0;
    ctx.r14 = 0;
    ctx.r15 = 0;
    ctx.rbp = 0;
    ctx.rflags = 0x202; // IF set, reserved bit 1 set
}

/// Saves the running thread's callee-saved state into `prev` and loads
/// `next`'s, then returns into whatever `next` last called this from (or
/// its trampoline, the first time). Must be called with interrupts
/// disabled and with no scheduler spinlock held: the thread that owned
/// `prev` may be freed by another core the instant this function leaves
/// it, and that core must not spin waiting for a lock we still hold.
#[unsafe(naked)]
pub unsafe extern "sysv64" fn cpu_swap_context(prev: *mut CpuContext, next: *const CpuContext) {
    naked_asm!(
        "test rdi, rdi",
        "jz 2f",
        "mov [rdi + {rbx}], rbx",
        "mov [rdi + {r12}], r12",
        "mov [rdi + {r13}], r13",
        "mov [rdi + {r14}], r14",
        "mov [rdi + {r15}], r15",
        "mov [rdi + {rbp}], rbp",
        "pushfq",
        "pop rax",
        "mov [rdi + {rflags}], rax",
        "mov [rdi + {rsp}], rsp",
        "2:",
        "mov rbx, [rsi + {rbx}]",
        "mov r12, [rsi + {r12}]",
        "mov r13, [rsi + {r13}]",
        "mov r14, [rsi + {r14}]",
        "mov r15, [rsi + {r15}]",
        "mov rbp, [rsi + {rbp}]",
        "mov rax, [rsi + {rflags}]",
        "push rax",
        "popfq",
        "mov rsp, [rsi + {rsp}]",
        "ret",
        rbx = const offset_of!(CpuContext, rbx),
        r12 = const offset_of!(CpuContext, r12),
        r13 = const offset_of!(CpuContext, r13),
        r14 = const offset_of!(CpuContext, r14),
        r15 = const offset_of!(CpuContext, r15),
        rbp = const offset_of!(CpuContext, rbp),
        rsp = const offset_of!(CpuContext, rsp),
        rflags = const offset_of!(CpuContext, rflags),
    );
}

/// Monotonic tick counter, advanced once per timer interrupt by the IDT's
/// IRQ0 handler. Stands in for bios_clock().
static TICKS: AtomicU64 = AtomicU64::new(0);

pub fn clock() -> u64 {
    TICKS.load(Ordering::Acquire)
}

pub fn tick() -> u64 {
    TICKS.fetch_add(1, Ordering::AcqRel) + 1
}

/// Deadline (in ticks) the next software timer should fire at, or
/// NO_TIMEOUT if none is armed. There is one physical timer (the PIT
/// already driving IRQ0) so "arming a BIOS timer" here means recording
/// the next deadline for the tick handler to compare against; it does
/// not reprogram hardware.
static NEXT_DEADLINE: AtomicU64 = AtomicU64::new(super::config::NO_TIMEOUT);

pub fn bios_set_timer(deadline_tick: u64) {
    NEXT_DEADLINE.fetch_min(deadline_tick, Ordering::AcqRel);
}

pub fn bios_cancel_timer() {
    NEXT_DEADLINE.store(super::config::NO_TIMEOUT, Ordering::Release);
}

/// True if the armed software deadline has passed. Clears it so it
/// fires once, matching a one-shot BIOS timer.
pub fn bios_timer_expired(now: u64) -> bool {
    let deadline = NEXT_DEADLINE.load(Ordering::Acquire);
    if deadline != super::config::NO_TIMEOUT && now >= deadline {
        NEXT_DEADLINE.store(super::config::NO_TIMEOUT, Ordering::Release);
        true
    } else {
        false
    }
}

/// Parks the calling core until the next interrupt. Used by the idle
/// thread; never used while a scheduler spinlock is held.
pub fn cpu_core_halt() {
    x86_64::instructions::hlt();
}

/// Brings up application processor `core_id`. AP bring-up (SIPI/INIT
/// sequence, trampoline in low memory) is not implemented: this kernel
/// boots BSP-only today. Logged rather than silently ignored so the
/// gap is visible instead of assumed away.
pub fn cpu_core_restart_one(core_id: u32) {
    log::warn!("cpu_core_restart_one({}): AP bring-up not implemented, ignored", core_id);
}

pub fn cpu_core_restart_all() {
    log::warn!("cpu_core_restart_all: AP bring-up not implemented, BSP only");
}
