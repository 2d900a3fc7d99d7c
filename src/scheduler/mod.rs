/*
 * Scheduler
 *
 * A preemptive, multi-level feedback queue scheduler for kernel
 * threads. Threads are dispatched highest-priority-first within
 * FIFO-ordered per-priority ready queues; a thread that uses its whole
 * quantum is demoted a level, a thread that blocks keeps its priority,
 * and a periodic boost (triggered by congestion or, failing that, a
 * fixed dispatch count) resets every ready thread back to the top
 * level so nothing starves indefinitely.
 *
 * Submodules:
 * - config: tunable constants
 * - error: SchedError / SchedResult
 * - cpu_if: the machine interface (context switch, timer, halt, AP control)
 * - tcb: thread control block allocation and lifecycle
 * - list: the intrusive list TCBs are threaded onto
 * - queue: the ready queues and timeout list, under one spinlock
 * - ccb: per-core control blocks
 * - core: the dispatch algorithm (sched_yield, gain, wakeup, sleep_releasing)
 * - mutex: the scheduler-aware lock built on top of sleep_releasing
 * - trampoline: the asm landing pad for a TCB's first dispatch
 * - io_wait: generic blocking I/O channels built on wakeup/sleep_releasing
 * - sched_tests: runtime self-tests, run from the boot test menu
 */

pub mod config;
pub mod error;
pub mod cpu_if;
pub mod tcb;
pub mod list;
pub mod queue;
pub mod ccb;
pub mod core;
pub mod mutex;
pub mod trampoline;
pub mod io_wait;
pub mod sched_tests;

use core::sync::atomic::{AtomicBool, Ordering};

pub use self::core::Cause;
pub use io_wait::{wait_for_io, wake_io_waiters, IoChannel};

/// Opaque thread identity for logging and the few peripheral call sites
/// that just need to name a thread, not dereference it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThreadId(pub usize);

impl core::fmt::Display for ThreadId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "thread-{:#x}", self.0)
    }
}

fn thread_id_of(handle: tcb::TcbHandle) -> ThreadId {
    ThreadId(handle.0.as_ptr() as usize)
}

static SCHEDULER_ENABLED: AtomicBool = AtomicBool::new(false);

/// Ticks per millisecond assumed for sleep_ms's deadline math. The PIT
/// is programmed elsewhere at a fixed rate; this kernel treats a tick
/// and a millisecond as the same unit rather than reading the PIT's
/// configured divisor back out, matching the "tunables are heuristics"
/// spirit -- sleep_ms's accuracy is bounded by quantum granularity
/// regardless.
const TICKS_PER_MS: u64 = 1;

/// Brings up the scheduler's data structures. Must be called once,
/// before any spawn_kernel_thread, after IDT/GDT init so the timer and
/// yield interrupt vectors exist.
pub fn init() {
    self::core::initialize_scheduler();
}

/// Marks the scheduler live and starts running this core's idle
/// thread. Never returns.
pub fn enable() -> ! {
    SCHEDULER_ENABLED.store(true, Ordering::Release);
    io_wait::init();
    log::info!("scheduler: enabled");
    self::core::run_scheduler(ccb::current_core_id())
}

pub fn is_scheduler_enabled() -> bool {
    SCHEDULER_ENABLED.load(Ordering::Acquire)
}

/// Spawns a kernel thread at normal priority. `entry` must never
/// return; a thread that falls off the end of its entry function is a
/// programming error in the caller, not something the scheduler
/// recovers from.
pub fn spawn_kernel_thread(entry: extern "C" fn() -> !) -> ThreadId {
    spawn_kernel_thread_at(entry, config::TOP_PRIORITY / 2)
}

pub fn spawn_kernel_thread_at(entry: extern "C" fn() -> !, priority: u8) -> ThreadId {
    let handle = self::core::spawn_thread(entry_shim, entry as usize, priority, None)
        .expect("spawn_kernel_thread: TCB allocation failed");
    thread_id_of(handle)
}

extern "C" fn entry_shim(arg: usize) -> ! {
    let entry: extern "C" fn() -> ! = unsafe { core::mem::transmute(arg) };
    entry()
}

/// Spawns a kernel thread owned by `owner`, so the process layer's
/// thread count and exit tracking follow it.
pub fn spawn_kernel_thread_in_process(
    entry: extern "C" fn() -> !,
    owner: crate::process::PcbId,
) -> ThreadId {
    crate::process::thread_spawned(owner);
    let handle = self::core::spawn_thread(entry_shim, entry as usize, config::TOP_PRIORITY / 2, Some(owner))
        .expect("spawn_kernel_thread_in_process: TCB allocation failed");
    thread_id_of(handle)
}

/// Voluntarily gives up the CPU at the current priority.
pub fn yield_now() {
    self::core::sched_yield(Cause::Voluntary);
}

/// Never returns: transitions the calling thread to Exited and
/// dispatches away from it for the last time.
pub fn exit_thread() -> ! {
    self::core::sched_yield(Cause::Exit);
    unreachable!("an exited thread must never be rescheduled");
}

/// Blocks the calling thread for at least `ms` milliseconds.
pub fn sleep_ms(ms: u64) {
    if !is_scheduler_enabled() {
        // Scheduler not up yet (early boot): busy-wait instead of
        // blocking a thread that doesn't exist.
        let target = cpu_if::clock() + ms * TICKS_PER_MS;
        while cpu_if::clock() < target {
            cpu_if::cpu_core_halt();
        }
        return;
    }
    let me = self::core::current_thread();
    let deadline = cpu_if::clock() + ms * TICKS_PER_MS;
    self::core::sleep_releasing(Cause::Block, |sched| {
        self::core::register_timeout_locked(sched, me, deadline);
    });
}

pub fn current_thread_id() -> ThreadId {
    thread_id_of(self::core::current_thread())
}

/// Called from the timer IRQ handler on every tick: advances the
/// clock, expires timeouts, and preempts the current thread if its
/// quantum is up.
pub fn on_timer_tick() {
    self::core::on_timer_tick();
}

pub fn active_thread_count() -> usize {
    self::core::active_thread_count()
}
