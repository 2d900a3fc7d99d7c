/*
 * Scheduler Core
 *
 * The dispatch loop. Every path that changes who is running on a core
 * funnels through `sched_yield`: quantum expiry, a voluntary yield, a
 * thread blocking on I/O or a mutex, and a thread exiting are all just
 * different `Cause`s feeding the same nine-step algorithm.
 *
 * Two-phase handoff: `sched_yield` does all of its bookkeeping and
 * picks `next` while holding `SCHED`, then releases the lock *before*
 * calling `cpu_swap_context` -- the outgoing thread must not hold a
 * spinlock across a swap, since the core it's swapped off of might not
 * touch that lock again for a long time. The bookkeeping that can only
 * be done once the swap has actually completed (freeing an exited
 * TCB's stack, clearing its Dirty phase) happens in `gain`, which runs
 * on whichever thread next regains this core -- not necessarily inside
 * the same call that performed the swap, since a cooperative swap
 * resumes at the suspended thread's own call site, not its successor's.
 * `Ccb::prev` is how that information crosses from the outgoing call to
 * wherever the core next wakes up.
 */

use alloc::vec::Vec;

use crate::arch::x86_64::interrupts::DisableInterrupts;
use crate::process::{self, PcbId};

use super::ccb::{self, Ccb};
use super::config::{LOWEST_PRIORITY, NO_TIMEOUT, TOP_PRIORITY};
use super::cpu_if;
use super::error::{SchedError, SchedResult};
use super::queue::SCHED;
use super::tcb::{self, Phase, TcbHandle, TcbKind, TcbState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// Timer tick found the quantum exhausted; was greedy, demote.
    Quantum,
    /// Thread called yield_now() voluntarily; priority unchanged.
    Voluntary,
    /// Thread is blocking on an I/O wait; was responsive, promote.
    IO,
    /// Thread is blocking on a condition other than I/O or a mutex
    /// (a timed sleep, a join). Priority unchanged.
    Block,
    /// Thread is blocking while holding/waiting on a KMutex.
    Mutex,
    /// The idle thread yielding with nothing else to do.
    Idle,
    /// Thread has exited and will never run again.
    Exit,
}

/// Threads still counted as active (Init/Ready/Running/Stopped, not Exited).
/// Guarded by its own spinlock, independent of SCHED: the invariant from
/// the concurrency model is that a thread never holds both locks at once.
static ACTIVE_THREADS: spin::Mutex<usize> = spin::Mutex::new(0);

pub fn active_thread_count() -> usize {
    *ACTIVE_THREADS.lock()
}

fn active_threads_inc() {
    *ACTIVE_THREADS.lock() += 1;
}

fn active_threads_dec() {
    let mut count = ACTIVE_THREADS.lock();
    *count = count.saturating_sub(1);
}

/// Brings up the scheduler's per-core state and creates the idle thread
/// for each core that will ever come online. Must run once, before any
/// spawn_thread or sched_yield call.
pub fn initialize_scheduler() {
    let idle = tcb::spawn_tcb(idle_entry, cpu_trampoline(), 0, LOWEST_PRIORITY, None, tcb::TcbKind::Idle)
        .expect("failed to allocate idle thread TCB");
    idle.get_mut().state = TcbState::Ready;

    let mut core0 = ccb::ccb(0).lock();
    core0.idle = Some(idle);
    core0.online = true;
    log::info!("scheduler: core 0 online, idle thread ready");
}

/// Starts running the scheduler on the calling core: swaps from the
/// boot stack into the core's idle thread and never returns. Must be
/// called exactly once per core, after initialize_scheduler.
pub fn run_scheduler(core_id: u32) -> ! {
    let idle = {
        let mut c = ccb::ccb(core_id).lock();
        c.prev = None;
        let idle = c.idle.expect("run_scheduler called before initialize_scheduler");
        c.current = Some(idle);
        idle
    };
    idle.get_mut().state = TcbState::Running;

    let mut boot_context = super::cpu_if::CpuContext::default();
    unsafe {
        cpu_if::cpu_swap_context(&mut boot_context, &idle.get().context);
    }
    unreachable!("boot context is never resumed");
}

/// Runs forever once dispatched. Parks the core for the next interrupt,
/// then yields with IDLE so a newly-ready thread gets first refusal at
/// the core before idle is re-entered. Checked each time it's re-entered
/// with nothing else ready: once every normal thread has exited, there
/// is nothing left for any core to ever do, so the timer is cancelled
/// and every core is poked to notice.
extern "C" fn idle_entry(_arg: usize) -> ! {
    loop {
        if active_thread_count() == 0 {
            cpu_if::bios_cancel_timer();
            cpu_if::cpu_core_restart_all();
        }
        cpu_if::cpu_core_halt();
        sched_yield(Cause::Idle);
    }
}

fn cpu_trampoline() -> extern "C" fn() -> ! {
    super::trampoline::thread_trampoline
}

/// Called by a thread the instant it regains the CPU, whether for the
/// first time (from the trampoline) or after being resumed out of
/// cpu_swap_context. Marks this thread Running/Dirty -- it, not
/// sched_yield_continue's dispatch, is what makes a freshly-selected
/// thread's phase CTX_DIRTY -- then finishes the handoff sched_yield
/// started for whichever thread it displaced: clearing its Dirty phase,
/// enqueueing it if it's Ready and not idle, or releasing it if it
/// exited. The outgoing thread's own enqueue is deliberately done here,
/// by the incoming thread, rather than by the outgoing thread itself
/// before the swap: that's what keeps an EXITED TCB safe to free, since
/// by the time this runs the thread that owned it has already been
/// swapped off its stack.
pub fn gain(_preempt: bool) {
    let core_id = ccb::current_core_id();
    let (me, prev) = {
        let mut c = ccb::ccb(core_id).lock();
        let me = c.current.expect("gain with no current thread");
        (me, c.prev.take())
    };

    let mut sched = SCHED.lock();
    {
        let tcb = me.get_mut();
        tcb.state = TcbState::Running;
        tcb.phase = Phase::Dirty;
        tcb.ticks_run = 0;
    }

    let Some(prev) = prev else { return };
    if prev.ptr_eq(&me) {
        return;
    }

    let (prev_state, prev_kind) = {
        let tcb = prev.get_mut();
        tcb.phase = Phase::Clean;
        (tcb.state, tcb.kind)
    };

    match prev_state {
        TcbState::Ready => {
            if prev_kind != TcbKind::Idle {
                let priority = prev.get().priority;
                sched.make_ready(prev, priority);
            }
        }
        TcbState::Stopped => {}
        TcbState::Exited => {
            drop(sched);
            if let Some(owner) = prev.get().owner {
                process::thread_exited(owner);
            }
            active_threads_dec();
            unsafe { tcb::release_tcb(prev) };
            return;
        }
        TcbState::Running | TcbState::Init => {
            unreachable!("gain observed a displaced thread in an impossible state");
        }
    }
}

/// The nine-step yield algorithm: disable preemption, apply the
/// cause-specific state transition to the calling thread, pick the next
/// thread to run, hand off the core to it, and (once resumed) finish
/// the previous handoff via gain(). One DisableInterrupts guard covers
/// the whole call, including the swap and the resumed gain(): dropping
/// it early and re-disabling inside sched_yield_continue would leave a
/// window, after this thread is already linked onto a ready list but
/// still this core's `current`, where a timer tick could re-enter
/// sched_yield on it and push it onto a list a second time.
pub fn sched_yield(cause: Cause) {
    let guard = DisableInterrupts::new();
    let core_id = ccb::current_core_id();
    let me = ccb::ccb(core_id).lock().current.expect("sched_yield with no current thread");

    {
        let mut sched = SCHED.lock();
        apply_cause(&mut sched, me, cause);
    }

    sched_yield_continue(core_id, me, cause == Cause::Quantum);
    drop(guard);
}

/// Applies the cause-specific priority policy and state transition to
/// the calling thread. Never touches a ready list: a Ready-bound thread
/// is left unlinked here and enqueued later, by whichever thread's
/// gain() displaces it, once the context swap has actually happened.
pub(crate) fn apply_cause(sched: &mut super::queue::SchedQueues, me: TcbHandle, cause: Cause) {
    let tcb = me.get_mut();
    match cause {
        Cause::Mutex => {
            // First mutex-induced sleep demotes and remembers the
            // priority to restore; a thread already demoted (still
            // contending after being woken and retrying the lock)
            // is left alone.
            if tcb.saved_priority.is_none() {
                tcb.saved_priority = Some(tcb.priority);
                tcb.priority = LOWEST_PRIORITY;
            }
            tcb.state = TcbState::Stopped;
        }
        Cause::Block => {
            tcb.state = TcbState::Stopped;
        }
        Cause::Exit => {
            tcb.state = TcbState::Exited;
            sched.cancel_timeout(me);
        }
        Cause::Quantum | Cause::Voluntary | Cause::IO | Cause::Idle => {
            // The next yield for any reason other than MUTEX restores
            // whatever priority contention demoted, then applies its
            // own adjustment on top -- a mutex-demoted thread woken by
            // an IO event ends up net +1 over what it held before it
            // ever touched the lock.
            if let Some(saved) = tcb.saved_priority.take() {
                tcb.priority = saved;
            }
            tcb.priority = match cause {
                Cause::Quantum => tcb.priority.saturating_sub(1),
                Cause::IO => tcb.priority.saturating_add(1),
                _ => tcb.priority,
            }
            .clamp(LOWEST_PRIORITY, TOP_PRIORITY);
            tcb.state = TcbState::Ready;
        }
    }
}

/// Picks the next thread to dispatch on `core_id`: pops the highest
/// ready thread (updating the congestion counter), boosts if congestion
/// or the fail-safe period calls for it, and falls back to `fallback`
/// (the calling thread itself, if it's still Ready) or, failing that,
/// this core's idle thread.
pub fn sched_queue_select(sched: &mut super::queue::SchedQueues, core_id: u32, fallback: Option<TcbHandle>) -> TcbHandle {
    let picked = sched.select_ready();
    sched.dispatches_since_boost = sched.dispatches_since_boost.saturating_add(1);

    let congested = sched.congestion() >= super::config::MAX_CONGESTION;
    let fail_safe = sched.dispatches_since_boost >= super::config::FAIL_SAFE_PERIOD;
    if congested || fail_safe {
        boost(sched);
    }

    picked
        .or(fallback)
        .unwrap_or_else(|| ccb::ccb(core_id).lock().idle.expect("core has no idle thread"))
}

/// Resets congestion to 0 and, starting one level below TOP_PRIORITY and
/// descending, drains each level and appends its threads to the level
/// immediately above, incrementing their stored priority. Each level is
/// visited exactly once as a source, so every non-top thread's priority
/// increases by exactly one, never more. The top level is left in place.
/// FIFO order within a level is preserved, since a level is fully
/// drained before anything is appended to it.
pub fn boost(sched: &mut super::queue::SchedQueues) {
    sched.reset_congestion();
    for level in (LOWEST_PRIORITY..TOP_PRIORITY).rev() {
        let mut promoted = Vec::new();
        while let Some(handle) = sched.ready[level as usize].pop_front() {
            promoted.push(handle);
        }
        for handle in promoted {
            sched.make_ready(handle, level + 1);
        }
    }
    sched.dispatches_since_boost = 0;
    log::debug!("scheduler: priority boost");
}

/// Moves a Stopped thread back onto its ready queue at its current
/// priority and cancels any pending timeout. No-op if the thread is not
/// currently Stopped (already running, already ready, or exited).
pub fn wakeup(handle: TcbHandle) {
    let guard = DisableInterrupts::new();
    let mut sched = SCHED.lock();
    let tcb = handle.get_mut();
    if tcb.state != TcbState::Stopped {
        return;
    }
    sched.cancel_timeout(handle);
    let priority = tcb.priority;
    sched.make_ready(handle, priority);
    drop(sched);
    drop(guard);
}

/// Atomically releases an external resource and puts the calling thread
/// to sleep, so a wakeup from another core can never be lost between
/// the release and the thread actually becoming Stopped. `release` runs
/// while SCHED is still held, before the cause-specific transition and
/// the yield that follows it. One guard covers the whole call, for the
/// same reason as sched_yield.
pub fn sleep_releasing<F: FnOnce(&mut super::queue::SchedQueues)>(cause: Cause, release: F) {
    let guard = DisableInterrupts::new();
    let core_id = ccb::current_core_id();
    let me = ccb::ccb(core_id).lock().current.expect("sleep_releasing with no current thread");

    {
        let mut sched = SCHED.lock();
        release(&mut sched);
        apply_cause(&mut sched, me, cause);
    }

    sched_yield_continue(core_id, me, false);
    drop(guard);
}

/// Shared tail of sleep_releasing and a plain sched_yield call once the
/// cause has already been applied: select next, hand off, resume, gain.
/// Called with interrupts already disabled by the caller and expected to
/// return with them still disabled; does not touch the guard itself.
fn sched_yield_continue(core_id: u32, me: TcbHandle, preempt: bool) {
    let mut sched = SCHED.lock();
    let self_ready = (me.get().state == TcbState::Ready).then_some(me);
    let next = sched_queue_select(&mut sched, core_id, self_ready);

    if next.ptr_eq(&me) {
        // Nothing else to run: stay Running without an actual swap.
        let tcb = me.get_mut();
        tcb.state = TcbState::Running;
        tcb.ticks_run = 0;
        return;
    }

    {
        let mut c = ccb::ccb(core_id).lock();
        c.prev = Some(me);
        c.current = Some(next);
    }
    drop(sched);

    unsafe {
        cpu_if::cpu_swap_context(&mut me.get_mut().context as *mut _, &next.get().context as *const _);
    }
    gain(preempt);
}

/// Registers a wakeup timeout for a thread already transitioned to
/// Stopped by the caller, so a blocked thread is guaranteed to resume
/// even if whatever it was waiting for never arrives.
pub fn register_timeout(handle: TcbHandle, deadline_tick: u64) {
    let mut sched = SCHED.lock();
    register_timeout_locked(&mut sched, handle, deadline_tick);
}

/// Same as register_timeout, for callers that already hold SCHED (e.g.
/// a sleep_releasing `release` closure).
pub fn register_timeout_locked(sched: &mut super::queue::SchedQueues, handle: TcbHandle, deadline_tick: u64) {
    sched.register_timeout(handle, deadline_tick);
    cpu_if::bios_set_timer(deadline_tick);
}

/// Called from the timer IRQ handler on every tick. Expires due
/// timeouts (waking their threads) and, if the current thread's
/// quantum is spent, triggers a Quantum-cause yield. Otherwise just
/// counts the tick against the current thread's quantum and returns.
pub fn on_timer_tick() {
    let now = cpu_if::tick();
    let expired = {
        let mut sched = SCHED.lock();
        sched.expire_timeouts(now)
    };
    for handle in expired {
        wakeup(handle);
    }

    let core_id = ccb::current_core_id();
    let me = ccb::ccb(core_id).lock().current.expect("on_timer_tick with no current thread");
    let tcb = me.get_mut();
    tcb.ticks_run += 1;
    if tcb.ticks_run >= super::config::SCHED_QUANTUM as u64 {
        sched_yield(Cause::Quantum);
    }
}

/// Spawns a new kernel thread at `priority`, owned by `owner` if given.
pub fn spawn_thread(
    entry: extern "C" fn(usize) -> !,
    arg: usize,
    priority: u8,
    owner: Option<PcbId>,
) -> SchedResult<TcbHandle> {
    if priority > TOP_PRIORITY {
        return Err(SchedError::InvalidPriority(priority));
    }
    let handle = tcb::spawn_tcb(entry, super::trampoline::thread_trampoline, arg, priority, owner, tcb::TcbKind::Normal)?;
    {
        let mut sched = SCHED.lock();
        sched.make_ready(handle, priority);
    }
    active_threads_inc();
    Ok(handle)
}

pub fn current_thread() -> TcbHandle {
    ccb::ccb(ccb::current_core_id())
        .lock()
        .current
        .expect("current_thread called with no current thread")
}

pub const NO_TIMEOUT_TICK: u64 = NO_TIMEOUT;
