/*
 * Scheduler Self-Tests
 *
 * Runtime assertions exercised from the kernel's boot-time test menu
 * (see tests/mod.rs), not a hosted `cargo test` suite -- this is a
 * no_std, no_main binary with no such harness. Each function builds
 * scheduler state directly and asserts on it; a failure panics through
 * the kernel panic handler exactly like any other kernel assertion.
 *
 * These stay at the data-structure level (ready queues, timeout list,
 * cause application, mutex priority bookkeeping) rather than driving a
 * real dispatch through cpu_swap_context, since the latter needs a
 * live core with its idle thread actually running the test -- the
 * fixture a hosted test runner would give you for free.
 */

use super::config::{LOWEST_PRIORITY, NO_TIMEOUT, TOP_PRIORITY};
use super::core::{self, Cause};
use super::queue::SchedQueues;
use super::tcb::{self, TcbKind, TcbState};

extern "C" fn test_thread_entry(_arg: usize) -> ! {
    loop {
        core::current_thread();
    }
}

fn spawn_test_tcb(priority: u8) -> tcb::TcbHandle {
    tcb::spawn_tcb(test_thread_entry, super::trampoline::thread_trampoline, 0, priority, None, TcbKind::Normal)
        .expect("test TCB allocation failed")
}

/// Higher-priority ready threads are always dispatched before lower
/// ones, and FIFO order is preserved among threads at the same level.
pub fn test_ready_queue_priority_order() {
    let mut queues = SchedQueues::new_for_test();
    let low = spawn_test_tcb(0);
    let high_a = spawn_test_tcb(TOP_PRIORITY);
    let high_b = spawn_test_tcb(TOP_PRIORITY);

    queues.make_ready(low, 0);
    queues.make_ready(high_a, TOP_PRIORITY);
    queues.make_ready(high_b, TOP_PRIORITY);

    assert!(queues.select_ready().unwrap().ptr_eq(&high_a), "expected FIFO: first high-priority thread enqueued runs first");
    assert!(queues.select_ready().unwrap().ptr_eq(&high_b), "expected second high-priority thread next");
    assert!(queues.select_ready().unwrap().ptr_eq(&low), "low priority thread should only run once the high list is empty");
    assert!(queues.select_ready().is_none(), "all threads drained, list should be empty");

    log::info!("sched_tests: ready queue priority order OK");
}

/// A Quantum-cause yield demotes the thread one level (floored at
/// LOWEST_PRIORITY) and re-enqueues it at the new level.
pub fn test_quantum_demotion() {
    let mut queues = SchedQueues::new_for_test();
    let mid = spawn_test_tcb(2);

    core::apply_cause(&mut queues, mid, Cause::Quantum);
    assert_eq!(mid.get().priority, 1, "quantum expiry should demote by one level");
    assert_eq!(mid.get().state, TcbState::Ready);

    // Demoting from LOWEST_PRIORITY must clamp, not wrap.
    let floor = spawn_test_tcb(LOWEST_PRIORITY);
    core::apply_cause(&mut queues, floor, Cause::Quantum);
    assert_eq!(floor.get().priority, LOWEST_PRIORITY, "priority must not underflow past LOWEST_PRIORITY");

    log::info!("sched_tests: quantum demotion OK");
}

/// Registering timeouts out of order yields a list sorted ascending by
/// deadline, and expire_timeouts only returns the prefix that is due.
pub fn test_timeout_ordering() {
    let mut queues = SchedQueues::new_for_test();
    let a = spawn_test_tcb(0);
    let b = spawn_test_tcb(0);
    let c = spawn_test_tcb(0);

    queues.register_timeout(b, 200);
    queues.register_timeout(a, 100);
    queues.register_timeout(c, 300);

    let due = queues.expire_timeouts(250);
    assert_eq!(due.len(), 2, "only the two earliest deadlines should be due");
    assert!(due[0].ptr_eq(&a));
    assert!(due[1].ptr_eq(&b));
    assert_eq!(a.get().timeout_at, NO_TIMEOUT);
    assert_eq!(c.get().timeout_at, 300, "deadline not yet due must stay armed");

    log::info!("sched_tests: timeout ordering OK");
}

/// An Exit-cause transition marks the TCB Exited, drops any timeout,
/// and never leaves it linked onto a list.
pub fn test_exit_transition() {
    let mut queues = SchedQueues::new_for_test();
    let t = spawn_test_tcb(1);
    queues.register_timeout(t, 500);

    core::apply_cause(&mut queues, t, Cause::Exit);

    assert_eq!(t.get().state, TcbState::Exited);
    assert_eq!(t.get().timeout_at, NO_TIMEOUT, "exiting must cancel a pending timeout");
    assert!(!t.get().is_on_list(), "an exited thread must not remain linked on any list");

    log::info!("sched_tests: exit transition OK");
}

/// A boost raises every ready thread below TOP_PRIORITY by exactly one
/// level, never straight to TOP_PRIORITY, and leaves a thread already at
/// TOP_PRIORITY in place.
pub fn test_priority_boost_cascade() {
    let mut queues = SchedQueues::new_for_test();
    let a = spawn_test_tcb(TOP_PRIORITY - 2);
    let b = spawn_test_tcb(TOP_PRIORITY - 1);
    let c = spawn_test_tcb(TOP_PRIORITY);
    queues.make_ready(a, TOP_PRIORITY - 2);
    queues.make_ready(b, TOP_PRIORITY - 1);
    queues.make_ready(c, TOP_PRIORITY);

    core::boost(&mut queues);

    assert_eq!(a.get().priority, TOP_PRIORITY - 1, "boost raises a thread by exactly one level");
    assert_eq!(b.get().priority, TOP_PRIORITY, "a thread one below TOP_PRIORITY lands at TOP_PRIORITY");
    assert_eq!(c.get().priority, TOP_PRIORITY, "a thread already at TOP_PRIORITY is left in place");
    assert_eq!(queues.congestion(), 0, "boost resets the congestion counter");

    log::info!("sched_tests: priority boost cascade OK");
}

/// select_ready raises the congestion counter whenever it dispatches
/// above a non-empty lower level (starvation pressure), and lowers it
/// again once the bottom level is what gets picked.
pub fn test_congestion_counter() {
    let mut queues = SchedQueues::new_for_test();
    let low = spawn_test_tcb(0);
    let high = spawn_test_tcb(TOP_PRIORITY);
    queues.make_ready(low, 0);
    queues.make_ready(high, TOP_PRIORITY);

    queues.select_ready();
    assert_eq!(queues.congestion(), 1, "dispatching over a non-empty lower level raises congestion");

    queues.select_ready();
    assert_eq!(queues.congestion(), 0, "dispatching the bottom level relieves congestion");

    log::info!("sched_tests: congestion counter OK");
}

/// A thread that contends for a held KMutex is demoted to
/// LOWEST_PRIORITY and has its prior priority saved. The restore does
/// not happen inside the mutex code: it happens the next time the
/// thread's own priority-policy cause runs, combined with that cause's
/// own adjustment.
pub fn test_mutex_priority_save_restore() {
    let mut queues = SchedQueues::new_for_test();
    let t = spawn_test_tcb(5);

    core::apply_cause(&mut queues, t, Cause::Mutex);
    assert_eq!(t.get().priority, LOWEST_PRIORITY, "contending for a held mutex demotes to LOWEST_PRIORITY");
    assert_eq!(t.get().saved_priority, Some(5));
    assert_eq!(t.get().state, TcbState::Stopped);

    // Woken by unlock(), but blocks on I/O again before it gets to retry the lock.
    core::apply_cause(&mut queues, t, Cause::IO);
    assert_eq!(t.get().priority, 6, "restored to 5, then incremented to 6 by the IO rule");
    assert!(t.get().saved_priority.is_none());

    log::info!("sched_tests: mutex priority save/restore OK");
}

pub fn run_all() {
    test_ready_queue_priority_order();
    test_quantum_demotion();
    test_timeout_ordering();
    test_exit_transition();
    test_priority_boost_cascade();
    test_congestion_counter();
    test_mutex_priority_save_restore();
    log::info!("sched_tests: all scheduler self-tests passed");
}
