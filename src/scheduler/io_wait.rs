/*
 * Generic I/O Wait Queue System
 *
 * Gives any device driver a way to block a thread until an interrupt
 * handler says otherwise, built entirely on the same wakeup/sleep_releasing
 * primitives the scheduler core uses for timeouts and KMutex. A driver
 * picks (or adds) an IoChannel, calls wait_for_io(channel) from thread
 * context to block, and wake_io_waiters(channel) from its ISR to wake
 * everyone waiting.
 *
 * ## Usage
 *
 * Thread context:
 * ```ignore
 * if !device_has_data() {
 *     wait_for_io(IoChannel::Serial(0));
 * }
 * ```
 *
 * Interrupt context:
 * ```ignore
 * pub fn serial_interrupt_handler() {
 *     buffer_push(read_serial_port());
 *     wake_io_waiters(IoChannel::Serial(0));
 * }
 * ```
 */

use alloc::collections::BTreeMap;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};
use spin::Mutex;

use super::core::{current_thread, sleep_releasing, wakeup, Cause};
use super::tcb::TcbHandle;

/// I/O channel identifier
///
/// Each hardware device or event source has a unique channel.
/// Threads wait on channels, and interrupts wake threads on channels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IoChannel {
    /// Keyboard input (PS/2 or USB)
    Keyboard,

    /// Serial port (COM1=0, COM2=1, etc.)
    Serial(u8),

    /// Timer/clock events
    Timer,

    /// Disk I/O (drive number)
    Disk(u8),

    /// Network interface (NIC number)
    Network(u8),

    /// Generic device (for custom drivers)
    Device(u32),
}

/// Wait queue for a single I/O channel. Waiters here are not on any
/// TcbList -- they're Stopped via sleep_releasing, same as a thread
/// blocked on a KMutex, and this Vec is only how wake_io_waiters finds
/// them again.
struct WaitQueue {
    waiting_threads: Vec<TcbHandle>,
}

impl WaitQueue {
    fn new() -> Self {
        Self {
            waiting_threads: Vec::new(),
        }
    }

    fn add_waiter(&mut self, handle: TcbHandle) {
        if !self.waiting_threads.iter().any(|h| h.ptr_eq(&handle)) {
            self.waiting_threads.push(handle);
        }
    }

    /// Wake all waiting threads and clear the queue
    fn wake_all(&mut self) -> Vec<TcbHandle> {
        let threads = self.waiting_threads.clone();
        self.waiting_threads.clear();
        threads
    }

    fn is_empty(&self) -> bool {
        self.waiting_threads.is_empty()
    }
}

/// Global wait queue registry
/// Maps I/O channels to their wait queues
static IO_WAIT_QUEUES: Mutex<BTreeMap<IoChannel, WaitQueue>> = Mutex::new(BTreeMap::new());

/// I/O wait system initialization flag
static IO_WAIT_INIT: AtomicBool = AtomicBool::new(false);

/// Initialize the I/O wait queue system
pub fn init() {
    IO_WAIT_INIT.store(true, Ordering::SeqCst);
    log::info!("I/O wait queue system initialized");
}

/// Blocks the current thread until an event occurs on `channel`.
///
/// Registers into the channel's wait queue, then blocks through
/// sleep_releasing exactly like KMutex::lock: the wait queue's own
/// guard is held until we're under SCHED and about to go Stopped, and
/// only dropped from inside the release closure. Dropping it any
/// earlier would let wake_io_waiters run on another core, see us in
/// the queue, and call wakeup() before we're actually asleep -- a lost
/// wakeup that would block this thread forever.
pub fn wait_for_io(channel: IoChannel) {
    if !IO_WAIT_INIT.load(Ordering::Acquire) {
        log::warn!("wait_for_io called before I/O wait system initialized");
        return;
    }

    let me = current_thread();
    let mut queues = IO_WAIT_QUEUES.lock();
    queues.entry(channel).or_insert_with(WaitQueue::new).add_waiter(me);

    sleep_releasing(Cause::IO, move |_sched| {
        drop(queues);
    });
    // Woken by wake_io_waiters(); the event has occurred.
}

/// Wake all threads waiting on a specific I/O channel
///
/// This function is called from interrupt handlers when I/O events occur.
/// It wakes all threads that are blocked waiting for this channel.
///
/// # IRQ Safety
/// This function is IRQ-safe and can be called from interrupt handlers.
pub fn wake_io_waiters(channel: IoChannel) {
    if !IO_WAIT_INIT.load(Ordering::Acquire) {
        return;
    }

    let threads_to_wake = {
        let mut queues = IO_WAIT_QUEUES.lock();
        if let Some(wait_queue) = queues.get_mut(&channel) {
            wait_queue.wake_all()
        } else {
            Vec::new()
        }
    };

    for handle in threads_to_wake {
        wakeup(handle);
    }
}

/// Check if any threads are waiting on a channel
///
/// Useful for debugging and diagnostics.
pub fn has_waiters(channel: IoChannel) -> bool {
    if !IO_WAIT_INIT.load(Ordering::Acquire) {
        return false;
    }

    let queues = IO_WAIT_QUEUES.lock();
    queues.get(&channel)
        .map(|wq| !wq.is_empty())
        .unwrap_or(false)
}

/// Count of threads waiting on a channel
pub fn waiter_count(channel: IoChannel) -> usize {
    if !IO_WAIT_INIT.load(Ordering::Acquire) {
        return 0;
    }

    let queues = IO_WAIT_QUEUES.lock();
    queues.get(&channel).map(|wq| wq.waiting_threads.len()).unwrap_or(0)
}
