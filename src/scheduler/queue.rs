/*
 * Ready Queues and Timeout List
 *
 * Everything that participates in scheduling decisions -- the
 * per-priority ready lists, the sorted timeout list, and the handful of
 * TCB scheduling fields (state, priority, timeout_at, list_id) -- lives
 * behind a single spinlock, `SCHED`. The design note this follows: two
 * spinlocks that are never held together are easier to reason about
 * than one spinlock with a complicated internal structure, and here
 * there is exactly one piece of state (the scheduling state), so one
 * lock covers it.
 *
 * The timeout list is kept sorted by deadline on insertion so
 * `expire_timeouts` only ever looks at a prefix of it.
 */

use spin::Mutex;

use super::config::{NO_TIMEOUT, PRIORITY_LISTS};
use super::list::TcbList;
use super::tcb::{ListId, TcbHandle, TcbState};

pub struct SchedQueues {
    pub ready: [TcbList; PRIORITY_LISTS],
    pub timeout: TcbList,
    /// Threads dispatched since the last boost; used for the fail-safe
    /// boost trigger alongside congestion.
    pub dispatches_since_boost: u32,
    /// Starvation-pressure estimate (clamped >= 0): incremented whenever
    /// a dispatch is picked above a non-empty lower level, decremented
    /// otherwise. Reset to 0 by `boost`.
    congestion: usize,
}

impl SchedQueues {
    /// Builds a standalone queue set, independent of the global SCHED
    /// lock. Used by sched_tests to exercise queue logic without
    /// touching live per-core scheduling state.
    pub(crate) fn new_for_test() -> Self {
        Self::new()
    }

    const fn new() -> Self {
        Self {
            ready: [
                TcbList::new(ListId::Ready(0)),
                TcbList::new(ListId::Ready(1)),
                TcbList::new(ListId::Ready(2)),
                TcbList::new(ListId::Ready(3)),
                TcbList::new(ListId::Ready(4)),
                TcbList::new(ListId::Ready(5)),
                TcbList::new(ListId::Ready(6)),
                TcbList::new(ListId::Ready(7)),
                TcbList::new(ListId::Ready(8)),
                TcbList::new(ListId::Ready(9)),
                TcbList::new(ListId::Ready(10)),
                TcbList::new(ListId::Ready(11)),
                TcbList::new(ListId::Ready(12)),
                TcbList::new(ListId::Ready(13)),
                TcbList::new(ListId::Ready(14)),
                TcbList::new(ListId::Ready(15)),
                TcbList::new(ListId::Ready(16)),
                TcbList::new(ListId::Ready(17)),
                TcbList::new(ListId::Ready(18)),
                TcbList::new(ListId::Ready(19)),
                TcbList::new(ListId::Ready(20)),
                TcbList::new(ListId::Ready(21)),
                TcbList::new(ListId::Ready(22)),
                TcbList::new(ListId::Ready(23)),
                TcbList::new(ListId::Ready(24)),
                TcbList::new(ListId::Ready(25)),
                TcbList::new(ListId::Ready(26)),
                TcbList::new(ListId::Ready(27)),
                TcbList::new(ListId::Ready(28)),
                TcbList::new(ListId::Ready(29)),
                TcbList::new(ListId::Ready(30)),
                TcbList::new(ListId::Ready(31)),
            ],
            timeout: TcbList::new(ListId::Timeout),
            dispatches_since_boost: 0,
            congestion: 0,
        }
    }

    pub fn congestion(&self) -> usize {
        self.congestion
    }

    pub fn reset_congestion(&mut self) {
        self.congestion = 0;
    }

    /// Links `handle` onto the ready list for `priority` and marks it Ready.
    pub fn make_ready(&mut self, handle: TcbHandle, priority: u8) {
        let tcb = handle.get_mut();
        tcb.state = TcbState::Ready;
        tcb.priority = priority;
        self.ready[priority as usize].push_back(handle);
    }

    /// Pops the highest-priority ready thread, updating the congestion
    /// counter: a pick made while a lower level is still non-empty means
    /// that lower level is starving, so congestion rises; a pick from
    /// the bottom level, or no pick at all, means it falls.
    pub fn select_ready(&mut self) -> Option<TcbHandle> {
        let mut picked = None;
        for level in (0..PRIORITY_LISTS).rev() {
            if let Some(handle) = self.ready[level].pop_front() {
                picked = Some((handle, level));
                break;
            }
        }
        let starving = match picked {
            Some((_, level)) if level > 0 => (0..level).any(|l| !self.ready[l].is_empty()),
            _ => false,
        };
        if starving {
            self.congestion += 1;
        } else {
            self.congestion = self.congestion.saturating_sub(1);
        }
        picked.map(|(handle, _)| handle)
    }

    /// Inserts `handle` into the timeout list, sorted by deadline ascending.
    pub fn register_timeout(&mut self, handle: TcbHandle, deadline: u64) {
        handle.get_mut().timeout_at = deadline;
        let insert_before = self.timeout.iter().find(|c| c.get().timeout_at > deadline);
        match insert_before {
            Some(before) => self.timeout.insert_before(handle, before),
            None => self.timeout.push_back(handle),
        }
    }

    pub fn cancel_timeout(&mut self, handle: TcbHandle) {
        if handle.get().list_id == ListId::Timeout {
            self.timeout.remove(handle);
        }
        handle.get_mut().timeout_at = NO_TIMEOUT;
    }

    /// Removes and returns every TCB whose deadline is <= `now`, in
    /// deadline order.
    pub fn expire_timeouts(&mut self, now: u64) -> alloc::vec::Vec<TcbHandle> {
        let mut expired = alloc::vec::Vec::new();
        while let Some(front) = self.timeout.front() {
            if front.get().timeout_at > now {
                break;
            }
            self.timeout.remove(front);
            front.get_mut().timeout_at = NO_TIMEOUT;
            expired.push(front);
        }
        expired
    }
}

unsafe impl Send for SchedQueues {}

pub static SCHED: Mutex<SchedQueues> = Mutex::new(SchedQueues::new());
