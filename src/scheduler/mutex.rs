/*
 * Scheduler-Aware Mutex
 *
 * KMutex is the external Mutex_Lock/Unlock/MUTEX_INIT interface the
 * scheduler core calls into (see core::sleep_releasing). It is not a
 * general-purpose lock for the rest of the kernel: contention here goes
 * through sleep_releasing with Cause::Mutex, which demotes the waiter to
 * LOWEST_PRIORITY for as long as it sits blocked on the lock. The
 * restore back to its prior priority happens on its own next apply_cause
 * call, not here in unlock() -- by the time unlock() wakes a waiter, the
 * waiter hasn't resumed yet, so there is nothing to restore until it
 * actually yields again for some other reason. That demote is the
 * simple, non-transitive substitute for priority inheritance described
 * in the scheduler's scope: it stops a low-priority holder from being
 * starved off the CPU while it holds a lock someone else wants, but it
 * does not chase the dependency chain any further.
 */

use spin::Mutex as RawSpinlock;

use super::core::{sleep_releasing, wakeup, Cause};
use super::list::TcbList;
use super::tcb::{ListId, TcbHandle};

struct Inner {
    locked: bool,
    owner: Option<TcbHandle>,
    waiters: TcbList,
}

pub struct KMutex {
    inner: RawSpinlock<Inner>,
}

impl KMutex {
    pub const fn new() -> Self {
        Self {
            inner: RawSpinlock::new(Inner { locked: false, owner: None, waiters: TcbList::new(ListId::MutexWait) }),
        }
    }

    pub fn lock(&self) {
        loop {
            let mut inner = self.inner.lock();
            if !inner.locked {
                inner.locked = true;
                inner.owner = Some(super::core::current_thread());
                return;
            }

            let me = super::core::current_thread();
            inner.waiters.push_back(me);

            // Keep holding `inner` until we're under SCHED and about to
            // be marked Stopped, and only then drop it as the "release"
            // step: otherwise unlock() could pop us off `waiters` and
            // call wakeup() before we've actually gone to sleep, and the
            // wakeup would be lost.
            sleep_releasing(Cause::Mutex, move |_sched| {
                drop(inner);
            });
            // Woken by unlock(); loop around to retry acquiring.
        }
    }

    pub fn unlock(&self) {
        // Wake-and-retry, not a handoff: clear the lock, wake the oldest
        // waiter, and let it re-contend through the normal lock() loop.
        // A handoff would need the woken thread's lock() to recognize it
        // already owns the lock instead of checking `locked` again.
        let waiter = {
            let mut inner = self.inner.lock();
            inner.locked = false;
            inner.owner = None;
            inner.waiters.pop_front()
        };
        if let Some(waiter) = waiter {
            wakeup(waiter);
        }
    }
}

impl Default for KMutex {
    fn default() -> Self {
        Self::new()
    }
}
