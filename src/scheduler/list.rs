/*
 * Intrusive TCB List
 *
 * Every TCB carries its own prev/next links, so moving it between the
 * ready queues, the timeout list, and "off all lists" is a pointer
 * fix-up, never an allocation. A TCB can only be threaded onto one list
 * at a time; `Tcb::list_id` records which one, and is the debug check
 * that catches a TCB being pushed onto a second list while still linked
 * into a first.
 *
 * Handles are stable for the TCB's entire lifetime: `TcbHandle` is a
 * `NonNull` pointing at the single heap allocation backing the TCB and
 * its stack (see tcb.rs), so holding a handle across a list removal and
 * a later re-insertion is always valid as long as the TCB hasn't been
 * released.
 */

use super::tcb::{ListId, Tcb, TcbHandle};

#[derive(Debug)]
pub struct TcbList {
    head: Option<TcbHandle>,
    tail: Option<TcbHandle>,
    len: usize,
    id: ListId,
}

impl TcbList {
    pub const fn new(id: ListId) -> Self {
        Self { head: None, tail: None, len: 0, id }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Links `handle` onto the tail of this list. Panics if the TCB is
    /// already on a list -- callers must remove before re-adding.
    pub fn push_back(&mut self, handle: TcbHandle) {
        let tcb = handle.get_mut();
        debug_assert!(tcb.list_id == ListId::None, "TCB pushed onto a list while already linked");
        tcb.prev = self.tail;
        tcb.next = None;
        tcb.list_id = self.id;
        match self.tail {
            Some(mut tail) => tail.get_mut().next = Some(handle),
            None => self.head = Some(handle),
        }
        self.tail = Some(handle);
        self.len += 1;
    }

    pub fn pop_front(&mut self) -> Option<TcbHandle> {
        let head = self.head?;
        self.remove(head);
        Some(head)
    }

    /// Unlinks `handle` from this list. `handle` must currently belong
    /// to this list; a debug build checks `list_id` to catch it being
    /// unlinked from the wrong list.
    pub fn remove(&mut self, handle: TcbHandle) {
        let tcb = handle.get_mut();
        debug_assert!(tcb.list_id == self.id, "TCB removed from a list it isn't linked to");
        match tcb.prev {
            Some(mut prev) => prev.get_mut().next = tcb.next,
            None => self.head = tcb.next,
        }
        match tcb.next {
            Some(mut next) => next.get_mut().prev = tcb.prev,
            None => self.tail = tcb.prev,
        }
        tcb.prev = None;
        tcb.next = None;
        tcb.list_id = ListId::None;
        self.len -= 1;
    }

    pub fn iter(&self) -> ListIter {
        ListIter { next: self.head }
    }

    /// Links `handle` immediately before `before`, which must currently
    /// belong to this list.
    pub fn insert_before(&mut self, handle: TcbHandle, before: TcbHandle) {
        let before_tcb = before.get_mut();
        debug_assert!(before_tcb.list_id == self.id);
        let prev = before_tcb.prev;
        let tcb = handle.get_mut();
        tcb.prev = prev;
        tcb.next = Some(before);
        tcb.list_id = self.id;
        before_tcb.prev = Some(handle);
        match prev {
            Some(mut p) => p.get_mut().next = Some(handle),
            None => self.head = Some(handle),
        }
        self.len += 1;
    }

    pub fn front(&self) -> Option<TcbHandle> {
        self.head
    }
}

pub struct ListIter {
    next: Option<TcbHandle>,
}

impl Iterator for ListIter {
    type Item = TcbHandle;
    fn next(&mut self) -> Option<TcbHandle> {
        let cur = self.next?;
        self.next = cur.get().next;
        Some(cur)
    }
}

/// Helper used only by list.rs and tcb.rs: mutable/shared access through
/// a handle without threading a lifetime everywhere. Safe because every
/// access happens with sched_spinlock held (see queue.rs), which is the
/// only lock that ever touches list linkage.
impl TcbHandle {
    pub(super) fn get(&self) -> &Tcb {
        unsafe { self.0.as_ref() }
    }

    pub(super) fn get_mut(&self) -> &mut Tcb {
        unsafe { &mut *self.0.as_ptr() }
    }
}
