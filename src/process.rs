/*
 * Process Back-Reference
 *
 * The scheduler's only notion of "process" is a back-pointer from a
 * thread to the thing that owns it, used to decrement a live thread
 * count and flag a process-level "a thread of mine exited" condition.
 * Everything a real process needs -- an address space, a file
 * descriptor table, fork/exec -- lives above the scheduler and isn't
 * modeled here.
 */

use alloc::collections::BTreeMap;
use core::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use spin::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PcbId(pub usize);

/// Per-thread exit flag, set when the owning process's last thread
/// exits. A stand-in for the teardown hook a real process layer would
/// hang off thread exit.
pub struct Ptcb {
    pub thread_exited: AtomicBool,
}

pub struct Pcb {
    pub id: PcbId,
    pub thread_count: AtomicUsize,
    pub ptcb: Ptcb,
}

impl Pcb {
    fn new(id: PcbId) -> Self {
        Self {
            id,
            thread_count: AtomicUsize::new(0),
            ptcb: Ptcb { thread_exited: AtomicBool::new(false) },
        }
    }
}

static PCB_TABLE: Mutex<BTreeMap<usize, Pcb>> = Mutex::new(BTreeMap::new());

/// Registers a new owning process and returns its id. The scheduler
/// never calls this itself; it's here so spawn_thread callers have
/// something to hand it an owner.
pub fn register_process() -> PcbId {
    static NEXT_ID: core::sync::atomic::AtomicUsize = core::sync::atomic::AtomicUsize::new(1);
    let id = PcbId(NEXT_ID.fetch_add(1, Ordering::Relaxed));
    PCB_TABLE.lock().insert(id.0, Pcb::new(id));
    id
}

pub fn with_pcb<F: FnOnce(&Pcb)>(id: PcbId, f: F) {
    if let Some(pcb) = PCB_TABLE.lock().get(&id.0) {
        f(pcb);
    }
}

pub fn thread_spawned(id: PcbId) {
    with_pcb(id, |pcb| {
        pcb.thread_count.fetch_add(1, Ordering::AcqRel);
    });
}

/// Called by the scheduler when a thread owned by `id` exits: decrements
/// the owner's live-thread count and, on the last thread, marks the
/// process's PTCB exited.
pub fn thread_exited(id: PcbId) {
    with_pcb(id, |pcb| {
        let remaining = pcb.thread_count.fetch_sub(1, Ordering::AcqRel) - 1;
        if remaining == 0 {
            pcb.ptcb.thread_exited.store(true, Ordering::Release);
        }
    });
}
