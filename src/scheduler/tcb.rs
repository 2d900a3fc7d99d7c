/*
 * Thread Control Block
 *
 * A TCB and its stack live in one allocation: the TCB occupies the
 * first (page-rounded) part, the stack the rest, so spawn_thread is a
 * single alloc and release_tcb a single dealloc. `TcbHandle` is a
 * `NonNull<Tcb>` into that allocation -- it is the stable handle the
 * rest of the scheduler threads through lists and queues instead of a
 * borrow, because a TCB routinely outlives the stack frame that
 * created it.
 *
 * Every TCB belongs to at most one list at a time (see list.rs); moving
 * between ready queues, the timeout list, and "currently running" is
 * always a pointer fix-up, never a copy.
 */

use alloc::alloc::{alloc, dealloc, Layout};
use core::ptr::NonNull;

use super::config::{NO_TIMEOUT, PAGE_SIZE, THREAD_STACK_SIZE};
use super::cpu_if::CpuContext;
use crate::process::PcbId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListId {
    None,
    Ready(u8),
    Timeout,
    MutexWait,
}

/// A TCB's kind, fixed at spawn time. Idle TCBs are never released and
/// never enqueued onto a ready list by `gain` -- a core always has
/// something to dispatch to even when it has nothing else ready.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcbKind {
    Normal,
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TcbState {
    /// Allocated, context primed, not yet linked onto a ready queue.
    Init,
    Ready,
    Running,
    Stopped,
    Exited,
}

/// Whether a core currently owns this TCB's machine context. A TCB is
/// CTX_DIRTY on the core it last ran on until that core completes
/// `gain` after swapping away from it, and CTX_CLEAN afterwards. An
/// EXITED TCB must be CTX_CLEAN (its former core has finished gain)
/// before release_tcb may free it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Clean,
    Dirty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcbHandle(pub(super) NonNull<Tcb>);

unsafe impl Send for TcbHandle {}
unsafe impl Sync for TcbHandle {}

pub struct Tcb {
    pub prev: Option<TcbHandle>,
    pub next: Option<TcbHandle>,
    pub list_id: ListId,

    pub state: TcbState,
    pub phase: Phase,
    pub kind: TcbKind,

    /// Current feedback-queue priority, always in [LOWEST_PRIORITY, TOP_PRIORITY].
    pub priority: u8,
    /// Priority to restore to once a mutex-induced demotion ends.
    pub saved_priority: Option<u8>,

    /// Absolute tick deadline, or NO_TIMEOUT if none is armed.
    pub timeout_at: u64,

    pub context: CpuContext,

    pub owner: Option<PcbId>,

    /// Timer ticks charged against this dispatch's quantum; reset to 0
    /// each time the thread is selected to run.
    pub ticks_run: u64,
    pub last_core: u32,

    stack_alloc: NonNull<u8>,
    stack_layout: Layout,
}

impl Tcb {
    pub fn is_on_list(&self) -> bool {
        self.list_id != ListId::None
    }
}

impl TcbHandle {
    pub fn ptr_eq(&self, other: &TcbHandle) -> bool {
        self.0 == other.0
    }
}

/// Builds the combined TCB+stack allocation and returns a handle with
/// the context primed to start at `entry(arg)` via `trampoline`, ready
/// to be swapped onto a core for the first time.
pub fn spawn_tcb(
    entry: extern "C" fn(usize) -> !,
    trampoline: extern "C" fn() -> !,
    arg: usize,
    priority: u8,
    owner: Option<PcbId>,
    kind: TcbKind,
) -> super::error::SchedResult<TcbHandle> {
    let tcb_region = round_up(core::mem::size_of::<Tcb>(), PAGE_SIZE);
    let total = tcb_region + THREAD_STACK_SIZE;
    let layout = Layout::from_size_align(total, PAGE_SIZE).map_err(|_| super::error::SchedError::OutOfMemory)?;

    let base = unsafe { alloc(layout) };
    let base = NonNull::new(base).ok_or(super::error::SchedError::OutOfMemory)?;

    let stack_top = unsafe { base.as_ptr().add(total) };

    let tcb_ptr = base.cast::<Tcb>();
    let mut context = CpuContext::default();
    super::cpu_if::cpu_initialize_context(&mut context, stack_top, trampoline, entry, arg);

    unsafe {
        tcb_ptr.as_ptr().write(Tcb {
            prev: None,
            next: None,
            list_id: ListId::None,
            state: TcbState::Init,
            phase: Phase::Clean,
            kind,
            priority,
            saved_priority: None,
            timeout_at: NO_TIMEOUT,
            context,
            owner,
            ticks_run: 0,
            last_core: 0,
            stack_alloc: base,
            stack_layout: layout,
        });
    }

    Ok(TcbHandle(tcb_ptr))
}

/// Frees a TCB's backing allocation. Caller must have already verified
/// the TCB is Exited and Clean (see gain()): a Dirty TCB's context may
/// still be the one a core is about to swap into.
pub unsafe fn release_tcb(handle: TcbHandle) {
    let tcb = handle.get();
    debug_assert_eq!(tcb.state, TcbState::Exited);
    debug_assert_eq!(tcb.phase, Phase::Clean);
    debug_assert!(!tcb.is_on_list());
    let (alloc_ptr, layout) = (tcb.stack_alloc, tcb.stack_layout);
    unsafe {
        core::ptr::drop_in_place(handle.0.as_ptr());
        dealloc(alloc_ptr.as_ptr(), layout);
    }
}

fn round_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}
