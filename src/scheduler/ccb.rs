/*
 * Core Control Block
 *
 * One CCB per physical core: which TCB it's currently running, its
 * idle thread, and per-core dispatch counters. The table is sized to
 * MAX_CORES so the scheduler's data structures don't change shape the
 * day AP bring-up lands; today only ccb(0) is ever touched, since
 * cpu_core_restart_one/all are stubs (see cpu_if.rs).
 */

use lazy_static::lazy_static;
use spin::Mutex;

use super::config::MAX_CORES;
use super::tcb::TcbHandle;

pub struct Ccb {
    pub core_id: u32,
    pub current: Option<TcbHandle>,
    pub idle: Option<TcbHandle>,
    /// Thread this core is mid-handoff away from; consumed by the next
    /// call to gain() on this core, whichever thread makes it.
    pub prev: Option<TcbHandle>,
    pub online: bool,
}

impl Ccb {
    const fn new(core_id: u32) -> Self {
        Self { core_id, current: None, idle: None, prev: None, online: false }
    }
}

unsafe impl Send for Ccb {}

lazy_static! {
    pub static ref CCB_TABLE: [Mutex<Ccb>; MAX_CORES] =
        core::array::from_fn(|i| Mutex::new(Ccb::new(i as u32)));
}

pub fn ccb(core_id: u32) -> &'static Mutex<Ccb> {
    &CCB_TABLE[core_id as usize]
}

/// The core this code is currently executing on. Single-core today.
pub fn current_core_id() -> u32 {
    0
}
