/*
 * Scheduler Tunables
 *
 * Every constant here is a heuristic, not a correctness requirement. The
 * scheduler is correct for any positive QUANTUM, any PRIORITY_LISTS >= 1,
 * and any MAX_CONGESTION / FAIL_SAFE_PERIOD >= 1. Changing them changes
 * responsiveness and fairness, never safety.
 */

/// Page size used to size the combined TCB+stack allocation.
pub const PAGE_SIZE: usize = 4096;

/// Stack reserved for each spawned thread, below the TCB page.
pub const THREAD_STACK_SIZE: usize = 64 * 1024;

/// Timer ticks a thread is allowed to run before a quantum-expiry yield.
pub const QUANTUM: u32 = 10;

/// Ticks between fail-safe boosts when nothing else has triggered one.
pub const SCHED_QUANTUM: u32 = QUANTUM;

/// Number of feedback priority levels, indexed 0..PRIORITY_LISTS.
pub const PRIORITY_LISTS: usize = 32;

/// Highest (most favored) priority level.
pub const TOP_PRIORITY: u8 = (PRIORITY_LISTS - 1) as u8;

/// Lowest (least favored) priority level.
pub const LOWEST_PRIORITY: u8 = 0;

/// Congestion counter threshold, at or above which sched_queue_select
/// treats the lower levels as starving and triggers a boost.
pub const MAX_CONGESTION: usize = 10;

/// Number of dispatches between forced priority boosts, regardless of
/// congestion. Guards against starvation if congestion never trips.
pub const FAIL_SAFE_PERIOD: u32 = 500;

/// Sentinel meaning "no timeout armed" in a TCB's timeout_at field.
pub const NO_TIMEOUT: u64 = u64::MAX;

/// Size of the per-core control block table. Only core 0 is brought up
/// today; the table is sized for the eventual AP bring-up.
pub const MAX_CORES: usize = 4;
