/*
 * Scheduler Error Types
 *
 * Scheduler-internal failures are all fatal: there is no recovery path
 * for a corrupt ready queue or a failed TCB allocation. Call sites log
 * the error and panic rather than propagate it further, but it is
 * still a typed `Result` up to that point so the failure is named.
 */

use core::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// The combined TCB+stack allocation failed.
    OutOfMemory,
    /// A priority value fell outside [LOWEST_PRIORITY, TOP_PRIORITY].
    InvalidPriority(u8),
    /// A core id was outside the CCB table bounds.
    CoreOutOfRange(u32),
    /// sched_queue_select found every priority list empty and no idle
    /// thread registered for the core -- should be unreachable.
    NoRunnableThread,
    /// A handle no longer refers to a live TCB (use-after-release).
    StaleHandle,
}

impl fmt::Display for SchedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SchedError::OutOfMemory => write!(f, "out of memory allocating thread control block"),
            SchedError::InvalidPriority(p) => write!(f, "invalid priority {}", p),
            SchedError::CoreOutOfRange(c) => write!(f, "core id {} out of range", c),
            SchedError::NoRunnableThread => write!(f, "no runnable thread and no idle thread for core"),
            SchedError::StaleHandle => write!(f, "stale thread control block handle"),
        }
    }
}

pub type SchedResult<T> = Result<T, SchedError>;
