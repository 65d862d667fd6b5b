//! Pool priority and job state types

use core::fmt;

/// Scheduling class of a thread pool's workers
///
/// Pools are keyed by `(Priority, Option<CpuId>)`. The runtime maps the
/// class onto an OS niceness where the host permits it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Priority {
    /// Latency-critical kernel work (softint-like)
    Critical = 0,

    /// Kernel threads that service I/O completion
    High = 1,

    /// Default class for general jobs
    #[default]
    Normal = 2,

    /// Background work such as speculative prefetch
    Low = 3,
}

impl Priority {
    /// Every class, most urgent first
    pub const ALL: [Priority; 4] = [
        Priority::Critical,
        Priority::High,
        Priority::Normal,
        Priority::Low,
    ];

    /// Number of priority classes
    pub const COUNT: usize = Self::ALL.len();

    /// Slot in per-priority tables
    #[inline]
    pub const fn as_index(&self) -> usize {
        *self as u8 as usize
    }

    /// OS niceness requested for threads of this class.
    ///
    /// Raising priority (negative values) usually needs privileges; the
    /// runtime treats the value as best-effort.
    #[inline]
    pub const fn nice(&self) -> i32 {
        match self {
            Priority::Critical => -10,
            Priority::High => -5,
            Priority::Normal => 0,
            Priority::Low => 10,
        }
    }

    /// Short tag used in pool thread names
    pub const fn tag(&self) -> &'static str {
        match self {
            Priority::Critical => "crit",
            Priority::High => "high",
            Priority::Normal => "norm",
            Priority::Low => "low",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// State of a thread pool job
///
/// ```text
///   Idle --schedule--> Scheduled --worker--> Running --job_done--> Idle
///     ^                    |
///     +---cancel_async-----+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum JobState {
    /// Not queued and not running
    Idle = 0,

    /// Queued on a pool, no worker has claimed it yet
    Scheduled = 1,

    /// A worker holds it and the callback is executing
    Running = 2,

    /// A canceller is waiting for the current run to finish
    Cancelling = 3,
}

impl JobState {
    /// Check whether the job is queued or executing
    #[inline]
    pub const fn is_busy(&self) -> bool {
        !matches!(self, JobState::Idle)
    }

    /// Check whether a worker is executing the callback
    #[inline]
    pub const fn is_running(&self) -> bool {
        matches!(self, JobState::Running | JobState::Cancelling)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Scheduled => write!(f, "scheduled"),
            JobState::Running => write!(f, "running"),
            JobState::Cancelling => write!(f, "cancelling"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_table_slots() {
        assert!(Priority::ALL.windows(2).all(|w| w[0] < w[1]));
        for (i, p) in Priority::ALL.iter().enumerate() {
            assert_eq!(p.as_index(), i);
        }
        assert_eq!(Priority::default(), Priority::Normal);
        assert_eq!(Priority::Low.to_string(), "low");
    }

    #[test]
    fn test_job_state_predicates() {
        assert!(!JobState::Idle.is_busy());
        assert!(JobState::Scheduled.is_busy());
        assert!(!JobState::Scheduled.is_running());
        assert!(JobState::Running.is_running());
        assert!(JobState::Cancelling.is_running());
    }
}
