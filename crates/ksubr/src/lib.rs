//! # ksubr - kernel subroutines for Rust
//!
//! Three pieces of kernel infrastructure as a freestanding library:
//!
//! - **Read-ahead**: adaptive prefetch policy per open handle, driven by
//!   the observed access pattern (`ReadaheadContext`)
//! - **Thread pools**: shared worker pools by priority, unbound or one per
//!   CPU, running caller-owned jobs (`PoolRegistry`, `Job`)
//! - **Cross-calls**: run a function on one or every CPU and wait for it
//!   (`XcallService`)
//!
//! ## Quick Start
//!
//! ```ignore
//! use ksubr::{Advice, Job, JobGuard, Priority, ReadaheadContext, XcFlags};
//!
//! // Process-wide machine, configured from KSUBR_* variables
//! let gen = ksubr::xc_broadcast(XcFlags::NONE, |a, _| println!("hello {}", a), 1, 0)?;
//! ksubr::xc_wait(gen)?;
//!
//! let pool = ksubr::pool_get(Priority::Normal)?;
//! let job = Job::new("tick", 0u64, |job: &mut JobGuard<'_, u64>| {
//!     **job += 1;
//!     job.done();
//! });
//! pool.schedule_job(&job);
//! pool.cancel_job(&job);
//!
//! let mut ra = ReadaheadContext::new(Advice::Sequential);
//! ra.request(&file, 0, 4096);
//! ```
//!
//! ## Environment Variables
//!
//! - `KSUBR_LOG_LEVEL` - off, error, warn, info, debug, trace
//! - `KSUBR_LOG_FILTER` - comma-separated module substrings to log
//! - `KSUBR_FLUSH_EPRINT=1` - flush after every log line
//! - `KSUBR_NCPU`, `KSUBR_BIND_THREADS` - modelled CPUs
//! - `KSUBR_POOL_*` - pool tunables, see `RuntimeConfig`
//! - `KSUBR_RA_*` - read-ahead tunables, see `ReadaheadParams`

// Re-export core types
pub use ksubr_core::{
    constants, round_page, trunc_page, CpuId, JobState, KError, KResult, PageInError, Priority,
    ResourceError,
};

// Re-export kprint macros for debug logging
pub use ksubr_core::kprint::{init as init_logging, set_flush_enabled, set_log_level, LogLevel};
pub use ksubr_core::{kdebug, kerror, kinfo, kprint, kprintln, ktrace, kwarn};

// Re-export env utilities
pub use ksubr_core::{env_get, env_get_bool, env_get_duration_ms, env_get_opt};

// Re-export runtime types
pub use ksubr_runtime::{
    CpuTable, Job, JobGuard, Machine, PercpuPool, PoolParams, PoolRegistry, PoolStats,
    RuntimeConfig, ThreadPool, XcFlags, XcGeneration, XcallService, XcallStats,
};

// Re-export read-ahead types
pub use ksubr_readahead::{
    start_io, Advice, BackingObject, Protection, ReadaheadContext, ReadaheadParams,
    ReadaheadStats, Window,
};

use std::sync::Arc;

/// Shared unbound pool for `pri` on the global machine
pub fn pool_get(pri: Priority) -> KResult<Arc<ThreadPool>> {
    Machine::global()?.pools().get_unbound(pri)
}

/// Shared per-CPU pool family for `pri` on the global machine
pub fn pool_percpu_get(pri: Priority) -> KResult<Arc<PercpuPool>> {
    Machine::global()?.pools().get_percpu(pri)
}

/// Broadcast a cross-call on the global machine
pub fn xc_broadcast<F>(flags: XcFlags, func: F, arg1: usize, arg2: usize) -> KResult<XcGeneration>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    Ok(Machine::global()?.xcall().broadcast(flags, func, arg1, arg2))
}

/// Unicast a cross-call on the global machine
pub fn xc_unicast<F>(
    flags: XcFlags,
    func: F,
    arg1: usize,
    arg2: usize,
    cpu: CpuId,
) -> KResult<XcGeneration>
where
    F: Fn(usize, usize) + Send + Sync + 'static,
{
    Machine::global()?.xcall().unicast(flags, func, arg1, arg2, cpu)
}

/// Wait for a cross-call generation on the global machine
pub fn xc_wait(gen: XcGeneration) -> KResult<()> {
    Machine::global()?.xcall().wait(gen);
    Ok(())
}

/// CPU the caller is running on, per the global machine
pub fn curcpu() -> KResult<CpuId> {
    Ok(Machine::global()?.curcpu())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_global_machine_round_trip() {
        let hits = Arc::new(AtomicUsize::new(0));
        let h = hits.clone();
        let gen = xc_broadcast(XcFlags::NONE, move |a, b| {
            h.fetch_add(a + b, Ordering::SeqCst);
        }, 1, 0)
        .unwrap();
        xc_wait(gen).unwrap();
        let ncpu = Machine::global().unwrap().cpus().ncpu();
        assert_eq!(hits.load(Ordering::SeqCst), ncpu);

        let a = pool_get(Priority::Normal).unwrap();
        let b = pool_get(Priority::Normal).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert!(curcpu().unwrap().index() < ncpu);
    }
}
