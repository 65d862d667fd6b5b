//! Thread-local storage for runtime threads
//!
//! Per-CPU threads (cross-call workers, per-CPU pool threads) record the
//! CPU they serve; pool threads also record which pool owns them so pool
//! teardown can tell when it is running on one of its own threads.

use ksubr_core::CpuId;
use std::cell::Cell;

thread_local! {
    /// CPU this OS thread is bound to
    static BOUND_CPU: Cell<u32> = const { Cell::new(u32::MAX) };

    /// Identity of the pool that owns this thread (0 = none)
    static OWNER_POOL: Cell<u64> = const { Cell::new(0) };
}

/// Record the CPU the current thread serves
#[inline]
pub fn set_bound_cpu(cpu: CpuId) {
    BOUND_CPU.with(|cell| cell.set(cpu.as_u32()));
}

/// CPU the current thread serves, if it is a per-CPU runtime thread
#[inline]
pub fn bound_cpu() -> Option<CpuId> {
    CpuId::new(BOUND_CPU.with(|cell| cell.get())).to_option()
}

/// Record the pool that owns the current thread
#[inline]
pub(crate) fn set_owner_pool(id: u64) {
    OWNER_POOL.with(|cell| cell.set(id));
}

/// Pool that owns the current thread (0 = not a pool thread)
#[inline]
pub(crate) fn owner_pool() -> u64 {
    OWNER_POOL.with(|cell| cell.get())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unbound_by_default() {
        std::thread::spawn(|| {
            assert_eq!(bound_cpu(), None);
            assert_eq!(owner_pool(), 0);
            set_bound_cpu(CpuId::new(2));
            assert_eq!(bound_cpu(), Some(CpuId::new(2)));
        })
        .join()
        .unwrap();
    }
}
