//! Shared pool registry
//!
//! Callers asking for the same priority share one pool (or one per-CPU
//! family). The registry keeps weak references only: the pool lives while
//! some caller holds a handle and is torn down when the last one is put.

use super::percpu::PercpuPool;
use super::pool::{PoolParams, ThreadPool};
use crate::config::RuntimeConfig;
use crate::cpu::CpuTable;
use crate::sync::lock;
use ksubr_core::{Priority, KResult};
use std::sync::{Arc, Mutex, Weak};

/// Registry of shared unbound and per-CPU pools
pub struct PoolRegistry {
    cpus: Arc<CpuTable>,
    params: PoolParams,
    unbound: Mutex<[Weak<ThreadPool>; Priority::COUNT]>,
    percpu: Mutex<[Weak<PercpuPool>; Priority::COUNT]>,
}

impl PoolRegistry {
    pub fn new(cpus: Arc<CpuTable>, config: &RuntimeConfig) -> Self {
        Self {
            cpus,
            params: PoolParams {
                max_threads: config.pool_max_threads,
                idle_timeout: config.pool_idle_timeout,
                retry: config.pool_retry,
            },
            unbound: Mutex::new(std::array::from_fn(|_| Weak::new())),
            percpu: Mutex::new(std::array::from_fn(|_| Weak::new())),
        }
    }

    /// Pool parameters applied to every pool created here
    pub fn params(&self) -> PoolParams {
        self.params
    }

    /// Obtain the shared unbound pool for `pri`, creating it on first use
    /// (`threadpool_get`).
    pub fn get_unbound(&self, pri: Priority) -> KResult<Arc<ThreadPool>> {
        let mut map = lock(&self.unbound);
        if let Some(pool) = map[pri.as_index()].upgrade() {
            return Ok(pool);
        }
        let pool = Arc::new(ThreadPool::create(
            pri,
            ksubr_core::CpuId::NONE,
            Arc::clone(&self.cpus),
            self.params,
        )?);
        map[pri.as_index()] = Arc::downgrade(&pool);
        Ok(pool)
    }

    /// Release a handle from `get_unbound` (`threadpool_put`).
    ///
    /// Dropping the handle has the same effect.
    pub fn put_unbound(&self, pool: Arc<ThreadPool>, pri: Priority) {
        debug_assert_eq!(pool.priority(), pri, "pool put back at the wrong priority");
        drop(pool);
    }

    /// Obtain the shared per-CPU family for `pri`, creating it on first use
    /// (`threadpool_percpu_get`).
    pub fn get_percpu(&self, pri: Priority) -> KResult<Arc<PercpuPool>> {
        let mut map = lock(&self.percpu);
        if let Some(family) = map[pri.as_index()].upgrade() {
            return Ok(family);
        }
        let family = Arc::new(PercpuPool::create(pri, Arc::clone(&self.cpus), self.params)?);
        map[pri.as_index()] = Arc::downgrade(&family);
        Ok(family)
    }

    /// Release a handle from `get_percpu` (`threadpool_percpu_put`)
    pub fn put_percpu(&self, family: Arc<PercpuPool>, pri: Priority) {
        debug_assert_eq!(family.priority(), pri, "per-cpu pool put back at the wrong priority");
        drop(family);
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live = |w: &[Weak<ThreadPool>; Priority::COUNT]| {
            w.iter().filter(|p| p.strong_count() > 0).count()
        };
        f.debug_struct("PoolRegistry")
            .field("params", &self.params)
            .field("unbound_live", &live(&lock(&self.unbound)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn registry() -> PoolRegistry {
        let config = RuntimeConfig::new()
            .ncpu(2)
            .bind_threads(false)
            .pool_idle_timeout(Duration::from_millis(200));
        let cpus = Arc::new(CpuTable::new(config.ncpu, config.bind_threads).unwrap());
        PoolRegistry::new(cpus, &config)
    }

    #[test]
    fn test_same_priority_shares_pool() {
        let reg = registry();
        let a = reg.get_unbound(Priority::Normal).unwrap();
        let b = reg.get_unbound(Priority::Normal).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        let c = reg.get_unbound(Priority::High).unwrap();
        assert!(!Arc::ptr_eq(&a, &c));
        assert_eq!(c.priority(), Priority::High);
        assert_eq!(c.cpu(), None);
    }

    #[test]
    fn test_last_put_destroys_pool() {
        let reg = registry();
        let a = reg.get_unbound(Priority::Low).unwrap();
        let weak = Arc::downgrade(&a);
        let b = reg.get_unbound(Priority::Low).unwrap();
        reg.put_unbound(a, Priority::Low);
        assert!(weak.upgrade().is_some());
        reg.put_unbound(b, Priority::Low);
        assert!(weak.upgrade().is_none());

        // A later get creates a fresh pool
        let c = reg.get_unbound(Priority::Low).unwrap();
        assert_eq!(c.stats().jobs_run, 0);
    }

    #[test]
    fn test_percpu_shared_per_priority() {
        let reg = registry();
        let a = reg.get_percpu(Priority::Normal).unwrap();
        let b = reg.get_percpu(Priority::Normal).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.iter().count(), 2);
        reg.put_percpu(a, Priority::Normal);
        reg.put_percpu(b, Priority::Normal);
    }
}
