//! Per-CPU pool families

use super::pool::{PoolParams, ThreadPool};
use crate::cpu::CpuTable;
use ksubr_core::{kdebug, CpuId, KResult, Priority};
use std::sync::Arc;

/// One thread pool per CPU at a single priority.
///
/// Each member's threads are bound to their CPU.
pub struct PercpuPool {
    pri: Priority,
    cpus: Arc<CpuTable>,
    pools: Box<[ThreadPool]>,
}

impl PercpuPool {
    pub(crate) fn create(pri: Priority, cpus: Arc<CpuTable>, params: PoolParams) -> KResult<Self> {
        // A failure part-way drops the members created so far
        let pools = cpus
            .iter()
            .map(|cpu| ThreadPool::create(pri, cpu, Arc::clone(&cpus), params))
            .collect::<KResult<Vec<_>>>()?
            .into_boxed_slice();
        kdebug!("created per-cpu pools @{} x{}", pri, pools.len());
        Ok(Self { pri, cpus, pools })
    }

    /// Priority class of the family
    pub fn priority(&self) -> Priority {
        self.pri
    }

    /// The pool of the CPU the caller is running on (`percpu_ref`)
    pub fn percpu_ref(&self) -> &ThreadPool {
        let cpu = self.cpus.curcpu();
        &self.pools[cpu.index()]
    }

    /// The pool of a specific CPU (`percpu_ref_remote`)
    pub fn percpu_ref_remote(&self, cpu: CpuId) -> KResult<&ThreadPool> {
        self.cpus.check(cpu)?;
        Ok(&self.pools[cpu.index()])
    }

    /// Iterate over every member pool
    pub fn iter(&self) -> impl Iterator<Item = &ThreadPool> {
        self.pools.iter()
    }
}

impl std::fmt::Debug for PercpuPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PercpuPool")
            .field("pri", &self.pri)
            .field("ncpu", &self.pools.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threadpool::{Job, JobGuard};
    use ksubr_core::JobState;
    use std::time::{Duration, Instant};

    fn family(ncpu: usize) -> PercpuPool {
        let cpus = Arc::new(CpuTable::new(ncpu, false).unwrap());
        let params = PoolParams {
            max_threads: 2,
            idle_timeout: Duration::from_millis(200),
            retry: Duration::from_millis(10),
        };
        PercpuPool::create(Priority::Normal, cpus, params).unwrap()
    }

    #[test]
    fn test_one_pool_per_cpu() {
        let fam = family(3);
        let cpus: Vec<_> = fam.iter().map(|p| p.cpu()).collect();
        assert_eq!(cpus, vec![Some(CpuId::new(0)), Some(CpuId::new(1)), Some(CpuId::new(2))]);
        assert!(fam.percpu_ref_remote(CpuId::new(3)).is_err());
    }

    #[test]
    fn test_remote_job_runs_on_target_cpu() {
        let fam = family(2);
        let cpus = Arc::new(CpuTable::new(2, false).unwrap());
        let job = Job::new("where", None, move |g: &mut JobGuard<'_, Option<CpuId>>| {
            **g = Some(cpus.curcpu());
            g.done();
        });
        fam.percpu_ref_remote(CpuId::new(1)).unwrap().schedule_job(&job);
        let deadline = Instant::now() + Duration::from_secs(5);
        while job.state() != JobState::Idle || job.lock().is_none() {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(*job.lock(), Some(CpuId::new(1)));
    }

    #[test]
    fn test_percpu_ref_matches_curcpu() {
        let fam = family(2);
        let local = fam.percpu_ref();
        assert!(local.cpu().is_some());
    }
}
