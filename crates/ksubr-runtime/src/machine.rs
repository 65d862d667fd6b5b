//! Machine
//!
//! Owns the CPU table, the cross-call service (with one worker per CPU)
//! and the pool registry. Most programs use the process-wide instance
//! from `Machine::global()`; tests boot private ones.

use crate::config::RuntimeConfig;
use crate::cpu::CpuTable;
use crate::threadpool::PoolRegistry;
use crate::xcall::XcallService;
use ksubr_core::{kinfo, CpuId, KResult};
use std::sync::{Arc, OnceLock};

static GLOBAL: OnceLock<Machine> = OnceLock::new();

/// Runtime service object
pub struct Machine {
    config: RuntimeConfig,
    cpus: Arc<CpuTable>,
    xcall: XcallService,
    pools: PoolRegistry,
}

impl Machine {
    /// Validate `config`, build the CPU table and start a cross-call
    /// worker for every CPU.
    pub fn boot(config: RuntimeConfig) -> KResult<Self> {
        config.validate()?;
        let cpus = Arc::new(CpuTable::new(config.ncpu, config.bind_threads)?);
        let xcall = XcallService::new(Arc::clone(&cpus));
        for cpu in cpus.iter() {
            xcall.init_cpu(cpu)?;
        }
        let pools = PoolRegistry::new(Arc::clone(&cpus), &config);
        kinfo!(
            "machine up: {} cpus, bind_threads={}, pool_max_threads={}",
            config.ncpu,
            config.bind_threads,
            config.pool_max_threads
        );
        Ok(Self {
            config,
            cpus,
            xcall,
            pools,
        })
    }

    /// Process-wide machine, booted from the environment on first use
    pub fn global() -> KResult<&'static Machine> {
        if let Some(m) = GLOBAL.get() {
            return Ok(m);
        }
        let machine = Self::boot(RuntimeConfig::from_env())?;
        // A racing initializer may win; the loser's machine is dropped.
        Ok(GLOBAL.get_or_init(|| machine))
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    pub fn cpus(&self) -> &Arc<CpuTable> {
        &self.cpus
    }

    pub fn xcall(&self) -> &XcallService {
        &self.xcall
    }

    pub fn pools(&self) -> &PoolRegistry {
        &self.pools
    }

    /// CPU the calling thread is running on
    pub fn curcpu(&self) -> CpuId {
        self.cpus.curcpu()
    }
}

impl std::fmt::Debug for Machine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Machine")
            .field("cpus", &self.cpus)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threadpool::{Job, JobGuard};
    use crate::xcall::XcFlags;
    use ksubr_core::{JobState, Priority};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::{Duration, Instant};

    fn machine(ncpu: usize) -> Machine {
        Machine::boot(RuntimeConfig::new().ncpu(ncpu).bind_threads(false)).unwrap()
    }

    #[test]
    fn test_boot_attaches_every_cpu() {
        let m = machine(3);
        assert_eq!(m.cpus().ncpu(), 3);
        assert!(m.cpus().iter().all(|c| m.xcall().is_attached(c)));
        assert!(m.curcpu().index() < 3);
    }

    #[test]
    fn test_boot_rejects_bad_config() {
        assert!(Machine::boot(RuntimeConfig::new().ncpu(0)).is_err());
    }

    #[test]
    fn test_xcall_schedules_pool_job() {
        let m = Arc::new(machine(2));
        let pool = m.pools().get_unbound(Priority::Normal).unwrap();
        let job = Arc::new(Job::new("from-xcall", 0usize, |g: &mut JobGuard<'_, usize>| {
            **g += 1;
            g.done();
        }));

        let hits = Arc::new(AtomicUsize::new(0));
        let (p, j, h) = (pool.clone(), job.clone(), hits.clone());
        let gen = m.xcall().broadcast(
            XcFlags::NONE,
            move |_, _| {
                h.fetch_add(1, Ordering::SeqCst);
                p.schedule_job(&j);
            },
            0,
            0,
        );
        m.xcall().wait(gen);
        assert_eq!(hits.load(Ordering::SeqCst), 2);

        let deadline = Instant::now() + Duration::from_secs(5);
        while job.state() != JobState::Idle || *job.lock() == 0 {
            assert!(Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(1));
        }
        // The second schedule may coalesce with the first
        assert!((1..=2).contains(&*job.lock()));
    }
}
