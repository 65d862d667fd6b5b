//! Logical CPU table
//!
//! The runtime models `ncpu` logical CPUs. Each has an online flag that
//! broadcast cross-calls consult; per-CPU threads bind themselves to the
//! host CPU of the same index when the host has one.

use crate::tls;
use crate::CurrentPlatform;
use ksubr_core::constants::{CACHE_LINE_SIZE, MAX_CPUS};
use ksubr_core::{CpuId, KError, KResult, Priority, ResourceError};
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-CPU flags, padded to a cache line
#[repr(C, align(64))]
struct CpuSlot {
    online: AtomicBool,
}

const _: () = assert!(std::mem::size_of::<CpuSlot>() == CACHE_LINE_SIZE);

/// Table of logical CPUs
pub struct CpuTable {
    slots: Box<[CpuSlot]>,
    bind_threads: bool,
}

impl CpuTable {
    /// Create a table of `ncpu` CPUs, all online
    pub fn new(ncpu: usize, bind_threads: bool) -> KResult<Self> {
        if ncpu == 0 {
            return Err(KError::InvalidArgument("ncpu must be at least 1"));
        }
        if ncpu > MAX_CPUS {
            return Err(ResourceError::CpuLimit.into());
        }
        let slots = (0..ncpu)
            .map(|_| CpuSlot { online: AtomicBool::new(true) })
            .collect();
        Ok(Self { slots, bind_threads })
    }

    /// Number of modelled CPUs
    #[inline]
    pub fn ncpu(&self) -> usize {
        self.slots.len()
    }

    /// Iterator over every CPU id, online or not
    pub fn iter(&self) -> impl Iterator<Item = CpuId> {
        (0..self.ncpu()).map(CpuId::from)
    }

    /// Validate a CPU id against the table
    pub fn check(&self, cpu: CpuId) -> KResult<()> {
        if cpu.is_none() || cpu.index() >= self.ncpu() {
            return Err(KError::InvalidArgument("cpu index out of range"));
        }
        Ok(())
    }

    /// Whether the CPU is currently running (accepting cross-calls)
    #[inline]
    pub fn is_online(&self, cpu: CpuId) -> bool {
        self.slots
            .get(cpu.index())
            .map(|s| s.online.load(Ordering::Acquire))
            .unwrap_or(false)
    }

    /// Mark a CPU online or offline
    pub fn set_online(&self, cpu: CpuId, online: bool) -> KResult<()> {
        self.check(cpu)?;
        self.slots[cpu.index()].online.store(online, Ordering::Release);
        Ok(())
    }

    /// CPU the calling thread is running on.
    ///
    /// Per-CPU runtime threads report the CPU they serve. Other threads
    /// report the host CPU folded into the modelled range.
    pub fn curcpu(&self) -> CpuId {
        if let Some(cpu) = tls::bound_cpu() {
            if cpu.index() < self.ncpu() {
                return cpu;
            }
        }
        let host = CurrentPlatform::host_cpu().unwrap_or(0);
        CpuId::from(host % self.ncpu())
    }

    /// Turn the calling thread into a per-CPU thread for `cpu`.
    ///
    /// The thread always reports `cpu` from `curcpu()`; host pinning is
    /// attempted only when the table was configured to bind threads.
    pub fn bind_current_thread(&self, cpu: CpuId) -> KResult<()> {
        self.check(cpu)?;
        tls::set_bound_cpu(cpu);
        if self.bind_threads {
            CurrentPlatform::bind_current_thread(cpu)?;
        }
        Ok(())
    }

    /// Apply a pool priority class to the calling thread (best effort)
    pub fn apply_priority(&self, pri: Priority) {
        CurrentPlatform::apply_priority(pri);
    }
}

impl std::fmt::Debug for CpuTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let online: Vec<bool> = self.iter().map(|c| self.is_online(c)).collect();
        f.debug_struct("CpuTable")
            .field("ncpu", &self.ncpu())
            .field("online", &online)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_all_online() {
        let cpus = CpuTable::new(4, false).unwrap();
        assert_eq!(cpus.ncpu(), 4);
        assert!(cpus.iter().all(|c| cpus.is_online(c)));
        assert!(!cpus.is_online(CpuId::new(4)));
    }

    #[test]
    fn test_limits() {
        assert!(CpuTable::new(0, false).is_err());
        assert!(matches!(
            CpuTable::new(MAX_CPUS + 1, false),
            Err(KError::ResourceUnavailable(ResourceError::CpuLimit))
        ));
    }

    #[test]
    fn test_set_online() {
        let cpus = CpuTable::new(2, false).unwrap();
        cpus.set_online(CpuId::new(1), false).unwrap();
        assert!(!cpus.is_online(CpuId::new(1)));
        assert!(cpus.is_online(CpuId::new(0)));
        assert!(cpus.set_online(CpuId::new(2), false).is_err());
    }

    #[test]
    fn test_curcpu_in_range() {
        let cpus = CpuTable::new(3, false).unwrap();
        assert!(cpus.curcpu().index() < 3);
    }

    #[test]
    fn test_bound_thread_reports_its_cpu() {
        let cpus = std::sync::Arc::new(CpuTable::new(3, false).unwrap());
        let c = cpus.clone();
        let seen = std::thread::spawn(move || {
            c.bind_current_thread(CpuId::new(2)).unwrap();
            c.curcpu()
        })
        .join()
        .unwrap();
        assert_eq!(seen, CpuId::new(2));
    }
}
