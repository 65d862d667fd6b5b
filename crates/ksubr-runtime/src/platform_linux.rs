//! Linux platform implementation
//!
//! CPU binding through `sched_setaffinity`, current CPU through
//! `sched_getcpu`, niceness through `setpriority` on the calling thread.

use ksubr_core::{kdebug, CpuId, KError, KResult, Priority, ResourceError};
use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::Pid;

/// Linux platform handler
pub struct LinuxPlatform;

impl LinuxPlatform {
    /// Host CPU the calling thread is running on
    pub fn host_cpu() -> Option<usize> {
        // Safety: sched_getcpu has no preconditions
        let cpu = unsafe { libc::sched_getcpu() };
        if cpu < 0 {
            None
        } else {
            Some(cpu as usize)
        }
    }

    /// Pin the calling thread to `cpu`.
    ///
    /// Returns `Ok(false)` when the host cannot represent that CPU; the
    /// thread then keeps running unbound.
    pub fn bind_current_thread(cpu: CpuId) -> KResult<bool> {
        if cpu.index() >= CpuSet::count() {
            return Ok(false);
        }
        let mut set = CpuSet::new();
        set.set(cpu.index())
            .map_err(|_| KError::ResourceUnavailable(ResourceError::CpuLimit))?;
        match sched_setaffinity(Pid::from_raw(0), &set) {
            Ok(()) => Ok(true),
            Err(errno) => {
                // EINVAL: the CPU is not present or not allowed for this process
                kdebug!("sched_setaffinity(cpu {}) failed: {}", cpu, errno);
                Ok(false)
            }
        }
    }

    /// Apply the niceness of `pri` to the calling thread (best effort)
    pub fn apply_priority(pri: Priority) {
        let nice = pri.nice();
        if nice == 0 {
            return;
        }
        // Safety: gettid and setpriority have no memory preconditions;
        // on Linux PRIO_PROCESS with a tid targets a single thread.
        let rc = unsafe {
            let tid = libc::syscall(libc::SYS_gettid) as libc::id_t;
            libc::setpriority(libc::PRIO_PROCESS, tid, nice)
        };
        if rc != 0 {
            kdebug!("setpriority({}) for {} refused", nice, pri);
        }
    }
}
