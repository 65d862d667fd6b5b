//! Portable platform fallback
//!
//! No affinity or niceness control; every thread reports host CPU 0.

use ksubr_core::{CpuId, KResult, Priority};

/// Fallback platform handler
pub struct OtherPlatform;

impl OtherPlatform {
    pub fn host_cpu() -> Option<usize> {
        None
    }

    pub fn bind_current_thread(_cpu: CpuId) -> KResult<bool> {
        Ok(false)
    }

    pub fn apply_priority(_pri: Priority) {}
}
