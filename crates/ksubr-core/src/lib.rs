//! # ksubr-core
//!
//! Core types shared by the ksubr kernel-subroutine crates.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! Threads, CPU binding and the services built on them live in
//! `ksubr-runtime`; the read-ahead engine lives in `ksubr-readahead`.
//!
//! ## Modules
//!
//! - `id` - CPU identifier type
//! - `state` - Pool priority and job state enums
//! - `error` - Error taxonomy shared by every crate
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

#![allow(dead_code)]

pub mod id;
pub mod state;
pub mod error;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::CpuId;
pub use state::{JobState, Priority};
pub use error::{KError, KResult, PageInError, ResourceError};
pub use env::{env_get, env_get_bool, env_get_duration_ms, env_get_opt};

/// Constants for memory and CPU layout
pub mod constants {
    /// log2 of the page size
    pub const PAGE_SHIFT: u32 = 12;

    /// Page size (4 KB)
    pub const PAGE_SIZE: usize = 1 << PAGE_SHIFT;

    /// Page offset mask
    pub const PAGE_MASK: u64 = (PAGE_SIZE as u64) - 1;

    /// Largest single transfer a device is asked to perform (64 KB)
    pub const MAXPHYS: usize = 64 * 1024;

    /// Maximum number of CPUs the runtime will model
    pub const MAX_CPUS: usize = 64;

    /// Cache line size for alignment
    pub const CACHE_LINE_SIZE: usize = 64;
}

/// Round a byte offset down to its page boundary.
#[inline]
pub const fn trunc_page(off: u64) -> u64 {
    off & !constants::PAGE_MASK
}

/// Round a byte offset up to the next page boundary.
#[inline]
pub const fn round_page(off: u64) -> u64 {
    (off + constants::PAGE_MASK) & !constants::PAGE_MASK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_page_rounding() {
        assert_eq!(trunc_page(0), 0);
        assert_eq!(trunc_page(4095), 0);
        assert_eq!(trunc_page(4096), 4096);
        assert_eq!(trunc_page(10_000), 8192);

        assert_eq!(round_page(0), 0);
        assert_eq!(round_page(1), 4096);
        assert_eq!(round_page(4096), 4096);
        assert_eq!(round_page(4097), 8192);
    }
}
