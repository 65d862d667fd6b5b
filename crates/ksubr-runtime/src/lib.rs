//! # ksubr-runtime
//!
//! Runtime services modelled on kernel subsystems.
//!
//! This crate provides:
//! - A logical CPU table with per-CPU thread binding
//! - Cross-calls: run a function on one or all CPUs and wait for it
//! - Thread pools: shared worker pools, unbound or per-CPU, running jobs
//! - `Machine`, which boots all of the above from one configuration

#![allow(dead_code)]

pub mod config;
pub mod cpu;
pub mod machine;
pub mod threadpool;
pub mod tls;
pub mod xcall;

mod sync;

// Re-exports
pub use config::RuntimeConfig;
pub use cpu::CpuTable;
pub use machine::Machine;
pub use threadpool::{Job, JobGuard, PercpuPool, PoolParams, PoolRegistry, PoolStats, ThreadPool};
pub use xcall::{XcFlags, XcGeneration, XcallService, XcallStats};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod platform_linux;
        pub use platform_linux::LinuxPlatform as CurrentPlatform;
    } else {
        mod platform_other;
        pub use platform_other::OtherPlatform as CurrentPlatform;
    }
}
