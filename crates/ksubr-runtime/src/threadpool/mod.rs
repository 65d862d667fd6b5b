//! Thread pools
//!
//! Shared worker pools keyed by priority, unbound or one per CPU, running
//! caller-owned jobs.

mod job;
mod percpu;
mod pool;
mod registry;

pub use job::{Job, JobGuard};
pub use percpu::PercpuPool;
pub use pool::{PoolParams, PoolStats, ThreadPool};
pub use registry::PoolRegistry;
