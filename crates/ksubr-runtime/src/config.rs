//! Runtime configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Configuration Priority (highest wins)
//!
//! 1. Builder setters (programmatic)
//! 2. Environment variables (`from_env()`)
//! 3. Library defaults (`new()`)
//!
//! # Example
//!
//! ```rust,ignore
//! use ksubr_runtime::RuntimeConfig;
//!
//! let config = RuntimeConfig::from_env()
//!     .ncpu(4)
//!     .pool_idle_timeout(Duration::from_secs(5));
//! config.validate()?;
//! ```

use ksubr_core::constants::MAX_CPUS;
use ksubr_core::env::{env_get, env_get_bool, env_get_duration_ms};
use ksubr_core::{KError, KResult};
use std::time::Duration;

/// Compile-time defaults
pub mod defaults {
    /// Pin per-CPU threads to host CPUs
    pub const BIND_THREADS: bool = true;
    /// Idle pool worker lifetime
    pub const POOL_IDLE_MS: u64 = 30_000;
    /// Upper bound on worker threads per pool
    pub const POOL_MAX_THREADS: usize = 64;
    /// Overseer back-off after a failed thread spawn
    pub const POOL_RETRY_MS: u64 = 1_000;

    /// Host parallelism, capped at `MAX_CPUS`
    pub fn ncpu() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(4)
            .min(super::MAX_CPUS)
    }
}

/// Configuration for a `Machine` and the services it owns.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Number of logical CPUs the runtime models
    pub ncpu: usize,
    /// Pin cross-call workers and per-CPU pool threads to host CPUs
    pub bind_threads: bool,
    /// Idle pool worker lifetime before it exits
    pub pool_idle_timeout: Duration,
    /// Upper bound on worker threads per pool
    pub pool_max_threads: usize,
    /// Overseer back-off after a failed thread spawn
    pub pool_retry: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl RuntimeConfig {
    /// Create config from library defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `KSUBR_NCPU` - Number of modelled CPUs
    /// - `KSUBR_BIND_THREADS` - Pin per-CPU threads (0/1)
    /// - `KSUBR_POOL_IDLE_MS` - Idle worker timeout in milliseconds
    /// - `KSUBR_POOL_MAX_THREADS` - Worker bound per pool
    /// - `KSUBR_POOL_RETRY_MS` - Spawn retry back-off in milliseconds
    pub fn from_env() -> Self {
        Self {
            ncpu: env_get("KSUBR_NCPU", defaults::ncpu()),
            bind_threads: env_get_bool("KSUBR_BIND_THREADS", defaults::BIND_THREADS),
            pool_idle_timeout: env_get_duration_ms("KSUBR_POOL_IDLE_MS", defaults::POOL_IDLE_MS),
            pool_max_threads: env_get("KSUBR_POOL_MAX_THREADS", defaults::POOL_MAX_THREADS),
            pool_retry: env_get_duration_ms("KSUBR_POOL_RETRY_MS", defaults::POOL_RETRY_MS),
        }
    }

    /// Create config with library defaults only (no env override).
    /// Useful for testing or when you want full control.
    pub fn new() -> Self {
        Self {
            ncpu: defaults::ncpu(),
            bind_threads: defaults::BIND_THREADS,
            pool_idle_timeout: Duration::from_millis(defaults::POOL_IDLE_MS),
            pool_max_threads: defaults::POOL_MAX_THREADS,
            pool_retry: Duration::from_millis(defaults::POOL_RETRY_MS),
        }
    }

    /// Set number of modelled CPUs
    pub fn ncpu(mut self, n: usize) -> Self {
        self.ncpu = n;
        self
    }

    /// Enable or disable CPU pinning of per-CPU threads
    pub fn bind_threads(mut self, bind: bool) -> Self {
        self.bind_threads = bind;
        self
    }

    /// Set idle worker timeout
    pub fn pool_idle_timeout(mut self, d: Duration) -> Self {
        self.pool_idle_timeout = d;
        self
    }

    /// Set worker bound per pool
    pub fn pool_max_threads(mut self, n: usize) -> Self {
        self.pool_max_threads = n;
        self
    }

    /// Set spawn retry back-off
    pub fn pool_retry(mut self, d: Duration) -> Self {
        self.pool_retry = d;
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> KResult<()> {
        if self.ncpu == 0 {
            return Err(KError::InvalidArgument("ncpu must be at least 1"));
        }
        if self.ncpu > MAX_CPUS {
            return Err(KError::InvalidArgument("ncpu exceeds MAX_CPUS"));
        }
        if self.pool_max_threads == 0 {
            return Err(KError::InvalidArgument("pool_max_threads must be at least 1"));
        }
        if self.pool_idle_timeout.is_zero() {
            return Err(KError::InvalidArgument("pool_idle_timeout must be non-zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RuntimeConfig::new();
        assert!(config.ncpu >= 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = RuntimeConfig::new()
            .ncpu(3)
            .bind_threads(false)
            .pool_max_threads(2)
            .pool_idle_timeout(Duration::from_millis(50));
        assert_eq!(config.ncpu, 3);
        assert!(!config.bind_threads);
        assert_eq!(config.pool_max_threads, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        assert!(RuntimeConfig::new().ncpu(0).validate().is_err());
        assert!(RuntimeConfig::new().ncpu(MAX_CPUS + 1).validate().is_err());
        assert!(RuntimeConfig::new().pool_max_threads(0).validate().is_err());
        assert!(RuntimeConfig::new().pool_idle_timeout(Duration::ZERO).validate().is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("KSUBR_POOL_MAX_THREADS", "7");
        let config = RuntimeConfig::from_env();
        std::env::remove_var("KSUBR_POOL_MAX_THREADS");
        assert_eq!(config.pool_max_threads, 7);
    }
}
