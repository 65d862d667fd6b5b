//! Read-ahead tunables
//!
//! Defaults are derived from `MAXPHYS`, the largest single transfer.
//! Every value can be overridden through the environment.

use ksubr_core::constants::{MAXPHYS, PAGE_SIZE};
use ksubr_core::{env_get, KError, KResult};

/// Default values
pub mod defaults {
    use super::MAXPHYS;

    /// Window after the first request of a Normal context
    pub const INITIAL_WINDOW: usize = MAXPHYS;
    /// Cap on the adaptive window
    pub const MAX_WINDOW: usize = 16 * MAXPHYS;
    /// Fixed window of a Sequential context
    pub const SEQUENTIAL_WINDOW: usize = 8 * MAXPHYS;
    /// Largest single page-in
    pub const IO_CHUNK: usize = MAXPHYS;
    /// Smallest range worth prefetching
    pub const MIN_PREFETCH: usize = 2 * IO_CHUNK;
    /// Deferred prefetch ranges waiting for the pool
    pub const QUEUE_DEPTH: usize = 32;
}

/// Read-ahead tunables, all in bytes except `queue_depth`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadaheadParams {
    pub initial_window: usize,
    pub max_window: usize,
    pub sequential_window: usize,
    pub io_chunk: usize,
    pub min_prefetch: usize,
    pub queue_depth: usize,
}

impl Default for ReadaheadParams {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadaheadParams {
    /// Library defaults, no environment override
    pub const fn new() -> Self {
        Self {
            initial_window: defaults::INITIAL_WINDOW,
            max_window: defaults::MAX_WINDOW,
            sequential_window: defaults::SEQUENTIAL_WINDOW,
            io_chunk: defaults::IO_CHUNK,
            min_prefetch: defaults::MIN_PREFETCH,
            queue_depth: defaults::QUEUE_DEPTH,
        }
    }

    /// Defaults with environment overrides.
    ///
    /// Environment variables (all optional, bytes):
    /// - `KSUBR_RA_INITIAL_WINDOW`
    /// - `KSUBR_RA_MAX_WINDOW`
    /// - `KSUBR_RA_SEQUENTIAL_WINDOW`
    /// - `KSUBR_RA_IO_CHUNK`
    /// - `KSUBR_RA_MIN_PREFETCH` (defaults to twice the I/O chunk)
    /// - `KSUBR_RA_QUEUE_DEPTH` (ranges, not bytes)
    pub fn from_env() -> Self {
        let io_chunk = env_get("KSUBR_RA_IO_CHUNK", defaults::IO_CHUNK);
        Self {
            initial_window: env_get("KSUBR_RA_INITIAL_WINDOW", defaults::INITIAL_WINDOW),
            max_window: env_get("KSUBR_RA_MAX_WINDOW", defaults::MAX_WINDOW),
            sequential_window: env_get("KSUBR_RA_SEQUENTIAL_WINDOW", defaults::SEQUENTIAL_WINDOW),
            io_chunk,
            min_prefetch: env_get("KSUBR_RA_MIN_PREFETCH", 2 * io_chunk),
            queue_depth: env_get("KSUBR_RA_QUEUE_DEPTH", defaults::QUEUE_DEPTH),
        }
    }

    pub fn initial_window(mut self, bytes: usize) -> Self {
        self.initial_window = bytes;
        self
    }

    pub fn max_window(mut self, bytes: usize) -> Self {
        self.max_window = bytes;
        self
    }

    pub fn sequential_window(mut self, bytes: usize) -> Self {
        self.sequential_window = bytes;
        self
    }

    pub fn io_chunk(mut self, bytes: usize) -> Self {
        self.io_chunk = bytes;
        self
    }

    pub fn min_prefetch(mut self, bytes: usize) -> Self {
        self.min_prefetch = bytes;
        self
    }

    pub fn queue_depth(mut self, ranges: usize) -> Self {
        self.queue_depth = ranges;
        self
    }

    /// Validate the tunables
    pub fn validate(&self) -> KResult<()> {
        if self.io_chunk == 0 || self.io_chunk % PAGE_SIZE != 0 {
            return Err(KError::InvalidArgument("io_chunk must be a non-zero multiple of PAGE_SIZE"));
        }
        if self.initial_window == 0 || self.sequential_window == 0 || self.min_prefetch == 0 {
            return Err(KError::InvalidArgument("read-ahead windows must be non-zero"));
        }
        if self.initial_window > self.max_window {
            return Err(KError::InvalidArgument("initial_window exceeds max_window"));
        }
        if self.sequential_window > self.max_window {
            return Err(KError::InvalidArgument("sequential_window exceeds max_window"));
        }
        if self.queue_depth == 0 {
            return Err(KError::InvalidArgument("queue_depth must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let p = ReadaheadParams::new();
        assert_eq!(p.initial_window, 64 * 1024);
        assert_eq!(p.max_window, 1024 * 1024);
        assert_eq!(p.sequential_window, 512 * 1024);
        assert_eq!(p.min_prefetch, 2 * p.io_chunk);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects() {
        let p = ReadaheadParams::new();
        assert!(p.io_chunk(1000).validate().is_err());
        assert!(p.io_chunk(0).validate().is_err());
        assert!(p.initial_window(p.max_window + 1).validate().is_err());
        assert!(p.sequential_window(p.max_window * 2).validate().is_err());
        assert!(p.queue_depth(0).validate().is_err());
        assert!(p.min_prefetch(0).validate().is_err());
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("KSUBR_RA_IO_CHUNK", "32768");
        std::env::set_var("KSUBR_RA_QUEUE_DEPTH", "4");
        let p = ReadaheadParams::from_env();
        std::env::remove_var("KSUBR_RA_IO_CHUNK");
        std::env::remove_var("KSUBR_RA_QUEUE_DEPTH");
        assert_eq!(p.io_chunk, 32768);
        assert_eq!(p.min_prefetch, 65536);
        assert_eq!(p.queue_depth, 4);
    }
}
