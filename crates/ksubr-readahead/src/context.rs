//! Read-ahead context
//!
//! One context per open handle. On every read the owner calls
//! `request()`; the context tracks a window over recently requested
//! bytes and decides whether to prefetch past it.
//!
//! Normal advice adapts:
//! - the first request, and any request outside `[start, start + size]`,
//!   (re)initializes the window at the end of the request and prefetches
//!   nothing
//! - a request inside the window prefetches from the cursor up to
//!   `offset + window` if at least `min_prefetch` bytes are uncovered,
//!   then moves the window to the end of the request and widens it by the
//!   request size, up to `max_window`
//!
//! Sequential advice always prefetches `sequential_window` bytes past the
//! request. Random advice never prefetches.
//!
//! A context is not internally synchronized; callers serialize requests
//! the same way they serialize reads on the handle.

use crate::advice::Advice;
use crate::backing::BackingObject;
use crate::params::ReadaheadParams;
use crate::prefetch::{Deferred, PrefetchCounters, Prefetcher};
use ksubr_core::{kdebug, ktrace, kwarn, KResult};
use ksubr_runtime::ThreadPool;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Snapshot of a context's window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Window {
    pub start: u64,
    pub size: usize,
    /// Where the next prefetch starts
    pub next: u64,
    pub valid: bool,
}

/// Request and prefetch counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ReadaheadStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub prefetches: u64,
    pub bytes_prefetched: u64,
    /// Deferred ranges dropped because the queue was full
    pub dropped: u64,
}

/// Per-handle read-ahead state
pub struct ReadaheadContext {
    advice: Advice,
    params: ReadaheadParams,
    win: Window,
    requests: u64,
    hits: u64,
    misses: u64,
    counters: Arc<PrefetchCounters>,
    prefetcher: Prefetcher,
}

impl ReadaheadContext {
    /// Create a context that prefetches on the caller's thread, with
    /// parameters from the environment.
    pub fn new(advice: Advice) -> Self {
        Self::with_params(advice, ReadaheadParams::from_env())
    }

    /// Create an inline context from a raw `fadvise` code
    pub fn from_raw_advice(code: i32) -> KResult<Self> {
        Ok(Self::new(Advice::try_from(code)?))
    }

    /// Create an inline context with explicit parameters.
    ///
    /// Invalid parameters are replaced by the library defaults.
    pub fn with_params(advice: Advice, params: ReadaheadParams) -> Self {
        let params = match params.validate() {
            Ok(()) => params,
            Err(e) => {
                kwarn!("read-ahead parameters rejected ({}), using defaults", e);
                ReadaheadParams::new()
            }
        };
        Self {
            advice,
            params,
            win: Window::default(),
            requests: 0,
            hits: 0,
            misses: 0,
            counters: Arc::new(PrefetchCounters::default()),
            prefetcher: Prefetcher::Inline,
        }
    }

    /// Create a context whose page-ins run as a job on `pool`.
    ///
    /// `request()` only queues the range; if `params.queue_depth` ranges
    /// are already waiting, the new one is dropped.
    pub fn with_pool(advice: Advice, params: ReadaheadParams, pool: Arc<ThreadPool>) -> KResult<Self> {
        params.validate()?;
        let counters = Arc::new(PrefetchCounters::default());
        let deferred = Deferred::new(pool, params.queue_depth, params.io_chunk, Arc::clone(&counters));
        Ok(Self {
            advice,
            params,
            win: Window::default(),
            requests: 0,
            hits: 0,
            misses: 0,
            counters,
            prefetcher: Prefetcher::Deferred(deferred),
        })
    }

    pub fn advice(&self) -> Advice {
        self.advice
    }

    pub fn params(&self) -> &ReadaheadParams {
        &self.params
    }

    /// Change the advice (an `fadvise` on the open handle).
    ///
    /// The window is invalidated so the new policy starts fresh.
    pub fn set_advice(&mut self, advice: Advice) {
        if advice != self.advice {
            kdebug!("advice {} -> {}", self.advice, advice);
        }
        self.advice = advice;
        self.win = Window::default();
    }

    pub fn window(&self) -> Window {
        self.win
    }

    pub fn stats(&self) -> ReadaheadStats {
        ReadaheadStats {
            requests: self.requests,
            hits: self.hits,
            misses: self.misses,
            prefetches: self.counters.issued.load(Ordering::Relaxed),
            bytes_prefetched: self.counters.bytes.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    /// Feed one read of `[reqoff, reqoff + reqsize)` to the policy.
    ///
    /// May page in data ahead of the read; never fails.
    pub fn request(&mut self, obj: &Arc<dyn BackingObject>, reqoff: u64, reqsize: usize) {
        self.requests += 1;
        let reqend = reqoff.saturating_add(reqsize as u64);

        match self.advice {
            Advice::Random => {}

            Advice::Sequential => {
                if !self.win.valid {
                    self.win = Window {
                        start: 0,
                        size: self.params.sequential_window,
                        next: 0,
                        valid: true,
                    };
                }
                if reqoff < self.win.start {
                    // Went back behind the last read: cover the window again
                    self.win.next = reqoff;
                }
                self.win.size = self.params.sequential_window;
                self.hits += 1;
                self.readahead(obj, reqoff);
                self.win.start = reqend;
            }

            Advice::Normal => {
                let hit = self.win.valid
                    && reqoff >= self.win.start
                    && reqoff <= self.win.start.saturating_add(self.win.size as u64);
                if !hit {
                    if self.win.valid {
                        self.misses += 1;
                        ktrace!(
                            "miss: reqoff={} winstart={} winsize={}",
                            reqoff,
                            self.win.start,
                            self.win.size
                        );
                    }
                    self.win = Window {
                        start: reqend,
                        size: self.params.initial_window,
                        next: reqend,
                        valid: true,
                    };
                    return;
                }

                self.hits += 1;
                self.readahead(obj, reqoff);
                self.win.start = reqend;
                self.win.size = self
                    .win
                    .size
                    .saturating_add(reqsize)
                    .min(self.params.max_window);
                if self.win.next < self.win.start {
                    self.win.next = self.win.start;
                }
            }
        }
    }

    /// Prefetch `[max(reqoff, next), reqoff + window)` if it is big enough
    fn readahead(&mut self, obj: &Arc<dyn BackingObject>, reqoff: u64) {
        if reqoff > self.win.next {
            self.win.next = reqoff;
        }
        let target = reqoff.saturating_add(self.win.size as u64);
        if target <= self.win.next {
            return;
        }
        let raoff = self.win.next;
        let rasize = (target - raoff) as usize;
        if rasize < self.params.min_prefetch {
            ktrace!("skip prefetch [{}, +{}): below minimum", raoff, rasize);
            return;
        }
        ktrace!("prefetch [{}, +{})", raoff, rasize);
        self.win.next = self
            .prefetcher
            .issue(obj, raoff, rasize, self.params.io_chunk, &self.counters);
    }

    /// Wait until every deferred prefetch queued so far has been issued.
    ///
    /// Returns immediately for an inline context.
    pub fn flush(&self) {
        if let Prefetcher::Deferred(d) = &self.prefetcher {
            d.flush();
        }
    }

    /// Release the context.
    ///
    /// A deferred prefetch that has not started is cancelled; one already
    /// running completes on its own.
    pub fn destroy(self) {}
}

impl Drop for ReadaheadContext {
    fn drop(&mut self) {
        if let Prefetcher::Deferred(d) = &self.prefetcher {
            if !d.cancel() {
                ktrace!("prefetch job still running at destroy");
            }
        }
    }
}

impl std::fmt::Debug for ReadaheadContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadaheadContext")
            .field("advice", &self.advice)
            .field("window", &self.win)
            .field("deferred", &matches!(self.prefetcher, Prefetcher::Deferred(_)))
            .finish()
    }
}
