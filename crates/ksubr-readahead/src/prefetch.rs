//! Prefetch execution
//!
//! The read-ahead policy decides *what* to prefetch; a `Prefetcher`
//! decides *where* the page-in runs. Inline runs it on the reader's
//! thread. Deferred hands the range to a thread pool job through a
//! bounded lock-free queue, so the read path never waits for I/O.

use crate::backing::BackingObject;
use crate::io::start_io;
use crossbeam_queue::ArrayQueue;
use ksubr_core::{kdebug, ktrace};
use ksubr_runtime::{Job, JobGuard, ThreadPool};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counters shared between a context and its prefetch job
#[derive(Debug, Default)]
pub(crate) struct PrefetchCounters {
    pub(crate) issued: AtomicU64,
    pub(crate) bytes: AtomicU64,
    pub(crate) dropped: AtomicU64,
}

struct PrefetchRange {
    obj: Arc<dyn BackingObject>,
    offset: u64,
    size: usize,
}

/// Where prefetch page-ins run
pub(crate) enum Prefetcher {
    Inline,
    Deferred(Deferred),
}

impl Prefetcher {
    /// Prefetch `[off, off + size)`.
    ///
    /// Returns the offset the read-ahead cursor should move to.
    pub(crate) fn issue(
        &self,
        obj: &Arc<dyn BackingObject>,
        off: u64,
        size: usize,
        io_chunk: usize,
        counters: &PrefetchCounters,
    ) -> u64 {
        match self {
            Prefetcher::Inline => {
                let reached = start_io(obj.as_ref(), off, size, io_chunk);
                counters.issued.fetch_add(1, Ordering::Relaxed);
                counters.bytes.fetch_add(reached.saturating_sub(off), Ordering::Relaxed);
                reached
            }
            Prefetcher::Deferred(d) => d.submit(obj, off, size),
        }
    }
}

/// Pool-backed prefetcher
pub(crate) struct Deferred {
    pool: Arc<ThreadPool>,
    queue: Arc<ArrayQueue<PrefetchRange>>,
    job: Job<()>,
    counters: Arc<PrefetchCounters>,
}

impl Deferred {
    pub(crate) fn new(
        pool: Arc<ThreadPool>,
        queue_depth: usize,
        io_chunk: usize,
        counters: Arc<PrefetchCounters>,
    ) -> Self {
        let queue: Arc<ArrayQueue<PrefetchRange>> = Arc::new(ArrayQueue::new(queue_depth));
        let q = Arc::clone(&queue);
        let c = Arc::clone(&counters);
        let job = Job::new("readahead", (), move |job: &mut JobGuard<'_, ()>| {
            // Drain without the lock, then re-check under it so a range
            // queued after the last pop either is seen here or finds the
            // job Idle and reschedules it.
            loop {
                job.unlocked(|| {
                    while let Some(r) = q.pop() {
                        let reached = start_io(r.obj.as_ref(), r.offset, r.size, io_chunk);
                        c.issued.fetch_add(1, Ordering::Relaxed);
                        c.bytes.fetch_add(reached.saturating_sub(r.offset), Ordering::Relaxed);
                    }
                });
                if q.is_empty() {
                    break;
                }
            }
            job.done();
        });
        Self {
            pool,
            queue,
            job,
            counters,
        }
    }

    fn submit(&self, obj: &Arc<dyn BackingObject>, offset: u64, size: usize) -> u64 {
        let range = PrefetchRange {
            obj: Arc::clone(obj),
            offset,
            size,
        };
        if self.queue.push(range).is_err() {
            self.counters.dropped.fetch_add(1, Ordering::Relaxed);
            kdebug!("prefetch queue full, dropping [{}, +{})", offset, size);
        } else {
            ktrace!("queued prefetch [{}, +{})", offset, size);
            self.pool.schedule_job(&self.job);
        }
        offset + size as u64
    }

    /// Cancel the prefetch job unless it is already running
    pub(crate) fn cancel(&self) -> bool {
        self.pool.cancel_job_async(&self.job)
    }

    /// Wait for queued ranges to be issued
    pub(crate) fn flush(&self) {
        self.job.wait_idle();
        while !self.queue.is_empty() {
            self.pool.schedule_job(&self.job);
            self.job.wait_idle();
        }
    }
}
