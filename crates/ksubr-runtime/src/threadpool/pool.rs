//! Thread pool
//!
//! Each pool has one overseer thread and a variable number of worker
//! threads. Scheduling a job appends it to the pool queue; an idle worker
//! picks it up, or the overseer creates a new worker when every existing
//! worker is busy. Workers that sit idle past the configured timeout exit.
//!
//! A per-CPU pool binds its overseer and workers to that CPU.
//!
//! Lock order: job lock, then pool lock. Workers never hold the pool lock
//! while running a job.

use super::job::{next_ticket, Job, Runnable};
use crate::cpu::CpuTable;
use crate::sync::{lock, wait, wait_timeout};
use crate::tls;
use ksubr_core::{kdebug, ktrace, kwarn, CpuId, JobState, KResult, Priority, ResourceError};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Tunables shared by every pool of a registry
#[derive(Debug, Clone, Copy)]
pub struct PoolParams {
    /// Upper bound on worker threads per pool
    pub max_threads: usize,
    /// Idle time after which a worker exits
    pub idle_timeout: Duration,
    /// Back-off before retrying a failed worker spawn
    pub retry: Duration,
}

/// Point-in-time pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Worker threads alive (including ones not yet started)
    pub threads: usize,
    /// Workers waiting for a job
    pub idle: usize,
    /// Jobs waiting in the queue
    pub queued: usize,
    /// Jobs handed to workers since creation
    pub jobs_run: u64,
}

struct Queued {
    job: Arc<dyn Runnable>,
    ticket: u64,
}

struct PoolState {
    jobs: VecDeque<Queued>,
    nthreads: usize,
    nidle: usize,
    dying: bool,
    overseer_alive: bool,
    jobs_run: u64,
}

struct PoolCore {
    id: u64,
    pri: Priority,
    cpu: CpuId,
    cpus: Arc<CpuTable>,
    params: PoolParams,
    state: Mutex<PoolState>,
    worker_cv: Condvar,
    overseer_cv: Condvar,
    exit_cv: Condvar,
}

impl PoolCore {
    fn thread_name(&self, kind: &str) -> String {
        format!("{}/{}@{}", kind, self.cpu, self.pri)
    }

    /// Common setup for overseer and worker threads
    fn enter_thread(&self) {
        tls::set_owner_pool(self.id);
        if !self.cpu.is_none() {
            if let Err(e) = self.cpus.bind_current_thread(self.cpu) {
                kwarn!("{}: cannot bind to cpu {}: {}", self.thread_name("pool"), self.cpu, e);
            }
        }
        self.cpus.apply_priority(self.pri);
    }

    fn overseer(self: Arc<Self>) {
        self.enter_thread();
        let mut st = lock(&self.state);
        loop {
            while !st.dying
                && !(st.jobs.len() > st.nidle && st.nthreads < self.params.max_threads)
            {
                st = wait(&self.overseer_cv, st);
            }
            if st.dying {
                break;
            }

            // Count the new worker as idle now so concurrent schedules do
            // not ask for another one.
            st.nthreads += 1;
            st.nidle += 1;
            drop(st);

            let core = Arc::clone(&self);
            let spawned = thread::Builder::new()
                .name(self.thread_name("poolthread"))
                .spawn(move || core.worker());

            st = lock(&self.state);
            match spawned {
                Ok(_detached) => {
                    ktrace!("{}: worker {} started", self.thread_name("pool"), st.nthreads);
                }
                Err(e) => {
                    st.nthreads -= 1;
                    st.nidle -= 1;
                    kwarn!(
                        "{}: worker spawn failed, retrying in {:?}: {}",
                        self.thread_name("pool"),
                        self.params.retry,
                        e
                    );
                    st = wait_timeout(&self.overseer_cv, st, self.params.retry).0;
                }
            }
        }
        st.overseer_alive = false;
        self.exit_cv.notify_all();
    }

    fn worker(self: Arc<Self>) {
        self.enter_thread();
        let mut st = lock(&self.state);
        loop {
            if let Some(q) = st.jobs.pop_front() {
                st.nidle -= 1;
                st.jobs_run += 1;
                if st.jobs.len() > st.nidle {
                    self.overseer_cv.notify_one();
                }
                drop(st);
                ktrace!("running job {}", q.job.name());
                q.job.run(q.ticket);
                st = lock(&self.state);
                st.nidle += 1;
                continue;
            }
            if st.dying {
                break;
            }
            let (guard, timed_out) = wait_timeout(&self.worker_cv, st, self.params.idle_timeout);
            st = guard;
            if timed_out && st.jobs.is_empty() && !st.dying {
                kdebug!("idle for {:?}, exiting", self.params.idle_timeout);
                break;
            }
        }
        st.nthreads -= 1;
        st.nidle -= 1;
        self.exit_cv.notify_all();
    }

    fn enqueue(&self, job: Arc<dyn Runnable>, ticket: u64) {
        let mut st = lock(&self.state);
        st.jobs.push_back(Queued { job, ticket });
        if st.nidle > 0 {
            self.worker_cv.notify_one();
        }
        if st.jobs.len() > st.nidle {
            self.overseer_cv.notify_one();
        }
    }

    fn dequeue(&self, ticket: u64) {
        lock(&self.state).jobs.retain(|q| q.ticket != ticket);
    }
}

/// A pool of worker threads at one priority, optionally bound to one CPU.
///
/// Obtained from `PoolRegistry`; the pool is torn down when the last
/// handle is dropped.
pub struct ThreadPool {
    core: Arc<PoolCore>,
    overseer: Mutex<Option<JoinHandle<()>>>,
}

impl ThreadPool {
    /// Create a pool and start its overseer thread.
    ///
    /// `cpu` is `CpuId::NONE` for an unbound pool.
    pub(crate) fn create(
        pri: Priority,
        cpu: CpuId,
        cpus: Arc<CpuTable>,
        params: PoolParams,
    ) -> KResult<Self> {
        if !cpu.is_none() {
            cpus.check(cpu)?;
        }
        let core = Arc::new(PoolCore {
            id: NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed),
            pri,
            cpu,
            cpus,
            params,
            state: Mutex::new(PoolState {
                jobs: VecDeque::new(),
                nthreads: 0,
                nidle: 0,
                dying: false,
                overseer_alive: true,
                jobs_run: 0,
            }),
            worker_cv: Condvar::new(),
            overseer_cv: Condvar::new(),
            exit_cv: Condvar::new(),
        });

        let c = Arc::clone(&core);
        let handle = thread::Builder::new()
            .name(core.thread_name("pooloverseer"))
            .spawn(move || c.overseer())
            .map_err(|e| {
                kwarn!("{}: overseer spawn failed: {}", core.thread_name("pool"), e);
                ResourceError::SpawnFailed
            })?;

        kdebug!("created {}", core.thread_name("pool"));
        Ok(Self {
            core,
            overseer: Mutex::new(Some(handle)),
        })
    }

    /// Priority class of the pool
    pub fn priority(&self) -> Priority {
        self.core.pri
    }

    /// CPU the pool is bound to, if any
    pub fn cpu(&self) -> Option<CpuId> {
        self.core.cpu.to_option()
    }

    /// Snapshot of the pool counters
    pub fn stats(&self) -> PoolStats {
        let st = lock(&self.core.state);
        PoolStats {
            threads: st.nthreads,
            idle: st.nidle,
            queued: st.jobs.len(),
            jobs_run: st.jobs_run,
        }
    }

    /// Schedule `job` to run on this pool (`schedule_job`).
    ///
    /// Does nothing if the job is already scheduled or running.
    pub fn schedule_job<T: Send + 'static>(&self, job: &Job<T>) {
        let mut slot = lock(&job.shared.slot);
        if slot.state != JobState::Idle {
            ktrace!("job {} already {}", job.name(), slot.state);
            return;
        }
        let ticket = next_ticket();
        slot.state = JobState::Scheduled;
        slot.ticket = ticket;
        slot.pool = self.core.id;
        self.core.enqueue(job.runnable(), ticket);
    }

    /// Cancel `job` if it has not started (`cancel_job_async`).
    ///
    /// Returns true if the job is now neither scheduled nor running, false
    /// if it is running and will finish on its own.
    pub fn cancel_job_async<T: Send + 'static>(&self, job: &Job<T>) -> bool {
        let mut slot = lock(&job.shared.slot);
        match slot.state {
            JobState::Idle => true,
            JobState::Scheduled => {
                if slot.pool != self.core.id {
                    kwarn!("job {}: cancelled through a pool it is not queued on", job.name());
                }
                self.core.dequeue(slot.ticket);
                slot.state = JobState::Idle;
                job.shared.cv.notify_all();
                true
            }
            JobState::Running | JobState::Cancelling => false,
        }
    }

    /// Cancel `job`, waiting for a running invocation to call `done`
    /// (`cancel_job`).
    ///
    /// On return the job is neither scheduled nor running. Must not be
    /// called from the job's own callback.
    pub fn cancel_job<T: Send + 'static>(&self, job: &Job<T>) {
        let mut slot = lock(&job.shared.slot);
        loop {
            match slot.state {
                JobState::Idle => return,
                JobState::Scheduled => {
                    self.core.dequeue(slot.ticket);
                    slot.state = JobState::Idle;
                    job.shared.cv.notify_all();
                    return;
                }
                JobState::Running | JobState::Cancelling => {
                    // Rescheduled while we slept: loop and cancel that too.
                    slot = job.shared.wait_not_running(slot);
                }
            }
        }
    }
}

impl Drop for ThreadPool {
    fn drop(&mut self) {
        let core = &self.core;
        let own_thread = tls::owner_pool() == core.id;
        let mut st = lock(&core.state);
        st.dying = true;
        core.worker_cv.notify_all();
        core.overseer_cv.notify_all();

        if own_thread {
            // Dropped from one of this pool's jobs; the remaining threads
            // drain the queue and exit on their own.
            kdebug!("{}: released from its own thread", core.thread_name("pool"));
            return;
        }

        while st.nthreads > 0 || st.overseer_alive {
            st = wait(&core.exit_cv, st);
        }
        let leftovers: Vec<Queued> = st.jobs.drain(..).collect();
        drop(st);

        for q in leftovers {
            kwarn!("{}: job {} dropped at teardown", core.thread_name("pool"), q.job.name());
            q.job.abandon(q.ticket);
        }
        if let Some(handle) = lock(&self.overseer).take() {
            let _ = handle.join();
        }
        kdebug!("destroyed {}", core.thread_name("pool"));
    }
}

impl std::fmt::Debug for ThreadPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ThreadPool")
            .field("pri", &self.core.pri)
            .field("cpu", &self.core.cpu)
            .field("stats", &self.stats())
            .finish()
    }
}
