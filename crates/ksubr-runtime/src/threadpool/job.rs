//! Thread pool jobs
//!
//! A job couples a callback with the lock that guards its owner's private
//! state. The lock lives inside the job (`Job<T>` owns a `Mutex` around
//! `T`), so "the job's lock" and "the owner's data" are the same object.
//!
//! The pool acquires the lock before invoking the callback. The callback
//! sees a `JobGuard`, may release the lock around long work with
//! `JobGuard::unlocked`, and signals completion with `JobGuard::done`
//! while holding it. The guard is released when the callback returns.

use crate::sync::{lock, wait};
use ksubr_core::{kerror, kwarn, JobState};
use std::ops::{Deref, DerefMut};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// Tickets identify one scheduling of one job; queue entries whose ticket
/// no longer matches the job are stale and skipped.
static NEXT_TICKET: AtomicU64 = AtomicU64::new(1);

#[inline]
pub(crate) fn next_ticket() -> u64 {
    NEXT_TICKET.fetch_add(1, Ordering::Relaxed)
}

/// Type-erased view of a job, as stored on a pool queue
pub(crate) trait Runnable: Send + Sync {
    /// Claim and execute the job if `ticket` is still current
    fn run(&self, ticket: u64);

    /// Return a queued job to Idle because its pool went away
    fn abandon(&self, ticket: u64);

    fn name(&self) -> &str;
}

pub(crate) struct JobSlot<T> {
    pub(crate) state: JobState,
    pub(crate) ticket: u64,
    /// Identity of the pool the job is queued on or running in
    pub(crate) pool: u64,
    data: T,
}

type JobFn<T> = Box<dyn Fn(&mut JobGuard<'_, T>) + Send + Sync>;

pub(crate) struct JobShared<T> {
    name: String,
    func: JobFn<T>,
    pub(crate) slot: Mutex<JobSlot<T>>,
    pub(crate) cv: Condvar,
}

/// A unit of work that can be scheduled on any `ThreadPool`.
///
/// `T` is the owner's private state, guarded by the job's lock.
pub struct Job<T: Send + 'static> {
    pub(crate) shared: Arc<JobShared<T>>,
}

impl<T: Send + 'static> Job<T> {
    /// Create an Idle job (`job_init`).
    ///
    /// `func` runs on a pool worker with the job's lock held and must call
    /// `JobGuard::done` before returning.
    pub fn new<F>(name: impl Into<String>, data: T, func: F) -> Self
    where
        F: Fn(&mut JobGuard<'_, T>) + Send + Sync + 'static,
    {
        Self {
            shared: Arc::new(JobShared {
                name: name.into(),
                func: Box::new(func),
                slot: Mutex::new(JobSlot {
                    state: JobState::Idle,
                    ticket: 0,
                    pool: 0,
                    data,
                }),
                cv: Condvar::new(),
            }),
        }
    }

    /// Job name, used in diagnostics
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Current state of the job
    pub fn state(&self) -> JobState {
        lock(&self.shared.slot).state
    }

    /// Acquire the job's lock to inspect or update the owner's state.
    ///
    /// Do not call pool operations on this job while holding the guard;
    /// they take the same lock.
    pub fn lock(&self) -> JobGuard<'_, T> {
        JobGuard {
            shared: &self.shared,
            slot: Some(lock(&self.shared.slot)),
        }
    }

    /// Block until the job is neither scheduled nor running.
    ///
    /// Unlike `ThreadPool::cancel_job` this lets a queued job run first.
    /// Must not be called from the job's own callback.
    pub fn wait_idle(&self) {
        let mut slot = lock(&self.shared.slot);
        while slot.state != JobState::Idle {
            slot = wait(&self.shared.cv, slot);
        }
    }

    /// Release the job (`job_destroy`).
    ///
    /// # Panics
    ///
    /// Panics if the job is scheduled or running.
    pub fn destroy(self) {
        let state = self.state();
        assert!(
            state == JobState::Idle,
            "job {} destroyed while {}",
            self.shared.name,
            state
        );
    }

    pub(crate) fn runnable(&self) -> Arc<dyn Runnable> {
        Arc::clone(&self.shared) as Arc<dyn Runnable>
    }
}

impl<T: Send + 'static> std::fmt::Debug for Job<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.shared.name)
            .field("state", &self.state())
            .finish()
    }
}

/// The job's lock, held.
///
/// Dereferences to the owner's state.
pub struct JobGuard<'a, T> {
    shared: &'a JobShared<T>,
    slot: Option<MutexGuard<'a, JobSlot<T>>>,
}

impl<'a, T> JobGuard<'a, T> {
    fn slot(&self) -> &JobSlot<T> {
        self.slot.as_deref().expect("job lock not held")
    }

    fn slot_mut(&mut self) -> &mut JobSlot<T> {
        self.slot.as_deref_mut().expect("job lock not held")
    }

    /// Current state of the job
    pub fn state(&self) -> JobState {
        self.slot().state
    }

    /// Name of the job
    pub fn name(&self) -> &str {
        &self.shared.name
    }

    /// Signal completion (`job_done`).
    ///
    /// Returns the job to Idle and wakes anyone blocked in `cancel_job`.
    /// The lock stays held.
    pub fn done(&mut self) {
        let name = &self.shared.name;
        let slot = self.slot.as_deref_mut().expect("job lock not held");
        if !slot.state.is_running() {
            kwarn!("job {}: done while {}", name, slot.state);
            return;
        }
        slot.state = JobState::Idle;
        self.shared.cv.notify_all();
    }

    /// Run `f` with the job's lock released, then re-acquire it.
    pub fn unlocked<R>(&mut self, f: impl FnOnce() -> R) -> R {
        self.slot = None;
        let r = f();
        self.slot = Some(lock(&self.shared.slot));
        r
    }

    fn relock(&mut self) {
        if self.slot.is_none() {
            self.slot = Some(lock(&self.shared.slot));
        }
    }
}

impl<'a, T> Deref for JobGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.slot().data
    }
}

impl<'a, T> DerefMut for JobGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.slot_mut().data
    }
}

impl<T: Send + 'static> Runnable for JobShared<T> {
    fn run(&self, ticket: u64) {
        let mut guard = JobGuard {
            shared: self,
            slot: Some(lock(&self.slot)),
        };
        {
            let slot = guard.slot_mut();
            if slot.state != JobState::Scheduled || slot.ticket != ticket {
                // Cancelled, or superseded by a later scheduling
                return;
            }
            slot.state = JobState::Running;
        }

        let result = catch_unwind(AssertUnwindSafe(|| (self.func)(&mut guard)));
        guard.relock();

        let still_running = {
            let slot = guard.slot();
            slot.ticket == ticket && slot.state.is_running()
        };
        match result {
            Err(_) => kerror!("job {}: callback panicked", self.name),
            Ok(()) if still_running => kwarn!("job {}: returned without job_done", self.name),
            Ok(()) => {}
        }
        if still_running {
            guard.done();
        }
    }

    fn abandon(&self, ticket: u64) {
        let mut slot = lock(&self.slot);
        if slot.state == JobState::Scheduled && slot.ticket == ticket {
            slot.state = JobState::Idle;
            self.cv.notify_all();
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<T> JobShared<T> {
    /// Block until the job leaves the Running/Cancelling states.
    pub(crate) fn wait_not_running<'a>(
        &'a self,
        mut slot: MutexGuard<'a, JobSlot<T>>,
    ) -> MutexGuard<'a, JobSlot<T>> {
        while slot.state.is_running() {
            if slot.state == JobState::Running {
                slot.state = JobState::Cancelling;
            }
            slot = wait(&self.cv, slot);
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_is_idle() {
        let job = Job::new("idle", 0u32, |g: &mut JobGuard<'_, u32>| g.done());
        assert_eq!(job.state(), JobState::Idle);
        assert_eq!(job.name(), "idle");
        job.destroy();
    }

    #[test]
    fn test_lock_gives_owner_data() {
        let job = Job::new("data", vec![1, 2], |g: &mut JobGuard<'_, Vec<i32>>| g.done());
        {
            let mut g = job.lock();
            g.push(3);
        }
        assert_eq!(*job.lock(), vec![1, 2, 3]);
    }

    #[test]
    fn test_run_skips_stale_ticket() {
        let job = Job::new("stale", 0u32, |g: &mut JobGuard<'_, u32>| {
            **g += 1;
            g.done();
        });
        {
            let mut slot = lock(&job.shared.slot);
            slot.state = JobState::Scheduled;
            slot.ticket = 7;
        }
        job.shared.run(6);
        assert_eq!(*job.lock(), 0);
        job.shared.run(7);
        assert_eq!(*job.lock(), 1);
        assert_eq!(job.state(), JobState::Idle);
    }

    #[test]
    fn test_run_completes_forgetful_callback() {
        ksubr_core::kprint::set_log_level(ksubr_core::kprint::LogLevel::Off);
        let job = Job::new("forgetful", (), |_g: &mut JobGuard<'_, ()>| {});
        {
            let mut slot = lock(&job.shared.slot);
            slot.state = JobState::Scheduled;
            slot.ticket = 1;
        }
        job.shared.run(1);
        assert_eq!(job.state(), JobState::Idle);
    }

    #[test]
    fn test_run_contains_panic_in_unlocked_section() {
        ksubr_core::kprint::set_log_level(ksubr_core::kprint::LogLevel::Off);
        let job = Job::new("panicky", 5u32, |g: &mut JobGuard<'_, u32>| {
            g.unlocked(|| panic!("boom"));
        });
        {
            let mut slot = lock(&job.shared.slot);
            slot.state = JobState::Scheduled;
            slot.ticket = 3;
        }
        job.shared.run(3);
        assert_eq!(job.state(), JobState::Idle);
        assert_eq!(*job.lock(), 5);
    }

    #[test]
    fn test_abandon_only_matching_ticket() {
        let job = Job::new("abandon", (), |g: &mut JobGuard<'_, ()>| g.done());
        {
            let mut slot = lock(&job.shared.slot);
            slot.state = JobState::Scheduled;
            slot.ticket = 9;
        }
        job.shared.abandon(8);
        assert_eq!(job.state(), JobState::Scheduled);
        job.shared.abandon(9);
        assert_eq!(job.state(), JobState::Idle);
    }

    #[test]
    #[should_panic(expected = "destroyed while scheduled")]
    fn test_destroy_busy_job_panics() {
        let job = Job::new("busy", (), |g: &mut JobGuard<'_, ()>| g.done());
        lock(&job.shared.slot).state = JobState::Scheduled;
        job.destroy();
    }
}
