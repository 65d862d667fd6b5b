//! Cross-call dispatcher
//!
//! Lets any thread request that a function run on one CPU or on every
//! online CPU, executed by a dedicated worker thread bound to each CPU.
//!
//! Only low-priority (thread context) cross-calls exist. They are rare, so
//! a single payload slot serialises them: an initiator waits until the
//! previous call has been consumed by every targeted CPU (`head == tail`)
//! before installing its own `(func, arg1, arg2)`.
//!
//! ```text
//!   initiator                         xcall/N worker
//!   ---------                         --------------
//!   lock; wait head == tail           lock
//!   install payload                   while !pending[N]: wait cpu_cv[N]
//!   head += 1, pending[N] = true      pending[N] = false; copy payload
//!   signal cpu_cv[N]                  tail += 1; unlock
//!   return generation = head          func(arg1, arg2)
//!                                     lock; done += 1; signal busy
//!   wait(gen): lock; while done < gen: wait busy
//! ```
//!
//! Workers also broadcast `busy` whenever they go idle with the slot drained.

use crate::cpu::CpuTable;
use crate::sync::{lock, wait};
use ksubr_core::{kdebug, kerror, kwarn, CpuId, KError, KResult, ResourceError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};

/// Function executed by a cross-call
pub type XcFunc = Arc<dyn Fn(usize, usize) + Send + Sync>;

/// Cross-call dispatch flags
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct XcFlags(u32);

impl XcFlags {
    /// Low-priority dispatch through the per-CPU threads
    pub const NONE: XcFlags = XcFlags(0);

    /// Interrupt-context dispatch (not implemented)
    pub const HIGHPRI: XcFlags = XcFlags(0x01);

    #[inline]
    pub const fn contains(self, other: XcFlags) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }
}

impl std::ops::BitOr for XcFlags {
    type Output = XcFlags;
    fn bitor(self, rhs: XcFlags) -> XcFlags {
        XcFlags(self.0 | rhs.0)
    }
}

/// Token identifying a dispatched cross-call, consumed by `wait`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct XcGeneration(u64);

impl XcGeneration {
    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

/// Event counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct XcallStats {
    pub broadcasts: u64,
    pub unicasts: u64,
    /// Per-CPU executions completed so far
    pub completed: u64,
}

struct XcState {
    func: Option<XcFunc>,
    arg1: usize,
    arg2: usize,
    /// Per-CPU requests issued
    headp: u64,
    /// Per-CPU requests taken by a worker
    tailp: u64,
    /// Per-CPU requests finished
    donep: u64,
    pending: Vec<bool>,
    attached: Vec<bool>,
    exiting: bool,
}

struct XcShared {
    state: Mutex<XcState>,
    busy: Condvar,
    cpu_cv: Box<[Condvar]>,
    cpus: Arc<CpuTable>,
    broadcasts: AtomicU64,
    unicasts: AtomicU64,
}

/// The cross-call service: one payload slot, one worker per CPU.
pub struct XcallService {
    shared: Arc<XcShared>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl XcallService {
    /// Create the shared state. No worker runs until `init_cpu`.
    pub fn new(cpus: Arc<CpuTable>) -> Self {
        let ncpu = cpus.ncpu();
        let shared = Arc::new(XcShared {
            state: Mutex::new(XcState {
                func: None,
                arg1: 0,
                arg2: 0,
                headp: 0,
                tailp: 0,
                donep: 0,
                pending: vec![false; ncpu],
                attached: vec![false; ncpu],
                exiting: false,
            }),
            busy: Condvar::new(),
            cpu_cv: (0..ncpu).map(|_| Condvar::new()).collect(),
            cpus,
            broadcasts: AtomicU64::new(0),
            unicasts: AtomicU64::new(0),
        });
        Self {
            shared,
            workers: Mutex::new(Vec::with_capacity(ncpu)),
        }
    }

    /// Bring up the cross-call worker for `cpu`. Calling it twice for the
    /// same CPU is harmless.
    pub fn init_cpu(&self, cpu: CpuId) -> KResult<()> {
        self.shared.cpus.check(cpu)?;
        {
            let mut st = lock(&self.shared.state);
            if st.attached[cpu.index()] {
                return Ok(());
            }
            st.attached[cpu.index()] = true;
        }

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(format!("xcall/{}", cpu))
            .spawn(move || xc_thread(shared, cpu));
        match spawned {
            Ok(handle) => {
                lock(&self.workers).push(handle);
                kdebug!("cpu {} attached", cpu);
                Ok(())
            }
            Err(e) => {
                kwarn!("failed to spawn xcall thread for cpu {}: {}", cpu, e);
                lock(&self.shared.state).attached[cpu.index()] = false;
                Err(ResourceError::SpawnFailed.into())
            }
        }
    }

    /// Whether `cpu` has a cross-call worker
    pub fn is_attached(&self, cpu: CpuId) -> bool {
        lock(&self.shared.state)
            .attached
            .get(cpu.index())
            .copied()
            .unwrap_or(false)
    }

    /// Run `func(arg1, arg2)` on every online CPU.
    ///
    /// # Panics
    ///
    /// Panics if `flags` requests high-priority dispatch.
    pub fn broadcast<F>(&self, flags: XcFlags, func: F, arg1: usize, arg2: usize) -> XcGeneration
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        check_flags(flags);
        self.shared.broadcasts.fetch_add(1, Ordering::Relaxed);
        self.lowpri(Arc::new(func), arg1, arg2, None)
    }

    /// Run `func(arg1, arg2)` on `cpu` only.
    ///
    /// Fails with `InvalidArgument` if `cpu` is out of range or has no
    /// cross-call worker.
    ///
    /// # Panics
    ///
    /// Panics if `flags` requests high-priority dispatch.
    pub fn unicast<F>(
        &self,
        flags: XcFlags,
        func: F,
        arg1: usize,
        arg2: usize,
        cpu: CpuId,
    ) -> KResult<XcGeneration>
    where
        F: Fn(usize, usize) + Send + Sync + 'static,
    {
        check_flags(flags);
        self.shared.cpus.check(cpu)?;
        if !self.is_attached(cpu) {
            return Err(KError::InvalidArgument("cpu has no cross-call worker"));
        }
        self.shared.unicasts.fetch_add(1, Ordering::Relaxed);
        Ok(self.lowpri(Arc::new(func), arg1, arg2, Some(cpu)))
    }

    /// Block until every CPU targeted by the call that produced `gen` has
    /// finished running it.
    pub fn wait(&self, gen: XcGeneration) {
        let mut st = lock(&self.shared.state);
        while st.donep < gen.0 {
            st = wait(&self.shared.busy, st);
        }
    }

    /// Non-blocking completion check
    pub fn is_done(&self, gen: XcGeneration) -> bool {
        lock(&self.shared.state).donep >= gen.0
    }

    /// Snapshot of the event counters
    pub fn stats(&self) -> XcallStats {
        XcallStats {
            broadcasts: self.shared.broadcasts.load(Ordering::Relaxed),
            unicasts: self.shared.unicasts.load(Ordering::Relaxed),
            completed: lock(&self.shared.state).donep,
        }
    }

    fn lowpri(&self, func: XcFunc, arg1: usize, arg2: usize, target: Option<CpuId>) -> XcGeneration {
        let shared = &self.shared;
        let mut st = lock(&shared.state);
        while st.headp != st.tailp {
            st = wait(&shared.busy, st);
        }

        st.func = Some(func);
        st.arg1 = arg1;
        st.arg2 = arg2;

        match target {
            None => {
                for cpu in shared.cpus.iter() {
                    let i = cpu.index();
                    if !st.attached[i] || !shared.cpus.is_online(cpu) {
                        continue;
                    }
                    st.headp += 1;
                    st.pending[i] = true;
                    shared.cpu_cv[i].notify_one();
                }
            }
            Some(cpu) => {
                let i = cpu.index();
                st.headp += 1;
                st.pending[i] = true;
                shared.cpu_cv[i].notify_one();
            }
        }

        XcGeneration(st.headp)
    }
}

impl Drop for XcallService {
    fn drop(&mut self) {
        {
            let mut st = lock(&self.shared.state);
            st.exiting = true;
            for cv in self.shared.cpu_cv.iter() {
                cv.notify_all();
            }
        }
        for handle in lock(&self.workers).drain(..) {
            let _ = handle.join();
        }
    }
}

fn check_flags(flags: XcFlags) {
    if flags.contains(XcFlags::HIGHPRI) {
        panic!("xcall: high priority cross-calls are not implemented");
    }
}

/// Per-CPU cross-call worker.
fn xc_thread(shared: Arc<XcShared>, cpu: CpuId) {
    if let Err(e) = shared.cpus.bind_current_thread(cpu) {
        kwarn!("cpu {}: running unbound: {}", cpu, e);
    }
    let i = cpu.index();

    let mut st = lock(&shared.state);
    loop {
        while !st.pending[i] {
            if st.exiting {
                return;
            }
            if st.headp == st.tailp {
                shared.busy.notify_all();
            }
            st = wait(&shared.cpu_cv[i], st);
        }

        st.pending[i] = false;
        let func = st.func.clone();
        let (arg1, arg2) = (st.arg1, st.arg2);
        st.tailp += 1;
        drop(st);

        if let Some(func) = func {
            if catch_unwind(AssertUnwindSafe(|| func(arg1, arg2))).is_err() {
                kerror!("cpu {}: cross-call function panicked", cpu);
            }
        }

        st = lock(&shared.state);
        st.donep += 1;
        shared.busy.notify_all();
    }
}
