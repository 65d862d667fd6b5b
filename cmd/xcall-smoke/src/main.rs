//! Cross-call and thread pool smoke test
//!
//! Boots a machine, broadcasts and unicasts cross-calls, runs jobs on an
//! unbound pool and on every member of a per-CPU pool, and checks the
//! results.
//!
//! # Environment Variables
//!
//! - `KSUBR_NCPU=8` - number of modelled CPUs
//! - `KSUBR_LOG_LEVEL=debug` - show thread and pool lifecycle
//! - `XCALL_ROUNDS=100` - broadcast rounds

use ksubr::{
    env_get, kdebug, kinfo, CpuId, Job, JobGuard, JobState, Machine, Priority, RuntimeConfig,
    XcFlags,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

fn fail(msg: &str) -> ! {
    eprintln!("FAIL: {}", msg);
    std::process::exit(1);
}

fn main() {
    println!("=== xcall-smoke ===\n");

    let config = RuntimeConfig::from_env();
    let machine = match Machine::boot(config) {
        Ok(m) => m,
        Err(e) => fail(&format!("boot: {}", e)),
    };
    let ncpu = machine.cpus().ncpu();
    let rounds: usize = env_get("XCALL_ROUNDS", 100);
    kinfo!("booted {} cpus", ncpu);

    // Broadcast: every CPU adds its argument once per round
    let sum = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    for round in 0..rounds {
        let s = sum.clone();
        let gen = machine.xcall().broadcast(
            XcFlags::NONE,
            move |a, _| {
                s.fetch_add(a, Ordering::SeqCst);
            },
            round,
            0,
        );
        machine.xcall().wait(gen);
    }
    let expect = ncpu * (0..rounds).sum::<usize>();
    if sum.load(Ordering::SeqCst) != expect {
        fail(&format!("broadcast sum {} != {}", sum.load(Ordering::SeqCst), expect));
    }
    println!("broadcast: {} rounds x {} cpus in {:?}", rounds, ncpu, start.elapsed());

    // Unicast: each CPU records that it ran
    let seen: Arc<Vec<AtomicUsize>> = Arc::new((0..ncpu).map(|_| AtomicUsize::new(0)).collect());
    for cpu in machine.cpus().iter() {
        let s = seen.clone();
        let cpus = machine.cpus().clone();
        let gen = match machine.xcall().unicast(
            XcFlags::NONE,
            move |_, _| {
                s[cpus.curcpu().index()].fetch_add(1, Ordering::SeqCst);
            },
            0,
            0,
            cpu,
        ) {
            Ok(gen) => gen,
            Err(e) => fail(&format!("unicast to {}: {}", cpu, e)),
        };
        machine.xcall().wait(gen);
    }
    if seen.iter().any(|c| c.load(Ordering::SeqCst) != 1) {
        fail("unicast did not run exactly once per cpu");
    }
    if machine.xcall().unicast(XcFlags::NONE, |_, _| {}, 0, 0, CpuId::from(ncpu)).is_ok() {
        fail("unicast to a missing cpu was accepted");
    }
    println!("unicast: ok, stats {:?}", machine.xcall().stats());

    // Unbound pool
    let pool = match machine.pools().get_unbound(Priority::Normal) {
        Ok(p) => p,
        Err(e) => fail(&format!("pool: {}", e)),
    };
    let jobs: Vec<_> = (0..16)
        .map(|i| {
            Job::new(format!("smoke{}", i), 0u32, |job: &mut JobGuard<'_, u32>| {
                **job += 1;
                job.done();
            })
        })
        .collect();
    for job in &jobs {
        pool.schedule_job(job);
    }
    let deadline = Instant::now() + Duration::from_secs(10);
    while jobs.iter().any(|j| j.state() != JobState::Idle || *j.lock() == 0) {
        if Instant::now() > deadline {
            fail("pool jobs did not complete");
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    println!("unbound pool: 16 jobs, {:?}", pool.stats());

    // Per-CPU pools: one job per CPU, each must run on its CPU
    let percpu = match machine.pools().get_percpu(Priority::High) {
        Ok(p) => p,
        Err(e) => fail(&format!("percpu pool: {}", e)),
    };
    let mismatches = Arc::new(AtomicUsize::new(0));
    let pjobs: Vec<_> = machine
        .cpus()
        .iter()
        .map(|cpu| {
            let cpus = machine.cpus().clone();
            let m = mismatches.clone();
            Job::new(format!("percpu{}", cpu), false, move |job: &mut JobGuard<'_, bool>| {
                if cpus.curcpu() != cpu {
                    m.fetch_add(1, Ordering::SeqCst);
                }
                **job = true;
                job.done();
            })
        })
        .collect();
    for (cpu, job) in machine.cpus().iter().zip(&pjobs) {
        match percpu.percpu_ref_remote(cpu) {
            Ok(p) => p.schedule_job(job),
            Err(e) => fail(&format!("percpu_ref_remote({}): {}", cpu, e)),
        }
    }
    for (cpu, job) in machine.cpus().iter().zip(&pjobs) {
        if let Ok(p) = percpu.percpu_ref_remote(cpu) {
            p.cancel_job(job);
        }
    }
    let ran = pjobs.iter().filter(|j| *j.lock()).count();
    kdebug!("per-cpu jobs ran: {} of {}", ran, ncpu);
    if mismatches.load(Ordering::SeqCst) != 0 {
        fail("per-cpu job ran on the wrong cpu");
    }
    println!("per-cpu pools: {} ran before cancel, 0 on the wrong cpu", ran);

    machine.pools().put_percpu(percpu, Priority::High);
    machine.pools().put_unbound(pool, Priority::Normal);
    println!("\nPASS");
}
