//! Read-ahead tracer
//!
//! Replays a read pattern against a simulated file and prints every
//! page-in the read-ahead policy issues, followed by the context stats.
//!
//! Usage: `ra-trace [seq|random|normal|stride] [normal|random|sequential] [--pool]`
//!
//! # Environment Variables
//!
//! - `KSUBR_LOG_LEVEL=trace` - show the policy's own decisions
//! - `RA_TRACE_FILE_MB` - simulated file size (default 16)
//! - `RA_TRACE_READ_KB` - read size (default 16)
//! - `KSUBR_RA_*` - read-ahead tunables

use ksubr::{
    env_get, kinfo, Advice, BackingObject, PageInError, Priority, Protection, ReadaheadContext,
    ReadaheadParams,
};
use ksubr::constants::PAGE_SIZE;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// A file of `size` bytes that logs page-ins instead of doing I/O
struct SimulatedFile {
    size: u64,
    pageins: AtomicU64,
    pages: AtomicU64,
}

impl BackingObject for SimulatedFile {
    fn page_in(&self, offset: u64, npages: usize, _prot: Protection) -> Result<usize, PageInError> {
        if offset >= self.size {
            return Err(PageInError::OutOfRange);
        }
        let avail = ((self.size - offset) as usize + PAGE_SIZE - 1) / PAGE_SIZE;
        let done = npages.min(avail);
        self.pageins.fetch_add(1, Ordering::Relaxed);
        self.pages.fetch_add(done as u64, Ordering::Relaxed);
        println!("  page-in  [{:>10}, {:>10})  {:>3} pages", offset, offset + (done * PAGE_SIZE) as u64, done);
        Ok(done)
    }
}

/// Offsets a reader with the given pattern would use
fn pattern(name: &str, size: u64, read: u64) -> Vec<u64> {
    let count = size / read;
    match name {
        "seq" => (0..count).map(|i| i * read).collect(),
        // Deterministic scatter: multiplicative step modulo the read count
        "random" => (0..count.min(256)).map(|i| ((i * 7919 + 17) % count) * read).collect(),
        // Mostly forward, with a jump every 32 reads
        "normal" => (0..count)
            .map(|i| {
                let block = i / 32;
                ((block * 97) % (count / 32).max(1)) * 32 * read + (i % 32) * read
            })
            .collect(),
        // Skip every other read
        "stride" => (0..count / 2).map(|i| 2 * i * read).collect(),
        _ => Vec::new(),
    }
}

fn main() {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let pat = args.first().map(String::as_str).unwrap_or("seq");
    let advice = match args.get(1).map(String::as_str).unwrap_or("normal") {
        "random" => Advice::Random,
        "sequential" => Advice::Sequential,
        _ => Advice::Normal,
    };
    let deferred = args.iter().any(|a| a == "--pool");

    let size: u64 = env_get("RA_TRACE_FILE_MB", 16u64) << 20;
    let read: u64 = env_get("RA_TRACE_READ_KB", 16u64).max(1) << 10;
    let offsets = pattern(pat, size, read);
    if offsets.is_empty() {
        eprintln!("unknown pattern {:?}; expected seq, random, normal or stride", pat);
        std::process::exit(2);
    }

    let params = ReadaheadParams::from_env();
    if let Err(e) = params.validate() {
        eprintln!("bad read-ahead parameters: {}", e);
        std::process::exit(2);
    }

    println!("=== ra-trace: pattern={} advice={} reads={} ===", pat, advice, offsets.len());
    kinfo!("{:?}", params);

    let file = Arc::new(SimulatedFile {
        size,
        pageins: AtomicU64::new(0),
        pages: AtomicU64::new(0),
    });
    let obj: Arc<dyn BackingObject> = file.clone();

    let mut ra = if deferred {
        match ksubr::pool_get(Priority::Low)
            .and_then(|pool| ReadaheadContext::with_pool(advice, params, pool))
        {
            Ok(ra) => ra,
            Err(e) => {
                eprintln!("cannot set up deferred prefetch: {}", e);
                std::process::exit(1);
            }
        }
    } else {
        ReadaheadContext::with_params(advice, params)
    };

    for &off in &offsets {
        println!("read     [{:>10}, {:>10})", off, off + read);
        ra.request(&obj, off, read as usize);
    }
    ra.flush();

    let stats = ra.stats();
    println!();
    println!("requests:          {}", stats.requests);
    println!("hits / misses:     {} / {}", stats.hits, stats.misses);
    println!("prefetch ranges:   {}", stats.prefetches);
    println!("bytes prefetched:  {}", stats.bytes_prefetched);
    println!("dropped (queue):   {}", stats.dropped);
    println!(
        "page-in calls:     {} ({} pages)",
        file.pageins.load(Ordering::Relaxed),
        file.pages.load(Ordering::Relaxed)
    );
    println!("final window:      {:?}", ra.window());
}
