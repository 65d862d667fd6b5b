//! Chunked page-in

use crate::backing::{BackingObject, Protection};
use ksubr_core::constants::{PAGE_MASK, PAGE_SHIFT};
use ksubr_core::{kdebug, trunc_page};

/// Fault in `[off, off + size)` ahead of use.
///
/// The range is walked from the page containing `off` in pieces that end
/// on `io_chunk` boundaries, so requests from different readers of the
/// same object line up. The walk stops at the first error or short
/// page-in. Errors other than out-of-range are logged, never returned.
///
/// Returns the offset reached; a zero `io_chunk` issues nothing.
pub fn start_io(obj: &dyn BackingObject, off: u64, size: usize, io_chunk: usize) -> u64 {
    if io_chunk == 0 {
        return off;
    }
    let chunk = io_chunk as u64;
    let end = off.saturating_add(size as u64);
    let mut off = trunc_page(off);

    while off < end {
        let chunk_end = (off / chunk + 1) * chunk;
        let bytelen = chunk_end.min(end) - off;
        let npages = ((bytelen + PAGE_MASK) >> PAGE_SHIFT) as usize;

        match obj.page_in(off, npages, Protection::READ) {
            Ok(done) => {
                off += (done as u64) << PAGE_SHIFT;
                if done < npages {
                    break;
                }
            }
            Err(e) => {
                if !e.is_out_of_range() {
                    kdebug!("page-in at {} ({} pages) failed: {}", off, npages, e);
                }
                break;
            }
        }
    }
    off
}
