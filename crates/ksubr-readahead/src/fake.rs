//! Fake backing objects for tests

use crate::backing::{BackingObject, Protection};
use ksubr_core::constants::PAGE_SIZE;
use ksubr_core::PageInError;
use std::sync::Mutex;

/// Records every page-in; optionally has a size and a failing offset
pub(crate) struct RecordingObject {
    pub(crate) size: Option<u64>,
    pub(crate) fail_at: Option<(u64, PageInError)>,
    pub(crate) calls: Mutex<Vec<(u64, usize)>>,
}

impl RecordingObject {
    pub(crate) fn new() -> Self {
        Self {
            size: None,
            fail_at: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn with_size(size: u64) -> Self {
        Self {
            size: Some(size),
            ..Self::new()
        }
    }

    pub(crate) fn failing_at(offset: u64, err: PageInError) -> Self {
        Self {
            fail_at: Some((offset, err)),
            ..Self::new()
        }
    }

    pub(crate) fn calls(&self) -> Vec<(u64, usize)> {
        self.calls.lock().unwrap().clone()
    }

    /// Byte ranges `[start, end)` requested so far
    pub(crate) fn ranges(&self) -> Vec<(u64, u64)> {
        self.calls()
            .into_iter()
            .map(|(off, n)| (off, off + (n * PAGE_SIZE) as u64))
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }
}

impl BackingObject for RecordingObject {
    fn page_in(&self, offset: u64, npages: usize, prot: Protection) -> Result<usize, PageInError> {
        assert!(prot.contains(Protection::READ));
        assert_eq!(offset % PAGE_SIZE as u64, 0, "unaligned page-in at {}", offset);
        assert!(npages > 0);
        if let Some((at, err)) = self.fail_at {
            if offset >= at {
                return Err(err);
            }
        }
        if let Some(size) = self.size {
            if offset >= size {
                return Err(PageInError::OutOfRange);
            }
            let avail = ((size - offset) as usize + PAGE_SIZE - 1) / PAGE_SIZE;
            let done = npages.min(avail);
            self.calls.lock().unwrap().push((offset, done));
            return Ok(done);
        }
        self.calls.lock().unwrap().push((offset, npages));
        Ok(npages)
    }
}
