//! Backing object interface
//!
//! Read-ahead never reads data itself. It asks the object that owns the
//! pages (a file's page cache, a block device, a test fake) to fault a
//! range in ahead of time.

use ksubr_core::PageInError;

/// Page protection requested for a page-in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Protection(u8);

impl Protection {
    pub const NONE: Protection = Protection(0);
    pub const READ: Protection = Protection(0x01);
    pub const WRITE: Protection = Protection(0x02);
    pub const EXECUTE: Protection = Protection(0x04);

    #[inline]
    pub const fn bits(&self) -> u8 {
        self.0
    }

    #[inline]
    pub const fn contains(&self, other: Protection) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for Protection {
    type Output = Protection;

    fn bitor(self, rhs: Protection) -> Protection {
        Protection(self.0 | rhs.0)
    }
}

/// An object whose pages can be faulted in ahead of use
pub trait BackingObject: Send + Sync {
    /// Fault in `npages` pages starting at the page-aligned byte `offset`.
    ///
    /// Returns the number of pages actually made resident; fewer than
    /// requested means the object ended or stopped early.
    /// `PageInError::OutOfRange` reports an offset past the end.
    fn page_in(&self, offset: u64, npages: usize, prot: Protection) -> Result<usize, PageInError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protection_bits() {
        let rw = Protection::READ | Protection::WRITE;
        assert!(rw.contains(Protection::READ));
        assert!(rw.contains(Protection::WRITE));
        assert!(!rw.contains(Protection::EXECUTE));
        assert!(rw.contains(Protection::NONE));
        assert_eq!(rw.bits(), 0x03);
    }
}
