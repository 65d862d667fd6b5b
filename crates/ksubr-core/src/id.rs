//! CPU identifier type

use core::fmt;

/// Identifier of a logical CPU modelled by the runtime
///
/// CPUs are numbered densely from zero. The maximum value (u32::MAX) is
/// reserved as a sentinel for "not bound to any CPU".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct CpuId(u32);

impl CpuId {
    /// Sentinel value indicating no CPU
    pub const NONE: CpuId = CpuId(u32::MAX);

    /// Create a new CpuId from a raw index
    #[inline]
    pub const fn new(id: u32) -> Self {
        CpuId(id)
    }

    /// Get the raw u32 value
    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }

    /// Get as usize for indexing per-CPU tables
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// Whether this is the unbound sentinel
    #[inline]
    pub const fn is_none(self) -> bool {
        self.0 == Self::NONE.0
    }

    /// Convert to Option
    #[inline]
    pub const fn to_option(self) -> Option<CpuId> {
        if self.is_none() {
            None
        } else {
            Some(self)
        }
    }
}

impl From<usize> for CpuId {
    #[inline]
    fn from(id: usize) -> Self {
        CpuId(id as u32)
    }
}

impl From<CpuId> for usize {
    #[inline]
    fn from(id: CpuId) -> Self {
        id.0 as usize
    }
}

impl fmt::Debug for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_option() {
            Some(cpu) => write!(f, "CpuId({})", cpu.0),
            None => f.write_str("CpuId(NONE)"),
        }
    }
}

/// Bare index, or `-` for an unbound pool's thread names
impl fmt::Display for CpuId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_option() {
            Some(cpu) => fmt::Display::fmt(&cpu.0, f),
            None => f.write_str("-"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_sentinel() {
        assert!(CpuId::NONE.is_none());
        assert_eq!(CpuId::NONE.to_option(), None);
        assert_eq!(CpuId::new(3).to_option(), Some(CpuId::new(3)));
    }

    #[test]
    fn test_display() {
        assert_eq!(format!("{}", CpuId::new(7)), "7");
        assert_eq!(format!("{}", CpuId::NONE), "-");
        assert_eq!(format!("{:?}", CpuId::from(2usize)), "CpuId(2)");
    }
}
