//! Error types shared by the ksubr crates

use core::fmt;

/// Result type for ksubr operations
pub type KResult<T> = Result<T, KError>;

/// Errors that can occur in ksubr operations
///
/// Requests for unimplemented modes (high-priority cross-calls) are not
/// represented here: they panic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KError {
    /// Caller passed a recognised-but-out-of-domain value
    InvalidArgument(&'static str),

    /// Thread or memory exhaustion; always recoverable by the caller
    ResourceUnavailable(ResourceError),

    /// Backing object could not fault in the requested pages
    PageIn(PageInError),

    /// Service used before it was initialised
    NotInitialized,
}

impl fmt::Display for KError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KError::InvalidArgument(what) => write!(f, "invalid argument: {}", what),
            KError::ResourceUnavailable(e) => write!(f, "resource unavailable: {}", e),
            KError::PageIn(e) => write!(f, "page-in failed: {}", e),
            KError::NotInitialized => write!(f, "service not initialized"),
        }
    }
}

impl std::error::Error for KError {}

/// Resource exhaustion causes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// The OS refused to create a thread
    SpawnFailed,

    /// Pool reached its configured thread bound
    ThreadLimit,

    /// More CPUs requested than the runtime models
    CpuLimit,
}

impl fmt::Display for ResourceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResourceError::SpawnFailed => write!(f, "failed to spawn thread"),
            ResourceError::ThreadLimit => write!(f, "thread limit reached"),
            ResourceError::CpuLimit => write!(f, "cpu limit exceeded"),
        }
    }
}

impl From<ResourceError> for KError {
    fn from(e: ResourceError) -> Self {
        KError::ResourceUnavailable(e)
    }
}

/// Page-in failure causes reported by a backing object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageInError {
    /// Offset lies past the end of the object (EINVAL)
    OutOfRange,

    /// Device error with the underlying errno
    Io(i32),

    /// No memory for page frames
    NoMemory,

    /// Pages are busy and the caller asked not to wait
    Busy,
}

impl PageInError {
    /// Check if this is the expected end-of-object condition
    ///
    /// Read-ahead routinely runs off the end of a file; only the other
    /// kinds are worth logging.
    #[inline]
    pub const fn is_out_of_range(&self) -> bool {
        matches!(self, PageInError::OutOfRange)
    }

    /// Equivalent errno value
    pub const fn errno(&self) -> i32 {
        match self {
            PageInError::OutOfRange => 22, // EINVAL
            PageInError::Io(e) => *e,
            PageInError::NoMemory => 12, // ENOMEM
            PageInError::Busy => 16,     // EBUSY
        }
    }
}

impl fmt::Display for PageInError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PageInError::OutOfRange => write!(f, "offset out of range"),
            PageInError::Io(errno) => write!(f, "i/o error (errno {})", errno),
            PageInError::NoMemory => write!(f, "out of memory"),
            PageInError::Busy => write!(f, "pages busy"),
        }
    }
}

impl From<PageInError> for KError {
    fn from(e: PageInError) -> Self {
        KError::PageIn(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let e = KError::InvalidArgument("advice");
        assert_eq!(format!("{}", e), "invalid argument: advice");

        let e = KError::ResourceUnavailable(ResourceError::SpawnFailed);
        assert_eq!(format!("{}", e), "resource unavailable: failed to spawn thread");

        let e = KError::PageIn(PageInError::Io(5));
        assert_eq!(format!("{}", e), "page-in failed: i/o error (errno 5)");
    }

    #[test]
    fn test_error_conversion() {
        let e: KError = ResourceError::ThreadLimit.into();
        assert!(matches!(e, KError::ResourceUnavailable(ResourceError::ThreadLimit)));

        let e: KError = PageInError::OutOfRange.into();
        assert!(matches!(e, KError::PageIn(PageInError::OutOfRange)));
    }

    #[test]
    fn test_out_of_range_classification() {
        assert!(PageInError::OutOfRange.is_out_of_range());
        assert!(!PageInError::Io(5).is_out_of_range());
        assert!(!PageInError::NoMemory.is_out_of_range());
        assert_eq!(PageInError::OutOfRange.errno(), 22);
        assert_eq!(PageInError::Io(5).errno(), 5);
    }
}
