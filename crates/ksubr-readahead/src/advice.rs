//! Access-pattern advice

use ksubr_core::KError;
use std::fmt;

/// Caller's hint about how a handle will be read.
///
/// Discriminants match the POSIX `fadvise` codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i32)]
pub enum Advice {
    /// No hint: adapt to the observed pattern
    #[default]
    Normal = 0,
    /// Reads jump around; never prefetch
    Random = 1,
    /// Reads stream forward; prefetch a large fixed window
    Sequential = 2,
}

impl TryFrom<i32> for Advice {
    type Error = KError;

    fn try_from(code: i32) -> Result<Self, KError> {
        match code {
            0 => Ok(Advice::Normal),
            1 => Ok(Advice::Random),
            2 => Ok(Advice::Sequential),
            _ => Err(KError::InvalidArgument("unknown read-ahead advice")),
        }
    }
}

impl fmt::Display for Advice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Advice::Normal => write!(f, "normal"),
            Advice::Random => write!(f, "random"),
            Advice::Sequential => write!(f, "sequential"),
        }
    }
}
