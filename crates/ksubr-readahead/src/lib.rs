//! # ksubr-readahead
//!
//! Adaptive read-ahead: a per-handle policy that watches read offsets and
//! faults pages in from a backing object before the reader asks for them.
//!
//! ```ignore
//! use ksubr_readahead::{Advice, ReadaheadContext};
//!
//! let mut ra = ReadaheadContext::new(Advice::Normal);
//! for (off, len) in reads {
//!     ra.request(&file, off, len);
//!     // ... perform the actual read
//! }
//! ```

pub mod advice;
pub mod backing;
pub mod context;
pub mod io;
pub mod params;

mod prefetch;

#[cfg(test)]
mod fake;

pub use advice::Advice;
pub use backing::{BackingObject, Protection};
pub use context::{ReadaheadContext, ReadaheadStats, Window};
pub use io::start_io;
pub use params::ReadaheadParams;
