//! Kernel-style print macros for ksubr
//!
//! Leveled output on stderr in the spirit of the kernel's printf/DPRINTF.
//! Every leveled record names the module path of the call site and the
//! emitting thread, so output from per-CPU workers (`xcall/3`,
//! `poolthread/1@low`) can be told apart:
//!
//! ```text
//! [DEBUG] ksubr_runtime::xcall (xcall/2): cpu 2 attached
//! ```
//!
//! # Environment Variables
//!
//! - `KSUBR_LOG_LEVEL=<level>` - off, error, warn, info, debug, trace (or 0..5)
//! - `KSUBR_LOG_FILTER=a,b` - only records whose module path contains `a` or `b`
//! - `KSUBR_FLUSH_EPRINT=1` - flush stderr after every record
//!
//! Settings are read once, on the first record or an explicit `init()`.
//!
//! # Usage
//!
//! ```ignore
//! use ksubr_core::{kdebug, kwarn};
//!
//! kdebug!("miss: reqoff={} winstart={}", reqoff, winstart);
//! kwarn!("failed to spawn pool thread: {}", err);
//! ```

use crate::env::{env_get_bool, env_get_opt};
use std::fmt::Write as _;
use std::io::Write as _;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::OnceLock;

/// Severity of a record; a record is emitted when its level is at or
/// below the configured one.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Off = 0,
    Error = 1,
    Warn = 2,
    Info = 3,
    Debug = 4,
    Trace = 5,
}

impl LogLevel {
    const ALL: [LogLevel; 6] = [
        LogLevel::Off,
        LogLevel::Error,
        LogLevel::Warn,
        LogLevel::Info,
        LogLevel::Debug,
        LogLevel::Trace,
    ];

    /// Level for a stored value; anything past `Trace` saturates.
    pub fn from_u8(v: u8) -> Self {
        Self::ALL[(v as usize).min(Self::ALL.len() - 1)]
    }

    /// Lower-case name as accepted by `KSUBR_LOG_LEVEL`
    pub fn name(&self) -> &'static str {
        match self {
            LogLevel::Off => "off",
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
    }

    /// Parse a level name or digit; unknown strings yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(n) = s.parse::<u8>() {
            return Self::ALL.get(n as usize).copied();
        }
        Self::ALL
            .iter()
            .copied()
            .find(|l| l.name().eq_ignore_ascii_case(s))
    }

    /// Fixed-width tag printed at the start of a record
    pub fn prefix(&self) -> &'static str {
        match self {
            LogLevel::Off => "",
            LogLevel::Error => "[ERROR]",
            LogLevel::Warn => "[WARN] ",
            LogLevel::Info => "[INFO] ",
            LogLevel::Debug => "[DEBUG]",
            LogLevel::Trace => "[TRACE]",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, ()> {
        LogLevel::parse(s).ok_or(())
    }
}

/// Process-wide logger settings
struct Logger {
    level: AtomicU8,
    flush: AtomicBool,
    filter: Vec<String>,
}

impl Logger {
    fn from_env() -> Self {
        let level: LogLevel = env_get_opt("KSUBR_LOG_LEVEL").unwrap_or(LogLevel::Info);
        let filter = std::env::var("KSUBR_LOG_FILTER").ok();
        Self {
            level: AtomicU8::new(level as u8),
            flush: AtomicBool::new(env_get_bool("KSUBR_FLUSH_EPRINT", false)),
            filter: parse_filter(filter.as_deref()),
        }
    }

    fn accepts(&self, target: &str) -> bool {
        self.filter.is_empty() || self.filter.iter().any(|f| target.contains(f.as_str()))
    }
}

static LOGGER: OnceLock<Logger> = OnceLock::new();

#[inline]
fn logger() -> &'static Logger {
    LOGGER.get_or_init(Logger::from_env)
}

fn parse_filter(raw: Option<&str>) -> Vec<String> {
    raw.into_iter()
        .flat_map(|s| s.split(','))
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(String::from)
        .collect()
}

/// Read the logging environment now instead of on the first record
pub fn init() {
    let _ = logger();
}

/// Whether every record is flushed
#[inline]
pub fn flush_enabled() -> bool {
    logger().flush.load(Ordering::Relaxed)
}

/// Current log level
#[inline]
pub fn log_level() -> LogLevel {
    LogLevel::from_u8(logger().level.load(Ordering::Relaxed))
}

/// Override the log level
pub fn set_log_level(level: LogLevel) {
    logger().level.store(level as u8, Ordering::Relaxed);
}

/// Override flushing
pub fn set_flush_enabled(enabled: bool) {
    logger().flush.store(enabled, Ordering::Relaxed);
}

/// Whether records at `level` are currently emitted
#[inline]
pub fn level_enabled(level: LogLevel) -> bool {
    level != LogLevel::Off && level <= log_level()
}

fn emit(bytes: &[u8]) {
    let mut err = std::io::stderr().lock();
    let _ = err.write_all(bytes);
    if flush_enabled() {
        let _ = err.flush();
    }
}

#[doc(hidden)]
pub fn _kprint_impl(args: std::fmt::Arguments<'_>) {
    emit(args.to_string().as_bytes());
}

#[doc(hidden)]
pub fn _kprintln_impl(args: std::fmt::Arguments<'_>) {
    let mut line = args.to_string();
    line.push('\n');
    emit(line.as_bytes());
}

/// Build and emit one leveled record as a single write
#[doc(hidden)]
pub fn _klog_impl(level: LogLevel, target: &str, args: std::fmt::Arguments<'_>) {
    if !level_enabled(level) || !logger().accepts(target) {
        return;
    }
    let thread = std::thread::current();
    let mut line = String::with_capacity(128);
    let _ = write!(
        line,
        "{} {} ({}): {}",
        level.prefix(),
        target,
        thread.name().unwrap_or("-"),
        args
    );
    line.push('\n');
    emit(line.as_bytes());
}

// ============================================================================
// Public Macros
// ============================================================================

/// Print to stderr (no newline)
#[macro_export]
macro_rules! kprint {
    ($($arg:tt)*) => {
        $crate::kprint::_kprint_impl(format_args!($($arg)*))
    };
}

/// Print to stderr with newline
#[macro_export]
macro_rules! kprintln {
    () => {
        $crate::kprint::_kprintln_impl(format_args!(""))
    };
    ($($arg:tt)*) => {
        $crate::kprint::_kprintln_impl(format_args!($($arg)*))
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __klog {
    ($level:ident, $($arg:tt)*) => {
        $crate::kprint::_klog_impl(
            $crate::kprint::LogLevel::$level,
            module_path!(),
            format_args!($($arg)*),
        )
    };
}

/// Error level record
#[macro_export]
macro_rules! kerror {
    ($($arg:tt)*) => { $crate::__klog!(Error, $($arg)*) };
}

/// Warning level record
#[macro_export]
macro_rules! kwarn {
    ($($arg:tt)*) => { $crate::__klog!(Warn, $($arg)*) };
}

/// Info level record
#[macro_export]
macro_rules! kinfo {
    ($($arg:tt)*) => { $crate::__klog!(Info, $($arg)*) };
}

/// Debug level record
#[macro_export]
macro_rules! kdebug {
    ($($arg:tt)*) => { $crate::__klog!(Debug, $($arg)*) };
}

/// Trace level record
#[macro_export]
macro_rules! ktrace {
    ($($arg:tt)*) => { $crate::__klog!(Trace, $($arg)*) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_order() {
        assert!(LogLevel::Error < LogLevel::Warn);
        assert!(LogLevel::Info < LogLevel::Debug);
        assert!(LogLevel::Debug < LogLevel::Trace);
    }

    #[test]
    fn test_level_parse() {
        assert_eq!(LogLevel::parse("debug"), Some(LogLevel::Debug));
        assert_eq!(LogLevel::parse(" WARN "), Some(LogLevel::Warn));
        assert_eq!(LogLevel::parse("5"), Some(LogLevel::Trace));
        assert_eq!(LogLevel::parse("9"), None);
        assert_eq!(LogLevel::parse("loud"), None);
        assert_eq!("info".parse::<LogLevel>(), Ok(LogLevel::Info));
        assert_eq!(LogLevel::from_u8(99), LogLevel::Trace);
    }

    #[test]
    fn test_filter_parse() {
        assert!(parse_filter(None).is_empty());
        assert_eq!(parse_filter(Some("readahead, xcall,,")), vec!["readahead", "xcall"]);
    }

    #[test]
    fn test_off_is_never_enabled() {
        assert!(!level_enabled(LogLevel::Off));
    }

    #[test]
    fn test_macros_expand() {
        set_log_level(LogLevel::Off);
        kprint!("");
        kprintln!();
        kerror!("error {}", "msg");
        kwarn!("warn");
        kinfo!("info");
        kdebug!("debug {}", 1);
        ktrace!("trace");
    }
}
