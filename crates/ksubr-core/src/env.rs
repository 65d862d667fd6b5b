//! Environment variable utilities
//!
//! Every tunable in ksubr has a library default and an optional `KSUBR_*`
//! override. These helpers parse the override and fall back to the default
//! when the variable is unset or malformed.
//!
//! ```ignore
//! use ksubr_core::env::{env_get, env_get_bool, env_get_duration_ms};
//!
//! let ncpu: usize = env_get("KSUBR_NCPU", 4);
//! let bind = env_get_bool("KSUBR_BIND_THREADS", true);
//! let idle = env_get_duration_ms("KSUBR_POOL_IDLE_MS", 30_000);
//! ```

use std::str::FromStr;
use std::time::Duration;

/// Get environment variable parsed as type T, or return default
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Get environment variable as boolean
///
/// Accepts "1", "true", "yes", "on" (case-insensitive) as true and
/// "0", "false", "no", "off" as false. Anything else returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => match val.trim().to_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => true,
            "0" | "false" | "no" | "off" => false,
            _ => default,
        },
        Err(_) => default,
    }
}

/// Get environment variable as optional value
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Get environment variable holding milliseconds as a `Duration`
#[inline]
pub fn env_get_duration_ms(key: &str, default_ms: u64) -> Duration {
    Duration::from_millis(env_get(key, default_ms))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_get_default() {
        let val: usize = env_get("__KSUBR_TEST_UNSET__", 42);
        assert_eq!(val, 42);
    }

    #[test]
    fn test_env_get_opt_none() {
        let val: Option<usize> = env_get_opt("__KSUBR_TEST_UNSET__");
        assert!(val.is_none());
    }

    #[test]
    fn test_env_get_with_set_var() {
        std::env::set_var("__KSUBR_TEST_NUM__", " 123 ");
        let val: usize = env_get("__KSUBR_TEST_NUM__", 0);
        assert_eq!(val, 123);
        std::env::remove_var("__KSUBR_TEST_NUM__");
    }

    #[test]
    fn test_env_get_bool_variants() {
        std::env::set_var("__KSUBR_TEST_BOOL__", "YES");
        assert!(env_get_bool("__KSUBR_TEST_BOOL__", false));

        std::env::set_var("__KSUBR_TEST_BOOL__", "off");
        assert!(!env_get_bool("__KSUBR_TEST_BOOL__", true));

        // Garbage keeps the default either way
        std::env::set_var("__KSUBR_TEST_BOOL__", "garbage");
        assert!(env_get_bool("__KSUBR_TEST_BOOL__", true));
        assert!(!env_get_bool("__KSUBR_TEST_BOOL__", false));

        std::env::remove_var("__KSUBR_TEST_BOOL__");
    }

    #[test]
    fn test_env_get_duration() {
        std::env::set_var("__KSUBR_TEST_MS__", "250");
        assert_eq!(env_get_duration_ms("__KSUBR_TEST_MS__", 1), Duration::from_millis(250));
        std::env::remove_var("__KSUBR_TEST_MS__");
        assert_eq!(env_get_duration_ms("__KSUBR_TEST_MS__", 7), Duration::from_millis(7));
    }

    #[test]
    fn test_env_get_invalid_parse() {
        std::env::set_var("__KSUBR_TEST_INVALID__", "not_a_number");
        let val: usize = env_get("__KSUBR_TEST_INVALID__", 99);
        assert_eq!(val, 99);
        std::env::remove_var("__KSUBR_TEST_INVALID__");
    }
}
