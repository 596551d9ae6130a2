//! Environment variable helpers
//!
//! Used by the service configuration to read `UMS_*` overrides.
//!
//! ```ignore
//! use ums_core::env::{env_get, env_get_bool};
//!
//! let max_workers: u32 = env_get("UMS_MAX_WORKERS", 128);
//! let debug = env_get_bool("UMS_DEBUG", false);
//! ```

use std::str::FromStr;

/// Parse a variable as `T`, or return the default when unset or unparsable
#[inline]
pub fn env_get<T>(key: &str, default: T) -> T
where
    T: FromStr,
{
    env_get_opt(key).unwrap_or(default)
}

/// Parse a variable as `T` if it is set and parses
#[inline]
pub fn env_get_opt<T>(key: &str) -> Option<T>
where
    T: FromStr,
{
    std::env::var(key).ok().and_then(|v| v.trim().parse().ok())
}

/// Boolean variable: "1", "true", "yes", "on" (any case) are true
///
/// Any other value is false; unset returns the default.
#[inline]
pub fn env_get_bool(key: &str, default: bool) -> bool {
    match std::env::var(key) {
        Ok(val) => matches!(val.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"),
        Err(_) => default,
    }
}

/// Parse a variable and clamp it into `min..=max`
pub fn env_get_clamped<T>(key: &str, default: T, min: T, max: T) -> T
where
    T: FromStr + PartialOrd,
{
    let v = env_get(key, default);
    if v < min {
        min
    } else if v > max {
        max
    } else {
        v
    }
}
