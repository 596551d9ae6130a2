//! Scheduling service configuration
//!
//! Compile-time defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use ums_runtime::ServiceConfig;
//!
//! let config = ServiceConfig::from_env()
//!     .max_workers(64)
//!     .snapshot_limit(16);
//! ```

use ums_core::env::{env_get, env_get_bool, env_get_clamped};

/// Library defaults
pub mod defaults {
    use ums_core::constants::{DEFAULT_SNAPSHOT_LIMIT, MAX_DESCRIPTOR, MIN_DESCRIPTOR};

    pub const MIN_ID: u32 = MIN_DESCRIPTOR;
    pub const MAX_WORKERS: u32 = MAX_DESCRIPTOR - MIN_DESCRIPTOR + 1;
    pub const MAX_POOLS: u32 = MAX_DESCRIPTOR - MIN_DESCRIPTOR + 1;
    pub const SNAPSHOT_LIMIT: usize = DEFAULT_SNAPSHOT_LIMIT;
    pub const DEBUG_LOGGING: bool = cfg!(feature = "debug-logging");
}

/// Service configuration with builder pattern
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Lowest worker and pool descriptor
    pub min_id: u32,
    /// Worker descriptors per process
    pub max_workers: u32,
    /// Completion pool descriptors per process
    pub max_pools: u32,
    /// Upper bound on entries one snapshot request returns
    pub snapshot_limit: usize,
    /// Raise the log level to debug when the service starts
    pub debug_logging: bool,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl ServiceConfig {
    /// Defaults with environment overrides
    ///
    /// - `UMS_MAX_WORKERS` - Worker descriptors per process
    /// - `UMS_MAX_POOLS` - Pool descriptors per process
    /// - `UMS_SNAPSHOT_LIMIT` - Max entries per snapshot (1..=4096)
    /// - `UMS_DEBUG` - Debug logging (0/1)
    pub fn from_env() -> Self {
        Self {
            min_id: defaults::MIN_ID,
            max_workers: env_get("UMS_MAX_WORKERS", defaults::MAX_WORKERS),
            max_pools: env_get("UMS_MAX_POOLS", defaults::MAX_POOLS),
            snapshot_limit: env_get_clamped("UMS_SNAPSHOT_LIMIT", defaults::SNAPSHOT_LIMIT, 1, 4096),
            debug_logging: env_get_bool("UMS_DEBUG", defaults::DEBUG_LOGGING),
        }
    }

    /// Library defaults only, no environment
    pub fn new() -> Self {
        Self {
            min_id: defaults::MIN_ID,
            max_workers: defaults::MAX_WORKERS,
            max_pools: defaults::MAX_POOLS,
            snapshot_limit: defaults::SNAPSHOT_LIMIT,
            debug_logging: defaults::DEBUG_LOGGING,
        }
    }

    // Builder methods

    pub fn max_workers(mut self, n: u32) -> Self {
        self.max_workers = n;
        self
    }

    pub fn max_pools(mut self, n: u32) -> Self {
        self.max_pools = n;
        self
    }

    pub fn snapshot_limit(mut self, n: usize) -> Self {
        self.snapshot_limit = n;
        self
    }

    pub fn debug_logging(mut self, enable: bool) -> Self {
        self.debug_logging = enable;
        self
    }

    /// Highest worker descriptor
    #[inline]
    pub fn max_worker_id(&self) -> u32 {
        self.min_id + self.max_workers - 1
    }

    /// Highest pool descriptor
    #[inline]
    pub fn max_pool_id(&self) -> u32 {
        self.min_id + self.max_pools - 1
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::InvalidValue("max_workers must be > 0"));
        }
        if self.max_pools == 0 {
            return Err(ConfigError::InvalidValue("max_pools must be > 0"));
        }
        // Worker ids travel as the i32 handoff payload
        if self.min_id.checked_add(self.max_workers - 1).map_or(true, |m| m > i32::MAX as u32) {
            return Err(ConfigError::InvalidValue("worker descriptors must fit in i32"));
        }
        if self.min_id.checked_add(self.max_pools - 1).is_none() {
            return Err(ConfigError::InvalidValue("pool descriptor range overflows"));
        }
        if self.snapshot_limit == 0 {
            return Err(ConfigError::InvalidValue("snapshot_limit must be > 0"));
        }
        Ok(())
    }
}

/// Configuration error
#[derive(Debug, Clone)]
pub enum ConfigError {
    InvalidValue(&'static str),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config: {}", msg),
        }
    }
}

impl std::error::Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_valid() {
        let config = ServiceConfig::new();
        assert!(config.validate().is_ok());
        assert_eq!(config.max_worker_id(), 127);
        assert_eq!(config.max_pool_id(), 127);
    }

    #[test]
    fn test_builder() {
        let config = ServiceConfig::new().max_workers(4).max_pools(2).snapshot_limit(8);
        assert_eq!(config.max_worker_id(), 3);
        assert_eq!(config.max_pool_id(), 1);
        assert_eq!(config.snapshot_limit, 8);
    }

    #[test]
    fn test_validation() {
        assert!(ServiceConfig::new().max_workers(0).validate().is_err());
        assert!(ServiceConfig::new().max_pools(0).validate().is_err());
        assert!(ServiceConfig::new().snapshot_limit(0).validate().is_err());
        assert!(ServiceConfig::new().max_workers(u32::MAX).validate().is_err());
    }
}
