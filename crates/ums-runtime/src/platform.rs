//! Platform services the scheduling service depends on

use ums_core::{Tid, UmsResult};

/// OS facilities: thread identity, CPU topology, affinity
pub trait Platform {
    /// Identifier of the calling OS thread
    fn current_tid() -> Tid;

    /// Number of configured CPUs; valid CPU selections are `0..cpu_count()`
    fn cpu_count() -> usize;

    /// Restrict the calling thread to one CPU
    fn pin_current_thread(cpu: usize) -> UmsResult<()>;
}

/// Tid of the calling thread on the current platform
#[inline]
pub fn current_tid() -> Tid {
    <crate::CurrentPlatform as Platform>::current_tid()
}

/// CPU count on the current platform
#[inline]
pub fn cpu_count() -> usize {
    <crate::CurrentPlatform as Platform>::cpu_count()
}

/// Pin the calling thread on the current platform
#[inline]
pub fn pin_current_thread(cpu: usize) -> UmsResult<()> {
    <crate::CurrentPlatform as Platform>::pin_current_thread(cpu)
}
