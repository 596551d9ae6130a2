//! Thread parking for the driver/worker rendezvous
//!
//! Every agent owns one parking instance for its driver thread and every
//! worker owns one for the OS thread executing it. Parking is permit based:
//! an `unpark` that lands before the matching `park` is remembered, so a
//! worker that yields before its driver reaches wait-for-next-call cannot
//! lose the wake.

use std::time::Duration;

/// Single-consumer park/unpark with a sticky permit
pub trait ThreadParking: Send + Sync {
    /// Block until the permit is available or the timeout elapses
    ///
    /// Consumes the permit and returns `true`, or returns `false` on timeout.
    /// With no timeout this only returns once the permit was consumed.
    fn park(&self, timeout: Option<Duration>) -> bool;

    /// Make the permit available, waking the parked thread if any
    ///
    /// Permits do not accumulate: two unparks before one park release a
    /// single park.
    fn unpark(&self);

    /// Number of threads currently blocked in `park` (hint, may be stale)
    fn parked_count(&self) -> usize;
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod futex_linux;
        pub use futex_linux::FutexParking as PlatformParking;
    } else {
        mod fallback;
        pub use fallback::FallbackParking as PlatformParking;
    }
}

/// Create a new platform-appropriate parking instance
pub fn new_parking() -> Box<dyn ThreadParking> {
    Box::new(PlatformParking::new())
}
