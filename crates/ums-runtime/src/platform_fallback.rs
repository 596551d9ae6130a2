//! Portable platform implementation
//!
//! Thread ids are synthesized per thread and affinity is not supported.

use std::sync::atomic::{AtomicU64, Ordering};

use ums_core::{Tid, UmsError, UmsResult};

use crate::platform::Platform;

static NEXT_TID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static TID: u64 = NEXT_TID.fetch_add(1, Ordering::Relaxed);
}

pub struct FallbackPlatform;

impl Platform for FallbackPlatform {
    fn current_tid() -> Tid {
        Tid::new(TID.with(|t| *t))
    }

    fn cpu_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    fn pin_current_thread(cpu: usize) -> UmsResult<()> {
        if cpu >= Self::cpu_count() {
            return Err(UmsError::InvalidCpuSelection(cpu));
        }
        Err(UmsError::Unsupported("cpu affinity"))
    }
}
