//! Linux platform implementation

use nix::sched::{sched_setaffinity, CpuSet};
use nix::unistd::{gettid, Pid as NixPid};
use ums_core::{Tid, UmsError, UmsResult};

use crate::platform::Platform;

/// Linux platform handler
pub struct LinuxPlatform;

impl Platform for LinuxPlatform {
    fn current_tid() -> Tid {
        Tid::new(gettid().as_raw() as u64)
    }

    fn cpu_count() -> usize {
        let n = unsafe { libc::sysconf(libc::_SC_NPROCESSORS_CONF) };
        if n > 0 {
            n as usize
        } else {
            1
        }
    }

    fn pin_current_thread(cpu: usize) -> UmsResult<()> {
        if cpu >= Self::cpu_count() || cpu >= CpuSet::count() {
            return Err(UmsError::InvalidCpuSelection(cpu));
        }
        let mut set = CpuSet::new();
        set.set(cpu).map_err(|_| UmsError::InvalidCpuSelection(cpu))?;
        // Pid 0 addresses the calling thread
        sched_setaffinity(NixPid::from_raw(0), &set)
            .map_err(|_| UmsError::InvalidCpuSelection(cpu))
    }
}
