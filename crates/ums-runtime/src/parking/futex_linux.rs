//! Linux futex-based parking
//!
//! Futex word semantics:
//! - 0 = no permit
//! - 1 = permit available
//!
//! `park` swaps the word to 0 and returns if it held the permit, otherwise
//! it FUTEX_WAITs on the value 0. `unpark` stores 1 and FUTEX_WAKEs. The
//! kernel compares the word atomically with going to sleep, so a store
//! between the swap and the wait makes the wait return EAGAIN.

use super::ThreadParking;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

pub struct FutexParking {
    permit: AtomicU32,
    parked: AtomicUsize,
}

impl FutexParking {
    pub fn new() -> Self {
        Self {
            permit: AtomicU32::new(0),
            parked: AtomicUsize::new(0),
        }
    }

    fn futex_wait(&self, timeout: Option<Duration>) {
        let timespec = timeout.map(|d| libc::timespec {
            tv_sec: d.as_secs() as libc::time_t,
            tv_nsec: d.subsec_nanos() as libc::c_long,
        });
        let timespec_ptr = match &timespec {
            Some(ts) => ts as *const libc::timespec,
            None => std::ptr::null(),
        };

        // ETIMEDOUT, EAGAIN and EINTR all send us back to the permit check
        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.permit.as_ptr(),
                libc::FUTEX_WAIT | libc::FUTEX_PRIVATE_FLAG,
                0u32,
                timespec_ptr,
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }
}

impl Default for FutexParking {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadParking for FutexParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);

        loop {
            if self.permit.swap(0, Ordering::SeqCst) == 1 {
                return true;
            }

            let remaining = match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        return false;
                    }
                    Some(d - now)
                }
                None => None,
            };

            self.parked.fetch_add(1, Ordering::SeqCst);
            self.futex_wait(remaining);
            self.parked.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn unpark(&self) {
        self.permit.store(1, Ordering::SeqCst);

        unsafe {
            libc::syscall(
                libc::SYS_futex,
                self.permit.as_ptr(),
                libc::FUTEX_WAKE | libc::FUTEX_PRIVATE_FLAG,
                1i32,
                std::ptr::null::<libc::timespec>(),
                std::ptr::null::<u32>(),
                0u32,
            );
        }
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
