//! Fallback parking using std::sync::Condvar
//!
//! Used on platforms without futex support.

use super::ThreadParking;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::{Duration, Instant};

pub struct FallbackParking {
    permit: Mutex<bool>,
    condvar: Condvar,
    parked: AtomicUsize,
}

impl FallbackParking {
    pub fn new() -> Self {
        Self {
            permit: Mutex::new(false),
            condvar: Condvar::new(),
            parked: AtomicUsize::new(0),
        }
    }
}

impl Default for FallbackParking {
    fn default() -> Self {
        Self::new()
    }
}

impl ThreadParking for FallbackParking {
    fn park(&self, timeout: Option<Duration>) -> bool {
        let deadline = timeout.map(|t| Instant::now() + t);
        let mut permit = self.permit.lock().unwrap_or_else(PoisonError::into_inner);

        self.parked.fetch_add(1, Ordering::SeqCst);
        let woken = loop {
            if *permit {
                *permit = false;
                break true;
            }
            match deadline {
                Some(d) => {
                    let now = Instant::now();
                    if now >= d {
                        break false;
                    }
                    permit = self
                        .condvar
                        .wait_timeout(permit, d - now)
                        .unwrap_or_else(PoisonError::into_inner)
                        .0;
                }
                None => {
                    permit = self.condvar.wait(permit).unwrap_or_else(PoisonError::into_inner);
                }
            }
        };
        self.parked.fetch_sub(1, Ordering::SeqCst);
        woken
    }

    fn unpark(&self) {
        {
            let mut permit = self.permit.lock().unwrap_or_else(PoisonError::into_inner);
            *permit = true;
        }
        self.condvar.notify_one();
    }

    fn parked_count(&self) -> usize {
        self.parked.load(Ordering::Relaxed)
    }
}
