//! Thread-local worker context
//!
//! The launcher records on each worker thread which connection and worker
//! it is running, so `yield_now()` can be called without arguments.

use std::cell::{Cell, RefCell};

use ums_core::WorkerId;

use crate::Ums;

thread_local! {
    /// Connection the current worker thread was launched from
    static CONNECTION: RefCell<Option<Ums>> = const { RefCell::new(None) };

    /// Worker running on this OS thread
    static CURRENT_WORKER: Cell<Option<WorkerId>> = const { Cell::new(None) };
}

/// Mark this thread as executing `worker` on behalf of `ums`
#[inline]
pub(crate) fn enter_worker(ums: &Ums, worker: WorkerId) {
    CONNECTION.with(|cell| *cell.borrow_mut() = Some(ums.clone()));
    CURRENT_WORKER.with(|cell| cell.set(Some(worker)));
}

/// Clear the worker context (routine returned)
#[inline]
pub(crate) fn leave_worker() {
    CONNECTION.with(|cell| *cell.borrow_mut() = None);
    CURRENT_WORKER.with(|cell| cell.set(None));
}

/// Connection of the current worker thread
#[inline]
pub(crate) fn connection() -> Option<Ums> {
    CONNECTION.with(|cell| cell.borrow().clone())
}

/// Worker running on this thread, if any
#[inline]
pub fn current_worker() -> Option<WorkerId> {
    CURRENT_WORKER.with(|cell| cell.get())
}

/// Check if we're running inside a worker
#[inline]
pub fn is_in_worker() -> bool {
    current_worker().is_some()
}
