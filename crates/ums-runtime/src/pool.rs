//! Completion pools: FIFO queues of worker descriptors
//!
//! A pool holds descriptors, not workers. The same worker may sit in
//! several pools; the worker's claim decides which agent gets it. Entries
//! whose worker was deleted stay until a dispatch consumes them. Worker ids
//! are reused, so such an entry names whichever worker holds the id when it
//! is dispatched, and may start a worker created after the deletion.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use ums_core::spinlock::SpinLockGuard;
use ums_core::{PoolId, SpinLock, WorkerId};

pub struct CompletionPool {
    id: PoolId,
    entries: SpinLock<VecDeque<WorkerId>>,
    /// Live agents bound to this pool
    bound: AtomicUsize,
}

impl CompletionPool {
    pub fn new(id: PoolId) -> Self {
        Self {
            id,
            entries: SpinLock::new(VecDeque::new()),
            bound: AtomicUsize::new(0),
        }
    }

    #[inline]
    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Append at the tail
    pub fn push(&self, worker: WorkerId) {
        self.entries.lock().push_back(worker);
    }

    /// Remove the first entry for `worker`; false if it is not queued
    pub fn remove(&self, worker: WorkerId) -> bool {
        remove_first(&mut self.entries.lock(), worker)
    }

    /// Hold the queue lock across a claim loop
    #[inline]
    pub(crate) fn lock(&self) -> SpinLockGuard<'_, VecDeque<WorkerId>> {
        self.entries.lock()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Queued descriptors, head first
    pub fn ids(&self) -> Vec<WorkerId> {
        self.entries.lock().iter().copied().collect()
    }

    pub(crate) fn bind(&self) {
        self.bound.fetch_add(1, Ordering::AcqRel);
    }

    pub(crate) fn unbind(&self) {
        self.bound.fetch_sub(1, Ordering::AcqRel);
    }

    /// True while some live agent dispatches from this pool
    #[inline]
    pub fn is_bound(&self) -> bool {
        self.bound.load(Ordering::Acquire) > 0
    }
}

/// Remove the first occurrence of `worker`, keeping the order of the rest
pub(crate) fn remove_first(queue: &mut VecDeque<WorkerId>, worker: WorkerId) -> bool {
    match queue.iter().position(|w| *w == worker) {
        Some(pos) => {
            queue.remove(pos);
            true
        }
        None => false,
    }
}
