//! Scheduler agents
//!
//! An agent is the kernel-side face of one driver thread: it is bound to
//! one completion pool, keeps the ready list of workers that yielded to
//! it, points at the worker it is currently running and holds the hand-off
//! record the driver reads when woken.
//!
//! The agent mutex is the outermost lock of the service. Pool queues and
//! worker locks are taken only while it is held, never the other way round.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use ums_core::{HandoffRecord, Payload, Reason, Tid, WorkerId};

use crate::parking::{new_parking, ThreadParking};
use crate::pool::{remove_first, CompletionPool};

/// State guarded by the agent mutex
pub struct AgentInner {
    pub(crate) ready: VecDeque<WorkerId>,
    pub(crate) running: Option<WorkerId>,
    pub(crate) switch_count: u64,
    pub(crate) handoff: HandoffRecord,
    pub(crate) exited: bool,
}

impl AgentInner {
    /// Record an event and its payload for the driver
    #[inline]
    pub(crate) fn hand_off(&mut self, reason: Reason, worker: WorkerId) {
        self.handoff.set(reason, worker.as_u32() as i32);
    }

    /// Remove `worker` from the ready list wherever it sits
    pub(crate) fn take_ready(&mut self, worker: WorkerId) -> bool {
        remove_first(&mut self.ready, worker)
    }

    /// Clear the running pointer if it names `worker`
    pub(crate) fn clear_running(&mut self, worker: WorkerId) -> bool {
        if self.running == Some(worker) {
            self.running = None;
            true
        } else {
            false
        }
    }

    #[inline]
    pub fn ready(&self) -> &VecDeque<WorkerId> {
        &self.ready
    }

    #[inline]
    pub fn running(&self) -> Option<WorkerId> {
        self.running
    }

    #[inline]
    pub fn switch_count(&self) -> u64 {
        self.switch_count
    }

    #[inline]
    pub fn handoff(&self) -> &HandoffRecord {
        &self.handoff
    }

    #[inline]
    pub fn has_exited(&self) -> bool {
        self.exited
    }
}

pub struct SchedulerAgent {
    tid: Tid,
    pool: Arc<CompletionPool>,
    cpu: Option<usize>,
    inner: Mutex<AgentInner>,
    driver: Box<dyn ThreadParking>,
}

impl SchedulerAgent {
    pub fn new(tid: Tid, pool: Arc<CompletionPool>, cpu: Option<usize>, sched_args: Option<Payload>) -> Self {
        Self {
            tid,
            pool,
            cpu,
            inner: Mutex::new(AgentInner {
                ready: VecDeque::new(),
                running: None,
                switch_count: 0,
                handoff: HandoffRecord::startup(sched_args),
                exited: false,
            }),
            driver: new_parking(),
        }
    }

    /// Tid of the driver thread
    #[inline]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    #[inline]
    pub fn pool(&self) -> &Arc<CompletionPool> {
        &self.pool
    }

    #[inline]
    pub fn cpu(&self) -> Option<usize> {
        self.cpu
    }

    /// Take the agent lock
    ///
    /// A panic while the lock was held leaves plain data behind, so a
    /// poisoned lock is entered anyway.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, AgentInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current hand-off record
    pub fn handoff(&self) -> HandoffRecord {
        self.lock().handoff.clone()
    }

    /// Wake the driver blocked in wait-for-next-call
    #[inline]
    pub(crate) fn wake_driver(&self) {
        self.driver.unpark();
    }

    /// Block the driver until the next hand-off
    #[inline]
    pub(crate) fn park_driver(&self, timeout: Option<Duration>) -> bool {
        self.driver.park(timeout)
    }
}
