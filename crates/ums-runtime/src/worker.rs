//! Workers: schedulable units of client work
//!
//! A worker owns a routine, its argument and an optional user tag, all
//! opaque to the service. Two independent locks protect it:
//!
//! - `claim` - which agent owns the worker. Taking a claim is a
//!   test-and-set under this lock, so two agents racing for the same worker
//!   through different pools see exactly one winner.
//! - `meta` - lifecycle state, switch counter, run-time accounting and the
//!   OS thread executing the worker.
//!
//! Lock order is claim before meta; neither is held across a park.

use std::time::{Duration, Instant};

use ums_core::{
    ktrace, ObjectKind, Payload, Routine, SpinLock, Tid, UmsError, UmsResult, WorkerId,
    WorkerInfo, WorkerState,
};

use crate::parking::{new_parking, ThreadParking};

/// Ownership of a worker by an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Unclaimed and never run to completion
    Free,
    /// Claimed by the agent whose driver has this tid
    Assigned(Tid),
    /// Routine finished; the claim was released and can never be retaken
    Finished,
    /// Deleted from its process; stale pool entries must skip it
    Retired,
}

impl Claim {
    #[inline]
    pub fn is_claimed(&self) -> bool {
        matches!(self, Claim::Assigned(_))
    }
}

#[derive(Debug)]
struct WorkerMeta {
    state: WorkerState,
    switch_count: u32,
    run_time: Duration,
    slot_start: Option<Instant>,
    thread: Option<Tid>,
    agent: Option<Tid>,
}

impl WorkerMeta {
    fn close_slot(&mut self) {
        if let Some(start) = self.slot_start.take() {
            self.run_time += start.elapsed();
        }
    }
}

pub struct Worker {
    id: WorkerId,
    routine: Routine,
    arg: Payload,
    user_tag: Option<Payload>,
    claim: SpinLock<Claim>,
    meta: SpinLock<WorkerMeta>,
    parking: Box<dyn ThreadParking>,
}

impl Worker {
    pub fn new(id: WorkerId, routine: Routine, arg: Payload, user_tag: Option<Payload>) -> Self {
        Self {
            id,
            routine,
            arg,
            user_tag,
            claim: SpinLock::new(Claim::Free),
            meta: SpinLock::new(WorkerMeta {
                state: WorkerState::Idle,
                switch_count: 0,
                run_time: Duration::ZERO,
                slot_start: None,
                thread: None,
                agent: None,
            }),
            parking: new_parking(),
        }
    }

    #[inline]
    pub fn id(&self) -> WorkerId {
        self.id
    }

    #[inline]
    pub fn routine(&self) -> &Routine {
        &self.routine
    }

    #[inline]
    pub fn arg(&self) -> &Payload {
        &self.arg
    }

    #[inline]
    pub fn user_tag(&self) -> Option<&Payload> {
        self.user_tag.as_ref()
    }

    // ------------------------------------------------------------------
    // Claim
    // ------------------------------------------------------------------

    /// Test-and-set the claim for `agent`
    pub fn try_claim(&self, agent: Tid) -> UmsResult<()> {
        let mut claim = self.claim.lock();
        match *claim {
            Claim::Free => {
                *claim = Claim::Assigned(agent);
                ktrace!("worker {} claimed by agent {}", self.id, agent);
                Ok(())
            }
            Claim::Assigned(_) | Claim::Finished => Err(UmsError::AlreadyAssigned(self.id)),
            Claim::Retired => Err(UmsError::NoSuchObject(ObjectKind::Worker)),
        }
    }

    /// Retire the worker for deletion; fails while an agent holds it
    pub fn retire(&self) -> UmsResult<()> {
        let mut claim = self.claim.lock();
        if claim.is_claimed() {
            return Err(UmsError::AlreadyAssigned(self.id));
        }
        *claim = Claim::Retired;
        Ok(())
    }

    #[inline]
    pub fn claim(&self) -> Claim {
        *self.claim.lock()
    }

    #[inline]
    pub fn is_claimed(&self) -> bool {
        self.claim.lock().is_claimed()
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// First slot of a freshly claimed worker, before its thread exists
    pub(crate) fn begin_launch(&self, agent: Tid) {
        let mut meta = self.meta.lock();
        meta.agent = Some(agent);
        meta.slot_start = Some(Instant::now());
    }

    /// The launched thread registered itself and is about to run the routine
    pub(crate) fn start_on(&self, thread: Tid, agent: Tid) {
        let mut meta = self.meta.lock();
        meta.thread = Some(thread);
        meta.agent = Some(agent);
        meta.state = WorkerState::Running;
        meta.switch_count += 1;
        if meta.slot_start.is_none() {
            meta.slot_start = Some(Instant::now());
        }
    }

    /// Yielded worker taken off a ready list
    pub(crate) fn resume(&self) {
        let mut meta = self.meta.lock();
        meta.state = WorkerState::Running;
        meta.slot_start = Some(Instant::now());
    }

    /// Close the running slot and go Idle
    pub(crate) fn suspend(&self) {
        let mut meta = self.meta.lock();
        meta.close_slot();
        meta.state = WorkerState::Idle;
        meta.switch_count += 1;
    }

    /// Close the running slot, go Ended and release the claim for good
    pub(crate) fn finish(&self) {
        let mut claim = self.claim.lock();
        let mut meta = self.meta.lock();
        meta.close_slot();
        meta.state = WorkerState::Ended;
        meta.thread = None;
        if claim.is_claimed() {
            *claim = Claim::Finished;
        }
    }

    /// Undo a claim whose worker never got a thread
    pub(crate) fn abandon_launch(&self) {
        let mut claim = self.claim.lock();
        let mut meta = self.meta.lock();
        meta.agent = None;
        meta.slot_start = None;
        if claim.is_claimed() {
            *claim = Claim::Free;
        }
    }

    /// Forget the agent after it exited while the worker sat in its ready list
    pub(crate) fn detach(&self) {
        let mut claim = self.claim.lock();
        let mut meta = self.meta.lock();
        meta.agent = None;
        if claim.is_claimed() {
            *claim = Claim::Free;
        }
    }

    #[inline]
    pub fn state(&self) -> WorkerState {
        self.meta.lock().state
    }

    #[inline]
    pub fn switch_count(&self) -> u32 {
        self.meta.lock().switch_count
    }

    /// Accumulated run time over closed slots
    #[inline]
    pub fn run_time(&self) -> Duration {
        self.meta.lock().run_time
    }

    #[inline]
    pub fn thread(&self) -> Option<Tid> {
        self.meta.lock().thread
    }

    #[inline]
    pub fn agent(&self) -> Option<Tid> {
        self.meta.lock().agent
    }

    pub fn info(&self, from_pool: bool) -> WorkerInfo {
        let meta = self.meta.lock();
        WorkerInfo {
            id: self.id,
            switch_count: meta.switch_count,
            run_time_ms: meta.run_time.as_millis() as u64,
            user_tag: self.user_tag.clone(),
            from_pool,
        }
    }

    // ------------------------------------------------------------------
    // Rendezvous
    // ------------------------------------------------------------------

    /// Block the worker's OS thread until it is dispatched again
    pub(crate) fn park(&self) {
        self.parking.park(None);
    }

    pub(crate) fn unpark(&self) {
        self.parking.unpark();
    }
}
