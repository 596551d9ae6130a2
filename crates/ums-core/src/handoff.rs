//! Values exchanged between agents, drivers and workers
//!
//! Routine arguments, user tags and scheduler arguments are opaque to the
//! service: they are carried verbatim and only ever interpreted by the
//! client code that produced them.

use core::fmt;
use std::any::Any;
use std::sync::Arc;

use crate::id::WorkerId;
use crate::state::Reason;

/// Opaque client value carried by the service
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Worker routine, invoked once with the worker's argument
pub type Routine = Arc<dyn Fn(Payload) + Send + Sync>;

/// Payload of a startup record
pub const STARTUP_PAYLOAD: i32 = -1;

/// Wrap any value as a [`Payload`]
#[inline]
pub fn payload<T: Any + Send + Sync>(value: T) -> Payload {
    Arc::new(value)
}

/// Why the driver was last woken, and with what
///
/// `payload` holds the worker descriptor for yield and end, and the exit
/// code for [`Reason::SchedulerExiting`].
#[derive(Clone)]
pub struct HandoffRecord {
    pub reason: Reason,
    pub payload: i32,
    pub sched_args: Option<Payload>,
}

impl HandoffRecord {
    /// Record seen by the first entry point invocation
    pub fn startup(sched_args: Option<Payload>) -> Self {
        HandoffRecord {
            reason: Reason::Startup,
            payload: STARTUP_PAYLOAD,
            sched_args,
        }
    }

    /// Overwrite reason and payload, keeping the scheduler arguments
    #[inline]
    pub fn set(&mut self, reason: Reason, payload: i32) {
        self.reason = reason;
        self.payload = payload;
    }

    /// Worker named by a yield or end record
    pub fn worker(&self) -> Option<WorkerId> {
        if self.reason.carries_worker() && self.payload >= 0 {
            Some(WorkerId::new(self.payload as u32))
        } else {
            None
        }
    }

    /// Exit code carried by an exiting record
    pub fn exit_code(&self) -> Option<i32> {
        match self.reason {
            Reason::SchedulerExiting => Some(self.payload),
            _ => None,
        }
    }

    /// Scheduler arguments downcast to a concrete type
    pub fn sched_args_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.sched_args.as_ref().and_then(|a| a.downcast_ref::<T>())
    }
}

impl fmt::Debug for HandoffRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandoffRecord")
            .field("reason", &self.reason)
            .field("payload", &self.payload)
            .field("sched_args", &self.sched_args.is_some())
            .finish()
    }
}

/// Snapshot of a worker as seen by a scheduling policy
#[derive(Clone)]
pub struct WorkerInfo {
    pub id: WorkerId,
    pub switch_count: u32,
    /// Accumulated run time over closed slots, in milliseconds
    pub run_time_ms: u64,
    pub user_tag: Option<Payload>,
    /// True when taken from the completion pool, false for the ready list
    pub from_pool: bool,
}

impl WorkerInfo {
    /// User tag downcast to a concrete type
    pub fn tag_as<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.user_tag.as_ref().and_then(|t| t.downcast_ref::<T>())
    }
}

impl fmt::Debug for WorkerInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerInfo")
            .field("id", &self.id)
            .field("switch_count", &self.switch_count)
            .field("run_time_ms", &self.run_time_ms)
            .field("user_tag", &self.user_tag.is_some())
            .field("from_pool", &self.from_pool)
            .finish()
    }
}
