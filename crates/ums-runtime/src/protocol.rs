//! Client protocol: requests into the service and their responses
//!
//! Every client operation is one [`Request`] issued on behalf of a
//! [`Caller`]. Requests that act on an agent resolve it from the caller's
//! tid; requests issued by a worker resolve the worker the same way.

use core::fmt;

use ums_core::{HandoffRecord, Payload, Pid, PoolId, Routine, Tid, WorkerId, WorkerInfo};

use crate::platform;

/// Process and OS thread a request is issued from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Caller {
    pub pid: Pid,
    pub tid: Tid,
}

impl Caller {
    #[inline]
    pub const fn new(pid: Pid, tid: Tid) -> Self {
        Self { pid, tid }
    }

    /// Calling thread, as a member of `pid`
    #[inline]
    pub fn current(pid: Pid) -> Self {
        Self::new(pid, platform::current_tid())
    }
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.pid, self.tid)
    }
}

/// A freshly claimed worker the driver must start on a new OS thread
#[derive(Clone)]
pub struct Dispatch {
    pub worker: WorkerId,
    pub routine: Routine,
    pub arg: Payload,
    /// Driver tid of the claiming agent
    pub agent: Tid,
    /// CPU the agent prefers its workers on
    pub cpu: Option<usize>,
}

impl fmt::Debug for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatch")
            .field("worker", &self.worker)
            .field("agent", &self.agent)
            .field("cpu", &self.cpu)
            .finish()
    }
}

pub enum Request {
    CreateProcess,
    DeleteProcess,
    CreateWorker {
        routine: Routine,
        arg: Payload,
        user_tag: Option<Payload>,
    },
    DeleteWorker {
        worker: WorkerId,
    },
    CreatePool,
    DeletePool {
        pool: PoolId,
    },
    PoolAdd {
        pool: PoolId,
        worker: WorkerId,
    },
    PoolRemove {
        pool: PoolId,
        worker: WorkerId,
    },
    CreateAgent {
        pool: PoolId,
        cpu: Option<usize>,
        sched_args: Option<Payload>,
    },
    ExitAgent {
        exit_code: i32,
    },
    WaitNextCall,
    DispatchNextFromPool,
    DispatchNextFromReady,
    DispatchSpecific {
        info: WorkerInfo,
    },
    StartupThread {
        worker: WorkerId,
        agent: Tid,
    },
    /// The driver could not give a freshly claimed worker its thread
    AbandonLaunch {
        worker: WorkerId,
    },
    Yield,
    End,
    SnapshotPool {
        max: usize,
    },
    SnapshotReady {
        max: usize,
    },
}

impl Request {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Request::CreateProcess => "create-process",
            Request::DeleteProcess => "delete-process",
            Request::CreateWorker { .. } => "create-worker",
            Request::DeleteWorker { .. } => "delete-worker",
            Request::CreatePool => "create-pool",
            Request::DeletePool { .. } => "delete-pool",
            Request::PoolAdd { .. } => "pool-add",
            Request::PoolRemove { .. } => "pool-remove",
            Request::CreateAgent { .. } => "create-agent",
            Request::ExitAgent { .. } => "exit-agent",
            Request::WaitNextCall => "wait-next-call",
            Request::DispatchNextFromPool => "dispatch-next-from-pool",
            Request::DispatchNextFromReady => "dispatch-next-from-ready",
            Request::DispatchSpecific { .. } => "dispatch-specific",
            Request::StartupThread { .. } => "startup-thread",
            Request::AbandonLaunch { .. } => "abandon-launch",
            Request::Yield => "yield",
            Request::End => "end",
            Request::SnapshotPool { .. } => "snapshot-pool",
            Request::SnapshotReady { .. } => "snapshot-ready",
        }
    }
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Request::DeleteWorker { worker } | Request::AbandonLaunch { worker } => {
                write!(f, "{} {}", self.name(), worker)
            }
            Request::DeletePool { pool } => write!(f, "{} {}", self.name(), pool),
            Request::PoolAdd { pool, worker } | Request::PoolRemove { pool, worker } => {
                write!(f, "{} {} {}", self.name(), pool, worker)
            }
            Request::CreateAgent { pool, cpu, .. } => write!(f, "{} {} cpu={:?}", self.name(), pool, cpu),
            Request::ExitAgent { exit_code } => write!(f, "{} code={}", self.name(), exit_code),
            Request::DispatchSpecific { info } => {
                write!(f, "{} {} from_pool={}", self.name(), info.id, info.from_pool)
            }
            Request::StartupThread { worker, agent } => write!(f, "{} {} agent={}", self.name(), worker, agent),
            Request::SnapshotPool { max } | Request::SnapshotReady { max } => {
                write!(f, "{} max={}", self.name(), max)
            }
            _ => f.write_str(self.name()),
        }
    }
}

/// Outcome of a successful request
#[derive(Debug)]
pub enum Response {
    Done,
    Worker(WorkerId),
    Pool(PoolId),
    Handoff(HandoffRecord),
    /// Start this worker on a new thread
    Launch(Dispatch),
    /// This yielded worker was resumed on its own thread
    Resumed(WorkerId),
    Snapshot(Vec<WorkerInfo>),
}
