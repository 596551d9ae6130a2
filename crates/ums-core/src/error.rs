//! Error types for the scheduling service

use core::fmt;

use crate::id::{Pid, PoolId, WorkerId};

/// Result type for scheduling operations
pub type UmsResult<T> = Result<T, UmsError>;

/// Kind of object a descriptor or tid failed to resolve to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Worker,
    Pool,
    Agent,
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ObjectKind::Worker => "worker",
            ObjectKind::Pool => "completion pool",
            ObjectKind::Agent => "scheduler agent",
        };
        f.write_str(s)
    }
}

/// Errors returned by scheduling operations
///
/// Every failing operation leaves the service as if it had not been issued,
/// except where the operation documents otherwise.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UmsError {
    /// Pool had no claimable worker
    EmptyCompletionPool,

    /// Agent's ready list is empty
    EmptyReadyList,

    /// Pool descriptor does not resolve
    InvalidPoolId(PoolId),

    /// Worker, pool or agent does not resolve
    NoSuchObject(ObjectKind),

    /// Worker is already claimed by an agent
    AlreadyAssigned(WorkerId),

    /// CPU index outside the machine's CPUs
    InvalidCpuSelection(usize),

    /// Process has not been registered
    NoSuchProcess(Pid),

    /// Process already registered
    ProcessExists(Pid),

    /// Object still referenced by a live entity
    ObjectInUse(ObjectKind),

    /// Descriptor table has no free id left
    DescriptorsExhausted(ObjectKind),

    /// Calling thread is not executing a worker
    NotAWorkerThread,

    /// Operation is not offered by this service
    Unsupported(&'static str),

    /// Worker thread could not be started
    LaunchFailed(String),

    /// Internal lookup failed where it must not
    InternalInconsistency(&'static str),
}

impl UmsError {
    /// Numeric code exposed through the client protocol
    pub const fn code(&self) -> i32 {
        match self {
            UmsError::EmptyCompletionPool => 300,
            UmsError::EmptyReadyList => 301,
            UmsError::InvalidPoolId(_) => 302,
            UmsError::NoSuchObject(_) => 303,
            UmsError::InternalInconsistency(_) => 304,
            UmsError::AlreadyAssigned(_) => 305,
            UmsError::InvalidCpuSelection(_) => 306,
            UmsError::NoSuchProcess(_) => 307,
            UmsError::ProcessExists(_) => 308,
            UmsError::ObjectInUse(_) => 309,
            UmsError::DescriptorsExhausted(_) => 310,
            UmsError::NotAWorkerThread => 311,
            UmsError::Unsupported(_) => 312,
            UmsError::LaunchFailed(_) => 313,
        }
    }

    /// Outcomes a scheduling policy is expected to handle and retry past
    #[inline]
    pub const fn is_recoverable(&self) -> bool {
        matches!(
            self,
            UmsError::EmptyCompletionPool | UmsError::EmptyReadyList | UmsError::AlreadyAssigned(_)
        )
    }
}

impl fmt::Display for UmsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UmsError::EmptyCompletionPool => write!(f, "completion pool is empty"),
            UmsError::EmptyReadyList => write!(f, "ready list is empty"),
            UmsError::InvalidPoolId(id) => write!(f, "invalid completion pool {}", id),
            UmsError::NoSuchObject(kind) => write!(f, "no such {}", kind),
            UmsError::AlreadyAssigned(id) => write!(f, "worker {} already assigned", id),
            UmsError::InvalidCpuSelection(cpu) => write!(f, "invalid cpu selection {}", cpu),
            UmsError::NoSuchProcess(pid) => write!(f, "process {} not registered", pid),
            UmsError::ProcessExists(pid) => write!(f, "process {} already registered", pid),
            UmsError::ObjectInUse(kind) => write!(f, "{} still in use", kind),
            UmsError::DescriptorsExhausted(kind) => write!(f, "no free {} descriptors", kind),
            UmsError::NotAWorkerThread => write!(f, "calling thread is not a worker"),
            UmsError::Unsupported(what) => write!(f, "unsupported operation: {}", what),
            UmsError::LaunchFailed(msg) => write!(f, "worker launch failed: {}", msg),
            UmsError::InternalInconsistency(what) => write!(f, "internal inconsistency: {}", what),
        }
    }
}

impl std::error::Error for UmsError {}

impl From<std::io::Error> for UmsError {
    fn from(e: std::io::Error) -> Self {
        UmsError::LaunchFailed(e.to_string())
    }
}
