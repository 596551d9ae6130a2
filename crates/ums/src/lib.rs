//! # ums - User-Mode Scheduling
//!
//! Client library for the UMS scheduling service: create workers, group
//! them in completion pools and run them under scheduler agents whose
//! policy is written in ordinary Rust.
//!
//! ## Quick Start
//!
//! ```ignore
//! use ums::{payload, Driver, Reason, Ums};
//!
//! fn main() -> ums::UmsResult<()> {
//!     let ums = Ums::init()?;
//!
//!     let pool = ums.create_pool()?;
//!     for i in 0..4 {
//!         let w = ums.create_worker(|arg| {
//!             let n = arg.downcast_ref::<u32>().copied().unwrap_or(0);
//!             println!("worker {} before yield", n);
//!             let _ = ums::yield_now();
//!             println!("worker {} after yield", n);
//!         }, payload(i as u32), None)?;
//!         ums.pool_add(pool, w)?;
//!     }
//!
//!     // FIFO policy: resume yielded workers first, then start new ones
//!     let agent = ums.create_agent(pool, |d: &mut Driver| {
//!         if d.dispatch_next_from_ready().is_ok() || d.dispatch_next_from_pool().is_ok() {
//!             return;
//!         }
//!         let _ = d.exit(0);
//!     })?;
//!
//!     let code = ums.join_agent(agent)?;
//!     ums.destroy()?;
//!     std::process::exit(code);
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      User Code                              │
//! │        Ums, create_agent(entry), yield_now()                │
//! └─────────────────────────────────────────────────────────────┘
//!                              │  Request / Response
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SchedulingService                          │
//! │   processes → workers, pools, agents, claim protocol        │
//! └─────────────────────────────────────────────────────────────┘
//!          │                   │                   │
//!          ▼                   ▼                   ▼
//!    ┌───────────┐      ┌───────────┐      ┌───────────┐
//!    │  Driver   │      │  Worker   │      │  Worker   │
//!    │  Thread   │      │  Thread   │      │  Thread   │
//!    └───────────┘      └───────────┘      └───────────┘
//! ```

pub mod driver;
pub mod launcher;
pub mod tls;

use std::sync::Arc;

// Re-export core types
pub use ums_core::{
    payload, HandoffRecord, ObjectKind, Payload, Pid, PoolId, Reason, Routine, Tid, UmsError,
    UmsResult, WorkerId, WorkerInfo, WorkerState,
};

// Re-export kprint macros for debug logging
pub use ums_core::{kerror, kwarn, kinfo, kdebug, ktrace, kprintln};
pub use ums_core::kprint::{LogLevel, set_log_level, set_flush_enabled, set_time_enabled};

// Re-export env utilities
pub use ums_core::{env_get, env_get_bool, env_get_opt};

// Re-export runtime types
pub use ums_runtime::{Caller, Dispatch, ProcessReport, Request, Response, SchedulingService, ServiceConfig};

pub use driver::{AgentBuilder, AgentHandle, Driver};
pub use launcher::{run_worker, OsThreadLauncher, ThreadLauncher};
pub use tls::{current_worker, is_in_worker};

/// Connection of one process to the scheduling service
///
/// Cheap to clone; every clone talks for the same process.
#[derive(Clone)]
pub struct Ums {
    service: Arc<SchedulingService>,
    pid: Pid,
}

impl Ums {
    /// Register the calling process with the process-wide service
    pub fn init() -> UmsResult<Self> {
        Self::init_with(Arc::clone(SchedulingService::global()), Pid::current())
    }

    /// Register `pid` with an explicit service instance
    pub fn init_with(service: Arc<SchedulingService>, pid: Pid) -> UmsResult<Self> {
        let ums = Self { service, pid };
        ums.request(Request::CreateProcess)?;
        Ok(ums)
    }

    /// Unregister the process; fails while it still owns objects
    pub fn destroy(self) -> UmsResult<()> {
        self.request(Request::DeleteProcess).map(|_| ())
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    #[inline]
    pub fn service(&self) -> &Arc<SchedulingService> {
        &self.service
    }

    pub fn create_worker<F>(&self, routine: F, arg: Payload, user_tag: Option<Payload>) -> UmsResult<WorkerId>
    where
        F: Fn(Payload) + Send + Sync + 'static,
    {
        let routine: Routine = Arc::new(routine);
        match self.request(Request::CreateWorker { routine, arg, user_tag })? {
            Response::Worker(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    pub fn delete_worker(&self, worker: WorkerId) -> UmsResult<()> {
        self.request(Request::DeleteWorker { worker }).map(|_| ())
    }

    pub fn create_pool(&self) -> UmsResult<PoolId> {
        match self.request(Request::CreatePool)? {
            Response::Pool(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    pub fn delete_pool(&self, pool: PoolId) -> UmsResult<()> {
        self.request(Request::DeletePool { pool }).map(|_| ())
    }

    /// Append `worker` to the tail of `pool`
    pub fn pool_add(&self, pool: PoolId, worker: WorkerId) -> UmsResult<()> {
        self.request(Request::PoolAdd { pool, worker }).map(|_| ())
    }

    pub fn pool_remove(&self, pool: PoolId, worker: WorkerId) -> UmsResult<()> {
        self.request(Request::PoolRemove { pool, worker }).map(|_| ())
    }

    /// Options for a new agent bound to `pool`
    pub fn agent(&self, pool: PoolId) -> AgentBuilder {
        AgentBuilder::new(self.clone(), pool)
    }

    /// Start an agent on `pool` with default options
    pub fn create_agent<F>(&self, pool: PoolId, entry: F) -> UmsResult<AgentHandle>
    where
        F: FnMut(&mut Driver) + Send + 'static,
    {
        self.agent(pool).spawn(entry)
    }

    /// Wait for an agent to exit and return its exit code
    pub fn join_agent(&self, handle: AgentHandle) -> UmsResult<i32> {
        handle.join()
    }

    /// Read-only view of this process
    pub fn report(&self) -> UmsResult<ProcessReport> {
        self.service.report(self.pid)
    }

    /// Issue one request from the calling thread
    pub fn request(&self, request: Request) -> UmsResult<Response> {
        self.service.handle(Caller::current(self.pid), request)
    }
}

impl std::fmt::Debug for Ums {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ums").field("pid", &self.pid).finish()
    }
}

/// Yield the current worker back to its agent
///
/// Returns once the agent resumes this worker. Fails with
/// `NotAWorkerThread` outside a launched worker.
pub fn yield_now() -> UmsResult<()> {
    let ums = tls::connection().ok_or(UmsError::NotAWorkerThread)?;
    ums.request(Request::Yield).map(|_| ())
}

pub(crate) fn unexpected(response: Response) -> UmsError {
    kerror!("unexpected response from the scheduling service: {:?}", response);
    UmsError::InternalInconsistency("unexpected response from the scheduling service")
}
