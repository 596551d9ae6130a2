//! Scheduler agents from the client side
//!
//! `create_agent` spawns a driver thread that registers a new agent with
//! the service and then calls the user's entry point once per hand-off:
//! first with the startup record, then after every yield or end of one of
//! its workers. The entry point picks the next worker through the
//! [`Driver`] context and returns; the loop ends when it calls
//! [`Driver::exit`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use ums_core::{
    kerror, kinfo, kwarn, HandoffRecord, ObjectKind, Payload, PoolId, Reason, Tid, UmsError, UmsResult, WorkerId,
    WorkerInfo,
};
use ums_runtime::{platform, Dispatch, Request, Response};

use crate::launcher::{OsThreadLauncher, ThreadLauncher};
use crate::{unexpected, Ums};

/// Exit code reported when the entry point panics
pub const PANIC_EXIT_CODE: i32 = -1;

/// Driver-side view of one agent, handed to the entry point
pub struct Driver {
    ums: Ums,
    tid: Tid,
    record: HandoffRecord,
    launcher: Arc<dyn ThreadLauncher>,
    exit_code: Option<i32>,
}

impl Driver {
    /// Tid of the driver thread, which identifies the agent
    #[inline]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    #[inline]
    pub fn ums(&self) -> &Ums {
        &self.ums
    }

    /// Record of the event this call is handling
    #[inline]
    pub fn record(&self) -> &HandoffRecord {
        &self.record
    }

    #[inline]
    pub fn reason(&self) -> Reason {
        self.record.reason
    }

    /// Worker that yielded or ended, for those reasons
    #[inline]
    pub fn worker(&self) -> Option<WorkerId> {
        self.record.worker()
    }

    /// Scheduler arguments given at agent creation
    pub fn sched_args_as<T: std::any::Any + Send + Sync>(&self) -> Option<&T> {
        self.record.sched_args_as::<T>()
    }

    /// Claim the next worker of the bound pool and start it
    pub fn dispatch_next_from_pool(&mut self) -> UmsResult<WorkerId> {
        match self.ums.request(Request::DispatchNextFromPool)? {
            Response::Launch(dispatch) => self.launch(dispatch),
            other => Err(unexpected(other)),
        }
    }

    /// Resume the oldest yielded worker
    pub fn dispatch_next_from_ready(&mut self) -> UmsResult<WorkerId> {
        match self.ums.request(Request::DispatchNextFromReady)? {
            Response::Resumed(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Dispatch a worker picked from a snapshot
    pub fn dispatch_specific(&mut self, info: &WorkerInfo) -> UmsResult<WorkerId> {
        match self.ums.request(Request::DispatchSpecific { info: info.clone() })? {
            Response::Launch(dispatch) => self.launch(dispatch),
            Response::Resumed(id) => Ok(id),
            other => Err(unexpected(other)),
        }
    }

    /// Up to `max` workers from the head of the bound pool
    pub fn snapshot_pool(&self, max: usize) -> UmsResult<Vec<WorkerInfo>> {
        match self.ums.request(Request::SnapshotPool { max })? {
            Response::Snapshot(infos) => Ok(infos),
            other => Err(unexpected(other)),
        }
    }

    /// Up to `max` workers from the head of the ready list
    pub fn snapshot_ready(&self, max: usize) -> UmsResult<Vec<WorkerInfo>> {
        match self.ums.request(Request::SnapshotReady { max })? {
            Response::Snapshot(infos) => Ok(infos),
            other => Err(unexpected(other)),
        }
    }

    /// Tear down the agent; the entry point is not called again
    pub fn exit(&mut self, code: i32) -> UmsResult<()> {
        if self.exit_code.is_some() {
            return Err(UmsError::NoSuchObject(ObjectKind::Agent));
        }
        match self.ums.request(Request::ExitAgent { exit_code: code })? {
            Response::Handoff(record) => {
                self.record = record;
                self.exit_code = Some(code);
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }

    #[inline]
    pub fn has_exited(&self) -> bool {
        self.exit_code.is_some()
    }

    fn launch(&self, dispatch: Dispatch) -> UmsResult<WorkerId> {
        let worker = dispatch.worker;
        if let Err(e) = self.launcher.launch(&self.ums, dispatch) {
            kerror!("agent {}: could not launch {}: {}", self.tid, worker, e);
            // Hand the claim back so the worker stays runnable
            if let Err(undo) = self.ums.request(Request::AbandonLaunch { worker }) {
                kerror!("agent {}: {} stays claimed: {}", self.tid, worker, undo);
            }
            return Err(e);
        }
        Ok(worker)
    }

    fn wait(&mut self) -> UmsResult<()> {
        match self.ums.request(Request::WaitNextCall)? {
            Response::Handoff(record) => {
                self.record = record;
                Ok(())
            }
            other => Err(unexpected(other)),
        }
    }
}

/// Running agent; join it to collect the exit code
#[derive(Debug)]
pub struct AgentHandle {
    tid: Tid,
    pool: PoolId,
    thread: JoinHandle<i32>,
}

impl AgentHandle {
    #[inline]
    pub fn tid(&self) -> Tid {
        self.tid
    }

    #[inline]
    pub fn pool(&self) -> PoolId {
        self.pool
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// Wait for the driver thread and return the agent's exit code
    pub fn join(self) -> UmsResult<i32> {
        self.thread
            .join()
            .map_err(|_| UmsError::InternalInconsistency("driver thread panicked"))
    }
}

/// Options for a new agent
pub struct AgentBuilder {
    ums: Ums,
    pool: PoolId,
    cpu: Option<usize>,
    sched_args: Option<Payload>,
    launcher: Arc<dyn ThreadLauncher>,
}

impl AgentBuilder {
    pub(crate) fn new(ums: Ums, pool: PoolId) -> Self {
        Self {
            ums,
            pool,
            cpu: None,
            sched_args: None,
            launcher: Arc::new(OsThreadLauncher::new()),
        }
    }

    /// Pin the driver thread and its workers to `cpu`
    pub fn cpu(mut self, cpu: usize) -> Self {
        self.cpu = Some(cpu);
        self
    }

    /// Opaque value handed to the entry point on every call
    pub fn sched_args(mut self, args: Payload) -> Self {
        self.sched_args = Some(args);
        self
    }

    pub fn launcher(mut self, launcher: Arc<dyn ThreadLauncher>) -> Self {
        self.launcher = launcher;
        self
    }

    /// Spawn the driver thread and register the agent
    ///
    /// Returns once the service has accepted or refused the agent, so
    /// registration errors surface here rather than at join.
    pub fn spawn<F>(self, entry: F) -> UmsResult<AgentHandle>
    where
        F: FnMut(&mut Driver) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let pool = self.pool;
        let thread = thread::Builder::new()
            .name(format!("ums-agent-{}", pool))
            .spawn(move || drive(self, entry, tx))?;

        match rx.recv() {
            Ok(Ok(tid)) => Ok(AgentHandle { tid, pool, thread }),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(UmsError::InternalInconsistency("driver thread died during registration"))
            }
        }
    }
}

fn drive<F>(options: AgentBuilder, mut entry: F, registered: mpsc::Sender<UmsResult<Tid>>) -> i32
where
    F: FnMut(&mut Driver),
{
    let AgentBuilder {
        ums,
        pool,
        cpu,
        sched_args,
        launcher,
    } = options;

    let record = match ums.request(Request::CreateAgent { pool, cpu, sched_args }) {
        Ok(Response::Handoff(record)) => record,
        Ok(other) => {
            let _ = registered.send(Err(unexpected(other)));
            return PANIC_EXIT_CODE;
        }
        Err(e) => {
            let _ = registered.send(Err(e));
            return PANIC_EXIT_CODE;
        }
    };
    let tid = platform::current_tid();
    if let Some(cpu) = cpu {
        if let Err(e) = platform::pin_current_thread(cpu) {
            kwarn!("agent {} not pinned to cpu {}: {}", tid, cpu, e);
        }
    }
    let _ = registered.send(Ok(tid));

    let mut driver = Driver {
        ums,
        tid,
        record,
        launcher,
        exit_code: None,
    };

    loop {
        if panic::catch_unwind(AssertUnwindSafe(|| entry(&mut driver))).is_err() {
            kerror!("agent {}: entry point panicked", tid);
            if !driver.has_exited() {
                if let Err(e) = driver.exit(PANIC_EXIT_CODE) {
                    kerror!("agent {}: exit after panic failed: {}", tid, e);
                }
            }
            return PANIC_EXIT_CODE;
        }
        if let Some(code) = driver.exit_code {
            kinfo!("agent {} finished with code {}", tid, code);
            return code;
        }
        if let Err(e) = driver.wait() {
            kerror!("agent {}: wait for next call failed: {}", tid, e);
            return PANIC_EXIT_CODE;
        }
    }
}
