//! The scheduling service
//!
//! Owns the process registry and carries out every client request. Each
//! request resolves its process by pid, then its agent or worker by the
//! caller's tid, and runs its state transition under the agent lock.
//!
//! Lock order: agent, then pool queue, then worker claim, then worker meta.
//! Registries and descriptor tables are leaf locks taken for one lookup at
//! a time. No lock is held while a thread parks.

use std::sync::{Arc, OnceLock};

use ums_core::kprint::{self, LogLevel};
use ums_core::{
    kdebug, kerror, kinfo, ktrace, kwarn, HandoffRecord, ObjectKind, Payload, Pid, PoolId, Reason,
    Routine, Tid, UmsError, UmsResult, WorkerId, WorkerInfo,
};

use crate::agent::{AgentInner, SchedulerAgent};
use crate::config::{ConfigError, ServiceConfig};
use crate::platform;
use crate::pool::{remove_first, CompletionPool};
use crate::process::Process;
use crate::protocol::{Caller, Dispatch, Request, Response};
use crate::registry::Registry;
use crate::report::ProcessReport;
use crate::worker::{Claim, Worker};

static GLOBAL: OnceLock<Arc<SchedulingService>> = OnceLock::new();

pub struct SchedulingService {
    config: ServiceConfig,
    cpus: usize,
    processes: Registry<Pid, Arc<Process>>,
}

impl SchedulingService {
    pub fn new(config: ServiceConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: ServiceConfig) -> Self {
        if config.debug_logging {
            kprint::set_log_level(LogLevel::Debug);
        }
        let cpus = platform::cpu_count();
        kinfo!(
            "scheduling service up: {} cpus, {} workers and {} pools per process",
            cpus,
            config.max_workers,
            config.max_pools
        );
        Self {
            config,
            cpus,
            processes: Registry::new(),
        }
    }

    /// Process-wide instance configured from the environment
    pub fn global() -> &'static Arc<SchedulingService> {
        GLOBAL.get_or_init(|| {
            let config = ServiceConfig::from_env();
            let config = match config.validate() {
                Ok(()) => config,
                Err(e) => {
                    kwarn!("{}; falling back to defaults", e);
                    ServiceConfig::new()
                }
            };
            Arc::new(Self::build(config))
        })
    }

    #[inline]
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// CPUs a scheduler may be pinned to: `0..cpu_count()`
    #[inline]
    pub fn cpu_count(&self) -> usize {
        self.cpus
    }

    fn process(&self, pid: Pid) -> UmsResult<Arc<Process>> {
        self.processes.get(&pid).ok_or(UmsError::NoSuchProcess(pid))
    }

    // ========================================================================
    // Request dispatch
    // ========================================================================

    /// Carry out one client request
    pub fn handle(&self, caller: Caller, request: Request) -> UmsResult<Response> {
        let name = request.name();
        kdebug!("{} {:?}", caller, request);

        let result = match request {
            Request::CreateProcess => self.create_process(caller.pid).map(|_| Response::Done),
            Request::DeleteProcess => self.delete_process(caller.pid).map(|_| Response::Done),
            Request::CreateWorker {
                routine,
                arg,
                user_tag,
            } => self
                .create_worker(caller.pid, routine, arg, user_tag)
                .map(Response::Worker),
            Request::DeleteWorker { worker } => {
                self.delete_worker(caller.pid, worker).map(|_| Response::Done)
            }
            Request::CreatePool => self.create_pool(caller.pid).map(Response::Pool),
            Request::DeletePool { pool } => self.delete_pool(caller.pid, pool).map(|_| Response::Done),
            Request::PoolAdd { pool, worker } => {
                self.pool_add(caller.pid, pool, worker).map(|_| Response::Done)
            }
            Request::PoolRemove { pool, worker } => {
                self.pool_remove(caller.pid, pool, worker).map(|_| Response::Done)
            }
            Request::CreateAgent {
                pool,
                cpu,
                sched_args,
            } => self
                .create_agent(caller, pool, cpu, sched_args)
                .map(Response::Handoff),
            Request::ExitAgent { exit_code } => self.exit_agent(caller, exit_code).map(Response::Handoff),
            Request::WaitNextCall => self.wait_next_call(caller).map(Response::Handoff),
            Request::DispatchNextFromPool => self.dispatch_next_from_pool(caller).map(Response::Launch),
            Request::DispatchNextFromReady => {
                self.dispatch_next_from_ready(caller).map(Response::Resumed)
            }
            Request::DispatchSpecific { info } => self.dispatch_specific(caller, &info),
            Request::StartupThread { worker, agent } => self
                .startup_thread(caller, worker, agent)
                .map(|_| Response::Done),
            Request::AbandonLaunch { worker } => {
                self.abandon_launch(caller, worker).map(|_| Response::Done)
            }
            Request::Yield => self.yield_worker(caller).map(|_| Response::Done),
            Request::End => self.end_worker(caller).map(|_| Response::Done),
            Request::SnapshotPool { max } => self.snapshot_pool(caller, max).map(Response::Snapshot),
            Request::SnapshotReady { max } => self.snapshot_ready(caller, max).map(Response::Snapshot),
        };

        match &result {
            Ok(_) => kdebug!("{} {} -> ok", caller, name),
            Err(e) if e.is_recoverable() => ktrace!("{} {} -> {}", caller, name, e),
            Err(e) => kdebug!("{} {} -> {} ({})", caller, name, e, e.code()),
        }
        result
    }

    // ========================================================================
    // Processes
    // ========================================================================

    pub fn create_process(&self, pid: Pid) -> UmsResult<()> {
        let process = Arc::new(Process::new(pid, &self.config));
        if !self.processes.insert(pid, process) {
            return Err(UmsError::ProcessExists(pid));
        }
        kinfo!("process {} registered", pid);
        Ok(())
    }

    /// Unregister a process that no longer owns workers, pools or agents
    ///
    /// Creations already past their process lookup finish first and are
    /// counted; later ones through a stale handle fail with `NoSuchProcess`.
    pub fn delete_process(&self, pid: Pid) -> UmsResult<()> {
        let removed = self.processes.remove_if(&pid, |p| p.close())?;
        match removed {
            Some(_) => {
                kinfo!("process {} unregistered", pid);
                Ok(())
            }
            None => Err(UmsError::NoSuchProcess(pid)),
        }
    }

    // ========================================================================
    // Workers and pools
    // ========================================================================

    pub fn create_worker(
        &self,
        pid: Pid,
        routine: Routine,
        arg: Payload,
        user_tag: Option<Payload>,
    ) -> UmsResult<WorkerId> {
        let process = self.process(pid)?;
        let _open = process.admit()?;
        let (id, _) = process
            .workers
            .insert_with(|id| Worker::new(WorkerId::new(id), routine, arg, user_tag))
            .ok_or(UmsError::DescriptorsExhausted(ObjectKind::Worker))?;
        Ok(WorkerId::new(id))
    }

    /// Delete an unclaimed worker; pool entries naming it go stale until the
    /// id is reused
    pub fn delete_worker(&self, pid: Pid, worker: WorkerId) -> UmsResult<()> {
        let process = self.process(pid)?;
        process
            .workers
            .remove_if(worker.as_u32(), |w| w.retire())?
            .map(|_| ())
            .ok_or(UmsError::NoSuchObject(ObjectKind::Worker))
    }

    pub fn create_pool(&self, pid: Pid) -> UmsResult<PoolId> {
        let process = self.process(pid)?;
        let _open = process.admit()?;
        let (id, _) = process
            .pools
            .insert_with(|id| CompletionPool::new(PoolId::new(id)))
            .ok_or(UmsError::DescriptorsExhausted(ObjectKind::Pool))?;
        Ok(PoolId::new(id))
    }

    /// Delete a pool no live agent is bound to
    pub fn delete_pool(&self, pid: Pid, pool: PoolId) -> UmsResult<()> {
        let process = self.process(pid)?;
        process
            .pools
            .remove_if(pool.as_u32(), |p| {
                if p.is_bound() {
                    Err(UmsError::ObjectInUse(ObjectKind::Pool))
                } else {
                    Ok(())
                }
            })?
            .map(|_| ())
            .ok_or(UmsError::InvalidPoolId(pool))
    }

    pub fn pool_add(&self, pid: Pid, pool: PoolId, worker: WorkerId) -> UmsResult<()> {
        let process = self.process(pid)?;
        let pool = process.pool(pool)?;
        process.worker(worker)?;
        pool.push(worker);
        Ok(())
    }

    pub fn pool_remove(&self, pid: Pid, pool: PoolId, worker: WorkerId) -> UmsResult<()> {
        let process = self.process(pid)?;
        if process.pool(pool)?.remove(worker) {
            Ok(())
        } else {
            Err(UmsError::NoSuchObject(ObjectKind::Worker))
        }
    }

    // ========================================================================
    // Agents
    // ========================================================================

    /// Register the calling thread as the driver of a new agent on `pool`
    ///
    /// Returns the startup record the entry point is first invoked with.
    pub fn create_agent(
        &self,
        caller: Caller,
        pool: PoolId,
        cpu: Option<usize>,
        sched_args: Option<Payload>,
    ) -> UmsResult<HandoffRecord> {
        if let Some(cpu) = cpu {
            if cpu >= self.cpus {
                return Err(UmsError::InvalidCpuSelection(cpu));
            }
        }
        let process = self.process(caller.pid)?;
        let _open = process.admit()?;
        let bound = process.pool(pool)?;

        let agent = Arc::new(SchedulerAgent::new(caller.tid, Arc::clone(&bound), cpu, sched_args));
        if !process.agents.insert(caller.tid, Arc::clone(&agent)) {
            return Err(UmsError::ObjectInUse(ObjectKind::Agent));
        }
        bound.bind();

        // A concurrent delete may have dropped the pool before the binding
        let still_there = process
            .pools
            .get(pool.as_u32())
            .map_or(false, |p| Arc::ptr_eq(&p, &bound));
        if !still_there {
            bound.unbind();
            process.agents.remove(&caller.tid);
            return Err(UmsError::InvalidPoolId(pool));
        }

        kinfo!("agent {} bound to pool {} cpu={:?}", caller.tid, pool, cpu);
        Ok(agent.handoff())
    }

    /// Tear down the caller's agent
    ///
    /// Workers still in its ready list lose their claim and stay in the
    /// process; their suspended threads are not resumed. Returns the final
    /// record, carrying the exit code.
    pub fn exit_agent(&self, caller: Caller, exit_code: i32) -> UmsResult<HandoffRecord> {
        let process = self.process(caller.pid)?;
        let agent = process
            .agents
            .remove(&caller.tid)
            .ok_or(UmsError::NoSuchObject(ObjectKind::Agent))?;

        let record = {
            let mut inner = agent.lock();
            inner.exited = true;
            for id in inner.ready.drain(..) {
                match process.workers.get(id.as_u32()) {
                    Some(w) => w.detach(),
                    None => kerror!("ready list of agent {} names deleted worker {}", caller.tid, id),
                }
            }
            inner.running = None;
            inner.handoff.set(Reason::SchedulerExiting, exit_code);
            inner.handoff.clone()
        };
        agent.pool().unbind();

        kinfo!("agent {} exited with code {}", caller.tid, exit_code);
        Ok(record)
    }

    /// Block the driver until a worker yields or ends
    pub fn wait_next_call(&self, caller: Caller) -> UmsResult<HandoffRecord> {
        let process = self.process(caller.pid)?;
        let agent = process.agent(caller.tid)?;
        agent.park_driver(None);
        Ok(agent.handoff())
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    /// Claim the first claimable worker of the agent's pool
    ///
    /// Pool entries are consumed as they are examined, whether or not the
    /// claim succeeds. The caller must start the returned worker on a new
    /// thread that issues [`Request::StartupThread`].
    pub fn dispatch_next_from_pool(&self, caller: Caller) -> UmsResult<Dispatch> {
        let process = self.process(caller.pid)?;
        let agent = process.agent(caller.tid)?;

        let _inner = agent.lock();
        let mut entries = agent.pool().lock();
        while let Some(id) = entries.pop_front() {
            let Some(worker) = process.workers.get(id.as_u32()) else {
                ktrace!("pool {}: dropping stale entry {}", agent.pool().id(), id);
                continue;
            };
            match worker.try_claim(agent.tid()) {
                Ok(()) => {
                    worker.begin_launch(agent.tid());
                    return Ok(launch_order(&agent, &worker));
                }
                Err(e) => ktrace!("pool {}: skipping {}: {}", agent.pool().id(), id, e),
            }
        }
        Err(UmsError::EmptyCompletionPool)
    }

    /// Resume the worker at the head of the agent's ready list
    pub fn dispatch_next_from_ready(&self, caller: Caller) -> UmsResult<WorkerId> {
        let process = self.process(caller.pid)?;
        let agent = process.agent(caller.tid)?;

        let mut inner = agent.lock();
        let id = *inner.ready.front().ok_or(UmsError::EmptyReadyList)?;
        let worker = ready_worker(&process, id)?;
        inner.ready.pop_front();
        resume_locked(&mut inner, &worker);
        Ok(id)
    }

    /// Dispatch the worker a snapshot named
    ///
    /// From the pool: the claim is attempted whether or not the entry is
    /// still queued; a queued entry is consumed even when the claim fails
    /// with `AlreadyAssigned`. From the ready list: the worker is removed
    /// from wherever it sits and resumed.
    pub fn dispatch_specific(&self, caller: Caller, info: &WorkerInfo) -> UmsResult<Response> {
        let process = self.process(caller.pid)?;
        let agent = process.agent(caller.tid)?;

        let mut inner = agent.lock();
        if info.from_pool {
            let worker = process.worker(info.id)?;
            {
                let mut entries = agent.pool().lock();
                if !remove_first(&mut entries, info.id) {
                    ktrace!("pool {}: {} no longer queued", agent.pool().id(), info.id);
                }
                worker.try_claim(agent.tid())?;
            }
            worker.begin_launch(agent.tid());
            Ok(Response::Launch(launch_order(&agent, &worker)))
        } else {
            if !inner.ready.contains(&info.id) {
                return Err(UmsError::NoSuchObject(ObjectKind::Worker));
            }
            let worker = ready_worker(&process, info.id)?;
            inner.take_ready(info.id);
            resume_locked(&mut inner, &worker);
            Ok(Response::Resumed(info.id))
        }
    }

    /// Give back a worker the caller's agent claimed but could not launch
    ///
    /// The claim is released and the worker goes back to the head of the
    /// agent's pool, as if it had never been dispatched.
    pub fn abandon_launch(&self, caller: Caller, worker: WorkerId) -> UmsResult<()> {
        let process = self.process(caller.pid)?;
        let agent = process.agent(caller.tid)?;
        let worker = process.worker(worker)?;

        let _inner = agent.lock();
        if worker.claim() != Claim::Assigned(agent.tid()) || worker.thread().is_some() {
            kerror!("agent {} abandoning {} it never launched", agent.tid(), worker.id());
            return Err(UmsError::InternalInconsistency("abandoned worker was not a pending launch"));
        }
        worker.abandon_launch();
        agent.pool().lock().push_front(worker.id());
        kwarn!("agent {}: launch of {} abandoned", agent.tid(), worker.id());
        Ok(())
    }

    // ========================================================================
    // Worker-side requests
    // ========================================================================

    /// Register the calling thread as the one executing `worker` for `agent`
    pub fn startup_thread(&self, caller: Caller, worker: WorkerId, agent: Tid) -> UmsResult<()> {
        let process = self.process(caller.pid)?;
        let agent = process.agent(agent)?;
        let worker = process.worker(worker)?;

        let mut inner = agent.lock();
        if worker.claim() != Claim::Assigned(agent.tid()) {
            kerror!("startup of {} which agent {} does not hold", worker.id(), agent.tid());
            return Err(UmsError::InternalInconsistency("startup of a worker its agent does not hold"));
        }
        if !process.threads.insert(caller.tid, worker.id()) {
            return Err(UmsError::InternalInconsistency("thread already executes a worker"));
        }
        worker.start_on(caller.tid, agent.tid());
        inner.running = Some(worker.id());
        inner.switch_count += 1;
        Ok(())
    }

    /// Suspend the calling worker and hand control to its driver
    ///
    /// Returns once the driver resumes this worker.
    pub fn yield_worker(&self, caller: Caller) -> UmsResult<()> {
        let process = self.process(caller.pid)?;
        let worker = process.worker_on_thread(caller.tid)?;
        let id = worker.id();
        let agent_tid = worker.agent().ok_or(UmsError::NoSuchObject(ObjectKind::Agent))?;
        let agent = process.agent(agent_tid)?;

        {
            let mut inner = agent.lock();
            if inner.exited || worker.claim() != Claim::Assigned(agent_tid) {
                return Err(UmsError::NoSuchObject(ObjectKind::Agent));
            }
            worker.suspend();
            if !inner.clear_running(id) {
                kwarn!("agent {} was not running {} when it yielded", agent_tid, id);
            }
            inner.ready.push_back(id);
            inner.hand_off(Reason::ThreadYielded, id);
        }
        agent.wake_driver();

        worker.park();
        Ok(())
    }

    /// Finish the calling worker and hand control to its driver
    pub fn end_worker(&self, caller: Caller) -> UmsResult<()> {
        let process = self.process(caller.pid)?;
        let worker = process.worker_on_thread(caller.tid)?;
        let id = worker.id();

        let agent = worker.agent().and_then(|t| process.agents.get(&t));
        let Some(agent) = agent else {
            worker.finish();
            process.threads.remove(&caller.tid);
            kwarn!("worker {} ended after its agent exited", id);
            return Ok(());
        };

        {
            let mut inner = agent.lock();
            worker.finish();
            process.threads.remove(&caller.tid);
            inner.clear_running(id);
            inner.switch_count += 1;
            inner.hand_off(Reason::ThreadEnded, id);
        }
        agent.wake_driver();
        Ok(())
    }

    // ========================================================================
    // Snapshots and reporting
    // ========================================================================

    /// Up to `max` workers from the head of the agent's pool
    pub fn snapshot_pool(&self, caller: Caller, max: usize) -> UmsResult<Vec<WorkerInfo>> {
        let process = self.process(caller.pid)?;
        let agent = process.agent(caller.tid)?;
        let max = max.min(self.config.snapshot_limit);

        let _inner = agent.lock();
        let entries = agent.pool().lock();
        if entries.is_empty() {
            return Err(UmsError::EmptyCompletionPool);
        }
        Ok(entries
            .iter()
            .filter_map(|id| process.workers.get(id.as_u32()))
            .take(max)
            .map(|w| w.info(true))
            .collect())
    }

    /// Up to `max` workers from the head of the agent's ready list
    pub fn snapshot_ready(&self, caller: Caller, max: usize) -> UmsResult<Vec<WorkerInfo>> {
        let process = self.process(caller.pid)?;
        let agent = process.agent(caller.tid)?;
        let max = max.min(self.config.snapshot_limit);

        let inner = agent.lock();
        if inner.ready.is_empty() {
            return Err(UmsError::EmptyReadyList);
        }
        let mut infos = Vec::with_capacity(max.min(inner.ready.len()));
        for id in inner.ready.iter().take(max) {
            infos.push(ready_worker(&process, *id)?.info(false));
        }
        Ok(infos)
    }

    /// Read-only view of one process
    pub fn report(&self, pid: Pid) -> UmsResult<ProcessReport> {
        let process = self.process(pid)?;
        Ok(ProcessReport::collect(&process))
    }

    /// Reports are read-only
    pub fn report_write(&self, _pid: Pid, _input: &str) -> UmsResult<()> {
        Err(UmsError::Unsupported("writing to the scheduling report"))
    }

    /// Pids of registered processes
    pub fn pids(&self) -> Vec<Pid> {
        let mut pids: Vec<Pid> = self.processes.entries().into_iter().map(|(pid, _)| pid).collect();
        pids.sort_unstable();
        pids
    }
}

fn launch_order(agent: &SchedulerAgent, worker: &Worker) -> Dispatch {
    Dispatch {
        worker: worker.id(),
        routine: Arc::clone(worker.routine()),
        arg: Arc::clone(worker.arg()),
        agent: agent.tid(),
        cpu: agent.cpu(),
    }
}

/// Resolve a ready-list entry; claimed workers cannot be deleted
fn ready_worker(process: &Process, id: WorkerId) -> UmsResult<Arc<Worker>> {
    process.workers.get(id.as_u32()).ok_or_else(|| {
        kerror!("ready list names deleted worker {}", id);
        UmsError::InternalInconsistency("ready list names a deleted worker")
    })
}

fn resume_locked(inner: &mut AgentInner, worker: &Worker) {
    worker.resume();
    inner.running = Some(worker.id());
    inner.switch_count += 1;
    worker.unpark();
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::{Barrier, Mutex};
    use std::thread;
    use std::time::Duration;
    use ums_core::{payload, WorkerState};

    const PID: Pid = Pid::new(4242);

    fn service() -> SchedulingService {
        let svc = SchedulingService::new(ServiceConfig::new()).unwrap();
        svc.create_process(PID).unwrap();
        svc
    }

    /// Driver tids in tests are synthetic and far from real thread ids
    fn driver(n: u64) -> Caller {
        Caller::new(PID, Tid::new(u64::MAX - n))
    }

    fn noop() -> Routine {
        Arc::new(|_: Payload| {})
    }

    fn worker(svc: &SchedulingService) -> WorkerId {
        svc.create_worker(PID, noop(), payload(()), None).unwrap()
    }

    fn pool_with(svc: &SchedulingService, workers: &[WorkerId]) -> PoolId {
        let pool = svc.create_pool(PID).unwrap();
        for w in workers {
            svc.pool_add(PID, pool, *w).unwrap();
        }
        pool
    }

    fn state_of(svc: &SchedulingService, id: WorkerId) -> Arc<Worker> {
        svc.process(PID).unwrap().worker(id).unwrap()
    }

    #[test]
    fn test_process_lifecycle() {
        let svc = service();
        assert_eq!(svc.create_process(PID), Err(UmsError::ProcessExists(PID)));

        let w = worker(&svc);
        assert_eq!(svc.delete_process(PID), Err(UmsError::ObjectInUse(ObjectKind::Worker)));
        svc.delete_worker(PID, w).unwrap();
        svc.delete_process(PID).unwrap();

        assert_eq!(svc.create_pool(PID), Err(UmsError::NoSuchProcess(PID)));
        assert_eq!(svc.delete_process(PID), Err(UmsError::NoSuchProcess(PID)));
    }

    #[test]
    fn test_delete_process_racing_create() {
        for round in 0..200 {
            let svc = Arc::new(service());
            let barrier = Arc::new(Barrier::new(2));
            let creator = {
                let (svc, barrier) = (Arc::clone(&svc), Arc::clone(&barrier));
                thread::spawn(move || {
                    barrier.wait();
                    svc.create_pool(PID)
                })
            };
            barrier.wait();
            let deleted = svc.delete_process(PID);
            let created = creator.join().unwrap();

            // Never both: a created pool keeps its process alive
            match (created, deleted) {
                (Ok(_), Err(e)) => assert_eq!(e, UmsError::ObjectInUse(ObjectKind::Pool)),
                (Err(e), Ok(())) => assert_eq!(e, UmsError::NoSuchProcess(PID)),
                other => panic!("round {}: {:?}", round, other),
            }
        }
    }

    #[test]
    fn test_lowest_free_descriptor_reused() {
        let svc = service();
        let ids: Vec<_> = (0..3).map(|_| worker(&svc)).collect();
        assert_eq!(ids, vec![WorkerId::new(0), WorkerId::new(1), WorkerId::new(2)]);

        svc.delete_worker(PID, WorkerId::new(1)).unwrap();
        assert_eq!(worker(&svc), WorkerId::new(1));
        assert_eq!(svc.delete_worker(PID, WorkerId::new(9)), Err(UmsError::NoSuchObject(ObjectKind::Worker)));
    }

    #[test]
    fn test_descriptor_exhaustion() {
        let svc = SchedulingService::new(ServiceConfig::new().max_workers(2)).unwrap();
        svc.create_process(PID).unwrap();
        worker(&svc);
        worker(&svc);
        assert_eq!(
            svc.create_worker(PID, noop(), payload(()), None),
            Err(UmsError::DescriptorsExhausted(ObjectKind::Worker))
        );
    }

    #[test]
    fn test_create_agent_validation() {
        let svc = service();
        let pool = pool_with(&svc, &[]);
        let d = driver(0);

        let cpus = svc.cpu_count();
        assert_eq!(svc.create_agent(d, pool, Some(cpus), None).err(), Some(UmsError::InvalidCpuSelection(cpus)));
        assert_eq!(
            svc.create_agent(d, PoolId::new(77), None, None).err(),
            Some(UmsError::InvalidPoolId(PoolId::new(77)))
        );

        let rec = svc.create_agent(d, pool, Some(0), Some(payload(3u16))).unwrap();
        assert_eq!(rec.reason, Reason::Startup);
        assert_eq!(rec.sched_args_as::<u16>(), Some(&3));
        assert_eq!(svc.create_agent(d, pool, None, None).err(), Some(UmsError::ObjectInUse(ObjectKind::Agent)));
    }

    #[test]
    fn test_bound_pool_not_deletable_until_exit() {
        let svc = service();
        let pool = pool_with(&svc, &[]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        assert_eq!(svc.delete_pool(PID, pool), Err(UmsError::ObjectInUse(ObjectKind::Pool)));
        assert_eq!(svc.delete_process(PID), Err(UmsError::ObjectInUse(ObjectKind::Agent)));

        let rec = svc.exit_agent(d, 17).unwrap();
        assert_eq!(rec.reason, Reason::SchedulerExiting);
        assert_eq!(rec.exit_code(), Some(17));
        assert_eq!(svc.exit_agent(d, 0).err(), Some(UmsError::NoSuchObject(ObjectKind::Agent)));

        svc.delete_pool(PID, pool).unwrap();
        assert_eq!(svc.delete_pool(PID, pool), Err(UmsError::InvalidPoolId(pool)));
        svc.delete_process(PID).unwrap();
    }

    #[test]
    fn test_empty_dispatch_leaves_agent_unchanged() {
        let svc = service();
        let pool = pool_with(&svc, &[]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        assert_eq!(svc.dispatch_next_from_pool(d).err(), Some(UmsError::EmptyCompletionPool));
        assert_eq!(svc.dispatch_next_from_ready(d).err(), Some(UmsError::EmptyReadyList));
        assert_eq!(svc.snapshot_pool(d, 4).err(), Some(UmsError::EmptyCompletionPool));
        assert_eq!(svc.snapshot_ready(d, 4).err(), Some(UmsError::EmptyReadyList));

        let agent = svc.process(PID).unwrap().agent(d.tid).unwrap();
        let inner = agent.lock();
        assert_eq!(inner.handoff().reason, Reason::Startup);
        assert_eq!(inner.switch_count(), 0);
        assert_eq!(inner.running(), None);
    }

    #[test]
    fn test_pool_dispatch_is_fifo() {
        let svc = service();
        let ws: Vec<_> = (0..3).map(|_| worker(&svc)).collect();
        let pool = pool_with(&svc, &[ws[2], ws[0], ws[1]]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        let order: Vec<_> = (0..3).map(|_| svc.dispatch_next_from_pool(d).unwrap().worker).collect();
        assert_eq!(order, vec![ws[2], ws[0], ws[1]]);
        assert_eq!(svc.dispatch_next_from_pool(d).err(), Some(UmsError::EmptyCompletionPool));

        for w in &ws {
            assert_eq!(state_of(&svc, *w).claim(), Claim::Assigned(d.tid));
            assert_eq!(svc.delete_worker(PID, *w), Err(UmsError::AlreadyAssigned(*w)));
        }
    }

    #[test]
    fn test_claimed_and_stale_entries_skipped() {
        let svc = service();
        let a = worker(&svc);
        let b = worker(&svc);
        let c = worker(&svc);
        let p1 = pool_with(&svc, &[a, b, c]);
        let p2 = pool_with(&svc, &[a]);
        let (d1, d2) = (driver(1), driver(2));
        svc.create_agent(d1, p1, None, None).unwrap();
        svc.create_agent(d2, p2, None, None).unwrap();

        // d2 claims a; b is deleted while still queued in p1
        assert_eq!(svc.dispatch_next_from_pool(d2).unwrap().worker, a);
        svc.delete_worker(PID, b).unwrap();

        assert_eq!(svc.dispatch_next_from_pool(d1).unwrap().worker, c);
        let pool = svc.process(PID).unwrap().pool(p1).unwrap();
        assert!(pool.is_empty());
    }

    #[test]
    fn test_racing_agents_claim_each_worker_once() {
        let svc = Arc::new(service());
        let ws: Vec<_> = (0..64).map(|_| worker(&svc)).collect();
        let p1 = pool_with(&svc, &ws);
        let reversed: Vec<_> = ws.iter().rev().copied().collect();
        let p2 = pool_with(&svc, &reversed);
        svc.create_agent(driver(1), p1, None, None).unwrap();
        svc.create_agent(driver(2), p2, None, None).unwrap();

        let barrier = Arc::new(Barrier::new(2));
        let claimed = Arc::new(Mutex::new(Vec::new()));
        let handles: Vec<_> = [driver(1), driver(2)]
            .into_iter()
            .map(|d| {
                let svc = Arc::clone(&svc);
                let barrier = Arc::clone(&barrier);
                let claimed = Arc::clone(&claimed);
                thread::spawn(move || {
                    barrier.wait();
                    while let Ok(dispatch) = svc.dispatch_next_from_pool(d) {
                        claimed.lock().unwrap().push(dispatch.worker);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let claimed = claimed.lock().unwrap();
        let unique: HashSet<_> = claimed.iter().copied().collect();
        assert_eq!(claimed.len(), 64);
        assert_eq!(unique.len(), 64);
    }

    #[test]
    fn test_dispatch_specific_from_pool_consumes_entry() {
        let svc = service();
        let a = worker(&svc);
        let b = worker(&svc);
        let p1 = pool_with(&svc, &[a, b]);
        let p2 = pool_with(&svc, &[b]);
        let (d1, d2) = (driver(1), driver(2));
        svc.create_agent(d1, p1, None, None).unwrap();
        svc.create_agent(d2, p2, None, None).unwrap();

        let snap = svc.snapshot_pool(d1, 8).unwrap();
        assert_eq!(snap.iter().map(|i| i.id).collect::<Vec<_>>(), vec![a, b]);
        assert!(snap.iter().all(|i| i.from_pool));

        // b is taken by the other agent between snapshot and dispatch
        svc.dispatch_next_from_pool(d2).unwrap();
        assert_eq!(svc.dispatch_specific(d1, &snap[1]).err(), Some(UmsError::AlreadyAssigned(b)));
        let pool = svc.process(PID).unwrap().pool(p1).unwrap();
        assert_eq!(pool.ids(), vec![a]);

        // Claimed elsewhere and no longer queued: still refused by the claim
        assert_eq!(svc.dispatch_specific(d1, &snap[1]).err(), Some(UmsError::AlreadyAssigned(b)));

        match svc.dispatch_specific(d1, &snap[0]).unwrap() {
            Response::Launch(d) => assert_eq!(d.worker, a),
            other => panic!("unexpected {:?}", other),
        }
        assert!(pool.is_empty());
    }

    #[test]
    fn test_dispatch_specific_after_entry_removed() {
        let svc = service();
        let a = worker(&svc);
        let pool = pool_with(&svc, &[a]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        let snap = svc.snapshot_pool(d, 4).unwrap();
        svc.pool_remove(PID, pool, a).unwrap();

        match svc.dispatch_specific(d, &snap[0]).unwrap() {
            Response::Launch(dispatch) => assert_eq!(dispatch.worker, a),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(state_of(&svc, a).claim(), Claim::Assigned(d.tid));
    }

    #[test]
    fn test_snapshot_respects_max_and_limit() {
        let svc = SchedulingService::new(ServiceConfig::new().snapshot_limit(3)).unwrap();
        svc.create_process(PID).unwrap();
        let tag = payload("hot");
        let ws: Vec<_> = (0..5)
            .map(|_| svc.create_worker(PID, noop(), payload(()), Some(Arc::clone(&tag))).unwrap())
            .collect();
        let pool = pool_with(&svc, &ws);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        assert_eq!(svc.snapshot_pool(d, 2).unwrap().len(), 2);
        let snap = svc.snapshot_pool(d, 10).unwrap();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0].tag_as::<&str>(), Some(&"hot"));
        assert_eq!(snap[0].switch_count, 0);
        // Snapshots do not consume
        assert_eq!(svc.process(PID).unwrap().pool(pool).unwrap().len(), 5);
    }

    /// Run `body` on a fresh OS thread registered as the executor of `dispatch`
    fn launch<F>(svc: &Arc<SchedulingService>, dispatch: Dispatch, body: F) -> thread::JoinHandle<()>
    where
        F: FnOnce(&SchedulingService, Caller) + Send + 'static,
    {
        let svc = Arc::clone(svc);
        thread::spawn(move || {
            let me = Caller::current(PID);
            svc.startup_thread(me, dispatch.worker, dispatch.agent).unwrap();
            body(&svc, me);
        })
    }

    #[test]
    fn test_yield_resume_end_rendezvous() {
        let svc = Arc::new(service());
        let w = worker(&svc);
        let pool = pool_with(&svc, &[w]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        let dispatch = svc.dispatch_next_from_pool(d).unwrap();
        let handle = launch(&svc, dispatch, |svc, me| {
            thread::sleep(Duration::from_millis(20));
            svc.yield_worker(me).unwrap();
            thread::sleep(Duration::from_millis(5));
            svc.end_worker(me).unwrap();
        });

        let rec = svc.wait_next_call(d).unwrap();
        assert_eq!(rec.reason, Reason::ThreadYielded);
        assert_eq!(rec.worker(), Some(w));

        let wk = state_of(&svc, w);
        assert_eq!(wk.state(), WorkerState::Idle);
        assert_eq!(wk.switch_count(), 2);
        assert!(wk.run_time() >= Duration::from_millis(20));
        assert!(wk.is_claimed());
        {
            let agent = svc.process(PID).unwrap().agent(d.tid).unwrap();
            let inner = agent.lock();
            assert_eq!(inner.ready().iter().copied().collect::<Vec<_>>(), vec![w]);
            assert_eq!(inner.running(), None);
            assert_eq!(inner.switch_count(), 1);
        }

        let ready = svc.snapshot_ready(d, 4).unwrap();
        assert_eq!(ready.len(), 1);
        assert!(!ready[0].from_pool);
        assert!(ready[0].run_time_ms >= 20);

        assert_eq!(svc.dispatch_next_from_ready(d).unwrap(), w);
        let rec = svc.wait_next_call(d).unwrap();
        assert_eq!(rec.reason, Reason::ThreadEnded);
        assert_eq!(rec.worker(), Some(w));
        handle.join().unwrap();

        assert_eq!(wk.state(), WorkerState::Ended);
        assert_eq!(wk.claim(), Claim::Finished);
        assert_eq!(wk.thread(), None);
        {
            let agent = svc.process(PID).unwrap().agent(d.tid).unwrap();
            let inner = agent.lock();
            assert_eq!(inner.running(), None);
            assert!(inner.ready().is_empty());
            assert_eq!(inner.switch_count(), 3);
        }
        // Ended workers are deletable
        svc.delete_worker(PID, w).unwrap();
    }

    /// Ready list, running worker and switch count of an agent
    fn agent_view(svc: &SchedulingService, d: Caller) -> (Vec<WorkerId>, Option<WorkerId>, u64) {
        let agent = svc.process(PID).unwrap().agent(d.tid).unwrap();
        let inner = agent.lock();
        (inner.ready().iter().copied().collect(), inner.running(), inner.switch_count())
    }

    #[test]
    fn test_fifo_session_end_to_end() {
        let svc = Arc::new(service());
        let ws: Vec<_> = (0..3).map(|_| worker(&svc)).collect();
        let (w0, w1, w2) = (ws[0], ws[1], ws[2]);
        let pool = pool_with(&svc, &ws);
        let d = driver(0);

        let rec = svc.create_agent(d, pool, None, None).unwrap();
        assert_eq!(rec.reason, Reason::Startup);

        // W0 runs to completion
        let dispatch = svc.dispatch_next_from_pool(d).unwrap();
        assert_eq!(dispatch.worker, w0);
        let h0 = launch(&svc, dispatch, |svc, me| svc.end_worker(me).unwrap());
        let rec = svc.wait_next_call(d).unwrap();
        assert_eq!((rec.reason, rec.worker()), (Reason::ThreadEnded, Some(w0)));
        assert_eq!(agent_view(&svc, d), (vec![], None, 2));
        h0.join().unwrap();

        // W1 yields once, then ends when resumed
        let dispatch = svc.dispatch_next_from_pool(d).unwrap();
        assert_eq!(dispatch.worker, w1);
        let h1 = launch(&svc, dispatch, |svc, me| {
            svc.yield_worker(me).unwrap();
            svc.end_worker(me).unwrap();
        });
        let rec = svc.wait_next_call(d).unwrap();
        assert_eq!((rec.reason, rec.worker()), (Reason::ThreadYielded, Some(w1)));
        assert_eq!(agent_view(&svc, d), (vec![w1], None, 3));

        // Pool before ready list: W2 runs while W1 waits
        let dispatch = svc.dispatch_next_from_pool(d).unwrap();
        assert_eq!(dispatch.worker, w2);
        let h2 = launch(&svc, dispatch, |svc, me| svc.end_worker(me).unwrap());
        let rec = svc.wait_next_call(d).unwrap();
        assert_eq!((rec.reason, rec.worker()), (Reason::ThreadEnded, Some(w2)));
        assert_eq!(agent_view(&svc, d), (vec![w1], None, 5));
        h2.join().unwrap();

        assert_eq!(svc.dispatch_next_from_pool(d).err(), Some(UmsError::EmptyCompletionPool));
        assert_eq!(svc.dispatch_next_from_ready(d).unwrap(), w1);
        let rec = svc.wait_next_call(d).unwrap();
        assert_eq!((rec.reason, rec.worker()), (Reason::ThreadEnded, Some(w1)));
        assert_eq!(agent_view(&svc, d), (vec![], None, 7));
        h1.join().unwrap();

        assert_eq!(svc.dispatch_next_from_ready(d).err(), Some(UmsError::EmptyReadyList));
        let rec = svc.exit_agent(d, 0).unwrap();
        assert_eq!(rec.reason, Reason::SchedulerExiting);
        assert_eq!(rec.exit_code(), Some(0));

        for w in &ws {
            let wk = state_of(&svc, *w);
            assert_eq!(wk.state(), WorkerState::Ended);
            assert_eq!(wk.claim(), Claim::Finished);
        }
        assert_eq!(state_of(&svc, w0).switch_count(), 1);
        assert_eq!(state_of(&svc, w1).switch_count(), 2);
        svc.delete_pool(PID, pool).unwrap();
        for w in ws {
            svc.delete_worker(PID, w).unwrap();
        }
        svc.delete_process(PID).unwrap();
    }

    #[test]
    fn test_run_time_sums_running_slots_only() {
        const SLOT: Duration = Duration::from_millis(10);
        const IDLE: Duration = Duration::from_millis(60);

        let svc = Arc::new(service());
        let w = worker(&svc);
        let pool = pool_with(&svc, &[w]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        let dispatch = svc.dispatch_next_from_pool(d).unwrap();
        let handle = launch(&svc, dispatch, |svc, me| {
            for _ in 0..3 {
                thread::sleep(SLOT);
                svc.yield_worker(me).unwrap();
            }
            thread::sleep(SLOT);
            svc.end_worker(me).unwrap();
        });

        for _ in 0..3 {
            assert_eq!(svc.wait_next_call(d).unwrap().reason, Reason::ThreadYielded);
            thread::sleep(IDLE);
            assert_eq!(svc.dispatch_next_from_ready(d).unwrap(), w);
        }
        assert_eq!(svc.wait_next_call(d).unwrap().reason, Reason::ThreadEnded);
        handle.join().unwrap();

        let wk = state_of(&svc, w);
        assert_eq!(wk.switch_count(), 4);
        // Four running slots; the three idle gaps are not counted
        assert!(wk.run_time() >= SLOT * 4, "run time {:?}", wk.run_time());
        assert!(wk.run_time() < IDLE * 3 - SLOT * 3, "run time {:?}", wk.run_time());
        assert!(wk.info(false).run_time_ms >= 40);
    }

    #[test]
    fn test_stale_entry_dispatches_worker_reusing_its_id() {
        let svc = service();
        let old = worker(&svc);
        let pool = pool_with(&svc, &[old]);
        svc.delete_worker(PID, old).unwrap();
        assert_eq!(svc.process(PID).unwrap().pool(pool).unwrap().ids(), vec![old]);

        let new = svc.create_worker(PID, noop(), payload(7u8), None).unwrap();
        assert_eq!(new, old);

        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();
        let dispatch = svc.dispatch_next_from_pool(d).unwrap();
        assert_eq!(dispatch.worker, new);
        assert_eq!(dispatch.arg.downcast_ref::<u8>(), Some(&7));
        assert_eq!(state_of(&svc, new).claim(), Claim::Assigned(d.tid));
    }

    #[test]
    fn test_end_before_wait_is_not_lost() {
        let svc = Arc::new(service());
        let w = worker(&svc);
        let pool = pool_with(&svc, &[w]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        let dispatch = svc.dispatch_next_from_pool(d).unwrap();
        launch(&svc, dispatch, |svc, me| svc.end_worker(me).unwrap())
            .join()
            .unwrap();

        let rec = svc.wait_next_call(d).unwrap();
        assert_eq!(rec.reason, Reason::ThreadEnded);
        assert_eq!(rec.worker(), Some(w));
    }

    #[test]
    fn test_dispatch_specific_from_ready_list() {
        let svc = Arc::new(service());
        let ws: Vec<_> = (0..2).map(|_| worker(&svc)).collect();
        let pool = pool_with(&svc, &ws);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        let mut handles = Vec::new();
        for _ in 0..2 {
            let dispatch = svc.dispatch_next_from_pool(d).unwrap();
            handles.push(launch(&svc, dispatch, |svc, me| {
                svc.yield_worker(me).unwrap();
                svc.end_worker(me).unwrap();
            }));
            assert_eq!(svc.wait_next_call(d).unwrap().reason, Reason::ThreadYielded);
        }

        // Resume the second one first, out of FIFO order
        let ready = svc.snapshot_ready(d, 8).unwrap();
        assert_eq!(ready.iter().map(|i| i.id).collect::<Vec<_>>(), ws);
        match svc.dispatch_specific(d, &ready[1]).unwrap() {
            Response::Resumed(id) => assert_eq!(id, ws[1]),
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(svc.wait_next_call(d).unwrap().worker(), Some(ws[1]));

        assert_eq!(svc.dispatch_next_from_ready(d).unwrap(), ws[0]);
        assert_eq!(svc.wait_next_call(d).unwrap().worker(), Some(ws[0]));
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn test_yield_from_plain_thread_rejected() {
        let svc = service();
        let me = Caller::current(PID);
        assert_eq!(svc.yield_worker(me), Err(UmsError::NotAWorkerThread));
        assert_eq!(svc.end_worker(me), Err(UmsError::NotAWorkerThread));
    }

    #[test]
    fn test_startup_requires_claim() {
        let svc = service();
        let w = worker(&svc);
        let pool = pool_with(&svc, &[w]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        let res = svc.startup_thread(Caller::current(PID), w, d.tid);
        assert!(matches!(res, Err(UmsError::InternalInconsistency(_))));
    }

    #[test]
    fn test_abandoned_launch_returns_to_pool_head() {
        let svc = service();
        let a = worker(&svc);
        let b = worker(&svc);
        let pool = pool_with(&svc, &[a, b]);
        let (d, other) = (driver(0), driver(1));
        svc.create_agent(d, pool, None, None).unwrap();
        svc.create_agent(other, pool_with(&svc, &[]), None, None).unwrap();

        assert_eq!(svc.dispatch_next_from_pool(d).unwrap().worker, a);
        assert!(matches!(svc.abandon_launch(other, a), Err(UmsError::InternalInconsistency(_))));
        svc.abandon_launch(d, a).unwrap();

        let wk = state_of(&svc, a);
        assert_eq!(wk.claim(), Claim::Free);
        assert_eq!(wk.agent(), None);
        assert_eq!(svc.process(PID).unwrap().pool(pool).unwrap().ids(), vec![a, b]);
        {
            let agent = svc.process(PID).unwrap().agent(d.tid).unwrap();
            let inner = agent.lock();
            assert_eq!(inner.switch_count(), 0);
            assert_eq!(inner.running(), None);
        }
        // Only a pending launch can be abandoned
        assert!(matches!(svc.abandon_launch(d, a), Err(UmsError::InternalInconsistency(_))));

        svc.exit_agent(d, 0).unwrap();
        svc.delete_worker(PID, a).unwrap();
    }

    #[test]
    fn test_exit_releases_ready_workers() {
        let svc = Arc::new(service());
        let w = worker(&svc);
        let pool = pool_with(&svc, &[w]);
        let d = driver(0);
        svc.create_agent(d, pool, None, None).unwrap();

        let dispatch = svc.dispatch_next_from_pool(d).unwrap();
        // The yielded thread is never resumed; leave it parked
        let _parked = launch(&svc, dispatch, |svc, me| {
            let _ = svc.yield_worker(me);
        });
        assert_eq!(svc.wait_next_call(d).unwrap().reason, Reason::ThreadYielded);

        svc.exit_agent(d, 0).unwrap();
        let wk = state_of(&svc, w);
        assert!(!wk.is_claimed());
        assert_eq!(wk.agent(), None);
        svc.delete_worker(PID, w).unwrap();
    }

    #[test]
    fn test_handle_round_trip() {
        let svc = SchedulingService::new(ServiceConfig::new()).unwrap();
        let me = Caller::new(PID, Tid::new(1));

        assert!(matches!(svc.handle(me, Request::CreateProcess), Ok(Response::Done)));
        let pool = match svc.handle(me, Request::CreatePool) {
            Ok(Response::Pool(p)) => p,
            other => panic!("unexpected {:?}", other),
        };
        let worker = match svc.handle(
            me,
            Request::CreateWorker {
                routine: noop(),
                arg: payload(1u32),
                user_tag: None,
            },
        ) {
            Ok(Response::Worker(w)) => w,
            other => panic!("unexpected {:?}", other),
        };
        assert!(svc.handle(me, Request::PoolAdd { pool, worker }).is_ok());
        assert!(svc.handle(me, Request::PoolRemove { pool, worker }).is_ok());
        assert_eq!(
            svc.handle(me, Request::PoolRemove { pool, worker }).err(),
            Some(UmsError::NoSuchObject(ObjectKind::Worker))
        );
        assert_eq!(svc.handle(me, Request::DispatchNextFromPool).err(), Some(UmsError::NoSuchObject(ObjectKind::Agent)));
        assert_eq!(svc.pids(), vec![PID]);
    }

    #[test]
    fn test_report_is_read_only() {
        let svc = service();
        let w = worker(&svc);
        let pool = pool_with(&svc, &[w]);
        svc.create_agent(driver(0), pool, None, None).unwrap();

        let text = svc.report(PID).unwrap().to_string();
        assert!(text.contains("ns=0"));
        assert!(text.contains("cl=[0]"));
        assert_eq!(svc.report_write(PID, "1"), Err(UmsError::Unsupported("writing to the scheduling report")));
        assert!(matches!(svc.report(Pid::new(1)), Err(UmsError::NoSuchProcess(_))));
    }
}
