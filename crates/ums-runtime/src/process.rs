//! Per-process scheduling state
//!
//! A process owns its worker and pool descriptor tables, the agents keyed
//! by driver tid and the map from worker OS threads back to the worker each
//! one executes.

use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use ums_core::{
    DescriptorTable, ObjectKind, Pid, PoolId, Tid, UmsError, UmsResult, WorkerId,
};

use crate::agent::SchedulerAgent;
use crate::config::ServiceConfig;
use crate::pool::CompletionPool;
use crate::registry::Registry;
use crate::worker::Worker;

pub struct Process {
    pid: Pid,
    pub(crate) workers: DescriptorTable<Worker>,
    pub(crate) pools: DescriptorTable<CompletionPool>,
    pub(crate) agents: Registry<Tid, Arc<SchedulerAgent>>,
    pub(crate) threads: Registry<Tid, WorkerId>,
    /// Held shared while an object is added; `true` once closed
    gate: RwLock<bool>,
}

impl Process {
    pub fn new(pid: Pid, config: &ServiceConfig) -> Self {
        Self {
            pid,
            workers: DescriptorTable::new(config.min_id, config.max_worker_id()),
            pools: DescriptorTable::new(config.min_id, config.max_pool_id()),
            agents: Registry::new(),
            threads: Registry::new(),
            gate: RwLock::new(false),
        }
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        self.pid
    }

    pub fn worker(&self, id: WorkerId) -> UmsResult<Arc<Worker>> {
        self.workers
            .get(id.as_u32())
            .ok_or(UmsError::NoSuchObject(ObjectKind::Worker))
    }

    pub fn pool(&self, id: PoolId) -> UmsResult<Arc<CompletionPool>> {
        self.pools.get(id.as_u32()).ok_or(UmsError::InvalidPoolId(id))
    }

    /// Agent driven by the thread `tid`
    pub fn agent(&self, tid: Tid) -> UmsResult<Arc<SchedulerAgent>> {
        self.agents
            .get(&tid)
            .ok_or(UmsError::NoSuchObject(ObjectKind::Agent))
    }

    /// Worker executed by the OS thread `tid`
    pub fn worker_on_thread(&self, tid: Tid) -> UmsResult<Arc<Worker>> {
        let id = self.threads.get(&tid).ok_or(UmsError::NotAWorkerThread)?;
        self.workers
            .get(id.as_u32())
            .ok_or(UmsError::InternalInconsistency("thread registry names a deleted worker"))
    }

    /// Admit an operation that adds a worker, pool or agent
    ///
    /// Hold the guard until the object is in its table so that [`close`]
    /// sees it.
    ///
    /// [`close`]: Process::close
    pub(crate) fn admit(&self) -> UmsResult<RwLockReadGuard<'_, bool>> {
        let closed = self.gate.read().unwrap_or_else(PoisonError::into_inner);
        if *closed {
            return Err(UmsError::NoSuchProcess(self.pid));
        }
        Ok(closed)
    }

    /// Close a process that owns nothing
    ///
    /// Waits for admitted operations to finish. Refusals name agents, then
    /// pools, then workers.
    pub(crate) fn close(&self) -> UmsResult<()> {
        let mut closed = self.gate.write().unwrap_or_else(PoisonError::into_inner);
        if self.agent_count() > 0 {
            Err(UmsError::ObjectInUse(ObjectKind::Agent))
        } else if self.pool_count() > 0 {
            Err(UmsError::ObjectInUse(ObjectKind::Pool))
        } else if self.worker_count() > 0 {
            Err(UmsError::ObjectInUse(ObjectKind::Worker))
        } else {
            *closed = true;
            Ok(())
        }
    }

    /// True when no worker, pool or agent is left
    pub fn is_vacant(&self) -> bool {
        self.workers.is_empty() && self.pools.is_empty() && self.agents.is_empty()
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    pub fn pool_count(&self) -> usize {
        self.pools.len()
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ums_core::{payload, Payload};

    #[test]
    fn test_lookups_fail_with_kind() {
        let p = Process::new(Pid::new(1), &ServiceConfig::new());
        assert_eq!(p.worker(WorkerId::new(0)).err(), Some(UmsError::NoSuchObject(ObjectKind::Worker)));
        assert_eq!(p.pool(PoolId::new(2)).err(), Some(UmsError::InvalidPoolId(PoolId::new(2))));
        assert_eq!(p.agent(Tid::new(3)).err(), Some(UmsError::NoSuchObject(ObjectKind::Agent)));
        assert_eq!(p.worker_on_thread(Tid::new(3)).err(), Some(UmsError::NotAWorkerThread));
        assert!(p.is_vacant());
    }

    #[test]
    fn test_closed_process_admits_nothing() {
        let p = Process::new(Pid::new(1), &ServiceConfig::new());
        let pool = p.pools.insert_with(|id| CompletionPool::new(PoolId::new(id))).unwrap().0;
        assert_eq!(p.close(), Err(UmsError::ObjectInUse(ObjectKind::Pool)));
        assert!(p.admit().is_ok());

        p.pools.remove_if(pool, |_| Ok::<(), UmsError>(())).unwrap();
        p.close().unwrap();
        assert_eq!(p.admit().err(), Some(UmsError::NoSuchProcess(Pid::new(1))));
    }

    #[test]
    fn test_close_waits_for_admitted_creator() {
        let p = Arc::new(Process::new(Pid::new(1), &ServiceConfig::new()));
        let admitted = p.admit().unwrap();

        let closer = {
            let p = Arc::clone(&p);
            std::thread::spawn(move || p.close())
        };
        std::thread::sleep(std::time::Duration::from_millis(20));
        let mk = |id| Worker::new(WorkerId::new(id), Arc::new(|_: Payload| {}), payload(()), None);
        assert!(p.workers.insert_with(mk).is_some());
        drop(admitted);

        assert_eq!(closer.join().unwrap(), Err(UmsError::ObjectInUse(ObjectKind::Worker)));
        assert!(p.admit().is_ok());
    }

    #[test]
    fn test_tables_sized_from_config() {
        let p = Process::new(Pid::new(1), &ServiceConfig::new().max_workers(2));
        let mk = |id| Worker::new(WorkerId::new(id), Arc::new(|_: Payload| {}), payload(()), None);
        assert!(p.workers.insert_with(mk).is_some());
        assert!(p.workers.insert_with(mk).is_some());
        assert!(p.workers.insert_with(mk).is_none());
        assert_eq!(p.worker_count(), 2);
        assert!(!p.is_vacant());
    }
}
