//! Read-only observability report
//!
//! A point-in-time view of one process: every agent with its switch count,
//! pool and ready-list contents and running worker, and every worker with
//! its state, switch count and run time. Rendered as a small tree of
//! `key=value` lines.

use core::fmt;

use ums_core::{Pid, PoolId, Tid, WorkerId, WorkerState};

use crate::process::Process;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentReport {
    pub tid: Tid,
    pub pool: PoolId,
    pub cpu: Option<usize>,
    pub switch_count: u64,
    pub pool_entries: Vec<WorkerId>,
    pub ready: Vec<WorkerId>,
    pub running: Option<WorkerId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerReport {
    pub id: WorkerId,
    pub state: WorkerState,
    pub switch_count: u32,
    pub run_time_ms: u64,
    pub claimed: bool,
    pub thread: Option<Tid>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolReport {
    pub id: PoolId,
    pub entries: Vec<WorkerId>,
    pub bound: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessReport {
    pub pid: Pid,
    pub agents: Vec<AgentReport>,
    pub pools: Vec<PoolReport>,
    pub workers: Vec<WorkerReport>,
}

impl ProcessReport {
    pub(crate) fn collect(process: &Process) -> Self {
        let mut agents: Vec<AgentReport> = process
            .agents
            .entries()
            .into_iter()
            .map(|(tid, agent)| {
                let inner = agent.lock();
                AgentReport {
                    tid,
                    pool: agent.pool().id(),
                    cpu: agent.cpu(),
                    switch_count: inner.switch_count(),
                    pool_entries: agent.pool().ids(),
                    ready: inner.ready().iter().copied().collect(),
                    running: inner.running(),
                }
            })
            .collect();
        agents.sort_by_key(|a| a.tid);

        let pools = process
            .pools
            .entries()
            .into_iter()
            .map(|(_, pool)| PoolReport {
                id: pool.id(),
                entries: pool.ids(),
                bound: pool.is_bound(),
            })
            .collect();

        let workers = process
            .workers
            .entries()
            .into_iter()
            .map(|(_, w)| WorkerReport {
                id: w.id(),
                state: w.state(),
                switch_count: w.switch_count(),
                run_time_ms: w.run_time().as_millis() as u64,
                claimed: w.is_claimed(),
                thread: w.thread(),
            })
            .collect();

        Self {
            pid: process.pid(),
            agents,
            pools,
            workers,
        }
    }
}

struct Ids<'a>(&'a [WorkerId]);

impl fmt::Display for Ids<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, id) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", id.as_u32())?;
        }
        f.write_str("]")
    }
}

impl fmt::Display for ProcessReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "process {}", self.pid)?;
        for a in &self.agents {
            writeln!(f, "scheduler {}", a.tid)?;
            writeln!(f, "  pool={}", a.pool.as_u32())?;
            match a.cpu {
                Some(cpu) => writeln!(f, "  cpu={}", cpu)?,
                None => writeln!(f, "  cpu=any")?,
            }
            writeln!(f, "  ns={}", a.switch_count)?;
            writeln!(f, "  cl={}", Ids(&a.pool_entries))?;
            writeln!(f, "  rl={}", Ids(&a.ready))?;
            writeln!(f, "  run={}", a.running.map_or(-1, |w| w.as_u32() as i64))?;
        }
        for p in &self.pools {
            writeln!(f, "pool {}", p.id.as_u32())?;
            writeln!(f, "  entries={}", Ids(&p.entries))?;
            writeln!(f, "  bound={}", p.bound)?;
        }
        for w in &self.workers {
            writeln!(f, "worker {}", w.id.as_u32())?;
            writeln!(f, "  ns={}", w.switch_count)?;
            writeln!(f, "  state={}", w.state)?;
            writeln!(f, "  ums_run_time={}", w.run_time_ms)?;
            writeln!(f, "  claimed={}", w.claimed)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::pool::CompletionPool;
    use crate::worker::Worker;
    use std::sync::Arc;
    use ums_core::{payload, Payload};

    #[test]
    fn test_collect_and_render() {
        let process = Process::new(Pid::new(7), &ServiceConfig::new());
        for _ in 0..2 {
            process
                .workers
                .insert_with(|id| Worker::new(WorkerId::new(id), Arc::new(|_: Payload| {}), payload(()), None));
        }
        let (_, pool) = process
            .pools
            .insert_with(|id| CompletionPool::new(PoolId::new(id)))
            .unwrap();
        pool.push(WorkerId::new(1));
        pool.push(WorkerId::new(0));

        let report = ProcessReport::collect(&process);
        assert_eq!(report.workers.len(), 2);
        assert_eq!(report.pools[0].entries, vec![WorkerId::new(1), WorkerId::new(0)]);
        assert!(report.agents.is_empty());

        let text = report.to_string();
        assert!(text.starts_with("process 7\n"));
        assert!(text.contains("pool 0\n  entries=[1, 0]\n  bound=false\n"));
        assert!(text.contains("worker 1\n  ns=0\n  state=idle\n  ums_run_time=0\n  claimed=false\n"));
    }

    #[test]
    fn test_ids_formatting() {
        assert_eq!(Ids(&[]).to_string(), "[]");
        assert_eq!(Ids(&[WorkerId::new(4)]).to_string(), "[4]");
    }
}
