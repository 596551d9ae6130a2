//! Priority scheduling example
//!
//! Every worker carries a priority in its user tag. The agent snapshots its
//! pool and ready list and dispatches the highest-priority worker it sees,
//! falling back to the next pool entry when another claim got there first.

use std::time::Duration;

use ums::{payload, yield_now, Driver, Reason, Ums, UmsError, WorkerInfo};

/// Per-worker scheduling hint
struct Hint {
    prio: u32,
}

const SNAPSHOT: usize = 8;

fn main() {
    println!("=== UMS Priority Example ===\n");

    if let Err(e) = run() {
        eprintln!("error: {} (code {})", e, e.code());
        std::process::exit(1);
    }

    println!("\n=== Example Complete ===");
}

fn run() -> Result<(), UmsError> {
    let ums = Ums::init()?;
    let pool = ums.create_pool()?;

    let mut workers = Vec::new();
    for (value, prio) in [(0u32, 4u32), (1, 3), (2, 2), (3, 5)] {
        let id = ums.create_worker(
            |arg| {
                let value = arg.downcast_ref::<u32>().copied().unwrap_or(0);
                for i in 0..4 {
                    println!("[worker {}] step {}", value, i);
                    std::thread::sleep(Duration::from_millis(5));
                    if i == 1 {
                        let _ = yield_now();
                    }
                }
            },
            payload(value),
            Some(payload(Hint { prio })),
        )?;
        ums.pool_add(pool, id)?;
        workers.push(id);
    }

    let agent = ums.create_agent(pool, by_priority)?;
    println!("\nAgent exited with code {}", ums.join_agent(agent)?);

    ums.delete_pool(pool)?;
    for id in workers {
        ums.delete_worker(id)?;
    }
    ums.destroy()
}

fn prio(info: &WorkerInfo) -> u32 {
    info.tag_as::<Hint>().map_or(0, |h| h.prio)
}

fn by_priority(d: &mut Driver) {
    if d.reason() == Reason::SchedulerExiting {
        return;
    }

    let mut candidates: Vec<WorkerInfo> = Vec::new();
    for snapshot in [d.snapshot_pool(SNAPSHOT), d.snapshot_ready(SNAPSHOT)] {
        match snapshot {
            Ok(infos) => candidates.extend(infos),
            Err(UmsError::EmptyCompletionPool) | Err(UmsError::EmptyReadyList) => {}
            Err(e) => {
                eprintln!("[agent] snapshot failed: {}", e);
                let _ = d.exit(-e.code());
                return;
            }
        }
    }

    for info in &candidates {
        println!(
            "[agent] {} {}: prio={} ns={} run={}ms",
            if info.from_pool { "cl" } else { "rl" },
            info.id,
            prio(info),
            info.switch_count,
            info.run_time_ms
        );
    }

    let Some(best) = candidates.iter().max_by_key(|i| prio(i)) else {
        println!("[agent] nothing left to run");
        let _ = d.exit(0);
        return;
    };

    match d.dispatch_specific(best) {
        Ok(id) => println!("[agent] running {} (prio {})", id, prio(best)),
        Err(UmsError::AlreadyAssigned(id)) => {
            println!("[agent] {} already assigned, taking the next one", id);
            if let Err(e) = d.dispatch_next_from_pool() {
                eprintln!("[agent] {}", e);
                let _ = d.exit(-e.code());
            }
        }
        Err(e) => {
            eprintln!("[agent] dispatch failed: {}", e);
            let _ = d.exit(-e.code());
        }
    }
}
