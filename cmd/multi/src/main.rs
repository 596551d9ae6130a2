//! Two agents on overlapping pools
//!
//! Worker 0 sits in both pools; whichever agent claims it first runs it and
//! the other skips the entry. Each agent is pinned to its own CPU when the
//! machine has more than one.

use std::time::Duration;

use ums::{payload, yield_now, Driver, Reason, Ums, UmsError};

fn main() {
    println!("=== UMS Multi-Agent Example ===\n");

    if let Err(e) = run() {
        eprintln!("error: {} (code {})", e, e.code());
        std::process::exit(1);
    }

    println!("\n=== Example Complete ===");
}

fn run() -> Result<(), UmsError> {
    let ums = Ums::init()?;

    let mut workers = Vec::new();
    for value in 0..5u32 {
        let id = ums.create_worker(
            |arg| {
                let value = arg.downcast_ref::<u32>().copied().unwrap_or(0);
                for i in 0..3 {
                    println!("[worker {}] step {}", value, i);
                    std::thread::sleep(Duration::from_millis(10));
                    if i == 1 {
                        let _ = yield_now();
                    }
                }
            },
            payload(value),
            None,
        )?;
        workers.push(id);
    }

    let left = ums.create_pool()?;
    for id in &workers[0..3] {
        ums.pool_add(left, *id)?;
    }
    let right = ums.create_pool()?;
    ums.pool_add(right, workers[0])?;
    for id in &workers[3..5] {
        ums.pool_add(right, *id)?;
    }

    let cpus = ums.service().cpu_count();
    let mut agents = Vec::new();
    for (n, pool) in [left, right].into_iter().enumerate() {
        let mut builder = ums.agent(pool).sched_args(payload(n));
        if cpus > 1 {
            builder = builder.cpu(n);
        }
        agents.push(builder.spawn(drain)?);
    }

    for agent in agents {
        let tid = agent.tid();
        println!("agent {} exited with code {}", tid, ums.join_agent(agent)?);
    }

    print!("{}", ums.report()?);

    ums.delete_pool(left)?;
    ums.delete_pool(right)?;
    for id in workers {
        ums.delete_worker(id)?;
    }
    ums.destroy()
}

fn drain(d: &mut Driver) {
    let name = d.sched_args_as::<usize>().copied().unwrap_or(0);
    match d.reason() {
        Reason::Startup => println!("[agent {}] startup", name),
        Reason::ThreadYielded | Reason::ThreadEnded => {
            println!("[agent {}] {:?} {}", name, d.reason(), d.record().payload)
        }
        Reason::SchedulerExiting => return,
    }

    let next = match d.dispatch_next_from_pool() {
        Err(UmsError::EmptyCompletionPool) => d.dispatch_next_from_ready(),
        other => other,
    };
    match next {
        Ok(id) => println!("[agent {}] -> {}", name, id),
        Err(UmsError::EmptyReadyList) => {
            println!("[agent {}] done", name);
            let _ = d.exit(0);
        }
        Err(e) => {
            eprintln!("[agent {}] {}", name, e);
            let _ = d.exit(-e.code());
        }
    }
}

