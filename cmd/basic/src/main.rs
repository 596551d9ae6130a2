//! Basic UMS example
//!
//! One agent running a FIFO policy: start new workers from the pool first,
//! resume yielded ones once the pool is drained.
//!
//! # Environment Variables
//!
//! - `UMS_FLUSH_EPRINT=1` - Flush debug output immediately (useful for crash debugging)
//! - `UMS_LOG_LEVEL=debug` - Set log level (off, error, warn, info, debug, trace)

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use ums::{kinfo, payload, yield_now, Driver, Reason, Ums, UmsError};

// UMS_LOG_LEVEL=debug UMS_FLUSH_EPRINT=1 cargo run -p ums-basic -- 5
fn main() {
    println!("=== UMS Basic Example ===\n");

    let num_workers: u32 = std::env::args()
        .nth(1)
        .and_then(|s| s.parse().ok())
        .unwrap_or(5);

    if let Err(e) = run(num_workers) {
        eprintln!("error: {} (code {})", e, e.code());
        std::process::exit(1);
    }

    println!("\n=== Example Complete ===");
}

fn run(num_workers: u32) -> Result<(), UmsError> {
    let ums = Ums::init()?;
    let completed = Arc::new(AtomicUsize::new(0));

    let pool = ums.create_pool()?;
    let mut workers = Vec::new();
    for n in 0..num_workers {
        let c = completed.clone();
        let id = ums.create_worker(
            move |arg| {
                let value = arg.downcast_ref::<u32>().copied().unwrap_or(0);
                for i in 0..5 {
                    println!("[worker {}] step {}", value, i);
                    std::thread::sleep(Duration::from_millis(10));
                    if i == 2 {
                        println!("[worker {}] yield", value);
                        let _ = yield_now();
                    }
                }
                c.fetch_add(1, Ordering::SeqCst);
            },
            payload(n),
            None,
        )?;
        ums.pool_add(pool, id)?;
        workers.push(id);
    }
    println!("Created {} workers in pool {}", workers.len(), pool);

    let agent = ums.create_agent(pool, fifo)?;
    let code = ums.join_agent(agent)?;
    println!("\nAgent exited with code {}", code);
    kinfo!("{} worker(s) completed", completed.load(Ordering::SeqCst));

    print!("{}", ums.report()?);

    ums.delete_pool(pool)?;
    for id in workers {
        ums.delete_worker(id)?;
    }
    ums.destroy()
}

fn fifo(d: &mut Driver) {
    match d.reason() {
        Reason::Startup => println!("[agent] startup"),
        Reason::ThreadYielded => println!("[agent] {} yielded", d.record().payload),
        Reason::ThreadEnded => println!("[agent] {} ended", d.record().payload),
        Reason::SchedulerExiting => return,
    }

    match d.dispatch_next_from_pool() {
        Ok(_) => return,
        Err(UmsError::EmptyCompletionPool) => {}
        Err(e) => {
            eprintln!("[agent] dispatch from pool failed: {}", e);
            let _ = d.exit(-e.code());
            return;
        }
    }

    match d.dispatch_next_from_ready() {
        Ok(_) => {}
        Err(UmsError::EmptyReadyList) => {
            println!("[agent] nothing left to run");
            let _ = d.exit(0);
        }
        Err(e) => {
            eprintln!("[agent] dispatch from ready list failed: {}", e);
            let _ = d.exit(-e.code());
        }
    }
}
