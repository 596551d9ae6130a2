//! Thread launcher
//!
//! A driver that claims a worker which has never run must give it an OS
//! thread. The launcher spawns that thread, which registers itself with
//! the service, runs the routine and reports End.

use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc;
use std::thread;

use ums_core::{kdebug, kerror, ktrace, UmsError, UmsResult};
use ums_runtime::{platform, Dispatch, Request};

use crate::{tls, Ums};

/// Starts freshly claimed workers on their own OS threads
pub trait ThreadLauncher: Send + Sync {
    fn launch(&self, ums: &Ums, dispatch: Dispatch) -> UmsResult<()>;
}

/// Default launcher: one `std::thread` per worker
#[derive(Debug, Clone, Default)]
pub struct OsThreadLauncher {
    stack_size: Option<usize>,
}

impl OsThreadLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stack size for worker threads (default: the std default)
    pub fn stack_size(mut self, bytes: usize) -> Self {
        self.stack_size = Some(bytes);
        self
    }
}

impl ThreadLauncher for OsThreadLauncher {
    fn launch(&self, ums: &Ums, dispatch: Dispatch) -> UmsResult<()> {
        let mut builder = thread::Builder::new().name(format!("ums-{}", dispatch.worker));
        if let Some(bytes) = self.stack_size {
            builder = builder.stack_size(bytes);
        }
        let ums = ums.clone();
        let (tx, rx) = mpsc::channel();
        builder.spawn(move || {
            run_worker(ums, dispatch, move |started| {
                let _ = tx.send(started);
            })
        })?;
        rx.recv()
            .map_err(|_| UmsError::LaunchFailed("worker thread died before startup".into()))?
    }
}

/// Body of a worker thread
///
/// Usable by custom launchers that bring their own threads. `started` is
/// called once with the outcome of registering the thread; on error the
/// routine never runs and the caller should fail its launch.
pub fn run_worker<S>(ums: Ums, dispatch: Dispatch, started: S)
where
    S: FnOnce(UmsResult<()>),
{
    let Dispatch {
        worker,
        routine,
        arg,
        agent,
        cpu,
    } = dispatch;

    if let Some(cpu) = cpu {
        if let Err(e) = platform::pin_current_thread(cpu) {
            kdebug!("worker {} not pinned to cpu {}: {}", worker, cpu, e);
        }
    }

    if let Err(e) = ums.request(Request::StartupThread { worker, agent }) {
        kerror!("worker {} could not start under agent {}: {}", worker, agent, e);
        started(Err(e));
        return;
    }
    started(Ok(()));
    tls::enter_worker(&ums, worker);
    ktrace!("worker {} running", worker);

    if panic::catch_unwind(AssertUnwindSafe(|| routine(arg))).is_err() {
        kerror!("worker {} panicked; ending it", worker);
    }

    tls::leave_worker();
    if let Err(e) = ums.request(Request::End) {
        kerror!("worker {} could not end: {}", worker, e);
    }
}
