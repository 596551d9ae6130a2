//! # ums-runtime
//!
//! The user-mode scheduling service.
//!
//! This crate provides:
//! - The process registry and per-process worker/pool descriptor tables
//! - Scheduler agents with their ready lists and hand-off records
//! - The claim protocol that lets agents race for workers across pools
//! - Driver/worker rendezvous built on permit-based thread parking
//! - The request/response protocol clients talk to the service with
//! - A read-only observability report

pub mod config;
pub mod registry;
pub mod worker;
pub mod pool;
pub mod agent;
pub mod process;
pub mod protocol;
pub mod service;
pub mod report;
pub mod parking;
pub mod platform;

// Re-exports
pub use config::{ConfigError, ServiceConfig};
pub use registry::Registry;
pub use worker::{Claim, Worker};
pub use pool::CompletionPool;
pub use agent::SchedulerAgent;
pub use process::Process;
pub use protocol::{Caller, Dispatch, Request, Response};
pub use service::SchedulingService;
pub use report::{AgentReport, PoolReport, ProcessReport, WorkerReport};
pub use parking::{new_parking, ThreadParking};

// Platform detection
cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod platform_linux;
        pub use platform_linux::LinuxPlatform as CurrentPlatform;
    } else {
        mod platform_fallback;
        pub use platform_fallback::FallbackPlatform as CurrentPlatform;
    }
}
