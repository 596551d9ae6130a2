//! # ums-core
//!
//! Core types for the user-mode scheduling (UMS) service.
//!
//! This crate is platform-agnostic and contains no OS-specific code.
//! The service itself lives in `ums-runtime`.
//!
//! ## Modules
//!
//! - `id` - Process, thread, worker and pool identifiers
//! - `state` - Worker state and hand-off reasons
//! - `handoff` - Hand-off record, worker snapshots, opaque payloads
//! - `descriptor` - Lowest-free-id descriptor table
//! - `error` - Error types
//! - `spinlock` - Spinlock for short critical sections
//! - `kprint` - Kernel-style leveled logging macros
//! - `env` - Environment variable utilities

pub mod id;
pub mod state;
pub mod handoff;
pub mod descriptor;
pub mod error;
pub mod spinlock;
pub mod kprint;
pub mod env;

// Re-exports for convenience
pub use id::{Pid, PoolId, Tid, WorkerId};
pub use state::{Reason, WorkerState};
pub use handoff::{payload, HandoffRecord, Payload, Routine, WorkerInfo};
pub use descriptor::DescriptorTable;
pub use error::{ObjectKind, UmsError, UmsResult};
pub use spinlock::SpinLock;
pub use env::{env_get, env_get_bool, env_get_clamped, env_get_opt};

/// Protocol constants
pub mod constants {
    pub use crate::descriptor::{MAX_DESCRIPTOR, MIN_DESCRIPTOR};

    /// No CPU preference, as encoded on the wire
    pub const CPU_ANY: i32 = -1;

    /// Default cap on entries returned by one snapshot request
    pub const DEFAULT_SNAPSHOT_LIMIT: usize = 128;
}
