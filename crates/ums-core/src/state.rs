//! Worker state and hand-off reasons

use core::fmt;

/// Lifecycle state of a worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WorkerState {
    /// Not executing: fresh, yielded into a ready list, or released
    Idle = 0,

    /// Executing on an OS thread on behalf of an agent
    Running = 1,

    /// Routine returned; the worker is never dispatched again
    Ended = 2,
}

impl WorkerState {
    #[inline]
    pub const fn is_running(&self) -> bool {
        matches!(self, WorkerState::Running)
    }

    #[inline]
    pub const fn is_ended(&self) -> bool {
        matches!(self, WorkerState::Ended)
    }
}

impl From<u8> for WorkerState {
    fn from(v: u8) -> Self {
        match v {
            1 => WorkerState::Running,
            2 => WorkerState::Ended,
            _ => WorkerState::Idle,
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            WorkerState::Idle => "idle",
            WorkerState::Running => "running",
            WorkerState::Ended => "ended",
        };
        f.write_str(s)
    }
}

/// Why control came back to an agent's driver
///
/// The numeric codes are part of the client protocol and are stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Reason {
    /// First invocation of the entry point after the agent was created
    Startup = 100,

    /// The running worker yielded and sits at the tail of the ready list
    ThreadYielded = 102,

    /// The running worker's routine returned
    ThreadEnded = 103,

    /// The driver asked its agent to exit; the payload is the exit code
    SchedulerExiting = 200,
}

impl Reason {
    #[inline]
    pub const fn code(self) -> u16 {
        self as u16
    }

    pub const fn from_code(code: u16) -> Option<Self> {
        match code {
            100 => Some(Reason::Startup),
            102 => Some(Reason::ThreadYielded),
            103 => Some(Reason::ThreadEnded),
            200 => Some(Reason::SchedulerExiting),
            _ => None,
        }
    }

    /// True when the payload names a worker
    #[inline]
    pub const fn carries_worker(self) -> bool {
        matches!(self, Reason::ThreadYielded | Reason::ThreadEnded)
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Reason::Startup => "startup",
            Reason::ThreadYielded => "thread-yielded",
            Reason::ThreadEnded => "thread-ended",
            Reason::SchedulerExiting => "scheduler-exiting",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_from_u8() {
        assert_eq!(WorkerState::from(0), WorkerState::Idle);
        assert_eq!(WorkerState::from(1), WorkerState::Running);
        assert_eq!(WorkerState::from(2), WorkerState::Ended);
        assert_eq!(WorkerState::from(9), WorkerState::Idle);
    }

    #[test]
    fn test_reason_codes() {
        for r in [
            Reason::Startup,
            Reason::ThreadYielded,
            Reason::ThreadEnded,
            Reason::SchedulerExiting,
        ] {
            assert_eq!(Reason::from_code(r.code()), Some(r));
        }
        assert_eq!(Reason::from_code(101), None);
        assert!(Reason::ThreadEnded.carries_worker());
        assert!(!Reason::SchedulerExiting.carries_worker());
    }
}
