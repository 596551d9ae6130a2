//! Identifier types for scheduling entities
//!
//! Workers and completion pools are addressed by small per-process
//! descriptors handed out by a [`DescriptorTable`](crate::DescriptorTable).
//! Processes and OS threads use the identifiers the platform gives them.

use core::fmt;

macro_rules! descriptor_id {
    ($(#[$doc:meta])* $name:ident, $tag:literal) => {
        $(#[$doc])*
        #[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create from a raw descriptor value
            #[inline]
            pub const fn new(id: u32) -> Self {
                $name(id)
            }

            /// Get the raw descriptor value
            #[inline]
            pub const fn as_u32(self) -> u32 {
                self.0
            }

            /// Get as usize for indexing
            #[inline]
            pub const fn as_usize(self) -> usize {
                self.0 as usize
            }
        }

        impl From<u32> for $name {
            #[inline]
            fn from(id: u32) -> Self {
                $name(id)
            }
        }

        impl From<$name> for u32 {
            #[inline]
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!(stringify!($name), "({})"), self.0)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($tag, "{}"), self.0)
            }
        }
    };
}

descriptor_id!(
    /// Descriptor of a worker, unique within its process while the worker lives
    WorkerId, "w"
);

descriptor_id!(
    /// Descriptor of a completion pool, unique within its process while the pool lives
    PoolId, "p"
);

/// Identifier of a client process
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Pid(u32);

impl Pid {
    #[inline]
    pub const fn new(pid: u32) -> Self {
        Pid(pid)
    }

    /// Pid of the calling process
    #[inline]
    pub fn current() -> Self {
        Pid(std::process::id())
    }

    #[inline]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Debug for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pid({})", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of an OS thread
///
/// Agents are keyed by the tid of their driver thread, and running workers
/// are resolved back from the tid of the thread executing them.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct Tid(u64);

impl Tid {
    #[inline]
    pub const fn new(tid: u64) -> Self {
        Tid(tid)
    }

    #[inline]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Tid({})", self.0)
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
