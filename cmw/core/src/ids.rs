//! Task and component-instance identifiers

use core::fmt;

/// Sentinel used for "no task" / "not found" lookups
pub const NONE_ID: u32 = 0xFFFF_FFFF;

/// Logical task identifier, bound to one OS thread by the task registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u32);

impl TaskId {
    /// Returned when the calling context is not a registered task
    pub const NONE: TaskId = TaskId(NONE_ID);

    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }

    pub const fn is_none(self) -> bool {
        self.0 == NONE_ID
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_none() {
            write!(f, "task#none")
        } else {
            write!(f, "task#{}", self.0)
        }
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TaskId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "task#{}", self.0);
    }
}

/// Component instance identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(pub u32);

impl InstanceId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "instance#{}", self.0)
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for InstanceId {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(fmt, "instance#{}", self.0);
    }
}
