#![no_std]
#![forbid(unsafe_code)]

//! # CMW Memory
//!
//! Deterministic containers living inside a memory block owned by the
//! caller. Nothing here allocates: the caller sizes the block with
//! [`table_size`] or [`map_size`], hands it over, and gets it back with
//! `into_inner`.
//!
//! The containers are single-writer and perform no locking. [`Shared`]
//! wraps one in a critical section when several contexts must reach it.

pub mod map;
pub mod shared;
pub mod table;

pub use map::*;
pub use shared::*;
pub use table::*;

/// Occupancy snapshot of a table, for monitoring and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableStats {
    /// Maximum number of items
    pub capacity: u32,
    /// Items currently stored
    pub count: u32,
    /// Size of one item in bytes
    pub item_size: u32,
    /// Bytes of the block used by the header, index and storage
    pub footprint: usize,
}

impl TableStats {
    /// Free slots left
    pub const fn free(&self) -> u32 {
        self.capacity - self.count
    }

    pub const fn is_full(&self) -> bool {
        self.count == self.capacity
    }
}

#[cfg(feature = "defmt")]
impl defmt::Format for TableStats {
    fn format(&self, fmt: defmt::Formatter) {
        defmt::write!(
            fmt,
            "TableStats {{ capacity: {}, count: {}, item_size: {} }}",
            self.capacity,
            self.count,
            self.item_size
        );
    }
}
