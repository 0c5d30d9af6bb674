//! Fixed-capacity ordered table over a caller-owned block
//!
//! Block layout (all words host-endian `u32`):
//!
//! ```text
//! +--------+----------+-----------+--------------+--------------+
//! | count  | capacity | item_size | index_offset | store_offset |  header
//! +--------+----------+-----------+--------------+--------------+
//! | index[0] .. index[capacity - 1]  (byte offsets of items)    |
//! +-------------------------------------------------------------+
//! | padding to 8 bytes                                          |
//! +-------------------------------------------------------------+
//! | item storage: capacity * item_size bytes                    |
//! +-------------------------------------------------------------+
//! ```
//!
//! Logical position `i` maps to the item stored at `index[i]`. Reordering
//! permutes index words and never touches item bytes, so the index array
//! is always a permutation of the storage slots.

use core::ops::Range;

use cmw_core::{RtError, RtResult};

use crate::TableStats;

const WORD: usize = 4;
const COUNT: usize = 0;
const CAPACITY: usize = 4;
const ITEM_SIZE: usize = 8;
const INDEX_OFFSET: usize = 12;
const STORE_OFFSET: usize = 16;

/// Size of the table header in bytes
pub const TABLE_HEADER_SIZE: usize = 20;

const fn align8(value: usize) -> usize {
    (value + 7) & !7
}

/// Computed placement of the index array and item storage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableLayout {
    pub capacity: u32,
    pub item_size: u32,
    pub index_offset: u32,
    pub store_offset: u32,
}

impl TableLayout {
    /// Layout for `capacity` items of `item_size` bytes.
    ///
    /// Fails with `InvalidInParameter` when the offsets do not fit the
    /// 32-bit index words.
    pub fn new(capacity: u32, item_size: u32) -> RtResult<Self> {
        let index_bytes = (capacity as usize)
            .checked_mul(WORD)
            .ok_or(RtError::InvalidInParameter)?;
        let store_offset = align8(TABLE_HEADER_SIZE + index_bytes);
        let layout = Self {
            capacity,
            item_size,
            index_offset: TABLE_HEADER_SIZE as u32,
            store_offset: u32::try_from(store_offset).map_err(|_| RtError::InvalidInParameter)?,
        };
        let total = layout.checked_size().ok_or(RtError::InvalidInParameter)?;
        u32::try_from(total).map_err(|_| RtError::InvalidInParameter)?;
        Ok(layout)
    }

    fn checked_size(&self) -> Option<usize> {
        (self.item_size as usize)
            .checked_mul(self.capacity as usize)?
            .checked_add(self.store_offset as usize)
    }

    /// Bytes needed to host this layout
    pub fn required_size(&self) -> usize {
        self.checked_size().unwrap_or(usize::MAX)
    }
}

/// Bytes a block must provide for a table of `capacity` items of
/// `item_size` bytes, alignment padding included.
pub fn table_size(capacity: u32, item_size: u32) -> usize {
    TableLayout::new(capacity, item_size)
        .map(|layout| layout.required_size())
        .unwrap_or(usize::MAX)
}

/// Byte offset of an item's storage, relative to the start of the table
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotOffset(u32);

impl SlotOffset {
    pub const fn raw(self) -> u32 {
        self.0
    }
}

fn read_word(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at.checked_add(WORD)?)?;
    let mut word = [0u8; WORD];
    word.copy_from_slice(raw);
    Some(u32::from_ne_bytes(word))
}

fn write_word(bytes: &mut [u8], at: usize, value: u32) -> RtResult<()> {
    let end = at.checked_add(WORD).ok_or(RtError::InvalidData)?;
    let raw = bytes.get_mut(at..end).ok_or(RtError::InvalidData)?;
    raw.copy_from_slice(&value.to_ne_bytes());
    Ok(())
}

/// Ordered table of fixed-size items stored in `B`.
///
/// `B` is any byte block: `&mut [u8]`, an array, a `Vec<u8>`, a mapped
/// region. Read-only views (`Table<&[u8]>`) support the query methods.
#[derive(Debug)]
pub struct Table<B> {
    block: B,
}

impl<B: AsRef<[u8]>> Table<B> {
    /// Re-opens a block previously set up by [`Table::init`].
    ///
    /// The header is checked against the block length and rejected with
    /// `InvalidData` if inconsistent.
    pub fn attach(block: B) -> RtResult<Self> {
        let bytes = block.as_ref();
        let header = |field| read_word(bytes, field).ok_or(RtError::InvalidData);
        let count = header(COUNT)?;
        let capacity = header(CAPACITY)?;
        let expected = TableLayout::new(capacity, header(ITEM_SIZE)?).map_err(|_| RtError::InvalidData)?;

        if header(INDEX_OFFSET)? != expected.index_offset
            || header(STORE_OFFSET)? != expected.store_offset
            || count > capacity
            || bytes.len() < expected.required_size()
        {
            log::error!("table_attach: inconsistent table header");
            return Err(RtError::InvalidData);
        }
        Ok(Self { block })
    }

    /// Wraps a block whose header is already known to be valid.
    pub(crate) fn from_validated(block: B) -> Self {
        Self { block }
    }

    fn header(&self, field: usize) -> u32 {
        read_word(self.block.as_ref(), field).unwrap_or(0)
    }

    pub fn count(&self) -> u32 {
        self.header(COUNT)
    }

    pub fn capacity(&self) -> u32 {
        self.header(CAPACITY)
    }

    pub fn item_size(&self) -> u32 {
        self.header(ITEM_SIZE)
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    pub fn is_full(&self) -> bool {
        self.count() >= self.capacity()
    }

    pub fn layout(&self) -> TableLayout {
        TableLayout {
            capacity: self.capacity(),
            item_size: self.item_size(),
            index_offset: self.header(INDEX_OFFSET),
            store_offset: self.header(STORE_OFFSET),
        }
    }

    pub fn stats(&self) -> TableStats {
        let layout = self.layout();
        TableStats {
            capacity: layout.capacity,
            count: self.count(),
            item_size: layout.item_size,
            footprint: layout.required_size(),
        }
    }

    /// Reads `index[pos]` regardless of the current count.
    fn index_entry(&self, pos: u32) -> Option<SlotOffset> {
        if pos >= self.capacity() {
            return None;
        }
        let at = self.header(INDEX_OFFSET) as usize + pos as usize * WORD;
        read_word(self.block.as_ref(), at).map(SlotOffset)
    }

    fn item_range(&self, slot: SlotOffset) -> Option<Range<usize>> {
        let start = slot.0 as usize;
        let end = start.checked_add(self.item_size() as usize)?;
        if start < self.header(STORE_OFFSET) as usize || end > self.block.as_ref().len() {
            return None;
        }
        Some(start..end)
    }

    /// Storage slot of the item at logical position `pos`
    pub fn slot(&self, pos: u32) -> Option<SlotOffset> {
        if pos >= self.count() {
            return None;
        }
        self.index_entry(pos)
    }

    /// Item bytes stored at `slot`
    pub fn item_at(&self, slot: SlotOffset) -> Option<&[u8]> {
        let range = self.item_range(slot)?;
        self.block.as_ref().get(range)
    }

    /// Item at logical position `pos`
    pub fn get(&self, pos: u32) -> Option<&[u8]> {
        self.slot(pos).and_then(|slot| self.item_at(slot))
    }

    /// Items in logical order
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> + '_ {
        (0..self.count()).filter_map(move |pos| self.get(pos))
    }

    pub fn into_inner(self) -> B {
        self.block
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Table<B> {
    /// Sets up a table for `capacity` items of `item_size` bytes in `block`.
    ///
    /// The whole block is zeroed and the index array receives the identity
    /// mapping. Fails with `Failure` if the block is too small.
    pub fn init(mut block: B, capacity: u32, item_size: u32) -> RtResult<Self> {
        let layout = TableLayout::new(capacity, item_size)?;
        let bytes = block.as_mut();
        if bytes.len() < layout.required_size() {
            log::error!(
                "table_init: block of {} bytes is too small, {} required",
                bytes.len(),
                layout.required_size()
            );
            return Err(RtError::Failure);
        }

        bytes.fill(0);
        write_word(bytes, CAPACITY, capacity)?;
        write_word(bytes, ITEM_SIZE, item_size)?;
        write_word(bytes, INDEX_OFFSET, layout.index_offset)?;
        write_word(bytes, STORE_OFFSET, layout.store_offset)?;
        for i in 0..capacity {
            let at = layout.index_offset as usize + i as usize * WORD;
            write_word(bytes, at, layout.store_offset + i * item_size)?;
        }

        Ok(Self { block })
    }

    fn set_count(&mut self, count: u32) -> RtResult<()> {
        write_word(self.block.as_mut(), COUNT, count)
    }

    fn set_index_entry(&mut self, pos: u32, slot: SlotOffset) -> RtResult<()> {
        let at = self.header(INDEX_OFFSET) as usize + pos as usize * WORD;
        write_word(self.block.as_mut(), at, slot.0)
    }

    /// Drops every item. Capacity is unchanged.
    pub fn clear(&mut self) -> RtResult<()> {
        self.set_count(0)
    }

    /// Mutable access to the item bytes stored at `slot`
    pub fn item_at_mut(&mut self, slot: SlotOffset) -> Option<&mut [u8]> {
        let range = self.item_range(slot)?;
        self.block.as_mut().get_mut(range)
    }

    pub fn get_mut(&mut self, pos: u32) -> Option<&mut [u8]> {
        let slot = self.slot(pos)?;
        self.item_at_mut(slot)
    }

    /// Appends a copy of `item`.
    pub fn push(&mut self, item: &[u8]) -> RtResult<()> {
        if item.len() != self.item_size() as usize {
            log::error!(
                "table_push: item of {} bytes, table holds {} byte items",
                item.len(),
                self.item_size()
            );
            return Err(RtError::InvalidInParameter);
        }
        let slot = self.reserve_slot().ok_or_else(|| {
            log::debug!("table_push: table is full");
            RtError::Failure
        })?;
        let dst = self.item_at_mut(slot).ok_or(RtError::InvalidData)?;
        dst.copy_from_slice(item);
        Ok(())
    }

    /// Removes the last item, copying it into `out` when given.
    pub fn pop(&mut self, out: Option<&mut [u8]>) -> RtResult<()> {
        let count = self.count();
        if count == 0 {
            log::debug!("table_pop: table is empty");
            return Err(RtError::Failure);
        }
        if let Some(out) = out {
            if out.len() != self.item_size() as usize {
                log::error!("table_pop: output buffer of {} bytes does not match item size", out.len());
                return Err(RtError::InvalidOutParameter);
            }
            let item = self.get(count - 1).ok_or(RtError::InvalidData)?;
            out.copy_from_slice(item);
        }
        self.set_count(count - 1)
    }

    /// Moves the item at `from` to position `to`, shifting the items in
    /// between by one position.
    pub fn move_item(&mut self, from: u32, to: u32) -> RtResult<()> {
        let count = self.count();
        if from >= count || to >= count {
            log::debug!("table_move: position out of bounds ({from} -> {to}, count {count})");
            return Err(RtError::Failure);
        }
        if from == to {
            return Ok(());
        }

        let saved = self.index_entry(from).ok_or(RtError::InvalidData)?;
        let base = self.header(INDEX_OFFSET) as usize;
        let at = |pos: u32| base + pos as usize * WORD;
        let bytes = self.block.as_mut();
        if from < to {
            bytes.copy_within(at(from + 1)..at(to + 1), at(from));
        } else {
            bytes.copy_within(at(to)..at(from), at(to + 1));
        }
        self.set_index_entry(to, saved)
    }

    /// Inserts a copy of `item` at `pos` (`pos == count` appends).
    pub fn insert(&mut self, pos: u32, item: &[u8]) -> RtResult<()> {
        let count = self.count();
        if pos > count {
            log::debug!("table_insert: position {pos} beyond count {count}");
            return Err(RtError::Failure);
        }
        self.push(item)?;
        self.move_item(count, pos)
    }

    /// Removes the item at `pos`, copying it into `out` when given.
    pub fn remove(&mut self, pos: u32, out: Option<&mut [u8]>) -> RtResult<()> {
        let count = self.count();
        if pos >= count {
            log::debug!("table_remove: position {pos} out of bounds (count {count})");
            return Err(RtError::Failure);
        }
        if matches!(&out, Some(buf) if buf.len() != self.item_size() as usize) {
            return Err(RtError::InvalidOutParameter);
        }
        self.move_item(pos, count - 1)?;
        self.pop(out)
    }

    /// Claims the next free slot without writing it.
    pub fn reserve_slot(&mut self) -> Option<SlotOffset> {
        let count = self.count();
        if count >= self.capacity() {
            return None;
        }
        let slot = self.index_entry(count)?;
        self.set_count(count + 1).ok()?;
        Some(slot)
    }

    /// Claims the next free slot and returns its bytes for in-place
    /// construction. `None` when full.
    pub fn reserve(&mut self) -> Option<&mut [u8]> {
        let slot = self.reserve_slot()?;
        self.item_at_mut(slot)
    }
}
