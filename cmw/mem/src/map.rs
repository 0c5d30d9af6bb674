//! Key/value map built on [`Table`]
//!
//! Each table item is an `i64` key followed by the value, padded to a
//! multiple of eight bytes. Keys are unique; lookups scan the present
//! entries linearly, and position carries no key ordering.

use core::ops::Range;

use cmw_core::{RtError, RtResult};

use crate::table::{table_size, SlotOffset, Table};

const VALUE_SIZE: usize = 0;
const LIST_OFFSET: usize = 4;
const KEY_SIZE: usize = 8;

/// Size of the map header preceding its table
pub const MAP_HEADER_SIZE: usize = 8;

/// Table item size for values of `value_size` bytes, `None` if it does not
/// fit in a `u32`.
pub const fn map_item_size(value_size: u32) -> Option<u32> {
    match value_size.checked_next_multiple_of(8) {
        Some(padded) => padded.checked_add(KEY_SIZE as u32),
        None => None,
    }
}

/// Bytes a block must provide for `capacity` entries of `value_size` bytes
/// (`usize::MAX` when no block can).
pub fn map_size(capacity: u32, value_size: u32) -> usize {
    match map_item_size(value_size) {
        Some(item_size) => table_size(capacity, item_size).saturating_add(MAP_HEADER_SIZE),
        None => usize::MAX,
    }
}

fn read_word(bytes: &[u8], at: usize) -> Option<u32> {
    let raw = bytes.get(at..at + 4)?;
    Some(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

fn read_key(item: &[u8]) -> Option<i64> {
    let raw: [u8; KEY_SIZE] = item.get(..KEY_SIZE)?.try_into().ok()?;
    Some(i64::from_ne_bytes(raw))
}

/// Map from `i64` keys to fixed-size values, stored in `B`.
#[derive(Debug)]
pub struct Map<B> {
    block: B,
    value_size: u32,
}

impl<B: AsRef<[u8]>> Map<B> {
    /// Re-opens a block previously set up by [`Map::init`].
    pub fn attach(block: B) -> RtResult<Self> {
        let bytes = block.as_ref();
        let value_size = read_word(bytes, VALUE_SIZE).ok_or(RtError::InvalidData)?;
        let list_offset = read_word(bytes, LIST_OFFSET).ok_or(RtError::InvalidData)?;
        if list_offset as usize != MAP_HEADER_SIZE {
            log::error!("map_attach: unexpected list offset {list_offset}");
            return Err(RtError::InvalidData);
        }
        let list = Table::attach(&bytes[MAP_HEADER_SIZE..])?;
        if Some(list.item_size()) != map_item_size(value_size) {
            log::error!("map_attach: item size does not match value size {value_size}");
            return Err(RtError::InvalidData);
        }
        Ok(Self { block, value_size })
    }

    fn list(&self) -> Table<&[u8]> {
        Table::from_validated(&self.block.as_ref()[MAP_HEADER_SIZE..])
    }

    pub fn value_size(&self) -> u32 {
        self.value_size
    }

    pub fn count(&self) -> u32 {
        self.list().count()
    }

    pub fn capacity(&self) -> u32 {
        self.list().capacity()
    }

    pub fn is_empty(&self) -> bool {
        self.count() == 0
    }

    /// Absolute range of the value stored in `slot`
    fn value_range(&self, slot: SlotOffset) -> Range<usize> {
        let start = MAP_HEADER_SIZE + slot.raw() as usize + KEY_SIZE;
        start..start + self.value_size as usize
    }

    /// Position and slot of `key`, if present
    fn find(&self, key: i64) -> Option<(u32, SlotOffset)> {
        let list = self.list();
        (0..list.count()).find_map(|pos| {
            let slot = list.slot(pos)?;
            (read_key(list.item_at(slot)?)? == key).then_some((pos, slot))
        })
    }

    pub fn has(&self, key: i64) -> bool {
        self.find(key).is_some()
    }

    /// Value stored under `key`
    pub fn get(&self, key: i64) -> Option<&[u8]> {
        let (_, slot) = self.find(key)?;
        self.block.as_ref().get(self.value_range(slot))
    }

    /// Key of the entry at position `pos`
    pub fn key_at(&self, pos: u32) -> Option<i64> {
        read_key(self.list().get(pos)?)
    }

    /// Value of the entry at position `pos`
    pub fn value_at(&self, pos: u32) -> Option<&[u8]> {
        let slot = self.list().slot(pos)?;
        self.block.as_ref().get(self.value_range(slot))
    }

    /// Entries in position order
    pub fn iter(&self) -> impl Iterator<Item = (i64, &[u8])> + '_ {
        (0..self.count()).filter_map(move |pos| Some((self.key_at(pos)?, self.value_at(pos)?)))
    }

    pub fn into_inner(self) -> B {
        self.block
    }
}

impl<B: AsRef<[u8]> + AsMut<[u8]>> Map<B> {
    /// Sets up a map for `capacity` entries of `value_size` bytes in `block`.
    pub fn init(mut block: B, capacity: u32, value_size: u32) -> RtResult<Self> {
        let bytes = block.as_mut();
        if bytes.len() < MAP_HEADER_SIZE {
            log::error!("map_init: block of {} bytes cannot hold the map header", bytes.len());
            return Err(RtError::Failure);
        }
        let Some(item_size) = map_item_size(value_size) else {
            log::error!("map_init: value size {value_size} is too large");
            return Err(RtError::InvalidInParameter);
        };
        let (header, rest) = bytes.split_at_mut(MAP_HEADER_SIZE);
        Table::init(rest, capacity, item_size)?;
        header[VALUE_SIZE..VALUE_SIZE + 4].copy_from_slice(&value_size.to_ne_bytes());
        header[LIST_OFFSET..LIST_OFFSET + 4].copy_from_slice(&(MAP_HEADER_SIZE as u32).to_ne_bytes());
        Ok(Self { block, value_size })
    }

    fn list_mut(&mut self) -> Table<&mut [u8]> {
        Table::from_validated(&mut self.block.as_mut()[MAP_HEADER_SIZE..])
    }

    fn value_mut(&mut self, slot: SlotOffset) -> RtResult<&mut [u8]> {
        let range = self.value_range(slot);
        self.block.as_mut().get_mut(range).ok_or(RtError::InvalidData)
    }

    pub fn get_mut(&mut self, key: i64) -> Option<&mut [u8]> {
        let (_, slot) = self.find(key)?;
        self.value_mut(slot).ok()
    }

    /// Value slot for `key`, created (zeroed) if the key is absent.
    ///
    /// Fails with `Failure` when the key is new and the map is full.
    pub fn set(&mut self, key: i64) -> RtResult<&mut [u8]> {
        let slot = match self.find(key) {
            Some((_, slot)) => slot,
            None => {
                let mut list = self.list_mut();
                let slot = list.reserve_slot().ok_or_else(|| {
                    log::debug!("map_set: map is full, cannot add key {key}");
                    RtError::Failure
                })?;
                let item = list.item_at_mut(slot).ok_or(RtError::InvalidData)?;
                item.fill(0);
                item[..KEY_SIZE].copy_from_slice(&key.to_ne_bytes());
                slot
            }
        };
        self.value_mut(slot)
    }

    /// Stores `value` under `key`, overwriting any previous value.
    pub fn add(&mut self, key: i64, value: &[u8]) -> RtResult<()> {
        if value.len() != self.value_size as usize {
            log::error!(
                "map_add: value of {} bytes, map holds {} byte values",
                value.len(),
                self.value_size
            );
            return Err(RtError::InvalidInParameter);
        }
        self.set(key)?.copy_from_slice(value);
        Ok(())
    }

    /// Removes `key`, copying its value into `out` when given.
    pub fn remove(&mut self, key: i64, out: Option<&mut [u8]>) -> RtResult<()> {
        let (pos, slot) = self.find(key).ok_or_else(|| {
            log::debug!("map_remove: key {key} not found");
            RtError::Failure
        })?;
        if let Some(out) = out {
            if out.len() != self.value_size as usize {
                return Err(RtError::InvalidOutParameter);
            }
            out.copy_from_slice(self.value_mut(slot)?);
        }
        self.list_mut().remove(pos, None)
    }

    pub fn clear(&mut self) -> RtResult<()> {
        self.list_mut().clear()
    }
}
