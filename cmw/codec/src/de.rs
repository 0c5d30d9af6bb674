//! Deserialization context

use cmw_core::{ldp, RtError, RtResult};

use crate::copy_or_swap;

/// Cursor over a received message.
///
/// The declared size of the message (`raw_size`) is checked by
/// [`check_deserialize`]: reading past it is an error, leaving bytes behind
/// is logged as a warning when underflow checking is enabled. A declared
/// size of zero disables both checks.
///
/// [`check_deserialize`]: DeserializationContext::check_deserialize
pub struct DeserializationContext<'a> {
    buffer: &'a [u8],
    pos: usize,
    raw_size: usize,
    error: bool,
    check_underflow: bool,
}

impl<'a> DeserializationContext<'a> {
    /// Starts deserializing `buffer`, declaring its full length.
    pub fn start(buffer: &'a [u8]) -> Self {
        Self::with_declared_size(buffer, buffer.len())
    }

    /// Starts deserializing `buffer` against an explicit declared size.
    pub fn with_declared_size(buffer: &'a [u8], raw_size: usize) -> Self {
        Self {
            buffer,
            pos: 0,
            raw_size,
            error: false,
            check_underflow: true,
        }
    }

    pub fn set_check_underflow(&mut self, enabled: bool) {
        self.check_underflow = enabled;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn raw_size(&self) -> usize {
        self.raw_size
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    /// Marks the message as invalid because of field `name`.
    pub fn raise_error(&mut self, name: &str, reason: &str) {
        self.error = true;
        log::error!("{reason} in deserialization of {name}");
    }

    /// Bytes not consumed yet
    pub fn remaining(&self) -> &'a [u8] {
        self.buffer.get(self.pos..).unwrap_or(&[])
    }

    fn read<const N: usize>(&mut self) -> [u8; N] {
        let mut out = [0u8; N];
        let src = self
            .pos
            .checked_add(N)
            .and_then(|end| self.buffer.get(self.pos..end));
        match src {
            Some(src) => out.copy_from_slice(src),
            None => {
                if !self.error {
                    log::trace!(
                        "read of {N} bytes at {} past the end of a {} byte buffer",
                        self.pos,
                        self.buffer.len()
                    );
                }
                self.error = true;
            }
        }
        self.pos = self.pos.saturating_add(N);
        copy_or_swap(out)
    }

    pub fn deserialize_1byte(&mut self) -> u8 {
        let [b] = self.read::<1>();
        b
    }

    pub fn deserialize_2bytes(&mut self) -> [u8; 2] {
        self.read()
    }

    pub fn deserialize_4bytes(&mut self) -> [u8; 4] {
        self.read()
    }

    pub fn deserialize_8bytes(&mut self) -> [u8; 8] {
        self.read()
    }

    /// Takes `len` opaque bytes; fewer are returned if the buffer ends first.
    pub fn deserialize_bytes(&mut self, len: usize) -> &'a [u8] {
        let start = self.pos.min(self.buffer.len());
        let end = self.pos.saturating_add(len).min(self.buffer.len());
        if end - start < len {
            self.error = true;
        }
        self.pos = self.pos.saturating_add(len);
        &self.buffer[start..end]
    }

    /// Takes every byte left in the buffer.
    pub fn deserialize_rest(&mut self) -> &'a [u8] {
        let rest = self.remaining();
        self.pos = self.pos.max(self.buffer.len());
        rest
    }

    /// Compares the cursor with the declared size.
    pub fn check_deserialize(&mut self, name: &str) {
        if self.raw_size == 0 {
            return;
        }
        if self.pos > self.raw_size {
            self.error = true;
            log::error!(
                "too many bytes in deserialization of {name} (expected {}, got {}, code {:#x})",
                self.raw_size,
                self.pos,
                ldp::DESERIAL_OVERFLOW
            );
        } else if self.pos < self.raw_size && self.check_underflow {
            log::warn!(
                "too few bytes in deserialization of {name} (expected {}, got {}, code {:#x})",
                self.raw_size,
                self.pos,
                ldp::DESERIAL_UNDERFLOW
            );
        }
    }

    /// Runs the size check and reports whether the message is usable.
    pub fn finish(&mut self, name: &str) -> RtResult<()> {
        self.check_deserialize(name);
        if self.error {
            Err(RtError::InvalidData)
        } else {
            Ok(())
        }
    }
}
