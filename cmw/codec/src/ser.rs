//! Serialization context

use cmw_core::{ldp, RtError, RtResult};

use crate::copy_or_swap;

/// Cursor over an output buffer with sticky error tracking.
///
/// Primitive writes never fail loudly: a write that does not fit raises
/// `local_error` and leaves the cursor in place. [`check_serialize`]
/// latches the local flag into the sticky `error` flag.
///
/// [`check_serialize`]: SerializationContext::check_serialize
pub struct SerializationContext<'a> {
    buffer: &'a mut [u8],
    pos: usize,
    error: bool,
    local_error: bool,
}

impl<'a> SerializationContext<'a> {
    /// Starts serializing at the beginning of `buffer`.
    pub fn start(buffer: &'a mut [u8]) -> Self {
        Self {
            buffer,
            pos: 0,
            error: false,
            local_error: false,
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    pub fn has_error(&self) -> bool {
        self.error
    }

    pub fn has_local_error(&self) -> bool {
        self.local_error
    }

    /// Flags the field being written as invalid.
    pub fn raise_local_error(&mut self) {
        self.local_error = true;
    }

    /// Bytes written so far
    pub fn written(&self) -> &[u8] {
        &self.buffer[..self.pos]
    }

    fn write(&mut self, bytes: &[u8]) {
        let end = self.pos + bytes.len();
        match self.buffer.get_mut(self.pos..end) {
            Some(dst) => {
                dst.copy_from_slice(bytes);
                self.pos = end;
            }
            None => {
                log::trace!(
                    "serialization overflow ({:#x}): {} bytes at {} in a {} byte buffer",
                    ldp::SERIAL_OVERFLOW,
                    bytes.len(),
                    self.pos,
                    self.buffer.len()
                );
                self.local_error = true;
            }
        }
    }

    pub fn serialize_1byte(&mut self, value: u8) {
        self.write(&[value]);
    }

    pub fn serialize_2bytes(&mut self, value: [u8; 2]) {
        self.write(&copy_or_swap(value));
    }

    pub fn serialize_4bytes(&mut self, value: [u8; 4]) {
        self.write(&copy_or_swap(value));
    }

    pub fn serialize_8bytes(&mut self, value: [u8; 8]) {
        self.write(&copy_or_swap(value));
    }

    /// Copies an opaque byte payload.
    pub fn serialize_bytes(&mut self, value: &[u8]) {
        self.write(value);
    }

    /// Latches a pending field error into the sticky flag and logs it
    /// against `name`.
    pub fn check_serialize(&mut self, name: &str) {
        if self.local_error {
            self.error = true;
            self.local_error = false;
            log::error!("error in serialization of {name}");
        }
    }

    /// Ends serialization, yielding the written bytes unless any error was
    /// recorded.
    pub fn finish(mut self) -> RtResult<&'a [u8]> {
        self.check_serialize("message");
        if self.error {
            return Err(RtError::InvalidData);
        }
        let Self { buffer, pos, .. } = self;
        Ok(&buffer[..pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn overflow_raises_local_error_without_moving() {
        let mut buf = [0u8; 6];
        let mut ctx = SerializationContext::start(&mut buf);
        ctx.serialize_4bytes(1u32.to_ne_bytes());
        ctx.serialize_4bytes(2u32.to_ne_bytes());
        assert!(ctx.has_local_error());
        assert_eq!(ctx.position(), 4);
        ctx.serialize_2bytes(3u16.to_ne_bytes());
        assert_eq!(ctx.position(), 6);
    }

    #[test]
    fn check_latches_and_clears_local_error() {
        let mut buf = [0u8; 2];
        let mut ctx = SerializationContext::start(&mut buf);
        ctx.raise_local_error();
        ctx.check_serialize("field");
        assert!(ctx.has_error());
        assert!(!ctx.has_local_error());

        // sticky
        ctx.serialize_1byte(1);
        ctx.check_serialize("other");
        assert!(ctx.has_error());
    }

    #[test]
    fn finish_rejects_unchecked_local_error() {
        let mut buf = [0u8; 1];
        let mut ctx = SerializationContext::start(&mut buf);
        ctx.serialize_2bytes([1, 2]);
        assert_eq!(ctx.finish(), Err(RtError::InvalidData));
    }
}
