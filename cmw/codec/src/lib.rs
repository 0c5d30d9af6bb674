#![no_std]
#![forbid(unsafe_code)]

//! # CMW Codec
//!
//! Byte-stream (de)serialization of middleware messages.
//!
//! Scalars are copied in host byte order with no alignment padding. Each
//! context tracks a cursor and a sticky error flag, so a message built from
//! many fields is accepted or rejected as a whole:
//!
//! ```ignore
//! let mut buf = [0u8; 16];
//! let mut ser = SerializationContext::start(&mut buf);
//! ser.serialize_4bytes(33u32.to_ne_bytes());
//! ser.serialize_4bytes(instance.to_ne_bytes());
//! ser.check_serialize("lifecycle_command");
//! let bytes = ser.finish()?;
//! ```

pub mod de;
pub mod ser;
pub mod types;

pub use de::DeserializationContext;
pub use ser::SerializationContext;
pub use types::{boolean8_check, Boolean8, Decode, Encode};

use cmw_core::RtResult;

/// Returns host-order bytes in wire order.
///
/// The wire format is host-endian, so this is a copy. It is the only place
/// where a byte-order conversion would go.
#[inline]
pub(crate) const fn copy_or_swap<const N: usize>(bytes: [u8; N]) -> [u8; N] {
    bytes
}

/// Serializes `value` into `buffer` and returns the number of bytes written.
pub fn encode_into<T: Encode + ?Sized>(value: &T, buffer: &mut [u8], name: &str) -> RtResult<usize> {
    let mut ctx = SerializationContext::start(buffer);
    value.encode(&mut ctx);
    ctx.check_serialize(name);
    ctx.finish().map(|bytes| bytes.len())
}

/// Deserializes a `T` that must consume exactly `buffer`.
pub fn decode_from<T: Decode>(buffer: &[u8], name: &str) -> RtResult<T> {
    let mut ctx = DeserializationContext::start(buffer);
    let value = T::decode(&mut ctx);
    ctx.finish(name)?;
    Ok(value)
}
