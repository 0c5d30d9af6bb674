//! `Encode`/`Decode` for the middleware's data types

use heapless::{String, Vec};

use crate::{DeserializationContext, SerializationContext};

/// A value that can be written to a serialization context
pub trait Encode {
    fn encode(&self, ctx: &mut SerializationContext<'_>);
}

/// A value that can be read from a deserialization context.
///
/// Decoding always yields a value; malformed input is reported through the
/// context's error flag.
pub trait Decode: Sized {
    fn decode(ctx: &mut DeserializationContext<'_>) -> Self;
}

macro_rules! impl_scalar {
    ($($ty:ty => $ser:ident / $de:ident),* $(,)?) => {
        $(
            impl Encode for $ty {
                fn encode(&self, ctx: &mut SerializationContext<'_>) {
                    ctx.$ser(self.to_ne_bytes());
                }
            }

            impl Decode for $ty {
                fn decode(ctx: &mut DeserializationContext<'_>) -> Self {
                    <$ty>::from_ne_bytes(ctx.$de())
                }
            }
        )*
    };
}

impl_scalar! {
    u16 => serialize_2bytes / deserialize_2bytes,
    i16 => serialize_2bytes / deserialize_2bytes,
    u32 => serialize_4bytes / deserialize_4bytes,
    i32 => serialize_4bytes / deserialize_4bytes,
    f32 => serialize_4bytes / deserialize_4bytes,
    u64 => serialize_8bytes / deserialize_8bytes,
    i64 => serialize_8bytes / deserialize_8bytes,
    f64 => serialize_8bytes / deserialize_8bytes,
}

impl Encode for u8 {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        ctx.serialize_1byte(*self);
    }
}

impl Decode for u8 {
    fn decode(ctx: &mut DeserializationContext<'_>) -> Self {
        ctx.deserialize_1byte()
    }
}

impl Encode for i8 {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        ctx.serialize_1byte(self.to_ne_bytes()[0]);
    }
}

impl Decode for i8 {
    fn decode(ctx: &mut DeserializationContext<'_>) -> Self {
        i8::from_ne_bytes([ctx.deserialize_1byte()])
    }
}

/// True when `value` is a legal boolean8 (0 or 1).
pub const fn boolean8_check(value: u8) -> bool {
    value <= 1
}

/// Boolean as exchanged with generated glue: one byte, 0 or 1.
///
/// Unlike `bool`, it can carry an out-of-domain value, which is rejected
/// when encoding and decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Boolean8(pub u8);

impl Boolean8 {
    pub const TRUE: Self = Self(1);
    pub const FALSE: Self = Self(0);

    pub const fn is_valid(self) -> bool {
        boolean8_check(self.0)
    }
}

impl From<bool> for Boolean8 {
    fn from(value: bool) -> Self {
        Self(value as u8)
    }
}

impl Encode for Boolean8 {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        if !self.is_valid() {
            log::error!("value is not allowed in type boolean8");
            ctx.raise_local_error();
        }
        ctx.serialize_1byte(self.0);
    }
}

impl Decode for Boolean8 {
    fn decode(ctx: &mut DeserializationContext<'_>) -> Self {
        let value = Boolean8(ctx.deserialize_1byte());
        if !value.is_valid() {
            ctx.raise_error("boolean8", "value is not allowed");
        }
        value
    }
}

impl Encode for bool {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        Boolean8::from(*self).encode(ctx);
    }
}

impl Decode for bool {
    fn decode(ctx: &mut DeserializationContext<'_>) -> Self {
        Boolean8::decode(ctx).0 != 0
    }
}

impl<T: Encode, const N: usize> Encode for [T; N] {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        for item in self {
            item.encode(ctx);
        }
    }
}

impl<T: Decode, const N: usize> Decode for [T; N] {
    fn decode(ctx: &mut DeserializationContext<'_>) -> Self {
        core::array::from_fn(|_| T::decode(ctx))
    }
}

fn encode_len(len: usize, ctx: &mut SerializationContext<'_>) {
    match u32::try_from(len) {
        Ok(len) => len.encode(ctx),
        Err(_) => ctx.raise_local_error(),
    }
}

/// Bounded sequence: `u32` element count followed by the elements
impl<T: Encode, const N: usize> Encode for Vec<T, N> {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        encode_len(self.len(), ctx);
        for item in self {
            item.encode(ctx);
        }
    }
}

impl<T: Decode, const N: usize> Decode for Vec<T, N> {
    fn decode(ctx: &mut DeserializationContext<'_>) -> Self {
        let mut out = Vec::new();
        let len = u32::decode(ctx) as usize;
        if len > N {
            ctx.raise_error("sequence", "length above capacity");
            return out;
        }
        for _ in 0..len {
            // cannot fail, len <= N
            let _ = out.push(T::decode(ctx));
        }
        out
    }
}

/// Bounded string: `u32` byte length followed by UTF-8 bytes
impl<const N: usize> Encode for String<N> {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        encode_len(self.len(), ctx);
        ctx.serialize_bytes(self.as_bytes());
    }
}

impl<const N: usize> Decode for String<N> {
    fn decode(ctx: &mut DeserializationContext<'_>) -> Self {
        let mut out = String::new();
        let len = u32::decode(ctx) as usize;
        if len > N {
            ctx.raise_error("string", "length above capacity");
            return out;
        }
        let bytes = ctx.deserialize_bytes(len);
        match core::str::from_utf8(bytes) {
            Ok(text) => {
                let _ = out.push_str(text);
            }
            Err(_) => ctx.raise_error("string", "invalid UTF-8"),
        }
        out
    }
}

impl Encode for [u8] {
    fn encode(&self, ctx: &mut SerializationContext<'_>) {
        ctx.serialize_bytes(self);
    }
}
