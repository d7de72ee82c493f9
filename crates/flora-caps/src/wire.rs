//! Binary encoding of a [`Caps`] container.
//!
//! ```text
//! ┌──────────┬─────────┬──────────┬──────────────┬──────────────────────────┐
//! │ Magic    │ Version │ Reserved │ Body length  │ Body                     │
//! │ "CA" (2) │ (1)     │ (1)      │ (4B LE)      │ count (4B LE) + entries  │
//! └──────────┴─────────┴──────────┴──────────────┴──────────────────────────┘
//! ```
//!
//! Each entry is a one-byte type tag followed by its value. Fixed-width
//! values are little-endian; strings and binaries carry a `u32` LE length
//! prefix. A nested Caps is written as a complete serialized Caps, header
//! included.

use std::collections::VecDeque;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::caps::Caps;
use crate::error::{CapsError, Result};
use crate::value::{Value, ValueType};

/// Header: magic (2) + version (1) + reserved (1) + body length (4).
pub const HEADER_SIZE: usize = 8;

/// Magic bytes: "CA".
pub const MAGIC: [u8; 2] = [b'C', b'A'];

/// Format version written by this crate.
pub const VERSION: u8 = 1;

/// Deepest nesting a Caps may have. A flat container has depth 1.
///
/// Enforced by [`Caps::write_caps`], [`Caps::write_caps_ref`],
/// [`Caps::serialize`] and [`Caps::parse`] alike, so anything that
/// serializes also parses.
pub const MAX_DEPTH: usize = 32;

impl Caps {
    /// Number of bytes [`Caps::serialize`] will produce.
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + body_len(self)
    }

    /// Serialize the unread entries into a new buffer.
    ///
    /// Works in any mode; a fresh container serializes as an empty Caps.
    pub fn serialize(&self) -> Result<Bytes> {
        let mut dst = BytesMut::with_capacity(self.encoded_len());
        self.serialize_into(&mut dst)?;
        Ok(dst.freeze())
    }

    /// Append the serialized form to `dst`.
    ///
    /// Fails with `InvalidParam` if the container nests deeper than
    /// [`MAX_DEPTH`].
    pub fn serialize_into(&self, dst: &mut BytesMut) -> Result<()> {
        if self.depth() > MAX_DEPTH {
            return Err(CapsError::InvalidParam("caps nests deeper than MAX_DEPTH"));
        }
        self.write_into(dst)
    }

    fn write_into(&self, dst: &mut BytesMut) -> Result<()> {
        let body = body_len(self);
        let body_u32 =
            u32::try_from(body).map_err(|_| CapsError::InvalidParam("caps exceeds 4 GiB"))?;
        dst.reserve(HEADER_SIZE + body);
        dst.put_slice(&MAGIC);
        dst.put_u8(VERSION);
        dst.put_u8(0);
        dst.put_u32_le(body_u32);
        dst.put_u32_le(self.remaining() as u32);
        for value in self.entries() {
            dst.put_u8(value.value_type().tag());
            match value {
                Value::I32(v) => dst.put_i32_le(*v),
                Value::F32(v) => dst.put_f32_le(*v),
                Value::I64(v) => dst.put_i64_le(*v),
                Value::F64(v) => dst.put_f64_le(*v),
                Value::String(v) => {
                    dst.put_u32_le(v.len() as u32);
                    dst.put_slice(v.as_bytes());
                }
                Value::Binary(v) => {
                    dst.put_u32_le(v.len() as u32);
                    dst.put_slice(v);
                }
                Value::Caps(v) => v.write_into(dst)?,
                Value::Serialized { bytes, .. } => dst.put_slice(bytes),
            }
        }
        Ok(())
    }

    /// Parse a serialized Caps. The result is read-only and positioned at
    /// its first entry.
    pub fn parse(data: &[u8]) -> Result<Caps> {
        Self::parse_bytes(Bytes::copy_from_slice(data))
    }

    /// Parse from a shared buffer; binary entries borrow from `data`.
    pub fn parse_bytes(mut data: Bytes) -> Result<Caps> {
        let caps = parse_one(&mut data, 1)?;
        if data.has_remaining() {
            return Err(malformed(format!(
                "{} trailing bytes after caps",
                data.remaining()
            )));
        }
        Ok(caps)
    }
}

fn body_len(caps: &Caps) -> usize {
    4 + caps
        .entries()
        .map(|value| {
            1 + match value {
                Value::I32(_) | Value::F32(_) => 4,
                Value::I64(_) | Value::F64(_) => 8,
                Value::String(v) => 4 + v.len(),
                Value::Binary(v) => 4 + v.len(),
                Value::Caps(v) => v.encoded_len(),
                Value::Serialized { bytes, .. } => bytes.len(),
            }
        })
        .sum::<usize>()
}

fn malformed(reason: impl Into<String>) -> CapsError {
    CapsError::Malformed(reason.into())
}

fn need(buf: &Bytes, n: usize, what: &str) -> Result<()> {
    if buf.remaining() < n {
        return Err(malformed(format!(
            "truncated {what}: need {n} bytes, have {}",
            buf.remaining()
        )));
    }
    Ok(())
}

fn parse_one(buf: &mut Bytes, depth: usize) -> Result<Caps> {
    if depth > MAX_DEPTH {
        return Err(malformed(format!("nesting deeper than {MAX_DEPTH}")));
    }

    need(buf, HEADER_SIZE, "header")?;
    if buf[0..2] != MAGIC {
        return Err(malformed("bad magic"));
    }
    if buf[2] != VERSION {
        return Err(malformed(format!("unsupported version {}", buf[2])));
    }
    buf.advance(4);
    let body_len = buf.get_u32_le() as usize;
    need(buf, body_len, "body")?;
    let mut body = buf.split_to(body_len);

    need(&body, 4, "entry count")?;
    let count = body.get_u32_le() as usize;
    // Every entry takes at least five bytes; don't trust `count` for allocation.
    let mut entries = VecDeque::with_capacity(count.min(body.remaining() / 5));
    for _ in 0..count {
        need(&body, 1, "entry tag")?;
        let tag = body.get_u8();
        let ty = ValueType::from_tag(tag)
            .ok_or_else(|| malformed(format!("unknown type tag 0x{tag:02x}")))?;
        let value = match ty {
            ValueType::I32 => {
                need(&body, 4, "i32")?;
                Value::I32(body.get_i32_le())
            }
            ValueType::F32 => {
                need(&body, 4, "f32")?;
                Value::F32(body.get_f32_le())
            }
            ValueType::I64 => {
                need(&body, 8, "i64")?;
                Value::I64(body.get_i64_le())
            }
            ValueType::F64 => {
                need(&body, 8, "f64")?;
                Value::F64(body.get_f64_le())
            }
            ValueType::String => {
                let raw = take_prefixed(&mut body, "string")?;
                let s = String::from_utf8(raw.to_vec())
                    .map_err(|_| malformed("string is not valid UTF-8"))?;
                Value::String(s)
            }
            ValueType::Binary => Value::Binary(take_prefixed(&mut body, "binary")?),
            ValueType::Caps => Value::Caps(parse_one(&mut body, depth + 1)?),
        };
        entries.push_back(value);
    }
    if body.has_remaining() {
        return Err(malformed("body length does not match entries"));
    }

    Ok(Caps::attached(entries))
}

fn take_prefixed(body: &mut Bytes, what: &str) -> Result<Bytes> {
    need(body, 4, what)?;
    let len = body.get_u32_le() as usize;
    need(body, len, what)?;
    Ok(body.split_to(len))
}
