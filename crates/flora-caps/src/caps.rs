use std::collections::VecDeque;

use bytes::Bytes;

use crate::error::{CapsError, Result};
use crate::value::{Value, ValueType};
use crate::wire::MAX_DEPTH;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    /// Nothing written or attached yet.
    Fresh,
    Writing,
    Reading,
}

/// An ordered, append-only tape of typed entries.
///
/// A `Caps` is either being written or being read, never both: values built
/// with `write_*` are write-only until they are serialized and parsed again
/// (or handed over with [`Caps::into_readable`]); values produced by
/// [`Caps::parse`] or [`Caps::read_caps`] are read-only. Reads consume
/// entries strictly in write order.
///
/// `Caps` is move-only. Attaching it to an outbound message serializes it by
/// reference; receiving one transfers ownership to the receiver and it is
/// released on drop.
#[derive(Debug)]
pub struct Caps {
    entries: VecDeque<Value>,
    consumed: usize,
    state: State,
}

impl Default for Caps {
    fn default() -> Self {
        Self::new()
    }
}

impl Caps {
    /// Create an empty container, ready for writing.
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
            consumed: 0,
            state: State::Fresh,
        }
    }

    pub(crate) fn attached(entries: VecDeque<Value>) -> Self {
        Self {
            entries,
            consumed: 0,
            state: State::Reading,
        }
    }

    /// Number of entries written or parsed, including those already read.
    pub fn len(&self) -> usize {
        self.consumed + self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries not yet read.
    pub fn remaining(&self) -> usize {
        self.entries.len()
    }

    /// True once the container is positioned for reading.
    pub fn is_readable(&self) -> bool {
        self.state == State::Reading
    }

    /// Finish writing and hand the container over for reading from its
    /// first entry.
    pub fn into_readable(mut self) -> Caps {
        self.state = State::Reading;
        self
    }

    /// Nesting depth of the unread entries: 1 for a flat container, plus
    /// one for each level of nested Caps.
    pub fn depth(&self) -> usize {
        1 + self
            .entries()
            .map(|value| match value {
                Value::Caps(nested) => nested.depth(),
                Value::Serialized { depth, .. } => *depth,
                _ => 0,
            })
            .max()
            .unwrap_or(0)
    }

    pub(crate) fn entries(&self) -> impl Iterator<Item = &Value> {
        self.entries.iter()
    }

    pub fn write_i32(&mut self, v: i32) -> Result<()> {
        self.push(Value::I32(v))
    }

    pub fn write_f32(&mut self, v: f32) -> Result<()> {
        self.push(Value::F32(v))
    }

    pub fn write_i64(&mut self, v: i64) -> Result<()> {
        self.push(Value::I64(v))
    }

    pub fn write_f64(&mut self, v: f64) -> Result<()> {
        self.push(Value::F64(v))
    }

    pub fn write_str(&mut self, v: &str) -> Result<()> {
        self.push(Value::String(v.to_owned()))
    }

    /// Append a copy of `v` as a binary entry.
    pub fn write_binary(&mut self, v: &[u8]) -> Result<()> {
        self.push(Value::Binary(Bytes::copy_from_slice(v)))
    }

    /// Append `buf[offset..offset + len]` as a binary entry.
    ///
    /// Fails with `InvalidParam` if the window falls outside `buf`.
    pub fn write_binary_range(&mut self, buf: &[u8], offset: usize, len: usize) -> Result<()> {
        let end = offset
            .checked_add(len)
            .filter(|end| *end <= buf.len())
            .ok_or(CapsError::InvalidParam("binary window outside buffer"))?;
        self.write_binary(&buf[offset..end])
    }

    /// Append an already shared buffer without copying.
    pub fn write_bytes(&mut self, v: Bytes) -> Result<()> {
        self.push(Value::Binary(v))
    }

    /// Move `nested` into this container as a single entry.
    ///
    /// Fails with `InvalidParam` if the result would nest deeper than
    /// [`MAX_DEPTH`].
    pub fn write_caps(&mut self, nested: Caps) -> Result<()> {
        self.check_writable()?;
        check_nesting(nested.depth())?;
        self.push(Value::Caps(nested))
    }

    /// Append a snapshot of `nested` (its unread entries), leaving `nested`
    /// with the caller. Same depth limit as [`Caps::write_caps`].
    pub fn write_caps_ref(&mut self, nested: &Caps) -> Result<()> {
        self.check_writable()?;
        let depth = nested.depth();
        check_nesting(depth)?;
        let bytes = nested.serialize()?;
        self.push(Value::Serialized { bytes, depth })
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        self.take(ValueType::I32, |v| match v {
            Value::I32(v) => Some(v),
            _ => None,
        })
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        self.take(ValueType::F32, |v| match v {
            Value::F32(v) => Some(v),
            _ => None,
        })
    }

    pub fn read_i64(&mut self) -> Result<i64> {
        self.take(ValueType::I64, |v| match v {
            Value::I64(v) => Some(v),
            _ => None,
        })
    }

    pub fn read_f64(&mut self) -> Result<f64> {
        self.take(ValueType::F64, |v| match v {
            Value::F64(v) => Some(v),
            _ => None,
        })
    }

    pub fn read_string(&mut self) -> Result<String> {
        self.take(ValueType::String, |v| match v {
            Value::String(v) => Some(v),
            _ => None,
        })
    }

    pub fn read_binary(&mut self) -> Result<Bytes> {
        self.take(ValueType::Binary, |v| match v {
            Value::Binary(v) => Some(v),
            _ => None,
        })
    }

    /// Take the next entry as an independent container, positioned at its
    /// own first entry.
    pub fn read_caps(&mut self) -> Result<Caps> {
        self.take(ValueType::Caps, |v| match v {
            Value::Caps(v) => Some(Ok(v.into_readable())),
            Value::Serialized { bytes, .. } => Some(Caps::parse_bytes(bytes)),
            _ => None,
        })?
    }

    /// Type of the next entry, without consuming it.
    pub fn peek_type(&self) -> Result<ValueType> {
        self.check_readable()?;
        self.entries
            .front()
            .map(Value::value_type)
            .ok_or(CapsError::EndOfObject)
    }

    fn check_writable(&self) -> Result<()> {
        match self.state {
            State::Reading => Err(CapsError::ReadOnly),
            State::Fresh | State::Writing => Ok(()),
        }
    }

    fn push(&mut self, value: Value) -> Result<()> {
        self.check_writable()?;
        self.state = State::Writing;
        self.entries.push_back(value);
        Ok(())
    }

    fn check_readable(&self) -> Result<()> {
        match self.state {
            State::Fresh => Err(CapsError::InvalidParam("caps was never written or attached")),
            State::Writing => Err(CapsError::WriteOnly),
            State::Reading => Ok(()),
        }
    }

    fn take<T>(&mut self, expected: ValueType, extract: fn(Value) -> Option<T>) -> Result<T> {
        let found = self.peek_type()?;
        if found != expected {
            return Err(CapsError::IncorrectType { expected, found });
        }
        let value = self.entries.pop_front().ok_or(CapsError::EndOfObject)?;
        self.consumed += 1;
        extract(value).ok_or(CapsError::IncorrectType { expected, found })
    }
}

/// A child of depth `child` makes its parent `child + 1` deep.
fn check_nesting(child: usize) -> Result<()> {
    if child >= MAX_DEPTH {
        return Err(CapsError::InvalidParam("caps nests deeper than MAX_DEPTH"));
    }
    Ok(())
}
