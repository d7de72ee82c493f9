//! Entry types and their wire tags.

use std::fmt;

use bytes::Bytes;

use crate::caps::Caps;

/// Type of a single Caps entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    I32,
    F32,
    I64,
    F64,
    String,
    Binary,
    Caps,
}

impl ValueType {
    /// One-byte tag written before each entry.
    pub const fn tag(self) -> u8 {
        match self {
            ValueType::I32 => b'i',
            ValueType::F32 => b'f',
            ValueType::I64 => b'l',
            ValueType::F64 => b'd',
            ValueType::String => b'S',
            ValueType::Binary => b'B',
            ValueType::Caps => b'O',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            b'i' => ValueType::I32,
            b'f' => ValueType::F32,
            b'l' => ValueType::I64,
            b'd' => ValueType::F64,
            b'S' => ValueType::String,
            b'B' => ValueType::Binary,
            b'O' => ValueType::Caps,
            _ => return None,
        })
    }

    pub const fn name(self) -> &'static str {
        match self {
            ValueType::I32 => "i32",
            ValueType::F32 => "f32",
            ValueType::I64 => "i64",
            ValueType::F64 => "f64",
            ValueType::String => "string",
            ValueType::Binary => "binary",
            ValueType::Caps => "caps",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A stored entry.
#[derive(Debug)]
pub(crate) enum Value {
    I32(i32),
    F32(f32),
    I64(i64),
    F64(f64),
    String(String),
    Binary(Bytes),
    Caps(Caps),
    /// A nested Caps captured in serialized form, with its nesting depth.
    Serialized { bytes: Bytes, depth: usize },
}

impl Value {
    pub(crate) fn value_type(&self) -> ValueType {
        match self {
            Value::I32(_) => ValueType::I32,
            Value::F32(_) => ValueType::F32,
            Value::I64(_) => ValueType::I64,
            Value::F64(_) => ValueType::F64,
            Value::String(_) => ValueType::String,
            Value::Binary(_) => ValueType::Binary,
            Value::Caps(_) | Value::Serialized { .. } => ValueType::Caps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_are_unique_and_reversible() {
        let all = [
            ValueType::I32,
            ValueType::F32,
            ValueType::I64,
            ValueType::F64,
            ValueType::String,
            ValueType::Binary,
            ValueType::Caps,
        ];
        let mut seen = std::collections::HashSet::new();
        for ty in all {
            assert!(seen.insert(ty.tag()), "duplicate tag for {ty}");
            assert_eq!(ValueType::from_tag(ty.tag()), Some(ty));
        }
        assert_eq!(ValueType::from_tag(0), None);
    }
}
