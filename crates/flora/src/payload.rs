//! `--value T:V` arguments and Caps rendering.

use std::fmt::Write as _;
use std::str::FromStr;

use flora_caps::{Caps, CapsError, ValueType};
use serde_json::{json, Value};

/// One typed entry given on the command line.
#[derive(Debug, Clone, PartialEq)]
pub enum PayloadValue {
    I32(i32),
    F32(f32),
    I64(i64),
    F64(f64),
    Str(String),
    Binary(Vec<u8>),
}

impl FromStr for PayloadValue {
    type Err = String;

    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let (kind, value) = input
            .split_once(':')
            .ok_or_else(|| format!("expected TYPE:VALUE, got '{input}'"))?;
        let bad = |err: &dyn std::fmt::Display| format!("invalid {kind} value '{value}': {err}");
        Ok(match kind {
            "i32" => PayloadValue::I32(value.parse().map_err(|e| bad(&e))?),
            "f32" => PayloadValue::F32(value.parse().map_err(|e| bad(&e))?),
            "i64" => PayloadValue::I64(value.parse().map_err(|e| bad(&e))?),
            "f64" => PayloadValue::F64(value.parse().map_err(|e| bad(&e))?),
            "str" => PayloadValue::Str(value.to_string()),
            "hex" => PayloadValue::Binary(decode_hex(value).map_err(|e| bad(&e))?),
            other => {
                return Err(format!(
                    "unknown type '{other}' (expected i32, f32, i64, f64, str or hex)"
                ))
            }
        })
    }
}

pub fn build_caps(values: &[PayloadValue]) -> Result<Caps, CapsError> {
    let mut caps = Caps::new();
    for value in values {
        match value {
            PayloadValue::I32(v) => caps.write_i32(*v)?,
            PayloadValue::F32(v) => caps.write_f32(*v)?,
            PayloadValue::I64(v) => caps.write_i64(*v)?,
            PayloadValue::F64(v) => caps.write_f64(*v)?,
            PayloadValue::Str(v) => caps.write_str(v)?,
            PayloadValue::Binary(v) => caps.write_binary(v)?,
        }
    }
    Ok(caps)
}

/// Drain a readable Caps into `[{"type": .., "value": ..}, ...]`.
pub fn caps_to_json(caps: &mut Caps) -> Result<Value, CapsError> {
    let mut entries = Vec::with_capacity(caps.remaining());
    while caps.remaining() > 0 {
        let kind = caps.peek_type()?;
        let value = match kind {
            ValueType::I32 => json!(caps.read_i32()?),
            ValueType::F32 => json!(caps.read_f32()?),
            ValueType::I64 => json!(caps.read_i64()?),
            ValueType::F64 => json!(caps.read_f64()?),
            ValueType::String => json!(caps.read_string()?),
            ValueType::Binary => json!(encode_hex(&caps.read_binary()?)),
            ValueType::Caps => caps_to_json(&mut caps.read_caps()?)?,
        };
        entries.push(json!({ "type": kind.name(), "value": value }));
    }
    Ok(Value::Array(entries))
}

/// Drain a readable Caps into the `T:V` form the CLI accepts.
pub fn caps_to_text(caps: &mut Caps) -> Result<String, CapsError> {
    let mut parts = Vec::with_capacity(caps.remaining());
    while caps.remaining() > 0 {
        let part = match caps.peek_type()? {
            ValueType::I32 => format!("i32:{}", caps.read_i32()?),
            ValueType::F32 => format!("f32:{}", caps.read_f32()?),
            ValueType::I64 => format!("i64:{}", caps.read_i64()?),
            ValueType::F64 => format!("f64:{}", caps.read_f64()?),
            ValueType::String => format!("str:{}", caps.read_string()?),
            ValueType::Binary => format!("hex:{}", encode_hex(&caps.read_binary()?)),
            ValueType::Caps => format!("caps:[{}]", caps_to_text(&mut caps.read_caps()?)?),
        };
        parts.push(part);
    }
    Ok(parts.join(" "))
}

fn decode_hex(input: &str) -> Result<Vec<u8>, String> {
    if input.len() % 2 != 0 {
        return Err("odd number of hex digits".to_string());
    }
    (0..input.len())
        .step_by(2)
        .map(|i| {
            input
                .get(i..i + 2)
                .and_then(|pair| u8::from_str_radix(pair, 16).ok())
                .ok_or_else(|| format!("bad hex digits at offset {i}"))
        })
        .collect()
}

fn encode_hex(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = write!(out, "{byte:02x}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn readable(values: &[PayloadValue]) -> Caps {
        let caps = build_caps(values).unwrap();
        Caps::parse_bytes(caps.serialize().unwrap()).unwrap()
    }

    #[test]
    fn parses_every_type() {
        assert_eq!("i32:-5".parse(), Ok(PayloadValue::I32(-5)));
        assert_eq!("f32:1.5".parse(), Ok(PayloadValue::F32(1.5)));
        assert_eq!("i64:9".parse(), Ok(PayloadValue::I64(9)));
        assert_eq!("f64:2.5".parse(), Ok(PayloadValue::F64(2.5)));
        assert_eq!(
            "str:a:b".parse(),
            Ok(PayloadValue::Str("a:b".to_string()))
        );
        assert_eq!("hex:00ff".parse(), Ok(PayloadValue::Binary(vec![0, 255])));
        assert_eq!("str:".parse(), Ok(PayloadValue::Str(String::new())));
    }

    #[test]
    fn rejects_malformed_values() {
        for bad in ["5", "u8:1", "i32:x", "hex:abc", "hex:zz"] {
            assert!(bad.parse::<PayloadValue>().is_err(), "{bad}");
        }
    }

    #[test]
    fn json_rendering_keeps_order_and_types() {
        let mut caps = readable(&[
            PayloadValue::Str("vol".into()),
            PayloadValue::I32(30),
            PayloadValue::Binary(vec![0xab]),
        ]);
        let rendered = caps_to_json(&mut caps).unwrap();
        assert_eq!(
            rendered,
            json!([
                {"type": "string", "value": "vol"},
                {"type": "i32", "value": 30},
                {"type": "binary", "value": "ab"},
            ])
        );
        assert_eq!(caps.remaining(), 0);
    }

    #[test]
    fn text_rendering_round_trips_through_the_parser() {
        let values = [PayloadValue::I64(7), PayloadValue::Str("hi".into())];
        let text = caps_to_text(&mut readable(&values)).unwrap();
        assert_eq!(text, "i64:7 str:hi");
        let reparsed: Vec<PayloadValue> = text.split(' ').map(|s| s.parse().unwrap()).collect();
        assert_eq!(reparsed, values);
    }

    #[test]
    fn nested_caps_render_recursively() {
        let mut inner = Caps::new();
        inner.write_i32(1).unwrap();
        let mut outer = Caps::new();
        outer.write_caps(inner).unwrap();
        let mut outer = Caps::parse_bytes(outer.serialize().unwrap()).unwrap();
        assert_eq!(caps_to_text(&mut outer).unwrap(), "caps:[i32:1]");
    }
}
