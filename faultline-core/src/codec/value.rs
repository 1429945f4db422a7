//! AMQP 1.0 primitive type codec.
//!
//! Decodes any AMQP 1.0 primitive encoding into a [`Value`] and encodes a
//! [`Value`] back to canonical wire bytes. Compact encodings (smalluint,
//! uint0, smallulong, ...) are normalized on decode; a `Value::Uint` does
//! not remember which of the three uint constructors produced it.
//!
//! One observable rule lives here: a present-but-empty binary always encodes
//! as `vbin8` with a zero length byte, never as null. Downstream parsers
//! distinguish the two.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;

use crate::error::CodecError;

/// A decoded AMQP 1.0 primitive value.
///
/// `Map` preserves entry order and permits non-string keys, both of which
/// occur on the wire. `Described` pairs a descriptor with its value and is
/// how every performative body arrives.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Ubyte(u8),
    Ushort(u16),
    Uint(u32),
    Ulong(u64),
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Char(char),
    /// Milliseconds since the Unix epoch.
    Timestamp(i64),
    Uuid([u8; 16]),
    Binary(Bytes),
    String(String),
    Symbol(String),
    List(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Array(Vec<Value>),
    Described(Box<Value>, Box<Value>),
}

impl Value {
    /// True for `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

fn need(buf: &Bytes, n: usize) -> Result<(), CodecError> {
    if buf.remaining() < n {
        return Err(CodecError::Truncated {
            needed: n - buf.remaining(),
        });
    }
    Ok(())
}

/// Decode one value from the front of `buf`, consuming exactly its bytes.
pub fn decode(buf: &mut Bytes) -> Result<Value, CodecError> {
    need(buf, 1)?;
    let code = buf.get_u8();
    decode_with_code(code, buf)
}

fn decode_with_code(code: u8, buf: &mut Bytes) -> Result<Value, CodecError> {
    match code {
        0x00 => {
            let descriptor = decode(buf)?;
            let value = decode(buf)?;
            Ok(Value::Described(Box::new(descriptor), Box::new(value)))
        }
        0x40 => Ok(Value::Null),
        0x41 => Ok(Value::Bool(true)),
        0x42 => Ok(Value::Bool(false)),
        0x56 => {
            need(buf, 1)?;
            Ok(Value::Bool(buf.get_u8() != 0))
        }
        0x43 => Ok(Value::Uint(0)),
        0x44 => Ok(Value::Ulong(0)),
        0x45 => Ok(Value::List(Vec::new())),
        0x50 => {
            need(buf, 1)?;
            Ok(Value::Ubyte(buf.get_u8()))
        }
        0x51 => {
            need(buf, 1)?;
            Ok(Value::Byte(buf.get_i8()))
        }
        0x52 => {
            need(buf, 1)?;
            Ok(Value::Uint(u32::from(buf.get_u8())))
        }
        0x53 => {
            need(buf, 1)?;
            Ok(Value::Ulong(u64::from(buf.get_u8())))
        }
        0x54 => {
            need(buf, 1)?;
            Ok(Value::Int(i32::from(buf.get_i8())))
        }
        0x55 => {
            need(buf, 1)?;
            Ok(Value::Long(i64::from(buf.get_i8())))
        }
        0x60 => {
            need(buf, 2)?;
            Ok(Value::Ushort(buf.get_u16()))
        }
        0x61 => {
            need(buf, 2)?;
            Ok(Value::Short(buf.get_i16()))
        }
        0x70 => {
            need(buf, 4)?;
            Ok(Value::Uint(buf.get_u32()))
        }
        0x71 => {
            need(buf, 4)?;
            Ok(Value::Int(buf.get_i32()))
        }
        0x72 => {
            need(buf, 4)?;
            Ok(Value::Float(f32::from_bits(buf.get_u32())))
        }
        0x73 => {
            need(buf, 4)?;
            let cp = buf.get_u32();
            char::from_u32(cp)
                .map(Value::Char)
                .ok_or(CodecError::MalformedBody {
                    body: "char",
                    reason: format!("invalid code point {cp:#x}"),
                })
        }
        0x80 => {
            need(buf, 8)?;
            Ok(Value::Ulong(buf.get_u64()))
        }
        0x81 => {
            need(buf, 8)?;
            Ok(Value::Long(buf.get_i64()))
        }
        0x82 => {
            need(buf, 8)?;
            Ok(Value::Double(f64::from_bits(buf.get_u64())))
        }
        0x83 => {
            need(buf, 8)?;
            Ok(Value::Timestamp(buf.get_i64()))
        }
        0x98 => {
            need(buf, 16)?;
            let mut id = [0u8; 16];
            buf.copy_to_slice(&mut id);
            Ok(Value::Uuid(id))
        }
        0xa0 => {
            let len = read_len8(buf)?;
            need(buf, len)?;
            Ok(Value::Binary(buf.split_to(len)))
        }
        0xa1 => {
            let len = read_len8(buf)?;
            Ok(Value::String(read_utf8(buf, len)?))
        }
        0xa3 => {
            let len = read_len8(buf)?;
            Ok(Value::Symbol(read_utf8(buf, len)?))
        }
        0xb0 => {
            let len = read_len32(buf)?;
            need(buf, len)?;
            Ok(Value::Binary(buf.split_to(len)))
        }
        0xb1 => {
            let len = read_len32(buf)?;
            Ok(Value::String(read_utf8(buf, len)?))
        }
        0xb3 => {
            let len = read_len32(buf)?;
            Ok(Value::Symbol(read_utf8(buf, len)?))
        }
        0xc0 => {
            let size = read_len8(buf)?;
            let mut region = take_region(buf, size)?;
            need(&region, 1)?;
            let count = region.get_u8() as usize;
            decode_list(count, &mut region)
        }
        0xd0 => {
            let size = read_len32(buf)?;
            let mut region = take_region(buf, size)?;
            need(&region, 4)?;
            let count = region.get_u32() as usize;
            decode_list(count, &mut region)
        }
        0xc1 => {
            let size = read_len8(buf)?;
            let mut region = take_region(buf, size)?;
            need(&region, 1)?;
            let count = region.get_u8() as usize;
            decode_map(count, &mut region)
        }
        0xd1 => {
            let size = read_len32(buf)?;
            let mut region = take_region(buf, size)?;
            need(&region, 4)?;
            let count = region.get_u32() as usize;
            decode_map(count, &mut region)
        }
        0xe0 => {
            let size = read_len8(buf)?;
            let mut region = take_region(buf, size)?;
            need(&region, 1)?;
            let count = region.get_u8() as usize;
            decode_array(count, &mut region)
        }
        0xf0 => {
            let size = read_len32(buf)?;
            let mut region = take_region(buf, size)?;
            need(&region, 4)?;
            let count = region.get_u32() as usize;
            decode_array(count, &mut region)
        }
        other => Err(CodecError::InvalidFormatCode { code: other }),
    }
}

fn read_len8(buf: &mut Bytes) -> Result<usize, CodecError> {
    need(buf, 1)?;
    Ok(buf.get_u8() as usize)
}

fn read_len32(buf: &mut Bytes) -> Result<usize, CodecError> {
    need(buf, 4)?;
    Ok(buf.get_u32() as usize)
}

fn read_utf8(buf: &mut Bytes, len: usize) -> Result<String, CodecError> {
    need(buf, len)?;
    let raw = buf.split_to(len);
    String::from_utf8(raw.to_vec()).map_err(|_| CodecError::MalformedBody {
        body: "string",
        reason: "invalid utf-8".to_string(),
    })
}

fn take_region(buf: &mut Bytes, size: usize) -> Result<Bytes, CodecError> {
    need(buf, size)?;
    Ok(buf.split_to(size))
}

fn decode_list(count: usize, region: &mut Bytes) -> Result<Value, CodecError> {
    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        items.push(decode(region)?);
    }
    Ok(Value::List(items))
}

fn decode_map(count: usize, region: &mut Bytes) -> Result<Value, CodecError> {
    if count % 2 != 0 {
        return Err(CodecError::MalformedBody {
            body: "map",
            reason: format!("odd element count {count}"),
        });
    }
    let mut pairs = Vec::with_capacity((count / 2).min(64));
    for _ in 0..count / 2 {
        let key = decode(region)?;
        let value = decode(region)?;
        pairs.push((key, value));
    }
    Ok(Value::Map(pairs))
}

fn decode_array(count: usize, region: &mut Bytes) -> Result<Value, CodecError> {
    need(region, 1)?;
    let constructor = region.get_u8();

    // Elements of an array of described types share a single descriptor.
    let descriptor = if constructor == 0x00 {
        Some(decode(region)?)
    } else {
        None
    };
    let element_code = if descriptor.is_some() {
        need(region, 1)?;
        region.get_u8()
    } else {
        constructor
    };

    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let element = decode_with_code(element_code, region)?;
        items.push(match &descriptor {
            Some(d) => Value::Described(Box::new(d.clone()), Box::new(element)),
            None => element,
        });
    }
    Ok(Value::Array(items))
}

// ─────────────────────────────────────────────────────────────────────────────
// Encoding
// ─────────────────────────────────────────────────────────────────────────────

/// Append the canonical encoding of `value` to `out`.
pub fn encode(value: &Value, out: &mut BytesMut) -> Result<(), CodecError> {
    match value {
        Value::Null => out.put_u8(0x40),
        Value::Bool(true) => out.put_u8(0x41),
        Value::Bool(false) => out.put_u8(0x42),
        Value::Ubyte(v) => {
            out.put_u8(0x50);
            out.put_u8(*v);
        }
        Value::Ushort(v) => {
            out.put_u8(0x60);
            out.put_u16(*v);
        }
        Value::Uint(0) => out.put_u8(0x43),
        Value::Uint(v) if *v <= u32::from(u8::MAX) => {
            out.put_u8(0x52);
            out.put_u8(*v as u8);
        }
        Value::Uint(v) => {
            out.put_u8(0x70);
            out.put_u32(*v);
        }
        Value::Ulong(0) => out.put_u8(0x44),
        Value::Ulong(v) if *v <= u64::from(u8::MAX) => {
            out.put_u8(0x53);
            out.put_u8(*v as u8);
        }
        Value::Ulong(v) => {
            out.put_u8(0x80);
            out.put_u64(*v);
        }
        Value::Byte(v) => {
            out.put_u8(0x51);
            out.put_i8(*v);
        }
        Value::Short(v) => {
            out.put_u8(0x61);
            out.put_i16(*v);
        }
        Value::Int(v) if (-128..=127).contains(v) => {
            out.put_u8(0x54);
            out.put_i8(*v as i8);
        }
        Value::Int(v) => {
            out.put_u8(0x71);
            out.put_i32(*v);
        }
        Value::Long(v) if (-128..=127).contains(v) => {
            out.put_u8(0x55);
            out.put_i8(*v as i8);
        }
        Value::Long(v) => {
            out.put_u8(0x81);
            out.put_i64(*v);
        }
        Value::Float(v) => {
            out.put_u8(0x72);
            out.put_u32(v.to_bits());
        }
        Value::Double(v) => {
            out.put_u8(0x82);
            out.put_u64(v.to_bits());
        }
        Value::Char(v) => {
            out.put_u8(0x73);
            out.put_u32(*v as u32);
        }
        Value::Timestamp(v) => {
            out.put_u8(0x83);
            out.put_i64(*v);
        }
        Value::Uuid(v) => {
            out.put_u8(0x98);
            out.put_slice(v);
        }
        // A present empty binary is vbin8 with length 0, never null.
        Value::Binary(v) => encode_variable(0xa0, 0xb0, v, out)?,
        Value::String(v) => encode_variable(0xa1, 0xb1, v.as_bytes(), out)?,
        Value::Symbol(v) => encode_variable(0xa3, 0xb3, v.as_bytes(), out)?,
        Value::List(items) => {
            if items.is_empty() {
                out.put_u8(0x45);
            } else {
                let mut tmp = BytesMut::new();
                for item in items {
                    encode(item, &mut tmp)?;
                }
                encode_compound(0xc0, 0xd0, items.len(), &tmp, out)?;
            }
        }
        Value::Map(pairs) => {
            let mut tmp = BytesMut::new();
            for (key, val) in pairs {
                encode(key, &mut tmp)?;
                encode(val, &mut tmp)?;
            }
            encode_compound(0xc1, 0xd1, pairs.len() * 2, &tmp, out)?;
        }
        Value::Array(items) => encode_array(items, out)?,
        Value::Described(descriptor, inner) => {
            out.put_u8(0x00);
            encode(descriptor, out)?;
            encode(inner, out)?;
        }
    }
    Ok(())
}

fn encode_variable(
    code8: u8,
    code32: u8,
    data: &[u8],
    out: &mut BytesMut,
) -> Result<(), CodecError> {
    if data.len() <= usize::from(u8::MAX) {
        out.put_u8(code8);
        out.put_u8(data.len() as u8);
    } else if data.len() <= u32::MAX as usize {
        out.put_u8(code32);
        out.put_u32(data.len() as u32);
    } else {
        return Err(CodecError::FrameTooLarge);
    }
    out.put_slice(data);
    Ok(())
}

fn encode_compound(
    code8: u8,
    code32: u8,
    count: usize,
    body: &BytesMut,
    out: &mut BytesMut,
) -> Result<(), CodecError> {
    if body.len() + 1 <= usize::from(u8::MAX) && count <= usize::from(u8::MAX) {
        out.put_u8(code8);
        out.put_u8((body.len() + 1) as u8);
        out.put_u8(count as u8);
    } else if body.len() + 4 <= u32::MAX as usize && count <= u32::MAX as usize {
        out.put_u8(code32);
        out.put_u32((body.len() + 4) as u32);
        out.put_u32(count as u32);
    } else {
        return Err(CodecError::FrameTooLarge);
    }
    out.put_slice(body);
    Ok(())
}

/// Arrays encode each element without its own constructor, so all elements
/// must share a variant. An empty array has no element type to name and is
/// emitted as null, which is how optional "multiple" fields spell absence.
fn encode_array(items: &[Value], out: &mut BytesMut) -> Result<(), CodecError> {
    let Some(first) = items.first() else {
        out.put_u8(0x40);
        return Ok(());
    };
    let element_code = wide_code(first)?;

    let mut tmp = BytesMut::new();
    tmp.put_u8(element_code);
    for item in items {
        if std::mem::discriminant(item) != std::mem::discriminant(first) {
            return Err(CodecError::MalformedBody {
                body: "array",
                reason: "mixed element types".to_string(),
            });
        }
        encode_array_element(item, &mut tmp)?;
    }

    if tmp.len() + 1 <= usize::from(u8::MAX) && items.len() <= usize::from(u8::MAX) {
        out.put_u8(0xe0);
        out.put_u8((tmp.len() + 1) as u8);
        out.put_u8(items.len() as u8);
    } else {
        out.put_u8(0xf0);
        out.put_u32((tmp.len() + 4) as u32);
        out.put_u32(items.len() as u32);
    }
    out.put_slice(&tmp);
    Ok(())
}

fn wide_code(value: &Value) -> Result<u8, CodecError> {
    Ok(match value {
        Value::Bool(_) => 0x56,
        Value::Ubyte(_) => 0x50,
        Value::Ushort(_) => 0x60,
        Value::Uint(_) => 0x70,
        Value::Ulong(_) => 0x80,
        Value::Int(_) => 0x71,
        Value::Long(_) => 0x81,
        Value::Timestamp(_) => 0x83,
        Value::Uuid(_) => 0x98,
        Value::Binary(_) => 0xb0,
        Value::String(_) => 0xb1,
        Value::Symbol(_) => 0xb3,
        other => {
            return Err(CodecError::MalformedBody {
                body: "array",
                reason: format!("unsupported element type {other:?}"),
            })
        }
    })
}

fn encode_array_element(value: &Value, out: &mut BytesMut) -> Result<(), CodecError> {
    match value {
        Value::Bool(v) => out.put_u8(u8::from(*v)),
        Value::Ubyte(v) => out.put_u8(*v),
        Value::Ushort(v) => out.put_u16(*v),
        Value::Uint(v) => out.put_u32(*v),
        Value::Ulong(v) => out.put_u64(*v),
        Value::Int(v) => out.put_i32(*v),
        Value::Long(v) => out.put_i64(*v),
        Value::Timestamp(v) => out.put_i64(*v),
        Value::Uuid(v) => out.put_slice(v),
        Value::Binary(v) => {
            out.put_u32(v.len() as u32);
            out.put_slice(v);
        }
        Value::String(v) | Value::Symbol(v) => {
            out.put_u32(v.len() as u32);
            out.put_slice(v.as_bytes());
        }
        other => {
            return Err(CodecError::MalformedBody {
                body: "array",
                reason: format!("unsupported element type {other:?}"),
            })
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// JSON representation (trace file)
// ─────────────────────────────────────────────────────────────────────────────

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_unit(),
            Value::Bool(v) => serializer.serialize_bool(*v),
            Value::Ubyte(v) => serializer.serialize_u8(*v),
            Value::Ushort(v) => serializer.serialize_u16(*v),
            Value::Uint(v) => serializer.serialize_u32(*v),
            Value::Ulong(v) => serializer.serialize_u64(*v),
            Value::Byte(v) => serializer.serialize_i8(*v),
            Value::Short(v) => serializer.serialize_i16(*v),
            Value::Int(v) => serializer.serialize_i32(*v),
            Value::Long(v) => serializer.serialize_i64(*v),
            Value::Float(v) => serializer.serialize_f32(*v),
            Value::Double(v) => serializer.serialize_f64(*v),
            Value::Char(v) => serializer.collect_str(v),
            Value::Timestamp(v) => serializer.serialize_i64(*v),
            Value::Uuid(v) => serializer.collect_str(&format_uuid(v)),
            Value::Binary(v) => {
                use base64::{engine::general_purpose::STANDARD, Engine as _};
                serializer.collect_str(&STANDARD.encode(v))
            }
            Value::String(v) | Value::Symbol(v) => serializer.serialize_str(v),
            Value::List(items) | Value::Array(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(pairs) => {
                let stringy = pairs
                    .iter()
                    .all(|(k, _)| matches!(k, Value::String(_) | Value::Symbol(_)));
                if stringy {
                    let mut map = serializer.serialize_map(Some(pairs.len()))?;
                    for (key, val) in pairs {
                        let name = match key {
                            Value::String(s) | Value::Symbol(s) => s,
                            _ => unreachable!(),
                        };
                        map.serialize_entry(name, val)?;
                    }
                    map.end()
                } else {
                    let mut seq = serializer.serialize_seq(Some(pairs.len()))?;
                    for pair in pairs {
                        seq.serialize_element(&(&pair.0, &pair.1))?;
                    }
                    seq.end()
                }
            }
            Value::Described(descriptor, inner) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("Descriptor", descriptor)?;
                map.serialize_entry("Value", inner)?;
                map.end()
            }
        }
    }
}

fn format_uuid(id: &[u8; 16]) -> String {
    let hex: String = id.iter().map(|b| format!("{b:02x}")).collect();
    format!(
        "{}-{}-{}-{}-{}",
        &hex[0..8],
        &hex[8..12],
        &hex[12..16],
        &hex[16..20],
        &hex[20..32]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(value: Value) {
        let mut out = BytesMut::new();
        encode(&value, &mut out).unwrap();
        let mut buf = out.freeze();
        let decoded = decode(&mut buf).unwrap();
        assert_eq!(decoded, value);
        assert_eq!(buf.remaining(), 0, "trailing bytes after {value:?}");
    }

    #[test]
    fn test_roundtrip_scalars() {
        roundtrip(Value::Null);
        roundtrip(Value::Bool(true));
        roundtrip(Value::Bool(false));
        roundtrip(Value::Ubyte(7));
        roundtrip(Value::Ushort(65000));
        roundtrip(Value::Uint(0));
        roundtrip(Value::Uint(200));
        roundtrip(Value::Uint(1 << 20));
        roundtrip(Value::Ulong(0));
        roundtrip(Value::Ulong(77));
        roundtrip(Value::Ulong(u64::MAX));
        roundtrip(Value::Int(-5));
        roundtrip(Value::Int(100_000));
        roundtrip(Value::Long(-5));
        roundtrip(Value::Long(i64::MIN));
        roundtrip(Value::Float(1.5));
        roundtrip(Value::Double(-2.25));
        roundtrip(Value::Char('☃'));
        roundtrip(Value::Timestamp(1_700_000_000_000));
        roundtrip(Value::Uuid([0xab; 16]));
    }

    #[test]
    fn test_roundtrip_variable() {
        roundtrip(Value::Binary(Bytes::from_static(b"payload")));
        roundtrip(Value::Binary(Bytes::from(vec![0u8; 500])));
        roundtrip(Value::String("hello".to_string()));
        roundtrip(Value::String("x".repeat(300)));
        roundtrip(Value::Symbol("amqp:link:detach-forced".to_string()));
    }

    #[test]
    fn test_roundtrip_compound() {
        roundtrip(Value::List(vec![]));
        roundtrip(Value::List(vec![
            Value::Uint(1),
            Value::String("two".to_string()),
            Value::Null,
        ]));
        roundtrip(Value::Map(vec![
            (Value::Symbol("key".to_string()), Value::Uint(9)),
            (Value::String("other".to_string()), Value::Bool(false)),
        ]));
        roundtrip(Value::Array(vec![
            Value::Symbol("a".to_string()),
            Value::Symbol("bb".to_string()),
        ]));
        roundtrip(Value::Described(
            Box::new(Value::Ulong(0x10)),
            Box::new(Value::List(vec![Value::String("cid".to_string())])),
        ));
    }

    #[test]
    fn test_empty_binary_is_vbin8_zero() {
        let mut out = BytesMut::new();
        encode(&Value::Binary(Bytes::new()), &mut out).unwrap();
        assert_eq!(&out[..], &[0xa0, 0x00]);
    }

    #[test]
    fn test_null_is_single_byte() {
        let mut out = BytesMut::new();
        encode(&Value::Null, &mut out).unwrap();
        assert_eq!(&out[..], &[0x40]);
    }

    #[test]
    fn test_compact_uint_decodes() {
        let mut buf = Bytes::from_static(&[0x43]);
        assert_eq!(decode(&mut buf).unwrap(), Value::Uint(0));

        let mut buf = Bytes::from_static(&[0x52, 0x2a]);
        assert_eq!(decode(&mut buf).unwrap(), Value::Uint(42));
    }

    #[test]
    fn test_list0_decodes() {
        let mut buf = Bytes::from_static(&[0x45]);
        assert_eq!(decode(&mut buf).unwrap(), Value::List(vec![]));
    }

    #[test]
    fn test_truncated_value_errors() {
        let mut buf = Bytes::from_static(&[0x70, 0x00, 0x01]);
        assert!(matches!(
            decode(&mut buf),
            Err(CodecError::Truncated { .. })
        ));
    }

    #[test]
    fn test_invalid_format_code_errors() {
        let mut buf = Bytes::from_static(&[0x3f]);
        assert!(matches!(
            decode(&mut buf),
            Err(CodecError::InvalidFormatCode { code: 0x3f })
        ));
    }

    #[test]
    fn test_symbol_array_wire_shape() {
        // array8: code, size, count, constructor (sym32), then len-prefixed
        // elements.
        let mut out = BytesMut::new();
        encode(
            &Value::Array(vec![Value::Symbol("ab".to_string())]),
            &mut out,
        )
        .unwrap();
        assert_eq!(&out[..], &[0xe0, 0x08, 0x01, 0xb3, 0x00, 0x00, 0x00, 0x02, b'a', b'b']);
    }

    #[test]
    fn test_json_map_with_symbol_keys() {
        let value = Value::Map(vec![(
            Value::Symbol("operation".to_string()),
            Value::String("put-token".to_string()),
        )]);
        let json = serde_json::to_value(&value).unwrap();
        assert_eq!(json["operation"], "put-token");
    }

    #[test]
    fn test_json_binary_is_base64() {
        let json = serde_json::to_value(Value::Binary(Bytes::from_static(b"hi"))).unwrap();
        assert_eq!(json, serde_json::json!("aGk="));
    }
}
