//! Bare AMQP message decoding for the trace writer.
//!
//! A transfer payload is a sequence of described sections. The trace writer
//! reassembles multi-frame transfers and decodes the concatenated payload
//! here so that `MessageData.Message` in the trace is readable. Decoding is
//! best-effort: a payload this decoder cannot handle (batch envelopes, for
//! instance) is logged and omitted, never fatal.

use bytes::{Buf, Bytes};
use serde::Serialize;

use crate::codec::json::{ser_bytes_vec, ser_opt_bytes};
use crate::codec::value::{self, Value};
use crate::error::CodecError;

const SECTION_HEADER: u64 = 0x70;
const SECTION_DELIVERY_ANNOTATIONS: u64 = 0x71;
const SECTION_MESSAGE_ANNOTATIONS: u64 = 0x72;
const SECTION_PROPERTIES: u64 = 0x73;
const SECTION_APPLICATION_PROPERTIES: u64 = 0x74;
const SECTION_DATA: u64 = 0x75;
const SECTION_SEQUENCE: u64 = 0x76;
const SECTION_VALUE: u64 = 0x77;
const SECTION_FOOTER: u64 = 0x78;

/// String-keyed application properties, order preserved.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplicationProperties(pub Vec<(String, Value)>);

impl ApplicationProperties {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        match self.0.iter_mut().find(|(k, _)| k == key) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((key.to_string(), value)),
        }
    }

    fn from_value(value: Value) -> Result<ApplicationProperties, CodecError> {
        let Value::Map(pairs) = value else {
            return Err(CodecError::MalformedBody {
                body: "message",
                reason: "application-properties is not a map".to_string(),
            });
        };
        let mut props = Vec::with_capacity(pairs.len());
        for (key, val) in pairs {
            match key {
                Value::String(k) | Value::Symbol(k) => props.push((k, val)),
                other => {
                    return Err(CodecError::MalformedBody {
                        body: "message",
                        reason: format!("non-string application property key {other:?}"),
                    })
                }
            }
        }
        Ok(ApplicationProperties(props))
    }
}

impl Serialize for ApplicationProperties {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, val) in &self.0 {
            map.serialize_entry(key, val)?;
        }
        map.end()
    }
}

/// The immutable message properties section.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Properties {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_opt_bytes")]
    pub user_id: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_encoding: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub absolute_expiry_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creation_time: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub group_sequence: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reply_to_group_id: Option<String>,
}

impl Properties {
    fn from_value(value: Value) -> Properties {
        let fields = match value {
            Value::List(items) => items,
            _ => Vec::new(),
        };
        let mut iter = fields.into_iter();
        let mut next = || iter.next().unwrap_or(Value::Null);

        Properties {
            message_id: non_null(next()),
            user_id: as_binary(next()),
            to: as_string(next()),
            subject: as_string(next()),
            reply_to: as_string(next()),
            correlation_id: non_null(next()),
            content_type: as_string(next()),
            content_encoding: as_string(next()),
            absolute_expiry_time: as_timestamp(next()),
            creation_time: as_timestamp(next()),
            group_id: as_string(next()),
            group_sequence: as_uint(next()),
            reply_to_group_id: as_string(next()),
        }
    }
}

fn non_null(v: Value) -> Option<Value> {
    (!v.is_null()).then_some(v)
}

fn as_string(v: Value) -> Option<String> {
    match v {
        Value::String(s) | Value::Symbol(s) => Some(s),
        _ => None,
    }
}

fn as_binary(v: Value) -> Option<Bytes> {
    match v {
        Value::Binary(b) => Some(b),
        _ => None,
    }
}

fn as_timestamp(v: Value) -> Option<i64> {
    match v {
        Value::Timestamp(t) => Some(t),
        _ => None,
    }
}

fn as_uint(v: Value) -> Option<u32> {
    match v {
        Value::Uint(n) => Some(n),
        _ => None,
    }
}

/// A decoded bare message plus its annotation sections.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Message {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub header: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_annotations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_annotations: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Properties>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_properties: Option<ApplicationProperties>,
    #[serde(skip_serializing_if = "Vec::is_empty", serialize_with = "ser_bytes_vec", default)]
    pub data: Vec<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub sequence: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<Value>,
}

impl Message {
    /// Decode a complete (reassembled) transfer payload.
    pub fn decode(payload: &[u8]) -> Result<Message, CodecError> {
        let mut buf = Bytes::copy_from_slice(payload);
        let mut msg = Message::default();

        while buf.has_remaining() {
            let section = value::decode(&mut buf)?;
            let Value::Described(descriptor, inner) = section else {
                return Err(CodecError::MalformedBody {
                    body: "message",
                    reason: "section is not a described value".to_string(),
                });
            };
            let code =
                section_code(&descriptor).ok_or_else(|| CodecError::UnknownDescriptor {
                    descriptor: format!("{descriptor:?}"),
                })?;
            let inner = *inner;

            match code {
                SECTION_HEADER => msg.header = Some(inner),
                SECTION_DELIVERY_ANNOTATIONS => msg.delivery_annotations = Some(inner),
                SECTION_MESSAGE_ANNOTATIONS => msg.message_annotations = Some(inner),
                SECTION_PROPERTIES => msg.properties = Some(Properties::from_value(inner)),
                SECTION_APPLICATION_PROPERTIES => {
                    msg.application_properties =
                        Some(ApplicationProperties::from_value(inner)?)
                }
                SECTION_DATA => match inner {
                    Value::Binary(b) => msg.data.push(b),
                    other => {
                        return Err(CodecError::MalformedBody {
                            body: "message",
                            reason: format!("data section holds {other:?}, not binary"),
                        })
                    }
                },
                SECTION_SEQUENCE => match inner {
                    Value::List(items) => msg.sequence.extend(items),
                    other => {
                        return Err(CodecError::MalformedBody {
                            body: "message",
                            reason: format!("sequence section holds {other:?}, not a list"),
                        })
                    }
                },
                SECTION_VALUE => msg.value = Some(inner),
                SECTION_FOOTER => msg.footer = Some(inner),
                _ => unreachable!("section_code only returns known codes"),
            }
        }

        Ok(msg)
    }
}

fn section_code(descriptor: &Value) -> Option<u64> {
    let code = match descriptor {
        Value::Ulong(code) => *code,
        Value::Symbol(name) | Value::String(name) => match name.as_str() {
            "amqp:header:list" => SECTION_HEADER,
            "amqp:delivery-annotations:map" => SECTION_DELIVERY_ANNOTATIONS,
            "amqp:message-annotations:map" => SECTION_MESSAGE_ANNOTATIONS,
            "amqp:properties:list" => SECTION_PROPERTIES,
            "amqp:application-properties:map" => SECTION_APPLICATION_PROPERTIES,
            "amqp:data:binary" => SECTION_DATA,
            "amqp:amqp-sequence:list" => SECTION_SEQUENCE,
            "amqp:amqp-value:*" => SECTION_VALUE,
            "amqp:footer:map" => SECTION_FOOTER,
            _ => return None,
        },
        _ => return None,
    };
    (SECTION_HEADER..=SECTION_FOOTER).contains(&code).then_some(code)
}

/// Encode helper used by tests and fabricated traffic: wraps sections back
/// into payload bytes.
pub fn encode_sections(sections: &[(u64, Value)]) -> Result<Bytes, CodecError> {
    let mut out = bytes::BytesMut::new();
    for (code, inner) in sections {
        let described = Value::Described(
            Box::new(Value::Ulong(*code)),
            Box::new(inner.clone()),
        );
        value::encode(&described, &mut out)?;
    }
    Ok(out.freeze())
}
