//! Typed AMQP frame bodies: the ten performatives, the five SASL frames, the
//! zero-body keep-alive, and the uninterpreted `Raw` pseudo-body.
//!
//! Every body is a closed-set variant of [`Body`]; matching is exhaustive so
//! that adding a body type is a compile-time obligation everywhere it is
//! handled. Bodies decode from the positional described lists defined by
//! OASIS AMQP 1.0: missing trailing fields read as null, and encoding trims
//! trailing nulls back off.

use bytes::{BufMut, Bytes, BytesMut};
use serde::Serialize;

use crate::codec::json::{ser_bytes, ser_opt_bytes};
use crate::codec::value::{self, Value};
use crate::error::CodecError;
use crate::Direction;

/// AMQP frame type byte.
pub const FRAME_TYPE_AMQP: u8 = 0;
/// SASL frame type byte.
pub const FRAME_TYPE_SASL: u8 = 1;

/// Wire size of an unextended frame header.
pub const HEADER_SIZE: usize = 8;

// Performative descriptor codes.
const DESC_OPEN: u64 = 0x10;
const DESC_BEGIN: u64 = 0x11;
const DESC_ATTACH: u64 = 0x12;
const DESC_FLOW: u64 = 0x13;
const DESC_TRANSFER: u64 = 0x14;
const DESC_DISPOSITION: u64 = 0x15;
const DESC_DETACH: u64 = 0x16;
const DESC_END: u64 = 0x17;
const DESC_CLOSE: u64 = 0x18;
const DESC_ERROR: u64 = 0x1d;
const DESC_SOURCE: u64 = 0x28;
const DESC_TARGET: u64 = 0x29;
const DESC_SASL_MECHANISMS: u64 = 0x40;
const DESC_SASL_INIT: u64 = 0x41;
const DESC_SASL_CHALLENGE: u64 = 0x42;
const DESC_SASL_RESPONSE: u64 = 0x43;
const DESC_SASL_OUTCOME: u64 = 0x44;

// ─────────────────────────────────────────────────────────────────────────────
// Frame Header
// ─────────────────────────────────────────────────────────────────────────────

/// The 8-byte AMQP frame header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Header {
    /// Total frame size, header included.
    pub size: u32,
    /// Data offset in 4-byte words; 2 for an unextended header.
    pub data_offset: u8,
    /// 0 for AMQP frames, 1 for SASL frames.
    pub frame_type: u8,
    /// Session channel.
    pub channel: u16,
}

impl Header {
    /// Parse and validate a header from exactly [`HEADER_SIZE`] bytes.
    pub fn parse(bytes: &[u8]) -> Result<Header, CodecError> {
        debug_assert_eq!(bytes.len(), HEADER_SIZE);
        let header = Header {
            size: u32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
            data_offset: bytes[4],
            frame_type: bytes[5],
            channel: u16::from_be_bytes([bytes[6], bytes[7]]),
        };
        if (header.size as usize) < HEADER_SIZE {
            return Err(CodecError::InvalidHeader {
                reason: format!("size {} is smaller than the header", header.size),
            });
        }
        if header.data_offset < 2 {
            return Err(CodecError::InvalidHeader {
                reason: format!("data offset {} below minimum of 2", header.data_offset),
            });
        }
        if (header.size as usize) < usize::from(header.data_offset) * 4 {
            return Err(CodecError::InvalidHeader {
                reason: format!(
                    "size {} does not cover data offset {}",
                    header.size, header.data_offset
                ),
            });
        }
        Ok(header)
    }
}

/// Link endpoint role, from the point of view of the endpoint that sent the
/// ATTACH. Encodes as a boolean: false is sender, true is receiver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Sender,
    Receiver,
}

impl Role {
    pub fn invert(self) -> Role {
        match self {
            Role::Sender => Role::Receiver,
            Role::Receiver => Role::Sender,
        }
    }

    pub fn is_receiver(self) -> bool {
        matches!(self, Role::Receiver)
    }

    fn from_bool(receiver: bool) -> Role {
        if receiver {
            Role::Receiver
        } else {
            Role::Sender
        }
    }
}

impl Serialize for Role {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_bool(self.is_receiver())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Composite types
// ─────────────────────────────────────────────────────────────────────────────

/// The AMQP error composite carried by DETACH, END, and CLOSE.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct AmqpError {
    /// Error condition symbol, e.g. `amqp:link:detach-forced`.
    pub condition: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub info: Option<Value>,
}

impl AmqpError {
    pub fn new(condition: impl Into<String>, description: impl Into<String>) -> AmqpError {
        AmqpError {
            condition: condition.into(),
            description: Some(description.into()),
            info: None,
        }
    }

    fn from_fields(fields: Vec<Value>) -> Result<AmqpError, CodecError> {
        let mut f = Fields::new("error", fields);
        Ok(AmqpError {
            condition: f.req_symbol("condition")?,
            description: f.opt_string("description")?,
            info: f.opt_value(),
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_ERROR,
            vec![
                Value::Symbol(self.condition.clone()),
                opt_string(&self.description),
                opt_value(&self.info),
            ],
        )
    }
}

/// ATTACH source terminus.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    pub dynamic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_node_properties: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub distribution_mode: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_outcome: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub outcomes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub capabilities: Vec<String>,
}

impl Source {
    fn from_fields(fields: Vec<Value>) -> Result<Source, CodecError> {
        let mut f = Fields::new("source", fields);
        Ok(Source {
            address: f.opt_string("address")?,
            durable: f.opt_u32("durable")?,
            expiry_policy: f.opt_symbol("expiry-policy")?,
            timeout: f.opt_u32("timeout")?,
            dynamic: f.bool_or("dynamic", false)?,
            dynamic_node_properties: f.opt_value(),
            distribution_mode: f.opt_symbol("distribution-mode")?,
            filter: f.opt_value(),
            default_outcome: f.opt_value(),
            outcomes: f.symbols("outcomes")?,
            capabilities: f.symbols("capabilities")?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_SOURCE,
            vec![
                opt_string(&self.address),
                opt_uint(self.durable),
                opt_symbol(&self.expiry_policy),
                opt_uint(self.timeout),
                Value::Bool(self.dynamic),
                opt_value(&self.dynamic_node_properties),
                opt_symbol(&self.distribution_mode),
                opt_value(&self.filter),
                opt_value(&self.default_outcome),
                symbol_multiple(&self.outcomes),
                symbol_multiple(&self.capabilities),
            ],
        )
    }
}

/// ATTACH target terminus.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Target {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub durable: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_policy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,
    pub dynamic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dynamic_node_properties: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub capabilities: Vec<String>,
}

impl Target {
    fn from_fields(fields: Vec<Value>) -> Result<Target, CodecError> {
        let mut f = Fields::new("target", fields);
        Ok(Target {
            address: f.opt_string("address")?,
            durable: f.opt_u32("durable")?,
            expiry_policy: f.opt_symbol("expiry-policy")?,
            timeout: f.opt_u32("timeout")?,
            dynamic: f.bool_or("dynamic", false)?,
            dynamic_node_properties: f.opt_value(),
            capabilities: f.symbols("capabilities")?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_TARGET,
            vec![
                opt_string(&self.address),
                opt_uint(self.durable),
                opt_symbol(&self.expiry_policy),
                opt_uint(self.timeout),
                Value::Bool(self.dynamic),
                opt_value(&self.dynamic_node_properties),
                symbol_multiple(&self.capabilities),
            ],
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Performatives
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Open {
    /// The logical connection identifier; trace lines carry the local one.
    pub container_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_frame_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel_max: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idle_timeout: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub outgoing_locales: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub incoming_locales: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub offered_capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub desired_capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl Open {
    fn from_fields(fields: Vec<Value>) -> Result<Open, CodecError> {
        let mut f = Fields::new("open", fields);
        Ok(Open {
            container_id: f.req_string("container-id")?,
            hostname: f.opt_string("hostname")?,
            max_frame_size: f.opt_u32("max-frame-size")?,
            channel_max: f.opt_u16("channel-max")?,
            idle_timeout: f.opt_u32("idle-time-out")?,
            outgoing_locales: f.symbols("outgoing-locales")?,
            incoming_locales: f.symbols("incoming-locales")?,
            offered_capabilities: f.symbols("offered-capabilities")?,
            desired_capabilities: f.symbols("desired-capabilities")?,
            properties: f.opt_value(),
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_OPEN,
            vec![
                Value::String(self.container_id.clone()),
                opt_string(&self.hostname),
                opt_uint(self.max_frame_size),
                opt_ushort(self.channel_max),
                opt_uint(self.idle_timeout),
                symbol_multiple(&self.outgoing_locales),
                symbol_multiple(&self.incoming_locales),
                symbol_multiple(&self.offered_capabilities),
                symbol_multiple(&self.desired_capabilities),
                opt_value(&self.properties),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Begin {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_channel: Option<u16>,
    pub next_outgoing_id: u32,
    pub incoming_window: u32,
    pub outgoing_window: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle_max: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub offered_capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub desired_capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl Begin {
    fn from_fields(fields: Vec<Value>) -> Result<Begin, CodecError> {
        let mut f = Fields::new("begin", fields);
        Ok(Begin {
            remote_channel: f.opt_u16("remote-channel")?,
            next_outgoing_id: f.req_u32("next-outgoing-id")?,
            incoming_window: f.req_u32("incoming-window")?,
            outgoing_window: f.req_u32("outgoing-window")?,
            handle_max: f.opt_u32("handle-max")?,
            offered_capabilities: f.symbols("offered-capabilities")?,
            desired_capabilities: f.symbols("desired-capabilities")?,
            properties: f.opt_value(),
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_BEGIN,
            vec![
                opt_ushort(self.remote_channel),
                Value::Uint(self.next_outgoing_id),
                Value::Uint(self.incoming_window),
                Value::Uint(self.outgoing_window),
                opt_uint(self.handle_max),
                symbol_multiple(&self.offered_capabilities),
                symbol_multiple(&self.desired_capabilities),
                opt_value(&self.properties),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Attach {
    /// Link name; the correlation key between the two endpoints of a link.
    pub name: String,
    pub handle: u32,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snd_settle_mode: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rcv_settle_mode: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target: Option<Target>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unsettled: Option<Value>,
    pub incomplete_unsettled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub initial_delivery_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_message_size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub offered_capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub desired_capabilities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl Attach {
    /// The entity address this link refers to: the target address for a
    /// sender, the source address for a receiver.
    ///
    /// `direction` flips the perceived role: an inbound ATTACH describes the
    /// remote end of the link, whose role is the mirror of the local one, so
    /// the stored role is inverted before the rule is applied.
    pub fn address(&self, direction: Direction) -> Option<&str> {
        let receiver = match direction {
            Direction::Out => self.role == Role::Receiver,
            Direction::In => self.role == Role::Sender,
        };
        if receiver {
            self.source.as_ref()?.address.as_deref()
        } else {
            self.target.as_ref()?.address.as_deref()
        }
    }

    fn from_fields(fields: Vec<Value>) -> Result<Attach, CodecError> {
        let mut f = Fields::new("attach", fields);
        Ok(Attach {
            name: f.req_string("name")?,
            handle: f.req_u32("handle")?,
            role: Role::from_bool(f.req_bool("role")?),
            snd_settle_mode: f.opt_u8("snd-settle-mode")?,
            rcv_settle_mode: f.opt_u8("rcv-settle-mode")?,
            source: f.opt_composite("source", DESC_SOURCE, Source::from_fields)?,
            target: f.opt_composite("target", DESC_TARGET, Target::from_fields)?,
            unsettled: f.opt_value(),
            incomplete_unsettled: f.bool_or("incomplete-unsettled", false)?,
            initial_delivery_count: f.opt_u32("initial-delivery-count")?,
            max_message_size: f.opt_u64("max-message-size")?,
            offered_capabilities: f.symbols("offered-capabilities")?,
            desired_capabilities: f.symbols("desired-capabilities")?,
            properties: f.opt_value(),
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_ATTACH,
            vec![
                Value::String(self.name.clone()),
                Value::Uint(self.handle),
                Value::Bool(self.role.is_receiver()),
                opt_ubyte(self.snd_settle_mode),
                opt_ubyte(self.rcv_settle_mode),
                self.source
                    .as_ref()
                    .map(Source::to_value)
                    .unwrap_or(Value::Null),
                self.target
                    .as_ref()
                    .map(Target::to_value)
                    .unwrap_or(Value::Null),
                opt_value(&self.unsettled),
                Value::Bool(self.incomplete_unsettled),
                opt_uint(self.initial_delivery_count),
                opt_ulong(self.max_message_size),
                symbol_multiple(&self.offered_capabilities),
                symbol_multiple(&self.desired_capabilities),
                opt_value(&self.properties),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Flow {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub next_incoming_id: Option<u32>,
    pub incoming_window: u32,
    pub next_outgoing_id: u32,
    pub outgoing_window: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub handle: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_count: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_credit: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available: Option<u32>,
    pub drain: bool,
    pub echo: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub properties: Option<Value>,
}

impl Flow {
    fn from_fields(fields: Vec<Value>) -> Result<Flow, CodecError> {
        let mut f = Fields::new("flow", fields);
        Ok(Flow {
            next_incoming_id: f.opt_u32("next-incoming-id")?,
            incoming_window: f.req_u32("incoming-window")?,
            next_outgoing_id: f.req_u32("next-outgoing-id")?,
            outgoing_window: f.req_u32("outgoing-window")?,
            handle: f.opt_u32("handle")?,
            delivery_count: f.opt_u32("delivery-count")?,
            link_credit: f.opt_u32("link-credit")?,
            available: f.opt_u32("available")?,
            drain: f.bool_or("drain", false)?,
            echo: f.bool_or("echo", false)?,
            properties: f.opt_value(),
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_FLOW,
            vec![
                opt_uint(self.next_incoming_id),
                Value::Uint(self.incoming_window),
                Value::Uint(self.next_outgoing_id),
                Value::Uint(self.outgoing_window),
                opt_uint(self.handle),
                opt_uint(self.delivery_count),
                opt_uint(self.link_credit),
                opt_uint(self.available),
                Value::Bool(self.drain),
                Value::Bool(self.echo),
                opt_value(&self.properties),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Transfer {
    pub handle: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_opt_bytes")]
    pub delivery_tag: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_format: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled: Option<bool>,
    /// True when the message continues in a following transfer frame. The
    /// codec never reassembles; the trace writer does.
    pub more: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rcv_settle_mode: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    pub resume: bool,
    pub aborted: bool,
    pub batchable: bool,
    /// Message bytes following the performative list.
    #[serde(serialize_with = "ser_bytes")]
    pub payload: Bytes,
}

impl Transfer {
    fn from_fields(fields: Vec<Value>, payload: Bytes) -> Result<Transfer, CodecError> {
        let mut f = Fields::new("transfer", fields);
        Ok(Transfer {
            handle: f.req_u32("handle")?,
            delivery_id: f.opt_u32("delivery-id")?,
            delivery_tag: f.opt_binary("delivery-tag")?,
            message_format: f.opt_u32("message-format")?,
            settled: f.opt_bool("settled")?,
            more: f.bool_or("more", false)?,
            rcv_settle_mode: f.opt_u8("rcv-settle-mode")?,
            state: f.opt_value(),
            resume: f.bool_or("resume", false)?,
            aborted: f.bool_or("aborted", false)?,
            batchable: f.bool_or("batchable", false)?,
            payload,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_TRANSFER,
            vec![
                Value::Uint(self.handle),
                opt_uint(self.delivery_id),
                opt_binary(&self.delivery_tag),
                opt_uint(self.message_format),
                opt_bool(self.settled),
                Value::Bool(self.more),
                opt_ubyte(self.rcv_settle_mode),
                opt_value(&self.state),
                Value::Bool(self.resume),
                Value::Bool(self.aborted),
                Value::Bool(self.batchable),
            ],
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Disposition {
    pub role: Role,
    pub first: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last: Option<u32>,
    pub settled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<Value>,
    pub batchable: bool,
}

impl Disposition {
    fn from_fields(fields: Vec<Value>) -> Result<Disposition, CodecError> {
        let mut f = Fields::new("disposition", fields);
        Ok(Disposition {
            role: Role::from_bool(f.req_bool("role")?),
            first: f.req_u32("first")?,
            last: f.opt_u32("last")?,
            settled: f.bool_or("settled", false)?,
            state: f.opt_value(),
            batchable: f.bool_or("batchable", false)?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_DISPOSITION,
            vec![
                Value::Bool(self.role.is_receiver()),
                Value::Uint(self.first),
                opt_uint(self.last),
                Value::Bool(self.settled),
                opt_value(&self.state),
                Value::Bool(self.batchable),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Detach {
    pub handle: u32,
    pub closed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AmqpError>,
}

impl Detach {
    fn from_fields(fields: Vec<Value>) -> Result<Detach, CodecError> {
        let mut f = Fields::new("detach", fields);
        Ok(Detach {
            handle: f.req_u32("handle")?,
            closed: f.bool_or("closed", false)?,
            error: f.opt_composite("error", DESC_ERROR, AmqpError::from_fields)?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_DETACH,
            vec![
                Value::Uint(self.handle),
                Value::Bool(self.closed),
                self.error
                    .as_ref()
                    .map(AmqpError::to_value)
                    .unwrap_or(Value::Null),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct End {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AmqpError>,
}

impl End {
    fn from_fields(fields: Vec<Value>) -> Result<End, CodecError> {
        let mut f = Fields::new("end", fields);
        Ok(End {
            error: f.opt_composite("error", DESC_ERROR, AmqpError::from_fields)?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_END,
            vec![self
                .error
                .as_ref()
                .map(AmqpError::to_value)
                .unwrap_or(Value::Null)],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Close {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<AmqpError>,
}

impl Close {
    fn from_fields(fields: Vec<Value>) -> Result<Close, CodecError> {
        let mut f = Fields::new("close", fields);
        Ok(Close {
            error: f.opt_composite("error", DESC_ERROR, AmqpError::from_fields)?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_CLOSE,
            vec![self
                .error
                .as_ref()
                .map(AmqpError::to_value)
                .unwrap_or(Value::Null)],
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// SASL frames
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaslMechanisms {
    pub mechanisms: Vec<String>,
}

impl SaslMechanisms {
    fn from_fields(fields: Vec<Value>) -> Result<SaslMechanisms, CodecError> {
        let mut f = Fields::new("sasl-mechanisms", fields);
        Ok(SaslMechanisms {
            mechanisms: f.symbols("sasl-server-mechanisms")?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_SASL_MECHANISMS,
            vec![symbol_multiple(&self.mechanisms)],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaslInit {
    pub mechanism: String,
    /// Contains credentials; the trace writer never records SASL payloads in
    /// decoded form, only the frame type.
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_opt_bytes")]
    pub initial_response: Option<Bytes>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hostname: Option<String>,
}

impl SaslInit {
    fn from_fields(fields: Vec<Value>) -> Result<SaslInit, CodecError> {
        let mut f = Fields::new("sasl-init", fields);
        Ok(SaslInit {
            mechanism: f.req_symbol("mechanism")?,
            initial_response: f.opt_binary("initial-response")?,
            hostname: f.opt_string("hostname")?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_SASL_INIT,
            vec![
                Value::Symbol(self.mechanism.clone()),
                opt_binary(&self.initial_response),
                opt_string(&self.hostname),
            ],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaslChallenge {
    #[serde(serialize_with = "ser_bytes")]
    pub challenge: Bytes,
}

impl SaslChallenge {
    fn from_fields(fields: Vec<Value>) -> Result<SaslChallenge, CodecError> {
        let mut f = Fields::new("sasl-challenge", fields);
        Ok(SaslChallenge {
            challenge: f.req_binary("challenge")?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_SASL_CHALLENGE,
            vec![Value::Binary(self.challenge.clone())],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaslResponse {
    #[serde(serialize_with = "ser_bytes")]
    pub response: Bytes,
}

impl SaslResponse {
    fn from_fields(fields: Vec<Value>) -> Result<SaslResponse, CodecError> {
        let mut f = Fields::new("sasl-response", fields);
        Ok(SaslResponse {
            response: f.req_binary("response")?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_SASL_RESPONSE,
            vec![Value::Binary(self.response.clone())],
        )
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct SaslOutcome {
    pub code: u8,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_opt_bytes")]
    pub additional_data: Option<Bytes>,
}

impl SaslOutcome {
    fn from_fields(fields: Vec<Value>) -> Result<SaslOutcome, CodecError> {
        let mut f = Fields::new("sasl-outcome", fields);
        Ok(SaslOutcome {
            code: f.req_u8("code")?,
            additional_data: f.opt_binary("additional-data")?,
        })
    }

    fn to_value(&self) -> Value {
        described(
            DESC_SASL_OUTCOME,
            vec![Value::Ubyte(self.code), opt_binary(&self.additional_data)],
        )
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Body sum
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of frame bodies this proxy can represent.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Open(Open),
    Begin(Begin),
    Attach(Attach),
    Flow(Flow),
    Transfer(Transfer),
    Disposition(Disposition),
    Detach(Detach),
    End(End),
    Close(Close),
    SaslMechanisms(SaslMechanisms),
    SaslInit(SaslInit),
    SaslChallenge(SaslChallenge),
    SaslResponse(SaslResponse),
    SaslOutcome(SaslOutcome),
    /// Zero-body keep-alive frame.
    Empty,
    /// Uninterpreted bytes for pass-through fabrication; encodes verbatim.
    Raw(Bytes),
}

/// Discriminant tag for [`Body`], used as the trace line's `FrameType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BodyType {
    Empty,
    Raw,
    Open,
    Begin,
    Attach,
    Flow,
    Transfer,
    Disposition,
    Detach,
    End,
    Close,
    #[serde(rename = "SASLMechanisms")]
    SaslMechanisms,
    #[serde(rename = "SASLInit")]
    SaslInit,
    #[serde(rename = "SASLChallenge")]
    SaslChallenge,
    #[serde(rename = "SASLResponse")]
    SaslResponse,
    #[serde(rename = "SASLOutcome")]
    SaslOutcome,
}

impl std::fmt::Display for BodyType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BodyType::Empty => "Empty",
            BodyType::Raw => "Raw",
            BodyType::Open => "Open",
            BodyType::Begin => "Begin",
            BodyType::Attach => "Attach",
            BodyType::Flow => "Flow",
            BodyType::Transfer => "Transfer",
            BodyType::Disposition => "Disposition",
            BodyType::Detach => "Detach",
            BodyType::End => "End",
            BodyType::Close => "Close",
            BodyType::SaslMechanisms => "SASLMechanisms",
            BodyType::SaslInit => "SASLInit",
            BodyType::SaslChallenge => "SASLChallenge",
            BodyType::SaslResponse => "SASLResponse",
            BodyType::SaslOutcome => "SASLOutcome",
        };
        f.write_str(name)
    }
}

impl Body {
    pub fn body_type(&self) -> BodyType {
        match self {
            Body::Open(_) => BodyType::Open,
            Body::Begin(_) => BodyType::Begin,
            Body::Attach(_) => BodyType::Attach,
            Body::Flow(_) => BodyType::Flow,
            Body::Transfer(_) => BodyType::Transfer,
            Body::Disposition(_) => BodyType::Disposition,
            Body::Detach(_) => BodyType::Detach,
            Body::End(_) => BodyType::End,
            Body::Close(_) => BodyType::Close,
            Body::SaslMechanisms(_) => BodyType::SaslMechanisms,
            Body::SaslInit(_) => BodyType::SaslInit,
            Body::SaslChallenge(_) => BodyType::SaslChallenge,
            Body::SaslResponse(_) => BodyType::SaslResponse,
            Body::SaslOutcome(_) => BodyType::SaslOutcome,
            Body::Empty => BodyType::Empty,
            Body::Raw(_) => BodyType::Raw,
        }
    }

    /// The link handle carried by this body, for bodies that have one.
    pub fn handle(&self) -> Option<u32> {
        match self {
            Body::Attach(b) => Some(b.handle),
            Body::Flow(b) => b.handle,
            Body::Transfer(b) => Some(b.handle),
            Body::Detach(b) => Some(b.handle),
            _ => None,
        }
    }

    fn frame_type(&self) -> u8 {
        match self {
            Body::SaslMechanisms(_)
            | Body::SaslInit(_)
            | Body::SaslChallenge(_)
            | Body::SaslResponse(_)
            | Body::SaslOutcome(_) => FRAME_TYPE_SASL,
            _ => FRAME_TYPE_AMQP,
        }
    }

    fn encode_into(&self, out: &mut BytesMut) -> Result<(), CodecError> {
        let composite = match self {
            Body::Open(b) => b.to_value(),
            Body::Begin(b) => b.to_value(),
            Body::Attach(b) => b.to_value(),
            Body::Flow(b) => b.to_value(),
            Body::Transfer(b) => {
                value::encode(&b.to_value(), out)?;
                out.put_slice(&b.payload);
                return Ok(());
            }
            Body::Disposition(b) => b.to_value(),
            Body::Detach(b) => b.to_value(),
            Body::End(b) => b.to_value(),
            Body::Close(b) => b.to_value(),
            Body::SaslMechanisms(b) => b.to_value(),
            Body::SaslInit(b) => b.to_value(),
            Body::SaslChallenge(b) => b.to_value(),
            Body::SaslResponse(b) => b.to_value(),
            Body::SaslOutcome(b) => b.to_value(),
            Body::Empty => return Ok(()),
            Body::Raw(bytes) => {
                out.put_slice(bytes);
                return Ok(());
            }
        };
        value::encode(&composite, out)
    }
}

/// Trace serialization: a body renders as its inner struct's fields, with the
/// variant carried separately as `FrameType`. `Empty` and `Raw` have no
/// fields and render as an empty object.
impl Serialize for Body {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeMap;
        match self {
            Body::Open(b) => b.serialize(serializer),
            Body::Begin(b) => b.serialize(serializer),
            Body::Attach(b) => b.serialize(serializer),
            Body::Flow(b) => b.serialize(serializer),
            Body::Transfer(b) => b.serialize(serializer),
            Body::Disposition(b) => b.serialize(serializer),
            Body::Detach(b) => b.serialize(serializer),
            Body::End(b) => b.serialize(serializer),
            Body::Close(b) => b.serialize(serializer),
            Body::SaslMechanisms(b) => b.serialize(serializer),
            Body::SaslInit(b) => b.serialize(serializer),
            Body::SaslChallenge(b) => b.serialize(serializer),
            Body::SaslResponse(b) => b.serialize(serializer),
            Body::SaslOutcome(b) => b.serialize(serializer),
            Body::Empty | Body::Raw(_) => serializer.serialize_map(Some(0))?.end(),
        }
    }
}

/// Decode a frame body from the bytes following the (possibly extended)
/// header. Bytes remaining after the described list become the Transfer
/// payload; other bodies must not have any.
pub fn parse_body(mut buf: Bytes) -> Result<Body, CodecError> {
    let leading = value::decode(&mut buf)?;
    let Value::Described(descriptor, inner) = leading else {
        return Err(CodecError::MalformedBody {
            body: "frame",
            reason: "body does not start with a described value".to_string(),
        });
    };

    let code = descriptor_code(&descriptor).ok_or_else(|| CodecError::UnknownDescriptor {
        descriptor: render_descriptor(&descriptor),
    })?;

    let fields = match *inner {
        Value::List(items) => items,
        Value::Null => Vec::new(),
        other => {
            return Err(CodecError::MalformedBody {
                body: "frame",
                reason: format!("descriptor value is {other:?}, not a list"),
            })
        }
    };

    let body = match code {
        DESC_OPEN => Body::Open(Open::from_fields(fields)?),
        DESC_BEGIN => Body::Begin(Begin::from_fields(fields)?),
        DESC_ATTACH => Body::Attach(Attach::from_fields(fields)?),
        DESC_FLOW => Body::Flow(Flow::from_fields(fields)?),
        DESC_TRANSFER => return Ok(Body::Transfer(Transfer::from_fields(fields, buf)?)),
        DESC_DISPOSITION => Body::Disposition(Disposition::from_fields(fields)?),
        DESC_DETACH => Body::Detach(Detach::from_fields(fields)?),
        DESC_END => Body::End(End::from_fields(fields)?),
        DESC_CLOSE => Body::Close(Close::from_fields(fields)?),
        DESC_SASL_MECHANISMS => Body::SaslMechanisms(SaslMechanisms::from_fields(fields)?),
        DESC_SASL_INIT => Body::SaslInit(SaslInit::from_fields(fields)?),
        DESC_SASL_CHALLENGE => Body::SaslChallenge(SaslChallenge::from_fields(fields)?),
        DESC_SASL_RESPONSE => Body::SaslResponse(SaslResponse::from_fields(fields)?),
        DESC_SASL_OUTCOME => Body::SaslOutcome(SaslOutcome::from_fields(fields)?),
        other => {
            return Err(CodecError::UnknownDescriptor {
                descriptor: format!("{other:#04x}"),
            })
        }
    };
    Ok(body)
}

fn descriptor_code(descriptor: &Value) -> Option<u64> {
    match descriptor {
        Value::Ulong(code) => Some(*code),
        Value::Symbol(name) | Value::String(name) => match name.as_str() {
            "amqp:open:list" => Some(DESC_OPEN),
            "amqp:begin:list" => Some(DESC_BEGIN),
            "amqp:attach:list" => Some(DESC_ATTACH),
            "amqp:flow:list" => Some(DESC_FLOW),
            "amqp:transfer:list" => Some(DESC_TRANSFER),
            "amqp:disposition:list" => Some(DESC_DISPOSITION),
            "amqp:detach:list" => Some(DESC_DETACH),
            "amqp:end:list" => Some(DESC_END),
            "amqp:close:list" => Some(DESC_CLOSE),
            "amqp:sasl-mechanisms:list" => Some(DESC_SASL_MECHANISMS),
            "amqp:sasl-init:list" => Some(DESC_SASL_INIT),
            "amqp:sasl-challenge:list" => Some(DESC_SASL_CHALLENGE),
            "amqp:sasl-response:list" => Some(DESC_SASL_RESPONSE),
            "amqp:sasl-outcome:list" => Some(DESC_SASL_OUTCOME),
            _ => None,
        },
        _ => None,
    }
}

fn render_descriptor(descriptor: &Value) -> String {
    match descriptor {
        Value::Ulong(code) => format!("{code:#04x}"),
        Value::Symbol(name) | Value::String(name) => name.clone(),
        other => format!("{other:?}"),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Frame
// ─────────────────────────────────────────────────────────────────────────────

/// A parsed or fabricated AMQP frame.
///
/// Frames read off the wire keep their original bytes; pass-through paths
/// re-emit those verbatim. Fabricated or modified frames carry no raw bytes
/// and must go through [`Frame::encode`].
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: Header,
    pub body: Body,
    raw: Bytes,
}

impl Frame {
    /// Fabricate a frame for injection. The header size is filled in at
    /// encode time.
    pub fn new(channel: u16, body: Body) -> Frame {
        let frame_type = body.frame_type();
        Frame {
            header: Header {
                size: 0,
                data_offset: 2,
                frame_type,
                channel,
            },
            body,
            raw: Bytes::new(),
        }
    }

    /// Wrap pre-encoded bytes so they can be injected without interpretation.
    pub fn raw_frame(bytes: Bytes) -> Frame {
        Frame {
            header: Header {
                size: 0,
                data_offset: 2,
                frame_type: FRAME_TYPE_AMQP,
                channel: 0,
            },
            body: Body::Raw(bytes.clone()),
            raw: bytes,
        }
    }

    pub(crate) fn from_parts(header: Header, body: Body, raw: Bytes) -> Frame {
        Frame { header, body, raw }
    }

    /// The original wire bytes this frame was parsed from. Empty for
    /// fabricated frames.
    pub fn raw(&self) -> &Bytes {
        &self.raw
    }

    pub fn body_type(&self) -> BodyType {
        self.body.body_type()
    }

    /// Canonical wire encoding: data offset 2, size back-patched after the
    /// body is written. `Raw` bodies emit their stored bytes unchanged.
    pub fn encode(&self) -> Result<Bytes, CodecError> {
        if let Body::Raw(bytes) = &self.body {
            return Ok(bytes.clone());
        }

        let mut out = BytesMut::with_capacity(64);
        out.put_u32(0);
        out.put_u8(2);
        out.put_u8(self.body.frame_type());
        out.put_u16(self.header.channel);
        self.body.encode_into(&mut out)?;

        if out.len() > u32::MAX as usize {
            return Err(CodecError::FrameTooLarge);
        }
        let size = (out.len() as u32).to_be_bytes();
        out[..4].copy_from_slice(&size);
        Ok(out.freeze())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Positional field helpers
// ─────────────────────────────────────────────────────────────────────────────

struct Fields {
    iter: std::vec::IntoIter<Value>,
    body: &'static str,
}

impl Fields {
    fn new(body: &'static str, fields: Vec<Value>) -> Fields {
        Fields {
            iter: fields.into_iter(),
            body,
        }
    }

    fn next(&mut self) -> Value {
        self.iter.next().unwrap_or(Value::Null)
    }

    fn bad(&self, field: &str, got: &Value) -> CodecError {
        CodecError::MalformedBody {
            body: self.body,
            reason: format!("field {field}: unexpected {got:?}"),
        }
    }

    fn missing(&self, field: &str) -> CodecError {
        CodecError::MalformedBody {
            body: self.body,
            reason: format!("mandatory field {field} is null"),
        }
    }

    fn req_string(&mut self, field: &str) -> Result<String, CodecError> {
        self.opt_string(field)?.ok_or_else(|| self.missing(field))
    }

    fn opt_string(&mut self, field: &str) -> Result<Option<String>, CodecError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::String(s) | Value::Symbol(s) => Ok(Some(s)),
            other => Err(self.bad(field, &other)),
        }
    }

    fn req_symbol(&mut self, field: &str) -> Result<String, CodecError> {
        self.opt_symbol(field)?.ok_or_else(|| self.missing(field))
    }

    fn opt_symbol(&mut self, field: &str) -> Result<Option<String>, CodecError> {
        self.opt_string(field)
    }

    fn req_u32(&mut self, field: &str) -> Result<u32, CodecError> {
        self.opt_u32(field)?.ok_or_else(|| self.missing(field))
    }

    fn opt_u32(&mut self, field: &str) -> Result<Option<u32>, CodecError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Uint(v) => Ok(Some(v)),
            other => Err(self.bad(field, &other)),
        }
    }

    fn opt_u64(&mut self, field: &str) -> Result<Option<u64>, CodecError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Ulong(v) => Ok(Some(v)),
            Value::Uint(v) => Ok(Some(u64::from(v))),
            other => Err(self.bad(field, &other)),
        }
    }

    fn opt_u16(&mut self, field: &str) -> Result<Option<u16>, CodecError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Ushort(v) => Ok(Some(v)),
            other => Err(self.bad(field, &other)),
        }
    }

    fn req_u8(&mut self, field: &str) -> Result<u8, CodecError> {
        self.opt_u8(field)?.ok_or_else(|| self.missing(field))
    }

    fn opt_u8(&mut self, field: &str) -> Result<Option<u8>, CodecError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Ubyte(v) => Ok(Some(v)),
            other => Err(self.bad(field, &other)),
        }
    }

    fn req_bool(&mut self, field: &str) -> Result<bool, CodecError> {
        match self.next() {
            Value::Bool(v) => Ok(v),
            Value::Null => Err(self.missing(field)),
            other => Err(self.bad(field, &other)),
        }
    }

    fn opt_bool(&mut self, field: &str) -> Result<Option<bool>, CodecError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Bool(v) => Ok(Some(v)),
            other => Err(self.bad(field, &other)),
        }
    }

    fn bool_or(&mut self, field: &str, default: bool) -> Result<bool, CodecError> {
        Ok(self.opt_bool(field)?.unwrap_or(default))
    }

    fn req_binary(&mut self, field: &str) -> Result<Bytes, CodecError> {
        self.opt_binary(field)?.ok_or_else(|| self.missing(field))
    }

    fn opt_binary(&mut self, field: &str) -> Result<Option<Bytes>, CodecError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Binary(v) => Ok(Some(v)),
            other => Err(self.bad(field, &other)),
        }
    }

    fn opt_value(&mut self) -> Option<Value> {
        match self.next() {
            Value::Null => None,
            other => Some(other),
        }
    }

    /// A "multiple symbol" field: null, a single symbol, or an array.
    fn symbols(&mut self, field: &str) -> Result<Vec<String>, CodecError> {
        match self.next() {
            Value::Null => Ok(Vec::new()),
            Value::Symbol(s) | Value::String(s) => Ok(vec![s]),
            Value::Array(items) => items
                .into_iter()
                .map(|item| match item {
                    Value::Symbol(s) | Value::String(s) => Ok(s),
                    other => Err(self.bad(field, &other)),
                })
                .collect(),
            other => Err(self.bad(field, &other)),
        }
    }

    fn opt_composite<T>(
        &mut self,
        field: &str,
        expected_code: u64,
        parse: impl FnOnce(Vec<Value>) -> Result<T, CodecError>,
    ) -> Result<Option<T>, CodecError> {
        match self.next() {
            Value::Null => Ok(None),
            Value::Described(descriptor, inner) => {
                let code = descriptor_code(&descriptor);
                if code != Some(expected_code) {
                    return Err(CodecError::MalformedBody {
                        body: self.body,
                        reason: format!(
                            "field {field}: descriptor {} does not match {expected_code:#04x}",
                            render_descriptor(&descriptor)
                        ),
                    });
                }
                let fields = match *inner {
                    Value::List(items) => items,
                    Value::Null => Vec::new(),
                    other => return Err(self.bad(field, &other)),
                };
                parse(fields).map(Some)
            }
            other => Err(self.bad(field, &other)),
        }
    }
}

fn trim_trailing_nulls(mut fields: Vec<Value>) -> Vec<Value> {
    while fields.last().is_some_and(Value::is_null) {
        fields.pop();
    }
    fields
}

fn described(code: u64, fields: Vec<Value>) -> Value {
    Value::Described(
        Box::new(Value::Ulong(code)),
        Box::new(Value::List(trim_trailing_nulls(fields))),
    )
}

fn opt_string(v: &Option<String>) -> Value {
    v.as_ref()
        .map(|s| Value::String(s.clone()))
        .unwrap_or(Value::Null)
}

fn opt_symbol(v: &Option<String>) -> Value {
    v.as_ref()
        .map(|s| Value::Symbol(s.clone()))
        .unwrap_or(Value::Null)
}

fn opt_uint(v: Option<u32>) -> Value {
    v.map(Value::Uint).unwrap_or(Value::Null)
}

fn opt_ulong(v: Option<u64>) -> Value {
    v.map(Value::Ulong).unwrap_or(Value::Null)
}

fn opt_ushort(v: Option<u16>) -> Value {
    v.map(Value::Ushort).unwrap_or(Value::Null)
}

fn opt_ubyte(v: Option<u8>) -> Value {
    v.map(Value::Ubyte).unwrap_or(Value::Null)
}

fn opt_bool(v: Option<bool>) -> Value {
    v.map(Value::Bool).unwrap_or(Value::Null)
}

fn opt_binary(v: &Option<Bytes>) -> Value {
    v.as_ref()
        .map(|b| Value::Binary(b.clone()))
        .unwrap_or(Value::Null)
}

fn opt_value(v: &Option<Value>) -> Value {
    v.clone().unwrap_or(Value::Null)
}

fn symbol_multiple(items: &[String]) -> Value {
    match items {
        [] => Value::Null,
        [one] => Value::Symbol(one.clone()),
        many => Value::Array(many.iter().map(|s| Value::Symbol(s.clone())).collect()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body_roundtrip(body: Body) {
        let frame = Frame::new(7, body.clone());
        let encoded = frame.encode().unwrap();

        let header = Header::parse(&encoded[..HEADER_SIZE]).unwrap();
        assert_eq!(header.size as usize, encoded.len());
        assert_eq!(header.data_offset, 2);
        assert_eq!(header.channel, 7);

        let reparsed = parse_body(encoded.slice(HEADER_SIZE..)).unwrap();
        assert_eq!(reparsed, body);
    }

    #[test]
    fn test_open_roundtrip() {
        body_roundtrip(Body::Open(Open {
            container_id: "client-a1".to_string(),
            hostname: Some("example.servicebus.windows.net".to_string()),
            max_frame_size: Some(65536),
            channel_max: Some(4999),
            idle_timeout: Some(240_000),
            ..Open::default()
        }));
    }

    #[test]
    fn test_begin_roundtrip() {
        body_roundtrip(Body::Begin(Begin {
            remote_channel: None,
            next_outgoing_id: 1,
            incoming_window: 5000,
            outgoing_window: 5000,
            handle_max: Some(255),
            ..Begin::default()
        }));
    }

    #[test]
    fn test_attach_roundtrip() {
        body_roundtrip(Body::Attach(Attach {
            name: "receiver-link-1".to_string(),
            handle: 2,
            role: Role::Receiver,
            snd_settle_mode: Some(2),
            rcv_settle_mode: Some(0),
            source: Some(Source {
                address: Some("queue-1".to_string()),
                ..Source::default()
            }),
            target: Some(Target::default()),
            unsettled: None,
            incomplete_unsettled: false,
            initial_delivery_count: None,
            max_message_size: Some(1024 * 1024),
            offered_capabilities: Vec::new(),
            desired_capabilities: vec!["com.microsoft:session-filter".to_string()],
            properties: None,
        }));
    }

    #[test]
    fn test_flow_roundtrip() {
        body_roundtrip(Body::Flow(Flow {
            next_incoming_id: Some(1),
            incoming_window: 5000,
            next_outgoing_id: 1,
            outgoing_window: 5000,
            handle: Some(0),
            delivery_count: Some(0),
            link_credit: Some(300),
            drain: false,
            echo: true,
            ..Flow::default()
        }));
    }

    #[test]
    fn test_transfer_roundtrip_preserves_payload() {
        body_roundtrip(Body::Transfer(Transfer {
            handle: 0,
            delivery_id: Some(12),
            delivery_tag: Some(Bytes::from_static(b"tag-12")),
            message_format: Some(0),
            settled: Some(false),
            more: true,
            payload: Bytes::from_static(b"\x00\x53\x77\xa1\x05hello"),
            ..Transfer::default()
        }));
    }

    #[test]
    fn test_transfer_empty_delivery_tag_stays_present() {
        // Present-but-empty binary must survive a roundtrip as present.
        let body = Body::Transfer(Transfer {
            handle: 0,
            delivery_tag: Some(Bytes::new()),
            ..Transfer::default()
        });
        let encoded = Frame::new(0, body.clone()).encode().unwrap();
        let reparsed = parse_body(encoded.slice(HEADER_SIZE..)).unwrap();
        let Body::Transfer(t) = reparsed else {
            panic!("expected transfer");
        };
        assert_eq!(t.delivery_tag, Some(Bytes::new()));
    }

    #[test]
    fn test_disposition_roundtrip() {
        body_roundtrip(Body::Disposition(Disposition {
            role: Role::Receiver,
            first: 3,
            last: Some(5),
            settled: true,
            state: None,
            batchable: false,
        }));
    }

    #[test]
    fn test_detach_with_error_roundtrip() {
        body_roundtrip(Body::Detach(Detach {
            handle: 9,
            closed: true,
            error: Some(AmqpError::new(
                "amqp:link:detach-forced",
                "forced by fault injection",
            )),
        }));
    }

    #[test]
    fn test_end_close_roundtrip() {
        body_roundtrip(Body::End(End { error: None }));
        body_roundtrip(Body::Close(Close {
            error: Some(AmqpError::new("amqp:connection:forced", "going away")),
        }));
    }

    #[test]
    fn test_sasl_bodies_roundtrip() {
        body_roundtrip(Body::SaslMechanisms(SaslMechanisms {
            mechanisms: vec!["MSSBCBS".to_string(), "PLAIN".to_string()],
        }));
        body_roundtrip(Body::SaslInit(SaslInit {
            mechanism: "PLAIN".to_string(),
            initial_response: Some(Bytes::from_static(b"\x00user\x00pass")),
            hostname: Some("example.com".to_string()),
        }));
        body_roundtrip(Body::SaslChallenge(SaslChallenge {
            challenge: Bytes::from_static(b"nonce"),
        }));
        body_roundtrip(Body::SaslResponse(SaslResponse {
            response: Bytes::new(),
        }));
        body_roundtrip(Body::SaslOutcome(SaslOutcome {
            code: 0,
            additional_data: None,
        }));
    }

    #[test]
    fn test_sasl_frames_use_sasl_frame_type() {
        let frame = Frame::new(
            0,
            Body::SaslInit(SaslInit {
                mechanism: "ANONYMOUS".to_string(),
                initial_response: None,
                hostname: None,
            }),
        );
        let encoded = frame.encode().unwrap();
        assert_eq!(encoded[5], FRAME_TYPE_SASL);
    }

    #[test]
    fn test_empty_body_encodes_as_bare_header() {
        let encoded = Frame::new(0, Body::Empty).encode().unwrap();
        assert_eq!(&encoded[..], &[0, 0, 0, 8, 2, 0, 0, 0]);
    }

    #[test]
    fn test_raw_body_encodes_verbatim() {
        let bytes = Bytes::from_static(b"\x00\x00\x00\x08\x02\x00\x00\x05");
        let frame = Frame::raw_frame(bytes.clone());
        assert_eq!(frame.encode().unwrap(), bytes);
    }

    #[test]
    fn test_unknown_descriptor_is_an_error() {
        // described(ulong 0x99) with an empty list body.
        let body = Bytes::from_static(&[0x00, 0x53, 0x99, 0x45]);
        assert!(matches!(
            parse_body(body),
            Err(CodecError::UnknownDescriptor { .. })
        ));
    }

    #[test]
    fn test_symbolic_descriptor_matches() {
        // described(symbol "amqp:end:list") with an empty list body.
        let mut built = BytesMut::new();
        value::encode(
            &Value::Described(
                Box::new(Value::Symbol("amqp:end:list".to_string())),
                Box::new(Value::List(vec![])),
            ),
            &mut built,
        )
        .unwrap();
        let body = parse_body(built.freeze()).unwrap();
        assert_eq!(body, Body::End(End { error: None }));
    }

    #[test]
    fn test_attach_missing_name_is_malformed() {
        let mut built = BytesMut::new();
        value::encode(
            &Value::Described(
                Box::new(Value::Ulong(DESC_ATTACH)),
                Box::new(Value::List(vec![Value::Null, Value::Uint(0)])),
            ),
            &mut built,
        )
        .unwrap();
        assert!(matches!(
            parse_body(built.freeze()),
            Err(CodecError::MalformedBody { body: "attach", .. })
        ));
    }

    #[test]
    fn test_header_rejects_bad_size_and_doff() {
        assert!(Header::parse(&[0, 0, 0, 7, 2, 0, 0, 0]).is_err());
        assert!(Header::parse(&[0, 0, 0, 8, 1, 0, 0, 0]).is_err());
        assert!(Header::parse(&[0, 0, 0, 8, 3, 0, 0, 0]).is_err());
        assert!(Header::parse(&[0, 0, 0, 8, 2, 0, 0, 5]).is_ok());
    }

    #[test]
    fn test_attach_address_rule() {
        let attach = Attach {
            name: "link".to_string(),
            handle: 0,
            role: Role::Sender,
            source: Some(Source {
                address: Some("reply-to".to_string()),
                ..Source::default()
            }),
            target: Some(Target {
                address: Some("orders".to_string()),
                ..Target::default()
            }),
            snd_settle_mode: None,
            rcv_settle_mode: None,
            unsettled: None,
            incomplete_unsettled: false,
            initial_delivery_count: None,
            max_message_size: None,
            offered_capabilities: Vec::new(),
            desired_capabilities: Vec::new(),
            properties: None,
        };
        // Outbound: stored role (sender) → target address.
        assert_eq!(attach.address(Direction::Out), Some("orders"));
        // Inbound: perceived role flips → source address.
        assert_eq!(attach.address(Direction::In), Some("reply-to"));
    }
}
