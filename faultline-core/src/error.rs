//! Error types for the mirroring engine.
//!
//! `CodecError` covers wire-level failures: invalid frame headers, unknown
//! performative descriptors, malformed bodies, and oversized frames. These
//! are fatal for the connection that produced them.
//!
//! `MirrorError` covers per-direction pipeline failures: codec errors, socket
//! I/O, link correlation faults, and injector aborts. The mirror joins both
//! directions and surfaces the first non-nil error after both have exited.

use std::io;

use crate::codec::body::Role;
use crate::Direction;

/// Errors produced while parsing or encoding AMQP frames.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// A frame header failed validation (size < 8, data offset < 2, or a
    /// size smaller than the header it describes).
    #[error("invalid frame header: {reason}")]
    InvalidHeader {
        /// Human-readable description of the validation failure.
        reason: String,
    },

    /// The body ended before a complete value could be decoded.
    #[error("truncated value: needed {needed} more bytes")]
    Truncated {
        /// How many additional bytes were required.
        needed: usize,
    },

    /// An AMQP format code this codec does not understand.
    #[error("invalid format code 0x{code:02x}")]
    InvalidFormatCode {
        /// The offending constructor byte.
        code: u8,
    },

    /// The frame body's descriptor names a performative this proxy cannot
    /// represent. Forwarding such a frame would mean forwarding semantics we
    /// cannot trace, so this aborts the connection instead.
    #[error("unknown performative descriptor {descriptor}")]
    UnknownDescriptor {
        /// The descriptor, rendered as its ulong code or symbol name.
        descriptor: String,
    },

    /// A performative body decoded, but its field list is invalid: a
    /// mandatory field is null or a field has the wrong type.
    #[error("malformed {body} body: {reason}")]
    MalformedBody {
        /// Which performative was being decoded.
        body: &'static str,
        /// What was wrong with it.
        reason: String,
    },

    /// An encoded frame would exceed the u32 size field.
    #[error("frame too large to encode")]
    FrameTooLarge,

    /// Wrapper adding the absolute stream offset at which a parse failed.
    #[error("parse failure at stream offset {offset}: {source}")]
    AtOffset {
        /// Byte offset from the start of the stream.
        offset: u64,
        /// The underlying parse error.
        #[source]
        source: Box<CodecError>,
    },
}

/// Link-correlation failures from the state map.
#[derive(Debug, thiserror::Error)]
pub enum StateError {
    /// The server sent an ATTACH that matches no prior client ATTACH with
    /// the same link name and inverted role. The stream is corrupt.
    #[error("no matching client attach for remote link {link_name:?} (receiver: {receiver})")]
    CorrelationFault {
        /// The link name carried by the unmatched remote ATTACH.
        link_name: String,
        /// The remote ATTACH's role, rendered as its receiver flag.
        receiver: bool,
    },
}

impl StateError {
    pub(crate) fn correlation_fault(link_name: &str, role: Role) -> StateError {
        StateError::CorrelationFault {
            link_name: link_name.to_string(),
            receiver: role == Role::Receiver,
        }
    }
}

/// Errors returned from an injector callback.
///
/// Anything other than `Cancelled` aborts the direction the frame arrived on.
#[derive(Debug, thiserror::Error)]
pub enum InjectorError {
    /// The connection's cancellation token fired while the injector was
    /// suspended (for example mid-delay). The direction ends gracefully.
    #[error("injector interrupted by cancellation")]
    Cancelled,

    /// The injector needed to re-encode or inspect a frame and failed.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Policy-specific failure.
    #[error("injector fault: {0}")]
    Fault(String),
}

/// Errors from one direction of the mirror pipeline.
#[derive(Debug, thiserror::Error)]
pub enum MirrorError {
    /// The source byte stream could not be parsed into frames.
    #[error("codec failure on {direction} stream: {source}")]
    Codec {
        /// Which direction was being read.
        direction: Direction,
        /// The underlying codec error.
        #[source]
        source: CodecError,
    },

    /// Socket read or write failed.
    #[error("i/o failure on {direction} stream: {source}")]
    Io {
        /// Which direction was being served.
        direction: Direction,
        /// The underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// The state map detected stream corruption.
    #[error(transparent)]
    Correlation(#[from] StateError),

    /// The injector aborted the direction.
    #[error("injector aborted {direction} stream: {source}")]
    Injector {
        /// Which direction the frame arrived on.
        direction: Direction,
        /// The injector's error.
        #[source]
        source: InjectorError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_offset_wraps_source() {
        let err = CodecError::AtOffset {
            offset: 42,
            source: Box::new(CodecError::InvalidFormatCode { code: 0xff }),
        };
        let msg = err.to_string();
        assert!(msg.contains("offset 42"), "message was: {msg}");
        assert!(msg.contains("0xff"), "message was: {msg}");
    }

    #[test]
    fn test_correlation_fault_message() {
        let err = StateError::correlation_fault("orders-link", Role::Receiver);
        assert!(err.to_string().contains("orders-link"));
    }
}
