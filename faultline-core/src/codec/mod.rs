//! Binary AMQP 1.0 frame codec.
//!
//! Layered bottom-up: [`value`] is the primitive type system, [`body`] the
//! typed performatives and frames, [`buffer`] the streaming byte-to-item
//! extractor, and [`message`] the bare-message section decoder used by the
//! trace writer.

pub mod body;
pub mod buffer;
pub mod message;
pub mod value;

pub use body::{Body, BodyType, Frame, Header, Role};
pub use buffer::{FrameBuffer, StreamItem};

/// Serde helpers for rendering byte fields as base64 in trace lines.
pub(crate) mod json {
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use bytes::Bytes;
    use serde::ser::SerializeSeq;
    use serde::Serializer;

    pub(crate) fn ser_bytes<S: Serializer>(bytes: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(&STANDARD.encode(bytes))
    }

    pub(crate) fn ser_opt_bytes<S: Serializer>(
        bytes: &Option<Bytes>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match bytes {
            Some(b) => ser_bytes(b, serializer),
            None => serializer.serialize_none(),
        }
    }

    pub(crate) fn ser_bytes_vec<S: Serializer>(
        list: &[Bytes],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(list.len()))?;
        for item in list {
            seq.serialize_element(&STANDARD.encode(item))?;
        }
        seq.end()
    }
}
