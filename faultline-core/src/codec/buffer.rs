//! Streaming frame extraction.
//!
//! [`FrameBuffer`] accumulates connection bytes via [`FrameBuffer::add`] and
//! yields complete items via [`FrameBuffer::extract`], independent of how the
//! bytes were chunked by the socket. In the interstitial state it recognizes
//! the 8-byte `AMQP` preamble, which legitimately appears mid-stream during
//! SASL negotiation; otherwise it parses a frame header, holds it, and waits
//! for the full body.

use bytes::{Bytes, BytesMut};

use crate::codec::body::{self, Body, Frame, Header, HEADER_SIZE};
use crate::error::CodecError;

/// One item extracted from the byte stream.
#[derive(Debug, Clone)]
pub enum StreamItem {
    /// The 8-byte protocol marker (`AMQP\x00\x01\x00\x00` or a SASL/TLS
    /// variant). Passed through opaquely, never shown to injectors.
    Preamble(Bytes),
    /// A complete parsed frame.
    Frame(Frame),
}

/// Append-only byte buffer with incremental item extraction.
#[derive(Debug, Default)]
pub struct FrameBuffer {
    buf: BytesMut,
    /// Header parsed but body not yet complete.
    pending: Option<(Header, Bytes)>,
    /// Total bytes consumed, for error reporting.
    offset: u64,
}

impl FrameBuffer {
    pub fn new() -> FrameBuffer {
        FrameBuffer::default()
    }

    /// Append connection bytes. Not re-entrant with `extract`.
    pub fn add(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Bytes buffered but not yet consumed by a complete item.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Attempt to extract the next item. Returns `Ok(None)` when the buffer
    /// does not yet hold a complete item; errors are fatal for the
    /// connection.
    pub fn extract(&mut self) -> Result<Option<StreamItem>, CodecError> {
        if self.pending.is_none() {
            if self.buf.len() < HEADER_SIZE {
                return Ok(None);
            }

            if &self.buf[..4] == b"AMQP" {
                let preamble = self.buf.split_to(HEADER_SIZE).freeze();
                self.offset += HEADER_SIZE as u64;
                return Ok(Some(StreamItem::Preamble(preamble)));
            }

            let header = Header::parse(&self.buf[..HEADER_SIZE]).map_err(|e| self.at_offset(e))?;
            let header_raw = self.buf.split_to(HEADER_SIZE).freeze();
            self.offset += HEADER_SIZE as u64;
            self.pending = Some((header, header_raw));
        }

        let body_len = {
            let (header, _) = self.pending.as_ref().expect("pending header");
            header.size as usize - HEADER_SIZE
        };
        if self.buf.len() < body_len {
            return Ok(None);
        }

        let (header, header_raw) = self.pending.take().expect("pending header");
        let body_region = self.buf.split_to(body_len).freeze();

        // Extended header bytes (data offset beyond 2) are skipped for
        // parsing but preserved in the raw frame bytes.
        let skip = (usize::from(header.data_offset) * 4).saturating_sub(HEADER_SIZE);
        let body_bytes = body_region.slice(skip..);

        let body = if body_bytes.is_empty() {
            Body::Empty
        } else {
            body::parse_body(body_bytes).map_err(|e| self.at_offset(e))?
        };

        self.offset += body_len as u64;

        let mut raw = BytesMut::with_capacity(header_raw.len() + body_region.len());
        raw.extend_from_slice(&header_raw);
        raw.extend_from_slice(&body_region);

        Ok(Some(StreamItem::Frame(Frame::from_parts(
            header,
            body,
            raw.freeze(),
        ))))
    }

    fn at_offset(&self, source: CodecError) -> CodecError {
        CodecError::AtOffset {
            offset: self.offset,
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::{Close, Open};

    const PREAMBLE: &[u8] = b"AMQP\x00\x01\x00\x00";
    const SASL_PREAMBLE: &[u8] = b"AMQP\x03\x01\x00\x00";

    fn open_frame_bytes() -> Bytes {
        Frame::new(
            0,
            Body::Open(Open {
                container_id: "c1".to_string(),
                ..Open::default()
            }),
        )
        .encode()
        .unwrap()
    }

    #[test]
    fn test_extract_preamble_then_frame() {
        let mut fb = FrameBuffer::new();
        fb.add(PREAMBLE);
        fb.add(&open_frame_bytes());

        let item = fb.extract().unwrap().unwrap();
        assert!(matches!(&item, StreamItem::Preamble(p) if &p[..] == PREAMBLE));

        let item = fb.extract().unwrap().unwrap();
        let StreamItem::Frame(frame) = item else {
            panic!("expected frame");
        };
        assert!(matches!(frame.body, Body::Open(_)));
        assert_eq!(frame.raw(), &open_frame_bytes());

        assert!(fb.extract().unwrap().is_none());
    }

    #[test]
    fn test_sasl_preamble_recognized() {
        let mut fb = FrameBuffer::new();
        fb.add(SASL_PREAMBLE);
        let item = fb.extract().unwrap().unwrap();
        assert!(matches!(&item, StreamItem::Preamble(p) if &p[..] == SASL_PREAMBLE));
    }

    #[test]
    fn test_one_byte_at_a_time() {
        let encoded = open_frame_bytes();
        let mut fb = FrameBuffer::new();

        for (i, byte) in encoded.iter().enumerate() {
            fb.add(&[*byte]);
            let item = fb.extract().unwrap();
            if i + 1 < encoded.len() {
                assert!(item.is_none(), "item produced early at byte {i}");
            } else {
                assert!(matches!(item, Some(StreamItem::Frame(_))));
            }
        }
    }

    #[test]
    fn test_empty_frame() {
        let mut fb = FrameBuffer::new();
        fb.add(&[0, 0, 0, 8, 2, 0, 0, 3]);
        let StreamItem::Frame(frame) = fb.extract().unwrap().unwrap() else {
            panic!("expected frame");
        };
        assert!(matches!(frame.body, Body::Empty));
        assert_eq!(frame.header.channel, 3);
    }

    #[test]
    fn test_extended_header_skipped_but_preserved() {
        // data offset 3: one extra 4-byte word before the body.
        let body = Frame::new(0, Body::Close(Close { error: None }))
            .encode()
            .unwrap()
            .slice(HEADER_SIZE..);
        let size = (HEADER_SIZE + 4 + body.len()) as u32;
        let mut wire = Vec::new();
        wire.extend_from_slice(&size.to_be_bytes());
        wire.extend_from_slice(&[3, 0, 0, 0]);
        wire.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        wire.extend_from_slice(&body);

        let mut fb = FrameBuffer::new();
        fb.add(&wire);
        let StreamItem::Frame(frame) = fb.extract().unwrap().unwrap() else {
            panic!("expected frame");
        };
        assert!(matches!(frame.body, Body::Close(_)));
        assert_eq!(&frame.raw()[..], &wire[..]);
    }

    #[test]
    fn test_invalid_header_reports_offset() {
        let mut fb = FrameBuffer::new();
        fb.add(PREAMBLE);
        assert!(matches!(
            fb.extract(),
            Ok(Some(StreamItem::Preamble(_)))
        ));
        // size 4 < 8: invalid.
        fb.add(&[0, 0, 0, 4, 2, 0, 0, 0]);
        match fb.extract() {
            Err(CodecError::AtOffset { offset, .. }) => assert_eq!(offset, 8),
            other => panic!("expected offset error, got {other:?}"),
        }
    }

    #[test]
    fn test_multiple_frames_in_one_add() {
        let encoded = open_frame_bytes();
        let mut wire = Vec::new();
        wire.extend_from_slice(&encoded);
        wire.extend_from_slice(&encoded);

        let mut fb = FrameBuffer::new();
        fb.add(&wire);
        assert!(matches!(
            fb.extract().unwrap(),
            Some(StreamItem::Frame(_))
        ));
        assert!(matches!(
            fb.extract().unwrap(),
            Some(StreamItem::Frame(_))
        ));
        assert!(fb.extract().unwrap().is_none());
    }
}
