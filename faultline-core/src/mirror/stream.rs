//! Byte-stream halves of a mirrored connection.
//!
//! [`FrameStream`] owns a read half plus its [`FrameBuffer`] and yields
//! parsed items; [`FrameSink`] shares a write half behind a mutex so the
//! opposite direction task and delayed-dispatch tasks can all write through
//! it without interleaving frames.

use std::sync::Arc;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::codec::{FrameBuffer, StreamItem};
use crate::error::MirrorError;
use crate::Direction;

/// Socket read chunk size.
const CHUNK_SIZE: usize = 64 * 1024;

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Read half + streaming parse state for one direction.
pub struct FrameStream {
    direction: Direction,
    reader: BoxedReader,
    buffer: FrameBuffer,
    chunk: BytesMut,
    eof: bool,
}

impl FrameStream {
    pub fn new(
        direction: Direction,
        reader: impl AsyncRead + Send + Unpin + 'static,
    ) -> FrameStream {
        FrameStream {
            direction,
            reader: Box::new(reader),
            buffer: FrameBuffer::new(),
            chunk: BytesMut::with_capacity(CHUNK_SIZE),
            eof: false,
        }
    }

    /// The next preamble or frame, `None` on EOF or cancellation.
    ///
    /// Cancellation is observed between reads; buffered complete items are
    /// still drained after EOF.
    pub async fn next(
        &mut self,
        cancel: &CancellationToken,
    ) -> Result<Option<StreamItem>, MirrorError> {
        loop {
            if let Some(item) = self.buffer.extract().map_err(|e| MirrorError::Codec {
                direction: self.direction,
                source: e,
            })? {
                return Ok(Some(item));
            }

            if self.eof {
                if self.buffer.buffered() > 0 {
                    tracing::debug!(
                        direction = %self.direction,
                        trailing = self.buffer.buffered(),
                        "stream ended with a partial frame buffered"
                    );
                }
                return Ok(None);
            }

            self.chunk.clear();
            let n = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!(direction = %self.direction, "read loop observed cancellation");
                    return Ok(None);
                }
                result = self.reader.read_buf(&mut self.chunk) => {
                    result.map_err(|e| MirrorError::Io {
                        direction: self.direction,
                        source: e,
                    })?
                }
            };

            if n == 0 {
                self.eof = true;
                continue;
            }
            self.buffer.add(&self.chunk);
        }
    }
}

/// Shared, serialized write half.
#[derive(Clone)]
pub struct FrameSink {
    inner: Arc<Mutex<BoxedWriter>>,
}

impl FrameSink {
    pub fn new(writer: impl AsyncWrite + Send + Unpin + 'static) -> FrameSink {
        FrameSink {
            inner: Arc::new(Mutex::new(Box::new(writer))),
        }
    }

    /// Write and flush one frame's bytes as a unit.
    pub async fn write_bytes(&self, bytes: &[u8]) -> std::io::Result<()> {
        let mut writer = self.inner.lock().await;
        writer.write_all(bytes).await?;
        writer.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::{Body, Close, Frame};

    #[tokio::test]
    async fn test_stream_yields_frames_across_chunk_boundaries() {
        let frame = Frame::new(2, Body::Close(Close { error: None }));
        let encoded = frame.encode().unwrap();

        let (client, server) = tokio::io::duplex(16);
        let mut stream = FrameStream::new(Direction::Out, server);
        let cancel = CancellationToken::new();

        let writer = tokio::spawn(async move {
            let mut client = client;
            // Dribble the frame in 3-byte pieces.
            for piece in encoded.chunks(3) {
                client.write_all(piece).await.unwrap();
                client.flush().await.unwrap();
            }
            drop(client);
        });

        let item = stream.next(&cancel).await.unwrap().unwrap();
        assert!(matches!(item, StreamItem::Frame(f) if matches!(f.body, Body::Close(_))));
        assert!(stream.next(&cancel).await.unwrap().is_none());
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_reader() {
        let (_client, server) = tokio::io::duplex(16);
        let mut stream = FrameStream::new(Direction::In, server);
        let cancel = CancellationToken::new();

        let cancel2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
            cancel2.cancel();
        });

        // No bytes ever arrive; cancellation must end the read.
        let item = stream.next(&cancel).await.unwrap();
        assert!(item.is_none());
    }

    #[tokio::test]
    async fn test_sink_serializes_writers() {
        let (client, mut server) = tokio::io::duplex(1024);
        let sink = FrameSink::new(client);

        let a = sink.clone();
        let b = sink.clone();
        let t1 = tokio::spawn(async move { a.write_bytes(b"aaaa").await });
        let t2 = tokio::spawn(async move { b.write_bytes(b"bbbb").await });
        t1.await.unwrap().unwrap();
        t2.await.unwrap().unwrap();

        let mut buf = [0u8; 8];
        server.read_exact(&mut buf).await.unwrap();
        // Writes are whole-buffer units; only the order is unspecified.
        assert!(&buf == b"aaaabbbb" || &buf == b"bbbbaaaa");
    }
}
