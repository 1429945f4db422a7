//! Structured per-connection transcript: one JSON object per line.
//!
//! Every frame the mirror dispatches (forwarded, modified, injected, or
//! dropped) produces one line keyed by timestamp, direction, frame type,
//! and link identity. Payloads of completed transfers are decoded into a
//! `MessageData` side channel, with credentials redacted (see [`redact`]).
//!
//! The tracer never fails the mirror: write and serialization errors are
//! logged at warning level and swallowed.

mod redact;
mod writer;

pub use redact::{CbsData, MessageData};
pub use writer::LineWriter;

use std::path::Path;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use crate::codec::body::{Body, Header};
use crate::codec::json::ser_opt_bytes;
use crate::codec::{BodyType, Frame};
use crate::injector::{Action, MetaFrame};
use crate::statemap::{AttachInfo, StateMap};
use crate::Direction;

use redact::TransferTransformer;

/// Injector metadata recorded alongside a traced frame.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct MetaFrameMeta {
    pub action: Action,
    /// Milliseconds the frame was held before dispatch; absent when zero.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delay: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Present when the injector redirected the frame; true means it was
    /// sent toward the server.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub override_out: Option<bool>,
}

impl MetaFrameMeta {
    /// Everything from the meta frame except the frame itself.
    pub fn from_meta(meta: &MetaFrame) -> MetaFrameMeta {
        MetaFrameMeta {
            action: meta.action,
            delay: (meta.delay > Duration::ZERO).then(|| meta.delay.as_millis() as u64),
            description: meta.description.clone(),
            override_out: meta.override_direction.map(Direction::is_out),
        }
    }
}

/// The frame portion of a trace line. `body` is absent for redacted lines
/// and for `Raw` frames, whose bytes ride in `raw` instead.
#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TraceFrame<'a> {
    header: &'a Header,
    #[serde(skip_serializing_if = "Option::is_none")]
    body: Option<&'a Body>,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "ser_opt_bytes")]
    raw: Option<bytes::Bytes>,
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct TraceLine<'a> {
    time: String,
    direction: Direction,
    #[serde(skip_serializing_if = "Option::is_none")]
    entity_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    connection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    receiver: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    link_name: Option<String>,
    frame_type: BodyType,
    frame: TraceFrame<'a>,
    #[serde(skip_serializing_if = "MessageData::is_empty")]
    message_data: MessageData,
    #[serde(skip_serializing_if = "Option::is_none")]
    metadata: Option<&'a MetaFrameMeta>,
}

/// Append-only structured trace over a [`LineWriter`].
///
/// Owns a private [`StateMap`] so the trace layer can resolve link identity
/// without depending on the mirror's map, plus the per-direction transfer
/// reassembly buffers.
#[derive(Debug)]
pub struct FrameTracer {
    writer: LineWriter,
    state: StateMap,
    transform: Mutex<TransferTransformer>,
}

impl FrameTracer {
    /// Open (or append to) the trace file at `path`. The file is shared
    /// across all connections of a proxy lifetime.
    pub fn create(path: &Path) -> std::io::Result<FrameTracer> {
        Ok(FrameTracer {
            writer: LineWriter::create(path)?,
            state: StateMap::new(),
            transform: Mutex::new(TransferTransformer::default()),
        })
    }

    /// Record one dispatched frame. Infallible by contract: internal errors
    /// are logged and swallowed so tracing can never abort a mirror.
    pub fn record(&self, direction: Direction, frame: &Frame, meta: Option<&MetaFrameMeta>) {
        if let Err(e) = self.try_record(direction, frame, meta) {
            tracing::warn!(error = %e, %direction, "failed to write trace line");
        }
    }

    fn try_record(
        &self,
        direction: Direction,
        frame: &Frame,
        meta: Option<&MetaFrameMeta>,
    ) -> Result<(), std::io::Error> {
        // The tracer's private map logs-and-continues on correlation faults;
        // the mirror's own map is the one that aborts the connection.
        if let Err(e) = self.state.record(direction, frame) {
            tracing::warn!(error = %e, "trace state map could not correlate frame");
        }

        let attach = self.line_attach(direction, frame);
        let entity_path = attach
            .as_ref()
            .and_then(|a| a.address(direction))
            .map(|s| s.to_string());
        let receiver = attach.as_ref().map(|a| {
            let receiver = a.body.role.is_receiver();
            // Inbound frames report the client's perceived role: the remote
            // end of the link is the mirror of the local one.
            match direction {
                Direction::Out => receiver,
                Direction::In => !receiver,
            }
        });
        let link_name = attach.map(|a| a.body.name);

        let outcome = match &frame.body {
            Body::Transfer(transfer) => Some(self.transform.lock().expect("transform lock").apply(
                direction,
                entity_path.as_deref(),
                transfer,
            )),
            _ => None,
        };
        let (omit_body, message_data) = match outcome {
            Some(o) => (o.omit_body, o.message_data),
            None => (false, MessageData::default()),
        };

        let raw_body = match &frame.body {
            Body::Raw(bytes) => Some(bytes.clone()),
            _ => None,
        };
        let body = if omit_body || raw_body.is_some() {
            None
        } else {
            Some(&frame.body)
        };

        let line = TraceLine {
            time: Utc::now().to_rfc3339_opts(SecondsFormat::Nanos, true),
            direction,
            entity_path,
            connection: self
                .state
                .open_frame(Direction::Out)
                .map(|o| o.body.container_id),
            receiver,
            link_name,
            frame_type: frame.body_type(),
            frame: TraceFrame {
                header: &frame.header,
                body,
                raw: raw_body,
            },
            message_data,
            metadata: meta,
        };

        let json = serde_json::to_vec(&line)?;
        self.writer.write_line(&json)
    }

    /// The ATTACH describing this frame's link: the frame itself when it is
    /// an ATTACH, otherwise this side's state map entry for its handle.
    fn line_attach(&self, direction: Direction, frame: &Frame) -> Option<AttachInfo> {
        if let Body::Attach(attach) = &frame.body {
            return Some(AttachInfo {
                channel: frame.header.channel,
                body: attach.clone(),
            });
        }
        let handle = frame.body.handle()?;
        self.state
            .attach_for(direction, frame.header.channel, handle)
    }
}
