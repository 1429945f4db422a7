//! Bidirectional frame mirror.
//!
//! A [`MirrorConn`] owns one connection pair and runs two cooperative
//! direction tasks (client→server, server→client). Each parsed frame is
//! offered to the injector; the returned [`MetaFrame`]s are dispatched
//! (written through, re-encoded, dropped, delayed, or redirected) and every
//! dispatch is recorded in the trace.
//!
//! A fresh connection runs in two phases: an internal until-open phase
//! passes everything through until the first OPEN performative in either
//! direction, guaranteeing SASL negotiation completes before user fault
//! logic runs; then the user injector takes over on the same streams.

mod stream;

pub use stream::{FrameSink, FrameStream};

use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::sync::CancellationToken;

use crate::codec::{Body, StreamItem};
use crate::error::{InjectorError, MirrorError};
use crate::injector::{Action, Flow, FrameContext, Injector, MetaFrame, Verdict};
use crate::statemap::StateMap;
use crate::trace::{FrameTracer, MetaFrameMeta};
use crate::Direction;

/// Everything a dispatch needs, cloneable into delayed tasks.
#[derive(Clone)]
struct Shared {
    to_remote: FrameSink,
    to_local: FrameSink,
    state: Arc<StateMap>,
    tracer: Option<Arc<FrameTracer>>,
}

impl Shared {
    fn sink(&self, direction: Direction) -> &FrameSink {
        match direction {
            Direction::Out => &self.to_remote,
            Direction::In => &self.to_local,
        }
    }

    /// Trace, update the state map, and forward (or not) one meta frame.
    async fn dispatch(&self, input: Direction, meta_frame: MetaFrame) -> Result<(), MirrorError> {
        let meta = MetaFrameMeta::from_meta(&meta_frame);
        let Some(frame) = meta_frame.frame else {
            return Ok(());
        };

        if let Some(tracer) = &self.tracer {
            tracer.record(input, &frame, Some(&meta));
        }

        match meta_frame.action {
            Action::Dropped => Ok(()),
            Action::Passthrough => {
                self.state.record(input, &frame)?;
                // Byte-for-byte fidelity: re-emit the original wire bytes.
                // Fabricated frames have none and fall back to encoding.
                let bytes = if frame.raw().is_empty() {
                    frame.encode().map_err(|e| MirrorError::Codec {
                        direction: input,
                        source: e,
                    })?
                } else {
                    frame.raw().clone()
                };
                self.sink(input)
                    .write_bytes(&bytes)
                    .await
                    .map_err(|e| MirrorError::Io {
                        direction: input,
                        source: e,
                    })
            }
            Action::Modified | Action::Added => {
                let effective = meta_frame.override_direction.unwrap_or(input);
                self.state.record(effective, &frame)?;
                let bytes = frame.encode().map_err(|e| MirrorError::Codec {
                    direction: effective,
                    source: e,
                })?;
                self.sink(effective)
                    .write_bytes(&bytes)
                    .await
                    .map_err(|e| MirrorError::Io {
                        direction: effective,
                        source: e,
                    })
            }
        }
    }
}

/// One mirrored connection pair.
pub struct MirrorConn {
    local_rx: FrameStream,
    remote_rx: FrameStream,
    shared: Shared,
    cancel: CancellationToken,
}

impl MirrorConn {
    /// Wire up a mirror over the two byte streams of a connection pair.
    /// `local` is the accepted client socket, `remote` the upstream one.
    pub fn new<LR, LW, RR, RW>(
        local: (LR, LW),
        remote: (RR, RW),
        tracer: Option<Arc<FrameTracer>>,
        cancel: CancellationToken,
    ) -> MirrorConn
    where
        LR: AsyncRead + Send + Unpin + 'static,
        LW: AsyncWrite + Send + Unpin + 'static,
        RR: AsyncRead + Send + Unpin + 'static,
        RW: AsyncWrite + Send + Unpin + 'static,
    {
        let (local_read, local_write) = local;
        let (remote_read, remote_write) = remote;
        MirrorConn {
            local_rx: FrameStream::new(Direction::Out, local_read),
            remote_rx: FrameStream::new(Direction::In, remote_read),
            shared: Shared {
                to_remote: FrameSink::new(remote_write),
                to_local: FrameSink::new(local_write),
                state: Arc::new(StateMap::new()),
                tracer,
            },
            cancel,
        }
    }

    /// The connection's shared state map.
    pub fn state(&self) -> Arc<StateMap> {
        self.shared.state.clone()
    }

    /// Run the until-open phase, then the user injector, on the same
    /// streams. This is how the proxy frontend drives a fresh connection.
    pub async fn run_two_phase(
        &mut self,
        injector: Arc<dyn Injector>,
    ) -> Result<(), MirrorError> {
        self.run(Arc::new(UntilOpen)).await?;
        self.run(injector).await
    }

    /// Mirror both directions until each ends (EOF, end-of-stream verdict,
    /// cancellation, or error). Surfaces the first error after both have
    /// exited; a direction error cancels the connection so its peer does
    /// not linger.
    pub async fn run(&mut self, injector: Arc<dyn Injector>) -> Result<(), MirrorError> {
        let MirrorConn {
            local_rx,
            remote_rx,
            shared,
            cancel,
        } = self;
        // The direction tasks only need shared access to these; demoting
        // the borrows lets both async blocks capture them.
        let shared: &Shared = shared;
        let cancel: &CancellationToken = cancel;

        let out_task = async {
            let result =
                run_direction(Direction::Out, local_rx, shared, &injector, cancel).await;
            finish_direction(Direction::Out, &result, cancel);
            result
        };
        let in_task = async {
            let result =
                run_direction(Direction::In, remote_rx, shared, &injector, cancel).await;
            finish_direction(Direction::In, &result, cancel);
            result
        };

        let (out_result, in_result) = tokio::join!(out_task, in_task);
        out_result.and(in_result)
    }
}

fn finish_direction(
    direction: Direction,
    result: &Result<(), MirrorError>,
    cancel: &CancellationToken,
) {
    match result {
        Ok(()) => tracing::debug!(%direction, "direction finished"),
        Err(e) => {
            tracing::error!(%direction, error = %e, "direction aborted");
            // Tear the whole connection down; the healthy peer direction
            // would otherwise block on its socket indefinitely.
            cancel.cancel();
        }
    }
}

async fn run_direction(
    direction: Direction,
    source: &mut FrameStream,
    shared: &Shared,
    injector: &Arc<dyn Injector>,
    cancel: &CancellationToken,
) -> Result<(), MirrorError> {
    loop {
        let Some(item) = source.next(cancel).await? else {
            return Ok(());
        };

        match item {
            // Preambles bypass the injector and the trace entirely.
            StreamItem::Preamble(bytes) => {
                shared
                    .sink(direction)
                    .write_bytes(&bytes)
                    .await
                    .map_err(|e| MirrorError::Io {
                        direction,
                        source: e,
                    })?;
            }
            StreamItem::Frame(frame) => {
                let cx = FrameContext {
                    direction,
                    frame,
                    state: shared.state.clone(),
                    cancel: cancel.clone(),
                };
                let verdict = match injector.on_frame(cx).await {
                    Ok(verdict) => verdict,
                    Err(InjectorError::Cancelled) => {
                        tracing::debug!(%direction, "injector observed cancellation");
                        return Ok(());
                    }
                    Err(source) => {
                        return Err(MirrorError::Injector { direction, source });
                    }
                };

                for meta_frame in verdict.frames {
                    if meta_frame.delay.is_zero() {
                        shared.dispatch(direction, meta_frame).await?;
                    } else {
                        spawn_delayed(direction, meta_frame, shared.clone(), cancel.clone());
                    }
                }

                if verdict.flow == Flow::EndOfStream {
                    tracing::debug!(%direction, "injector signalled end of stream");
                    return Ok(());
                }
            }
        }
    }
}

/// Fire-and-forget delayed dispatch, tied to the connection's cancellation
/// so teardown drops pending frames. Ordering relative to frames arriving
/// in the meantime is explicitly not guaranteed.
fn spawn_delayed(
    direction: Direction,
    meta_frame: MetaFrame,
    shared: Shared,
    cancel: CancellationToken,
) {
    let delay = meta_frame.delay;
    tokio::spawn(async move {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!(%direction, "delayed frame dropped: connection closed");
            }
            _ = tokio::time::sleep(delay) => {
                if let Err(e) = shared.dispatch(direction, meta_frame).await {
                    tracing::error!(%direction, error = %e, "failed dispatching delayed frame");
                }
            }
        }
    });
}

/// Phase-one injector: pass everything through and stop at the first OPEN,
/// which still gets delivered. By the time this yields, SASL negotiation is
/// over and the logical connection exists.
struct UntilOpen;

#[async_trait]
impl Injector for UntilOpen {
    async fn on_frame(&self, cx: FrameContext) -> Result<Verdict, InjectorError> {
        let is_open = matches!(cx.frame.body, Body::Open(_));
        let frames = vec![MetaFrame::passthrough(cx.into_frame())];
        Ok(if is_open {
            Verdict::end(frames)
        } else {
            Verdict::forward(frames)
        })
    }
}
