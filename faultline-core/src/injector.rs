//! The injector contract: the narrow surface fault policies are written
//! against.
//!
//! An injector sees every parsed frame of a mirrored connection (after the
//! OPEN handshake) and answers with a list of [`MetaFrame`]s: pass it
//! through, modify it, drop it, add new frames, delay any of them, or route
//! them to the opposite stream. Simple policies like "drop the 4th
//! transfer" or "detach 2 seconds after attach" come out to a few dozen
//! lines.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::codec::body::{Attach, Body};
use crate::codec::{BodyType, Frame};
use crate::error::InjectorError;
use crate::statemap::{AttachInfo, StateMap};
use crate::Direction;

/// Entity path suffix of management links.
pub const MANAGEMENT_SUFFIX: &str = "$management";
/// Entity path of the claims-based-security endpoint.
pub const CBS_ENTITY_PATH: &str = "$cbs";

/// What the mirror should do with one frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    /// Forward the original raw bytes unchanged.
    Passthrough,
    /// Re-encode the (altered) typed body and forward that.
    Modified,
    /// A frame fabricated by the injector; encode and forward.
    Added,
    /// Record in the trace only; forward nothing.
    Dropped,
}

/// An injector decision about a single frame.
#[derive(Debug, Clone)]
pub struct MetaFrame {
    pub action: Action,
    /// The frame payload. Kept for `Dropped` so the trace still shows what
    /// was suppressed; the mirror never forwards it.
    pub frame: Option<Frame>,
    /// Dispatch after this duration; zero means immediately. Best-effort:
    /// a delayed frame may interleave with later traffic.
    pub delay: Duration,
    /// Route to this direction instead of the input frame's.
    pub override_direction: Option<Direction>,
    /// Free-form note recorded in the trace.
    pub description: Option<String>,
}

impl MetaFrame {
    pub fn passthrough(frame: Frame) -> MetaFrame {
        MetaFrame::with_action(Action::Passthrough, frame)
    }

    pub fn modified(frame: Frame) -> MetaFrame {
        MetaFrame::with_action(Action::Modified, frame)
    }

    pub fn added(frame: Frame) -> MetaFrame {
        MetaFrame::with_action(Action::Added, frame)
    }

    pub fn dropped(frame: Frame) -> MetaFrame {
        MetaFrame::with_action(Action::Dropped, frame)
    }

    fn with_action(action: Action, frame: Frame) -> MetaFrame {
        MetaFrame {
            action,
            frame: Some(frame),
            delay: Duration::ZERO,
            override_direction: None,
            description: None,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> MetaFrame {
        self.delay = delay;
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> MetaFrame {
        self.description = Some(description.into());
        self
    }

    pub fn redirect(mut self, direction: Direction) -> MetaFrame {
        self.override_direction = Some(direction);
        self
    }
}

/// Whether the direction keeps flowing after this callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Graceful end: the returned frames are still dispatched, then the
    /// direction stops reading.
    EndOfStream,
}

/// An injector's full answer for one frame.
#[derive(Debug)]
pub struct Verdict {
    pub frames: Vec<MetaFrame>,
    pub flow: Flow,
}

impl Verdict {
    /// Keep mirroring after dispatching `frames`.
    pub fn forward(frames: Vec<MetaFrame>) -> Verdict {
        Verdict {
            frames,
            flow: Flow::Continue,
        }
    }

    /// Dispatch `frames`, then end this direction.
    pub fn end(frames: Vec<MetaFrame>) -> Verdict {
        Verdict {
            frames,
            flow: Flow::EndOfStream,
        }
    }
}

/// Everything an injector gets to see for one frame.
///
/// Owns the frame: the injector consumes it into whichever [`MetaFrame`]s it
/// returns. The convenience accessors answer "which link, which entity,
/// which role" through the shared [`StateMap`].
pub struct FrameContext {
    pub direction: Direction,
    pub frame: Frame,
    pub state: Arc<StateMap>,
    /// Fires when the connection is being torn down. Injectors that suspend
    /// (delays, backpressure) should select against it.
    pub cancel: CancellationToken,
}

impl FrameContext {
    pub fn channel(&self) -> u16 {
        self.frame.header.channel
    }

    /// The link handle, if this frame body carries one.
    pub fn handle(&self) -> Option<u32> {
        self.frame.body.handle()
    }

    pub fn body_type(&self) -> BodyType {
        self.frame.body_type()
    }

    /// The ATTACH governing this frame's link: the frame itself when it is
    /// an ATTACH, otherwise the state map entry for this side.
    pub fn attach(&self) -> Option<AttachInfo> {
        if let Body::Attach(attach) = &self.frame.body {
            return Some(AttachInfo {
                channel: self.channel(),
                body: attach.clone(),
            });
        }
        let handle = self.handle()?;
        self.state.attach_for(self.direction, self.channel(), handle)
    }

    /// The entity address of this frame's link, if it is a link frame.
    pub fn address(&self) -> Option<String> {
        self.attach()?
            .address(self.direction)
            .map(|s| s.to_string())
    }

    /// The link's role. For inbound frames this is the remote end's role,
    /// i.e. the inverse of the local link's.
    pub fn role(&self) -> Option<crate::codec::Role> {
        self.attach().map(|a| a.body.role)
    }

    /// True when the link is bound to the `$management` or `$cbs` endpoints.
    /// Policies usually leave those alone so that auth and RPC keep working.
    pub fn is_management_or_cbs(&self) -> bool {
        match self.address() {
            Some(address) => {
                address == CBS_ENTITY_PATH || address.ends_with(MANAGEMENT_SUFFIX)
            }
            None => false,
        }
    }

    /// Consume the context, keeping only the frame.
    pub fn into_frame(self) -> Frame {
        self.frame
    }

    /// A clone of the typed ATTACH body, for policies that fabricate frames
    /// addressed to the same link.
    pub fn attach_body(&self) -> Option<Attach> {
        self.attach().map(|a| a.body)
    }
}

/// A fault policy. One connection's direction tasks share one injector
/// value, so implementations hold their mutable state in atomics or locks.
#[async_trait]
pub trait Injector: Send + Sync {
    /// Decide what to do with one frame.
    ///
    /// # Errors
    ///
    /// [`InjectorError::Cancelled`] ends the direction gracefully; any other
    /// error aborts it.
    async fn on_frame(&self, cx: FrameContext) -> Result<Verdict, InjectorError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::body::{Open, Role, Source, Target};

    fn context(direction: Direction, frame: Frame) -> FrameContext {
        FrameContext {
            direction,
            frame,
            state: Arc::new(StateMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn cbs_attach() -> Frame {
        Frame::new(
            0,
            Body::Attach(Attach {
                name: "cbs-sender".to_string(),
                handle: 0,
                role: Role::Sender,
                snd_settle_mode: None,
                rcv_settle_mode: None,
                source: Some(Source::default()),
                target: Some(Target {
                    address: Some("$cbs".to_string()),
                    ..Target::default()
                }),
                unsettled: None,
                incomplete_unsettled: false,
                initial_delivery_count: None,
                max_message_size: None,
                offered_capabilities: Vec::new(),
                desired_capabilities: Vec::new(),
                properties: None,
            }),
        )
    }

    #[test]
    fn test_attach_frame_is_its_own_attach() {
        let cx = context(Direction::Out, cbs_attach());
        assert_eq!(cx.address().as_deref(), Some("$cbs"));
        assert!(cx.is_management_or_cbs());
        assert_eq!(cx.role(), Some(Role::Sender));
    }

    #[test]
    fn test_non_link_frame_has_no_attach() {
        let cx = context(
            Direction::Out,
            Frame::new(
                0,
                Body::Open(Open {
                    container_id: "c".to_string(),
                    ..Open::default()
                }),
            ),
        );
        assert!(cx.handle().is_none());
        assert!(cx.attach().is_none());
        assert!(!cx.is_management_or_cbs());
    }

    #[test]
    fn test_management_suffix_matches() {
        let mut frame = cbs_attach();
        if let Body::Attach(a) = &mut frame.body {
            a.target = Some(Target {
                address: Some("eventhub-1/$management".to_string()),
                ..Target::default()
            });
        }
        let cx = context(Direction::Out, frame);
        assert!(cx.is_management_or_cbs());
    }

    #[test]
    fn test_metaframe_builders() {
        let mf = MetaFrame::added(Frame::new(1, Body::Empty))
            .with_delay(Duration::from_secs(2))
            .with_description("test")
            .redirect(Direction::In);
        assert_eq!(mf.action, Action::Added);
        assert_eq!(mf.delay, Duration::from_secs(2));
        assert_eq!(mf.override_direction, Some(Direction::In));
    }
}
