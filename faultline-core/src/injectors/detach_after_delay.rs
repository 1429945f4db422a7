//! Detach every link a fixed delay after it is attached.
//!
//! When the client sends an ATTACH, a DETACH for the same `(channel,
//! handle)` is scheduled toward the service. To the service it looks like
//! the client asked to detach; when the service's DETACH reply comes back
//! it is modified to carry the configured error, so to the client it looks
//! like the service force-detached the link.

use std::time::Duration;

use async_trait::async_trait;

use crate::codec::body::{AmqpError, Body, Detach};
use crate::codec::Frame;
use crate::error::InjectorError;
use crate::injector::{FrameContext, Injector, MetaFrame, Verdict};
use crate::Direction;

pub struct DetachAfterDelay {
    detach_after: Duration,
    detach_error: Option<AmqpError>,
}

impl DetachAfterDelay {
    /// `detach_after` must be non-zero; an immediate detach would race the
    /// service's ATTACH reply.
    pub fn new(detach_after: Duration, detach_error: Option<AmqpError>) -> DetachAfterDelay {
        assert!(
            !detach_after.is_zero(),
            "detach_after cannot be zero"
        );
        DetachAfterDelay {
            detach_after,
            detach_error,
        }
    }

    fn outbound(&self, cx: FrameContext) -> Verdict {
        let Body::Attach(attach) = &cx.frame.body else {
            return Verdict::forward(vec![MetaFrame::passthrough(cx.into_frame())]);
        };

        tracing::info!(
            entity = cx.address().as_deref().unwrap_or(""),
            delay_ms = self.detach_after.as_millis() as u64,
            "scheduling delayed detach"
        );

        let detach = Frame::new(
            cx.channel(),
            Body::Detach(Detach {
                handle: attach.handle,
                closed: true,
                error: None,
            }),
        );

        Verdict::forward(vec![
            MetaFrame::passthrough(cx.into_frame()),
            MetaFrame::added(detach)
                .with_delay(self.detach_after)
                .with_description("detaching link after delay"),
        ])
    }

    fn inbound(&self, cx: FrameContext) -> Verdict {
        let Body::Detach(_) = &cx.frame.body else {
            return Verdict::forward(vec![MetaFrame::passthrough(cx.into_frame())]);
        };

        if let Some(attach) = cx
            .handle()
            .and_then(|h| cx.state.corresponding_attach(false, cx.channel(), h))
        {
            tracing::info!(
                entity = attach.address(Direction::In).unwrap_or(""),
                "enhancing detach reply from service"
            );
        }

        let mut frame = cx.into_frame();
        if let Body::Detach(detach) = &mut frame.body {
            detach.error = self.detach_error.clone();
        }
        Verdict::forward(vec![
            MetaFrame::modified(frame).with_description("adding configured detach error"),
        ])
    }
}

#[async_trait]
impl Injector for DetachAfterDelay {
    async fn on_frame(&self, cx: FrameContext) -> Result<Verdict, InjectorError> {
        Ok(match cx.direction {
            Direction::Out => self.outbound(cx),
            Direction::In => self.inbound(cx),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::codec::body::{Attach, Role, Source, Target};
    use crate::injector::Action;
    use crate::statemap::StateMap;

    fn context(direction: Direction, frame: Frame) -> FrameContext {
        FrameContext {
            direction,
            frame,
            state: Arc::new(StateMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    fn attach_frame() -> Frame {
        Frame::new(
            0,
            Body::Attach(Attach {
                name: "link-1".to_string(),
                handle: 4,
                role: Role::Sender,
                snd_settle_mode: None,
                rcv_settle_mode: None,
                source: Some(Source::default()),
                target: Some(Target {
                    address: Some("orders".to_string()),
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

    #[tokio::test]
    async fn test_attach_schedules_delayed_detach() {
        let injector = DetachAfterDelay::new(
            Duration::from_secs(2),
            Some(AmqpError::new("amqp:link:detach-forced", "test")),
        );
        let verdict = injector
            .on_frame(context(Direction::Out, attach_frame()))
            .await
            .unwrap();

        assert_eq!(verdict.frames.len(), 2);
        assert_eq!(verdict.frames[0].action, Action::Passthrough);

        let added = &verdict.frames[1];
        assert_eq!(added.action, Action::Added);
        assert_eq!(added.delay, Duration::from_secs(2));
        let Some(Body::Detach(detach)) = added.frame.as_ref().map(|f| &f.body) else {
            panic!("expected detach");
        };
        assert_eq!(detach.handle, 4);
        assert!(detach.closed);
        assert!(detach.error.is_none());
    }

    #[tokio::test]
    async fn test_inbound_detach_gains_error() {
        let injector = DetachAfterDelay::new(
            Duration::from_secs(2),
            Some(AmqpError::new("amqp:link:detach-forced", "forced")),
        );
        let detach = Frame::new(
            0,
            Body::Detach(Detach {
                handle: 9,
                closed: true,
                error: None,
            }),
        );
        let verdict = injector
            .on_frame(context(Direction::In, detach))
            .await
            .unwrap();

        assert_eq!(verdict.frames.len(), 1);
        assert_eq!(verdict.frames[0].action, Action::Modified);
        let Some(Body::Detach(detach)) = verdict.frames[0].frame.as_ref().map(|f| &f.body) else {
            panic!("expected detach");
        };
        assert_eq!(
            detach.error.as_ref().unwrap().condition,
            "amqp:link:detach-forced"
        );
    }

    #[tokio::test]
    async fn test_other_frames_pass_through() {
        let injector = DetachAfterDelay::new(Duration::from_secs(2), None);
        let verdict = injector
            .on_frame(context(Direction::Out, Frame::new(0, Body::Empty)))
            .await
            .unwrap();
        assert_eq!(verdict.frames.len(), 1);
        assert_eq!(verdict.frames[0].action, Action::Passthrough);
    }
}
