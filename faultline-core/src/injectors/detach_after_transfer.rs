//! Replace the first N outbound transfers with a link detach.
//!
//! Management and CBS links are exempt so authentication and RPC traffic
//! keep flowing. Each transfer frame counts, even fragments of one logical
//! message. The suppressed transfer is recorded as dropped; the fabricated
//! DETACH goes to the service, and the service's DETACH reply is modified
//! to carry the configured error on its way back to the client.

use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;

use crate::codec::body::{AmqpError, Body, Detach};
use crate::codec::Frame;
use crate::error::InjectorError;
use crate::injector::{FrameContext, Injector, MetaFrame, Verdict};
use crate::Direction;

pub struct DetachAfterTransfer {
    detaches_remaining: AtomicI64,
    error: AmqpError,
}

impl DetachAfterTransfer {
    pub fn new(times: i64, error: AmqpError) -> DetachAfterTransfer {
        DetachAfterTransfer {
            detaches_remaining: AtomicI64::new(times),
            error,
        }
    }

    fn outbound(&self, cx: FrameContext) -> Verdict {
        let Body::Transfer(transfer) = &cx.frame.body else {
            return Verdict::forward(vec![MetaFrame::passthrough(cx.into_frame())]);
        };

        if cx.is_management_or_cbs()
            || self.detaches_remaining.fetch_sub(1, Ordering::SeqCst) <= 0
        {
            return Verdict::forward(vec![MetaFrame::passthrough(cx.into_frame())]);
        }

        tracing::info!(
            address = cx.address().as_deref().unwrap_or(""),
            "replacing transfer with detach"
        );

        let detach = Frame::new(
            cx.channel(),
            Body::Detach(Detach {
                handle: transfer.handle,
                closed: true,
                error: None,
            }),
        );

        Verdict::forward(vec![
            MetaFrame::dropped(cx.into_frame()),
            MetaFrame::added(detach).with_description("detaching after transfer"),
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
            detach.error = Some(self.error.clone());
        }
        Verdict::forward(vec![
            MetaFrame::modified(frame).with_description("adding configured detach error"),
        ])
    }
}

#[async_trait]
impl Injector for DetachAfterTransfer {
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
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    use crate::codec::body::{Attach, Role, Source, Target, Transfer};
    use crate::injector::Action;
    use crate::statemap::StateMap;

    fn state_with_link(address: &str) -> Arc<StateMap> {
        let state = Arc::new(StateMap::new());
        let attach = Frame::new(
            0,
            Body::Attach(Attach {
                name: "link".to_string(),
                handle: 0,
                role: Role::Sender,
                snd_settle_mode: None,
                rcv_settle_mode: None,
                source: Some(Source::default()),
                target: Some(Target {
                    address: Some(address.to_string()),
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
        );
        state.record(Direction::Out, &attach).unwrap();
        state
    }

    fn transfer_context(state: Arc<StateMap>) -> FrameContext {
        FrameContext {
            direction: Direction::Out,
            frame: Frame::new(
                0,
                Body::Transfer(Transfer {
                    handle: 0,
                    payload: Bytes::from_static(b"x"),
                    ..Transfer::default()
                }),
            ),
            state,
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_first_n_transfers_replaced() {
        let injector = DetachAfterTransfer::new(2, AmqpError::new("amqp:link:detach-forced", ""));
        let state = state_with_link("orders");

        for _ in 0..2 {
            let verdict = injector
                .on_frame(transfer_context(state.clone()))
                .await
                .unwrap();
            assert_eq!(verdict.frames.len(), 2);
            assert_eq!(verdict.frames[0].action, Action::Dropped);
            assert_eq!(verdict.frames[1].action, Action::Added);
            assert!(matches!(
                verdict.frames[1].frame.as_ref().unwrap().body,
                Body::Detach(_)
            ));
        }

        // Third transfer passes.
        let verdict = injector
            .on_frame(transfer_context(state))
            .await
            .unwrap();
        assert_eq!(verdict.frames.len(), 1);
        assert_eq!(verdict.frames[0].action, Action::Passthrough);
    }

    #[tokio::test]
    async fn test_cbs_links_exempt() {
        let injector = DetachAfterTransfer::new(5, AmqpError::new("amqp:link:detach-forced", ""));
        let state = state_with_link("$cbs");

        let verdict = injector
            .on_frame(transfer_context(state))
            .await
            .unwrap();
        assert_eq!(verdict.frames.len(), 1);
        assert_eq!(verdict.frames[0].action, Action::Passthrough);
    }
}
