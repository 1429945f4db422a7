//! Hold every inbound transfer for a fixed duration before passing it on.
//!
//! The sleep happens inside the callback, so ordering with respect to later
//! frames on the same direction is preserved (unlike the meta-frame delay,
//! which is fire-and-forget). Management and CBS links are exempt.

use std::time::Duration;

use async_trait::async_trait;

use crate::codec::body::Body;
use crate::codec::BodyType;
use crate::error::InjectorError;
use crate::injector::{FrameContext, Injector, MetaFrame, Verdict};

pub struct SlowTransfers {
    delay: Duration,
}

impl SlowTransfers {
    pub fn new(delay: Duration) -> SlowTransfers {
        SlowTransfers { delay }
    }
}

#[async_trait]
impl Injector for SlowTransfers {
    async fn on_frame(&self, cx: FrameContext) -> Result<Verdict, InjectorError> {
        if cx.direction.is_out()
            || cx.is_management_or_cbs()
            || cx.body_type() != BodyType::Transfer
        {
            return Ok(Verdict::forward(vec![MetaFrame::passthrough(
                cx.into_frame(),
            )]));
        }

        let (delivery_id, more) = match &cx.frame.body {
            Body::Transfer(t) => (t.delivery_id, t.more),
            _ => unreachable!("body type checked above"),
        };
        tracing::info!(?delivery_id, more, "holding transfer frame");

        tokio::select! {
            _ = cx.cancel.cancelled() => return Err(InjectorError::Cancelled),
            _ = tokio::time::sleep(self.delay) => {}
        }

        tracing::info!(?delivery_id, more, "releasing transfer frame");
        Ok(Verdict::forward(vec![MetaFrame::passthrough(
            cx.into_frame(),
        )]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;
    use bytes::Bytes;
    use tokio_util::sync::CancellationToken;

    use crate::codec::body::Transfer;
    use crate::codec::Frame;
    use crate::injector::Action;
    use crate::statemap::StateMap;
    use crate::Direction;

    fn transfer_context(direction: Direction, cancel: CancellationToken) -> FrameContext {
        FrameContext {
            direction,
            frame: Frame::new(
                0,
                Body::Transfer(Transfer {
                    handle: 0,
                    delivery_id: Some(1),
                    payload: Bytes::from_static(b"m"),
                    ..Transfer::default()
                }),
            ),
            state: Arc::new(StateMap::new()),
            cancel,
        }
    }

    #[tokio::test]
    async fn test_inbound_transfer_is_held() {
        tokio::time::pause();
        let injector = SlowTransfers::new(Duration::from_secs(10));
        let started = Instant::now();
        let fut = injector.on_frame(transfer_context(
            Direction::In,
            CancellationToken::new(),
        ));
        // Paused time auto-advances across the sleep.
        let verdict = fut.await.unwrap();
        assert_eq!(verdict.frames[0].action, Action::Passthrough);
        // Wall-clock stays near zero under paused time.
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_outbound_transfer_not_held() {
        let injector = SlowTransfers::new(Duration::from_secs(10));
        let verdict = injector
            .on_frame(transfer_context(Direction::Out, CancellationToken::new()))
            .await
            .unwrap();
        assert_eq!(verdict.frames[0].action, Action::Passthrough);
    }

    #[tokio::test]
    async fn test_cancellation_interrupts_hold() {
        let injector = SlowTransfers::new(Duration::from_secs(60));
        let cancel = CancellationToken::new();
        let c2 = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            c2.cancel();
        });

        let err = injector
            .on_frame(transfer_context(Direction::In, cancel))
            .await
            .unwrap_err();
        assert!(matches!(err, InjectorError::Cancelled));
    }
}
