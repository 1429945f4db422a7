//! Shatter inbound transfers into one frame per payload byte.
//!
//! Exercises client-side reassembly: the original transfer is dropped and
//! replaced with a chain of single-byte transfers, `more` set on all but the
//! last. Management and CBS links are exempt.

use async_trait::async_trait;
use bytes::Bytes;

use crate::codec::body::{Body, Transfer};
use crate::codec::Frame;
use crate::error::InjectorError;
use crate::injector::{FrameContext, Injector, MetaFrame, Verdict};

pub struct MultiTransfer;

#[async_trait]
impl Injector for MultiTransfer {
    async fn on_frame(&self, cx: FrameContext) -> Result<Verdict, InjectorError> {
        let is_candidate = !cx.direction.is_out()
            && !cx.is_management_or_cbs()
            && matches!(cx.frame.body, Body::Transfer(_));
        if !is_candidate {
            return Ok(Verdict::forward(vec![MetaFrame::passthrough(
                cx.into_frame(),
            )]));
        }

        let channel = cx.channel();
        let frame = cx.into_frame();
        let Body::Transfer(transfer) = &frame.body else {
            unreachable!("candidate check matched a transfer");
        };

        let total = transfer.payload.len();
        let mut frames = Vec::with_capacity(total + 1);
        for (i, byte) in transfer.payload.iter().enumerate() {
            let fragment = Transfer {
                payload: Bytes::copy_from_slice(&[*byte]),
                more: i != total - 1,
                ..transfer.clone()
            };
            frames.push(
                MetaFrame::added(Frame::new(channel, Body::Transfer(fragment)))
                    .with_description(format!("fragment {} of {}", i + 1, total)),
            );
        }

        // Replaced, not forwarded; an empty-payload transfer just passes.
        if frames.is_empty() {
            return Ok(Verdict::forward(vec![MetaFrame::passthrough(frame)]));
        }
        Ok(Verdict::forward(frames))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    use crate::injector::Action;
    use crate::statemap::StateMap;
    use crate::Direction;

    fn transfer_context(payload: &'static [u8]) -> FrameContext {
        FrameContext {
            direction: Direction::In,
            frame: Frame::new(
                0,
                Body::Transfer(Transfer {
                    handle: 0,
                    payload: Bytes::from_static(payload),
                    ..Transfer::default()
                }),
            ),
            state: Arc::new(StateMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    #[tokio::test]
    async fn test_payload_split_per_byte() {
        let verdict = MultiTransfer
            .on_frame(transfer_context(b"abc"))
            .await
            .unwrap();

        assert_eq!(verdict.frames.len(), 3);
        for (i, mf) in verdict.frames.iter().enumerate() {
            assert_eq!(mf.action, Action::Added);
            let Some(Body::Transfer(t)) = mf.frame.as_ref().map(|f| &f.body) else {
                panic!("expected transfer fragment");
            };
            assert_eq!(&t.payload[..], &b"abc"[i..=i]);
            assert_eq!(t.more, i != 2);
        }
    }

    #[tokio::test]
    async fn test_empty_payload_passes_through() {
        let verdict = MultiTransfer
            .on_frame(transfer_context(b""))
            .await
            .unwrap();
        assert_eq!(verdict.frames.len(), 1);
        assert_eq!(verdict.frames[0].action, Action::Passthrough);
    }
}
