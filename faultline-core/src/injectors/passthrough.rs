//! Forward everything unchanged: the transparent AMQP proxy mode.
//!
//! Useful on its own for capturing a clean trace of real traffic, and as the
//! no-fault baseline in tests.

use async_trait::async_trait;

use crate::error::InjectorError;
use crate::injector::{FrameContext, Injector, MetaFrame, Verdict};

pub struct Passthrough;

#[async_trait]
impl Injector for Passthrough {
    async fn on_frame(&self, cx: FrameContext) -> Result<Verdict, InjectorError> {
        Ok(Verdict::forward(vec![MetaFrame::passthrough(
            cx.into_frame(),
        )]))
    }
}
