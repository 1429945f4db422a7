//! Reference fault policies built on the injector contract.
//!
//! Each of these is a thin client of [`crate::injector`]: a few dozen lines
//! that inspect one frame and answer with meta frames. They double as the
//! worked examples for writing new policies.

mod detach_after_delay;
mod detach_after_transfer;
mod multi_transfer;
mod passthrough;
mod slow_transfers;

pub use detach_after_delay::DetachAfterDelay;
pub use detach_after_transfer::DetachAfterTransfer;
pub use multi_transfer::MultiTransfer;
pub use passthrough::Passthrough;
pub use slow_transfers::SlowTransfers;
