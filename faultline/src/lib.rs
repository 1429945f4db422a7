//! Faultline — man-in-the-middle AMQP 1.0 fault-injection proxy.
//!
//! The binary crate: TLS listener frontend, certificate plumbing, and the
//! CLI that picks one of the built-in fault policies. The frame engine
//! itself (codec, mirror, state map, trace writer, injector contract) lives
//! in `faultline-core`.

pub mod cli;
pub mod error;
pub mod proxy;
pub mod tls;
