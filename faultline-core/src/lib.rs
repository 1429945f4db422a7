//! Faultline Core — frame-level AMQP 1.0 mirroring engine.
//!
//! This library provides everything between the two TLS sockets of a mirrored
//! connection: the streaming frame codec, the bidirectional mirror with the
//! injector callback contract, the link state map that correlates the two
//! endpoints of every AMQP link, and the structured trace writer with
//! credential redaction.
//!
//! The proxy frontend (TLS listener, certificate generation, CLI) lives in
//! the `faultline` binary crate and is a thin client of this library.

use serde::{Deserialize, Serialize};

pub mod codec;
pub mod error;
pub mod injector;
pub mod injectors;
pub mod mirror;
pub mod statemap;
pub mod trace;

// ─────────────────────────────────────────────────────────────────────────────
// Shared Transport Types
// ─────────────────────────────────────────────────────────────────────────────

/// Direction of a frame relative to the proxied client.
///
/// `Out` is client→server traffic (the proxy writes it to the remote socket),
/// `In` is server→client traffic. Both the mirror and the trace writer key
/// their per-direction state on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// Client → server.
    Out,
    /// Server → client.
    In,
}

impl Direction {
    /// The opposite direction.
    pub fn flip(self) -> Direction {
        match self {
            Direction::Out => Direction::In,
            Direction::In => Direction::Out,
        }
    }

    /// True for client→server traffic.
    pub fn is_out(self) -> bool {
        matches!(self, Direction::Out)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Direction::Out => f.write_str("out"),
            Direction::In => f.write_str("in"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_flip() {
        assert_eq!(Direction::Out.flip(), Direction::In);
        assert_eq!(Direction::In.flip(), Direction::Out);
    }

    #[test]
    fn test_direction_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Direction::Out).unwrap(), "\"out\"");
        assert_eq!(serde_json::to_string(&Direction::In).unwrap(), "\"in\"");
    }
}
