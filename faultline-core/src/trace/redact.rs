//! Transfer payload reassembly and credential redaction.
//!
//! Two rules keep bearer tokens out of the trace file:
//!
//! - An outbound transfer to `$cbs` is a put-token call; its payload value
//!   is the token. The frame body is omitted entirely and only the message's
//!   application properties survive, under `MessageData.CBSData`.
//! - An outbound transfer to a `$management` link whose message carries a
//!   `security_token` application property has that one value replaced with
//!   `<redacted>`, and the encoded frame body (which still contains the
//!   token) is omitted.
//!
//! Multi-frame transfers (`more=true`) are buffered per direction until the
//! final fragment, then the concatenation is decoded as one message.

use serde::Serialize;

use crate::codec::body::Transfer;
use crate::codec::message::{ApplicationProperties, Message};
use crate::codec::value::Value;
use crate::injector::{CBS_ENTITY_PATH, MANAGEMENT_SUFFIX};
use crate::Direction;

/// Application property checked on `$management` traffic.
const SECURITY_TOKEN_PROPERTY: &str = "security_token";

/// The decoded-payload side channel of a trace line.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MessageData {
    #[serde(rename = "CBSData", skip_serializing_if = "Option::is_none")]
    pub cbs_data: Option<CbsData>,
    #[serde(rename = "Message", skip_serializing_if = "Option::is_none")]
    pub message: Option<Message>,
}

impl MessageData {
    pub fn is_empty(&self) -> bool {
        self.cbs_data.is_none() && self.message.is_none()
    }
}

/// What survives of a put-token call: the application properties carry the
/// operation name and audience but not the token itself.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct CbsData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub application_properties: Option<ApplicationProperties>,
}

/// Result of running one transfer through the transformer.
#[derive(Debug, Default)]
pub(super) struct TransferOutcome {
    /// When set, the frame body must not appear in the trace line.
    pub omit_body: bool,
    pub message_data: MessageData,
}

/// Per-connection reassembly state. Strictly per-direction; the caller
/// serializes access.
#[derive(Debug, Default)]
pub(super) struct TransferTransformer {
    pending_out: Vec<u8>,
    pending_in: Vec<u8>,
}

impl TransferTransformer {
    fn pending(&mut self, direction: Direction) -> &mut Vec<u8> {
        match direction {
            Direction::Out => &mut self.pending_out,
            Direction::In => &mut self.pending_in,
        }
    }

    pub(super) fn apply(
        &mut self,
        direction: Direction,
        entity_path: Option<&str>,
        transfer: &Transfer,
    ) -> TransferOutcome {
        if transfer.more {
            // Mid-message fragment: buffer and log the frame as-is. The
            // payload cannot be decoded until the final fragment arrives.
            self.pending(direction).extend_from_slice(&transfer.payload);
            return TransferOutcome::default();
        }

        let pending = self.pending(direction);
        let payload: Vec<u8> = if pending.is_empty() {
            transfer.payload.to_vec()
        } else {
            let mut assembled = std::mem::take(pending);
            assembled.extend_from_slice(&transfer.payload);
            assembled
        };

        let mut message = match Message::decode(&payload) {
            Ok(msg) => Some(msg),
            Err(e) => {
                // Batch envelopes and foreign formats land here; the frame
                // is still traced, just without a decoded message.
                tracing::warn!(error = %e, "failed to decode transfer payload");
                None
            }
        };

        let outbound = direction == Direction::Out;
        match entity_path {
            Some(CBS_ENTITY_PATH) if outbound => TransferOutcome {
                omit_body: true,
                message_data: MessageData {
                    cbs_data: Some(CbsData {
                        application_properties: message
                            .and_then(|m| m.application_properties),
                    }),
                    message: None,
                },
            },
            Some(path)
                if outbound
                    && path.ends_with(MANAGEMENT_SUFFIX)
                    && has_security_token(message.as_ref()) =>
            {
                if let Some(msg) = message.as_mut() {
                    if let Some(props) = msg.application_properties.as_mut() {
                        props.set(
                            SECURITY_TOKEN_PROPERTY,
                            Value::String("<redacted>".to_string()),
                        );
                    }
                }
                TransferOutcome {
                    omit_body: true,
                    message_data: MessageData {
                        cbs_data: None,
                        message,
                    },
                }
            }
            _ => TransferOutcome {
                omit_body: false,
                message_data: MessageData {
                    cbs_data: None,
                    message,
                },
            },
        }
    }
}

fn has_security_token(message: Option<&Message>) -> bool {
    message
        .and_then(|m| m.application_properties.as_ref())
        .and_then(|p| p.get(SECURITY_TOKEN_PROPERTY))
        .is_some_and(|v| !matches!(v, Value::Null))
}
