//! The versioned envelope around every message.

use crate::error::CodecError;
use crate::message::MessageType;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The only protocol version this server speaks.
pub const PROTOCOL_VERSION: &str = "v1";

/// Outer wrapper of every wire message.
///
/// All fields default when absent so that a missing `version` is reported as
/// an unsupported version rather than as malformed JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Sender-assigned message id.
    #[serde(default)]
    pub message_id: String,
    /// Protocol version discriminator.
    #[serde(default)]
    pub version: String,
    /// Milliseconds since the Unix epoch.
    #[serde(default)]
    pub timestamp: i64,
    /// Version-specific payload.
    #[serde(default)]
    pub payload: Value,
}

impl Envelope {
    /// Builds a `v1` envelope with a fresh message id and the current time.
    pub fn new_v1(message_type: MessageType, payload: Value) -> Self {
        Self {
            message_id: format!("msg-{}", uuid::Uuid::new_v4()),
            version: PROTOCOL_VERSION.to_string(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            payload: serde_json::json!({
                "message_type": message_type,
                "payload": payload,
            }),
        }
    }
}

/// The `v1` payload: a message type plus the type-specific body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct V1Payload {
    /// Message type discriminator.
    #[serde(default)]
    pub message_type: Option<String>,
    /// Type-specific body.
    #[serde(default)]
    pub payload: Value,
}

/// One inbound message after envelope and version handling.
///
/// The message type is kept as the raw tag so that routing, not decoding,
/// decides what an unrecognised type means.
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedMessage {
    /// Sender-assigned message id.
    pub message_id: String,
    /// Protocol version (always `v1` once decoded).
    pub version: String,
    /// Raw message type tag.
    pub message_type: String,
    /// Type-specific body.
    pub payload: Value,
    /// Milliseconds since the Unix epoch, as sent.
    pub timestamp: i64,
}

impl DecodedMessage {
    /// The message type, if it is one this protocol defines.
    pub fn kind(&self) -> Option<MessageType> {
        self.message_type.parse().ok()
    }

    /// Deserializes the type-specific body.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::InvalidEncoding`] when the body does not match `T`.
    pub fn payload_as<T: DeserializeOwned>(&self) -> Result<T, CodecError> {
        Ok(T::deserialize(&self.payload)?)
    }
}
