//! Line framing: decode one frame, encode one frame.

use crate::envelope::{DecodedMessage, Envelope, PROTOCOL_VERSION, V1Payload};
use crate::error::CodecError;
use crate::message::MessageType;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt};
use tracing::{debug, instrument, trace};

/// Maximum accepted frame length in bytes, newline excluded. Protects the
/// server from a client that never sends a newline.
pub const MAX_FRAME_LEN: usize = 64 * 1024;

/// Parses one frame (a single line, with or without its trailing newline).
///
/// A frame starting with `"` is treated as the legacy double encoding: a JSON
/// string holding base64 of the real envelope.
///
/// # Errors
///
/// [`CodecError::EmptyFrame`] for a blank line, [`CodecError::InvalidEncoding`]
/// for malformed JSON or base64 at any layer, [`CodecError::UnsupportedVersion`]
/// for any version other than `v1`, [`CodecError::MissingMessageType`] when the
/// `v1` payload carries no message type.
#[instrument(skip(line), fields(len = line.len()))]
pub fn decode_frame(line: &[u8]) -> Result<DecodedMessage, CodecError> {
    let line = line.trim_ascii();
    if line.is_empty() {
        return Err(CodecError::EmptyFrame);
    }

    let unwrapped;
    let body = if line[0] == b'"' {
        let encoded: String = serde_json::from_slice(line)?;
        unwrapped = STANDARD.decode(encoded.trim())?;
        trace!(len = unwrapped.len(), "Unwrapped legacy base64 frame");
        unwrapped.as_slice()
    } else {
        line
    };

    let envelope: Envelope = serde_json::from_slice(body)?;
    if envelope.version != PROTOCOL_VERSION {
        return Err(CodecError::UnsupportedVersion(envelope.version));
    }

    let v1: V1Payload = if envelope.payload.is_null() {
        V1Payload {
            message_type: None,
            payload: serde_json::Value::Null,
        }
    } else {
        serde_json::from_value(envelope.payload)?
    };
    let message_type = v1
        .message_type
        .filter(|t| !t.is_empty())
        .ok_or(CodecError::MissingMessageType)?;

    debug!(message_id = %envelope.message_id, %message_type, "Decoded frame");
    Ok(DecodedMessage {
        message_id: envelope.message_id,
        version: envelope.version,
        message_type,
        payload: v1.payload,
        timestamp: envelope.timestamp,
    })
}

/// Wraps `message_type` and `payload` in a fresh `v1` envelope and returns the
/// newline-terminated frame.
///
/// # Errors
///
/// Returns [`CodecError::InvalidEncoding`] if the payload cannot be serialized.
#[instrument(skip(payload))]
pub fn encode<P: Serialize>(message_type: MessageType, payload: &P) -> Result<Vec<u8>, CodecError> {
    let envelope = Envelope::new_v1(message_type, serde_json::to_value(payload)?);
    let mut frame = serde_json::to_vec(&envelope)?;
    frame.push(b'\n');
    Ok(frame)
}

/// Re-encodes a frame in the legacy form: base64 of the JSON, as a JSON
/// string, newline-terminated.
pub fn wrap_legacy(frame: &[u8]) -> Vec<u8> {
    let encoded = STANDARD.encode(frame.trim_ascii());
    let mut wrapped = format!("\"{encoded}\"").into_bytes();
    wrapped.push(b'\n');
    wrapped
}

/// Reads newline-terminated frames from a buffered async stream.
#[derive(Debug)]
pub struct FrameDecoder<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameDecoder<R> {
    /// Creates a decoder over `reader`.
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
        }
    }

    /// Reads and decodes the next frame.
    ///
    /// Returns `Ok(None)` when the peer closed the stream cleanly. A final
    /// line without a trailing newline is still decoded.
    ///
    /// # Errors
    ///
    /// Any [`CodecError`]; check [`CodecError::is_fatal`] before reading again.
    pub async fn decode(&mut self) -> Result<Option<DecodedMessage>, CodecError> {
        self.buf.clear();
        let limit = (MAX_FRAME_LEN + 1) as u64;
        let read = (&mut self.reader)
            .take(limit)
            .read_until(b'\n', &mut self.buf)
            .await?;

        if read == 0 {
            return Ok(None);
        }
        if self.buf.last() != Some(&b'\n') && self.buf.len() > MAX_FRAME_LEN {
            return Err(CodecError::FrameTooLarge(MAX_FRAME_LEN));
        }

        decode_frame(&self.buf).map(Some)
    }

    /// Returns the underlying reader.
    pub fn into_inner(self) -> R {
        self.reader
    }
}
