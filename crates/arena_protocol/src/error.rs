//! Codec error types.

use derive_more::{Display, Error};

/// Failure to read or interpret one frame.
///
/// Only [`CodecError::Io`] and [`CodecError::FrameTooLarge`] leave the stream
/// in an unusable state; every other variant describes a single bad line and
/// the caller may keep reading.
#[derive(Debug, Display, Error)]
pub enum CodecError {
    /// The line was blank.
    #[display("Empty message")]
    EmptyFrame,

    /// JSON or base64 was malformed at some layer.
    #[display("Invalid encoding: {_0}")]
    InvalidEncoding(#[error(not(source))] String),

    /// The envelope named a protocol version other than `v1`.
    #[display("Unsupported version: {_0:?}")]
    UnsupportedVersion(#[error(not(source))] String),

    /// The `v1` payload had no `message_type`.
    #[display("message_type is required")]
    MissingMessageType,

    /// The line exceeded the frame size limit before a newline was seen.
    #[display("Frame exceeds {_0} bytes")]
    FrameTooLarge(#[error(not(source))] usize),

    /// The underlying stream failed.
    #[display("Failed to read message: {_0}")]
    Io(std::io::Error),
}

impl CodecError {
    /// True when the stream can no longer be read from.
    pub fn is_fatal(&self) -> bool {
        matches!(self, CodecError::Io(_) | CodecError::FrameTooLarge(_))
    }
}

impl From<std::io::Error> for CodecError {
    fn from(err: std::io::Error) -> Self {
        CodecError::Io(err)
    }
}

impl From<serde_json::Error> for CodecError {
    fn from(err: serde_json::Error) -> Self {
        CodecError::InvalidEncoding(err.to_string())
    }
}

impl From<base64::DecodeError> for CodecError {
    fn from(err: base64::DecodeError) -> Self {
        CodecError::InvalidEncoding(format!("base64: {err}"))
    }
}
