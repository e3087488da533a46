//! Wire protocol for the tic-tac-toe arena.
//!
//! Every message is one line of JSON terminated by `\n`:
//!
//! ```text
//! { "message_id": "msg-…", "version": "v1", "timestamp": 1700000000000,
//!   "payload": { "message_type": "PLAYER_MOVE", "payload": { "position": 4, "symbol": "X" } } }
//! ```
//!
//! Legacy clients may instead send the same JSON base64-encoded inside a JSON
//! string (`"eyJtZXNzYWdlX2lkIjo…"`). Decoding accepts both forms; encoding
//! always produces the plain form.
//!
//! - [`decode_frame`] parses one already-read line.
//! - [`FrameDecoder`] reads lines from an async stream and reports a clean
//!   end-of-stream as `Ok(None)`.
//! - [`encode`] wraps a message type and payload in a fresh `v1` envelope.

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod codec;
mod envelope;
mod error;
mod message;

pub use codec::{FrameDecoder, MAX_FRAME_LEN, decode_frame, encode, wrap_legacy};
pub use envelope::{DecodedMessage, Envelope, PROTOCOL_VERSION, V1Payload};
pub use error::CodecError;
pub use message::{
    ErrorPayload, GameEndPayload, GameResult, GameStartPayload, LoginRequestPayload,
    LoginResponsePayload, MessageType, PlayerMovePayload, PlayerMoveResponsePayload,
    WaitingForOpponentPayload,
};
