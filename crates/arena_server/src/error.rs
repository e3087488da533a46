//! Top-level error type and wire error codes.

use crate::config::ConfigError;
use crate::delivery::DeliveryError;
use crate::game_session::MatchError;
use crate::handlers::HandlerError;
use crate::matchmaking::QueueError;
use crate::router::RouteError;
use crate::session::RegistryError;
use arena_protocol::CodecError;
use derive_more::{Display, Error, From};

/// Any failure the server reports to a client or logs.
#[derive(Debug, Display, Error, From)]
pub enum ServerError {
    /// A frame could not be decoded.
    #[display("{_0}")]
    Codec(CodecError),
    /// A message could not be routed.
    #[display("{_0}")]
    Route(RouteError),
    /// A handler rejected a message.
    #[display("{_0}")]
    Handler(HandlerError),
    /// Session bookkeeping failed.
    #[display("{_0}")]
    Registry(RegistryError),
    /// A match operation failed.
    #[display("{_0}")]
    Match(MatchError),
    /// A queue operation failed.
    #[display("{_0}")]
    Queue(QueueError),
    /// A response could not be written.
    #[display("{_0}")]
    Delivery(DeliveryError),
    /// Configuration was invalid.
    #[display("{_0}")]
    Config(ConfigError),
    /// Socket setup failed.
    #[display("I/O error: {_0}")]
    Io(std::io::Error),
}

impl ServerError {
    /// Stable `SCREAMING_SNAKE_CASE` code sent in `ERROR` payloads.
    pub fn code(&self) -> &'static str {
        match self {
            ServerError::Codec(e) => codec_code(e),
            ServerError::Route(e) => e.code(),
            ServerError::Handler(e) => e.code(),
            ServerError::Registry(e) => e.code(),
            ServerError::Match(e) => e.code(),
            ServerError::Queue(e) => e.code(),
            ServerError::Delivery(_) => "DELIVERY_FAILED",
            ServerError::Config(_) => "CONFIG_ERROR",
            ServerError::Io(_) => "IO_ERROR",
        }
    }
}

/// Wire code for a decoding failure.
pub fn codec_code(err: &CodecError) -> &'static str {
    match err {
        CodecError::EmptyFrame => "EMPTY_MESSAGE",
        CodecError::InvalidEncoding(_) => "INVALID_ENCODING",
        CodecError::UnsupportedVersion(_) => "UNSUPPORTED_VERSION",
        CodecError::MissingMessageType => "MISSING_MESSAGE_TYPE",
        CodecError::FrameTooLarge(_) => "FRAME_TOO_LARGE",
        CodecError::Io(_) => "IO_ERROR",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arena_tictactoe::{Mark, MoveError};

    #[test]
    fn test_codes_reach_the_leaf_error() {
        let cases: Vec<(ServerError, &str)> = vec![
            (CodecError::UnsupportedVersion("v2".into()).into(), "UNSUPPORTED_VERSION"),
            (CodecError::InvalidEncoding("x".into()).into(), "INVALID_ENCODING"),
            (MatchError::Move(MoveError::NotYourTurn(Mark::X)).into(), "NOT_YOUR_TURN"),
            (MatchError::Move(MoveError::CellOccupied(4)).into(), "CELL_OCCUPIED"),
            (MatchError::GameAlreadyOver.into(), "GAME_ALREADY_OVER"),
            (MatchError::PlayerNotInMatch.into(), "PLAYER_NOT_IN_MATCH"),
            (RegistryError::UsernameInUse("narik".into()).into(), "USERNAME_IN_USE"),
            (QueueError::AlreadyQueued("s".into()).into(), "ALREADY_QUEUED"),
            (RouteError::UnknownMessageType("NOPE".into()).into(), "UNKNOWN_MESSAGE_TYPE"),
            (
                RouteError::Handler(HandlerError::UserNotFound("bob".into())).into(),
                "USER_NOT_FOUND",
            ),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn test_display_is_the_leaf_message() {
        let err: ServerError = MatchError::Move(MoveError::NotYourTurn(Mark::O)).into();
        assert_eq!(err.to_string(), "Not your turn, current turn: O");
    }
}
