//! Per-message-type request handlers.

mod heartbeat;
mod login;
mod player_move;

pub use heartbeat::HeartbeatHandler;
pub use login::LoginHandler;
pub use player_move::PlayerMoveHandler;

use crate::delivery::HandlerResponse;
use crate::game_session::MatchError;
use crate::matchmaking::QueueError;
use crate::session::{RegistryError, SessionId, SessionState};
use arena_protocol::{CodecError, DecodedMessage, MessageType};
use derive_more::{Display, Error};

/// Handles one message type.
pub trait MessageHandler {
    /// Processes `message` on behalf of `session_id`.
    fn handle(
        &self,
        message: &DecodedMessage,
        session_id: &SessionId,
    ) -> Result<HandlerResponse, HandlerError>;

    /// States a session must be in for this handler to run. Empty means any.
    fn required_states(&self) -> &'static [SessionState];
}

/// The registered handlers, one variant per inbound message type.
#[derive(Debug)]
pub enum Handler {
    /// `LOGIN_REQUEST`.
    Login(LoginHandler),
    /// `PLAYER_MOVE`.
    PlayerMove(PlayerMoveHandler),
    /// `HEARTBEAT`.
    Heartbeat(HeartbeatHandler),
}

impl Handler {
    /// The message type this handler answers.
    pub fn message_type(&self) -> MessageType {
        match self {
            Handler::Login(_) => MessageType::LoginRequest,
            Handler::PlayerMove(_) => MessageType::PlayerMove,
            Handler::Heartbeat(_) => MessageType::Heartbeat,
        }
    }
}

impl MessageHandler for Handler {
    fn handle(
        &self,
        message: &DecodedMessage,
        session_id: &SessionId,
    ) -> Result<HandlerResponse, HandlerError> {
        match self {
            Handler::Login(h) => h.handle(message, session_id),
            Handler::PlayerMove(h) => h.handle(message, session_id),
            Handler::Heartbeat(h) => h.handle(message, session_id),
        }
    }

    fn required_states(&self) -> &'static [SessionState] {
        match self {
            Handler::Login(h) => h.required_states(),
            Handler::PlayerMove(h) => h.required_states(),
            Handler::Heartbeat(h) => h.required_states(),
        }
    }
}

impl From<LoginHandler> for Handler {
    fn from(h: LoginHandler) -> Self {
        Handler::Login(h)
    }
}

impl From<PlayerMoveHandler> for Handler {
    fn from(h: PlayerMoveHandler) -> Self {
        Handler::PlayerMove(h)
    }
}

impl From<HeartbeatHandler> for Handler {
    fn from(h: HeartbeatHandler) -> Self {
        Handler::Heartbeat(h)
    }
}

/// A handler rejected a message.
#[derive(Debug, Display, Error)]
pub enum HandlerError {
    /// The body did not match the message type.
    #[display("Invalid payload: {_0}")]
    InvalidPayload(CodecError),

    /// The username is not registered.
    #[display("User not found: {_0}")]
    UserNotFound(#[error(not(source))] String),

    /// Session bookkeeping failed.
    #[display("{_0}")]
    Registry(RegistryError),

    /// Queueing failed.
    #[display("{_0}")]
    Queue(QueueError),

    /// The match rejected the request.
    #[display("{_0}")]
    Match(MatchError),
}

impl HandlerError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            HandlerError::InvalidPayload(_) => "INVALID_PAYLOAD",
            HandlerError::UserNotFound(_) => "USER_NOT_FOUND",
            HandlerError::Registry(e) => e.code(),
            HandlerError::Queue(e) => e.code(),
            HandlerError::Match(e) => e.code(),
        }
    }
}

impl From<CodecError> for HandlerError {
    fn from(err: CodecError) -> Self {
        HandlerError::InvalidPayload(err)
    }
}

impl From<RegistryError> for HandlerError {
    fn from(err: RegistryError) -> Self {
        HandlerError::Registry(err)
    }
}

impl From<QueueError> for HandlerError {
    fn from(err: QueueError) -> Self {
        HandlerError::Queue(err)
    }
}

impl From<MatchError> for HandlerError {
    fn from(err: MatchError) -> Self {
        HandlerError::Match(err)
    }
}
