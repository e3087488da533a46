//! Dispatch of decoded messages to handlers.

use crate::delivery::HandlerResponse;
use crate::handlers::{Handler, HandlerError, MessageHandler};
use crate::session::{Session, SessionState};
use arena_protocol::{DecodedMessage, MessageType};
use derive_more::{Display, Error};
use std::collections::HashMap;
use tracing::{debug, instrument, warn};

/// A message could not be dispatched, or its handler failed.
#[derive(Debug, Display, Error)]
pub enum RouteError {
    /// The type tag is not a known type, or no handler is registered for it.
    #[display("Unknown message type: {_0}")]
    UnknownMessageType(#[error(not(source))] String),

    /// The session is in a state the handler does not accept.
    #[display("Invalid state {state} for {message_type}")]
    InvalidState {
        /// Session state at dispatch time.
        state: SessionState,
        /// Message type that was rejected.
        message_type: MessageType,
    },

    /// The handler ran and failed.
    #[display("{_0}")]
    Handler(HandlerError),
}

impl RouteError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            RouteError::UnknownMessageType(_) => "UNKNOWN_MESSAGE_TYPE",
            RouteError::InvalidState { .. } => "INVALID_STATE",
            RouteError::Handler(e) => e.code(),
        }
    }
}

impl From<HandlerError> for RouteError {
    fn from(err: HandlerError) -> Self {
        RouteError::Handler(err)
    }
}

/// Maps message types to handlers and enforces their state requirements.
#[derive(Debug, Default)]
pub struct MessageRouter {
    handlers: HashMap<MessageType, Handler>,
}

impl MessageRouter {
    /// Creates a router with no handlers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `message_type`, replacing any previous one.
    #[instrument(skip(self, handler))]
    pub fn register_handler(&mut self, message_type: MessageType, handler: impl Into<Handler>) {
        let handler = handler.into();
        if handler.message_type() != message_type {
            warn!(expected = %handler.message_type(), "Handler registered under a different type");
        }
        if self.handlers.insert(message_type, handler).is_some() {
            debug!("Replaced existing handler");
        }
    }

    /// Types with a registered handler.
    pub fn registered(&self) -> Vec<MessageType> {
        self.handlers.keys().copied().collect()
    }

    /// Dispatches `message` from `session`.
    ///
    /// `session` should be a fresh snapshot: the state check uses it as-is.
    #[instrument(skip(self, message, session), fields(session_id = %session.id(), message_type = %message.message_type))]
    pub fn route(
        &self,
        message: &DecodedMessage,
        session: &Session,
    ) -> Result<HandlerResponse, RouteError> {
        let (message_type, handler) = message
            .kind()
            .and_then(|kind| self.handlers.get(&kind).map(|h| (kind, h)))
            .ok_or_else(|| {
                warn!("No handler for message type");
                RouteError::UnknownMessageType(message.message_type.clone())
            })?;

        let required = handler.required_states();
        if !required.is_empty() && !required.contains(session.state()) {
            warn!(state = %session.state(), "Message not allowed in current state");
            return Err(RouteError::InvalidState {
                state: *session.state(),
                message_type,
            });
        }

        debug!("Dispatching");
        Ok(handler.handle(message, session.id())?)
    }
}
