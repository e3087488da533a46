//! Encoding handler responses and writing them to connections.

use crate::error::ServerError;
use crate::session::{Session, SessionId, SessionRegistry};
use arena_protocol::{CodecError, ErrorPayload, MessageType, encode};
use derive_more::{Display, Error};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// What a handler wants sent back.
#[derive(Debug, Clone, PartialEq)]
pub struct HandlerResponse {
    /// Outbound message type.
    pub message_type: MessageType,
    /// Outbound body.
    pub payload: Value,
    /// Send to `recipients` instead of the originating session.
    pub broadcast: bool,
    /// Recipients when `broadcast` is set.
    pub recipients: Vec<SessionId>,
}

impl HandlerResponse {
    /// A response for the originating session only.
    pub fn reply<P: Serialize>(message_type: MessageType, payload: &P) -> Result<Self, CodecError> {
        Ok(Self {
            message_type,
            payload: serde_json::to_value(payload)?,
            broadcast: false,
            recipients: Vec::new(),
        })
    }

    /// A response for every session in `recipients`.
    pub fn broadcast<P: Serialize>(
        message_type: MessageType,
        payload: &P,
        recipients: Vec<SessionId>,
    ) -> Result<Self, CodecError> {
        Ok(Self {
            message_type,
            payload: serde_json::to_value(payload)?,
            broadcast: true,
            recipients,
        })
    }
}

/// Failure to get a message onto a connection.
#[derive(Debug, Display, Error)]
pub enum DeliveryError {
    /// The message could not be encoded.
    #[display("Failed to encode message: {_0}")]
    Encoding(CodecError),

    /// The connection's writer is gone.
    #[display("Connection closed: {_0}")]
    ConnectionClosed(#[error(not(source))] String),

    /// The recipient session no longer exists.
    #[display("Unknown recipient: {_0}")]
    UnknownRecipient(#[error(not(source))] SessionId),

    /// Some broadcast recipients could not be reached.
    #[display("Broadcast reached {} of {} recipients", total - failed, total)]
    Partial {
        /// Recipients that failed.
        failed: usize,
        /// Recipients attempted.
        total: usize,
    },
}

impl From<CodecError> for DeliveryError {
    fn from(err: CodecError) -> Self {
        DeliveryError::Encoding(err)
    }
}

/// Writes responses, broadcasts and error reports to sessions.
#[derive(Debug)]
pub struct ResponseSender {
    sessions: Arc<SessionRegistry>,
}

impl ResponseSender {
    /// Creates a sender that resolves recipients through `sessions`.
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    /// Sends `response` to `session`.
    #[instrument(skip(self, session, response), fields(session_id = %session.id(), message_type = %response.message_type))]
    pub fn send(&self, session: &Session, response: &HandlerResponse) -> Result<(), DeliveryError> {
        let frame = encode(response.message_type, &response.payload)?;
        session.connection().send(frame)?;
        debug!("Response sent");
        Ok(())
    }

    /// Sends a typed payload to the session with id `session_id`.
    pub fn notify<P: Serialize>(
        &self,
        session_id: &str,
        message_type: MessageType,
        payload: &P,
    ) -> Result<(), DeliveryError> {
        let session = self
            .sessions
            .get(session_id)
            .ok_or_else(|| DeliveryError::UnknownRecipient(session_id.to_string()))?;
        self.send(&session, &HandlerResponse::reply(message_type, payload)?)
    }

    /// Sends `response` to every recipient, encoding it once.
    ///
    /// Missing or closed recipients are skipped; the others still receive the
    /// message.
    #[instrument(skip(self, recipients, response), fields(message_type = %response.message_type, total = recipients.len()))]
    pub fn broadcast(
        &self,
        recipients: &[SessionId],
        response: &HandlerResponse,
    ) -> Result<(), DeliveryError> {
        let frame = encode(response.message_type, &response.payload)?;
        let mut failed = 0;
        for id in recipients {
            let outcome = match self.sessions.get(id) {
                Some(session) => session.connection().send(frame.clone()),
                None => Err(DeliveryError::UnknownRecipient(id.clone())),
            };
            if let Err(e) = outcome {
                warn!(recipient = %id, error = %e, "Broadcast recipient skipped");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(DeliveryError::Partial {
                failed,
                total: recipients.len(),
            });
        }
        debug!("Broadcast sent");
        Ok(())
    }

    /// Sends a response to its broadcast recipients or back to `origin`.
    pub fn deliver(&self, origin: &Session, response: &HandlerResponse) -> Result<(), DeliveryError> {
        if response.broadcast {
            self.broadcast(&response.recipients, response)
        } else {
            self.send(origin, response)
        }
    }

    /// Reports `error` to `session` as an `ERROR` message.
    #[instrument(skip(self, session), fields(session_id = %session.id(), code = error.code()))]
    pub fn send_error(&self, session: &Session, error: &ServerError) -> Result<(), DeliveryError> {
        let payload = ErrorPayload::new(error.code().to_string(), error.to_string());
        self.send(session, &HandlerResponse::reply(MessageType::Error, &payload)?)
    }
}
