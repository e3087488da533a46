//! `LOGIN_REQUEST` handler.

use super::{HandlerError, MessageHandler};
use crate::delivery::HandlerResponse;
use crate::matchmaking::MatchmakingQueue;
use crate::session::{SessionId, SessionRegistry, SessionState};
use crate::users::UserDirectory;
use arena_protocol::{DecodedMessage, LoginRequestPayload, LoginResponsePayload, MessageType};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Authenticates a guest and puts it in the matchmaking queue.
///
/// The queue sends `WAITING_FOR_OPPONENT` (and possibly `GAME_START`) as soon
/// as the player is enqueued, so those can reach the client before the
/// `LOGIN_RESPONSE` returned here.
#[derive(Debug)]
pub struct LoginHandler {
    users: Arc<dyn UserDirectory>,
    sessions: Arc<SessionRegistry>,
    queue: Arc<MatchmakingQueue>,
}

impl LoginHandler {
    /// Creates the handler.
    pub fn new(
        users: Arc<dyn UserDirectory>,
        sessions: Arc<SessionRegistry>,
        queue: Arc<MatchmakingQueue>,
    ) -> Self {
        Self {
            users,
            sessions,
            queue,
        }
    }
}

impl MessageHandler for LoginHandler {
    #[instrument(skip(self, message))]
    fn handle(
        &self,
        message: &DecodedMessage,
        session_id: &SessionId,
    ) -> Result<HandlerResponse, HandlerError> {
        let request: LoginRequestPayload = message.payload_as()?;
        let username = request.username.trim();

        if !self.users.exists(username) {
            warn!(username, "Login rejected: unknown user");
            return Err(HandlerError::UserNotFound(username.to_string()));
        }

        let session = self.sessions.login(session_id, username)?;
        info!(username, "Player logged in");
        self.queue.enqueue(&session)?;

        let response = LoginResponsePayload::new(
            true,
            "Login successful".to_string(),
            session_id.clone(),
        );
        Ok(HandlerResponse::reply(MessageType::LoginResponse, &response)?)
    }

    fn required_states(&self) -> &'static [SessionState] {
        &[SessionState::Guest]
    }
}
