//! `HEARTBEAT` handler.

use super::{HandlerError, MessageHandler};
use crate::delivery::HandlerResponse;
use crate::session::{SessionId, SessionRegistry, SessionState};
use arena_protocol::{DecodedMessage, MessageType};
use std::sync::Arc;
use tracing::{instrument, trace};

/// Records activity and acknowledges. Allowed in every state.
#[derive(Debug)]
pub struct HeartbeatHandler {
    sessions: Arc<SessionRegistry>,
}

impl HeartbeatHandler {
    /// Creates the handler.
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }
}

impl MessageHandler for HeartbeatHandler {
    #[instrument(skip(self, _message))]
    fn handle(
        &self,
        _message: &DecodedMessage,
        session_id: &SessionId,
    ) -> Result<HandlerResponse, HandlerError> {
        let at = self.sessions.touch(session_id)?;
        trace!(%at, "Heartbeat");
        Ok(HandlerResponse::reply(MessageType::HeartbeatResponse, &())?)
    }

    fn required_states(&self) -> &'static [SessionState] {
        &[]
    }
}
