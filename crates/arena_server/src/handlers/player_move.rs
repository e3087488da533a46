//! `PLAYER_MOVE` handler.

use super::{HandlerError, MessageHandler};
use crate::delivery::HandlerResponse;
use crate::game_registry::GameSessionRegistry;
use crate::session::{SessionId, SessionState};
use arena_protocol::{
    DecodedMessage, GameEndPayload, GameResult, MessageType, PlayerMovePayload,
    PlayerMoveResponsePayload,
};
use arena_tictactoe::GameStatus;
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Applies a move and broadcasts the result to both players.
#[derive(Debug)]
pub struct PlayerMoveHandler {
    matches: Arc<GameSessionRegistry>,
}

impl PlayerMoveHandler {
    /// Creates the handler.
    pub fn new(matches: Arc<GameSessionRegistry>) -> Self {
        Self { matches }
    }
}

impl MessageHandler for PlayerMoveHandler {
    #[instrument(skip(self, message))]
    fn handle(
        &self,
        message: &DecodedMessage,
        session_id: &SessionId,
    ) -> Result<HandlerResponse, HandlerError> {
        let request: PlayerMovePayload = message.payload_as()?;
        let game = self.matches.get_by_player(session_id)?;
        let outcome = game.make_move(session_id, request.position)?;
        if !request.symbol.is_empty() && request.symbol != outcome.mover.to_string() {
            debug!(claimed = %request.symbol, actual = %outcome.mover, "Client sent wrong symbol");
        }
        let recipients = game.player_ids();

        let response = match outcome.game_status {
            GameStatus::InProgress => HandlerResponse::broadcast(
                MessageType::PlayerMoveResponse,
                &PlayerMoveResponsePayload::new(
                    outcome.mover.to_string(),
                    outcome.position,
                    outcome.next_turn.to_string(),
                ),
                recipients,
            )?,
            GameStatus::Won(winner) => {
                info!(game_id = %game.id(), %winner, "Game won");
                HandlerResponse::broadcast(
                    MessageType::GameEnd,
                    &GameEndPayload::new(GameResult::Win, winner.to_string()),
                    recipients,
                )?
            }
            GameStatus::Draw => {
                info!(game_id = %game.id(), "Game drawn");
                HandlerResponse::broadcast(
                    MessageType::GameEnd,
                    &GameEndPayload::new(GameResult::Draw, String::new()),
                    recipients,
                )?
            }
        };
        Ok(response)
    }

    fn required_states(&self) -> &'static [SessionState] {
        &[SessionState::LoggedIn, SessionState::InGame]
    }
}
