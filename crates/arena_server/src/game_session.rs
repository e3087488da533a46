//! A single match between two players.

use crate::session::SessionId;
use arena_tictactoe::{Board, Game, GameStatus, Mark, MoveError};
use chrono::{DateTime, Utc};
use derive_more::{Display, Error, From};
use serde::Serialize;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{debug, info, instrument, warn};

/// Match identifier, `game-<suffix>`.
pub type MatchId = String;

/// Lifecycle of a match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GameSessionStatus {
    /// Fewer than two seats filled.
    WaitingForPlayers,
    /// Both seats filled, not started.
    Ready,
    /// Moves are being accepted.
    InProgress,
    /// The game reached a win or a draw.
    Completed,
    /// A player left while the game was in progress.
    Abandoned,
}

impl GameSessionStatus {
    /// True for `Completed` and `Abandoned`.
    pub fn is_finished(self) -> bool {
        matches!(self, Self::Completed | Self::Abandoned)
    }
}

/// A seated player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlayerInfo {
    /// The player's session.
    pub session_id: SessionId,
    /// Login name.
    pub username: String,
    /// Assigned mark.
    pub mark: Mark,
    /// Whether this player opens the game.
    pub moves_first: bool,
}

impl PlayerInfo {
    fn new(session_id: SessionId, username: String, mark: Mark) -> Self {
        Self {
            session_id,
            username,
            mark,
            moves_first: mark == Mark::X,
        }
    }
}

/// Result of an accepted move, captured under the match lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MoveOutcome {
    /// Mark that was placed.
    pub mover: Mark,
    /// Board index it was placed on.
    pub position: i64,
    /// Mark to move next.
    pub next_turn: Mark,
    /// Engine status after the move.
    pub game_status: GameStatus,
}

/// Point-in-time copy of a match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameSessionSnapshot {
    /// Match id.
    pub id: MatchId,
    /// Lifecycle status.
    pub status: GameSessionStatus,
    /// Board contents.
    pub board: Board,
    /// Mark to move.
    pub to_move: Mark,
    /// Engine status.
    pub game_status: GameStatus,
    /// Seat X.
    pub player_x: Option<PlayerInfo>,
    /// Seat O.
    pub player_o: Option<PlayerInfo>,
    /// When the match was created.
    pub created_at: DateTime<Utc>,
    /// When the match was started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the match completed or was abandoned.
    pub ended_at: Option<DateTime<Utc>>,
}

/// Match and match registry failures.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error, From, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchError {
    /// Both seats are taken.
    #[display("Game session is full")]
    #[from(ignore)]
    SessionFull,

    /// The session is not seated in this match, or in any match.
    #[display("Player is not in a game")]
    #[from(ignore)]
    PlayerNotInMatch,

    /// The session is already seated in another match.
    #[display("Player already in game {_0}")]
    #[from(ignore)]
    AlreadyInMatch(#[error(not(source))] MatchId),

    /// No match with this id.
    #[display("Game not found: {_0}")]
    #[from(ignore)]
    MatchNotFound(#[error(not(source))] MatchId),

    /// `start` was called before both seats were filled.
    #[display("Game is not ready to start: {_0}")]
    #[from(ignore)]
    NotReady(#[error(not(source))] GameSessionStatus),

    /// A move arrived before the match started.
    #[display("Game is not in progress: {_0}")]
    #[from(ignore)]
    NotInProgress(#[error(not(source))] GameSessionStatus),

    /// A move arrived after the match completed or was abandoned.
    #[display("Game is already over")]
    #[from(ignore)]
    GameAlreadyOver,

    /// The engine rejected the move.
    #[display("{_0}")]
    Move(MoveError),
}

impl MatchError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            MatchError::Move(MoveError::InvalidPosition(_)) => "INVALID_POSITION",
            MatchError::Move(MoveError::NotYourTurn(_)) => "NOT_YOUR_TURN",
            MatchError::Move(MoveError::GameOver) => "GAME_ALREADY_OVER",
            MatchError::Move(MoveError::CellOccupied(_)) => "CELL_OCCUPIED",
            other => other.into(),
        }
    }
}

#[derive(Debug)]
struct MatchState {
    game: Game,
    player_x: Option<PlayerInfo>,
    player_o: Option<PlayerInfo>,
    status: GameSessionStatus,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
}

impl MatchState {
    fn seat_of(&self, session_id: &str) -> Option<&PlayerInfo> {
        [&self.player_x, &self.player_o]
            .into_iter()
            .flatten()
            .find(|p| p.session_id == session_id)
    }

    fn is_full(&self) -> bool {
        self.player_x.is_some() && self.player_o.is_some()
    }
}

/// One match: the engine plus two seats and a lifecycle status.
///
/// All mutation goes through an internal mutex, so concurrent moves on the
/// same match are serialized and exactly one of two racing moves for the
/// same turn is accepted.
#[derive(Debug)]
pub struct GameSession {
    id: MatchId,
    created_at: DateTime<Utc>,
    state: Mutex<MatchState>,
}

impl GameSession {
    /// Creates an empty match waiting for players.
    #[instrument]
    pub fn new(id: MatchId) -> Self {
        info!(game_id = %id, "Creating new game session");
        Self {
            id,
            created_at: Utc::now(),
            state: Mutex::new(MatchState {
                game: Game::new(),
                player_x: None,
                player_o: None,
                status: GameSessionStatus::WaitingForPlayers,
                started_at: None,
                ended_at: None,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, MatchState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Match id.
    pub fn id(&self) -> &MatchId {
        &self.id
    }

    /// Creation time.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Seats a player: X if free, otherwise O.
    ///
    /// Filling the second seat moves the match to `Ready`. Seats change only
    /// through [`GameSessionRegistry`](crate::GameSessionRegistry), which keeps
    /// the player index in step.
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub(crate) fn add_player(&self, session_id: &str, username: &str) -> Result<Mark, MatchError> {
        let mut state = self.lock();
        if state.seat_of(session_id).is_some() {
            return Err(MatchError::AlreadyInMatch(self.id.clone()));
        }
        let mark = if state.player_x.is_none() {
            state.player_x = Some(PlayerInfo::new(session_id.into(), username.into(), Mark::X));
            Mark::X
        } else if state.player_o.is_none() {
            state.player_o = Some(PlayerInfo::new(session_id.into(), username.into(), Mark::O));
            Mark::O
        } else {
            warn!("Game session already has 2 players");
            return Err(MatchError::SessionFull);
        };
        if state.is_full() && state.status == GameSessionStatus::WaitingForPlayers {
            state.status = GameSessionStatus::Ready;
        }
        info!(%mark, status = %state.status, "Player seated");
        Ok(mark)
    }

    /// Vacates a player's seat and returns the resulting status.
    ///
    /// Leaving an in-progress match abandons it. Any other removal returns
    /// the match to `WaitingForPlayers`, except that `Abandoned` is final.
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub(crate) fn remove_player(&self, session_id: &str) -> Result<GameSessionStatus, MatchError> {
        let mut state = self.lock();
        let mark = state
            .seat_of(session_id)
            .map(|p| p.mark)
            .ok_or(MatchError::PlayerNotInMatch)?;
        match mark {
            Mark::X => state.player_x = None,
            Mark::O => state.player_o = None,
        }
        match state.status {
            GameSessionStatus::InProgress => {
                state.status = GameSessionStatus::Abandoned;
                state.ended_at = Some(Utc::now());
            }
            GameSessionStatus::Abandoned => {}
            _ => state.status = GameSessionStatus::WaitingForPlayers,
        }
        info!(%mark, status = %state.status, "Player left");
        Ok(state.status)
    }

    /// Starts a `Ready` match.
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn start(&self) -> Result<(), MatchError> {
        let mut state = self.lock();
        if state.status != GameSessionStatus::Ready {
            return Err(MatchError::NotReady(state.status));
        }
        state.status = GameSessionStatus::InProgress;
        state.started_at = Some(Utc::now());
        info!("Game started");
        Ok(())
    }

    /// Applies a move for the seated player `session_id`.
    ///
    /// The mover's mark is resolved from the seat, never from the client.
    #[instrument(skip(self), fields(game_id = %self.id))]
    pub fn make_move(&self, session_id: &str, position: i64) -> Result<MoveOutcome, MatchError> {
        let mut state = self.lock();
        let mover = state
            .seat_of(session_id)
            .map(|p| p.mark)
            .ok_or(MatchError::PlayerNotInMatch)?;
        match state.status {
            GameSessionStatus::InProgress => {}
            GameSessionStatus::Completed | GameSessionStatus::Abandoned => {
                return Err(MatchError::GameAlreadyOver);
            }
            other => return Err(MatchError::NotInProgress(other)),
        }

        let game_status = state.game.make_move(position, mover).map_err(|e| {
            debug!(error = %e, "Move rejected");
            MatchError::Move(e)
        })?;
        if game_status.is_over() {
            state.status = GameSessionStatus::Completed;
            state.ended_at = Some(Utc::now());
            info!(?game_status, "Game completed");
        }
        Ok(MoveOutcome {
            mover,
            position,
            next_turn: state.game.to_move(),
            game_status,
        })
    }

    /// Seat of `session_id`.
    pub fn player_info(&self, session_id: &str) -> Option<PlayerInfo> {
        self.lock().seat_of(session_id).cloned()
    }

    /// Seat of whoever is playing against `session_id`.
    pub fn opponent_info(&self, session_id: &str) -> Option<PlayerInfo> {
        let state = self.lock();
        let mark = state.seat_of(session_id)?.mark;
        match mark {
            Mark::X => state.player_o.clone(),
            Mark::O => state.player_x.clone(),
        }
    }

    /// Seated players, X first.
    pub fn players(&self) -> Vec<PlayerInfo> {
        let state = self.lock();
        [&state.player_x, &state.player_o]
            .into_iter()
            .flatten()
            .cloned()
            .collect()
    }

    /// Session ids of the seated players, X first.
    pub fn player_ids(&self) -> Vec<SessionId> {
        self.players().into_iter().map(|p| p.session_id).collect()
    }

    /// True if `session_id` holds a seat.
    pub fn has_player(&self, session_id: &str) -> bool {
        self.lock().seat_of(session_id).is_some()
    }

    /// True when both seats are taken.
    pub fn is_full(&self) -> bool {
        self.lock().is_full()
    }

    /// Lifecycle status.
    pub fn status(&self) -> GameSessionStatus {
        self.lock().status
    }

    /// Mark to move.
    pub fn to_move(&self) -> Mark {
        self.lock().game.to_move()
    }

    /// Copy of the board.
    pub fn board(&self) -> Board {
        self.lock().game.board().clone()
    }

    /// Consistent copy of everything at once.
    pub fn snapshot(&self) -> GameSessionSnapshot {
        let state = self.lock();
        GameSessionSnapshot {
            id: self.id.clone(),
            status: state.status,
            board: state.game.board().clone(),
            to_move: state.game.to_move(),
            game_status: state.game.status(),
            player_x: state.player_x.clone(),
            player_o: state.player_o.clone(),
            created_at: self.created_at,
            started_at: state.started_at,
            ended_at: state.ended_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn started() -> GameSession {
        let game = GameSession::new("game-1".into());
        game.add_player("sess-a", "narik").unwrap();
        game.add_player("sess-b", "santo").unwrap();
        game.start().unwrap();
        game
    }

    #[test]
    fn test_seats_fill_x_then_o() {
        let game = GameSession::new("game-1".into());
        assert_eq!(game.add_player("sess-a", "narik"), Ok(Mark::X));
        assert_eq!(game.status(), GameSessionStatus::WaitingForPlayers);
        assert_eq!(game.add_player("sess-b", "santo"), Ok(Mark::O));
        assert_eq!(game.status(), GameSessionStatus::Ready);
        assert_eq!(game.add_player("sess-c", "other"), Err(MatchError::SessionFull));

        let x = game.player_info("sess-a").unwrap();
        assert!(x.moves_first);
        assert!(!game.player_info("sess-b").unwrap().moves_first);
        assert_eq!(game.opponent_info("sess-a").unwrap().username, "santo");
        assert_eq!(game.player_ids(), vec!["sess-a".to_string(), "sess-b".to_string()]);
    }

    #[test]
    fn test_start_requires_ready() {
        let game = GameSession::new("game-1".into());
        game.add_player("sess-a", "narik").unwrap();
        assert_eq!(
            game.start(),
            Err(MatchError::NotReady(GameSessionStatus::WaitingForPlayers))
        );
    }

    #[test]
    fn test_move_before_start_is_rejected() {
        let game = GameSession::new("game-1".into());
        game.add_player("sess-a", "narik").unwrap();
        game.add_player("sess-b", "santo").unwrap();
        assert_eq!(
            game.make_move("sess-a", 4),
            Err(MatchError::NotInProgress(GameSessionStatus::Ready))
        );
    }

    #[test]
    fn test_move_outcome_reports_server_side_mark() {
        let game = started();
        let outcome = game.make_move("sess-a", 4).unwrap();
        assert_eq!(outcome.mover, Mark::X);
        assert_eq!(outcome.next_turn, Mark::O);
        assert_eq!(outcome.game_status, GameStatus::InProgress);

        let err = game.make_move("sess-a", 0).unwrap_err();
        assert_eq!(err.code(), "NOT_YOUR_TURN");
        let err = game.make_move("sess-b", 4).unwrap_err();
        assert_eq!(err.code(), "CELL_OCCUPIED");
        let err = game.make_move("sess-b", 9).unwrap_err();
        assert_eq!(err.code(), "INVALID_POSITION");
        assert_eq!(game.make_move("sess-z", 0), Err(MatchError::PlayerNotInMatch));
    }

    #[test]
    fn test_win_completes_and_blocks_further_moves() {
        let game = started();
        for (who, pos) in [("sess-a", 0), ("sess-b", 3), ("sess-a", 1), ("sess-b", 4)] {
            game.make_move(who, pos).unwrap();
        }
        let outcome = game.make_move("sess-a", 2).unwrap();
        assert_eq!(outcome.game_status, GameStatus::Won(Mark::X));
        assert_eq!(game.status(), GameSessionStatus::Completed);
        assert!(game.snapshot().ended_at.is_some());
        assert_eq!(game.make_move("sess-b", 5), Err(MatchError::GameAlreadyOver));
    }

    #[test]
    fn test_leaving_in_progress_abandons() {
        let game = started();
        assert_eq!(game.remove_player("sess-b"), Ok(GameSessionStatus::Abandoned));
        assert!(!game.is_full());
        assert_eq!(game.make_move("sess-a", 0), Err(MatchError::GameAlreadyOver));
        assert_eq!(game.remove_player("sess-b"), Err(MatchError::PlayerNotInMatch));
    }

    #[test]
    fn test_leaving_ready_reverts_to_waiting() {
        let game = GameSession::new("game-1".into());
        game.add_player("sess-a", "narik").unwrap();
        game.add_player("sess-b", "santo").unwrap();
        assert_eq!(
            game.remove_player("sess-a"),
            Ok(GameSessionStatus::WaitingForPlayers)
        );
        assert_eq!(game.add_player("sess-c", "other"), Ok(Mark::X));
        assert_eq!(game.status(), GameSessionStatus::Ready);
    }

    #[test]
    fn test_leaving_completed_reverts_to_waiting() {
        let game = started();
        for (who, pos) in [("sess-a", 0), ("sess-b", 3), ("sess-a", 1), ("sess-b", 4), ("sess-a", 2)] {
            game.make_move(who, pos).unwrap();
        }
        assert_eq!(game.status(), GameSessionStatus::Completed);
        assert_eq!(
            game.remove_player("sess-b"),
            Ok(GameSessionStatus::WaitingForPlayers)
        );
        assert_eq!(
            game.make_move("sess-a", 5),
            Err(MatchError::NotInProgress(GameSessionStatus::WaitingForPlayers))
        );
    }

    #[test]
    fn test_abandoned_stays_abandoned() {
        let game = started();
        game.remove_player("sess-b").unwrap();
        assert_eq!(game.remove_player("sess-a"), Ok(GameSessionStatus::Abandoned));
    }

    #[test]
    fn test_same_player_cannot_take_both_seats() {
        let game = GameSession::new("game-1".into());
        game.add_player("sess-a", "narik").unwrap();
        assert_eq!(
            game.add_player("sess-a", "narik"),
            Err(MatchError::AlreadyInMatch("game-1".into()))
        );
    }
}
