//! Game logic for tic-tac-toe.

use crate::rules;
use crate::{Board, Cell, Mark, Position};
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Current status of the game.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameStatus {
    /// Game is ongoing.
    InProgress,
    /// Game ended in a win.
    Won(Mark),
    /// Game ended in a draw.
    Draw,
}

impl GameStatus {
    /// True once the game is won or drawn.
    pub fn is_over(self) -> bool {
        !matches!(self, GameStatus::InProgress)
    }

    /// Returns the winning mark, if any.
    pub fn winner(self) -> Option<Mark> {
        match self {
            GameStatus::Won(mark) => Some(mark),
            GameStatus::InProgress | GameStatus::Draw => None,
        }
    }
}

/// Reasons a move is rejected by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::Display, derive_more::Error)]
pub enum MoveError {
    /// Position is outside 0-8.
    #[display("Invalid position {_0}: must be 0-8")]
    InvalidPosition(#[error(not(source))] i64),

    /// The mark trying to move is not the side to move.
    #[display("Not your turn, current turn: {_0}")]
    NotYourTurn(#[error(not(source))] Mark),

    /// The game is already won or drawn.
    #[display("Game is already over")]
    GameOver,

    /// The target cell already holds a mark.
    #[display("Cell {_0} is already occupied")]
    CellOccupied(#[error(not(source))] usize),
}

/// Tic-tac-toe game engine.
///
/// The only mutation path is [`Game::make_move`]; everything else is a read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Game {
    board: Board,
    to_move: Mark,
    status: GameStatus,
    history: Vec<Position>,
}

impl Game {
    /// Creates a new game with X to move.
    #[instrument]
    pub fn new() -> Self {
        Self {
            board: Board::new(),
            to_move: Mark::X,
            status: GameStatus::InProgress,
            history: Vec::new(),
        }
    }

    /// Returns the board.
    pub fn board(&self) -> &Board {
        &self.board
    }

    /// Returns the mark whose turn it is.
    pub fn to_move(&self) -> Mark {
        self.to_move
    }

    /// Returns the game status.
    pub fn status(&self) -> GameStatus {
        self.status
    }

    /// Returns the winning mark, if the game is won.
    pub fn winner(&self) -> Option<Mark> {
        self.status.winner()
    }

    /// Returns the positions played so far, in order.
    pub fn history(&self) -> &[Position] {
        &self.history
    }

    /// Places `mark` at `position` (0-8) and returns the resulting status.
    ///
    /// Checks run in a fixed order: range, turn, game over, occupancy. On
    /// success the side to move toggles only while the game stays in
    /// progress.
    ///
    /// # Errors
    ///
    /// Returns the first [`MoveError`] that applies; the game is unchanged.
    #[instrument(skip(self), fields(to_move = %self.to_move))]
    pub fn make_move(&mut self, position: i64, mark: Mark) -> Result<GameStatus, MoveError> {
        let pos = Position::from_index(position).ok_or(MoveError::InvalidPosition(position))?;

        if mark != self.to_move {
            return Err(MoveError::NotYourTurn(self.to_move));
        }

        if self.status.is_over() {
            return Err(MoveError::GameOver);
        }

        if !self.board.is_empty(pos) {
            return Err(MoveError::CellOccupied(pos.to_index()));
        }

        self.board.set(pos, Cell::Occupied(mark));
        self.history.push(pos);
        self.update_status();

        if !self.status.is_over() {
            self.to_move = self.to_move.opponent();
        }

        debug!(position = %pos, status = ?self.status, "Move applied");
        Ok(self.status)
    }

    /// Updates game status after a move.
    fn update_status(&mut self) {
        if let Some(winner) = rules::check_winner(&self.board) {
            self.status = GameStatus::Won(winner);
        } else if rules::is_full(&self.board) {
            self.status = GameStatus::Draw;
        }
    }
}

impl Default for Game {
    fn default() -> Self {
        Self::new()
    }
}
