//! Tic-tac-toe game engine.
//!
//! Pure move validation and win/draw detection over a 3x3 board. The engine
//! knows nothing about players, sessions or the network: a [`Game`] accepts a
//! position and the [`Mark`] claiming to move, and either applies the move or
//! explains why it cannot.
//!
//! # Example
//!
//! ```
//! use arena_tictactoe::{Game, GameStatus, Mark};
//!
//! let mut game = Game::new();
//! for (position, mark) in [(0, Mark::X), (3, Mark::O), (1, Mark::X), (4, Mark::O)] {
//!     game.make_move(position, mark).unwrap();
//! }
//! assert_eq!(game.make_move(2, Mark::X), Ok(GameStatus::Won(Mark::X)));
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod game;
mod position;
pub mod rules;
mod types;

pub use game::{Game, GameStatus, MoveError};
pub use position::Position;
pub use types::{Board, Cell, Mark};
