//! Arena server library - two-player tic-tac-toe over TCP
//!
//! Clients connect over TCP, log in with a known username, wait in a
//! first-come-first-served queue, and are paired into matches. Every message
//! is a newline-delimited JSON envelope (see [`arena_protocol`]).
//!
//! # Architecture
//!
//! - **Sessions**: one per connection, tracked by [`SessionRegistry`]
//! - **Matchmaking**: [`MatchmakingQueue`] pairs waiting players into matches
//! - **Matches**: [`GameSession`] wraps the engine, [`GameSessionRegistry`]
//!   indexes matches by player
//! - **Routing**: [`MessageRouter`] checks session state and dispatches to a
//!   [`Handler`]
//! - **Delivery**: [`ResponseSender`] encodes and writes responses
//!
//! # Example
//!
//! ```no_run
//! use arena_server::{GameServer, ServerConfig};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), arena_server::ServerError> {
//! let server = Arc::new(GameServer::from_config(ServerConfig::default().with_port(0)));
//! let listener = server.bind().await?;
//! server.serve(listener).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

mod config;
mod delivery;
mod error;
mod game_registry;
mod game_session;
mod handlers;
mod ids;
mod matchmaking;
mod router;
mod server;
mod session;
mod users;

// Crate-level exports - Configuration
pub use config::{ConfigError, ServerConfig};

// Crate-level exports - Errors
pub use error::{ServerError, codec_code};

// Crate-level exports - Identifiers
pub use ids::{IdGenerator, SequentialGenerator, UuidGenerator};

// Crate-level exports - Sessions
pub use session::{
    ConnectionHandle, RegistryError, Session, SessionId, SessionRegistry, SessionState,
};

// Crate-level exports - Matches
pub use game_registry::{GameSessionRegistry, PlayerRemoval, SweepPolicy, SweptMatch};
pub use game_session::{
    GameSession, GameSessionSnapshot, GameSessionStatus, MatchError, MatchId, MoveOutcome,
    PlayerInfo,
};

// Crate-level exports - Matchmaking
pub use matchmaking::{MatchmakingQueue, QueueError, QueuedPlayer};

// Crate-level exports - Routing and handlers
pub use handlers::{
    Handler, HandlerError, HeartbeatHandler, LoginHandler, MessageHandler, PlayerMoveHandler,
};
pub use router::{MessageRouter, RouteError};

// Crate-level exports - Delivery
pub use delivery::{DeliveryError, HandlerResponse, ResponseSender};

// Crate-level exports - Users
pub use users::{StaticUserDirectory, UserDirectory};

// Crate-level exports - Server
pub use server::GameServer;
