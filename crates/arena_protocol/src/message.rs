//! Message types and their payloads.

use derive_new::new;
use serde::{Deserialize, Serialize};

/// The `message_type` discriminator carried inside a `v1` payload.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    /// Client → server: authenticate with a username. Also sent by the
    /// server, without payload, to prompt a freshly connected client.
    LoginRequest,
    /// Server → client: login result.
    LoginResponse,
    /// Server → client: queued for matchmaking.
    WaitingForOpponent,
    /// Server → client: paired into a match.
    GameStart,
    /// Client → server: place a mark.
    PlayerMove,
    /// Server → both players: a move was applied.
    PlayerMoveResponse,
    /// Server → both players: the match is over.
    GameEnd,
    /// Client → server: keep-alive.
    Heartbeat,
    /// Server → client: keep-alive acknowledgement.
    HeartbeatResponse,
    /// Server → client: a request failed.
    Error,
}

/// `LOGIN_REQUEST` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct LoginRequestPayload {
    /// Username to authenticate as.
    pub username: String,
}

/// `LOGIN_RESPONSE` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct LoginResponsePayload {
    /// Whether the login succeeded.
    pub is_authenticated: bool,
    /// Human-readable detail.
    pub message: String,
    /// Identifier the server will use for this player.
    pub player_id: String,
}

/// `WAITING_FOR_OPPONENT` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct WaitingForOpponentPayload {
    /// Human-readable detail.
    pub message: String,
}

/// `GAME_START` payload, one per player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct GameStartPayload {
    /// Match identifier.
    pub game_id: String,
    /// The recipient's mark (`"X"` or `"O"`).
    pub your_symbol: String,
    /// Whether the recipient moves first.
    pub your_turn: bool,
}

/// `PLAYER_MOVE` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct PlayerMovePayload {
    /// Board index 0-8, row-major.
    pub position: i64,
    /// The mark the client believes it plays. Informational only; the server
    /// resolves the mover's mark from the match.
    #[serde(default)]
    pub symbol: String,
}

/// `PLAYER_MOVE_RESPONSE` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct PlayerMoveResponsePayload {
    /// Mark of the player who moved.
    pub moved_by_user: String,
    /// Board index the mark was placed on.
    pub moved_to_position: i64,
    /// Mark to move next.
    pub turn_symbol: String,
}

/// How a match ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum GameResult {
    /// One mark completed a line.
    Win,
    /// The board filled with no line.
    Draw,
    /// A player left mid-match.
    Abandoned,
}

/// `GAME_END` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct GameEndPayload {
    /// How the match ended.
    pub result: GameResult,
    /// Winning mark, empty on a draw.
    pub winner: String,
}

/// `ERROR` payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, new)]
pub struct ErrorPayload {
    /// Stable machine-readable code, e.g. `NOT_YOUR_TURN`.
    pub code: String,
    /// Human-readable detail.
    pub message: String,
}
