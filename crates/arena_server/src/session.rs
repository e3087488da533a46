//! Connected clients and the registry that tracks them.

use crate::delivery::DeliveryError;
use crate::ids::IdGenerator;
use chrono::{DateTime, Utc};
use derive_getters::Getters;
use derive_more::{Display, Error};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, warn};

/// Session identifier, `sess-<suffix>`.
pub type SessionId = String;

/// Where a client is in its lifecycle.
///
/// ```text
/// Guest ──login──▶ LoggedIn ──enqueue──▶ WaitingForPair ──paired──▶ InGame
///                     ▲                        ▲                       │
///                     │                        └──── pairing rolled back┤
///                     └──────────── opponent left / match swept ────────┘
/// ```
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    strum::Display,
    strum::AsRefStr,
    strum::EnumIter,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionState {
    /// Connected, not yet logged in.
    Guest,
    /// Authenticated, not queued.
    LoggedIn,
    /// Queued for matchmaking.
    WaitingForPair,
    /// Seated in a match.
    InGame,
}

impl SessionState {
    /// True if a session may move from `self` to `next`.
    pub fn can_transition_to(self, next: SessionState) -> bool {
        use SessionState::*;
        matches!(
            (self, next),
            (Guest, LoggedIn)
                | (LoggedIn, WaitingForPair)
                | (WaitingForPair, InGame)
                | (InGame, WaitingForPair)
                | (InGame, LoggedIn)
        )
    }
}

/// Write side of one client connection.
///
/// Cloning shares the same outbound channel; the connection's writer task
/// drains it in order and stops once every clone is dropped.
#[derive(Debug, Clone)]
pub struct ConnectionHandle {
    peer: String,
    outbound: mpsc::UnboundedSender<Vec<u8>>,
}

impl ConnectionHandle {
    /// Wraps an existing outbound channel.
    pub fn new(peer: impl Into<String>, outbound: mpsc::UnboundedSender<Vec<u8>>) -> Self {
        Self {
            peer: peer.into(),
            outbound,
        }
    }

    /// Creates a handle together with the receiver its writer should drain.
    pub fn channel(peer: impl Into<String>) -> (Self, mpsc::UnboundedReceiver<Vec<u8>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(peer, tx), rx)
    }

    /// Remote address, for logging.
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Queues one encoded frame for writing.
    pub fn send(&self, frame: Vec<u8>) -> Result<(), DeliveryError> {
        self.outbound
            .send(frame)
            .map_err(|_| DeliveryError::ConnectionClosed(self.peer.clone()))
    }

    /// True once the writer side has gone away.
    pub fn is_closed(&self) -> bool {
        self.outbound.is_closed()
    }
}

/// One connected client.
///
/// The registry hands out clones; a clone is a snapshot and does not follow
/// later state changes.
#[derive(Debug, Clone, Getters)]
pub struct Session {
    /// Unique session id.
    id: SessionId,
    /// Write side of the client's connection.
    connection: ConnectionHandle,
    /// Lifecycle state.
    state: SessionState,
    /// Set once the client has logged in.
    username: Option<String>,
    /// When the connection was accepted.
    created_at: DateTime<Utc>,
    /// Last login or heartbeat.
    last_activity: DateTime<Utc>,
}

/// Session registry failure.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum RegistryError {
    /// No session with this id.
    #[display("Session not found: {_0}")]
    SessionNotFound(#[error(not(source))] SessionId),

    /// Another live session already logged in under this name.
    #[display("Username already in use: {_0}")]
    UsernameInUse(#[error(not(source))] String),

    /// The state machine does not allow this move.
    #[display("Cannot move session from {from} to {to}")]
    #[strum(serialize = "INVALID_STATE")]
    InvalidTransition {
        /// Current state.
        from: SessionState,
        /// Requested state.
        to: SessionState,
    },
}

impl RegistryError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        self.into()
    }
}

#[derive(Debug, Default)]
struct SessionIndex {
    sessions: HashMap<SessionId, Session>,
    by_username: HashMap<String, SessionId>,
}

/// All live sessions, indexed by id and by logged-in username.
#[derive(Debug)]
pub struct SessionRegistry {
    ids: Arc<dyn IdGenerator>,
    inner: RwLock<SessionIndex>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            ids,
            inner: RwLock::new(SessionIndex::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, SessionIndex> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, SessionIndex> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a new connection as a guest session.
    #[instrument(skip(self, connection), fields(peer = %connection.peer()))]
    pub fn create(&self, connection: ConnectionHandle) -> Session {
        let now = Utc::now();
        let session = Session {
            id: self.ids.next_id("sess"),
            connection,
            state: SessionState::Guest,
            username: None,
            created_at: now,
            last_activity: now,
        };
        self.write()
            .sessions
            .insert(session.id.clone(), session.clone());
        info!(session_id = %session.id, "Session created");
        session
    }

    /// Snapshot of one session.
    pub fn get(&self, id: &str) -> Option<Session> {
        self.read().sessions.get(id).cloned()
    }

    /// Snapshot of the session logged in as `username`.
    pub fn get_by_username(&self, username: &str) -> Option<Session> {
        let index = self.read();
        index
            .by_username
            .get(username)
            .and_then(|id| index.sessions.get(id))
            .cloned()
    }

    /// Deletes a session and frees its username.
    #[instrument(skip(self))]
    pub fn remove(&self, id: &str) -> Option<Session> {
        let mut index = self.write();
        let removed = index.sessions.remove(id)?;
        if let Some(name) = &removed.username {
            if index.by_username.get(name).is_some_and(|owner| owner == id) {
                index.by_username.remove(name);
            }
        }
        info!(remaining = index.sessions.len(), "Session removed");
        Some(removed)
    }

    /// Snapshots of every session.
    pub fn list(&self) -> Vec<Session> {
        self.read().sessions.values().cloned().collect()
    }

    /// Number of live sessions.
    pub fn len(&self) -> usize {
        self.read().sessions.len()
    }

    /// True when no session is live.
    pub fn is_empty(&self) -> bool {
        self.read().sessions.is_empty()
    }

    /// Binds `username` to a guest session and marks it logged in.
    ///
    /// Both changes happen under one lock, so two connections racing for the
    /// same name cannot both succeed.
    #[instrument(skip(self))]
    pub fn login(&self, id: &str, username: &str) -> Result<Session, RegistryError> {
        let mut index = self.write();
        if index.by_username.contains_key(username) {
            warn!("Username already in use");
            return Err(RegistryError::UsernameInUse(username.to_string()));
        }
        let session = index
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))?;
        if session.state != SessionState::Guest {
            return Err(RegistryError::InvalidTransition {
                from: session.state,
                to: SessionState::LoggedIn,
            });
        }
        session.state = SessionState::LoggedIn;
        session.username = Some(username.to_string());
        session.last_activity = Utc::now();
        let snapshot = session.clone();
        index.by_username.insert(username.to_string(), id.to_string());
        info!("Session logged in");
        Ok(snapshot)
    }

    /// Moves a session to `next`, returning the previous state.
    ///
    /// Setting the current state again is accepted as a no-op.
    #[instrument(skip(self))]
    pub fn set_state(&self, id: &str, next: SessionState) -> Result<SessionState, RegistryError> {
        let mut index = self.write();
        let session = index
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))?;
        let previous = session.state;
        if previous != next && !previous.can_transition_to(next) {
            return Err(RegistryError::InvalidTransition {
                from: previous,
                to: next,
            });
        }
        session.state = next;
        debug!(%previous, "Session state changed");
        Ok(previous)
    }

    /// Records activity on a session.
    pub fn touch(&self, id: &str) -> Result<DateTime<Utc>, RegistryError> {
        let mut index = self.write();
        let session = index
            .sessions
            .get_mut(id)
            .ok_or_else(|| RegistryError::SessionNotFound(id.to_string()))?;
        session.last_activity = Utc::now();
        Ok(session.last_activity)
    }
}
