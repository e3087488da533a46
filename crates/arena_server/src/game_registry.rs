//! Registry of live matches with a player → match index.

use crate::game_session::{GameSession, GameSessionStatus, MatchError, MatchId, PlayerInfo};
use crate::ids::IdGenerator;
use crate::session::SessionId;
use arena_tictactoe::Mark;
use chrono::{DateTime, Duration, Utc};
use derive_new::new;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, instrument};

/// Retention rules applied by [`GameSessionRegistry::sweep`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, new)]
pub struct SweepPolicy {
    /// Any match older than this is removed.
    pub max_age: Duration,
    /// Completed matches are kept this long after they end.
    pub completed_grace: Duration,
    /// Abandoned matches are kept this long after they end.
    pub abandoned_grace: Duration,
}

impl Default for SweepPolicy {
    fn default() -> Self {
        Self::new(
            Duration::hours(1),
            Duration::minutes(5),
            Duration::minutes(1),
        )
    }
}

/// What happened when a player was taken out of their match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerRemoval {
    /// The match the player was in.
    pub match_id: MatchId,
    /// Status right after the removal.
    pub status: GameSessionStatus,
    /// The player still seated, if any.
    pub remaining: Option<PlayerInfo>,
    /// Whether the match was deleted from the registry.
    pub match_deleted: bool,
}

/// A match removed by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweptMatch {
    /// Match id.
    pub match_id: MatchId,
    /// Status when swept.
    pub status: GameSessionStatus,
    /// Players that were still seated.
    pub players: Vec<SessionId>,
}

#[derive(Debug, Default)]
struct MatchIndex {
    matches: HashMap<MatchId, Arc<GameSession>>,
    players: HashMap<SessionId, MatchId>,
}

impl MatchIndex {
    fn drop_match(&mut self, match_id: &str) -> Option<Arc<GameSession>> {
        let game = self.matches.remove(match_id)?;
        self.players.retain(|_, m| m != match_id);
        Some(game)
    }
}

/// All live matches.
///
/// The registry lock only guards the two maps. Moves lock the individual
/// match, so play in different matches never contends here. Lock order is
/// always registry before match.
#[derive(Debug)]
pub struct GameSessionRegistry {
    ids: Arc<dyn IdGenerator>,
    inner: RwLock<MatchIndex>,
}

impl GameSessionRegistry {
    /// Creates an empty registry.
    pub fn new(ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            ids,
            inner: RwLock::new(MatchIndex::default()),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, MatchIndex> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MatchIndex> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Creates and registers an empty match.
    #[instrument(skip(self))]
    pub fn create(&self) -> Arc<GameSession> {
        let game = Arc::new(GameSession::new(self.ids.next_id("game")));
        self.write()
            .matches
            .insert(game.id().clone(), Arc::clone(&game));
        game
    }

    /// Looks up a match by id.
    pub fn get(&self, match_id: &str) -> Option<Arc<GameSession>> {
        self.read().matches.get(match_id).cloned()
    }

    /// Looks up the match `player` is seated in.
    pub fn get_by_player(&self, player: &str) -> Result<Arc<GameSession>, MatchError> {
        let index = self.read();
        index
            .players
            .get(player)
            .and_then(|m| index.matches.get(m))
            .cloned()
            .ok_or(MatchError::PlayerNotInMatch)
    }

    /// Seats `player` in `match_id` and indexes them.
    #[instrument(skip(self))]
    pub fn add_player(
        &self,
        match_id: &str,
        player: &str,
        username: &str,
    ) -> Result<Mark, MatchError> {
        let mut index = self.write();
        if let Some(current) = index.players.get(player) {
            return Err(MatchError::AlreadyInMatch(current.clone()));
        }
        let game = index
            .matches
            .get(match_id)
            .cloned()
            .ok_or_else(|| MatchError::MatchNotFound(match_id.to_string()))?;
        let mark = game.add_player(player, username)?;
        index.players.insert(player.to_string(), match_id.to_string());
        Ok(mark)
    }

    /// Takes `player` out of their match.
    ///
    /// The match is deleted when the removal abandons it or leaves it with a
    /// free seat.
    #[instrument(skip(self))]
    pub fn remove_player(&self, player: &str) -> Result<PlayerRemoval, MatchError> {
        let mut index = self.write();
        let match_id = index
            .players
            .get(player)
            .cloned()
            .ok_or(MatchError::PlayerNotInMatch)?;
        let game = index
            .matches
            .get(&match_id)
            .cloned()
            .ok_or_else(|| MatchError::MatchNotFound(match_id.clone()))?;

        let status = game.remove_player(player)?;
        index.players.remove(player);
        let remaining = game.players().into_iter().next();
        let match_deleted = status == GameSessionStatus::Abandoned || !game.is_full();
        if match_deleted {
            index.drop_match(&match_id);
            info!(%match_id, %status, "Game removed");
        }
        Ok(PlayerRemoval {
            match_id,
            status,
            remaining,
            match_deleted,
        })
    }

    /// Deletes a match and un-indexes its players.
    #[instrument(skip(self))]
    pub fn remove_match(&self, match_id: &str) -> Result<Arc<GameSession>, MatchError> {
        self.write()
            .drop_match(match_id)
            .ok_or_else(|| MatchError::MatchNotFound(match_id.to_string()))
    }

    /// True if `player` is seated anywhere.
    pub fn is_player_in_match(&self, player: &str) -> bool {
        self.read().players.contains_key(player)
    }

    /// Number of live matches.
    pub fn len(&self) -> usize {
        self.read().matches.len()
    }

    /// True when no match is live.
    pub fn is_empty(&self) -> bool {
        self.read().matches.is_empty()
    }

    /// Every live match.
    pub fn list(&self) -> Vec<Arc<GameSession>> {
        self.read().matches.values().cloned().collect()
    }

    /// Removes matches that are too old or finished past their grace period.
    #[instrument(skip(self, policy))]
    pub fn sweep(&self, now: DateTime<Utc>, policy: &SweepPolicy) -> Vec<SweptMatch> {
        let mut index = self.write();
        let expired: Vec<SweptMatch> = index
            .matches
            .values()
            .filter_map(|game| {
                let snap = game.snapshot();
                let finished_for = snap.ended_at.map(|ended| now - ended);
                let expired = now - snap.created_at > policy.max_age
                    || match (snap.status, finished_for) {
                        (GameSessionStatus::Completed, Some(age)) => age > policy.completed_grace,
                        (GameSessionStatus::Abandoned, Some(age)) => age > policy.abandoned_grace,
                        _ => false,
                    };
                expired.then(|| SweptMatch {
                    match_id: snap.id,
                    status: snap.status,
                    players: [snap.player_x, snap.player_o]
                        .into_iter()
                        .flatten()
                        .map(|p| p.session_id)
                        .collect(),
                })
            })
            .collect();

        for swept in &expired {
            index.drop_match(&swept.match_id);
            debug!(match_id = %swept.match_id, status = %swept.status, "Swept game");
        }
        if !expired.is_empty() {
            info!(swept = expired.len(), remaining = index.matches.len(), "Sweep finished");
        }
        expired
    }
}
