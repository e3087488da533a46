//! First-come-first-served pairing of logged-in players.

use crate::delivery::ResponseSender;
use crate::error::ServerError;
use crate::game_registry::GameSessionRegistry;
use crate::game_session::{GameSession, GameSessionStatus};
use crate::session::{RegistryError, Session, SessionId, SessionRegistry, SessionState};
use arena_protocol::{GameStartPayload, MessageType, WaitingForOpponentPayload};
use derive_more::{Display, Error};
use std::collections::{HashSet, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn};

/// A queue entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedPlayer {
    /// The waiting session.
    pub session_id: SessionId,
    /// Its login name.
    pub username: String,
}

/// Queue failure.
#[derive(Debug, Clone, PartialEq, Eq, Display, Error, strum::IntoStaticStr)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueError {
    /// The session is already waiting.
    #[display("Player already in queue: {_0}")]
    AlreadyQueued(#[error(not(source))] SessionId),

    /// The session is not waiting.
    #[display("Player not in queue: {_0}")]
    NotQueued(#[error(not(source))] SessionId),

    /// Only logged-in sessions can queue.
    #[display("Player must log in before queueing")]
    NotLoggedIn,

    /// Nothing to dequeue.
    #[display("Queue is empty")]
    #[strum(serialize = "QUEUE_EMPTY")]
    Empty,

    /// The session could not be marked as waiting.
    #[display("{_0}")]
    Registry(RegistryError),
}

impl QueueError {
    /// Wire error code.
    pub fn code(&self) -> &'static str {
        match self {
            QueueError::Registry(e) => e.code(),
            other => other.into(),
        }
    }
}

impl From<RegistryError> for QueueError {
    fn from(err: RegistryError) -> Self {
        QueueError::Registry(err)
    }
}

/// Waiting players plus the pairing logic that turns them into matches.
///
/// Enqueueing wakes the pairing loop started by [`MatchmakingQueue::spawn`].
/// Pairing is all-or-nothing: if any step of seating two players fails, the
/// half-built match is removed and the players still connected go back to the
/// front of the queue in their original order.
#[derive(Debug)]
pub struct MatchmakingQueue {
    waiting: Mutex<VecDeque<QueuedPlayer>>,
    wakeup: Notify,
    sessions: Arc<SessionRegistry>,
    matches: Arc<GameSessionRegistry>,
    sender: Arc<ResponseSender>,
}

impl MatchmakingQueue {
    /// Creates an empty queue.
    pub fn new(
        sessions: Arc<SessionRegistry>,
        matches: Arc<GameSessionRegistry>,
        sender: Arc<ResponseSender>,
    ) -> Self {
        Self {
            waiting: Mutex::new(VecDeque::new()),
            wakeup: Notify::new(),
            sessions,
            matches,
            sender,
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<QueuedPlayer>> {
        self.waiting.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Adds a logged-in session to the back of the queue.
    ///
    /// Marks the session `WaitingForPair` and sends it a
    /// `WAITING_FOR_OPPONENT` notice.
    #[instrument(skip(self, session), fields(session_id = %session.id()))]
    pub fn enqueue(&self, session: &Session) -> Result<(), QueueError> {
        let username = session.username().clone().ok_or(QueueError::NotLoggedIn)?;
        {
            let mut waiting = self.lock();
            if waiting.iter().any(|p| p.session_id == *session.id()) {
                warn!("Player already in queue");
                return Err(QueueError::AlreadyQueued(session.id().clone()));
            }
            self.sessions
                .set_state(session.id(), SessionState::WaitingForPair)?;
            waiting.push_back(QueuedPlayer {
                session_id: session.id().clone(),
                username,
            });
            info!(queue_len = waiting.len(), "Player queued");
        }

        let notice = WaitingForOpponentPayload::new("Waiting for opponent...".to_string());
        if let Err(e) = self
            .sender
            .notify(session.id(), MessageType::WaitingForOpponent, &notice)
        {
            warn!(error = %e, "Failed to send waiting notice");
        }
        self.wakeup.notify_one();
        Ok(())
    }

    /// Pops the longest-waiting player.
    pub fn dequeue(&self) -> Result<QueuedPlayer, QueueError> {
        self.lock().pop_front().ok_or(QueueError::Empty)
    }

    /// Removes a session from wherever it sits in the queue.
    #[instrument(skip(self))]
    pub fn remove(&self, session_id: &str) -> Result<QueuedPlayer, QueueError> {
        let mut waiting = self.lock();
        let at = waiting
            .iter()
            .position(|p| p.session_id == session_id)
            .ok_or_else(|| QueueError::NotQueued(session_id.to_string()))?;
        let removed = waiting.remove(at).ok_or_else(|| QueueError::NotQueued(session_id.to_string()))?;
        debug!(queue_len = waiting.len(), "Player dequeued");
        Ok(removed)
    }

    /// Number of waiting players.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// True when nobody is waiting.
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// True if `session_id` is waiting.
    pub fn contains(&self, session_id: &str) -> bool {
        self.lock().iter().any(|p| p.session_id == session_id)
    }

    fn take_pair(&self, held: &HashSet<SessionId>) -> Option<(QueuedPlayer, QueuedPlayer)> {
        let mut waiting = self.lock();
        let free: Vec<usize> = waiting
            .iter()
            .enumerate()
            .filter(|(_, p)| !held.contains(&p.session_id))
            .map(|(at, _)| at)
            .take(2)
            .collect();
        let &[first, second] = free.as_slice() else {
            return None;
        };
        let second = waiting.remove(second)?;
        let first = waiting.remove(first)?;
        Some((first, second))
    }

    /// Pairs waiting players until fewer than two remain.
    ///
    /// A pair that fails is put back at the front and skipped for the rest of
    /// this pass, so players queued behind it still get matched. Returns the
    /// number of matches started.
    pub fn pair_waiting(&self) -> usize {
        let mut started = 0;
        let mut held = HashSet::new();
        while let Some((first, second)) = self.take_pair(&held) {
            match self.create_match(&first, &second) {
                Ok(_) => started += 1,
                Err(e) => {
                    warn!(error = %e, "Pairing failed");
                    held.insert(first.session_id);
                    held.insert(second.session_id);
                }
            }
        }
        started
    }

    /// Runs [`pair_waiting`](Self::pair_waiting) every time a player is queued.
    pub async fn run(self: Arc<Self>) {
        info!("Matchmaking started");
        loop {
            self.pair_waiting();
            self.wakeup.notified().await;
        }
    }

    /// Spawns [`run`](Self::run) on the current runtime.
    pub fn spawn(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Seats two players in a fresh match and starts it.
    #[instrument(skip(self), fields(first = %first.session_id, second = %second.session_id))]
    pub fn create_match(
        &self,
        first: &QueuedPlayer,
        second: &QueuedPlayer,
    ) -> Result<Arc<GameSession>, ServerError> {
        let game = self.matches.create();
        let seated = (|| -> Result<(), ServerError> {
            for player in [first, second] {
                self.matches
                    .add_player(game.id(), &player.session_id, &player.username)?;
            }
            for player in [first, second] {
                self.sessions
                    .set_state(&player.session_id, SessionState::InGame)?;
            }
            game.start()?;
            Ok(())
        })();

        if let Err(e) = seated {
            self.roll_back(&game, [first, second]);
            return Err(e);
        }

        info!(game_id = %game.id(), "Match started");
        self.announce_start(&game);
        Ok(game)
    }

    fn roll_back(&self, game: &GameSession, players: [&QueuedPlayer; 2]) {
        if let Err(e) = self.matches.remove_match(game.id()) {
            debug!(error = %e, "Game already gone during rollback");
        }
        let mut waiting = self.lock();
        for player in players.into_iter().rev() {
            if self
                .sessions
                .set_state(&player.session_id, SessionState::WaitingForPair)
                .is_ok()
            {
                waiting.push_front(player.clone());
            } else {
                debug!(session_id = %player.session_id, "Dropping disconnected player from queue");
            }
        }
        warn!(game_id = %game.id(), queue_len = waiting.len(), "Pairing rolled back");
    }

    #[instrument(skip(self, game), fields(game_id = %game.id()))]
    fn announce_start(&self, game: &GameSession) {
        let snapshot = game.snapshot();
        if snapshot.status != GameSessionStatus::InProgress {
            debug!(status = %snapshot.status, "Game ended before start was announced");
            return;
        }
        for player in [snapshot.player_x, snapshot.player_o].into_iter().flatten() {
            let payload = GameStartPayload::new(
                snapshot.id.clone(),
                player.mark.to_string(),
                player.mark == snapshot.to_move,
            );
            if let Err(e) = self
                .sender
                .notify(&player.session_id, MessageType::GameStart, &payload)
            {
                warn!(session_id = %player.session_id, error = %e, "Failed to send game start");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::SequentialGenerator;
    use crate::session::ConnectionHandle;
    use arena_protocol::decode_frame;
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Fixture {
        sessions: Arc<SessionRegistry>,
        matches: Arc<GameSessionRegistry>,
        queue: MatchmakingQueue,
    }

    fn fixture() -> Fixture {
        let ids = Arc::new(SequentialGenerator::new());
        let sessions = Arc::new(SessionRegistry::new(ids.clone()));
        let matches = Arc::new(GameSessionRegistry::new(ids));
        let sender = Arc::new(ResponseSender::new(Arc::clone(&sessions)));
        let queue = MatchmakingQueue::new(Arc::clone(&sessions), Arc::clone(&matches), sender);
        Fixture {
            sessions,
            matches,
            queue,
        }
    }

    fn logged_in(f: &Fixture, name: &str) -> (Session, UnboundedReceiver<Vec<u8>>) {
        let (conn, rx) = ConnectionHandle::channel(name);
        let session = f.sessions.create(conn);
        (f.sessions.login(session.id(), name).unwrap(), rx)
    }

    fn kinds(rx: &mut UnboundedReceiver<Vec<u8>>) -> Vec<MessageType> {
        std::iter::from_fn(|| rx.try_recv().ok())
            .filter_map(|frame| decode_frame(&frame).ok()?.kind())
            .collect()
    }

    #[test]
    fn test_enqueue_is_idempotent_per_session() {
        let f = fixture();
        let (a, mut rx) = logged_in(&f, "narik");

        f.queue.enqueue(&a).unwrap();
        let err = f.queue.enqueue(&a).unwrap_err();
        assert_eq!(err.code(), "ALREADY_QUEUED");
        assert_eq!(f.queue.len(), 1);
        assert_eq!(
            *f.sessions.get(a.id()).unwrap().state(),
            SessionState::WaitingForPair
        );
        assert_eq!(kinds(&mut rx), vec![MessageType::WaitingForOpponent]);
    }

    #[test]
    fn test_guest_cannot_queue() {
        let f = fixture();
        let (conn, _rx) = ConnectionHandle::channel("guest");
        let guest = f.sessions.create(conn);
        assert_eq!(f.queue.enqueue(&guest).unwrap_err().code(), "NOT_LOGGED_IN");
        assert!(f.queue.is_empty());
    }

    #[test]
    fn test_dequeue_and_remove() {
        let f = fixture();
        let (a, _ra) = logged_in(&f, "narik");
        let (b, _rb) = logged_in(&f, "santo");
        f.queue.enqueue(&a).unwrap();
        f.queue.enqueue(&b).unwrap();

        assert_eq!(f.queue.remove(b.id()).unwrap().username, "santo");
        assert_eq!(f.queue.remove(b.id()), Err(QueueError::NotQueued(b.id().clone())));
        assert_eq!(f.queue.dequeue().unwrap().session_id, *a.id());
        assert_eq!(f.queue.dequeue(), Err(QueueError::Empty));
    }

    #[test]
    fn test_pairing_starts_match_and_announces() {
        let f = fixture();
        let (a, mut ra) = logged_in(&f, "narik");
        let (b, mut rb) = logged_in(&f, "santo");
        f.queue.enqueue(&a).unwrap();
        f.queue.enqueue(&b).unwrap();

        assert_eq!(f.queue.pair_waiting(), 1);
        assert!(f.queue.is_empty());
        let game = f.matches.get_by_player(a.id()).unwrap();
        assert_eq!(game.status(), GameSessionStatus::InProgress);
        assert_eq!(*f.sessions.get(b.id()).unwrap().state(), SessionState::InGame);

        assert_eq!(
            kinds(&mut ra),
            vec![MessageType::WaitingForOpponent, MessageType::GameStart]
        );
        assert_eq!(
            kinds(&mut rb),
            vec![MessageType::WaitingForOpponent, MessageType::GameStart]
        );
    }

    #[test]
    fn test_pairing_with_disconnected_player_requeues_survivor() {
        let f = fixture();
        let (a, _ra) = logged_in(&f, "narik");
        let (b, _rb) = logged_in(&f, "santo");
        f.queue.enqueue(&a).unwrap();
        f.queue.enqueue(&b).unwrap();
        f.sessions.remove(a.id());

        assert_eq!(f.queue.pair_waiting(), 0);
        assert!(f.matches.is_empty());
        assert!(!f.matches.is_player_in_match(b.id()));
        assert_eq!(f.queue.len(), 1);
        assert!(f.queue.contains(b.id()));
        assert_eq!(
            *f.sessions.get(b.id()).unwrap().state(),
            SessionState::WaitingForPair
        );
    }

    #[test]
    fn test_pairing_rolls_back_when_a_seat_is_taken() {
        let f = fixture();
        let (a, _ra) = logged_in(&f, "narik");
        let (b, _rb) = logged_in(&f, "santo");
        let elsewhere = f.matches.create();
        f.matches.add_player(elsewhere.id(), b.id(), "santo").unwrap();
        f.queue.enqueue(&a).unwrap();
        f.queue.enqueue(&b).unwrap();

        assert_eq!(f.queue.pair_waiting(), 0);
        assert_eq!(f.queue.dequeue().unwrap().session_id, *a.id());
        assert_eq!(f.queue.dequeue().unwrap().session_id, *b.id());
        assert!(!f.matches.is_player_in_match(a.id()));
        assert_eq!(f.matches.len(), 1);
        assert!(f.matches.get(elsewhere.id()).is_some());
        assert_eq!(
            *f.sessions.get(a.id()).unwrap().state(),
            SessionState::WaitingForPair
        );
    }

    #[test]
    fn test_failed_pair_does_not_block_players_behind_it() {
        let f = fixture();
        let (a, _ra) = logged_in(&f, "narik");
        let (b, _rb) = logged_in(&f, "santo");
        let (c, _rc) = logged_in(&f, "carol");
        let (d, _rd) = logged_in(&f, "dave");
        let elsewhere = f.matches.create();
        f.matches.add_player(elsewhere.id(), b.id(), "santo").unwrap();
        for player in [&a, &b, &c, &d] {
            f.queue.enqueue(player).unwrap();
        }

        assert_eq!(f.queue.pair_waiting(), 1);
        let game = f.matches.get_by_player(c.id()).unwrap();
        assert!(game.has_player(d.id()));
        assert_eq!(game.status(), GameSessionStatus::InProgress);
        assert_eq!(f.queue.len(), 2);
        assert_eq!(f.queue.dequeue().unwrap().session_id, *a.id());
        assert_eq!(f.queue.dequeue().unwrap().session_id, *b.id());
    }

    #[test]
    fn test_start_is_not_announced_for_an_abandoned_game() {
        let f = fixture();
        let (a, mut ra) = logged_in(&f, "narik");
        let (b, _rb) = logged_in(&f, "santo");
        let game = f.matches.create();
        f.matches.add_player(game.id(), a.id(), "narik").unwrap();
        f.matches.add_player(game.id(), b.id(), "santo").unwrap();
        game.start().unwrap();
        f.matches.remove_player(b.id()).unwrap();

        f.queue.announce_start(&game);
        assert!(kinds(&mut ra).is_empty());
    }
}
