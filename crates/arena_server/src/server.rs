//! TCP front end: accepts connections and wires them to the game services.

use crate::config::ServerConfig;
use crate::delivery::{HandlerResponse, ResponseSender};
use crate::error::ServerError;
use crate::game_registry::GameSessionRegistry;
use crate::game_session::{GameSessionStatus, MatchError};
use crate::handlers::{HeartbeatHandler, LoginHandler, PlayerMoveHandler};
use crate::ids::{IdGenerator, UuidGenerator};
use crate::matchmaking::MatchmakingQueue;
use crate::router::MessageRouter;
use crate::session::{ConnectionHandle, SessionId, SessionRegistry, SessionState};
use crate::users::{StaticUserDirectory, UserDirectory};
use arena_protocol::{DecodedMessage, FrameDecoder, GameEndPayload, GameResult, MessageType};
use chrono::{DateTime, Utc};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufReader};
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, instrument, warn};

/// Aborts background tasks when the server future is dropped.
struct BackgroundTasks(Vec<JoinHandle<()>>);

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        for task in &self.0 {
            task.abort();
        }
    }
}

/// The game server: session registry, match registry, matchmaking queue and
/// router, plus the TCP plumbing in front of them.
#[derive(Debug)]
pub struct GameServer {
    config: ServerConfig,
    sessions: Arc<SessionRegistry>,
    matches: Arc<GameSessionRegistry>,
    queue: Arc<MatchmakingQueue>,
    sender: Arc<ResponseSender>,
    router: MessageRouter,
}

impl GameServer {
    /// Builds a server from its collaborators.
    pub fn new(
        config: ServerConfig,
        users: Arc<dyn UserDirectory>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let sessions = Arc::new(SessionRegistry::new(Arc::clone(&ids)));
        let matches = Arc::new(GameSessionRegistry::new(ids));
        let sender = Arc::new(ResponseSender::new(Arc::clone(&sessions)));
        let queue = Arc::new(MatchmakingQueue::new(
            Arc::clone(&sessions),
            Arc::clone(&matches),
            Arc::clone(&sender),
        ));

        let mut router = MessageRouter::new();
        router.register_handler(
            MessageType::LoginRequest,
            LoginHandler::new(users, Arc::clone(&sessions), Arc::clone(&queue)),
        );
        router.register_handler(
            MessageType::PlayerMove,
            PlayerMoveHandler::new(Arc::clone(&matches)),
        );
        router.register_handler(
            MessageType::Heartbeat,
            HeartbeatHandler::new(Arc::clone(&sessions)),
        );

        Self {
            config,
            sessions,
            matches,
            queue,
            sender,
            router,
        }
    }

    /// Builds a server with the configured user list and UUID ids.
    pub fn from_config(config: ServerConfig) -> Self {
        let users = Arc::new(StaticUserDirectory::new(config.users().iter().cloned()));
        Self::new(config, users, Arc::new(UuidGenerator))
    }

    /// Configuration in use.
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Live sessions.
    pub fn sessions(&self) -> &Arc<SessionRegistry> {
        &self.sessions
    }

    /// Live matches.
    pub fn matches(&self) -> &Arc<GameSessionRegistry> {
        &self.matches
    }

    /// Matchmaking queue.
    pub fn queue(&self) -> &Arc<MatchmakingQueue> {
        &self.queue
    }

    /// Message router.
    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    /// Binds the configured address.
    #[instrument(skip(self), fields(addr = %self.config.bind_addr()))]
    pub async fn bind(&self) -> Result<TcpListener, ServerError> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!(local_addr = ?listener.local_addr().ok(), "Listening");
        Ok(listener)
    }

    /// Accepts connections forever.
    ///
    /// Starts the matchmaking loop and the match sweep alongside; both stop
    /// when this future is dropped.
    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), ServerError> {
        let _background = BackgroundTasks(vec![self.queue.spawn(), self.spawn_sweeper()]);

        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    error!(error = %e, "Accept failed");
                    continue;
                }
            };
            let server = Arc::clone(&self);
            tokio::spawn(
                async move { server.handle_connection(stream, peer).await }
                    .instrument(info_span!("connection", %peer)),
            );
        }
    }

    /// Runs one client connection to completion.
    pub async fn handle_connection(self: Arc<Self>, stream: TcpStream, peer: SocketAddr) {
        if let Err(e) = stream.set_nodelay(true) {
            debug!(error = %e, "Failed to set TCP_NODELAY");
        }
        let (read_half, mut write_half) = stream.into_split();
        let (connection, mut outbound) = ConnectionHandle::channel(peer.to_string());

        let writer = tokio::spawn(
            async move {
                while let Some(frame) = outbound.recv().await {
                    if let Err(e) = write_half.write_all(&frame).await {
                        warn!(error = %e, "Write failed");
                        break;
                    }
                }
                let _ = write_half.shutdown().await;
            }
            .in_current_span(),
        );

        let session = self.sessions.create(connection);
        let session_id = session.id().clone();
        info!(%session_id, "Client connected");

        match HandlerResponse::reply(MessageType::LoginRequest, &()) {
            Ok(prompt) => {
                if let Err(e) = self.sender.send(&session, &prompt) {
                    warn!(error = %e, "Failed to send login prompt");
                }
            }
            Err(e) => error!(error = %e, "Failed to encode login prompt"),
        }
        drop(session);

        self.read_loop(&session_id, read_half).await;
        self.disconnect(&session_id);

        if let Err(e) = writer.await {
            debug!(error = %e, "Writer task ended abnormally");
        }
        info!(%session_id, "Client disconnected");
    }

    async fn read_loop(&self, session_id: &SessionId, read_half: OwnedReadHalf) {
        let mut decoder = FrameDecoder::new(BufReader::new(read_half));
        loop {
            match decoder.decode().await {
                Ok(Some(message)) => {
                    if !self.process_message(session_id, &message) {
                        break;
                    }
                }
                Ok(None) => {
                    debug!("Peer closed the connection");
                    break;
                }
                Err(e) if e.is_fatal() => {
                    warn!(error = %e, "Connection read failed");
                    break;
                }
                Err(e) => {
                    debug!(error = %e, "Rejected frame");
                    self.report(session_id, &e.into());
                }
            }
        }
    }

    /// Routes one decoded message and delivers the handler's response.
    ///
    /// Returns `false` once the session no longer exists.
    #[instrument(skip(self, message), fields(message_type = %message.message_type))]
    pub fn process_message(&self, session_id: &str, message: &DecodedMessage) -> bool {
        let Some(session) = self.sessions.get(session_id) else {
            return false;
        };
        match self.router.route(message, &session) {
            Ok(response) => {
                if let Err(e) = self.sender.deliver(&session, &response) {
                    warn!(error = %e, "Failed to deliver response");
                }
            }
            Err(e) => self.report(session_id, &e.into()),
        }
        true
    }

    fn report(&self, session_id: &str, error: &ServerError) {
        let Some(session) = self.sessions.get(session_id) else {
            return;
        };
        if let Err(e) = self.sender.send_error(&session, error) {
            warn!(error = %e, "Failed to send error");
        }
    }

    /// Releases everything a departing session holds.
    ///
    /// The session is removed first so that a pairing racing with the
    /// disconnect fails and rolls back instead of seating a ghost.
    #[instrument(skip(self))]
    pub fn disconnect(&self, session_id: &str) {
        self.sessions.remove(session_id);

        if self.queue.remove(session_id).is_ok() {
            debug!("Removed from matchmaking queue");
        }

        match self.matches.remove_player(session_id) {
            Ok(removal) => {
                if removal.status != GameSessionStatus::Abandoned {
                    return;
                }
                let Some(remaining) = removal.remaining else {
                    return;
                };
                info!(game_id = %removal.match_id, remaining = %remaining.session_id, "Opponent left");
                if let Err(e) = self
                    .sessions
                    .set_state(&remaining.session_id, SessionState::LoggedIn)
                {
                    debug!(error = %e, "Remaining player already gone");
                }
                let payload = GameEndPayload::new(GameResult::Abandoned, remaining.mark.to_string());
                if let Err(e) =
                    self.sender
                        .notify(&remaining.session_id, MessageType::GameEnd, &payload)
                {
                    warn!(error = %e, "Failed to notify remaining player");
                }
            }
            Err(MatchError::PlayerNotInMatch) => {}
            Err(e) => warn!(error = %e, "Failed to remove player from game"),
        }
    }

    /// Sweeps stale matches and frees their players for a new login state.
    #[instrument(skip(self))]
    pub fn sweep_matches(&self, now: DateTime<Utc>) -> usize {
        let swept = self.matches.sweep(now, &self.config.sweep_policy());
        for game in &swept {
            for player in &game.players {
                let in_game = self
                    .sessions
                    .get(player)
                    .is_some_and(|s| *s.state() == SessionState::InGame);
                if !in_game {
                    continue;
                }
                if let Err(e) = self.sessions.set_state(player, SessionState::LoggedIn) {
                    debug!(session_id = %player, error = %e, "Player left before sweep reset");
                }
            }
        }
        swept.len()
    }

    fn spawn_sweeper(self: &Arc<Self>) -> JoinHandle<()> {
        let server = Arc::clone(self);
        tokio::spawn(async move {
            let period = server.config.sweep_interval().max(Duration::from_secs(1));
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let swept = server.sweep_matches(Utc::now());
                debug!(swept, live = server.matches.len(), "Sweep tick");
            }
        })
    }
}
