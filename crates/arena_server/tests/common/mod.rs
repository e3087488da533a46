//! Shared helpers for server integration tests.

#![allow(dead_code)]

use arena_protocol::{DecodedMessage, MessageType, decode_frame, encode};
use arena_server::{
    ConnectionHandle, GameServer, SequentialGenerator, ServerConfig, SessionId,
    StaticUserDirectory,
};
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedReceiver;

/// A server with deterministic ids and the default user list.
pub fn server() -> GameServer {
    let config = ServerConfig::default();
    let users = Arc::new(StaticUserDirectory::new(config.users().iter().cloned()));
    GameServer::new(config, users, Arc::new(SequentialGenerator::new()))
}

/// Decodes `payload` the same way a frame off the wire would be.
pub fn message<P: Serialize>(kind: MessageType, payload: &P) -> DecodedMessage {
    decode_frame(&encode(kind, payload).unwrap()).unwrap()
}

/// An in-memory client: a session plus the frames written to it.
pub struct Client {
    pub id: SessionId,
    rx: UnboundedReceiver<Vec<u8>>,
}

impl Client {
    pub fn connect(server: &GameServer, name: &str) -> Self {
        let (conn, rx) = ConnectionHandle::channel(name);
        let session = server.sessions().create(conn);
        Self {
            id: session.id().clone(),
            rx,
        }
    }

    pub fn send<P: Serialize>(&self, server: &GameServer, kind: MessageType, payload: &P) {
        assert!(server.process_message(&self.id, &message(kind, payload)));
    }

    pub fn login(&self, server: &GameServer, username: &str) {
        self.send(
            server,
            MessageType::LoginRequest,
            &serde_json::json!({ "username": username }),
        );
    }

    pub fn play(&self, server: &GameServer, position: i64) {
        self.send(
            server,
            MessageType::PlayerMove,
            &serde_json::json!({ "position": position }),
        );
    }

    /// Everything received so far.
    pub fn drain(&mut self) -> Vec<DecodedMessage> {
        std::iter::from_fn(|| self.rx.try_recv().ok())
            .map(|frame| decode_frame(&frame).unwrap())
            .collect()
    }

    /// The most recent message, discarding earlier ones.
    pub fn last(&mut self) -> DecodedMessage {
        self.drain().pop().expect("no message received")
    }

    /// Types of everything received so far.
    pub fn kinds(&mut self) -> Vec<MessageType> {
        self.drain().iter().filter_map(|m| m.kind()).collect()
    }
}

/// Logs two clients in and pairs them. Returns (X, O).
pub fn paired(server: &GameServer) -> (Client, Client) {
    let mut a = Client::connect(server, "a");
    let mut b = Client::connect(server, "b");
    a.login(server, "narik");
    b.login(server, "santo");
    assert_eq!(server.queue().pair_waiting(), 1);
    a.drain();
    b.drain();
    (a, b)
}

pub fn payload_field<'a>(msg: &'a DecodedMessage, field: &str) -> &'a Value {
    &msg.payload[field]
}
