//! End-to-end flows driven through the router with in-memory connections.

mod common;

use arena_protocol::{GameEndPayload, GameResult, GameStartPayload, MessageType};
use arena_server::{GameSessionStatus, SessionState};
use common::{Client, paired, server};
use serde_json::json;

#[test]
fn test_login_then_pairing_announces_complementary_symbols() {
    let server = server();
    let mut a = Client::connect(&server, "a");
    let mut b = Client::connect(&server, "b");

    a.login(&server, "narik");
    b.login(&server, "santo");
    assert_eq!(server.queue().len(), 2);
    assert_eq!(server.queue().pair_waiting(), 1);

    let a_msgs = a.drain();
    let b_msgs = b.drain();
    let kinds: Vec<_> = a_msgs.iter().filter_map(|m| m.kind()).collect();
    assert_eq!(
        kinds,
        vec![
            MessageType::WaitingForOpponent,
            MessageType::LoginResponse,
            MessageType::GameStart
        ]
    );

    let start_a: GameStartPayload = a_msgs.last().unwrap().payload_as().unwrap();
    let start_b: GameStartPayload = b_msgs.last().unwrap().payload_as().unwrap();
    assert_eq!(start_a.game_id, start_b.game_id);
    assert_ne!(start_a.your_symbol, start_b.your_symbol);
    assert!(start_a.your_turn ^ start_b.your_turn);
    assert_eq!(start_a.your_symbol, "X");
    assert!(start_a.your_turn);
}

#[test]
fn test_login_response_carries_session_id() {
    let server = server();
    let mut a = Client::connect(&server, "a");
    a.login(&server, "narik");

    let response = a
        .drain()
        .into_iter()
        .find(|m| m.kind() == Some(MessageType::LoginResponse))
        .unwrap();
    assert_eq!(response.payload["is_authenticated"], json!(true));
    assert_eq!(response.payload["player_id"], json!(a.id));
}

#[test]
fn test_diagonal_win_ends_game_for_both() {
    let server = server();
    let (mut x, mut o) = paired(&server);

    x.play(&server, 0);
    o.play(&server, 1);
    x.play(&server, 4);
    o.play(&server, 2);

    let update = o.last();
    assert_eq!(update.kind(), Some(MessageType::PlayerMoveResponse));
    assert_eq!(update.payload["moved_by_user"], json!("O"));
    assert_eq!(update.payload["moved_to_position"], json!(2));
    assert_eq!(update.payload["turn_symbol"], json!("X"));

    x.play(&server, 8);
    for client in [&mut x, &mut o] {
        let end = client.last();
        assert_eq!(end.kind(), Some(MessageType::GameEnd));
        let end: GameEndPayload = end.payload_as().unwrap();
        assert_eq!(end, GameEndPayload::new(GameResult::Win, "X".into()));
    }

    let game = server.matches().get_by_player(&x.id).unwrap();
    assert_eq!(game.status(), GameSessionStatus::Completed);

    o.play(&server, 5);
    let err = o.last();
    assert_eq!(err.kind(), Some(MessageType::Error));
    assert_eq!(err.payload["code"], json!("GAME_ALREADY_OVER"));
}

#[test]
fn test_draw_reports_empty_winner() {
    let server = server();
    let (mut x, mut o) = paired(&server);

    // X O X / X O O / O X X
    for (client, pos) in [(&x, 0), (&o, 1), (&x, 2), (&o, 4), (&x, 3), (&o, 5), (&x, 7), (&o, 6)] {
        client.play(&server, pos);
    }
    x.play(&server, 8);

    for client in [&mut x, &mut o] {
        let end: GameEndPayload = client.last().payload_as().unwrap();
        assert_eq!(end.result, GameResult::Draw);
        assert_eq!(end.winner, "");
    }
}

#[test]
fn test_rejected_moves_only_reach_the_mover() {
    let server = server();
    let (mut x, mut o) = paired(&server);

    o.play(&server, 0);
    let err = o.last();
    assert_eq!(err.payload["code"], json!("NOT_YOUR_TURN"));
    assert!(x.drain().is_empty());

    x.play(&server, 4);
    o.drain();
    o.play(&server, 4);
    assert_eq!(o.last().payload["code"], json!("CELL_OCCUPIED"));

    o.play(&server, 42);
    assert_eq!(o.last().payload["code"], json!("INVALID_POSITION"));
    assert!(x.drain().len() == 1);
}

#[test]
fn test_client_symbol_is_ignored() {
    let server = server();
    let (mut x, _o) = paired(&server);

    x.send(
        &server,
        MessageType::PlayerMove,
        &json!({ "position": 4, "symbol": "O" }),
    );
    assert_eq!(x.last().payload["moved_by_user"], json!("X"));
}

#[test]
fn test_disconnect_mid_game_abandons_and_frees_opponent() {
    let server = server();
    let (x, mut o) = paired(&server);
    x.play(&server, 4);
    o.drain();

    server.disconnect(&x.id);

    let end: GameEndPayload = o.last().payload_as().unwrap();
    assert_eq!(end, GameEndPayload::new(GameResult::Abandoned, "O".into()));
    assert!(server.matches().is_empty());
    assert!(!server.matches().is_player_in_match(&o.id));
    assert_eq!(
        *server.sessions().get(&o.id).unwrap().state(),
        SessionState::LoggedIn
    );

    o.play(&server, 0);
    assert_eq!(o.last().payload["code"], json!("PLAYER_NOT_IN_MATCH"));
}

#[test]
fn test_unknown_user_stays_guest() {
    let server = server();
    let mut a = Client::connect(&server, "a");
    a.login(&server, "mallory");

    let err = a.last();
    assert_eq!(err.kind(), Some(MessageType::Error));
    assert_eq!(err.payload["code"], json!("USER_NOT_FOUND"));
    assert_eq!(
        *server.sessions().get(&a.id).unwrap().state(),
        SessionState::Guest
    );
    assert!(server.queue().is_empty());

    a.login(&server, "narik");
    assert!(a.kinds().contains(&MessageType::LoginResponse));
}

#[test]
fn test_username_cannot_be_shared() {
    let server = server();
    let mut a = Client::connect(&server, "a");
    let mut b = Client::connect(&server, "b");
    a.login(&server, "narik");
    a.drain();

    b.login(&server, "narik");
    assert_eq!(b.last().payload["code"], json!("USERNAME_IN_USE"));

    server.disconnect(&a.id);
    b.login(&server, "narik");
    assert!(b.kinds().contains(&MessageType::LoginResponse));
}

#[test]
fn test_second_login_is_invalid_state() {
    let server = server();
    let mut a = Client::connect(&server, "a");
    a.login(&server, "narik");
    a.drain();

    a.login(&server, "santo");
    assert_eq!(a.last().payload["code"], json!("INVALID_STATE"));
}

#[test]
fn test_unknown_type_and_heartbeat() {
    let server = server();
    let mut a = Client::connect(&server, "a");

    a.send(&server, MessageType::Heartbeat, &());
    let ack = a.last();
    assert_eq!(ack.kind(), Some(MessageType::HeartbeatResponse));
    assert!(ack.payload.is_null());

    a.send(&server, MessageType::GameEnd, &json!({}));
    assert_eq!(a.last().payload["code"], json!("UNKNOWN_MESSAGE_TYPE"));
}

#[test]
fn test_disconnect_while_queued_leaves_queue() {
    let server = server();
    let a = Client::connect(&server, "a");
    a.login(&server, "narik");
    assert_eq!(server.queue().len(), 1);

    server.disconnect(&a.id);
    assert!(server.queue().is_empty());
    assert!(server.sessions().is_empty());
    assert!(server.sessions().get_by_username("narik").is_none());
}

#[test]
fn test_sweep_frees_players_of_finished_games() {
    let server = server();
    let (x, o) = paired(&server);
    for (client, pos) in [(&x, 0), (&o, 3), (&x, 1), (&o, 4), (&x, 2)] {
        client.play(&server, pos);
    }

    assert_eq!(server.sweep_matches(chrono::Utc::now()), 0);
    let later = chrono::Utc::now() + chrono::Duration::minutes(10);
    assert_eq!(server.sweep_matches(later), 1);
    assert!(server.matches().is_empty());
    for id in [&x.id, &o.id] {
        assert_eq!(
            *server.sessions().get(id).unwrap().state(),
            SessionState::LoggedIn
        );
    }
}

#[test]
fn test_sweep_skips_players_whose_session_is_gone() {
    let server = server();
    let (x, o) = paired(&server);
    for (client, pos) in [(&x, 0), (&o, 3), (&x, 1), (&o, 4), (&x, 2)] {
        client.play(&server, pos);
    }
    server.sessions().remove(&o.id);

    let later = chrono::Utc::now() + chrono::Duration::minutes(10);
    assert_eq!(server.sweep_matches(later), 1);
    assert!(server.sessions().get(&o.id).is_none());
    assert_eq!(
        *server.sessions().get(&x.id).unwrap().state(),
        SessionState::LoggedIn
    );
}
