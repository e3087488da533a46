//! Encoding a response and decoding it again preserves type and payload.

use arena_protocol::{
    CodecError, ErrorPayload, FrameDecoder, GameEndPayload, GameResult, GameStartPayload,
    MessageType, PlayerMoveResponsePayload, decode_frame, encode, wrap_legacy,
};
use serde_json::json;

#[test]
fn test_game_start_survives_round_trip() {
    let payload = GameStartPayload::new("game-1".to_string(), "O".to_string(), false);
    let frame = encode(MessageType::GameStart, &payload).unwrap();

    let decoded = decode_frame(&frame).unwrap();
    assert_eq!(decoded.kind(), Some(MessageType::GameStart));
    assert_eq!(decoded.payload_as::<GameStartPayload>().unwrap(), payload);
}

#[test]
fn test_legacy_wrapping_survives_round_trip() {
    let payload = PlayerMoveResponsePayload::new("X".to_string(), 4, "O".to_string());
    let frame = encode(MessageType::PlayerMoveResponse, &payload).unwrap();

    let decoded = decode_frame(&wrap_legacy(&frame)).unwrap();
    assert_eq!(decoded.message_type, "PLAYER_MOVE_RESPONSE");
    assert_eq!(
        decoded.payload,
        json!({ "moved_by_user": "X", "moved_to_position": 4, "turn_symbol": "O" })
    );
}

#[test]
fn test_payload_mismatch_is_invalid_encoding() {
    let frame = encode(
        MessageType::GameEnd,
        &GameEndPayload::new(GameResult::Win, "X".to_string()),
    )
    .unwrap();
    let decoded = decode_frame(&frame).unwrap();
    assert!(matches!(
        decoded.payload_as::<ErrorPayload>(),
        Err(CodecError::InvalidEncoding(_))
    ));
}

#[tokio::test]
async fn test_many_frames_over_one_stream() {
    let mut stream = Vec::new();
    for position in 0..9 {
        let payload = PlayerMoveResponsePayload::new("X".to_string(), position, "O".to_string());
        stream.extend(encode(MessageType::PlayerMoveResponse, &payload).unwrap());
    }

    let mut decoder = FrameDecoder::new(stream.as_slice());
    let mut positions = Vec::new();
    while let Some(msg) = decoder.decode().await.unwrap() {
        let payload: PlayerMoveResponsePayload = msg.payload_as().unwrap();
        positions.push(payload.moved_to_position);
    }
    assert_eq!(positions, (0..9).collect::<Vec<_>>());
}
