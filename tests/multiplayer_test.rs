//! End-to-end multiplayer tests over real WebSocket connections.

mod common;

use common::{
    assert_silent, create_game, join_game, make_move, recv, recv_type, send, send_raw,
    spawn_server, wait_for_lobby, ws_connect,
};
use serde_json::json;

// ---------------------------------------------------------------------------
// Create / join / move
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_create_join_and_move() {
    let server = spawn_server().await;
    let (mut x, _) = ws_connect(&server).await;
    let (mut y, _) = ws_connect(&server).await;

    send(&mut x, json!({ "type": "create_game" })).await;
    let created = recv_type(&mut x, "game_created").await;
    assert_eq!(created["role"], "white");
    assert_eq!(created["snapshot"]["status"], "waiting");
    assert_eq!(created["snapshot"]["players"]["white"], true);
    assert_eq!(created["snapshot"]["players"]["black"], false);
    let sid = created["session_id"].as_str().unwrap().to_string();
    assert_eq!(sid.len(), 8);

    let joined = join_game(&mut y, &sid).await;
    assert_eq!(joined["role"], "black");
    assert_eq!(joined["snapshot"]["status"], "active");

    let notice = recv_type(&mut x, "player_joined").await;
    assert_eq!(notice["snapshot"]["players"]["black"], true);

    make_move(&mut x, &sid, "e2", "e4").await;
    let made_x = recv_type(&mut x, "move_made").await;
    let made_y = recv_type(&mut y, "move_made").await;
    assert_eq!(made_x["snapshot"], made_y["snapshot"]);
    assert_eq!(made_y["snapshot"]["current_turn"], "black");
    assert_eq!(made_y["snapshot"]["move_count"], 1);
    assert_eq!(
        made_y["snapshot"]["history"],
        json!([{ "number": 1, "white": "e4", "black": "" }])
    );

    // Only the opponent hears the cue
    let cue = recv(&mut y).await;
    assert_eq!(cue, json!({ "type": "move_cue", "sound": "move" }));
    assert_silent(&mut x).await;
}

#[tokio::test]
async fn test_requested_seat_and_alias_fields() {
    let server = spawn_server().await;
    let (mut x, _) = ws_connect(&server).await;
    let (mut y, _) = ws_connect(&server).await;

    let (sid, role) = create_game(&mut x, Some("black")).await;
    assert_eq!(role, "black");

    send(&mut y, json!({ "type": "join_game", "game_id": sid, "color": "random" })).await;
    let joined = recv_type(&mut y, "game_joined").await;
    assert_eq!(joined["role"], "white");

    send(
        &mut y,
        json!({ "type": "make_multiplayer_move", "game_id": sid, "from": "g1", "to": "f3" }),
    )
    .await;
    let made = recv_type(&mut x, "move_made").await;
    assert_eq!(made["snapshot"]["history"][0]["white"], "Nf3");
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_out_of_turn_and_illegal_moves_rejected() {
    let server = spawn_server().await;
    let (mut x, _) = ws_connect(&server).await;
    let (mut y, _) = ws_connect(&server).await;
    let (sid, _) = create_game(&mut x, None).await;
    join_game(&mut y, &sid).await;
    recv_type(&mut x, "player_joined").await;

    make_move(&mut y, &sid, "e7", "e5").await;
    let err = recv(&mut y).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["message"], "Not your turn");
    assert_silent(&mut x).await;

    make_move(&mut x, &sid, "e2", "e5").await;
    let err = recv(&mut x).await;
    assert_eq!(err["type"], "error");
    assert!(err["message"].as_str().unwrap().starts_with("Illegal move"));
    assert_silent(&mut y).await;

    // The board is untouched
    send(&mut y, json!({ "type": "get_state", "session_id": sid })).await;
    let state = recv_type(&mut y, "game_state").await;
    assert_eq!(state["snapshot"]["move_count"], 0);
}

#[tokio::test]
async fn test_move_before_opponent_arrives() {
    let server = spawn_server().await;
    let (mut x, _) = ws_connect(&server).await;
    let (sid, _) = create_game(&mut x, None).await;

    make_move(&mut x, &sid, "e2", "e4").await;
    let err = recv_type(&mut x, "error").await;
    assert_eq!(err["message"], "Not your turn");
}

#[tokio::test]
async fn test_unknown_session_and_bad_json() {
    let server = spawn_server().await;
    let (mut x, _) = ws_connect(&server).await;

    send(&mut x, json!({ "type": "join_game", "session_id": "deadbeef" })).await;
    let err = recv(&mut x).await;
    assert_eq!(err["type"], "error");
    assert_eq!(err["message"], "Game deadbeef not found");

    send_raw(&mut x, "{not json").await;
    let err = recv(&mut x).await;
    assert_eq!(err["type"], "error");
    assert!(err["message"].as_str().unwrap().starts_with("Invalid message"));

    send(&mut x, json!({ "type": "fly_to_moon" })).await;
    let err = recv(&mut x).await;
    assert_eq!(err["type"], "error");

    // The connection is still usable
    let (_, role) = create_game(&mut x, None).await;
    assert_eq!(role, "white");
}

// ---------------------------------------------------------------------------
// Spectators and finished games
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_spectator_follows_game_to_checkmate() {
    let server = spawn_server().await;
    let (mut x, _) = ws_connect(&server).await;
    let (mut y, _) = ws_connect(&server).await;
    let (mut z, _) = ws_connect(&server).await;
    let (sid, _) = create_game(&mut x, None).await;
    join_game(&mut y, &sid).await;

    let watched = join_game(&mut z, &sid).await;
    assert_eq!(watched["role"], "spectator");
    assert_eq!(watched["snapshot"]["spectator_count"], 1);

    // Each mover waits for its own echo so the next move sees the new turn
    for (white_turn, from, to) in [
        (true, "f2", "f3"),
        (false, "e7", "e5"),
        (true, "g2", "g4"),
        (false, "d8", "h4"),
    ] {
        let ws = if white_turn { &mut x } else { &mut y };
        make_move(ws, &sid, from, to).await;
        recv_type(ws, "move_made").await;
    }

    let mut last = json!(null);
    for _ in 0..4 {
        last = recv_type(&mut z, "move_made").await;
    }
    let snapshot = &last["snapshot"];
    assert_eq!(snapshot["status"], "finished");
    assert_eq!(snapshot["game_over"], true);
    assert_eq!(snapshot["result"], "0-1 (checkmate)");
    assert_eq!(snapshot["termination"], "checkmate");
    assert_eq!(snapshot["history"][1]["black"], "Qh4#");

    let cue = recv_type(&mut z, "move_cue").await;
    assert!(cue["sound"].is_string());

    // Spectators cannot move, and nobody can after the end
    make_move(&mut z, &sid, "e2", "e4").await;
    let err = recv_type(&mut z, "error").await;
    assert_eq!(err["message"], "Game is already over");
}

// ---------------------------------------------------------------------------
// Leaving and cleanup
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_disconnect_frees_seat() {
    let server = spawn_server().await;
    let (mut x, _) = ws_connect(&server).await;
    let (mut y, _) = ws_connect(&server).await;
    let (sid, _) = create_game(&mut x, None).await;
    join_game(&mut y, &sid).await;
    make_move(&mut x, &sid, "e2", "e4").await;
    recv_type(&mut y, "move_made").await;

    x.close(None).await.expect("Failed to close");
    drop(x);

    let left = recv_type(&mut y, "player_left").await;
    assert_eq!(left["snapshot"]["status"], "waiting");
    assert_eq!(left["snapshot"]["players"]["white"], false);
    assert_eq!(left["snapshot"]["players"]["black"], true);
    assert_eq!(left["snapshot"]["move_count"], 1);

    // A newcomer takes the vacant white seat and the game resumes
    let (mut w, _) = ws_connect(&server).await;
    let joined = join_game(&mut w, &sid).await;
    assert_eq!(joined["role"], "white");
    assert_eq!(joined["snapshot"]["status"], "active");
    make_move(&mut y, &sid, "e7", "e5").await;
    let made = recv_type(&mut w, "move_made").await;
    assert_eq!(made["snapshot"]["move_count"], 2);
}

#[tokio::test]
async fn test_lobby_lists_and_collects_sessions() {
    let server = spawn_server().await;
    let (mut x, _) = ws_connect(&server).await;
    let (mut y, _) = ws_connect(&server).await;
    let (sid, _) = create_game(&mut x, None).await;

    let lobby = wait_for_lobby(&server, |b| b["games"].as_array().map(Vec::len) == Some(1)).await;
    let row = &lobby["games"][0];
    assert_eq!(row["session_id"], sid.as_str());
    assert_eq!(row["status"], "waiting");
    assert_eq!(row["seats"], json!({ "white": true, "black": false }));

    join_game(&mut y, &sid).await;
    send(&mut x, json!({ "type": "leave_game", "session_id": sid })).await;
    let left = recv_type(&mut y, "player_left").await;
    assert_eq!(left["snapshot"]["players"]["white"], false);

    send(&mut y, json!({ "type": "leave_game", "session_id": sid })).await;
    wait_for_lobby(&server, |b| b["games"].as_array().map(Vec::len) == Some(0)).await;

    send(&mut x, json!({ "type": "join_game", "session_id": sid })).await;
    let err = recv_type(&mut x, "error").await;
    assert!(err["message"].as_str().unwrap().contains("not found"));
}

#[tokio::test]
async fn test_concurrent_creates_get_distinct_sessions() {
    let server = spawn_server().await;
    let mut tasks = Vec::new();
    for _ in 0..8 {
        let url = server.ws_url();
        tasks.push(tokio::spawn(async move {
            let (mut ws, _) = tokio_tungstenite::connect_async(url).await.unwrap();
            recv_type(&mut ws, "connected").await;
            let (sid, role) = create_game(&mut ws, None).await;
            (ws, sid, role)
        }));
    }

    let mut sockets = Vec::new();
    let mut ids = Vec::new();
    for t in tasks {
        let (ws, sid, role) = t.await.unwrap();
        assert_eq!(role, "white");
        ids.push(sid);
        sockets.push(ws);
    }
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
    assert_eq!(server.services.router.registry().len().await, 8);
}
