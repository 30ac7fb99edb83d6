#![allow(dead_code)]

use std::net::SocketAddr;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::Value;
use server::config::Config;
use server::{app, Services};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type Ws = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(5);

/// A server bound to an ephemeral local port, without an engine.
pub struct TestServer {
    pub addr: SocketAddr,
    pub services: Services,
}

impl TestServer {
    /// Build a URL for an API endpoint.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }
}

pub async fn spawn_server() -> TestServer {
    let config = Config::default();
    let services = Services::new(&config);
    let router = app(config, &services);

    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind test listener");
    let addr = listener.local_addr().expect("No local address");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server error");
    });

    TestServer { addr, services }
}

/// Build a reqwest client for tests.
pub fn client() -> Client {
    Client::new()
}

/// Open a socket and consume the `connected` greeting. Returns the socket
/// and the assigned player id.
pub async fn ws_connect(server: &TestServer) -> (Ws, String) {
    let (mut ws, _) = connect_async(server.ws_url())
        .await
        .expect("Failed to open websocket");
    let hello = recv(&mut ws).await;
    assert_eq!(hello["type"], "connected");
    let player_id = hello["player_id"]
        .as_str()
        .expect("player_id missing")
        .to_string();
    (ws, player_id)
}

pub async fn send(ws: &mut Ws, event: Value) {
    ws.send(Message::text(event.to_string()))
        .await
        .expect("Failed to send");
}

pub async fn send_raw(ws: &mut Ws, text: &str) {
    ws.send(Message::text(text)).await.expect("Failed to send");
}

/// Next JSON event from the server.
pub async fn recv(ws: &mut Ws) -> Value {
    loop {
        let msg = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("Timed out waiting for server event")
            .expect("Socket closed")
            .expect("Socket error");
        if let Message::Text(t) = msg {
            return serde_json::from_str(t.as_str()).expect("Server sent invalid JSON");
        }
    }
}

/// Skip events until one of type `kind` arrives.
pub async fn recv_type(ws: &mut Ws, kind: &str) -> Value {
    loop {
        let event = recv(ws).await;
        if event["type"] == kind {
            return event;
        }
    }
}

/// Assert that nothing arrives within a short window.
pub async fn assert_silent(ws: &mut Ws) {
    let quiet = tokio::time::timeout(Duration::from_millis(200), ws.next()).await;
    assert!(quiet.is_err(), "unexpected event: {quiet:?}");
}

/// Create a game and return `(session_id, role)`.
pub async fn create_game(ws: &mut Ws, seat: Option<&str>) -> (String, String) {
    let mut event = serde_json::json!({ "type": "create_game" });
    if let Some(seat) = seat {
        event["seat"] = Value::from(seat);
    }
    send(ws, event).await;
    let created = recv_type(ws, "game_created").await;
    (
        created["session_id"].as_str().unwrap().to_string(),
        created["role"].as_str().unwrap().to_string(),
    )
}

pub async fn join_game(ws: &mut Ws, session_id: &str) -> Value {
    send(
        ws,
        serde_json::json!({ "type": "join_game", "session_id": session_id }),
    )
    .await;
    recv_type(ws, "game_joined").await
}

pub async fn make_move(ws: &mut Ws, session_id: &str, from: &str, to: &str) {
    send(
        ws,
        serde_json::json!({
            "type": "make_move",
            "session_id": session_id,
            "from": from,
            "to": to,
        }),
    )
    .await;
}

/// Poll the lobby until `pred` holds, for cleanup that happens after a
/// socket closes.
pub async fn wait_for_lobby(server: &TestServer, pred: impl Fn(&Value) -> bool) -> Value {
    let client = client();
    for _ in 0..50 {
        let body: Value = client
            .get(server.url("/api/active_games"))
            .send()
            .await
            .expect("Failed to query lobby")
            .json()
            .await
            .expect("Lobby returned invalid JSON");
        if pred(&body) {
            return body;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("lobby never reached the expected state");
}
