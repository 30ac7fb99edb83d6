//! WebSocket multiplayer route.
//!
//! Each socket is one participant identity. Inbound frames are parsed into
//! `ClientEvent`s and handed to the connection router; a writer task drains
//! the connection's outbox onto the socket so a slow client never holds up
//! anyone else.

use std::sync::Arc;

use axum::{
    extract::ws::{Message, WebSocket, WebSocketUpgrade},
    response::IntoResponse,
    Extension,
};
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::config::Config;
use crate::multiplayer::{ClientEvent, ConnectionId, ConnectionRouter, ServerEvent};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Extension(router): Extension<Arc<ConnectionRouter>>,
    Extension(config): Extension<Config>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, router, config.broadcast_buffer))
}

async fn handle_socket(socket: WebSocket, router: Arc<ConnectionRouter>, buffer: usize) {
    let (mut sender, mut receiver) = socket.split();
    let identity = ConnectionId::new();
    let (tx, mut rx) = mpsc::channel::<ServerEvent>(buffer);

    let writer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            let json = match serde_json::to_string(&event) {
                Ok(json) => json,
                Err(e) => {
                    warn!("Failed to serialize {}: {e}", event.kind());
                    continue;
                }
            };
            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
        let _ = sender.close().await;
    });

    router.on_connect(identity, tx).await;

    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(t) => t.to_string(),
            Message::Close(_) => break,
            _ => continue,
        };

        match serde_json::from_str::<ClientEvent>(&text) {
            Ok(event) => router.handle(identity, event).await,
            Err(e) => {
                router
                    .send_error(identity, format!("Invalid message: {e}"))
                    .await;
            }
        }
    }

    router.on_disconnect(identity).await;
    writer.abort();
    debug!(connection = %identity, "Socket closed");
}
