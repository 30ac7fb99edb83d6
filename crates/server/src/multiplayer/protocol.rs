//! JSON events exchanged over the multiplayer socket, tagged by `"type"`.

use serde::{Deserialize, Serialize};

use super::seat::{Role, SeatRequest};
use super::session::Snapshot;
use super::{ConnectionId, SessionId};

/// Client → Server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    CreateGame {
        #[serde(default, alias = "color")]
        seat: Option<SeatRequest>,
    },
    JoinGame {
        #[serde(alias = "game_id")]
        session_id: SessionId,
        #[serde(default, alias = "color")]
        seat: Option<SeatRequest>,
    },
    #[serde(alias = "make_multiplayer_move")]
    MakeMove {
        #[serde(alias = "game_id")]
        session_id: SessionId,
        from: String,
        to: String,
        #[serde(default)]
        promotion: Option<String>,
    },
    GetState {
        #[serde(alias = "game_id")]
        session_id: SessionId,
    },
    LeaveGame {
        #[serde(alias = "game_id")]
        session_id: SessionId,
    },
}

/// Server → Client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    Connected {
        player_id: ConnectionId,
    },
    GameCreated {
        session_id: SessionId,
        role: Role,
        snapshot: Snapshot,
    },
    GameJoined {
        session_id: SessionId,
        role: Role,
        snapshot: Snapshot,
    },
    PlayerJoined {
        snapshot: Snapshot,
    },
    MoveMade {
        snapshot: Snapshot,
    },
    MoveCue {
        sound: MoveCue,
    },
    PlayerLeft {
        snapshot: Snapshot,
    },
    GameState {
        snapshot: Snapshot,
    },
    Error {
        message: String,
    },
}

impl ServerEvent {
    /// Event name as it appears in the `type` field, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::GameCreated { .. } => "game_created",
            ServerEvent::GameJoined { .. } => "game_joined",
            ServerEvent::PlayerJoined { .. } => "player_joined",
            ServerEvent::MoveMade { .. } => "move_made",
            ServerEvent::MoveCue { .. } => "move_cue",
            ServerEvent::PlayerLeft { .. } => "player_left",
            ServerEvent::GameState { .. } => "game_state",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// UX hint for the opponent's client; carries no state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MoveCue {
    Move,
    Capture,
    Check,
    Castle,
    Promotion,
}

impl MoveCue {
    /// Pick a cue from the SAN of the applied move. Check wins over
    /// everything else, then promotion, castling, capture.
    pub fn from_san(san: &str) -> Self {
        if san.ends_with('+') || san.ends_with('#') {
            MoveCue::Check
        } else if san.contains('=') {
            MoveCue::Promotion
        } else if san.starts_with("O-O") {
            MoveCue::Castle
        } else if san.contains('x') {
            MoveCue::Capture
        } else {
            MoveCue::Move
        }
    }
}
