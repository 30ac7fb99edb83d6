//! Multiplayer session manager: sessions, the registry that owns them, and
//! the connection router that fans state out to rooms.

pub mod protocol;
pub mod registry;
pub mod router;
pub mod seat;
pub mod session;

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

pub use protocol::{ClientEvent, MoveCue, ServerEvent};
pub use registry::{Registry, SessionHandle, SessionSummary};
pub use router::{ConnectionRouter, Outbox};
pub use seat::{Role, Seat, Seats};
pub use session::{MoveOutcome, Session, SessionStatus, Snapshot};

/// Identity of one live connection. Doubles as the player identity: a
/// reconnecting client is a new participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Short shareable game code, e.g. `3f9a0c1e`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Eight hex characters from a fresh v4 UUID.
    pub(crate) fn generate() -> Self {
        let mut id = Uuid::new_v4().simple().to_string();
        id.truncate(8);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.trim().to_string())
    }
}

// Trimmed the same way as `From<&str>`.
impl<'de> Deserialize<'de> for SessionId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::from(raw.as_str()))
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Recoverable failures of a single session request. Reported to the
/// originating connection only.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Game {0} not found")]
    SessionNotFound(SessionId),

    #[error("Not your turn")]
    NotYourTurn,

    #[error("Illegal move: {0}")]
    IllegalMove(String),

    #[error("Game is already over")]
    GameOver,

    /// Only produced by strict seat reservation; the default policy falls
    /// back to spectating instead.
    #[error("The {0} seat is not available")]
    SeatUnavailable(Seat),
}
