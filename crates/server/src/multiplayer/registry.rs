//! Table of live sessions. Lock order is always registry map, then session.

use std::collections::HashMap;
use std::sync::Arc;

use chess_core::RulesOracle;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock};
use tracing::info;

use super::session::{SeatOccupancy, Session, SessionStatus};
use super::{SessionError, SessionId};

pub type SessionHandle = Arc<RwLock<Session>>;

/// Lobby row: no move data, just who is sitting where.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: SessionId,
    pub status: SessionStatus,
    pub seats: SeatOccupancy,
    pub spectator_count: usize,
}

pub struct Registry {
    rules: Arc<dyn RulesOracle>,
    sessions: Mutex<HashMap<SessionId, SessionHandle>>,
}

impl Registry {
    pub fn new(rules: Arc<dyn RulesOracle>) -> Self {
        Self {
            rules,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate a session under a fresh id.
    pub async fn create(&self) -> (SessionId, SessionHandle) {
        let mut sessions = self.sessions.lock().await;
        let id = loop {
            let candidate = SessionId::generate();
            if !sessions.contains_key(&candidate) {
                break candidate;
            }
        };
        let handle = Arc::new(RwLock::new(Session::new(id.clone(), self.rules.clone())));
        sessions.insert(id.clone(), handle.clone());
        info!(session = %id, live = sessions.len(), "Session created");
        (id, handle)
    }

    pub async fn get(&self, id: &SessionId) -> Result<SessionHandle, SessionError> {
        self.sessions
            .lock()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| SessionError::SessionNotFound(id.clone()))
    }

    /// Drop the session if nobody is seated or watching. Returns whether it
    /// was removed; unknown ids are a no-op.
    pub async fn garbage_collect(&self, id: &SessionId) -> bool {
        let mut sessions = self.sessions.lock().await;
        let Some(handle) = sessions.get(id).cloned() else {
            return false;
        };

        let mut session = handle.write().await;
        if !session.is_empty() {
            return false;
        }
        session.close();
        sessions.remove(id);
        info!(
            session = %id,
            status = ?session.status(),
            moves = session.move_log().len(),
            live = sessions.len(),
            "Session collected"
        );
        true
    }

    /// Every live session, oldest first.
    pub async fn list(&self) -> Vec<SessionSummary> {
        // The map lock is released before any session is read.
        let handles: Vec<SessionHandle> = self.sessions.lock().await.values().cloned().collect();
        let mut rows = Vec::with_capacity(handles.len());
        for handle in &handles {
            let session = handle.read().await;
            rows.push((
                session.created_at(),
                SessionSummary {
                    session_id: session.id().clone(),
                    status: session.status(),
                    seats: SeatOccupancy::from(session.seats()),
                    spectator_count: session.spectator_count(),
                },
            ));
        }
        rows.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| a.1.session_id.as_str().cmp(b.1.session_id.as_str()))
        });
        rows.into_iter().map(|(_, row)| row).collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}
