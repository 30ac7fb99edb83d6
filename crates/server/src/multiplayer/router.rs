//! Connection router: resolves sessions for inbound events and fans the
//! resulting state out to every connection subscribed to the session's room.
//!
//! Lock order: registry map, then session, then router state. Fan-out happens
//! while the session lock is still held so room members see snapshots in the
//! order the mutations were applied. Delivery never blocks: each connection
//! has a bounded outbox and a full outbox drops the event for that
//! connection only.

use std::collections::{HashMap, HashSet};

use chess_core::CandidateMove;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::protocol::{ClientEvent, MoveCue, ServerEvent};
use super::registry::{Registry, SessionSummary};
use super::seat::{Role, Seat};
use super::{ConnectionId, SessionError, SessionId};

/// Outbound queue of one connection.
pub type Outbox = mpsc::Sender<ServerEvent>;

struct Connection {
    outbox: Outbox,
    sessions: HashSet<SessionId>,
}

#[derive(Default)]
struct RouterState {
    connections: HashMap<ConnectionId, Connection>,
    rooms: HashMap<SessionId, HashSet<ConnectionId>>,
}

impl RouterState {
    fn subscribe(&mut self, identity: ConnectionId, session_id: &SessionId) {
        if let Some(conn) = self.connections.get_mut(&identity) {
            conn.sessions.insert(session_id.clone());
        }
        self.rooms
            .entry(session_id.clone())
            .or_default()
            .insert(identity);
    }

    fn unsubscribe(&mut self, identity: ConnectionId, session_id: &SessionId) {
        if let Some(conn) = self.connections.get_mut(&identity) {
            conn.sessions.remove(session_id);
        }
        if let Some(room) = self.rooms.get_mut(session_id) {
            room.remove(&identity);
            if room.is_empty() {
                self.rooms.remove(session_id);
            }
        }
    }

    fn send_to(&self, identity: ConnectionId, event: ServerEvent) {
        if let Some(conn) = self.connections.get(&identity) {
            deliver(identity, &conn.outbox, event);
        }
    }

    /// Send to every room member except `skip`.
    fn broadcast(&self, session_id: &SessionId, event: &ServerEvent, skip: Option<ConnectionId>) {
        let Some(room) = self.rooms.get(session_id) else {
            return;
        };
        for member in room {
            if Some(*member) == skip {
                continue;
            }
            self.send_to(*member, event.clone());
        }
    }
}

/// Failures are isolated to the one connection and only logged.
fn deliver(identity: ConnectionId, outbox: &Outbox, event: ServerEvent) {
    let kind = event.kind();
    match outbox.try_send(event) {
        Ok(()) => {}
        Err(TrySendError::Full(_)) => {
            warn!(connection = %identity, event = kind, "Outbox full, dropping event");
        }
        Err(TrySendError::Closed(_)) => {
            debug!(connection = %identity, event = kind, "Outbox closed, dropping event");
        }
    }
}

pub struct ConnectionRouter {
    registry: Registry,
    state: Mutex<RouterState>,
}

impl ConnectionRouter {
    pub fn new(registry: Registry) -> Self {
        Self {
            registry,
            state: Mutex::new(RouterState::default()),
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Lobby listing.
    pub async fn active_games(&self) -> Vec<SessionSummary> {
        self.registry.list().await
    }

    pub async fn connection_count(&self) -> usize {
        self.state.lock().await.connections.len()
    }

    pub async fn on_connect(&self, identity: ConnectionId, outbox: Outbox) {
        let mut state = self.state.lock().await;
        state.connections.insert(
            identity,
            Connection {
                outbox,
                sessions: HashSet::new(),
            },
        );
        state.send_to(identity, ServerEvent::Connected { player_id: identity });
        debug!(connection = %identity, live = state.connections.len(), "Connected");
    }

    /// Release `identity` from every session it touched. Safe to call twice.
    pub async fn on_disconnect(&self, identity: ConnectionId) {
        let sessions = {
            let mut state = self.state.lock().await;
            let Some(conn) = state.connections.remove(&identity) else {
                return;
            };
            for session_id in &conn.sessions {
                state.unsubscribe(identity, session_id);
            }
            conn.sessions
        };

        for session_id in sessions {
            // Session may already be gone; nothing to clean up then.
            let Ok(handle) = self.registry.get(&session_id).await else {
                continue;
            };
            {
                let mut session = handle.write().await;
                if session.remove_participant(identity).is_some() {
                    let snapshot = session.snapshot();
                    self.state.lock().await.broadcast(
                        &session_id,
                        &ServerEvent::PlayerLeft { snapshot },
                        None,
                    );
                }
            }
            self.collect(&session_id).await;
        }
        debug!(connection = %identity, "Disconnected");
    }

    pub async fn on_create_game(
        &self,
        identity: ConnectionId,
        requested: Option<Seat>,
    ) -> Result<(SessionId, Role), SessionError> {
        let (session_id, handle) = self.registry.create().await;
        let mut session = handle.write().await;
        let role = session.add_participant(identity, requested)?;

        let mut state = self.state.lock().await;
        state.subscribe(identity, &session_id);
        state.send_to(
            identity,
            ServerEvent::GameCreated {
                session_id: session_id.clone(),
                role,
                snapshot: session.snapshot(),
            },
        );
        info!(session = %session_id, connection = %identity, ?role, "Game created");
        Ok((session_id, role))
    }

    pub async fn on_join_game(
        &self,
        identity: ConnectionId,
        session_id: &SessionId,
        requested: Option<Seat>,
    ) -> Result<Role, SessionError> {
        let handle = self.registry.get(session_id).await?;
        let mut session = handle.write().await;
        let role = session.add_participant(identity, requested)?;
        let snapshot = session.snapshot();

        let mut state = self.state.lock().await;
        state.subscribe(identity, session_id);
        state.send_to(
            identity,
            ServerEvent::GameJoined {
                session_id: session_id.clone(),
                role,
                snapshot: snapshot.clone(),
            },
        );
        state.broadcast(session_id, &ServerEvent::PlayerJoined { snapshot }, Some(identity));
        info!(session = %session_id, connection = %identity, ?role, "Player joined");
        Ok(role)
    }

    pub async fn on_move(
        &self,
        identity: ConnectionId,
        session_id: &SessionId,
        mv: &CandidateMove,
    ) -> Result<(), SessionError> {
        let handle = self.registry.get(session_id).await?;
        let mut session = handle.write().await;
        let outcome = session.apply_move(identity, mv)?;
        let snapshot = session.snapshot();

        let state = self.state.lock().await;
        state.broadcast(session_id, &ServerEvent::MoveMade { snapshot }, None);
        state.broadcast(
            session_id,
            &ServerEvent::MoveCue {
                sound: MoveCue::from_san(&outcome.san),
            },
            Some(identity),
        );
        debug!(session = %session_id, san = %outcome.san, "Move applied");
        Ok(())
    }

    pub async fn on_get_state(
        &self,
        identity: ConnectionId,
        session_id: &SessionId,
    ) -> Result<(), SessionError> {
        let handle = self.registry.get(session_id).await?;
        let snapshot = handle.read().await.snapshot();
        self.state
            .lock()
            .await
            .send_to(identity, ServerEvent::GameState { snapshot });
        Ok(())
    }

    pub async fn on_leave_game(
        &self,
        identity: ConnectionId,
        session_id: &SessionId,
    ) -> Result<(), SessionError> {
        let handle = self.registry.get(session_id).await?;
        {
            let mut session = handle.write().await;
            let removed = session.remove_participant(identity);
            let mut state = self.state.lock().await;
            state.unsubscribe(identity, session_id);
            if removed.is_some() {
                state.broadcast(
                    session_id,
                    &ServerEvent::PlayerLeft {
                        snapshot: session.snapshot(),
                    },
                    None,
                );
            }
        }
        self.collect(session_id).await;
        Ok(())
    }

    /// Route one inbound event. Errors go back to `identity` only.
    pub async fn handle(&self, identity: ConnectionId, event: ClientEvent) {
        let result = match event {
            ClientEvent::CreateGame { seat } => self
                .on_create_game(identity, seat.and_then(|s| s.seat()))
                .await
                .map(|_| ()),
            ClientEvent::JoinGame { session_id, seat } => self
                .on_join_game(identity, &session_id, seat.and_then(|s| s.seat()))
                .await
                .map(|_| ()),
            ClientEvent::MakeMove {
                session_id,
                from,
                to,
                promotion,
            } => {
                let mv = CandidateMove {
                    from,
                    to,
                    promotion,
                };
                self.on_move(identity, &session_id, &mv).await
            }
            ClientEvent::GetState { session_id } => self.on_get_state(identity, &session_id).await,
            ClientEvent::LeaveGame { session_id } => {
                self.on_leave_game(identity, &session_id).await
            }
        };

        if let Err(e) = result {
            debug!(connection = %identity, error = %e, "Request rejected");
            self.send_error(identity, e.to_string()).await;
        }
    }

    /// Report a problem to one connection (also used for malformed input).
    pub async fn send_error(&self, identity: ConnectionId, message: String) {
        self.state
            .lock()
            .await
            .send_to(identity, ServerEvent::Error { message });
    }

    async fn collect(&self, session_id: &SessionId) {
        if self.registry.garbage_collect(session_id).await {
            self.state.lock().await.rooms.remove(session_id);
        }
    }
}
