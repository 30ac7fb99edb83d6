//! One multiplayer game: board, seats, spectators, move log and status.
//!
//! A `Session` is plain data plus transitions; mutual exclusion is provided by
//! the lock the registry wraps it in.

use std::collections::BTreeSet;
use std::sync::Arc;

use chess_core::{
    move_pairs, CandidateMove, GameResult, MovePair, Position, RulesError, RulesOracle, Side,
    Termination,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use super::seat::{self, Role, Seat, Seats};
use super::{ConnectionId, SessionError, SessionId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Waiting,
    Active,
    Finished,
}

/// Entry in the append-only move log.
#[derive(Debug, Clone)]
pub struct LoggedMove {
    pub san: String,
    pub uci: String,
    pub from: String,
    pub to: String,
    /// FEN after the move.
    pub fen: String,
}

/// What a successful `apply_move` reports back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoveOutcome {
    pub mover: Seat,
    pub san: String,
    pub uci: String,
    pub status: SessionStatus,
    pub result: Option<GameResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SeatOccupancy {
    pub white: bool,
    pub black: bool,
}

impl From<&Seats> for SeatOccupancy {
    fn from(seats: &Seats) -> Self {
        Self {
            white: !seats.is_vacant(Seat::White),
            black: !seats.is_vacant(Seat::Black),
        }
    }
}

/// Read-only view of a session sent to clients.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub session_id: SessionId,
    pub fen: String,
    pub players: SeatOccupancy,
    pub current_turn: Side,
    pub status: SessionStatus,
    pub history: Vec<MovePair>,
    pub move_count: usize,
    pub spectator_count: usize,
    pub game_over: bool,
    /// e.g. `1-0 (checkmate)`; only set once finished.
    pub result: Option<String>,
    pub termination: Option<Termination>,
}

pub struct Session {
    id: SessionId,
    rules: Arc<dyn RulesOracle>,
    position: Position,
    seats: Seats,
    spectators: BTreeSet<ConnectionId>,
    move_log: Vec<LoggedMove>,
    status: SessionStatus,
    result: Option<GameResult>,
    created_at: DateTime<Utc>,
    /// Set when the registry collects the session; a closed session accepts
    /// no new participants.
    closed: bool,
}

impl Session {
    pub fn new(id: SessionId, rules: Arc<dyn RulesOracle>) -> Self {
        Self {
            id,
            rules,
            position: Position::start(),
            seats: Seats::default(),
            spectators: BTreeSet::new(),
            move_log: Vec::new(),
            status: SessionStatus::Waiting,
            result: None,
            created_at: Utc::now(),
            closed: false,
        }
    }

    pub fn id(&self) -> &SessionId {
        &self.id
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn seats(&self) -> &Seats {
        &self.seats
    }

    pub fn spectator_count(&self) -> usize {
        self.spectators.len()
    }

    pub fn move_log(&self) -> &[LoggedMove] {
        &self.move_log
    }

    pub fn result(&self) -> Option<GameResult> {
        self.result
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// No seat occupant and no spectator left.
    pub fn is_empty(&self) -> bool {
        self.seats.occupied_count() == 0 && self.spectators.is_empty()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub(crate) fn close(&mut self) {
        self.closed = true;
    }

    pub fn role_of(&self, identity: ConnectionId) -> Option<Role> {
        if let Some(seat) = self.seats.seat_of(identity) {
            Some(seat.into())
        } else if self.spectators.contains(&identity) {
            Some(Role::Spectator)
        } else {
            None
        }
    }

    /// Seat `identity` per [`seat::assign`]. Joining twice returns the role
    /// already held.
    pub fn add_participant(
        &mut self,
        identity: ConnectionId,
        requested: Option<Seat>,
    ) -> Result<Role, SessionError> {
        if self.closed {
            return Err(SessionError::SessionNotFound(self.id.clone()));
        }
        if let Some(role) = self.role_of(identity) {
            return Ok(role);
        }

        let role = seat::assign(&self.seats, requested);
        match role {
            Role::White => self.seats.take(Seat::White, identity),
            Role::Black => self.seats.take(Seat::Black, identity),
            Role::Spectator => {
                self.spectators.insert(identity);
            }
        }
        self.refresh_status();
        Ok(role)
    }

    /// Vacate `identity`'s seat or spectator slot. No-op for strangers.
    pub fn remove_participant(&mut self, identity: ConnectionId) -> Option<Role> {
        let removed = match self.seats.vacate(identity) {
            Some(seat) => Some(Role::from(seat)),
            None => self.spectators.remove(&identity).then_some(Role::Spectator),
        };
        if removed.is_some() {
            self.refresh_status();
        }
        removed
    }

    /// Validate turn and legality, then commit position, log entry and
    /// status together.
    pub fn apply_move(
        &mut self,
        mover: ConnectionId,
        mv: &CandidateMove,
    ) -> Result<MoveOutcome, SessionError> {
        if self.status == SessionStatus::Finished {
            return Err(SessionError::GameOver);
        }

        let to_move = Seat::from(self.position.turn());
        if self.status != SessionStatus::Active || self.seats.occupant(to_move) != Some(mover) {
            return Err(SessionError::NotYourTurn);
        }

        let applied = self.rules.apply(&self.position, mv).map_err(|e| match e {
            RulesError::IllegalMove(m) => SessionError::IllegalMove(m),
            other => SessionError::IllegalMove(other.to_string()),
        })?;
        let result = self.rules.is_terminal(&applied.position);

        // Nothing below can fail.
        self.move_log.push(LoggedMove {
            san: applied.san.clone(),
            uci: applied.uci.clone(),
            from: applied.uci[0..2].to_string(),
            to: applied.uci[2..4].to_string(),
            fen: applied.position.fen(),
        });
        self.position = applied.position;
        if let Some(result) = result {
            self.status = SessionStatus::Finished;
            self.result = Some(result);
            info!(session = %self.id, result = %result, "Game finished");
        }

        Ok(MoveOutcome {
            mover: to_move,
            san: applied.san,
            uci: applied.uci,
            status: self.status,
            result: self.result,
        })
    }

    pub fn snapshot(&self) -> Snapshot {
        let sans: Vec<&str> = self.move_log.iter().map(|m| m.san.as_str()).collect();
        Snapshot {
            session_id: self.id.clone(),
            fen: self.position.fen(),
            players: SeatOccupancy::from(&self.seats),
            current_turn: self.position.turn(),
            status: self.status,
            history: move_pairs(&sans),
            move_count: self.move_log.len(),
            spectator_count: self.spectators.len(),
            game_over: self.status == SessionStatus::Finished,
            result: self.result.map(|r| r.to_string()),
            termination: self.result.map(|r| r.termination),
        }
    }

    /// Every identity with a seat or spectator slot.
    pub fn participants(&self) -> Vec<ConnectionId> {
        Seat::ALL
            .into_iter()
            .filter_map(|s| self.seats.occupant(s))
            .chain(self.spectators.iter().copied())
            .collect()
    }

    fn refresh_status(&mut self) {
        if self.status == SessionStatus::Finished {
            return;
        }
        self.status = if self.seats.is_full() {
            SessionStatus::Active
        } else {
            SessionStatus::Waiting
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chess_core::StandardRules;

    fn session() -> Session {
        Session::new(SessionId::from("test"), Arc::new(StandardRules))
    }

    fn mv(uci: &str) -> CandidateMove {
        CandidateMove::from_uci(uci).unwrap()
    }

    fn active() -> (Session, ConnectionId, ConnectionId) {
        let mut s = session();
        let x = ConnectionId::new();
        let y = ConnectionId::new();
        assert_eq!(s.add_participant(x, Some(Seat::White)).unwrap(), Role::White);
        assert_eq!(s.add_participant(y, Some(Seat::Black)).unwrap(), Role::Black);
        (s, x, y)
    }

    #[test]
    fn test_fresh_session_is_waiting() {
        let s = session();
        assert_eq!(s.status(), SessionStatus::Waiting);
        assert!(s.is_empty());
        let snap = s.snapshot();
        assert_eq!(snap.current_turn, Side::White);
        assert!(snap.history.is_empty());
        assert!(!snap.game_over);
    }

    #[test]
    fn test_active_iff_both_seats_for_join_sequences() {
        // Every join order of up to four identities with every request pattern
        for requests in [
            [None, None, None, None],
            [Some(Seat::Black), Some(Seat::Black), None, Some(Seat::White)],
            [Some(Seat::White), Some(Seat::White), Some(Seat::White), None],
            [None, Some(Seat::White), Some(Seat::Black), Some(Seat::Black)],
        ] {
            let mut s = session();
            let mut seated = Vec::new();
            for req in requests {
                let id = ConnectionId::new();
                let role = s.add_participant(id, req).unwrap();
                if role != Role::Spectator {
                    seated.push(role);
                }
                // At most one occupant per seat
                assert!(seated.iter().filter(|r| **r == Role::White).count() <= 1);
                assert!(seated.iter().filter(|r| **r == Role::Black).count() <= 1);
                assert_eq!(s.status() == SessionStatus::Active, s.seats().is_full());
            }
        }
    }

    #[test]
    fn test_rejoin_keeps_role() {
        let mut s = session();
        let x = ConnectionId::new();
        assert_eq!(s.add_participant(x, None).unwrap(), Role::White);
        assert_eq!(s.add_participant(x, Some(Seat::Black)).unwrap(), Role::White);
        assert_eq!(s.status(), SessionStatus::Waiting);
    }

    #[test]
    fn test_scenario_a_move_then_illegal_reply() {
        let (mut s, x, y) = active();
        assert_eq!(s.status(), SessionStatus::Active);

        let outcome = s.apply_move(x, &mv("e2e4")).unwrap();
        assert_eq!(outcome.mover, Seat::White);
        assert_eq!(outcome.san, "e4");
        assert_eq!(s.snapshot().current_turn, Side::Black);

        let err = s.apply_move(y, &mv("e2e4")).unwrap_err();
        assert!(matches!(err, SessionError::IllegalMove(_)));
        assert_eq!(s.move_log().len(), 1);
    }

    #[test]
    fn test_scenario_b_black_cannot_move_first() {
        let (mut s, _x, y) = active();
        let before = s.snapshot();
        assert_eq!(s.apply_move(y, &mv("e7e5")), Err(SessionError::NotYourTurn));
        let after = s.snapshot();
        assert_eq!(before.fen, after.fen);
        assert_eq!(after.move_count, 0);
    }

    #[test]
    fn test_wrong_mover_never_changes_state() {
        let (mut s, x, y) = active();
        let spectator = ConnectionId::new();
        s.add_participant(spectator, None).unwrap();
        let stranger = ConnectionId::new();

        for intruder in [y, spectator, stranger] {
            assert_eq!(s.apply_move(intruder, &mv("e2e4")), Err(SessionError::NotYourTurn));
        }
        s.apply_move(x, &mv("e2e4")).unwrap();
        for intruder in [x, spectator, stranger] {
            assert_eq!(s.apply_move(intruder, &mv("e7e5")), Err(SessionError::NotYourTurn));
        }
        assert_eq!(s.move_log().len(), 1);
    }

    #[test]
    fn test_no_moves_while_waiting() {
        let mut s = session();
        let x = ConnectionId::new();
        s.add_participant(x, None).unwrap();
        assert_eq!(s.apply_move(x, &mv("e2e4")), Err(SessionError::NotYourTurn));
    }

    #[test]
    fn test_snapshot_after_move_has_one_more_entry() {
        let (mut s, x, y) = active();
        let before = s.snapshot();
        s.apply_move(x, &mv("e2e4")).unwrap();
        let after = s.snapshot();
        assert_eq!(after.move_count, before.move_count + 1);
        assert_eq!(after.current_turn, before.current_turn.opposite());

        s.apply_move(y, &mv("e7e5")).unwrap();
        let snap = s.snapshot();
        assert_eq!(snap.history.len(), 1);
        assert_eq!(snap.history[0].white, "e4");
        assert_eq!(snap.history[0].black, "e5");
        assert_eq!(s.move_log()[1].from, "e7");
        assert_eq!(s.move_log()[1].to, "e5");
    }

    #[test]
    fn test_scenario_c_seat_vacated_reverts_to_waiting() {
        let (mut s, x, y) = active();
        s.apply_move(x, &mv("e2e4")).unwrap();
        assert_eq!(s.remove_participant(x), Some(Role::White));
        assert_eq!(s.status(), SessionStatus::Waiting);
        assert_eq!(s.role_of(y), Some(Role::Black));
        assert!(!s.is_empty());
        // Black cannot move while waiting
        assert_eq!(s.apply_move(y, &mv("e7e5")), Err(SessionError::NotYourTurn));

        // A newcomer takes the empty white seat and play resumes
        let z = ConnectionId::new();
        assert_eq!(s.add_participant(z, None).unwrap(), Role::White);
        assert_eq!(s.status(), SessionStatus::Active);
        s.apply_move(y, &mv("e7e5")).unwrap();
    }

    #[test]
    fn test_remove_participant_twice_is_noop() {
        let (mut s, x, _y) = active();
        assert_eq!(s.remove_participant(x), Some(Role::White));
        let snap = s.snapshot();
        assert_eq!(s.remove_participant(x), None);
        let again = s.snapshot();
        assert_eq!(snap.players, again.players);
        assert_eq!(snap.status, again.status);
    }

    #[test]
    fn test_checkmate_finishes_session() {
        let (mut s, x, y) = active();
        s.apply_move(x, &mv("f2f3")).unwrap();
        s.apply_move(y, &mv("e7e5")).unwrap();
        s.apply_move(x, &mv("g2g4")).unwrap();
        let outcome = s.apply_move(y, &mv("d8h4")).unwrap();
        assert_eq!(outcome.status, SessionStatus::Finished);
        assert_eq!(outcome.result.map(|r| r.score()), Some("0-1"));

        let snap = s.snapshot();
        assert!(snap.game_over);
        assert_eq!(snap.result.as_deref(), Some("0-1 (checkmate)"));
        assert_eq!(snap.termination, Some(Termination::Checkmate));

        assert_eq!(s.apply_move(x, &mv("e2e4")), Err(SessionError::GameOver));
        // Leaving a finished game does not reopen it
        s.remove_participant(x);
        assert_eq!(s.status(), SessionStatus::Finished);
    }

    #[test]
    fn test_closed_session_rejects_join() {
        let mut s = session();
        s.close();
        assert!(matches!(
            s.add_participant(ConnectionId::new(), None),
            Err(SessionError::SessionNotFound(_))
        ));
    }

    #[test]
    fn test_participants_lists_everyone() {
        let (mut s, x, y) = active();
        let z = ConnectionId::new();
        assert_eq!(s.add_participant(z, None).unwrap(), Role::Spectator);
        let mut all = s.participants();
        all.sort();
        let mut expected = vec![x, y, z];
        expected.sort();
        assert_eq!(all, expected);
        assert_eq!(s.snapshot().spectator_count, 1);
    }
}
