use std::fmt;

use chess_core::Side;
use serde::{Deserialize, Serialize};

use super::ConnectionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Seat {
    White,
    Black,
}

impl Seat {
    pub const ALL: [Seat; 2] = [Seat::White, Seat::Black];
}

impl From<Side> for Seat {
    fn from(side: Side) -> Self {
        match side {
            Side::White => Seat::White,
            Side::Black => Seat::Black,
        }
    }
}

impl fmt::Display for Seat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Seat::White => "white",
            Seat::Black => "black",
        })
    }
}

/// What a participant ended up as after joining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    White,
    Black,
    Spectator,
}

impl From<Seat> for Role {
    fn from(seat: Seat) -> Self {
        match seat {
            Seat::White => Role::White,
            Seat::Black => Role::Black,
        }
    }
}

/// Seat preference sent by a client. `random`/`any` means no preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SeatRequest {
    White,
    Black,
    #[serde(alias = "any")]
    Random,
}

impl SeatRequest {
    pub fn seat(self) -> Option<Seat> {
        match self {
            SeatRequest::White => Some(Seat::White),
            SeatRequest::Black => Some(Seat::Black),
            SeatRequest::Random => None,
        }
    }
}

/// White and black seats, at most one occupant each.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Seats {
    white: Option<ConnectionId>,
    black: Option<ConnectionId>,
}

impl Seats {
    pub fn occupant(&self, seat: Seat) -> Option<ConnectionId> {
        match seat {
            Seat::White => self.white,
            Seat::Black => self.black,
        }
    }

    pub fn is_vacant(&self, seat: Seat) -> bool {
        self.occupant(seat).is_none()
    }

    pub fn is_full(&self) -> bool {
        self.white.is_some() && self.black.is_some()
    }

    pub fn occupied_count(&self) -> usize {
        Seat::ALL.iter().filter(|s| !self.is_vacant(**s)).count()
    }

    pub fn seat_of(&self, identity: ConnectionId) -> Option<Seat> {
        Seat::ALL
            .into_iter()
            .find(|s| self.occupant(*s) == Some(identity))
    }

    /// Seat `identity`. Callers must check vacancy first.
    pub(crate) fn take(&mut self, seat: Seat, identity: ConnectionId) {
        let slot = self.slot(seat);
        debug_assert!(slot.is_none(), "seat {seat} already occupied");
        *slot = Some(identity);
    }

    /// Vacate whichever seat `identity` holds.
    pub(crate) fn vacate(&mut self, identity: ConnectionId) -> Option<Seat> {
        let seat = self.seat_of(identity)?;
        *self.slot(seat) = None;
        Some(seat)
    }

    fn slot(&mut self, seat: Seat) -> &mut Option<ConnectionId> {
        match seat {
            Seat::White => &mut self.white,
            Seat::Black => &mut self.black,
        }
    }
}

/// Seat assignment policy. Precedence: the requested seat if vacant, then
/// white, then black, then spectator.
pub fn assign(seats: &Seats, requested: Option<Seat>) -> Role {
    requested
        .into_iter()
        .chain(Seat::ALL)
        .find(|seat| seats.is_vacant(*seat))
        .map(Role::from)
        .unwrap_or(Role::Spectator)
}
