//! Chess rules, notation and PGN helpers shared by the server.

pub mod history;
pub mod pgn;
pub mod rules;

pub use history::{move_pairs, MovePair};
pub use rules::{
    AppliedMove, CandidateMove, GameResult, Position, RulesError, RulesOracle, Side,
    StandardRules, Termination,
};
