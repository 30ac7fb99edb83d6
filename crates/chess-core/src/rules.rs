//! Rules oracle: legality, move application and terminal detection.
//!
//! Everything above this module treats [`Position`] as an opaque handle and
//! only talks to it through a [`RulesOracle`].

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use shakmaty::{
    fen::Fen, san::SanPlus, uci::UciMove, CastlingMode, Chess, Color, EnPassantMode, Position as _,
    Square,
};
use thiserror::Error;

/// Halfmove clock value at which the seventy-five-move rule ends the game.
const SEVENTY_FIVE_MOVE_PLIES: u32 = 150;

/// Number of occurrences of the same position that ends the game.
const FIVEFOLD: u32 = 5;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RulesError {
    #[error("Invalid FEN: {0}")]
    InvalidFen(String),

    #[error("Invalid square: {0}")]
    InvalidSquare(String),

    #[error("Illegal move: {0}")]
    IllegalMove(String),
}

/// Side to move, serialized as `"white"` / `"black"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    White,
    Black,
}

impl Side {
    pub fn opposite(self) -> Self {
        match self {
            Side::White => Side::Black,
            Side::Black => Side::White,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Side::White => "white",
            Side::Black => "black",
        }
    }
}

impl From<Color> for Side {
    fn from(color: Color) -> Self {
        match color {
            Color::White => Side::White,
            Color::Black => Side::Black,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A move as submitted by a client: origin, destination, optional promotion piece.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateMove {
    pub from: String,
    pub to: String,
    pub promotion: Option<String>,
}

impl CandidateMove {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            promotion: None,
        }
    }

    pub fn with_promotion(mut self, piece: impl Into<String>) -> Self {
        self.promotion = Some(piece.into());
        self
    }

    /// Build from a UCI string such as `e7e8q`.
    pub fn from_uci(uci: &str) -> Option<Self> {
        if !uci.is_ascii() || !(4..=5).contains(&uci.len()) {
            return None;
        }
        Some(Self {
            from: uci[0..2].to_string(),
            to: uci[2..4].to_string(),
            promotion: uci.get(4..5).map(str::to_string),
        })
    }

    /// UCI text for this move, promotion piece lowercased.
    pub fn uci(&self) -> String {
        let promotion = self
            .promotion
            .as_deref()
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        format!(
            "{}{}{}",
            self.from.to_ascii_lowercase(),
            self.to.to_ascii_lowercase(),
            promotion
        )
    }
}

impl fmt::Display for CandidateMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.uci())
    }
}

/// How a finished game ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    Checkmate,
    Stalemate,
    InsufficientMaterial,
    SeventyFiveMoves,
    FivefoldRepetition,
}

impl Termination {
    pub fn as_str(self) -> &'static str {
        match self {
            Termination::Checkmate => "checkmate",
            Termination::Stalemate => "stalemate",
            Termination::InsufficientMaterial => "insufficient_material",
            Termination::SeventyFiveMoves => "seventy_five_moves",
            Termination::FivefoldRepetition => "fivefold_repetition",
        }
    }
}

/// Final result of a terminal position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GameResult {
    /// `None` for draws.
    pub winner: Option<Side>,
    pub termination: Termination,
}

impl GameResult {
    /// PGN score: `1-0`, `0-1` or `1/2-1/2`.
    pub fn score(&self) -> &'static str {
        match self.winner {
            Some(Side::White) => "1-0",
            Some(Side::Black) => "0-1",
            None => "1/2-1/2",
        }
    }
}

impl fmt::Display for GameResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.score(), self.termination.as_str())
    }
}

/// Opaque position handle. Tracks repetition counts alongside the board so
/// fivefold repetition can be detected without the caller keeping history.
#[derive(Debug, Clone)]
pub struct Position {
    chess: Chess,
    repetitions: HashMap<String, u32>,
}

impl Position {
    /// Standard starting position.
    pub fn start() -> Self {
        Self::from_chess(Chess::default())
    }

    pub fn from_fen(fen: &str) -> Result<Self, RulesError> {
        let parsed: Fen = fen
            .trim()
            .parse()
            .map_err(|e| RulesError::InvalidFen(format!("{e}")))?;
        let chess: Chess = parsed
            .into_position(CastlingMode::Standard)
            .map_err(|e| RulesError::InvalidFen(format!("{e}")))?;
        Ok(Self::from_chess(chess))
    }

    fn from_chess(chess: Chess) -> Self {
        let mut repetitions = HashMap::new();
        repetitions.insert(repetition_key(&chess), 1);
        Self { chess, repetitions }
    }

    pub fn fen(&self) -> String {
        Fen::from_position(&self.chess, EnPassantMode::Legal).to_string()
    }

    pub fn turn(&self) -> Side {
        self.chess.turn().into()
    }

    pub fn fullmoves(&self) -> u32 {
        self.chess.fullmoves().get()
    }

    pub fn is_check(&self) -> bool {
        self.chess.is_check()
    }

    /// Legal moves in UCI notation, optionally restricted to one origin square.
    pub fn legal_moves(&self, from: Option<&str>) -> Result<Vec<String>, RulesError> {
        let origin = from.map(parse_square).transpose()?;
        Ok(self
            .chess
            .legal_moves()
            .iter()
            .filter(|m| origin.is_none() || m.from() == origin)
            .map(|m| m.to_uci(CastlingMode::Standard).to_string())
            .collect())
    }

    /// Play a SAN move (as found in PGN movetext). The returned notation is
    /// normalized, so `Nf3+` and `Nf3` both come back with the right suffix.
    pub fn play_san(&self, san: &str) -> Result<AppliedMove, RulesError> {
        let parsed: SanPlus = san
            .parse()
            .map_err(|_| RulesError::IllegalMove(san.to_string()))?;
        let m = parsed
            .san
            .to_move(&self.chess)
            .map_err(|_| RulesError::IllegalMove(san.to_string()))?;
        let uci = m.to_uci(CastlingMode::Standard).to_string();
        let (position, san) = self.play(m);
        Ok(AppliedMove { position, san, uci })
    }

    fn resolve(&self, mv: &CandidateMove) -> Result<shakmaty::Move, RulesError> {
        parse_square(&mv.from)?;
        parse_square(&mv.to)?;
        let uci: UciMove = mv
            .uci()
            .parse()
            .map_err(|_| RulesError::IllegalMove(mv.uci()))?;
        uci.to_move(&self.chess)
            .map_err(|_| RulesError::IllegalMove(mv.uci()))
    }

    fn play(&self, m: shakmaty::Move) -> (Position, String) {
        let san = SanPlus::from_move(self.chess.clone(), m.clone()).to_string();
        let mut chess = self.chess.clone();
        chess.play_unchecked(m);

        let mut repetitions = self.repetitions.clone();
        *repetitions.entry(repetition_key(&chess)).or_insert(0) += 1;

        (Position { chess, repetitions }, san)
    }

    fn repetition_count(&self) -> u32 {
        self.repetitions
            .get(&repetition_key(&self.chess))
            .copied()
            .unwrap_or(1)
    }
}

impl Default for Position {
    fn default() -> Self {
        Self::start()
    }
}

/// Board, side to move, castling rights and en passant square: the fields
/// that define "the same position" for repetition purposes.
fn repetition_key(chess: &Chess) -> String {
    Fen::from_position(chess, EnPassantMode::Legal)
        .to_string()
        .split_whitespace()
        .take(4)
        .collect::<Vec<_>>()
        .join(" ")
}

fn parse_square(s: &str) -> Result<Square, RulesError> {
    s.to_ascii_lowercase()
        .parse()
        .map_err(|_| RulesError::InvalidSquare(s.to_string()))
}

/// Result of a successful [`RulesOracle::apply`].
#[derive(Debug, Clone)]
pub struct AppliedMove {
    pub position: Position,
    /// SAN with check/mate suffix, e.g. `Qxf7#`.
    pub san: String,
    pub uci: String,
}

/// The contract the session core relies on. It never inspects board
/// internals itself.
pub trait RulesOracle: Send + Sync {
    fn legal(&self, position: &Position, mv: &CandidateMove) -> bool;

    /// Apply `mv`, returning the new position and its notation. The input
    /// position is left untouched.
    fn apply(&self, position: &Position, mv: &CandidateMove) -> Result<AppliedMove, RulesError>;

    /// `Some(result)` when no further moves can be played.
    fn is_terminal(&self, position: &Position) -> Option<GameResult>;
}

/// Standard chess rules backed by shakmaty.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRules;

impl RulesOracle for StandardRules {
    fn legal(&self, position: &Position, mv: &CandidateMove) -> bool {
        self.apply(position, mv).is_ok()
    }

    fn apply(&self, position: &Position, mv: &CandidateMove) -> Result<AppliedMove, RulesError> {
        let m = position.resolve(mv)?;
        let uci = m.to_uci(CastlingMode::Standard).to_string();
        let (position, san) = position.play(m);
        Ok(AppliedMove { position, san, uci })
    }

    fn is_terminal(&self, position: &Position) -> Option<GameResult> {
        let chess = &position.chess;
        if chess.is_checkmate() {
            // Side to move is mated.
            return Some(GameResult {
                winner: Some(position.turn().opposite()),
                termination: Termination::Checkmate,
            });
        }

        let termination = if chess.is_stalemate() {
            Termination::Stalemate
        } else if chess.is_insufficient_material() {
            Termination::InsufficientMaterial
        } else if chess.halfmoves() >= SEVENTY_FIVE_MOVE_PLIES {
            Termination::SeventyFiveMoves
        } else if position.repetition_count() >= FIVEFOLD {
            Termination::FivefoldRepetition
        } else {
            return None;
        };

        Some(GameResult {
            winner: None,
            termination,
        })
    }
}
