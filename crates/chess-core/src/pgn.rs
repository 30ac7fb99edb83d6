//! PGN import/export: a lightweight regex-based reader and a plain writer.

use regex::Regex;
use thiserror::Error;

use crate::rules::{Position, RulesError};

const LINE_WIDTH: usize = 80;

#[derive(Debug, Error)]
pub enum PgnError {
    #[error("Could not parse PGN")]
    Empty,

    #[error("Invalid FEN header: {0}")]
    Fen(RulesError),

    #[error("Move {ply} ({san}) is not legal")]
    IllegalMove { ply: usize, san: String },
}

/// Seven-tag-roster headers we write; `Site` and `Round` are always `?`.
#[derive(Debug, Clone)]
pub struct PgnHeaders {
    pub event: String,
    pub date: String, // "YYYY.MM.DD"
    pub white: String,
    pub black: String,
    pub result: String, // "1-0", "0-1", "1/2-1/2", "*"
    /// Set when the game did not start from the standard position.
    pub fen: Option<String>,
}

/// One ply replayed from PGN movetext.
#[derive(Debug, Clone)]
pub struct LoadedMove {
    pub san: String,
    pub uci: String,
    /// Position after the move.
    pub position: Position,
}

#[derive(Debug, Clone)]
pub struct LoadedGame {
    pub start: Position,
    pub moves: Vec<LoadedMove>,
}

impl LoadedGame {
    /// Position after the last move (or the start position if there are none).
    pub fn final_position(&self) -> &Position {
        self.moves.last().map(|m| &m.position).unwrap_or(&self.start)
    }
}

/// Parse a PGN string and replay its mainline.
pub fn parse_pgn(pgn: &str) -> Result<LoadedGame, PgnError> {
    let has_headers = extract_header(pgn, "Event").is_some()
        || extract_header(pgn, "White").is_some()
        || extract_header(pgn, "FEN").is_some();

    let start = match extract_header(pgn, "FEN") {
        Some(fen) => Position::from_fen(&fen).map_err(PgnError::Fen)?,
        None => Position::start(),
    };

    let sans = extract_moves(pgn);
    if sans.is_empty() && !has_headers {
        return Err(PgnError::Empty);
    }

    let mut moves = Vec::with_capacity(sans.len());
    let mut current = start.clone();
    for (i, san) in sans.iter().enumerate() {
        let applied = current.play_san(san).map_err(|_| PgnError::IllegalMove {
            ply: i + 1,
            san: san.clone(),
        })?;
        current = applied.position.clone();
        moves.push(LoadedMove {
            san: applied.san,
            uci: applied.uci,
            position: applied.position,
        });
    }

    Ok(LoadedGame { start, moves })
}

/// Extract SAN moves from PGN text (after removing headers, comments, variations).
fn extract_moves(pgn: &str) -> Vec<String> {
    // Remove headers
    let header_re = Regex::new(r"\[[^\]]*\]").unwrap();
    let no_headers = header_re.replace_all(pgn, "");

    // Remove comments
    let comment_re = Regex::new(r"\{[^}]*\}").unwrap();
    let no_comments = comment_re.replace_all(&no_headers, "");

    // Remove variations
    let variation_re = Regex::new(r"\([^)]*\)").unwrap();
    let no_variations = variation_re.replace_all(&no_comments, "");

    let move_re =
        Regex::new(r"O-O-O[+#]?|O-O[+#]?|[KQRBN]?[a-h]?[1-8]?x?[a-h][1-8](?:=[QRBN])?[+#]?")
            .unwrap();

    move_re
        .find_iter(&no_variations)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Extract a string value from a PGN header.
pub fn extract_header(pgn: &str, header_name: &str) -> Option<String> {
    let pattern = format!(r#"\[{}\s+"([^"]*)"\]"#, regex::escape(header_name));
    let re = Regex::new(&pattern).ok()?;
    let value = re.captures(pgn)?.get(1)?.as_str().to_string();
    if value.is_empty() { None } else { Some(value) }
}

/// Render headers and SAN moves as PGN. `first_fullmove` and `black_first`
/// describe the start position so numbering matches a FEN-started game.
pub fn write_pgn(headers: &PgnHeaders, sans: &[String], first_fullmove: u32, black_first: bool) -> String {
    let mut out = String::new();
    let mut tag = |name: &str, value: &str| {
        out.push_str(&format!("[{name} \"{}\"]\n", value.replace('"', "'")));
    };
    tag("Event", &headers.event);
    tag("Site", "?");
    tag("Date", &headers.date);
    tag("Round", "?");
    tag("White", &headers.white);
    tag("Black", &headers.black);
    tag("Result", &headers.result);
    if let Some(fen) = &headers.fen {
        tag("SetUp", "1");
        tag("FEN", fen);
    }
    out.push('\n');

    let mut tokens = Vec::with_capacity(sans.len() * 3 / 2 + 1);
    let mut number = first_fullmove;
    let mut white_to_move = !black_first;
    for (i, san) in sans.iter().enumerate() {
        if white_to_move {
            tokens.push(format!("{number}."));
        } else if i == 0 {
            tokens.push(format!("{number}..."));
        }
        tokens.push(san.clone());
        if !white_to_move {
            number += 1;
        }
        white_to_move = !white_to_move;
    }
    tokens.push(headers.result.clone());

    let mut line_len = 0;
    for token in tokens {
        if line_len > 0 && line_len + 1 + token.len() > LINE_WIDTH {
            out.push('\n');
            line_len = 0;
        } else if line_len > 0 {
            out.push(' ');
            line_len += 1;
        }
        line_len += token.len();
        out.push_str(&token);
    }
    out.push('\n');
    out
}
