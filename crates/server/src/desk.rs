//! Single-player desk: one board per server instance, with an optional
//! engine that suggests moves or plays the other side.
//!
//! The desk lock is never held across an engine search. A computer reply is
//! computed against a copy of the position and only applied if the board has
//! not changed in the meantime.

use std::sync::Arc;
use std::time::Duration;

use chess_core::pgn::{self, PgnHeaders};
use chess_core::{move_pairs, CandidateMove, MovePair, Position, RulesOracle, Side};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::engine::{Engine, EngineError};
use crate::error::AppError;

const EVENT_NAME: &str = "Chess Assistant Game";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Engine only suggests; the user plays both sides.
    Suggest,
    /// Engine replies for the side opposite `player_color`.
    Play,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Settings {
    /// Think time per engine move, in seconds.
    pub time: f64,
    pub threads: u32,
    /// Hash table size in MB.
    pub memory: u32,
    pub player_color: Side,
    pub mode: Mode,
}

impl Settings {
    fn movetime(&self) -> Duration {
        Duration::from_secs_f64(self.time)
    }

    fn is_computer_turn(&self, turn: Side) -> bool {
        self.mode == Mode::Play && turn != self.player_color
    }
}

/// Partial settings from `POST /api/config`. Absent fields are unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub time: Option<f64>,
    pub threads: Option<u32>,
    pub memory: Option<u32>,
    pub player_color: Option<Side>,
    pub mode: Option<Mode>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    #[serde(rename = "move")]
    pub san: String,
    /// FEN after the move.
    pub fen: String,
    pub from: String,
    pub to: String,
}

/// An engine move as reported to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EngineMove {
    pub from: String,
    pub to: String,
    pub uci: String,
}

impl EngineMove {
    fn from_uci(uci: &str) -> Option<Self> {
        let mv = CandidateMove::from_uci(uci)?;
        Some(Self {
            from: mv.from.clone(),
            to: mv.to.clone(),
            uci: mv.uci(),
        })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MoveReply {
    pub fen: String,
    pub move_history: Vec<MovePair>,
    pub computer_move: Option<EngineMove>,
    pub game_over: bool,
    /// PGN score once the game is over.
    pub result: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BoardView {
    pub fen: String,
    pub move_history: Vec<MovePair>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SaveFormat {
    #[default]
    Pgn,
    Fen,
}

#[derive(Debug, Clone, Serialize)]
pub struct SavedGame {
    pub data: String,
    pub filename: String,
}

struct DeskState {
    start: Position,
    position: Position,
    history: Vec<HistoryEntry>,
    /// Position before each history entry.
    undo: Vec<Position>,
    settings: Settings,
    /// Bumped on every board change; stale engine replies are discarded.
    generation: u64,
}

impl DeskState {
    fn new(settings: Settings) -> Self {
        Self {
            start: Position::start(),
            position: Position::start(),
            history: Vec::new(),
            undo: Vec::new(),
            settings,
            generation: 0,
        }
    }

    fn reset_to(&mut self, position: Position) {
        self.start = position.clone();
        self.position = position;
        self.history.clear();
        self.undo.clear();
        self.generation += 1;
    }

    fn push(&mut self, position: Position, san: String, uci: &str) {
        let previous = std::mem::replace(&mut self.position, position);
        self.undo.push(previous);
        self.history.push(HistoryEntry {
            san,
            fen: self.position.fen(),
            from: uci[0..2].to_string(),
            to: uci[2..4].to_string(),
        });
        self.generation += 1;
    }

    fn pop(&mut self) -> bool {
        match self.undo.pop() {
            Some(previous) => {
                self.position = previous;
                self.history.pop();
                self.generation += 1;
                true
            }
            None => false,
        }
    }

    fn move_history(&self) -> Vec<MovePair> {
        let sans: Vec<&str> = self.history.iter().map(|h| h.san.as_str()).collect();
        move_pairs(&sans)
    }

    fn view(&self) -> BoardView {
        BoardView {
            fen: self.position.fen(),
            move_history: self.move_history(),
        }
    }
}

pub struct Desk {
    rules: Arc<dyn RulesOracle>,
    engine: Engine,
    state: Mutex<DeskState>,
}

impl Desk {
    pub fn new(rules: Arc<dyn RulesOracle>, engine: Engine, settings: Settings) -> Self {
        Self {
            rules,
            engine,
            state: Mutex::new(DeskState::new(settings)),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub async fn settings(&self) -> Settings {
        self.state.lock().await.settings.clone()
    }

    /// (Re)start the engine with the current settings.
    pub async fn init(&self) -> Result<(), EngineError> {
        let (threads, memory) = {
            let state = self.state.lock().await;
            (state.settings.threads, state.settings.memory)
        };
        self.engine.start(threads, memory).await
    }

    pub async fn update_settings(&self, update: SettingsUpdate) -> Result<Settings, AppError> {
        if let Some(time) = update.time {
            if !time.is_finite() || !(0.01..=60.0).contains(&time) {
                return Err(AppError::BadRequest(
                    "time must be between 0.01 and 60 seconds".into(),
                ));
            }
        }
        if let Some(threads) = update.threads {
            if !(1..=512).contains(&threads) {
                return Err(AppError::BadRequest("threads must be between 1 and 512".into()));
            }
        }
        if let Some(memory) = update.memory {
            if !(1..=65536).contains(&memory) {
                return Err(AppError::BadRequest("memory must be between 1 and 65536 MB".into()));
            }
        }

        let settings = {
            let mut state = self.state.lock().await;
            let s = &mut state.settings;
            if let Some(time) = update.time {
                s.time = time;
            }
            if let Some(threads) = update.threads {
                s.threads = threads;
            }
            if let Some(memory) = update.memory {
                s.memory = memory;
            }
            if let Some(color) = update.player_color {
                s.player_color = color;
            }
            if let Some(mode) = update.mode {
                s.mode = mode;
            }
            s.clone()
        };

        if update.threads.is_some() || update.memory.is_some() {
            self.engine
                .configure(settings.threads, settings.memory)
                .await?;
        }
        debug!(?settings, "Desk settings updated");
        Ok(settings)
    }

    /// Play the user's move; in play mode also fetch and apply the
    /// computer's reply.
    pub async fn make_move(
        &self,
        from: &str,
        to: &str,
        promotion: Option<&str>,
    ) -> Result<MoveReply, AppError> {
        let mut mv = CandidateMove::new(from, to);
        if let Some(piece) = promotion.filter(|p| !p.is_empty()) {
            mv = mv.with_promotion(piece);
        }

        let pending = {
            let mut state = self.state.lock().await;
            let applied = self
                .rules
                .apply(&state.position, &mv)
                .map_err(|_| AppError::BadRequest("Illegal move".into()))?;
            state.push(applied.position, applied.san, &applied.uci);

            let over = self.rules.is_terminal(&state.position).is_some();
            if !over && state.settings.is_computer_turn(state.position.turn()) {
                Some((
                    state.position.fen(),
                    state.generation,
                    state.settings.movetime(),
                ))
            } else {
                None
            }
        };

        let mut computer_move = None;
        if let Some((fen, generation, movetime)) = pending {
            computer_move = self.computer_reply(&fen, generation, movetime).await;
        }

        let state = self.state.lock().await;
        let result = self.rules.is_terminal(&state.position);
        Ok(MoveReply {
            fen: state.position.fen(),
            move_history: state.move_history(),
            computer_move,
            game_over: result.is_some(),
            result: result.map(|r| r.score().to_string()),
        })
    }

    /// Search outside the lock, then apply if the board is unchanged. Engine
    /// trouble leaves the user's move in place with no reply.
    async fn computer_reply(
        &self,
        fen: &str,
        generation: u64,
        movetime: Duration,
    ) -> Option<EngineMove> {
        let uci = match self.engine.best_move(fen, movetime).await {
            Ok(Some(uci)) => uci,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, "No computer reply");
                return None;
            }
        };

        let mut state = self.state.lock().await;
        if state.generation != generation {
            debug!(uci, "Board changed during search, dropping computer reply");
            return None;
        }
        let reply = EngineMove::from_uci(&uci)?;
        let candidate = CandidateMove::from_uci(&uci)?;
        match self.rules.apply(&state.position, &candidate) {
            Ok(applied) => {
                state.push(applied.position, applied.san, &applied.uci);
                Some(reply)
            }
            Err(e) => {
                warn!(uci, error = %e, "Engine proposed an illegal move");
                None
            }
        }
    }

    /// Best move for the current position. `Ok(None)` when there is nothing
    /// to play.
    pub async fn suggest(&self) -> Result<Option<EngineMove>, EngineError> {
        let (fen, movetime) = {
            let state = self.state.lock().await;
            (state.position.fen(), state.settings.movetime())
        };
        let best = self.engine.best_move(&fen, movetime).await?;
        Ok(best.as_deref().and_then(EngineMove::from_uci))
    }

    pub async fn fen(&self) -> String {
        self.state.lock().await.position.fen()
    }

    /// Replace the board with `fen`, clearing history.
    pub async fn set_fen(&self, fen: &str) -> Result<String, AppError> {
        let position = Position::from_fen(fen)?;
        let mut state = self.state.lock().await;
        state.reset_to(position);
        Ok(state.position.fen())
    }

    pub async fn reset(&self) -> BoardView {
        let mut state = self.state.lock().await;
        state.reset_to(Position::start());
        state.view()
    }

    /// Take back the last ply. In play mode, if that leaves the computer to
    /// move, its ply is taken back too so the user is on move again.
    pub async fn undo(&self) -> Result<BoardView, AppError> {
        let mut state = self.state.lock().await;
        if !state.pop() {
            return Err(AppError::BadRequest("No moves to undo".into()));
        }
        if !state.undo.is_empty() && state.settings.is_computer_turn(state.position.turn()) {
            state.pop();
        }
        Ok(state.view())
    }

    pub async fn save(&self, format: SaveFormat) -> SavedGame {
        let state = self.state.lock().await;
        let now = chrono::Local::now();
        let stamp = now.format("%Y%m%d_%H%M%S");

        match format {
            SaveFormat::Fen => SavedGame {
                data: state.position.fen(),
                filename: format!("position_{stamp}.fen"),
            },
            SaveFormat::Pgn => {
                let (white, black) = match state.settings.player_color {
                    Side::White => ("Player", "Computer"),
                    Side::Black => ("Computer", "Player"),
                };
                let start_fen = state.start.fen();
                let headers = PgnHeaders {
                    event: EVENT_NAME.to_string(),
                    date: now.format("%Y.%m.%d").to_string(),
                    white: white.to_string(),
                    black: black.to_string(),
                    result: self
                        .rules
                        .is_terminal(&state.position)
                        .map(|r| r.score().to_string())
                        .unwrap_or_else(|| "*".to_string()),
                    fen: (start_fen != Position::start().fen()).then_some(start_fen),
                };
                let sans: Vec<String> = state.history.iter().map(|h| h.san.clone()).collect();
                SavedGame {
                    data: pgn::write_pgn(
                        &headers,
                        &sans,
                        state.start.fullmoves(),
                        state.start.turn() == Side::Black,
                    ),
                    filename: format!("game_{stamp}.pgn"),
                }
            }
        }
    }

    /// Load a PGN game (replaying its mainline into the history) or a FEN.
    pub async fn load(&self, content: &str, format: SaveFormat) -> Result<BoardView, AppError> {
        match format {
            SaveFormat::Fen => {
                self.set_fen(content).await?;
            }
            SaveFormat::Pgn => {
                let game = pgn::parse_pgn(content)?;
                let mut state = self.state.lock().await;
                state.reset_to(game.start);
                for m in game.moves {
                    state.push(m.position, m.san, &m.uci);
                }
                info!(plies = state.history.len(), "Loaded PGN");
            }
        }
        Ok(self.state.lock().await.view())
    }

    /// Legal moves in UCI, optionally only those starting on `square`.
    pub async fn legal_moves(&self, square: Option<&str>) -> Result<Vec<String>, AppError> {
        let state = self.state.lock().await;
        state
            .position
            .legal_moves(square.filter(|s| !s.is_empty()))
            .map_err(|_| AppError::BadRequest("Invalid square".into()))
    }

    pub async fn history(&self) -> Vec<HistoryEntry> {
        self.state.lock().await.history.clone()
    }
}
