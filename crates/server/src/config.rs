use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::engine;

#[derive(Clone, Debug)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Explicit engine path, or whatever discovery found. `None` runs the
    /// server without an engine.
    pub stockfish_path: Option<PathBuf>,
    pub engine_threads: u32,
    pub engine_hash_mb: u32,
    pub engine_move_time: Duration,
    /// Per-connection outbound queue length.
    pub broadcast_buffer: usize,
}

impl Config {
    pub fn from_env() -> Self {
        let stockfish_path = env::var("STOCKFISH_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .or_else(|| {
                env::current_dir()
                    .ok()
                    .and_then(|dir| engine::locate_engine(&dir))
            });

        Self {
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_var("PORT").unwrap_or(5000),
            stockfish_path,
            engine_threads: parse_var("ENGINE_THREADS").unwrap_or(1),
            engine_hash_mb: parse_var("ENGINE_HASH_MB").unwrap_or(128),
            engine_move_time: parse_var::<f64>("ENGINE_MOVE_TIME")
                .filter(|secs| secs.is_finite() && *secs > 0.0)
                .map(Duration::from_secs_f64)
                .unwrap_or(Duration::from_secs(1)),
            broadcast_buffer: parse_var("BROADCAST_BUFFER")
                .filter(|n| *n > 0)
                .unwrap_or(64),
        }
    }
}

impl Default for Config {
    /// Defaults without reading the environment and without an engine.
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 0,
            stockfish_path: None,
            engine_threads: 1,
            engine_hash_mb: 128,
            engine_move_time: Duration::from_secs(1),
            broadcast_buffer: 64,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
