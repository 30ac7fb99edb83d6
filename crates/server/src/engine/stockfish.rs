//! Stockfish engine wrapper using UCI protocol (async I/O)

use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tracing::debug;

use super::EngineError;

/// Slack on top of the requested think time before a search counts as hung.
const SEARCH_GRACE: Duration = Duration::from_secs(5);

/// Handshake budget for `uciok` / `readyok`.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Stockfish engine instance
pub struct StockfishEngine {
    process: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl StockfishEngine {
    /// Spawn a new Stockfish process, run the UCI handshake and apply
    /// `Threads` / `Hash`.
    pub async fn new(path: &str, threads: u32, hash_mb: u32) -> Result<Self, EngineError> {
        let mut process = Command::new(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| EngineError::Spawn(format!("{path}: {e}")))?;

        let stdin = process
            .stdin
            .take()
            .ok_or_else(|| EngineError::Spawn("stdin not captured".into()))?;
        let stdout = process
            .stdout
            .take()
            .map(BufReader::new)
            .ok_or_else(|| EngineError::Spawn("stdout not captured".into()))?;

        let mut engine = Self {
            process,
            stdin,
            stdout,
        };

        engine.send("uci").await?;
        engine.wait_for("uciok", HANDSHAKE_TIMEOUT).await?;
        engine.configure(threads, hash_mb).await?;

        Ok(engine)
    }

    /// Re-send `Threads` / `Hash` and wait until the engine has applied them.
    pub async fn configure(&mut self, threads: u32, hash_mb: u32) -> Result<(), EngineError> {
        self.send(&format!("setoption name Threads value {threads}"))
            .await?;
        self.send(&format!("setoption name Hash value {hash_mb}"))
            .await?;
        self.send("isready").await?;
        self.wait_for("readyok", HANDSHAKE_TIMEOUT).await
    }

    /// Send a command to Stockfish
    async fn send(&mut self, cmd: &str) -> Result<(), EngineError> {
        debug!(cmd, "SF <");
        self.stdin.write_all(format!("{cmd}\n").as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self, line: &mut String) -> Result<(), EngineError> {
        line.clear();
        if self.stdout.read_line(line).await? == 0 {
            return Err(EngineError::Exited);
        }
        Ok(())
    }

    /// Wait for a specific response line
    async fn wait_for(&mut self, expected: &str, limit: Duration) -> Result<(), EngineError> {
        let wait = async {
            let mut line = String::new();
            loop {
                self.read_line(&mut line).await?;
                let trimmed = line.trim();
                debug!(line = trimmed, "SF >");
                if trimmed == expected {
                    return Ok::<(), EngineError>(());
                }
            }
        };
        tokio::time::timeout(limit, wait)
            .await
            .map_err(|_| EngineError::Timeout(expected.to_string()))?
    }

    /// Search `fen` for `movetime` and return the best move in UCI notation.
    /// `None` when the side to move has no legal move.
    pub async fn best_move(
        &mut self,
        fen: &str,
        movetime: Duration,
    ) -> Result<Option<String>, EngineError> {
        self.send(&format!("position fen {fen}")).await?;
        self.send(&format!("go movetime {}", movetime.as_millis().max(1)))
            .await?;

        let search = async {
            let mut line = String::new();
            loop {
                self.read_line(&mut line).await?;
                let trimmed = line.trim();
                if trimmed.starts_with("bestmove") {
                    debug!(line = trimmed, "SF >");
                    return Ok::<_, EngineError>(parse_bestmove(trimmed));
                }
            }
        };
        tokio::time::timeout(movetime + SEARCH_GRACE, search)
            .await
            .map_err(|_| EngineError::Timeout("bestmove".into()))?
    }

    /// Send quit command and wait for process to exit
    pub async fn quit(&mut self) {
        let _ = self.send("quit").await;
        let _ = self.process.wait().await;
    }
}

impl Drop for StockfishEngine {
    fn drop(&mut self) {
        // Best-effort synchronous kill in drop
        let _ = self.process.start_kill();
    }
}

/// Parse the move from a `bestmove` line. `(none)` and `0000` mean no move.
fn parse_bestmove(line: &str) -> Option<String> {
    let mut parts = line.split_whitespace();
    if parts.next()? != "bestmove" {
        return None;
    }
    match parts.next()? {
        "(none)" | "0000" => None,
        mv => Some(mv.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bestmove() {
        assert_eq!(
            parse_bestmove("bestmove e2e4 ponder e7e5"),
            Some("e2e4".to_string())
        );
        assert_eq!(parse_bestmove("bestmove a7a8q"), Some("a7a8q".to_string()));
    }

    #[test]
    fn test_parse_bestmove_none() {
        assert_eq!(parse_bestmove("bestmove (none)"), None);
        assert_eq!(parse_bestmove("bestmove 0000"), None);
        assert_eq!(parse_bestmove("bestmove"), None);
        assert_eq!(parse_bestmove("info depth 1 pv e2e4"), None);
    }
}
