//! Optional UCI engine behind the single-player desk. A missing or crashed
//! engine only disables suggestions and computer replies.

pub mod stockfish;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{info, warn};

pub use stockfish::StockfishEngine;

/// Executable names probed by [`locate_engine`], in order.
#[cfg(windows)]
const ENGINE_NAMES: &[&str] = &[
    "stockfish.exe",
    "stockfish_15_win_x64_avx2.exe",
    "stockfish_15_x64_avx2.exe",
];
#[cfg(not(windows))]
const ENGINE_NAMES: &[&str] = &["stockfish", "stockfish_15_linux_x64_avx2", "stockfish_15"];

/// Subdirectories of the base directory searched after the base itself.
const SEARCH_DIRS: &[&str] = &["stockfish", "engines", "bin"];

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("Stockfish engine not found. Please install Stockfish and ensure it is accessible.")]
    Unavailable,

    #[error("Failed to spawn engine: {0}")]
    Spawn(String),

    #[error("Engine I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Engine exited unexpectedly")]
    Exited,

    #[error("Timed out waiting for {0}")]
    Timeout(String),
}

/// Shared handle to at most one running engine process.
#[derive(Clone)]
pub struct Engine {
    path: Option<PathBuf>,
    process: Arc<Mutex<Option<StockfishEngine>>>,
}

impl Engine {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self {
            path,
            process: Arc::new(Mutex::new(None)),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub async fn is_running(&self) -> bool {
        self.process.lock().await.is_some()
    }

    /// (Re)start the engine process. Any previous process is shut down first.
    pub async fn start(&self, threads: u32, hash_mb: u32) -> Result<(), EngineError> {
        let path = self.path.as_ref().ok_or(EngineError::Unavailable)?;
        let mut slot = self.process.lock().await;
        if let Some(mut old) = slot.take() {
            old.quit().await;
        }
        let engine = StockfishEngine::new(&path.to_string_lossy(), threads, hash_mb).await?;
        *slot = Some(engine);
        info!(path = %path.display(), threads, hash_mb, "Engine started");
        Ok(())
    }

    /// Apply new `Threads` / `Hash` to a running engine. No-op otherwise.
    pub async fn configure(&self, threads: u32, hash_mb: u32) -> Result<(), EngineError> {
        let mut slot = self.process.lock().await;
        let Some(engine) = slot.as_mut() else {
            return Ok(());
        };
        let result = engine.configure(threads, hash_mb).await;
        if result.is_err() {
            slot.take();
        }
        result
    }

    /// Best move for `fen` in UCI notation. A failing process is discarded
    /// so the next `start` begins clean.
    pub async fn best_move(
        &self,
        fen: &str,
        movetime: Duration,
    ) -> Result<Option<String>, EngineError> {
        let mut slot = self.process.lock().await;
        let engine = slot.as_mut().ok_or(EngineError::Unavailable)?;
        match engine.best_move(fen, movetime).await {
            Ok(mv) => Ok(mv),
            Err(e) => {
                warn!(error = %e, "Engine failed, discarding process");
                slot.take();
                Err(e)
            }
        }
    }

    pub async fn shutdown(&self) {
        if let Some(mut engine) = self.process.lock().await.take() {
            engine.quit().await;
            info!("Engine stopped");
        }
    }
}

/// Look for a Stockfish executable in `base` and its `stockfish`, `engines`
/// and `bin` subdirectories.
pub fn locate_engine(base: &Path) -> Option<PathBuf> {
    std::iter::once(base.to_path_buf())
        .chain(SEARCH_DIRS.iter().map(|d| base.join(d)))
        .flat_map(|dir| ENGINE_NAMES.iter().map(move |name| dir.join(name)))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_engine_is_unavailable() {
        let engine = Engine::new(None);
        assert!(matches!(
            engine.start(1, 16).await,
            Err(EngineError::Unavailable)
        ));
        assert!(matches!(
            engine.best_move("8/8/8/8/8/8/8/K6k w - - 0 1", Duration::from_millis(10)).await,
            Err(EngineError::Unavailable)
        ));
        // Configuring nothing is fine
        assert!(engine.configure(2, 32).await.is_ok());
        assert!(!engine.is_running().await);
    }

    #[tokio::test]
    async fn test_spawn_failure() {
        let engine = Engine::new(Some(PathBuf::from("/definitely/not/here/stockfish")));
        assert!(matches!(
            engine.start(1, 16).await,
            Err(EngineError::Spawn(_))
        ));
        assert!(!engine.is_running().await);
    }

    #[test]
    fn test_locate_engine_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(locate_engine(dir.path()), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_locate_engine_prefers_base_then_subdirs() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let engines = dir.path().join("engines");
        std::fs::create_dir(&engines).unwrap();

        // Not executable: skipped
        let plain = dir.path().join("stockfish");
        std::fs::write(&plain, "").unwrap();

        let exe = engines.join("stockfish_15");
        std::fs::write(&exe, "#!/bin/sh\n").unwrap();
        std::fs::set_permissions(&exe, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(locate_engine(dir.path()), Some(exe));

        std::fs::set_permissions(&plain, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(locate_engine(dir.path()), Some(plain));
    }
}
