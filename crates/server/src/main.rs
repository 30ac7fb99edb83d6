use server::config;
use server::{app, Services};

use anyhow::Context;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = config::Config::from_env();
    let services = Services::new(&config);

    // Start the engine up front; the server runs without one if this fails.
    match &config.stockfish_path {
        Some(path) => {
            tracing::info!("Using Stockfish engine at: {}", path.display());
            if let Err(e) = services.desk.init().await {
                tracing::warn!("Engine not started: {e}");
            }
        }
        None => tracing::warn!(
            "Stockfish engine not found - suggestions and computer play disabled. \
             Set STOCKFISH_PATH or place the executable in ./, ./stockfish, ./engines or ./bin"
        ),
    }

    let router = app(config.clone(), &services);

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    services.desk.engine().shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Shutting down");
}
