pub mod config;
pub mod desk;
pub mod engine;
pub mod error;
pub mod multiplayer;
pub mod routes;

use std::sync::Arc;

use axum::{routing::get, routing::post, Extension, Router};
use chess_core::{RulesOracle, StandardRules};
use tower_http::cors::{Any, CorsLayer};

use config::Config;
use desk::{Desk, Mode, Settings};
use engine::Engine;
use multiplayer::{ConnectionRouter, Registry};

/// Long-lived state shared by every request.
#[derive(Clone)]
pub struct Services {
    pub router: Arc<ConnectionRouter>,
    pub desk: Arc<Desk>,
}

impl Services {
    pub fn new(config: &Config) -> Self {
        let rules: Arc<dyn RulesOracle> = Arc::new(StandardRules);
        let settings = Settings {
            time: config.engine_move_time.as_secs_f64(),
            threads: config.engine_threads,
            memory: config.engine_hash_mb,
            player_color: chess_core::Side::White,
            mode: Mode::Suggest,
        };
        Self {
            router: Arc::new(ConnectionRouter::new(Registry::new(rules.clone()))),
            desk: Arc::new(Desk::new(
                rules,
                Engine::new(config.stockfish_path.clone()),
                settings,
            )),
        }
    }
}

pub fn app(config: Config, services: &Services) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Health
        .route("/health", get(routes::health::health_check))
        // Multiplayer
        .route("/ws", get(routes::multiplayer_ws::ws_handler))
        .route("/api/active_games", get(routes::lobby::active_games))
        // Single player
        .route("/api/init", post(routes::single_player::init))
        .route("/api/config", post(routes::single_player::set_config))
        .route("/api/move", post(routes::single_player::make_move))
        .route("/api/suggest", post(routes::single_player::suggest))
        .route(
            "/api/fen",
            get(routes::single_player::get_fen).post(routes::single_player::set_fen),
        )
        .route("/api/reset", post(routes::single_player::reset))
        .route("/api/undo", post(routes::single_player::undo))
        .route("/api/save", post(routes::single_player::save))
        .route("/api/load", post(routes::single_player::load))
        .route("/api/legal_moves", post(routes::single_player::legal_moves))
        // Shared state
        .layer(Extension(services.router.clone()))
        .layer(Extension(services.desk.clone()))
        .layer(Extension(config))
        .layer(cors)
}
