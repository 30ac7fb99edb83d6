use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::engine::EngineError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl From<chess_core::RulesError> for AppError {
    fn from(e: chess_core::RulesError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl From<chess_core::pgn::PgnError> for AppError {
    fn from(e: chess_core::pgn::PgnError) -> Self {
        AppError::BadRequest(e.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Engine(EngineError::Unavailable) => {
                (StatusCode::SERVICE_UNAVAILABLE, self.to_string())
            }
            AppError::Engine(e) => {
                tracing::warn!("Engine error: {e}");
                (StatusCode::SERVICE_UNAVAILABLE, e.to_string())
            }
        };

        (status, Json(json!({ "success": false, "error": message }))).into_response()
    }
}
