//! Single-player board endpoints under `/api`.

use std::sync::Arc;

use axum::{Extension, Json};
use serde::Deserialize;
use serde_json::{json, Value as JsonValue};

use crate::desk::{Desk, SaveFormat, SettingsUpdate};
use crate::error::AppError;

#[derive(Deserialize)]
pub struct MoveRequest {
    pub from: String,
    pub to: String,
    #[serde(default)]
    pub promotion: Option<String>,
}

#[derive(Deserialize)]
pub struct FenRequest {
    pub fen: String,
}

#[derive(Deserialize, Default)]
pub struct SaveRequest {
    #[serde(default)]
    pub format: SaveFormat,
}

#[derive(Deserialize)]
pub struct LoadRequest {
    pub content: String,
    #[serde(default)]
    pub format: SaveFormat,
}

#[derive(Deserialize, Default)]
pub struct LegalMovesRequest {
    #[serde(default)]
    pub square: Option<String>,
}

/// POST /api/init: (re)start the engine. A missing engine is reported in
/// the body, not as an HTTP error, so the board stays usable.
pub async fn init(Extension(desk): Extension<Arc<Desk>>) -> Json<JsonValue> {
    let outcome = desk.init().await;
    let fen = desk.fen().await;
    let config = desk.settings().await;
    match outcome {
        Ok(()) => Json(json!({ "success": true, "fen": fen, "config": config })),
        Err(e) => {
            tracing::warn!("Engine init failed: {e}");
            Json(json!({
                "success": false,
                "error": e.to_string(),
                "fen": fen,
                "config": config,
            }))
        }
    }
}

/// POST /api/config
pub async fn set_config(
    Extension(desk): Extension<Arc<Desk>>,
    Json(update): Json<SettingsUpdate>,
) -> Result<Json<JsonValue>, AppError> {
    let config = desk.update_settings(update).await?;
    Ok(Json(json!({ "success": true, "config": config })))
}

/// POST /api/move
pub async fn make_move(
    Extension(desk): Extension<Arc<Desk>>,
    Json(body): Json<MoveRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let reply = desk
        .make_move(&body.from, &body.to, body.promotion.as_deref())
        .await?;
    Ok(Json(json!({
        "success": true,
        "fen": reply.fen,
        "move_history": reply.move_history,
        "computer_move": reply.computer_move,
        "game_over": reply.game_over,
        "result": reply.result,
    })))
}

/// POST /api/suggest
pub async fn suggest(Extension(desk): Extension<Arc<Desk>>) -> Result<Json<JsonValue>, AppError> {
    let suggestion = desk.suggest().await?;
    Ok(Json(json!({
        "success": suggestion.is_some(),
        "suggestion": suggestion,
    })))
}

/// GET /api/fen
pub async fn get_fen(Extension(desk): Extension<Arc<Desk>>) -> Json<JsonValue> {
    Json(json!({ "fen": desk.fen().await }))
}

/// POST /api/fen
pub async fn set_fen(
    Extension(desk): Extension<Arc<Desk>>,
    Json(body): Json<FenRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let fen = desk.set_fen(&body.fen).await?;
    Ok(Json(json!({ "success": true, "fen": fen })))
}

/// POST /api/reset
pub async fn reset(Extension(desk): Extension<Arc<Desk>>) -> Json<JsonValue> {
    let view = desk.reset().await;
    Json(json!({
        "success": true,
        "fen": view.fen,
        "move_history": view.move_history,
    }))
}

/// POST /api/undo
pub async fn undo(Extension(desk): Extension<Arc<Desk>>) -> Result<Json<JsonValue>, AppError> {
    let view = desk.undo().await?;
    Ok(Json(json!({
        "success": true,
        "fen": view.fen,
        "move_history": view.move_history,
    })))
}

/// POST /api/save
pub async fn save(
    Extension(desk): Extension<Arc<Desk>>,
    body: Option<Json<SaveRequest>>,
) -> Json<JsonValue> {
    let format = body.map(|Json(b)| b.format).unwrap_or_default();
    let saved = desk.save(format).await;
    Json(json!({
        "success": true,
        "data": saved.data,
        "filename": saved.filename,
    }))
}

/// POST /api/load
pub async fn load(
    Extension(desk): Extension<Arc<Desk>>,
    Json(body): Json<LoadRequest>,
) -> Result<Json<JsonValue>, AppError> {
    let view = desk.load(&body.content, body.format).await?;
    Ok(Json(json!({
        "success": true,
        "fen": view.fen,
        "move_history": view.move_history,
    })))
}

/// POST /api/legal_moves
pub async fn legal_moves(
    Extension(desk): Extension<Arc<Desk>>,
    body: Option<Json<LegalMovesRequest>>,
) -> Result<Json<JsonValue>, AppError> {
    let square = body.and_then(|Json(b)| b.square);
    let moves = desk.legal_moves(square.as_deref()).await?;
    Ok(Json(json!({ "success": true, "moves": moves })))
}
