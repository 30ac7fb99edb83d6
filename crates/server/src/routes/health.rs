use std::sync::Arc;

use axum::{Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::desk::Desk;
use crate::multiplayer::ConnectionRouter;

pub async fn health_check(
    Extension(router): Extension<Arc<ConnectionRouter>>,
    Extension(desk): Extension<Arc<Desk>>,
) -> Json<JsonValue> {
    Json(json!({
        "status": "ok",
        "engine": desk.engine().is_running().await,
        "sessions": router.registry().len().await,
        "connections": router.connection_count().await,
    }))
}
