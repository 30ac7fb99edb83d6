use std::sync::Arc;

use axum::{Extension, Json};
use serde_json::{json, Value as JsonValue};

use crate::multiplayer::ConnectionRouter;

/// GET /api/active_games: seat occupancy of every live session.
pub async fn active_games(
    Extension(router): Extension<Arc<ConnectionRouter>>,
) -> Json<JsonValue> {
    let games = router.active_games().await;
    Json(json!({ "games": games }))
}
