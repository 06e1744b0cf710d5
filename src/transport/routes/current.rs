use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use tracing::error;

use crate::common::WavelinkError;
use crate::common::types::now_ms;
use crate::protocol::PlaybackSnapshot;
use crate::server::AppState;

const PATH: &str = "/current";

/// GET /current: one-shot snapshot of the broadcaster's playback state.
pub async fn current_snapshot(State(state): State<Arc<AppState>>) -> Response {
    let Some(now_playing) = state.state_source.now_playing() else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let snapshot = PlaybackSnapshot::from_now_playing(&now_playing, now_ms());
    match serde_json::to_value(&snapshot) {
        Ok(body) => (StatusCode::OK, Json(body)).into_response(),
        Err(e) => {
            error!("failed to serialize snapshot: {e}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WavelinkError::internal(e.to_string(), PATH)),
            )
                .into_response()
        }
    }
}
