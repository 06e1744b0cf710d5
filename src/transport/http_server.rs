use std::sync::Arc;

use axum::{Router, middleware, routing::get};

use crate::{
    server::AppState,
    transport::{
        middleware::{add_response_headers, check_token},
        routes::{current, song, stream},
        websocket_server,
    },
};

/// Builds the broadcast endpoint set: token-gated audio and snapshot
/// routes, the /sync channel (which checks its own token) and a tokenless
/// liveness route.
pub fn router(state: Arc<AppState>) -> Router {
    let gated = Router::new()
        .route("/song", get(song::download_song))
        .route("/stream", get(stream::relay_stream))
        .route("/current", get(current::current_snapshot))
        .layer(middleware::from_fn_with_state(state.clone(), check_token));

    Router::new()
        .merge(gated)
        .route("/", get(info_text))
        .route("/sync", get(websocket_server::sync_handler))
        .layer(middleware::from_fn(add_response_headers))
        .layer(tower_http::trace::TraceLayer::new_for_http())
        .with_state(state)
}

async fn info_text() -> String {
    format!(
        "{} v{} broadcasting",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )
}
