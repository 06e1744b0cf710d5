use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderValue, StatusCode},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use crate::common::types::SessionToken;
use crate::server::AppState;

/// Gate for the token-protected HTTP routes. The /sync upgrade performs
/// the same check itself.
pub async fn check_token(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let session = state.active_session().await;
    let provided = query_token(req.uri().query());

    match authorize(provided.as_deref(), session.as_ref().map(|s| &s.token)) {
        Ok(()) => Ok(next.run(req).await),
        Err(status) => {
            warn!(
                "rejected {} {}: {}",
                req.method(),
                req.uri().path(),
                if status == StatusCode::FORBIDDEN {
                    "wrong token"
                } else {
                    "no session or missing token"
                }
            );
            Err(status)
        }
    }
}

pub async fn add_response_headers(req: Request, next: Next) -> Response {
    let mut response = next.run(req).await;
    response.headers_mut().insert(
        "Wavelink-Version",
        HeaderValue::from_static(env!("CARGO_PKG_VERSION")),
    );
    response
}

/// Distinguishable outcomes so receivers can tell the cases apart: 401
/// when no broadcast is active or the token is absent, 403 when a session
/// exists but the supplied token is wrong.
pub(crate) fn authorize(
    provided: Option<&str>,
    active: Option<&SessionToken>,
) -> Result<(), StatusCode> {
    let Some(active) = active else {
        return Err(StatusCode::UNAUTHORIZED);
    };
    match provided {
        Some(candidate) if active.matches(candidate) => Ok(()),
        Some(_) => Err(StatusCode::FORBIDDEN),
        None => Err(StatusCode::UNAUTHORIZED),
    }
}

/// Extracts the `token` query parameter, percent-decoded.
pub(crate) fn query_token(query: Option<&str>) -> Option<String> {
    let query = query?;
    query.split('&').find_map(|kv| {
        let mut parts = kv.splitn(2, '=');
        if parts.next() != Some("token") {
            return None;
        }
        let raw = parts.next().unwrap_or("");
        Some(match urlencoding::decode(raw) {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => raw.to_string(),
        })
    })
}
