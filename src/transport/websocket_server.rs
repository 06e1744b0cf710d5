use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{
        ConnectInfo, Query, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::StatusCode,
    response::Response,
};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::common::types::now_ms;
use crate::protocol::{ClockSyncReply, ClockSyncRequest};
use crate::server::{AppState, BroadcastSession, ClientConnection, publisher};

#[derive(Debug, Deserialize)]
pub struct SyncParams {
    token: Option<String>,
}

/// GET /sync: WebSocket upgrade for the snapshot push channel. Token
/// outcomes are distinguishable: 401 when no broadcast is active or the
/// token is missing, 403 when the token is wrong.
pub async fn sync_handler(
    ws: WebSocketUpgrade,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    Query(params): Query<SyncParams>,
    State(state): State<Arc<AppState>>,
) -> Result<Response, (StatusCode, &'static str)> {
    let Some(session) = state.active_session().await else {
        warn!("sync rejected from {addr}: no active broadcast");
        return Err((StatusCode::UNAUTHORIZED, "no active broadcast"));
    };

    match params.token.as_deref() {
        Some(candidate) if session.token.matches(candidate) => {}
        Some(_) => {
            warn!("sync rejected from {addr}: wrong token");
            return Err((StatusCode::FORBIDDEN, "wrong token"));
        }
        None => {
            warn!("sync rejected from {addr}: missing token");
            return Err((StatusCode::UNAUTHORIZED, "missing token"));
        }
    }

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, addr, state, session)))
}

pub async fn handle_socket(
    mut socket: WebSocket,
    addr: SocketAddr,
    state: Arc<AppState>,
    session: Arc<BroadcastSession>,
) {
    // Clock calibration comes first; snapshots sent before the receiver
    // knows its offset would be meaningless to it.
    if !clock_handshake(&mut socket, addr).await {
        debug!("sync connection from {addr} ended during handshake");
        return;
    }

    let (tx, rx) = flume::unbounded::<Message>();
    let conn = Arc::new(ClientConnection::new(addr, tx));
    let client_id = conn.id.clone();
    session.clients.insert(client_id.clone(), conn);
    info!("sync client connected: id={client_id} remote={addr}");

    publisher::ensure_running(state, session.clone()).await;

    loop {
        tokio::select! {
            outgoing = rx.recv_async() => {
                let Ok(msg) = outgoing else { break };
                if let Err(e) = socket.send(msg).await {
                    warn!("sync send failed: id={client_id} err={e}");
                    break;
                }
            }
            incoming = socket.recv() => {
                let msg = match incoming {
                    Some(Ok(msg)) => msg,
                    Some(Err(e)) => {
                        warn!("sync socket error: id={client_id} err={e}");
                        break;
                    }
                    None => break,
                };
                match msg {
                    // receivers may send keepalives; log and ignore
                    Message::Text(text) => {
                        debug!("ignoring client frame: id={client_id} len={}", text.len());
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        }
    }

    session.clients.remove(&client_id);
    info!("sync client disconnected: id={client_id} remote={addr}");
    if session.clients.is_empty() {
        publisher::stop_if_idle(&session).await;
    }
}

/// One round-trip clock calibration: the client sends `{"clientTime"}`,
/// the server replies `{"serverTime"}` stamped on receipt. Returns false
/// when the connection ended before completing.
async fn clock_handshake(socket: &mut WebSocket, addr: SocketAddr) -> bool {
    let msg = match socket.recv().await {
        Some(Ok(msg)) => msg,
        Some(Err(e)) => {
            warn!("handshake error from {addr}: {e}");
            return false;
        }
        None => return false,
    };

    match msg {
        Message::Text(text) => {
            match serde_json::from_str::<ClockSyncRequest>(text.as_str()) {
                Ok(request) => {
                    debug!("clock handshake from {addr}: clientTime={}", request.client_time);
                }
                // a bad frame is dropped, not fatal; the receiver treats a
                // missing offset as zero
                Err(e) => warn!("malformed clock handshake from {addr}: {e}"),
            }

            let reply = ClockSyncReply {
                server_time: now_ms() as i64,
            };
            match serde_json::to_string(&reply) {
                Ok(json) => {
                    if let Err(e) = socket.send(Message::Text(json.into())).await {
                        warn!("failed to send clock reply to {addr}: {e}");
                        return false;
                    }
                }
                Err(e) => warn!("failed to serialize clock reply: {e}"),
            }
            true
        }
        Message::Close(_) => false,
        _ => {
            debug!("unexpected first frame from {addr}; proceeding uncalibrated");
            true
        }
    }
}
