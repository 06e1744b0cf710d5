use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::Message;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::common::types::now_ms;
use crate::protocol::PlaybackSnapshot;
use crate::server::{AppState, BroadcastSession};

/// Starts the publish task unless one is already committed to running.
/// Called after every successful /sync registration.
pub async fn ensure_running(state: Arc<AppState>, session: Arc<BroadcastSession>) {
    let mut slot = session.publisher.lock().await;
    if slot.is_some() {
        return;
    }
    let cancel = CancellationToken::new();
    *slot = Some(cancel.clone());
    tokio::spawn(publish_loop(state, session.clone(), cancel));
}

/// Cancels the publish task if the client set is still empty. Called from
/// the disconnect path; the emptiness re-check under the slot lock keeps a
/// concurrent registration from being stranded without a publisher.
pub async fn stop_if_idle(session: &BroadcastSession) {
    let mut slot = session.publisher.lock().await;
    if session.clients.is_empty() {
        if let Some(cancel) = slot.take() {
            cancel.cancel();
            debug!("publish task cancelled: no clients left");
        }
    }
}

/// Unconditionally cancels the publish task. Safe when already stopped.
pub async fn stop(session: &BroadcastSession) {
    if let Some(cancel) = session.publisher.lock().await.take() {
        cancel.cancel();
    }
}

async fn publish_loop(
    state: Arc<AppState>,
    session: Arc<BroadcastSession>,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_millis(
        state.config.sync.publish_interval_ms.max(1),
    ));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    debug!("publish task started");

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                let Some(now_playing) = state.state_source.now_playing() else {
                    continue;
                };
                let snapshot = PlaybackSnapshot::from_now_playing(&now_playing, now_ms());
                let json = match serde_json::to_string(&snapshot) {
                    Ok(json) => json,
                    Err(e) => {
                        warn!("snapshot serialization failed: {e}");
                        continue;
                    }
                };
                if publish_tick(&session, &json) == 0 {
                    let mut slot = session.publisher.lock().await;
                    if cancel.is_cancelled() {
                        // stop/stop_if_idle already took the slot; it is
                        // not ours to clear anymore
                        break;
                    }
                    if session.clients.is_empty() {
                        *slot = None;
                        break;
                    }
                    // a client registered while we pruned; keep going
                }
            }
        }
    }

    debug!("publish task stopped");
}

/// Sends one serialized snapshot to every connected client, pruning the
/// ones whose socket task is gone. Returns the number of clients left.
pub(crate) fn publish_tick(session: &BroadcastSession, json: &str) -> usize {
    let mut dead = Vec::new();
    for entry in session.clients.iter() {
        if entry
            .value()
            .sender
            .send(Message::Text(json.to_owned().into()))
            .is_err()
        {
            dead.push(entry.key().clone());
        }
    }
    for id in &dead {
        if let Some((_, conn)) = session.clients.remove(id) {
            warn!("pruned dead sync client {id} ({})", conn.remote);
        }
    }
    session.clients.len()
}
