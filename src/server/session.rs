use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::ws::Message;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::common::types::{ClientId, SessionToken, now_ms};
use crate::server::publisher;

/// A live /sync connection registered with the session.
pub struct ClientConnection {
    pub id: ClientId,
    pub remote: SocketAddr,
    pub connected_at_ms: u64,
    /// Outgoing frames; the connection's socket task forwards these to the
    /// peer. Dropping the sender ends that task.
    pub sender: flume::Sender<Message>,
}

impl ClientConnection {
    pub fn new(remote: SocketAddr, sender: flume::Sender<Message>) -> Self {
        Self {
            id: ClientId::generate(),
            remote,
            connected_at_ms: now_ms(),
            sender,
        }
    }
}

/// Server-side aggregate for one broadcast: the token, the connected sync
/// clients and the publish-task control. At most one exists at a time.
pub struct BroadcastSession {
    pub token: SessionToken,
    pub started_at_ms: u64,
    pub clients: DashMap<ClientId, Arc<ClientConnection>>,
    /// `Some` exactly while a publish task is committed to running. Guarded
    /// so task start/stop decisions and client-set emptiness are judged
    /// under the same lock.
    pub(crate) publisher: Mutex<Option<CancellationToken>>,
}

impl BroadcastSession {
    pub fn new() -> Self {
        Self {
            token: SessionToken::generate(),
            started_at_ms: now_ms(),
            clients: DashMap::new(),
            publisher: Mutex::new(None),
        }
    }

    /// Cancels the publish task and drops every client connection. Safe to
    /// call repeatedly.
    pub async fn shutdown(&self) {
        publisher::stop(self).await;
        self.clients.clear();
    }
}

impl Default for BroadcastSession {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn shutdown_twice_leaves_same_observable_state() {
        let session = BroadcastSession::new();
        let (tx, _rx) = flume::unbounded();
        session.clients.insert(
            ClientId::generate(),
            Arc::new(ClientConnection::new("127.0.0.1:9".parse().unwrap(), tx)),
        );

        session.shutdown().await;
        assert!(session.clients.is_empty());
        assert!(session.publisher.lock().await.is_none());

        session.shutdown().await;
        assert!(session.clients.is_empty());
        assert!(session.publisher.lock().await.is_none());
    }
}
