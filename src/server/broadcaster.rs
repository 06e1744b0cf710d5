use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::common::types::{AnyResult, SessionToken};
use crate::config::Config;
use crate::server::{AppState, BroadcastSession};
use crate::sources::{AudioByteSource, PlaybackStateSource};
use crate::transport;

/// Timeout allowed for the serve task to drain on stop.
const SERVE_SHUTDOWN_MS: u64 = 3_000;

struct ServeHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the broadcast endpoint set and the at-most-one active session.
pub struct Broadcaster {
    state: Arc<AppState>,
    serve: Mutex<Option<ServeHandle>>,
}

impl Broadcaster {
    pub fn new(
        config: Config,
        state_source: Arc<dyn PlaybackStateSource>,
        audio_source: Arc<dyn AudioByteSource>,
    ) -> Self {
        Self {
            state: Arc::new(AppState::new(config, state_source, audio_source)),
            serve: Mutex::new(None),
        }
    }

    pub fn state(&self) -> Arc<AppState> {
        self.state.clone()
    }

    /// Starts broadcasting and returns the session token. Returns `None`
    /// without erroring when a session is already active, or when the port
    /// is already bound; both are warned and otherwise no-ops.
    pub async fn start(&self) -> AnyResult<Option<SessionToken>> {
        let mut serve = self.serve.lock().await;
        if serve.is_some() {
            warn!("broadcast already active; ignoring start");
            return Ok(None);
        }

        let addr: SocketAddr = format!(
            "{}:{}",
            self.state.config.server.host, self.state.config.server.port
        )
        .parse()?;
        let listener = match TcpListener::bind(addr).await {
            Ok(listener) => listener,
            Err(e) if e.kind() == std::io::ErrorKind::AddrInUse => {
                warn!("port {} already bound; assuming a broadcast is active", addr.port());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let local_addr = listener.local_addr()?;

        let session = Arc::new(BroadcastSession::new());
        let token = session.token.clone();
        *self.state.session.write().await = Some(session);

        let cancel = CancellationToken::new();
        let app = transport::http_server::router(self.state.clone());
        let shutdown = cancel.clone().cancelled_owned();
        let task = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(shutdown)
            .await;
            if let Err(e) = result {
                error!("broadcast server error: {e}");
            }
        });
        *serve = Some(ServeHandle { cancel, task });

        info!("broadcasting on {local_addr} (token {token})");
        Ok(Some(token))
    }

    /// Stops broadcasting: cancels the publish task, drops every client
    /// connection and shuts the listener down. Safe to call repeatedly.
    pub async fn stop(&self) {
        let handle = self.serve.lock().await.take();
        let Some(ServeHandle { cancel, mut task }) = handle else {
            return;
        };
        cancel.cancel();

        if let Some(session) = self.state.session.write().await.take() {
            session.shutdown().await;
        }

        if tokio::time::timeout(Duration::from_millis(SERVE_SHUTDOWN_MS), &mut task)
            .await
            .is_err()
        {
            warn!("serve task did not stop in time; aborting");
            task.abort();
        }
        info!("broadcast stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::{FsAudioSource, state_channel};

    fn local_broadcaster() -> Broadcaster {
        let mut config = Config::default();
        config.server.host = "127.0.0.1".to_string();
        config.server.port = 0;
        let (_feed, source) = state_channel(None);
        Broadcaster::new(config, Arc::new(source), Arc::new(FsAudioSource::new()))
    }

    #[tokio::test]
    async fn start_while_active_is_a_conflict_noop() {
        let broadcaster = local_broadcaster();
        let token = broadcaster.start().await.expect("first start");
        assert!(token.is_some());

        let second = broadcaster.start().await.expect("second start");
        assert!(second.is_none());

        broadcaster.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let broadcaster = local_broadcaster();
        broadcaster.start().await.expect("start");

        broadcaster.stop().await;
        assert!(broadcaster.state.session.read().await.is_none());

        broadcaster.stop().await;
        assert!(broadcaster.state.session.read().await.is_none());
    }

    #[tokio::test]
    async fn stop_without_start_is_a_noop() {
        let broadcaster = local_broadcaster();
        broadcaster.stop().await;
        assert!(broadcaster.state.session.read().await.is_none());
    }
}
