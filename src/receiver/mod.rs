use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio_tungstenite::{connect_async, tungstenite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::common::errors::SyncError;
use crate::common::types::now_ms;
use crate::config::SyncConfig;
use crate::protocol::{ClockSyncReply, ClockSyncRequest, PlaybackSnapshot};

pub mod backoff;
pub mod drift;
pub mod player;

pub use drift::{DriftConfig, DriftCorrector, SyncPlan};
pub use player::{LocalPlayerControl, TracePlayer};

use self::backoff::Backoff;

/// Time allowed for the broadcaster's clock reply before the receiver
/// proceeds uncalibrated.
const HANDSHAKE_TIMEOUT_MS: u64 = 5_000;

/// Outcome of one WS session; tells the outer loop what to do next.
enum SessionOutcome {
    /// Caller-initiated disconnect; stop entirely.
    Shutdown,
    /// Connection-level failure; retry with backoff.
    Reconnect(String),
}

/// Receiver-side sync client: connects to a broadcaster's /sync channel,
/// calibrates the clock once, and keeps the local player in lockstep with
/// the snapshot stream. One instance covers one logical connection; create
/// a fresh one after [`SyncClient::disconnect`].
pub struct SyncClient {
    server: String,
    token: String,
    player: Arc<dyn LocalPlayerControl>,
    config: SyncConfig,
    cancel: CancellationToken,
}

impl SyncClient {
    /// `server` is the broadcaster's `host:port`.
    pub fn new(
        server: impl Into<String>,
        token: impl Into<String>,
        player: Arc<dyn LocalPlayerControl>,
        config: SyncConfig,
    ) -> Self {
        Self {
            server: server.into(),
            token: token.into(),
            player,
            config,
            cancel: CancellationToken::new(),
        }
    }

    /// Handle for caller-initiated disconnects; cancelling it stops the
    /// run loop, releases the socket and stops receiver playback.
    pub fn cancel_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn disconnect(&self) {
        self.cancel.cancel();
    }

    /// Runs until disconnected or the retry budget is exhausted. Transient
    /// drops are retried with exponential backoff and are invisible to the
    /// caller; only an exhausted budget (or a rejected token) surfaces as
    /// an error.
    pub async fn run(&self) -> Result<(), SyncError> {
        let mut backoff = Backoff::new(
            self.config.backoff_base_ms,
            self.config.backoff_cap_ms,
            self.config.max_reconnect_attempts,
        );

        loop {
            if self.cancel.is_cancelled() {
                self.teardown().await;
                return Ok(());
            }

            let failure = match self.connect_once(&mut backoff).await {
                Ok(SessionOutcome::Shutdown) => {
                    self.teardown().await;
                    return Ok(());
                }
                Ok(SessionOutcome::Reconnect(reason)) => reason,
                Err(SyncError::Auth(reason)) => {
                    // retrying a rejected token cannot help
                    error!("[{}] {reason}", self.server);
                    self.teardown().await;
                    return Err(SyncError::Auth(reason));
                }
                Err(e) => e.to_string(),
            };

            let delay = backoff.next();
            if backoff.is_exhausted() {
                error!(
                    "[{}] giving up after {} attempts: {failure}",
                    self.server,
                    backoff.attempts()
                );
                self.teardown().await;
                return Err(SyncError::Connectivity {
                    attempts: backoff.attempts(),
                    reason: failure,
                });
            }

            warn!("[{}] connection lost: {failure}; retrying in {delay:?}", self.server);
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    self.teardown().await;
                    return Ok(());
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn connect_once(&self, backoff: &mut Backoff) -> Result<SessionOutcome, SyncError> {
        let url = format!(
            "ws://{}/sync?token={}",
            self.server,
            urlencoding::encode(&self.token)
        );
        debug!("[{}] connecting to {url}", self.server);

        let (ws_stream, _) = match connect_async(url.as_str()).await {
            Ok(ok) => ok,
            Err(tungstenite::Error::Http(response))
                if matches!(response.status().as_u16(), 401 | 403) =>
            {
                return Err(SyncError::Auth(format!(
                    "broadcaster rejected the token ({})",
                    response.status()
                )));
            }
            Err(e) => return Err(SyncError::Transport(e.to_string())),
        };
        let (mut write, mut read) = ws_stream.split();

        // --- Calibrating ---
        let client_time = now_ms() as i64;
        let request = serde_json::to_string(&ClockSyncRequest { client_time })
            .map_err(|e| SyncError::Protocol(e.to_string()))?;
        write
            .send(tungstenite::Message::Text(request.into()))
            .await
            .map_err(|e| SyncError::Transport(e.to_string()))?;

        let offset = match tokio::time::timeout(
            Duration::from_millis(HANDSHAKE_TIMEOUT_MS),
            read.next(),
        )
        .await
        {
            Ok(Some(Ok(tungstenite::Message::Text(text)))) => {
                match serde_json::from_str::<ClockSyncReply>(text.as_str()) {
                    Ok(reply) => reply.server_time - client_time,
                    Err(e) => {
                        warn!("[{}] malformed clock reply ({e}); assuming zero offset", self.server);
                        0
                    }
                }
            }
            Ok(Some(Ok(_))) => {
                warn!("[{}] unexpected calibration frame; assuming zero offset", self.server);
                0
            }
            Ok(Some(Err(e))) => return Err(SyncError::Transport(e.to_string())),
            Ok(None) => {
                return Ok(SessionOutcome::Reconnect(
                    "stream ended during calibration".to_string(),
                ));
            }
            Err(_) => {
                warn!("[{}] no clock reply; assuming zero offset", self.server);
                0
            }
        };

        let mut corrector = DriftCorrector::new(DriftConfig {
            drift_threshold_ms: self.config.drift_threshold_ms,
            drift_floor_ms: self.config.drift_floor_ms,
            min_seek_interval_ms: self.config.min_seek_interval_ms,
        });
        corrector.set_clock_offset(offset);
        backoff.reset();
        info!("[{}] connected, clock offset {offset}ms", self.server);

        // --- Streaming ---
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    let _ = write.send(tungstenite::Message::Close(None)).await;
                    return Ok(SessionOutcome::Shutdown);
                }
                incoming = read.next() => {
                    let msg = match incoming {
                        Some(Ok(msg)) => msg,
                        Some(Err(e)) => {
                            return Ok(SessionOutcome::Reconnect(format!("read error: {e}")));
                        }
                        None => return Ok(SessionOutcome::Reconnect("stream ended".to_string())),
                    };

                    match msg {
                        tungstenite::Message::Text(text) => {
                            match parse_snapshot(text.as_str()) {
                                Ok(snapshot) => self.apply(&mut corrector, &snapshot).await,
                                // a single bad frame is dropped, never fatal
                                Err(e) => warn!("[{}] {e}", self.server),
                            }
                        }
                        tungstenite::Message::Close(frame) => {
                            info!("[{}] broadcaster closed: {frame:?}", self.server);
                            return Ok(SessionOutcome::Reconnect("broadcaster closed".to_string()));
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    /// Applies one snapshot to the local player, in arrival order.
    async fn apply(&self, corrector: &mut DriftCorrector, snapshot: &PlaybackSnapshot) {
        let now = now_ms();
        let player_position = self.player.position_ms().await;
        let player_playing = self.player.is_playing().await;
        let plan = corrector.evaluate(snapshot, now, player_position, player_playing);

        if plan.reconnect_stream {
            info!(
                "[{}] now playing {} - {} (song {}); reattaching audio",
                self.server, snapshot.artist, snapshot.title, snapshot.song_id
            );
            self.player.disconnect_stream().await;
            tokio::time::sleep(Duration::from_millis(self.config.stream_settle_ms)).await;
            self.player.connect_stream(&self.song_url()).await;
        }

        if let Some(target) = plan.seek_to_ms {
            debug!(
                "[{}] drift correction: {player_position}ms to {target}ms",
                self.server
            );
            self.player.seek(target).await;
        }

        match plan.set_playing {
            Some(true) => self.player.play().await,
            Some(false) => self.player.pause().await,
            None => {}
        }

        self.player.hint_catch_up_target(plan.catch_up_hint_ms).await;
    }

    async fn teardown(&self) {
        self.player.pause().await;
        self.player.disconnect_stream().await;
    }

    fn song_url(&self) -> String {
        format!(
            "http://{}/song?token={}",
            self.server,
            urlencoding::encode(&self.token)
        )
    }
}

fn parse_snapshot(text: &str) -> Result<PlaybackSnapshot, SyncError> {
    serde_json::from_str(text).map_err(|e| SyncError::Protocol(format!("bad snapshot: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_snapshots_are_protocol_errors() {
        assert!(parse_snapshot("not json").is_err());
        assert!(parse_snapshot(r#"{"songId": "wrong type"}"#).is_err());

        let valid = r#"{
            "songId": 1,
            "title": "t",
            "artist": "a",
            "positionMs": 10000,
            "durationMs": 200000,
            "isPlaying": true,
            "serverTimestampMs": 1700000000000
        }"#;
        let snapshot = parse_snapshot(valid).expect("valid snapshot");
        assert_eq!(snapshot.song_id, 1);
        assert_eq!(snapshot.position_ms, 10_000);
    }

    #[tokio::test]
    async fn run_surfaces_a_terminal_error_after_the_retry_budget() {
        let mut config = SyncConfig::default();
        config.backoff_base_ms = 1;
        config.backoff_cap_ms = 2;
        config.max_reconnect_attempts = 3;

        // nothing listens on port 1; every connect is refused immediately
        let client = SyncClient::new("127.0.0.1:1", "t0k3n", Arc::new(TracePlayer::new()), config);

        let result = tokio::time::timeout(Duration::from_secs(10), client.run())
            .await
            .expect("run returned before the timeout");
        match result {
            Err(SyncError::Connectivity { attempts, .. }) => assert_eq!(attempts, 3),
            other => panic!("expected a terminal connectivity error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn disconnect_stops_the_run_loop_cleanly() {
        let mut config = SyncConfig::default();
        config.backoff_base_ms = 50;
        config.backoff_cap_ms = 50;
        config.max_reconnect_attempts = 1_000;

        let client = Arc::new(SyncClient::new(
            "127.0.0.1:1",
            "t0k3n",
            Arc::new(TracePlayer::new()),
            config,
        ));
        let handle = client.cancel_handle();
        let run = tokio::spawn({
            let client = client.clone();
            async move { client.run().await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.cancel();

        let result = tokio::time::timeout(Duration::from_secs(5), run)
            .await
            .expect("run stopped after disconnect")
            .expect("task joined");
        assert!(result.is_ok());
    }

    #[test]
    fn song_url_embeds_the_encoded_token() {
        let client = SyncClient::new(
            "192.168.43.1:8765",
            "a b+c",
            Arc::new(TracePlayer::new()),
            SyncConfig::default(),
        );
        assert_eq!(
            client.song_url(),
            "http://192.168.43.1:8765/song?token=a%20b%2Bc"
        );
    }
}
