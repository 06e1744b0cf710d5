use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Body,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tracing::{debug, error, warn};

use crate::server::AppState;

const CHUNK_BYTES: usize = 16 * 1024;
const IDLE_WAIT_MS: u64 = 500;

/// GET /stream: continuous relay of the broadcaster's audio. Follows the
/// currently selected song: when it changes mid-file the old read is
/// abandoned and the new song starts from byte 0. Runs until the receiver
/// disconnects.
pub async fn relay_stream(State(state): State<Arc<AppState>>) -> Response {
    let (tx, rx) = flume::bounded::<Result<Bytes, std::io::Error>>(8);
    tokio::spawn(relay_loop(state, tx));

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(rx.into_stream()))
        .unwrap_or_else(|e| {
            error!("failed to build relay response: {e}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        })
}

async fn relay_loop(state: Arc<AppState>, tx: flume::Sender<Result<Bytes, std::io::Error>>) {
    'next_song: loop {
        if tx.is_disconnected() {
            return;
        }

        let Some(now_playing) = state.state_source.now_playing() else {
            tokio::time::sleep(Duration::from_millis(IDLE_WAIT_MS)).await;
            continue;
        };
        let song = now_playing.song;

        let mut stream = match state.audio_source.open_for_read(&song).await {
            Ok(stream) => stream,
            Err(e) => {
                // not available yet; wait and retry instead of hanging up
                debug!("relay: {e}");
                tokio::time::sleep(Duration::from_millis(IDLE_WAIT_MS)).await;
                continue;
            }
        };
        debug!("relay: streaming song {} ({} bytes)", song.id, stream.size_bytes);

        let mut buf = vec![0u8; CHUNK_BYTES];
        loop {
            let current = state.state_source.now_playing().map(|np| np.song.id);
            if current != Some(song.id) {
                debug!("relay: song changed, switching");
                continue 'next_song;
            }

            match stream.reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    if tx
                        .send_async(Ok(Bytes::copy_from_slice(&buf[..n])))
                        .await
                        .is_err()
                    {
                        debug!("relay: receiver disconnected");
                        return;
                    }
                }
                Err(e) => {
                    warn!("relay: read error on song {}: {e}", song.id);
                    let _ = tx.send_async(Err(e)).await;
                    return;
                }
            }
        }

        // EOF with the song unchanged: idle until the broadcaster moves on
        loop {
            if tx.is_disconnected() {
                return;
            }
            match state.state_source.now_playing() {
                Some(current) if current.song.id == song.id => {
                    tokio::time::sleep(Duration::from_millis(IDLE_WAIT_MS)).await;
                }
                _ => continue 'next_song,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{NowPlaying, SongId, SongRef};
    use crate::config::Config;
    use crate::sources::{FsAudioSource, StateFeed, state_channel};

    fn playing(id: i64) -> NowPlaying {
        NowPlaying {
            song: SongRef {
                id: SongId(id),
                title: format!("song {id}"),
                artist: "test".to_string(),
            },
            position_ms: 0,
            duration_ms: 60_000,
            is_playing: true,
        }
    }

    fn fixture(bytes: &[u8]) -> std::path::PathBuf {
        let path = std::env::temp_dir().join(format!("wavelink-relay-{}.bin", uuid::Uuid::new_v4()));
        std::fs::write(&path, bytes).expect("write fixture");
        path
    }

    async fn recv_bytes(rx: &flume::Receiver<Result<Bytes, std::io::Error>>, want: usize) -> Vec<u8> {
        let mut got = Vec::new();
        while got.len() < want {
            let chunk = tokio::time::timeout(Duration::from_secs(5), rx.recv_async())
                .await
                .expect("relay produced data in time")
                .expect("relay channel open")
                .expect("relay chunk ok");
            got.extend_from_slice(&chunk);
        }
        got
    }

    fn relay_state(
        audio: Arc<FsAudioSource>,
        initial: Option<NowPlaying>,
    ) -> (Arc<AppState>, StateFeed) {
        let (feed, source) = state_channel(initial);
        let state = Arc::new(AppState::new(Config::default(), Arc::new(source), audio));
        (state, feed)
    }

    #[tokio::test]
    async fn relay_streams_current_song_and_follows_changes() {
        let first = fixture(&[1u8; 3000]);
        let second = fixture(&[2u8; 3000]);
        let audio = Arc::new(FsAudioSource::new());
        audio.register(SongId(1), &first);
        audio.register(SongId(2), &second);

        let (state, feed) = relay_state(audio, Some(playing(1)));
        let (tx, rx) = flume::bounded(8);
        let task = tokio::spawn(relay_loop(state, tx));

        let bytes = recv_bytes(&rx, 3000).await;
        assert!(bytes.iter().all(|b| *b == 1));

        // song change: the relay must start sending the new file
        feed.update(Some(playing(2)));
        let bytes = recv_bytes(&rx, 3000).await;
        assert!(bytes.contains(&2));

        drop(rx);
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        let _ = std::fs::remove_file(&first);
        let _ = std::fs::remove_file(&second);
    }

    #[tokio::test]
    async fn relay_waits_out_unavailable_audio_instead_of_hanging_up() {
        let audio = Arc::new(FsAudioSource::new());
        // song 5 reported as playing but not registered yet
        let (state, _feed) = relay_state(audio.clone(), Some(playing(5)));

        let (tx, rx) = flume::bounded(8);
        let task = tokio::spawn(relay_loop(state, tx));

        // nothing arrives while the source is unavailable, but the channel
        // stays open
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rx.is_empty());

        // audio becomes available; the same request starts streaming
        let path = fixture(&[9u8; 1000]);
        audio.register(SongId(5), &path);

        let bytes = recv_bytes(&rx, 1000).await;
        assert!(bytes.iter().all(|b| *b == 9));

        drop(rx);
        let _ = tokio::time::timeout(Duration::from_secs(5), task).await;
        let _ = std::fs::remove_file(&path);
    }
}
