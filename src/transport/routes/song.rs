use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{HeaderMap, StatusCode, header},
    response::{IntoResponse, Json, Response},
};
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, error};

use crate::common::WavelinkError;
use crate::server::AppState;

const PATH: &str = "/song";

/// GET /song: single download of whatever the broadcaster is currently
/// playing, honoring an open-ended `Range: bytes=N-` header so receivers
/// can seek. Bytes are copied until EOF; the receiver closes when done.
pub async fn download_song(headers: HeaderMap, State(state): State<Arc<AppState>>) -> Response {
    let Some(now_playing) = state.state_source.now_playing() else {
        return (
            StatusCode::NOT_FOUND,
            Json(WavelinkError::not_found("no song is currently playing", PATH)),
        )
            .into_response();
    };

    let stream = match state.audio_source.open_for_read(&now_playing.song).await {
        Ok(stream) => stream,
        Err(e) => {
            return (
                StatusCode::NOT_FOUND,
                Json(WavelinkError::not_found(e.to_string(), PATH)),
            )
                .into_response();
        }
    };
    let size = stream.size_bytes;
    let mut reader = stream.reader;

    // A range from byte 0 takes the same fast path as no range at all:
    // stream from the start, skip nothing.
    let start = headers
        .get(header::RANGE)
        .and_then(|h| h.to_str().ok())
        .and_then(parse_range_start)
        .filter(|start| *start > 0);

    if let Some(start) = start {
        if start >= size {
            return (
                StatusCode::RANGE_NOT_SATISFIABLE,
                Json(WavelinkError::range_not_satisfiable(
                    format!("range start {start} beyond file size {size}"),
                    PATH,
                )),
            )
                .into_response();
        }

        let mut skipped = reader.take(start);
        if let Err(e) = tokio::io::copy(&mut skipped, &mut tokio::io::sink()).await {
            error!("failed to skip to byte {start}: {e}");
            return (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(WavelinkError::internal(e.to_string(), PATH)),
            )
                .into_response();
        }
        let reader = skipped.into_inner();

        debug!("serving song {} from byte {start}", now_playing.song.id);
        return partial_content(start, size, reader);
    }

    debug!("serving song {} from the start", now_playing.song.id);
    full_body(size, reader)
}

fn full_body(size: u64, reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>) -> Response {
    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size)
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .unwrap_or_else(build_failure)
}

fn partial_content(
    start: u64,
    size: u64,
    reader: Box<dyn tokio::io::AsyncRead + Send + Unpin>,
) -> Response {
    Response::builder()
        .status(StatusCode::PARTIAL_CONTENT)
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, size - start)
        .header(header::CONTENT_RANGE, content_range(start, size))
        .header(header::ACCEPT_RANGES, "bytes")
        .body(Body::from_stream(ReaderStream::new(reader)))
        .unwrap_or_else(build_failure)
}

fn build_failure(e: axum::http::Error) -> Response {
    error!("failed to build song response: {e}");
    StatusCode::INTERNAL_SERVER_ERROR.into_response()
}

pub(crate) fn content_range(start: u64, size: u64) -> String {
    format!("bytes {}-{}/{}", start, size - 1, size)
}

/// Parses the starting byte of a `Range: bytes=N-` header. Receivers only
/// send the open-ended form; suffix and multi-range requests fall back to
/// a full-body response.
pub(crate) fn parse_range_start(value: &str) -> Option<u64> {
    let ranges = value.trim().strip_prefix("bytes=")?;
    let (start, _) = ranges.split_once('-')?;
    start.trim().parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{NowPlaying, SongId, SongRef};
    use crate::config::Config;
    use crate::sources::{FsAudioSource, state_channel};

    #[test]
    fn range_start_parsing() {
        assert_eq!(parse_range_start("bytes=5000-"), Some(5000));
        assert_eq!(parse_range_start("bytes=0-"), Some(0));
        assert_eq!(parse_range_start("bytes=100-200"), Some(100));
        assert_eq!(parse_range_start(" bytes=7-"), Some(7));
        assert_eq!(parse_range_start("bytes=-500"), None);
        assert_eq!(parse_range_start("bytes=abc-"), None);
        assert_eq!(parse_range_start("items=5-"), None);
    }

    #[test]
    fn content_range_covers_the_tail() {
        assert_eq!(content_range(5_000, 20_000), "bytes 5000-19999/20000");
    }

    fn state_serving(path: &std::path::Path, size: u64) -> Arc<AppState> {
        let song = SongRef {
            id: SongId(1),
            title: "test".to_string(),
            artist: "test".to_string(),
        };
        let audio = FsAudioSource::new();
        audio.register(SongId(1), path);
        let (_feed, source) = state_channel(Some(NowPlaying {
            song,
            position_ms: 0,
            duration_ms: size,
            is_playing: true,
        }));
        Arc::new(AppState::new(
            Config::default(),
            Arc::new(source),
            Arc::new(audio),
        ))
    }

    #[tokio::test]
    async fn nonzero_range_returns_partial_content_with_exact_tail() {
        let path = std::env::temp_dir().join(format!("wavelink-song-{}.bin", uuid::Uuid::new_v4()));
        let data: Vec<u8> = (0..20_000u32).map(|i| (i % 251) as u8).collect();
        std::fs::write(&path, &data).expect("write fixture");

        let state = state_serving(&path, 20_000);
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, "bytes=5000-".parse().unwrap());

        let response = download_song(headers, State(state)).await;
        assert_eq!(response.status(), StatusCode::PARTIAL_CONTENT);
        assert_eq!(
            response
                .headers()
                .get(header::CONTENT_RANGE)
                .and_then(|v| v.to_str().ok()),
            Some("bytes 5000-19999/20000")
        );

        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(body.len(), 15_000);
        assert_eq!(body[0], data[5_000]);
        assert_eq!(body[14_999], data[19_999]);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn zero_range_takes_the_full_body_fast_path() {
        let path = std::env::temp_dir().join(format!("wavelink-song-{}.bin", uuid::Uuid::new_v4()));
        std::fs::write(&path, vec![7u8; 1_000]).expect("write fixture");

        let state = state_serving(&path, 1_000);
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, "bytes=0-".parse().unwrap());

        let response = download_song(headers, State(state)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body");
        assert_eq!(body.len(), 1_000);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn range_beyond_file_size_is_rejected() {
        let path = std::env::temp_dir().join(format!("wavelink-song-{}.bin", uuid::Uuid::new_v4()));
        std::fs::write(&path, vec![0u8; 100]).expect("write fixture");

        let state = state_serving(&path, 100);
        let mut headers = HeaderMap::new();
        headers.insert(header::RANGE, "bytes=100-".parse().unwrap());

        let response = download_song(headers, State(state)).await;
        assert_eq!(response.status(), StatusCode::RANGE_NOT_SATISFIABLE);

        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn no_song_selected_is_not_found() {
        let (_feed, source) = state_channel(None);
        let state = Arc::new(AppState::new(
            Config::default(),
            Arc::new(source),
            Arc::new(FsAudioSource::new()),
        ));

        let response = download_song(HeaderMap::new(), State(state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
