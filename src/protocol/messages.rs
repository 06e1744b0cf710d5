use serde::{Deserialize, Serialize};

use crate::common::types::NowPlaying;

/// One timestamped reading of the broadcaster's playback state, pushed to
/// every sync client each publish tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub song_id: i64,
    pub title: String,
    pub artist: String,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
    /// Broadcaster wall clock at snapshot creation. Anchor for all
    /// receiver-side position prediction.
    pub server_timestamp_ms: u64,
}

impl PlaybackSnapshot {
    pub fn from_now_playing(np: &NowPlaying, stamped_at_ms: u64) -> Self {
        Self {
            song_id: np.song.id.0,
            title: np.song.title.clone(),
            artist: np.song.artist.clone(),
            position_ms: np.position_ms,
            duration_ms: np.duration_ms,
            is_playing: np.is_playing,
            server_timestamp_ms: stamped_at_ms,
        }
    }
}

/// First frame a receiver sends on /sync.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSyncRequest {
    pub client_time: i64,
}

/// The broadcaster's reply, stamped on receipt. The receiver derives its
/// clock offset as `server_time - client_time`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSyncReply {
    pub server_time: i64,
}
