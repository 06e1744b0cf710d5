use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::common::errors::SyncError;
use crate::common::types::{NowPlaying, SongRef};

pub mod fs_audio;
pub mod watch_state;

pub use fs_audio::FsAudioSource;
pub use watch_state::{StateFeed, WatchStateSource, state_channel};

/// Read-only view of the broadcaster's live playback state. The core only
/// samples it; it never writes back.
pub trait PlaybackStateSource: Send + Sync {
    /// A consistent snapshot of the currently selected song, or `None`
    /// when nothing is playing. Song identity and position are never
    /// observed half-updated.
    fn now_playing(&self) -> Option<NowPlaying>;
}

/// Byte access to the encoded audio of a song.
#[async_trait]
pub trait AudioByteSource: Send + Sync {
    /// Opens the song for reading from byte 0. Fails with
    /// [`SyncError::NotFound`] when the audio is not available yet;
    /// callers retry or answer "not found".
    async fn open_for_read(&self, song: &SongRef) -> Result<AudioStream, SyncError>;
}

/// An open audio stream plus its statically known size.
pub struct AudioStream {
    pub size_bytes: u64,
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
}
