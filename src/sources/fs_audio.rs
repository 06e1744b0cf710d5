use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::fs::File;
use tracing::debug;

use super::{AudioByteSource, AudioStream};
use crate::common::errors::SyncError;
use crate::common::types::{SongId, SongRef};

/// Serves encoded audio straight from files on disk. The registry maps
/// song ids to paths; the library glue fills it at startup.
pub struct FsAudioSource {
    paths: DashMap<SongId, PathBuf>,
}

impl FsAudioSource {
    pub fn new() -> Self {
        Self {
            paths: DashMap::new(),
        }
    }

    pub fn register(&self, id: SongId, path: impl Into<PathBuf>) {
        self.paths.insert(id, path.into());
    }
}

impl Default for FsAudioSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl AudioByteSource for FsAudioSource {
    async fn open_for_read(&self, song: &SongRef) -> Result<AudioStream, SyncError> {
        let path = self
            .paths
            .get(&song.id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SyncError::NotFound(format!("song {} is not registered", song.id)))?;

        let file = File::open(&path)
            .await
            .map_err(|e| SyncError::NotFound(format!("cannot open {}: {e}", path.display())))?;
        let size_bytes = file
            .metadata()
            .await
            .map_err(|e| SyncError::NotFound(format!("cannot stat {}: {e}", path.display())))?
            .len();

        debug!("opened {} ({} bytes)", path.display(), size_bytes);
        Ok(AudioStream {
            size_bytes,
            reader: Box::new(file),
        })
    }
}
