use std::sync::atomic::{AtomicBool, AtomicU64, Ordering::Relaxed};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::common::types::now_ms;

/// Control surface of the receiver-side local player. The sync client
/// drives it; implementations wrap whatever actually plays audio.
#[async_trait]
pub trait LocalPlayerControl: Send + Sync {
    async fn position_ms(&self) -> u64;
    async fn is_playing(&self) -> bool;
    async fn seek(&self, position_ms: u64);
    async fn play(&self);
    async fn pause(&self);
    /// Attach the player to the broadcaster's audio URL.
    async fn connect_stream(&self, url: &str);
    /// Detach and stop receiver-mode playback.
    async fn disconnect_stream(&self);
    /// Position the player should jump to once a network-induced
    /// re-buffer completes.
    async fn hint_catch_up_target(&self, position_ms: u64);
}

/// Logs every command and models position with a simple clock so the sync
/// loop behaves sensibly against it. Stands in for a real player in the
/// CLI receiver.
pub struct TracePlayer {
    base_ms: AtomicU64,
    set_at_ms: AtomicU64,
    playing: AtomicBool,
}

impl TracePlayer {
    pub fn new() -> Self {
        Self {
            base_ms: AtomicU64::new(0),
            set_at_ms: AtomicU64::new(now_ms()),
            playing: AtomicBool::new(false),
        }
    }

    fn current(&self) -> u64 {
        let base = self.base_ms.load(Relaxed);
        if self.playing.load(Relaxed) {
            base + now_ms().saturating_sub(self.set_at_ms.load(Relaxed))
        } else {
            base
        }
    }

    fn set_position(&self, position_ms: u64) {
        self.base_ms.store(position_ms, Relaxed);
        self.set_at_ms.store(now_ms(), Relaxed);
    }
}

impl Default for TracePlayer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LocalPlayerControl for TracePlayer {
    async fn position_ms(&self) -> u64 {
        self.current()
    }

    async fn is_playing(&self) -> bool {
        self.playing.load(Relaxed)
    }

    async fn seek(&self, position_ms: u64) {
        info!("player: seek to {position_ms}ms");
        self.set_position(position_ms);
    }

    async fn play(&self) {
        info!("player: play");
        self.set_position(self.current());
        self.playing.store(true, Relaxed);
    }

    async fn pause(&self) {
        info!("player: pause");
        self.set_position(self.current());
        self.playing.store(false, Relaxed);
    }

    async fn connect_stream(&self, url: &str) {
        info!("player: connect {url}");
        self.set_position(0);
    }

    async fn disconnect_stream(&self) {
        info!("player: disconnect stream");
        self.set_position(0);
        self.playing.store(false, Relaxed);
    }

    async fn hint_catch_up_target(&self, position_ms: u64) {
        debug!("player: catch-up target {position_ms}ms");
    }
}
