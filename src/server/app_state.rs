use std::sync::Arc;

use tokio::sync::RwLock;

use crate::config::Config;
use crate::server::session::BroadcastSession;
use crate::sources::{AudioByteSource, PlaybackStateSource};

/// Top-level application state handed to every route handler. The session
/// slot is the single owner of "is a broadcast active"; no module-level
/// globals exist.
pub struct AppState {
    pub config: Config,
    pub session: RwLock<Option<Arc<BroadcastSession>>>,
    pub state_source: Arc<dyn PlaybackStateSource>,
    pub audio_source: Arc<dyn AudioByteSource>,
}

impl AppState {
    pub fn new(
        config: Config,
        state_source: Arc<dyn PlaybackStateSource>,
        audio_source: Arc<dyn AudioByteSource>,
    ) -> Self {
        Self {
            config,
            session: RwLock::new(None),
            state_source,
            audio_source,
        }
    }

    pub async fn active_session(&self) -> Option<Arc<BroadcastSession>> {
        self.session.read().await.clone()
    }
}
