use tokio::sync::watch;

use super::PlaybackStateSource;
use crate::common::types::NowPlaying;

/// Creates the handoff between the audio subsystem and the sync core: the
/// subsystem keeps the [`StateFeed`] and publishes into it; the core reads
/// through the returned [`WatchStateSource`]. No callback registration is
/// required before state changes start flowing.
pub fn state_channel(initial: Option<NowPlaying>) -> (StateFeed, WatchStateSource) {
    let (tx, rx) = watch::channel(initial);
    (StateFeed { tx }, WatchStateSource { rx })
}

/// Writer half, owned by whatever drives local playback.
pub struct StateFeed {
    tx: watch::Sender<Option<NowPlaying>>,
}

impl StateFeed {
    /// Replaces the current playback state. `None` means no song selected.
    pub fn update(&self, state: Option<NowPlaying>) {
        self.tx.send_replace(state);
    }
}

/// Reader half handed to the broadcast session.
pub struct WatchStateSource {
    rx: watch::Receiver<Option<NowPlaying>>,
}

impl PlaybackStateSource for WatchStateSource {
    fn now_playing(&self) -> Option<NowPlaying> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::types::{SongId, SongRef};

    fn playing(id: i64, position_ms: u64) -> NowPlaying {
        NowPlaying {
            song: SongRef {
                id: SongId(id),
                title: format!("Track {id}"),
                artist: "Tester".to_string(),
            },
            position_ms,
            duration_ms: 180_000,
            is_playing: true,
        }
    }

    #[test]
    fn reader_sees_latest_write_as_one_value() {
        let (feed, source) = state_channel(None);
        assert_eq!(source.now_playing(), None);

        feed.update(Some(playing(1, 500)));
        assert_eq!(source.now_playing(), Some(playing(1, 500)));

        feed.update(Some(playing(2, 0)));
        let observed = source.now_playing().expect("state present");
        assert_eq!(observed.song.id, SongId(2));
        assert_eq!(observed.position_ms, 0);
    }
}
