use crate::protocol::PlaybackSnapshot;

/// Tuning for drift correction. The floor sits below the threshold and
/// both must pass before a seek, so the threshold dominates in practice;
/// they stay independently configurable.
#[derive(Debug, Clone, Copy)]
pub struct DriftConfig {
    pub drift_threshold_ms: u64,
    pub drift_floor_ms: u64,
    pub min_seek_interval_ms: u64,
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            drift_threshold_ms: 500,
            drift_floor_ms: 400,
            min_seek_interval_ms: 800,
        }
    }
}

/// What the streaming loop should do with the local player for one
/// snapshot.
#[derive(Debug, Default, PartialEq)]
pub struct SyncPlan {
    /// The song changed; tear down and reattach the audio stream before
    /// anything else.
    pub reconnect_stream: bool,
    /// Corrective seek target, when drift warrants one.
    pub seek_to_ms: Option<u64>,
    /// Play/pause toggle, when the broadcaster and player disagree.
    pub set_playing: Option<bool>,
    /// Raw broadcaster position, fed to the player's buffering catch-up
    /// hint on every snapshot.
    pub catch_up_hint_ms: u64,
}

/// Per-connection drift state. Single-writer: only the snapshot loop
/// mutates it, so no locking is needed.
pub struct DriftCorrector {
    config: DriftConfig,
    clock_offset_ms: i64,
    last_song_id: Option<i64>,
    last_applied_position_ms: u64,
    last_seek_at_ms: Option<u64>,
}

impl DriftCorrector {
    pub fn new(config: DriftConfig) -> Self {
        Self {
            config,
            clock_offset_ms: 0,
            last_song_id: None,
            last_applied_position_ms: 0,
            last_seek_at_ms: None,
        }
    }

    /// Fixes the clock offset for this connection's lifetime. Computed
    /// once from the calibration handshake.
    pub fn set_clock_offset(&mut self, offset_ms: i64) {
        self.clock_offset_ms = offset_ms;
    }

    pub fn clock_offset(&self) -> i64 {
        self.clock_offset_ms
    }

    /// The broadcaster's position predicted at local time `now_ms`. While
    /// playing, the snapshot position advances by the time elapsed since
    /// it was stamped (in broadcaster clock terms); paused snapshots do
    /// not advance.
    pub fn predicted_position(&self, snapshot: &PlaybackSnapshot, now_ms: u64) -> u64 {
        if !snapshot.is_playing {
            return snapshot.position_ms;
        }
        let server_now = now_ms as i64 + self.clock_offset_ms;
        let elapsed = (server_now - snapshot.server_timestamp_ms as i64).max(0) as u64;
        let predicted = snapshot.position_ms + elapsed;
        if snapshot.duration_ms > 0 {
            predicted.min(snapshot.duration_ms)
        } else {
            predicted
        }
    }

    /// Evaluates one snapshot against the local player's observed state
    /// and returns the actions to take. Mutates the debounce/song state.
    pub fn evaluate(
        &mut self,
        snapshot: &PlaybackSnapshot,
        now_ms: u64,
        player_position_ms: u64,
        player_is_playing: bool,
    ) -> SyncPlan {
        let mut plan = SyncPlan {
            catch_up_hint_ms: snapshot.position_ms,
            ..SyncPlan::default()
        };

        if self.last_song_id != Some(snapshot.song_id) {
            plan.reconnect_stream = true;
            self.last_song_id = Some(snapshot.song_id);
            self.last_applied_position_ms = 0;
            self.last_seek_at_ms = None;
        }

        let predicted = self.predicted_position(snapshot, now_ms);
        let drift = predicted.abs_diff(player_position_ms);
        let debounce_elapsed = self
            .last_seek_at_ms
            .is_none_or(|at| now_ms.saturating_sub(at) >= self.config.min_seek_interval_ms);

        if drift > self.config.drift_threshold_ms
            && debounce_elapsed
            && drift > self.config.drift_floor_ms
        {
            plan.seek_to_ms = Some(predicted);
            self.last_seek_at_ms = Some(now_ms);
            self.last_applied_position_ms = predicted;
        }

        if snapshot.is_playing != player_is_playing {
            plan.set_playing = Some(snapshot.is_playing);
        }

        plan
    }

    /// Clears all per-connection state so the next connection starts
    /// clean.
    pub fn reset(&mut self) {
        self.clock_offset_ms = 0;
        self.last_song_id = None;
        self.last_applied_position_ms = 0;
        self.last_seek_at_ms = None;
    }
}
