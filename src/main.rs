use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};

use wavelink::common::types::{AnyResult, NowPlaying, SongId, SongRef, now_ms};
use wavelink::config::Config;
use wavelink::receiver::{SyncClient, TracePlayer};
use wavelink::server::Broadcaster;
use wavelink::sources::{FsAudioSource, StateFeed, state_channel};

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "ogg", "wav", "m4a", "aac", "opus", "webm"];

#[tokio::main]
async fn main() -> AnyResult<()> {
    let config = Config::load()?;
    init_tracing(&config);

    let mut args = std::env::args().skip(1);
    match args.next().as_deref() {
        Some("receive") => {
            let (Some(server), Some(token)) = (args.next(), args.next()) else {
                eprintln!("usage: wavelink receive <host:port> <token>");
                std::process::exit(2);
            };
            run_receiver(config, server, token).await
        }
        Some("broadcast") | None => run_broadcaster(config).await,
        Some(other) => {
            eprintln!("unknown command '{other}'; expected 'broadcast' or 'receive'");
            std::process::exit(2);
        }
    }
}

fn init_tracing(config: &Config) {
    let default_level = config
        .logging
        .level
        .clone()
        .unwrap_or_else(|| "info".to_string());
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
}

async fn run_broadcaster(config: Config) -> AnyResult<()> {
    let audio = Arc::new(FsAudioSource::new());
    let songs = scan_library(&config.library.dir, &audio)?;
    if songs.is_empty() {
        warn!("no audio files found under {}", config.library.dir);
    }

    let (feed, source) = state_channel(None);
    let broadcaster = Broadcaster::new(config, Arc::new(source), audio);

    match broadcaster.start().await? {
        Some(token) => info!("receivers join with token {token}"),
        None => warn!("broadcast did not start (already active)"),
    }

    // Simulated local playback so receivers have a live state to follow.
    // A real deployment feeds this channel from the actual player.
    let feed_task = tokio::spawn(drive_playback(feed, songs));

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    feed_task.abort();
    broadcaster.stop().await;
    Ok(())
}

async fn run_receiver(config: Config, server: String, token: String) -> AnyResult<()> {
    let player = Arc::new(TracePlayer::new());
    let client = SyncClient::new(server, token, player, config.sync);

    let cancel = client.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    client.run().await?;
    Ok(())
}

/// Registers every audio file under `dir` and returns the playable list.
fn scan_library(dir: &str, audio: &FsAudioSource) -> AnyResult<Vec<(SongRef, u64)>> {
    let mut paths: Vec<_> = match std::fs::read_dir(dir) {
        Ok(entries) => entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| AUDIO_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
            })
            .collect(),
        Err(e) => {
            warn!("cannot read library dir {dir}: {e}");
            return Ok(Vec::new());
        }
    };
    paths.sort();

    let mut songs = Vec::new();
    for (index, path) in paths.iter().enumerate() {
        let id = SongId(index as i64 + 1);
        let size = std::fs::metadata(path)?.len();
        // nominal 128 kbps estimate; real deployments get durations from
        // the player, this binary only needs something plausible
        let duration_ms = size / 16;

        audio.register(id, path);
        songs.push((
            SongRef {
                id,
                title: title_of(path),
                artist: "Unknown Artist".to_string(),
            },
            duration_ms,
        ));
        info!("library: song {id} {} ({size} bytes)", path.display());
    }
    Ok(songs)
}

fn title_of(path: &Path) -> String {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("Unknown")
        .to_string()
}

/// Advances through the library in real time, publishing the now-playing
/// state that the publisher samples.
async fn drive_playback(feed: StateFeed, songs: Vec<(SongRef, u64)>) {
    if songs.is_empty() {
        return;
    }
    let mut index = 0;
    loop {
        let (song, duration_ms) = &songs[index];
        info!("playing {} (song {})", song.title, song.id);
        let started = now_ms();
        loop {
            let position_ms = now_ms().saturating_sub(started);
            if position_ms >= *duration_ms {
                break;
            }
            feed.update(Some(NowPlaying {
                song: song.clone(),
                position_ms,
                duration_ms: *duration_ms,
                is_playing: true,
            }));
            tokio::time::sleep(Duration::from_millis(250)).await;
        }
        index = (index + 1) % songs.len();
    }
}
