use serde::{Deserialize, Serialize};

use crate::common::types::AnyResult;

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub library: LibraryConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Tuning for the publish loop and the receiver-side drift correction.
#[derive(Debug, Deserialize, Serialize, Clone, Copy)]
pub struct SyncConfig {
    /// Snapshot cadence. The loop sleeps this long between ticks (~10 Hz).
    #[serde(default = "default_publish_interval_ms")]
    pub publish_interval_ms: u64,
    /// Drift beyond which a corrective seek is considered.
    #[serde(default = "default_drift_threshold_ms")]
    pub drift_threshold_ms: u64,
    /// Second guard rail below the threshold; both must pass, so in
    /// practice the larger value dominates.
    #[serde(default = "default_drift_floor_ms")]
    pub drift_floor_ms: u64,
    /// Minimum time between two corrective seeks.
    #[serde(default = "default_min_seek_interval_ms")]
    pub min_seek_interval_ms: u64,
    /// Consecutive connection failures tolerated before giving up.
    #[serde(default = "default_max_reconnect_attempts")]
    pub max_reconnect_attempts: u32,
    /// First reconnect delay; doubles per attempt.
    #[serde(default = "default_backoff_base_ms")]
    pub backoff_base_ms: u64,
    /// Upper bound on the reconnect delay.
    #[serde(default = "default_backoff_cap_ms")]
    pub backoff_cap_ms: u64,
    /// Pause between tearing down and reattaching the audio stream on a
    /// song change.
    #[serde(default = "default_stream_settle_ms")]
    pub stream_settle_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            publish_interval_ms: default_publish_interval_ms(),
            drift_threshold_ms: default_drift_threshold_ms(),
            drift_floor_ms: default_drift_floor_ms(),
            min_seek_interval_ms: default_min_seek_interval_ms(),
            max_reconnect_attempts: default_max_reconnect_attempts(),
            backoff_base_ms: default_backoff_base_ms(),
            backoff_cap_ms: default_backoff_cap_ms(),
            stream_settle_ms: default_stream_settle_ms(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LibraryConfig {
    /// Directory the broadcaster binary scans for audio files.
    #[serde(default = "default_library_dir")]
    pub dir: String,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            dir: default_library_dir(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8765
}

fn default_publish_interval_ms() -> u64 {
    100
}

fn default_drift_threshold_ms() -> u64 {
    500
}

fn default_drift_floor_ms() -> u64 {
    400
}

fn default_min_seek_interval_ms() -> u64 {
    800
}

fn default_max_reconnect_attempts() -> u32 {
    3
}

fn default_backoff_base_ms() -> u64 {
    1_000
}

fn default_backoff_cap_ms() -> u64 {
    10_000
}

fn default_stream_settle_ms() -> u64 {
    300
}

fn default_library_dir() -> String {
    "./music".to_string()
}

impl Config {
    /// Loads `config.toml` from the working directory. A missing file is
    /// not an error; the defaults make the binary runnable with no setup.
    pub fn load() -> AnyResult<Self> {
        Self::load_from("config.toml")
    }

    pub fn load_from(path: &str) -> AnyResult<Self> {
        let config_str = std::fs::read_to_string(path).unwrap_or_default();
        if config_str.is_empty() {
            return Ok(Self::default());
        }
        let config: Config = toml::from_str(&config_str)?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_protocol_constants() {
        let config = Config::default();
        assert_eq!(config.sync.publish_interval_ms, 100);
        assert_eq!(config.sync.drift_threshold_ms, 500);
        assert_eq!(config.sync.drift_floor_ms, 400);
        assert_eq!(config.sync.min_seek_interval_ms, 800);
        assert_eq!(config.sync.max_reconnect_attempts, 3);
        assert_eq!(config.sync.backoff_base_ms, 1_000);
        assert_eq!(config.sync.backoff_cap_ms, 10_000);
        assert_eq!(config.server.port, 8765);
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config = Config::load_from("/nonexistent/wavelink-config.toml").expect("defaults");
        assert_eq!(config.sync.publish_interval_ms, 100);
        assert_eq!(config.server.host, "0.0.0.0");
    }

    #[test]
    fn partial_file_overrides_only_named_fields() {
        let config: Config = toml::from_str(
            r#"
            [server]
            port = 9000

            [sync]
            drift_threshold_ms = 750
            "#,
        )
        .expect("valid toml");

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.sync.drift_threshold_ms, 750);
        assert_eq!(config.sync.min_seek_interval_ms, 800);
    }
}
