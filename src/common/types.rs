use rand::{Rng, distributions::Alphanumeric};
use std::sync::Arc;

use tokio::sync::Mutex;

/// A thread-safe, mutually exclusive shared component.
pub type Shared<T> = Arc<Mutex<T>>;

/// A generic boxed error type.
pub type AnyError = Box<dyn std::error::Error + Send + Sync>;

/// A convenient Result alias returning `AnyError`.
pub type AnyResult<T> = std::result::Result<T, AnyError>;

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Identifies a song within the broadcaster's library.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
#[serde(transparent)]
pub struct SongId(pub i64);

impl From<i64> for SongId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for SongId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Shared secret gating every broadcast route. Generated once per session;
/// receivers obtain it out-of-band (QR code or manual entry).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct SessionToken(pub String);

impl SessionToken {
    pub const LEN: usize = 8;

    /// Generates an 8-character alphanumeric token. `ThreadRng` is a
    /// CSPRNG, so tokens are not guessable from earlier ones.
    pub fn generate() -> Self {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(Self::LEN)
            .map(char::from)
            .collect();
        Self(token)
    }

    /// Exact equality check against a client-supplied credential.
    pub fn matches(&self, candidate: &str) -> bool {
        self.0 == candidate
    }
}

impl std::fmt::Display for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifies one live /sync connection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct ClientId(pub String);

impl ClientId {
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Metadata of a song the broadcaster can serve.
#[derive(Debug, Clone, PartialEq)]
pub struct SongRef {
    pub id: SongId,
    pub title: String,
    pub artist: String,
}

/// One consistent reading of the broadcaster's live playback state.
#[derive(Debug, Clone, PartialEq)]
pub struct NowPlaying {
    pub song: SongRef,
    pub position_ms: u64,
    pub duration_ms: u64,
    pub is_playing: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_has_fixed_alphanumeric_shape() {
        for _ in 0..32 {
            let token = SessionToken::generate();
            assert_eq!(token.0.len(), SessionToken::LEN);
            assert!(token.0.chars().all(|c| c.is_ascii_alphanumeric()));
        }
    }

    #[test]
    fn token_matches_exactly() {
        let token = SessionToken("a1B2c3D4".to_string());
        assert!(token.matches("a1B2c3D4"));
        assert!(!token.matches("a1b2c3d4"));
        assert!(!token.matches("a1B2c3D"));
        assert!(!token.matches(""));
    }
}
