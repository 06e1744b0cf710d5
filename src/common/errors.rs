use serde::Serialize;
use thiserror::Error;

use crate::common::types::now_ms;

/// Failure taxonomy of the broadcast/sync core.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or rejected token. Per-request; never mutates session state.
    #[error("unauthorized: {0}")]
    Auth(String),
    /// No song selected, or the requested bytes do not exist.
    #[error("not found: {0}")]
    NotFound(String),
    /// Per-connection I/O failure, contained to that connection.
    #[error("transport: {0}")]
    Transport(String),
    /// A malformed frame. The message is dropped and processing continues.
    #[error("protocol: {0}")]
    Protocol(String),
    /// Reconnect budget exhausted.
    #[error("connection lost after {attempts} attempts: {reason}")]
    Connectivity { attempts: u32, reason: String },
}

/// Wavelink JSON error response format.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WavelinkError {
    /// Unix timestamp in milliseconds.
    pub timestamp: u64,
    /// HTTP status code.
    pub status: u16,
    /// HTTP status reason phrase (e.g. "Not Found").
    pub error: String,
    /// Human-readable error message.
    pub message: String,
    /// The request path that caused the error.
    pub path: String,
}

impl WavelinkError {
    pub fn not_found(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status: 404,
            error: "Not Found".into(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn internal(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status: 500,
            error: "Internal Server Error".into(),
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn range_not_satisfiable(message: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            timestamp: now_ms(),
            status: 416,
            error: "Range Not Satisfiable".into(),
            message: message.into(),
            path: path.into(),
        }
    }
}
