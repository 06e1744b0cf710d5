//! Wavelink turns one device into a miniature audio streaming server over
//! a shared local network and keeps receiver devices position-synchronized
//! with it: an HTTP byte stream plus a WebSocket channel pushing playback
//! snapshots on one side, and a clock-calibrating, drift-correcting sync
//! client on the other.

pub mod common;
pub mod config;
pub mod protocol;
pub mod receiver;
pub mod server;
pub mod sources;
pub mod transport;
