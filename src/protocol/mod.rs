pub mod messages;

pub use messages::{ClockSyncReply, ClockSyncRequest, PlaybackSnapshot};
