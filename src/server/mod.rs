pub mod app_state;
pub mod broadcaster;
pub mod publisher;
pub mod session;

pub use app_state::AppState;
pub use broadcaster::Broadcaster;
pub use session::{BroadcastSession, ClientConnection};
