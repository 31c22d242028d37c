//! Live-log WebSocket infrastructure.
//!
//! Provides connection management, heartbeat monitoring, and the HTTP
//! upgrade handler that streams [`diag_events::LogHub`] lines to viewers.

mod handler;
mod heartbeat;
pub mod manager;

pub use handler::live_log_handler;
pub use heartbeat::start_heartbeat;
pub use manager::WsManager;
