//! Debug console client library.
//!
//! - [`client::DebugClient`] drives the start-or-poll job endpoints and
//!   downloads checksum-verified report bundles.
//! - [`live_log::LiveLogConnection`] is the explicit connect/disconnect
//!   controller for the live-log WebSocket.
//!
//! The binary entrypoint lives in `main.rs`.

pub mod client;
pub mod error;
pub mod live_log;
