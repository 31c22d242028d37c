//! Debug server library.
//!
//! Exposes the building blocks (config, state, error handling, routes,
//! live-log WebSocket infrastructure, background tasks) so integration tests
//! and the binary entrypoint can both access them.

pub mod background;
pub mod config;
pub mod error;
pub mod handlers;
pub mod logging;
pub mod response;
pub mod router;
pub mod routes;
pub mod state;
pub mod ws;
