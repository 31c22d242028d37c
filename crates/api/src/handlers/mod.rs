//! Request handlers for the debug interface.
//!
//! Handlers delegate to `diag_core` through [`AppState`](crate::state::AppState)
//! and map errors via [`AppError`](crate::error::AppError).

pub mod files;
pub mod info;
pub mod jobs;
pub mod logging;
