//! Live log fan-out.
//!
//! - [`LogHub`]: in-process hub that copies every published [`LogLine`] to
//!   all currently connected subscribers.
//! - [`LogHubLayer`]: `tracing_subscriber` layer that turns every enabled
//!   event into a [`LogLine`] and publishes it on the hub.

pub mod hub;
pub mod layer;

pub use hub::{LogHub, LogLine, LogSubscription};
pub use layer::LogHubLayer;
