//! `tracing_subscriber` layer feeding the [`LogHub`].
//!
//! Install it after the reloadable `EnvFilter` so that live viewers see
//! exactly what the configured logging categories let through.

use std::fmt::{self, Write as _};
use std::sync::Arc;

use tracing::field::{Field, Visit};
use tracing::{Event, Subscriber};
use tracing_subscriber::layer::Context;
use tracing_subscriber::Layer;

use crate::hub::{LogHub, LogLine};

/// Events from this crate are never re-published.
const OWN_TARGET: &str = "diag_events";

pub struct LogHubLayer {
    hub: Arc<LogHub>,
}

impl LogHubLayer {
    pub fn new(hub: Arc<LogHub>) -> Self {
        Self { hub }
    }
}

impl<S> Layer<S> for LogHubLayer
where
    S: Subscriber,
{
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        let meta = event.metadata();
        if meta.target().starts_with(OWN_TARGET) || self.hub.subscriber_count() == 0 {
            return;
        }

        let mut visitor = LineVisitor::default();
        event.record(&mut visitor);

        self.hub.publish(LogLine::new(
            meta.level().to_string(),
            meta.target(),
            visitor.finish(),
        ));
    }
}

/// Collects the `message` field plus `key=value` pairs for the rest.
#[derive(Default)]
struct LineVisitor {
    message: String,
    fields: String,
}

impl LineVisitor {
    fn push_field(&mut self, name: &str, value: fmt::Arguments<'_>) {
        if !self.fields.is_empty() {
            self.fields.push(' ');
        }
        let _ = write!(self.fields, "{name}={value}");
    }

    fn finish(self) -> String {
        match (self.message.is_empty(), self.fields.is_empty()) {
            (_, true) => self.message,
            (true, false) => self.fields,
            (false, false) => format!("{} {}", self.message, self.fields),
        }
    }
}

impl Visit for LineVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        } else {
            self.push_field(field.name(), format_args!("{value}"));
        }
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{value:?}");
        } else {
            self.push_field(field.name(), format_args!("{value:?}"));
        }
    }
}

#[cfg(test)]
mod tests {
    use tracing_subscriber::layer::SubscriberExt;

    use super::*;

    #[test]
    fn events_are_published_with_fields() {
        let hub = Arc::new(LogHub::default());
        let mut sub = hub.subscribe();
        let subscriber = tracing_subscriber::registry().with(LogHubLayer::new(Arc::clone(&hub)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::warn!(target: "DeviceManager", device = 7, name = "lamp", "device lost");
        });

        let line = sub.try_recv().expect("line published");
        assert_eq!(line.level, "WARN");
        assert_eq!(line.target, "DeviceManager");
        assert_eq!(line.message, "device lost device=7 name=lamp");
    }

    #[test]
    fn nothing_is_built_without_subscribers() {
        let hub = Arc::new(LogHub::default());
        let subscriber = tracing_subscriber::registry().with(LogHubLayer::new(Arc::clone(&hub)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("nobody listening");
        });

        let mut late = hub.subscribe();
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn own_events_are_skipped() {
        let hub = Arc::new(LogHub::default());
        let mut sub = hub.subscribe();
        let subscriber = tracing_subscriber::registry().with(LogHubLayer::new(Arc::clone(&hub)));

        tracing::subscriber::with_default(subscriber, || {
            tracing::debug!(target: "diag_events::hub", "internal");
            tracing::info!(target: "RuleEngine", "rule fired");
        });

        assert_eq!(sub.try_recv().unwrap().target, "RuleEngine");
        assert!(sub.try_recv().is_none());
    }
}
