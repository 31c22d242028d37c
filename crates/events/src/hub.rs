//! In-process log broadcast hub.
//!
//! Every subscriber owns a bounded queue. [`LogHub::publish`] pushes the line
//! into each queue under one lock, which gives all subscribers the same
//! relative order. A full queue drops the new line for that subscriber only
//! and bumps its dropped counter; a closed queue removes the subscriber.
//! `publish` never waits on a subscriber.
//!
//! Nothing in this module may emit `tracing` events while the subscriber
//! lock is held: [`LogHubLayer`](crate::LogHubLayer) calls back into
//! `publish` from inside the logging pipeline.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};
use uuid::Uuid;

/// Default per-subscriber queue capacity.
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

// ---------------------------------------------------------------------------
// LogLine
// ---------------------------------------------------------------------------

/// One emitted log record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogLine {
    pub timestamp: DateTime<Utc>,
    pub level: String,
    pub target: String,
    pub message: String,
}

impl LogLine {
    pub fn new(
        level: impl Into<String>,
        target: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            level: level.into(),
            target: target.into(),
            message: message.into(),
        }
    }

    /// Text frame sent to live viewers, newline terminated.
    pub fn render(&self) -> String {
        format!("{self}\n")
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:>5} {}: {}",
            self.timestamp.format("%Y-%m-%dT%H:%M:%S%.3fZ"),
            self.level,
            self.target,
            self.message
        )
    }
}

// ---------------------------------------------------------------------------
// LogSubscription
// ---------------------------------------------------------------------------

/// Receiving end handed to one live viewer.
///
/// Dropping the subscription is equivalent to unsubscribing; the hub notices
/// on the next publish.
pub struct LogSubscription {
    id: Uuid,
    receiver: mpsc::Receiver<LogLine>,
    dropped: Arc<AtomicU64>,
}

impl LogSubscription {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Wait for the next line. `None` once the hub has removed this subscriber.
    pub async fn recv(&mut self) -> Option<LogLine> {
        self.receiver.recv().await
    }

    /// Non-blocking receive. `None` when the queue is empty or closed.
    pub fn try_recv(&mut self) -> Option<LogLine> {
        match self.receiver.try_recv() {
            Ok(line) => Some(line),
            Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
        }
    }

    /// Number of lines dropped because the queue was full since the last call.
    pub fn take_dropped(&self) -> u64 {
        self.dropped.swap(0, Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// LogHub
// ---------------------------------------------------------------------------

struct Subscriber {
    sender: mpsc::Sender<LogLine>,
    dropped: Arc<AtomicU64>,
}

/// Fan-out hub for live log lines.
///
/// Designed to be shared via `Arc<LogHub>` between the logging layer and the
/// WebSocket handlers.
pub struct LogHub {
    subscribers: Mutex<HashMap<Uuid, Subscriber>>,
    capacity: usize,
}

impl LogHub {
    /// Create a hub whose subscribers buffer up to `capacity` lines each.
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, Subscriber>> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a new subscriber. It receives only lines published from now on.
    pub fn subscribe(&self) -> LogSubscription {
        let (sender, receiver) = mpsc::channel(self.capacity);
        let dropped = Arc::new(AtomicU64::new(0));
        let id = Uuid::new_v4();
        self.lock().insert(
            id,
            Subscriber {
                sender,
                dropped: Arc::clone(&dropped),
            },
        );
        LogSubscription {
            id,
            receiver,
            dropped,
        }
    }

    /// Remove a subscriber. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: Uuid) -> bool {
        self.lock().remove(&id).is_some()
    }

    /// Copy `line` to every subscriber. Returns how many queues accepted it.
    pub fn publish(&self, line: LogLine) -> usize {
        let mut delivered = 0;
        self.lock()
            .retain(|_, sub| match sub.sender.try_send(line.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(TrySendError::Full(_)) => {
                    sub.dropped.fetch_add(1, Ordering::Relaxed);
                    true
                }
                Err(TrySendError::Closed(_)) => false,
            });
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    /// Disconnect every subscriber; their `recv` returns `None` once drained.
    pub fn close_all(&self) -> usize {
        let mut subs = self.lock();
        let count = subs.len();
        subs.clear();
        count
    }
}

impl Default for LogHub {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn line(message: &str) -> LogLine {
        LogLine::new("INFO", "test", message)
    }

    #[tokio::test]
    async fn every_subscriber_sees_lines_in_publish_order() {
        let hub = LogHub::default();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        hub.publish(line("L1"));
        hub.publish(line("L2"));

        for sub in [&mut a, &mut b] {
            assert_eq!(sub.recv().await.unwrap().message, "L1");
            assert_eq!(sub.recv().await.unwrap().message, "L2");
        }
    }

    #[tokio::test]
    async fn late_subscriber_does_not_see_earlier_lines() {
        let hub = LogHub::default();
        let mut early = hub.subscribe();
        hub.publish(line("L1"));

        let mut late = hub.subscribe();
        hub.publish(line("L2"));

        assert_eq!(early.recv().await.unwrap().message, "L1");
        assert_eq!(early.recv().await.unwrap().message, "L2");
        assert_eq!(late.recv().await.unwrap().message, "L2");
        assert!(late.try_recv().is_none());
    }

    #[test]
    fn full_queue_drops_for_that_subscriber_only() {
        let hub = LogHub::new(2);
        let mut slow = hub.subscribe();
        let mut fast = hub.subscribe();

        hub.publish(line("L1"));
        assert_eq!(fast.try_recv().unwrap().message, "L1");
        hub.publish(line("L2"));
        assert_eq!(fast.try_recv().unwrap().message, "L2");
        hub.publish(line("L3"));
        assert_eq!(fast.try_recv().unwrap().message, "L3");

        // The slow subscriber kept the two oldest lines and lost the third.
        assert_eq!(slow.take_dropped(), 1);
        assert_eq!(slow.take_dropped(), 0);
        assert_eq!(slow.try_recv().unwrap().message, "L1");
        assert_eq!(slow.try_recv().unwrap().message, "L2");
        assert!(slow.try_recv().is_none());
        assert_eq!(hub.subscriber_count(), 2);
    }

    #[test]
    fn dropped_subscription_is_removed_on_publish() {
        let hub = LogHub::default();
        let gone = hub.subscribe();
        let _alive = hub.subscribe();
        drop(gone);

        assert_eq!(hub.subscriber_count(), 2);
        assert_eq!(hub.publish(line("L1")), 1);
        assert_eq!(hub.subscriber_count(), 1);
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let hub = LogHub::default();
        let sub = hub.subscribe();
        assert!(hub.unsubscribe(sub.id()));
        assert!(!hub.unsubscribe(sub.id()));
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn close_all_ends_every_subscription() {
        let hub = LogHub::default();
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();
        hub.publish(line("last"));

        assert_eq!(hub.close_all(), 2);
        assert_eq!(a.recv().await.unwrap().message, "last");
        assert!(a.recv().await.is_none());
        assert_eq!(b.recv().await.unwrap().message, "last");
        assert!(b.recv().await.is_none());
    }

    #[test]
    fn publish_without_subscribers_does_not_panic() {
        let hub = LogHub::default();
        assert_eq!(hub.publish(line("orphan")), 0);
    }

    #[test]
    fn concurrent_producers_get_a_single_order() {
        let hub = Arc::new(LogHub::new(4096));
        let mut a = hub.subscribe();
        let mut b = hub.subscribe();

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let hub = Arc::clone(&hub);
                std::thread::spawn(move || {
                    for i in 0..100 {
                        hub.publish(line(&format!("{t}-{i}")));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let drain = |sub: &mut LogSubscription| {
            let mut out = Vec::new();
            while let Some(l) = sub.try_recv() {
                out.push(l.message);
            }
            out
        };
        let seen_a = drain(&mut a);
        let seen_b = drain(&mut b);
        assert_eq!(seen_a.len(), 400);
        assert_eq!(seen_a, seen_b);
    }

    #[test]
    fn render_is_newline_terminated() {
        let rendered = LogLine::new("WARN", "DeviceManager", "device lost").render();
        assert!(rendered.ends_with("DeviceManager: device lost\n"));
        assert!(rendered.contains(" WARN "));
    }
}
