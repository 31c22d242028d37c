use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::ws::Message;
use diag_core::types::Timestamp;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

/// Channel sender half for pushing control frames to a WebSocket connection.
pub type WsSender = mpsc::UnboundedSender<Message>;

/// Metadata for a single live-log viewer.
pub struct WsConnection {
    /// Control channel (pings, close) for this connection.
    pub sender: WsSender,
    pub connected_at: Timestamp,
}

/// Tracks all live-log viewers so heartbeats and shutdown can reach them.
///
/// Connection ids are the viewer's hub subscription id. Designed to be
/// wrapped in `Arc` and shared across the application.
pub struct WsManager {
    connections: RwLock<HashMap<Uuid, WsConnection>>,
}

impl WsManager {
    pub fn new() -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
        }
    }

    /// Register a connection; returns the receiver for its control frames.
    pub async fn add(&self, conn_id: Uuid) -> mpsc::UnboundedReceiver<Message> {
        let (tx, rx) = mpsc::unbounded_channel();
        let conn = WsConnection {
            sender: tx,
            connected_at: chrono::Utc::now(),
        };
        self.connections.write().await.insert(conn_id, conn);
        rx
    }

    pub async fn remove(&self, conn_id: Uuid) {
        self.connections.write().await.remove(&conn_id);
    }

    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// When `conn_id` connected, if it is still registered.
    pub async fn connected_at(&self, conn_id: Uuid) -> Option<Timestamp> {
        self.connections
            .read()
            .await
            .get(&conn_id)
            .map(|conn| conn.connected_at)
    }

    /// Send a Close frame to every connection, then clear the map.
    pub async fn shutdown_all(&self) {
        let mut conns = self.connections.write().await;
        let count = conns.len();
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Close(None));
        }
        conns.clear();
        tracing::info!(count, "Closed all live-log connections");
    }

    /// Send a Ping frame to every viewer.
    pub async fn ping_all(&self) {
        let conns = self.connections.read().await;
        for conn in conns.values() {
            let _ = conn.sender.send(Message::Ping(Bytes::new()));
        }
    }
}

impl Default for WsManager {
    fn default() -> Self {
        Self::new()
    }
}
