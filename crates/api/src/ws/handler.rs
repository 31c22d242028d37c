use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};

use crate::state::AppState;

/// HTTP handler that upgrades the connection to a live-log WebSocket.
///
/// Served at `/debug/logs/ws` on the main port and at `/` on the dedicated
/// live-log port. Viewers never send anything meaningful; every log line
/// emitted after the upgrade is pushed as a text frame.
pub async fn live_log_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// Manage a single viewer after upgrade.
///
///   1. Subscribes to the log hub and registers with `WsManager`.
///   2. Spawns a sender task that forwards hub lines and control frames.
///   3. Drains inbound frames on the current task until close or error.
///   4. Unsubscribes and unregisters; other viewers are unaffected.
async fn handle_socket(socket: WebSocket, state: AppState) {
    let mut subscription = state.log_hub.subscribe();
    let conn_id = subscription.id();
    let mut control_rx = state.ws_manager.add(conn_id).await;
    tracing::info!(%conn_id, "Live-log viewer connected");

    let (mut sink, mut stream) = socket.split();

    let send_task = tokio::spawn(async move {
        loop {
            let frames = tokio::select! {
                control = control_rx.recv() => match control {
                    Some(msg) => vec![msg],
                    None => break,
                },
                line = subscription.recv() => match line {
                    Some(line) => {
                        let mut frames = Vec::with_capacity(2);
                        let skipped = subscription.take_dropped();
                        if skipped > 0 {
                            frames.push(Message::Text(
                                format!("... {skipped} log lines skipped ...\n").into(),
                            ));
                        }
                        frames.push(Message::Text(line.render().into()));
                        frames
                    }
                    None => break,
                },
            };

            for frame in frames {
                let closing = matches!(frame, Message::Close(_));
                if sink.send(frame).await.is_err() || closing {
                    return;
                }
            }
        }
    });

    while let Some(result) = stream.next().await {
        match result {
            Ok(Message::Close(_)) => break,
            Ok(Message::Pong(_)) => {
                tracing::trace!(%conn_id, "Pong received");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(%conn_id, error = %e, "Live-log receive error");
                break;
            }
        }
    }

    state.ws_manager.remove(conn_id).await;
    state.log_hub.unsubscribe(conn_id);
    send_task.abort();
    tracing::info!(%conn_id, "Live-log viewer disconnected");
}
