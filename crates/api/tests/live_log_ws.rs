//! End-to-end tests for the live-log WebSocket listeners.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use common::{build_test_app, build_test_state, fake_tools};
use diag_api::router::build_live_log_router;
use diag_events::{LogHub, LogLine};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

async fn serve(app: axum::Router) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn wait_for_subscribers(hub: &Arc<LogHub>, count: usize) {
    for _ in 0..200 {
        if hub.subscriber_count() == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("expected {count} live-log subscribers, have {}", hub.subscriber_count());
}

async fn next_text(client: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("transport error");
        match frame {
            Message::Text(text) => return text.to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Test: lines reach every viewer in publish order
// ---------------------------------------------------------------------------

#[tokio::test]
async fn viewers_receive_lines_in_order() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_test_state(dir.path(), fake_tools());
    let hub = Arc::clone(&state.log_hub);
    let addr = serve(build_live_log_router(state)).await;

    let (mut a, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    let (mut b, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_subscribers(&hub, 2).await;

    hub.publish(LogLine::new("INFO", "DeviceManager", "L1"));
    hub.publish(LogLine::new("WARN", "RuleEngine", "L2"));

    for client in [&mut a, &mut b] {
        let first = next_text(client).await;
        let second = next_text(client).await;
        assert!(first.ends_with("DeviceManager: L1\n"), "got {first:?}");
        assert!(second.ends_with("RuleEngine: L2\n"), "got {second:?}");
    }
}

// ---------------------------------------------------------------------------
// Test: a late viewer does not get earlier lines
// ---------------------------------------------------------------------------

#[tokio::test]
async fn late_viewer_starts_at_connect_time() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_test_state(dir.path(), fake_tools());
    let hub = Arc::clone(&state.log_hub);
    let addr = serve(build_live_log_router(state)).await;

    hub.publish(LogLine::new("INFO", "Application", "before"));

    let (mut client, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_subscribers(&hub, 1).await;
    hub.publish(LogLine::new("INFO", "Application", "after"));

    assert!(next_text(&mut client).await.ends_with("Application: after\n"));
}

// ---------------------------------------------------------------------------
// Test: closing one viewer leaves the others streaming
// ---------------------------------------------------------------------------

#[tokio::test]
async fn closing_one_viewer_keeps_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_test_state(dir.path(), fake_tools());
    let hub = Arc::clone(&state.log_hub);
    let ws_manager = Arc::clone(&state.ws_manager);
    let addr = serve(build_live_log_router(state)).await;

    let (mut leaving, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    let (mut staying, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_subscribers(&hub, 2).await;

    leaving.send(Message::Close(None)).await.unwrap();
    wait_for_subscribers(&hub, 1).await;
    assert_eq!(ws_manager.connection_count().await, 1);

    hub.publish(LogLine::new("INFO", "LiveLog", "still here"));
    assert!(next_text(&mut staying).await.ends_with("LiveLog: still here\n"));
}

// ---------------------------------------------------------------------------
// Test: the main port serves the same stream under /debug/logs/ws
// ---------------------------------------------------------------------------

#[tokio::test]
async fn main_port_serves_live_log_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_test_state(dir.path(), fake_tools());
    let hub = Arc::clone(&state.log_hub);
    let addr = serve(build_test_app(state)).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/debug/logs/ws"))
        .await
        .unwrap();
    wait_for_subscribers(&hub, 1).await;

    hub.publish(LogLine::new("DEBUG", "JobRegistry", "hello"));
    assert!(next_text(&mut client).await.ends_with("JobRegistry: hello\n"));
}

// ---------------------------------------------------------------------------
// Test: shutdown closes every viewer
// ---------------------------------------------------------------------------

#[tokio::test]
async fn shutdown_all_sends_close() {
    let dir = tempfile::tempdir().unwrap();
    let state = build_test_state(dir.path(), fake_tools());
    let hub = Arc::clone(&state.log_hub);
    let ws_manager = Arc::clone(&state.ws_manager);
    let addr = serve(build_live_log_router(state)).await;

    let (mut client, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    wait_for_subscribers(&hub, 1).await;

    ws_manager.shutdown_all().await;

    let frame = tokio::time::timeout(Duration::from_secs(5), client.next())
        .await
        .expect("timed out waiting for close");
    assert!(matches!(frame, Some(Ok(Message::Close(_))) | None));
}
