#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::body::{Body, Bytes};
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use diag_api::config::ServerConfig;
use diag_api::handlers::jobs::CLIENT_HEADER;
use diag_api::logging::LoggingControl;
use diag_api::router::build_app_router;
use diag_api::state::AppState;
use diag_core::logging::LoggingCategoryConfig;
use diag_core::tools::{ToolCommand, ToolKind, ToolRunner};
use diag_events::LogHub;

/// Build a test `ServerConfig` whose directories all live under `root`.
pub fn test_config(root: &Path) -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        live_log_port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        diag_target_host: "example.invalid".to_string(),
        tool_timeout_secs: 5,
        report_dir: root.join("reports"),
        report_retention_secs: 1800,
        job_result_ttl_secs: 300,
        job_share_window_secs: 10,
        long_poll_max_secs: 10,
        log_queue_capacity: 64,
        settings_dir: root.join("settings"),
        log_dir: root.join("log"),
        syslog_path: root.join("log/syslog"),
        log_db_path: root.join("log/nymead.sqlite"),
        server_name: "test-server".to_string(),
        plugin_logging_categories: vec!["ZigbeePlugin".to_string()],
    }
}

/// Tool runner whose commands answer instantly without touching the network.
pub fn fake_tools() -> ToolRunner {
    ToolRunner::new("example.invalid", Duration::from_secs(5))
        .with_command(
            ToolKind::Ping,
            ToolCommand::new("sh", &["-c", "echo '4 packets transmitted, 4 received'"]),
        )
        .with_command(
            ToolKind::DnsLookup,
            ToolCommand::new("sh", &["-c", "echo ';; ANSWER SECTION:'"]),
        )
        .with_command(
            ToolKind::TracePath,
            ToolCommand::new("sh", &["-c", "echo ' 1:  gateway  0.4ms'"]),
        )
}

pub fn build_test_state(root: &Path, tools: ToolRunner) -> AppState {
    build_test_state_with_config(test_config(root), tools)
}

pub fn build_test_state_with_config(config: ServerConfig, tools: ToolRunner) -> AppState {
    AppState::with_tools(
        config,
        tools,
        LoggingControl::detached(LoggingCategoryConfig::new(["ZigbeePlugin"])),
        Arc::new(LogHub::new(64)),
    )
}

/// Full application router with the production middleware stack.
pub fn build_test_app(state: AppState) -> Router {
    let config = state.config.clone();
    build_app_router(state, &config)
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

/// GET `uri` identifying as `client`.
pub async fn get_as(app: Router, uri: &str, client: &str) -> Response {
    app.oneshot(
        Request::get(uri)
            .header(CLIENT_HEADER, client)
            .body(Body::empty())
            .unwrap(),
    )
    .await
    .unwrap()
}

pub async fn body_bytes(response: Response) -> Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_slice(&body_bytes(response).await).unwrap()
}

pub async fn body_text(response: Response) -> String {
    String::from_utf8(body_bytes(response).await.to_vec()).unwrap()
}

/// Poll `uri` until it stops answering `204`, failing after `attempts`.
pub async fn poll_until_done(app: &Router, uri: &str, attempts: usize) -> Response {
    for _ in 0..attempts {
        let response = get(app.clone(), uri).await;
        if response.status() != StatusCode::NO_CONTENT {
            return response;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("{uri} still running after {attempts} polls");
}
