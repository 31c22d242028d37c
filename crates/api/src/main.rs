use std::future::IntoFuture;
use std::net::{IpAddr, SocketAddr};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, reload, util::SubscriberInitExt, EnvFilter};

use diag_api::background::{job_expiry, report_cleanup};
use diag_api::config::ServerConfig;
use diag_api::logging::{LoggingControl, DEFAULT_DIRECTIVES};
use diag_api::router::{build_app_router, build_live_log_router};
use diag_api::state::AppState;
use diag_api::ws;
use diag_core::error::CoreError;
use diag_core::logging::LoggingCategoryConfig;
use diag_events::{LogHub, LogHubLayer};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // --- Configuration ---
    let config = ServerConfig::from_env();

    // --- Tracing ---
    // Categories start from RUST_LOG (or the defaults) and own the filter
    // from then on.
    let base_directives =
        std::env::var("RUST_LOG").unwrap_or_else(|_| DEFAULT_DIRECTIVES.to_string());
    let mut categories = LoggingCategoryConfig::new(config.plugin_logging_categories.clone());
    categories.seed_from_directives(&base_directives);
    let initial_filter = EnvFilter::try_new(categories.to_env_filter_directives(&base_directives))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES));
    let (filter_layer, filter_handle) = reload::Layer::new(initial_filter);

    let log_hub = Arc::new(LogHub::new(config.log_queue_capacity));

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(tracing_subscriber::fmt::layer())
        .with(LogHubLayer::new(Arc::clone(&log_hub)))
        .init();

    tracing::info!(
        host = %config.host,
        port = config.port,
        live_log_port = config.live_log_port,
        "Loaded server configuration"
    );

    let logging = LoggingControl::with_reload_handle(categories, base_directives, filter_handle);

    // --- App state ---
    let state = AppState::from_config(config.clone(), logging, Arc::clone(&log_hub));
    let ws_manager = Arc::clone(&state.ws_manager);

    // --- Listeners ---
    let (main_listener, live_log_listener) = match bind_listeners(&config).await {
        Ok(listeners) => listeners,
        Err(e) => {
            tracing::error!(error = %e, "Failed to start debug server");
            return ExitCode::FAILURE;
        }
    };

    // --- Background tasks ---
    let cancel = CancellationToken::new();
    let heartbeat_handle = ws::start_heartbeat(Arc::clone(&ws_manager), cancel.clone());
    let cleanup_handle = tokio::spawn(report_cleanup::run(
        state.reports.clone(),
        Duration::from_secs(config.report_retention_secs),
        cancel.clone(),
    ));
    let expiry_handle = tokio::spawn(job_expiry::run(
        Arc::clone(&state.jobs),
        Duration::from_secs(config.job_result_ttl_secs),
        cancel.clone(),
    ));

    // --- Serve ---
    let app = build_app_router(state.clone(), &config);
    let live_log_app = build_live_log_router(state);

    tracing::info!(
        addr = %main_listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        live_log_addr = %live_log_listener.local_addr().map(|a| a.to_string()).unwrap_or_default(),
        "Debug server started"
    );

    // Either server stopping (signal or error) stops the other.
    let main_server = {
        let serve = axum::serve(main_listener, app)
            .with_graceful_shutdown(cancelled(cancel.clone()))
            .into_future();
        let cancel = cancel.clone();
        async move {
            let result = serve.await;
            cancel.cancel();
            result
        }
    };
    let live_log_server = {
        let serve = axum::serve(live_log_listener, live_log_app)
            .with_graceful_shutdown(cancelled(cancel.clone()))
            .into_future();
        let cancel = cancel.clone();
        async move {
            let result = serve.await;
            cancel.cancel();
            result
        }
    };

    let shutdown = {
        let cancel = cancel.clone();
        async move {
            tokio::select! {
                _ = shutdown_signal() => cancel.cancel(),
                _ = cancel.cancelled() => {}
            }
        }
    };

    let (main_result, live_log_result, ()) = tokio::join!(main_server, live_log_server, shutdown);

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, cleaning up");

    let ws_count = ws_manager.connection_count().await;
    tracing::info!(ws_count, "Closing remaining live-log connections");
    ws_manager.shutdown_all().await;
    log_hub.close_all();

    let _ = tokio::time::timeout(Duration::from_secs(5), heartbeat_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), cleanup_handle).await;
    let _ = tokio::time::timeout(Duration::from_secs(5), expiry_handle).await;
    tracing::info!("Background tasks stopped");

    match (main_result, live_log_result) {
        (Ok(()), Ok(())) => {
            tracing::info!("Graceful shutdown complete");
            ExitCode::SUCCESS
        }
        (Err(e), _) | (_, Err(e)) => {
            tracing::error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}

/// Bind the debug HTTP port and the live-log port. Either failing is fatal.
async fn bind_listeners(config: &ServerConfig) -> Result<(TcpListener, TcpListener), CoreError> {
    let main = bind(&config.host, config.port).await?;
    let live_log = bind(&config.host, config.live_log_port).await?;
    Ok((main, live_log))
}

async fn bind(host: &str, port: u16) -> Result<TcpListener, CoreError> {
    let ip = host.parse::<IpAddr>().map_err(|e| CoreError::PortInUse {
        port,
        reason: format!("invalid HOST '{host}': {e}"),
    })?;
    TcpListener::bind(SocketAddr::new(ip, port))
        .await
        .map_err(|e| CoreError::PortInUse {
            port,
            reason: e.to_string(),
        })
}

async fn cancelled(cancel: CancellationToken) {
    cancel.cancelled().await;
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
