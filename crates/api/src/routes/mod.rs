pub mod health;

use axum::routing::get;
use axum::Router;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the `/debug` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /info                          server information
/// /report                        start-or-poll report (?wait=), download (?filename=)
/// /ping                          start-or-poll ping (?wait=)
/// /dig                           start-or-poll DNS lookup (?wait=)
/// /tracepath                     start-or-poll trace path (?wait=)
/// /jobs                          job slot snapshot
/// /logging-categories            get, set (?<category>=<level>, ?filter=<token>)
/// /syslog                        syslog download
/// /logdb                         log database download
/// /settings/{role}               settings file download
/// /logs/ws                       live-log WebSocket
/// ```
pub fn debug_routes() -> Router<AppState> {
    Router::new()
        .route("/info", get(handlers::info::server_info))
        .route("/report", get(handlers::jobs::report))
        .route("/ping", get(handlers::jobs::ping))
        .route("/dig", get(handlers::jobs::dig))
        .route("/tracepath", get(handlers::jobs::tracepath))
        .route("/jobs", get(handlers::jobs::list_jobs))
        .route(
            "/logging-categories",
            get(handlers::logging::logging_categories),
        )
        .route("/syslog", get(handlers::files::syslog))
        .route("/logdb", get(handlers::files::log_db))
        .route("/settings/{role}", get(handlers::files::settings))
        .route("/logs/ws", get(ws::live_log_handler))
}

/// Routes served on the dedicated live-log port.
pub fn live_log_routes() -> Router<AppState> {
    Router::new().route("/", get(ws::live_log_handler))
}
