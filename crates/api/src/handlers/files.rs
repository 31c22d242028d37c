//! Raw file downloads: syslog, the log database and settings files.

use std::path::Path as FsPath;

use axum::extract::{Path, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};

use diag_core::files::read_file;
use diag_core::types::SettingsRole;

use crate::error::AppResult;
use crate::state::AppState;

async fn serve_file(path: &FsPath, label: &str, content_type: &'static str) -> AppResult<Response> {
    let bytes = read_file(path, label).await?;
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| label.to_string());
    tracing::debug!(path = %path.display(), size = bytes.len(), "Serving debug file");
    Ok((
        [
            (CONTENT_TYPE, content_type.to_string()),
            (
                CONTENT_DISPOSITION,
                format!("attachment; filename=\"{file_name}\""),
            ),
        ],
        bytes,
    )
        .into_response())
}

/// GET /debug/syslog
pub async fn syslog(State(state): State<AppState>) -> AppResult<Response> {
    serve_file(&state.config.syslog_path, "syslog", "text/plain; charset=utf-8").await
}

/// GET /debug/logdb
pub async fn log_db(State(state): State<AppState>) -> AppResult<Response> {
    serve_file(&state.config.log_db_path, "log database", "application/x-sqlite3").await
}

/// GET /debug/settings/{role}
pub async fn settings(
    State(state): State<AppState>,
    Path(role): Path<String>,
) -> AppResult<Response> {
    let role: SettingsRole = role.parse()?;
    serve_file(
        &state.config.settings_path(role),
        role.slug(),
        "text/plain; charset=utf-8",
    )
    .await
}
