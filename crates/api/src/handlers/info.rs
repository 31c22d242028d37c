use axum::extract::State;
use axum::Json;

use diag_core::system_info::ServerInfo;

use crate::state::AppState;

/// GET /debug/info
pub async fn server_info(State(state): State<AppState>) -> Json<ServerInfo> {
    Json(state.identity.collect())
}
